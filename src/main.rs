use std::cell::Cell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser as CliParser;

use calcbasic::context::Context;
use calcbasic::error::CalcResult;
use calcbasic::eval::Interpreter;
use calcbasic::parser::Parser;

#[derive(CliParser)]
#[command(name = "calcbasic")]
#[command(about = "An interpreter for a programmable scientific calculator language")]
#[command(version)]
struct Cli {
    /// Program source file to execute
    source: Option<PathBuf>,

    /// Evaluate an expression directly
    #[arg(short = 'e', long)]
    eval: Option<String>,

    /// Pre-queued answers for input prompts (repeatable)
    #[arg(short = 'q', long = "input")]
    inputs: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(expr) = &cli.eval {
        let mut ctx = Context::new();
        if let Err(e) = run_source(expr, &mut ctx, &cli.inputs) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    } else if let Some(path) = &cli.source {
        match std::fs::read_to_string(path) {
            Ok(source) => {
                let mut ctx = Context::new();
                if let Err(e) = run_source(&source, &mut ctx, &cli.inputs) {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("calcbasic: cannot read {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        run_repl();
    }
}

/// Parse and interpret one source text against the given context. The
/// final answer is printed; `◢` outputs print as they happen. Returns an
/// error exit only for unparseable input; runtime errors display as `NaN`
/// with the diagnostic on stderr.
fn run_source(source: &str, ctx: &mut Context, inputs: &[String]) -> CalcResult<()> {
    let program = Parser::new().parse(source)?;
    let failed = Rc::new(Cell::new(false));
    let mut interpreter = Interpreter::new(ctx, &program);
    for input in inputs {
        interpreter.queue_prompt_input(input.clone());
    }
    interpreter.on_prompt(prompt_stdin);
    interpreter.on_output(|_, text| println!("{text}"));
    let flag = Rc::clone(&failed);
    interpreter.on_error(move |diag| {
        eprintln!("{diag}");
        flag.set(true);
    });
    interpreter.on_close(|_, text| println!("{text}"));
    interpreter.evaluate();
    if failed.get() {
        std::process::exit(1);
    }
    Ok(())
}

fn prompt_stdin(variable: &str) -> Option<String> {
    print!("{variable}? ");
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn run_repl() {
    println!("calcbasic {} — interactive mode", env!("CARGO_PKG_VERSION"));
    println!("Type calculator statements. Use exit to quit.\n");

    let mut rl = match rustyline::DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("calcbasic: cannot initialize line editor: {e}");
            std::process::exit(1);
        }
    };

    let mut ctx = Context::new();

    loop {
        match rl.readline("calc> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);
                if trimmed.eq_ignore_ascii_case("exit") {
                    break;
                }
                if let Err(e) = run_source(trimmed, &mut ctx, &[]) {
                    eprintln!("{e}");
                }
            }
            Err(
                rustyline::error::ReadlineError::Interrupted | rustyline::error::ReadlineError::Eof,
            ) => {
                break;
            }
            Err(e) => {
                eprintln!("calcbasic: {e}");
                break;
            }
        }
    }
}
