//! An interpreter for the expression and program language of a
//! programmable scientific calculator: unicode operators for fractions
//! and sexagesimal values, implicit multiplication, a BASIC-like
//! control-flow subset, and calculator-exact display formatting.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod format;
pub mod lexer;
pub mod math;
pub mod parser;
pub mod table;
pub mod value;

use context::Context;
use error::CalcResult;
use eval::Interpreter;
use parser::Parser;

/// Parse, evaluate and format a source text against a fresh context.
pub fn calculate(source: &str) -> CalcResult<String> {
    let mut ctx = Context::new();
    calculate_with(source, &mut ctx)
}

/// Parse, evaluate and format against a caller-supplied context, so
/// variable memory and mode settings carry across calls.
pub fn calculate_with(source: &str, ctx: &mut Context) -> CalcResult<String> {
    let program = Parser::new().parse(source)?;
    let mut interpreter = Interpreter::new(ctx, &program);
    let result = interpreter.evaluate();
    drop(interpreter);
    Ok(ctx.format(&result))
}
