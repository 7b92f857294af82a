//! Control-flow programs: branches, loops, jumps and the statement
//! separators' output and conditional-skip behavior.

use std::cell::RefCell;
use std::rc::Rc;

use calcbasic::context::Context;
use calcbasic::eval::Interpreter;
use calcbasic::parser::Parser;

fn eval(source: &str) -> String {
    let mut ctx = Context::new();
    eval_with(source, &mut ctx)
}

fn eval_with(source: &str, ctx: &mut Context) -> String {
    let program = Parser::new().parse(source).expect("parse failed");
    let mut interpreter = Interpreter::new(ctx, &program);
    interpreter.on_error(|_| {});
    let result = interpreter.evaluate();
    drop(interpreter);
    ctx.format(&result)
}

fn outputs(source: &str) -> Vec<String> {
    let collected = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::new();
    let program = Parser::new().parse(source).expect("parse failed");
    let mut interpreter = Interpreter::new(&mut ctx, &program);
    let sink = Rc::clone(&collected);
    interpreter.on_output(move |_, text| sink.borrow_mut().push(text.to_string()));
    interpreter.on_error(|_| {});
    interpreter.evaluate();
    drop(interpreter);
    Rc::try_unwrap(collected).unwrap().into_inner()
}

// ── If / Then / Else ────────────────────────────────────────────────

#[test]
fn if_takes_the_then_branch() {
    assert_eq!(eval("5 → A: If A = 5: Then 1: Else 2: IfEnd"), "1");
}

#[test]
fn if_takes_the_else_branch() {
    assert_eq!(eval("5 → A: If A = 6: Then 1: Else 2: IfEnd"), "2");
}

#[test]
fn if_without_else_falls_through() {
    assert_eq!(eval("If 0: Then 1: IfEnd: 9"), "9");
    assert_eq!(eval("If 1: Then 8: IfEnd: Ans"), "8");
}

#[test]
fn then_branch_skips_the_else_branch() {
    assert_eq!(outputs("If 1: Then 1◢ Else 2◢ IfEnd: 0"), vec!["1"]);
    assert_eq!(outputs("If 0: Then 1◢ Else 2◢ IfEnd: 0"), vec!["2"]);
}

// ── For / Next ──────────────────────────────────────────────────────

#[test]
fn for_loop_runs_inclusive_of_the_limit() {
    assert_eq!(
        outputs("For 1 → A To 5: A◢ Next: 0"),
        vec!["1", "2", "3", "4", "5"]
    );
}

#[test]
fn for_loop_with_step() {
    assert_eq!(outputs("For 1 → A To 9 Step 2: A◢ Next: 0"), vec!["1", "3", "5", "7", "9"]);
}

#[test]
fn for_loop_never_entered() {
    // The variable is still assigned before the limit check.
    assert_eq!(eval("For 5 → A To 1: 1/0: Next: A"), "5");
}

#[test]
fn for_without_next_is_a_runtime_error() {
    assert_eq!(eval("For 1 → A To 3: A"), "NaN");
}

// ── While / WhileEnd ────────────────────────────────────────────────

#[test]
fn while_loop_doubles_until_the_condition_fails() {
    assert_eq!(eval("1 → A: While A < 100: 2A → A: WhileEnd: A"), "128");
}

#[test]
fn while_loop_with_false_condition_skips_the_body() {
    assert_eq!(eval("While 0: 1/0: WhileEnd: 7"), "7");
}

#[test]
fn break_leaves_the_loop() {
    assert_eq!(
        eval("0 → A: While 1: A + 1 → A: A = 3 ⇒ Break: WhileEnd: A"),
        "3"
    );
    assert_eq!(
        eval("0 → B: For 1 → A To 100: B + A → B: A = 4 ⇒ Break: Next: B"),
        "10"
    );
}

// ── Goto / Lbl ──────────────────────────────────────────────────────

#[test]
fn goto_skips_statements() {
    assert_eq!(eval("5: Goto 1: 1/0: Lbl 1"), "5");
}

#[test]
fn goto_jumps_backwards() {
    assert_eq!(
        eval("0 → A: Lbl 1: A + 1 → A: A < 3 ⇒ Goto 1: A"),
        "3"
    );
}

#[test]
fn goto_undefined_label_is_a_reference_error() {
    assert_eq!(eval("Goto 7"), "NaN");
}

// ── separators ──────────────────────────────────────────────────────

#[test]
fn output_separator_emits_intermediate_results() {
    assert_eq!(outputs("1 + 1◢ Ans + 1◢ Ans + 1"), vec!["2", "3"]);
}

#[test]
fn conditional_skip_only_fires_on_zero() {
    assert_eq!(eval("0 ⇒ 7: 9"), "9");
    assert_eq!(eval("1 ⇒ 7: 9"), "9");
    assert_eq!(eval("1 ⇒ 7"), "7");
}

#[test]
fn answer_rotation_across_statements() {
    assert_eq!(eval("3: 4: Ans * PreAns"), "12");
    // Commands do not rotate the answer.
    assert_eq!(eval("6: Deg: Ans"), "6");
}

// ── parse errors are local to one statement ─────────────────────────

#[test]
fn nested_if_is_rejected_but_recovered() {
    // The nested If statement is malformed; executing it fails, but a
    // jump around it leaves the rest of the program intact.
    assert_eq!(eval("If 1: Then If 2: 5"), "NaN");
    assert_eq!(eval("Goto 1: If 1: Then If 2: Lbl 1: 8"), "8");
}

#[test]
fn nested_loops_of_competing_kinds_are_rejected() {
    assert_eq!(eval("For 1 → A To 3: While 1: 5"), "NaN");
    assert_eq!(eval("While 1: For 1 → A To 3: 5"), "NaN");
}

#[test]
fn malformed_statement_does_not_poison_the_next() {
    assert_eq!(eval("Goto 1: ): Lbl 1: 6 * 7"), "42");
}

// ── interaction with the context ────────────────────────────────────

#[test]
fn loop_counters_persist_after_the_loop() {
    let mut ctx = Context::new();
    assert_eq!(eval_with("For 1 → A To 5: Next: A", &mut ctx), "6");
}

#[test]
fn assignments_before_a_failure_persist() {
    let mut ctx = Context::new();
    assert_eq!(eval_with("9 → A: 1/0", &mut ctx), "NaN");
    assert_eq!(eval_with("A", &mut ctx), "9");
}
