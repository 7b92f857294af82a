//! Program interpreter — a state machine over the flat statement list.
//!
//! Execution walks `Program.body` with a movable instruction pointer and a
//! pending-jump table: loop-back and else-skip edges are registered ahead
//! of time and fire when the pointer reaches their source index. The
//! interpreter suspends at four callback ports (prompt, output, error,
//! close); a queued input list takes priority over the live prompt handler
//! so programs replay deterministically under test.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ast::{Implicity, Node, NodeKind, Program};
use crate::builtins::{builtin, constant};
use crate::config::{AngleUnit, FrequencySetting, NumberBase};
use crate::context::Context;
use crate::error::{
    argument_error, math_error, reference_error, syntax_error, CalcResult, Diagnostic,
};
use crate::lexer::{Keyword, INPUT_PROMPT};
use crate::math;
use crate::parser::Parser;
use crate::table::{unit_frequency, Table};
use crate::value::{big, from_usize, Literals, Repr, Value};

pub type PromptHandler<'h> = Box<dyn FnMut(&str) -> Option<String> + 'h>;
pub type OutputHandler<'h> = Box<dyn FnMut(&Value, &str) + 'h>;
pub type ErrorHandler<'h> = Box<dyn FnMut(&Diagnostic) + 'h>;
pub type CloseHandler<'h> = Box<dyn FnMut(&Value, &str) + 'h>;

/// Where execution continues after a statement.
enum Flow {
    Next,
    Jump(usize),
    End,
}

/// A pending jump target; `None` is the end of the program.
type Target = Option<usize>;

pub struct Interpreter<'p> {
    ctx: &'p mut Context,
    program: &'p Program,
    literals: Literals,
    /// Canned prompt answers, consumed before the live prompt handler.
    prompt_queue: VecDeque<String>,
    all_outputs: Vec<Value>,
    pending_jumps: HashMap<usize, Target>,
    /// `For` statements whose loop variable has been assigned. A revisit
    /// steps the variable instead of reassigning it.
    started_loops: HashSet<usize>,
    prompt_handler: Option<PromptHandler<'p>>,
    output_handler: Option<OutputHandler<'p>>,
    error_handler: Option<ErrorHandler<'p>>,
    close_handler: Option<CloseHandler<'p>>,
}

impl<'p> Interpreter<'p> {
    pub fn new(ctx: &'p mut Context, program: &'p Program) -> Self {
        Self {
            ctx,
            program,
            literals: Literals::new(),
            prompt_queue: VecDeque::new(),
            all_outputs: Vec::new(),
            pending_jumps: HashMap::new(),
            started_loops: HashSet::new(),
            prompt_handler: None,
            output_handler: None,
            error_handler: None,
            close_handler: None,
        }
    }

    pub fn queue_prompt_input(&mut self, input: impl Into<String>) {
        self.prompt_queue.push_back(input.into());
    }

    pub fn on_prompt(&mut self, handler: impl FnMut(&str) -> Option<String> + 'p) {
        self.prompt_handler = Some(Box::new(handler));
    }

    pub fn on_output(&mut self, handler: impl FnMut(&Value, &str) + 'p) {
        self.output_handler = Some(Box::new(handler));
    }

    pub fn on_error(&mut self, handler: impl FnMut(&Diagnostic) + 'p) {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn on_close(&mut self, handler: impl FnMut(&Value, &str) + 'p) {
        self.close_handler = Some(Box::new(handler));
    }

    /// Everything sent to the output port, plus the final result.
    pub fn outputs(&self) -> &[Value] {
        &self.all_outputs
    }

    pub fn formatted_outputs(&self) -> Vec<String> {
        self.all_outputs.iter().map(|v| self.ctx.format(v)).collect()
    }

    /// Run the program to completion. A fatal error is caught once, routed
    /// to the error port, and collapses the result to the error sentinel;
    /// the close port fires either way.
    pub fn evaluate(&mut self) -> Value {
        let result = match self.run() {
            Ok(value) => value,
            Err(diag) => {
                self.error(&diag);
                Value::error()
            }
        };
        self.all_outputs.push(result.clone());
        self.close(&result);
        result
    }

    fn run(&mut self) -> CalcResult<Value> {
        self.pending_jumps.clear();
        self.started_loops.clear();
        let program = self.program;
        let mut result = Value::zero();
        let mut i = 0usize;
        while i < program.body.len() {
            if let Some(&target) = self.pending_jumps.get(&i) {
                match target {
                    Some(to) => i = to,
                    None => break,
                }
                if i >= program.body.len() {
                    break;
                }
            }
            let node = &program.body[i];
            let (answer, flow) = self.eval_statement(node)?;
            if !node.skips_answer {
                result = answer.clone();
                self.ctx.new_answer(result.clone());
            }
            if node.emits_output {
                self.output(result.clone());
            }
            let mut next = match flow {
                Flow::Next => i + 1,
                Flow::Jump(to) => to,
                Flow::End => break,
            };
            if node.conditional_jump && answer.is_zero() {
                next += 1;
            }
            i = next;
        }
        Ok(result)
    }

    // ── ports ───────────────────────────────────────────────────────

    fn output(&mut self, value: Value) {
        let formatted = self.ctx.format(&value);
        if let Some(handler) = &mut self.output_handler {
            handler(&value, &formatted);
        }
        self.all_outputs.push(value);
    }

    fn error(&mut self, diag: &Diagnostic) {
        match &mut self.error_handler {
            Some(handler) => handler(diag),
            None => eprintln!("{diag}"),
        }
    }

    fn close(&mut self, value: &Value) {
        let formatted = self.ctx.format(value);
        if let Some(handler) = &mut self.close_handler {
            handler(value, &formatted);
        }
    }

    fn prompt(&mut self, variable: &str) -> CalcResult<Option<Value>> {
        let input = match self.prompt_queue.pop_front() {
            Some(queued) => Some(queued),
            None => match &mut self.prompt_handler {
                Some(handler) => handler(variable),
                None => None,
            },
        };
        let Some(input) = input else {
            return Ok(None);
        };
        let program = Parser::new().parse(&input)?;
        let mut sub = Interpreter::new(&mut *self.ctx, &program);
        Ok(Some(sub.evaluate()))
    }

    // ── statements ──────────────────────────────────────────────────

    fn eval_statement(&mut self, node: &Node) -> CalcResult<(Value, Flow)> {
        match &node.kind {
            NodeKind::If {
                condition,
                then_index,
                else_index,
                end_index,
            } => self.eval_if(condition, *then_index, *else_index, *end_index),
            NodeKind::For {
                start_index,
                assignment,
                limit,
                step,
                end_index,
            } => self.eval_for(*start_index, assignment, limit, step.as_deref(), *end_index),
            NodeKind::While {
                condition,
                start_index,
                end_index,
            } => self.eval_while(condition, *start_index, *end_index),
            NodeKind::Break { loop_index } => self.eval_break(*loop_index),
            NodeKind::Jump { goto, label } => self.eval_jump(*goto, label),
            NodeKind::IfEnd | NodeKind::Next | NodeKind::WhileEnd => {
                Ok((Value::zero(), Flow::Next))
            }
            _ => Ok((self.eval_expr(node)?, Flow::Next)),
        }
    }

    fn eval_if(
        &mut self,
        condition: &Node,
        then_index: Option<usize>,
        else_index: Option<usize>,
        end_index: Option<usize>,
    ) -> CalcResult<(Value, Flow)> {
        let condition = self.eval_expr(condition)?;
        if condition.is_zero() {
            let flow = match (else_index, end_index) {
                (Some(else_at), _) => Flow::Jump(else_at),
                (None, Some(end_at)) => Flow::Jump(end_at),
                (None, None) => Flow::End,
            };
            return Ok((condition, flow));
        }
        if let Some(else_at) = else_index {
            // Falling off the Then branch must skip the Else branch.
            self.pending_jumps.insert(else_at, end_index);
        }
        let flow = match then_index {
            Some(then_at) => Flow::Jump(then_at),
            None => Flow::End,
        };
        Ok((condition, flow))
    }

    fn eval_for(
        &mut self,
        start_index: usize,
        assignment: &Node,
        limit: &Node,
        step: Option<&Node>,
        end_index: Option<usize>,
    ) -> CalcResult<(Value, Flow)> {
        let end = end_index.ok_or_else(|| syntax_error("For must have a Next"))?;
        let NodeKind::Assignment { target, .. } = &assignment.kind else {
            return Err(syntax_error("For must assign its loop variable"));
        };
        if self.started_loops.contains(&start_index) {
            let step = match step {
                Some(node) => self.eval_expr(node)?,
                None => Value::one(),
            };
            let current = self.ctx.get_variable(target)?;
            self.ctx.set_variable(target, current.plus(&step)?)?;
        } else {
            self.eval_expr(assignment)?;
            self.started_loops.insert(start_index);
        }
        let variable = self.ctx.get_variable(target)?;
        let limit = self.eval_expr(limit)?;
        if variable.lte(&limit)? {
            self.pending_jumps.insert(end, Some(start_index));
            Ok((variable, Flow::Next))
        } else {
            self.pending_jumps.remove(&end);
            Ok((variable, Flow::Jump(end)))
        }
    }

    fn eval_while(
        &mut self,
        condition: &Node,
        start_index: usize,
        end_index: Option<usize>,
    ) -> CalcResult<(Value, Flow)> {
        let end = end_index.ok_or_else(|| syntax_error("While must have a WhileEnd"))?;
        let condition = self.eval_expr(condition)?;
        if condition.is_zero() {
            self.pending_jumps.remove(&end);
            Ok((condition, Flow::Jump(end)))
        } else {
            self.pending_jumps.insert(end, Some(start_index));
            Ok((condition, Flow::Next))
        }
    }

    fn eval_break(&mut self, loop_index: usize) -> CalcResult<(Value, Flow)> {
        let end = match &self.program.body[loop_index].kind {
            NodeKind::For { end_index, .. } | NodeKind::While { end_index, .. } => *end_index,
            _ => None,
        };
        match end {
            Some(end_at) => {
                self.pending_jumps.remove(&end_at);
                Ok((Value::zero(), Flow::Jump(end_at)))
            }
            None => Ok((Value::zero(), Flow::End)),
        }
    }

    fn eval_jump(&mut self, goto: bool, label: &str) -> CalcResult<(Value, Flow)> {
        if goto {
            let target = self
                .program
                .labels
                .get(label)
                .copied()
                .ok_or_else(|| reference_error(format!("label {label} is not defined")))?;
            return Ok((Value::zero(), Flow::Jump(target)));
        }
        Ok((Value::zero(), Flow::Next))
    }

    // ── expressions ─────────────────────────────────────────────────

    fn eval_expr(&mut self, node: &Node) -> CalcResult<Value> {
        let value = self.eval_expr_inner(node)?;
        self.ctx.validate_range(&value)?;
        Ok(value)
    }

    fn eval_expr_inner(&mut self, node: &Node) -> CalcResult<Value> {
        match &node.kind {
            NodeKind::Error(diag) => Err(diag.clone()),
            NodeKind::Number(text) => self.eval_literal(text, None),
            NodeKind::Str(_) => Ok(Value::zero()),
            NodeKind::Symbol(name) => self.eval_symbol(name),
            NodeKind::Command(keyword) => Ok(self.eval_command(*keyword)),
            NodeKind::Unary { op, arg } => self.eval_unary(op, arg),
            NodeKind::Binary {
                op,
                left,
                right,
                implicity,
            } => self.eval_binary(op, left, right, *implicity),
            NodeKind::Ternary {
                op,
                left,
                middle,
                right,
            } => self.eval_ternary(op, left, middle, right),
            NodeKind::Call { callee, args } => self.eval_call(callee, args),
            NodeKind::Assignment { target, value } => self.eval_assignment(target, value),
            NodeKind::DataInput { value, frequency } => {
                self.eval_data_input(value, frequency.as_deref())
            }
            NodeKind::FrequencyPair { .. } | NodeKind::PairedDatum { .. } | NodeKind::DittoDatum => {
                Err(syntax_error("data lines must be input with DT"))
            }
            // Control statements are handled by the statement walker.
            NodeKind::If { .. }
            | NodeKind::IfEnd
            | NodeKind::For { .. }
            | NodeKind::Next
            | NodeKind::While { .. }
            | NodeKind::WhileEnd
            | NodeKind::Break { .. }
            | NodeKind::Jump { .. } => Ok(Value::zero()),
        }
    }

    fn eval_literal(&mut self, text: &str, base: Option<NumberBase>) -> CalcResult<Value> {
        let base = base.unwrap_or(self.ctx.config.mode.number_base);
        if base == NumberBase::Dec {
            self.literals.constant(text)
        } else {
            math::literal_in_base(text, base)
        }
    }

    fn eval_symbol(&mut self, name: &str) -> CalcResult<Value> {
        if name == "i" {
            return Ok(Value::complex_tagged(big(0), Repr::Integer, big(1), Repr::Integer));
        }
        if name == "Ran#" {
            return math::rand();
        }
        if let Some(value) = constant(name) {
            return value;
        }
        if let Some(value) = self.stat_summary(name) {
            return value;
        }
        self.ctx.get_variable(name)
    }

    /// The named statistical calculations, evaluated over the context's
    /// data table.
    fn stat_summary(&self, name: &str) -> Option<CalcResult<Value>> {
        let is_stat = name.starts_with("Stat");
        if !is_stat {
            return None;
        }
        let Some(table) = &self.ctx.table else {
            return Some(Err(math_error().with_detail("no table defined")));
        };
        Some(match name {
            "StatCount" => table.count(),
            "StatXSum" => table.sum_x(),
            "StatXSquareSum" => table.sum_x_square(),
            "StatXCubeSum" => table.sum_x_cube(),
            "StatXFourthPowerSum" => table.sum_x_fourth(),
            "StatYSum" => table.sum_y(),
            "StatYSquareSum" => table.sum_y_square(),
            "StatXYSum" => table.sum_xy(),
            "StatXSquareYSum" => table.sum_x_square_y(),
            "StatXMean" => table.mean_x(),
            "StatXSampleStandardDeviation" => table.sample_stddev_x(),
            "StatXPopulationStandardDeviation" => table.population_stddev_x(),
            "StatYMean" => table.mean_y(),
            "StatYSampleStandardDeviation" => table.sample_stddev_y(),
            "StatYPopulationStandardDeviation" => table.population_stddev_y(),
            "StatCoefficientA" => table.coefficient_a(),
            "StatCoefficientB" => table.coefficient_b(),
            "StatCoefficientR" => table.coefficient_r(),
            "StatMinX" => table.min_x(),
            "StatMaxX" => table.max_x(),
            "StatMinY" => table.min_y(),
            "StatMaxY" => table.max_y(),
            _ => Err(reference_error(format!("{name} is not defined"))),
        })
    }

    fn eval_command(&mut self, keyword: Keyword) -> Value {
        match keyword {
            Keyword::ClrMemory => self.ctx.init_memory(),
            Keyword::ClrStat => self.ctx.init_table(),
            Keyword::Deg => self.ctx.config.angle_unit = AngleUnit::Deg,
            Keyword::Rad => self.ctx.config.angle_unit = AngleUnit::Rad,
            Keyword::Gra => self.ctx.config.angle_unit = AngleUnit::Gra,
            Keyword::Dec => self.ctx.select_number_base(NumberBase::Dec),
            Keyword::Hex => self.ctx.select_number_base(NumberBase::Hex),
            Keyword::Bin => self.ctx.select_number_base(NumberBase::Bin),
            Keyword::Oct => self.ctx.select_number_base(NumberBase::Oct),
            _ => {}
        }
        Value::zero()
    }

    fn eval_unary(&mut self, op: &str, arg: &Node) -> CalcResult<Value> {
        // Base prefixes reinterpret the literal text; the argument is not
        // evaluated in the ambient base.
        let prefix_base = match op {
            "d" => Some(NumberBase::Dec),
            "h" => Some(NumberBase::Hex),
            "b" => Some(NumberBase::Bin),
            "o" => Some(NumberBase::Oct),
            _ => None,
        };
        if let Some(base) = prefix_base {
            let NodeKind::Number(text) = &arg.kind else {
                return Err(syntax_error(format!("{op} must be followed by a number")));
            };
            return math::literal_in_base(text, base);
        }
        let arg = self.eval_expr(arg)?;
        let unit = self.ctx.config.angle_unit;
        match op {
            "+" => Ok(arg),
            "-" => Value::zero().minus(&arg),
            "²" => arg.pow(&Value::integer(2)),
            "³" => arg.pow(&Value::integer(3)),
            "⁻¹" => arg.pow(&Value::integer(-1)),
            "!" => math::factorial(&arg),
            "°" => math::to_angle_unit(&arg, AngleUnit::Deg, unit),
            "ʳ" => math::to_angle_unit(&arg, AngleUnit::Rad, unit),
            "ᵍ" => math::to_angle_unit(&arg, AngleUnit::Gra, unit),
            "%" => arg.div(&Value::integer(100)),
            "ẋ" => self.require_table()?.estimated_x(&arg),
            "ÿ" => self.require_table()?.estimated_y(&arg),
            "ᴇ" => {
                if !arg.is_integer() || math::abs(&arg)?.gte(&Value::integer(100))? {
                    return Err(syntax_error(
                        "ᴇ must be followed by an integer with less than 3 digits",
                    ));
                }
                Value::integer(10).pow(&arg)
            }
            "″" => Ok(arg.retag(Repr::Sexagesimal)),
            _ => Ok(Value::zero()),
        }
    }

    fn require_table(&self) -> CalcResult<&Table> {
        self.ctx
            .table
            .as_ref()
            .ok_or_else(|| math_error().with_detail("no table defined"))
    }

    fn eval_binary(
        &mut self,
        op: &str,
        left: &Node,
        right: &Node,
        implicity: Implicity,
    ) -> CalcResult<Value> {
        let left = self.eval_expr(left)?;
        let right = self.eval_expr(right)?;
        match op {
            "+" => left.plus(&right),
            "-" => left.minus(&right),
            "*" => {
                let product = left.times(&right)?;
                // A product of two parenthesized sexagesimal literals
                // reads as scaling, not as an angle.
                if implicity == Implicity::ParenthesizedSexagesimal {
                    return Ok(product.retag(Repr::Decimal));
                }
                Ok(product)
            }
            "/" => left.div(&right),
            "=" => Ok(bool_value(left.eq_value(&right))),
            "≠" => Ok(bool_value(!left.eq_value(&right))),
            ">" => Ok(bool_value(left.gt(&right)?)),
            "≥" => Ok(bool_value(left.gte(&right)?)),
            "<" => Ok(bool_value(left.lt(&right)?)),
            "≤" => Ok(bool_value(left.lte(&right)?)),
            "^" => {
                if left.is_zero() && right.is_zero() {
                    return Err(math_error());
                }
                left.pow(&right)
            }
            "ˣ√" => {
                if left.is_zero() {
                    return Err(math_error());
                }
                right.root(&left)
            }
            "choose" => math::ncr(&left, &right),
            "permute" => math::npr(&left, &right),
            "∠" => {
                let theta = math::to_angle_unit(&right, self.ctx.config.angle_unit, AngleUnit::Rad)?;
                math::polar_complex(&left, &theta)
            }
            "mod" => math::modulo(&left, &right),
            "or" => math::bit_or(&left, &right),
            "and" => math::bit_and(&left, &right),
            "xnor" => math::bit_xnor(&left, &right),
            "xor" => math::bit_xor(&left, &right),
            "⌟" => left.over(&right),
            "″" => Ok(left
                .plus(&right.div(&Value::integer(60))?)?
                .retag(Repr::Sexagesimal)),
            _ => Ok(Value::zero()),
        }
    }

    fn eval_ternary(
        &mut self,
        op: &str,
        left: &Node,
        middle: &Node,
        right: &Node,
    ) -> CalcResult<Value> {
        let left = self.eval_expr(left)?;
        let middle = self.eval_expr(middle)?;
        let right = self.eval_expr(right)?;
        match op {
            "⌟" => {
                let fraction = middle.over(&right)?;
                let mixed = left.plus(&fraction)?;
                if (left.is_fraction() || left.is_integer()) && fraction.is_fraction() {
                    return Ok(mixed.retag(Repr::Fraction));
                }
                Ok(mixed)
            }
            "″" => {
                let minutes = middle.div(&Value::integer(60))?;
                let seconds = right.div(&Value::integer(3600))?;
                Ok(left.plus(&minutes)?.plus(&seconds)?.retag(Repr::Sexagesimal))
            }
            _ => Ok(Value::zero()),
        }
    }

    fn eval_assignment(&mut self, target: &str, value: &Node) -> CalcResult<Value> {
        let is_prompt = matches!(&value.kind, NodeKind::Symbol(name) if name == INPUT_PROMPT);
        let result = if is_prompt {
            match self.prompt(target)? {
                Some(value) => value,
                // No answer: the assignment is skipped and the prior value
                // stands.
                None => return self.ctx.get_variable(target),
            }
        } else {
            self.eval_expr(value)?
        };
        match target {
            "M+" => {
                let memory = self.ctx.get_variable("M")?;
                self.ctx.set_variable("M", memory.plus(&result)?)?;
            }
            "M-" => {
                let memory = self.ctx.get_variable("M")?;
                self.ctx.set_variable("M", memory.minus(&result)?)?;
            }
            _ => self.ctx.set_variable(target, result.clone())?,
        }
        Ok(result)
    }

    fn eval_data_input(&mut self, value: &Node, frequency: Option<&Node>) -> CalcResult<Value> {
        let paired = self.require_table().map_err(|_| syntax_error("no table defined"))?.is_paired();
        let values = match &value.kind {
            NodeKind::DittoDatum => self
                .require_table()?
                .last_values()
                .ok_or_else(|| math_error().with_detail("no previous data line"))?,
            NodeKind::PairedDatum { primary, secondary } => {
                if !paired {
                    return Err(syntax_error(
                        "cannot input paired data into a single variable table",
                    ));
                }
                let x = match primary {
                    Some(node) => self.eval_expr(node)?,
                    None => Value::zero(),
                };
                let y = self.eval_expr(secondary)?;
                vec![x, y]
            }
            _ => {
                let x = self.eval_expr(value)?;
                if paired {
                    vec![x, Value::zero()]
                } else {
                    vec![x]
                }
            }
        };
        let frequency = match frequency {
            Some(node) => {
                if self.ctx.config.frequency == FrequencySetting::FreqOff {
                    return Err(syntax_error("frequency input is not enabled"));
                }
                self.eval_expr(node)?
            }
            None => unit_frequency(),
        };
        let table = self
            .ctx
            .table
            .as_mut()
            .ok_or_else(|| syntax_error("no table defined"))?;
        let line = table.new_line(&values, frequency)?;
        Ok(from_usize(line))
    }

    // ── function calls ──────────────────────────────────────────────

    fn eval_call(&mut self, callee: &str, args: &[Node]) -> CalcResult<Value> {
        let func =
            builtin(callee).ok_or_else(|| reference_error(format!("{callee} is not defined")))?;
        if func.is_expressional() {
            return self.eval_expressional(callee, args);
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg)?);
        }
        func.call(self.ctx, &values)
    }

    /// Functions whose first argument is an expression re-evaluated with
    /// `X` bound: numeric differentiation, integration, series sum and
    /// product.
    fn eval_expressional(&mut self, callee: &str, args: &[Node]) -> CalcResult<Value> {
        let expr = &args[0];
        match callee {
            "d/dx" => {
                let at = self.eval_expr(&args[1])?;
                let h = match args.get(2) {
                    Some(node) => self.eval_expr(node)?,
                    None => Value::from_f64(1e-6, Repr::Decimal)?,
                };
                if !h.is_positive() {
                    return Err(argument_error("step must be positive"));
                }
                // Central difference, kept in the exact domain so the
                // sample points sit exactly at ±h.
                let upper = self.eval_with_x(expr, at.plus(&h)?)?;
                let lower = self.eval_with_x(expr, at.minus(&h)?)?;
                upper.minus(&lower)?.div(&h.plus(&h)?)
            }
            "∫" => {
                let low = self.eval_expr(&args[1])?.to_f64()?;
                let high = self.eval_expr(&args[2])?.to_f64()?;
                let tolerance = match args.get(3) {
                    Some(node) => self.eval_expr(node)?.to_f64()?,
                    None => 1e-9,
                };
                let result = self.integrate(expr, low, high, tolerance.abs().max(1e-12))?;
                Value::from_f64(result, Repr::Decimal)
            }
            "Σ" | "Π" => {
                let start = self.eval_expr(&args[1])?;
                let end = self.eval_expr(&args[2])?;
                if start.gt(&end)? {
                    return Err(argument_error(
                        "start index must be less than or equal to end index",
                    ));
                }
                let (start, end) = match (start.as_i64(), end.as_i64()) {
                    (Some(start), Some(end)) => (start, end),
                    _ => return Err(math_error()),
                };
                let mut accumulated = if callee == "Σ" {
                    Value::zero()
                } else {
                    Value::one()
                };
                for k in start..=end {
                    let term = self.eval_with_x(expr, Value::integer(k))?;
                    accumulated = if callee == "Σ" {
                        accumulated.plus(&term)?
                    } else {
                        accumulated.times(&term)?
                    };
                }
                Ok(accumulated)
            }
            _ => Err(math_error()),
        }
    }

    fn eval_with_x(&mut self, expr: &Node, x: Value) -> CalcResult<Value> {
        let saved = self.ctx.get_variable("X")?;
        self.ctx.set_variable("X", x)?;
        let result = self.eval_expr(expr);
        self.ctx.set_variable("X", saved)?;
        result
    }

    fn eval_at(&mut self, expr: &Node, x: f64) -> CalcResult<f64> {
        self.eval_with_x(expr, Value::from_f64(x, Repr::Decimal)?)?
            .to_f64()
    }

    /// Adaptive Simpson quadrature.
    fn integrate(&mut self, expr: &Node, a: f64, b: f64, tolerance: f64) -> CalcResult<f64> {
        let fa = self.eval_at(expr, a)?;
        let fb = self.eval_at(expr, b)?;
        let m = 0.5 * (a + b);
        let fm = self.eval_at(expr, m)?;
        let whole = (b - a) / 6.0 * (fa + 4.0 * fm + fb);
        let result = self.simpson_step(expr, a, b, fa, fb, fm, whole, tolerance, 20)?;
        if !result.is_finite() {
            return Err(math_error());
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn simpson_step(
        &mut self,
        expr: &Node,
        a: f64,
        b: f64,
        fa: f64,
        fb: f64,
        fm: f64,
        whole: f64,
        tolerance: f64,
        depth: usize,
    ) -> CalcResult<f64> {
        let m = 0.5 * (a + b);
        let lm = 0.5 * (a + m);
        let rm = 0.5 * (m + b);
        let flm = self.eval_at(expr, lm)?;
        let frm = self.eval_at(expr, rm)?;
        let left = (m - a) / 6.0 * (fa + 4.0 * flm + fm);
        let right = (b - m) / 6.0 * (fm + 4.0 * frm + fb);
        let split = left + right;
        if depth == 0 || (split - whole).abs() <= 15.0 * tolerance {
            return Ok(split + (split - whole) / 15.0);
        }
        let half = tolerance / 2.0;
        let lower = self.simpson_step(expr, a, m, fa, fm, flm, left, half, depth - 1)?;
        let upper = self.simpson_step(expr, m, b, fm, fb, frm, right, half, depth - 1)?;
        Ok(lower + upper)
    }
}

fn bool_value(condition: bool) -> Value {
    if condition {
        Value::one()
    } else {
        Value::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModeKind;
    use crate::error::ErrorKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn eval(source: &str) -> String {
        let mut ctx = Context::new();
        eval_with(source, &mut ctx)
    }

    fn eval_with(source: &str, ctx: &mut Context) -> String {
        let program = Parser::new().parse(source).unwrap();
        let mut interpreter = Interpreter::new(ctx, &program);
        let result = interpreter.evaluate();
        drop(interpreter);
        ctx.format(&result)
    }

    #[test]
    fn arithmetic_and_answer() {
        assert_eq!(eval("1 + 2 * 3"), "7");
        assert_eq!(eval("5 → A: A² + 1"), "26");
        assert_eq!(eval("3 + 4: Ans * 2"), "14");
        assert_eq!(eval("1: 2: Ans + PreAns"), "3");
    }

    #[test]
    fn conditional_skip_separator() {
        assert_eq!(eval("0 ⇒ 7: 9"), "9");
        assert_eq!(eval("1 ⇒ 7"), "7");
    }

    #[test]
    fn if_branches() {
        assert_eq!(eval("If 0: Then 1: Else 2: IfEnd"), "2");
        assert_eq!(eval("If 1: Then 1: Else 2: IfEnd"), "1");
        // Without an else, a false condition falls to IfEnd.
        assert_eq!(eval("If 0: Then 1: IfEnd: 9"), "9");
    }

    #[test]
    fn for_loop_accumulates() {
        assert_eq!(eval("0 → B: For 1 → A To 5: B + A → B: Next: B"), "15");
        assert_eq!(eval("0 → B: For 1 → A To 9 Step 2: B + A → B: Next: B"), "25");
    }

    #[test]
    fn while_loop_and_break() {
        assert_eq!(eval("1 → A: While A < 100: 2A → A: WhileEnd: A"), "128");
        assert_eq!(
            eval("0 → A: While 1: A + 1 → A: A = 3 ⇒ Break: WhileEnd: A"),
            "3"
        );
    }

    #[test]
    fn goto_skips_division_by_zero() {
        assert_eq!(eval("5: Goto 1: 1/0: Lbl 1"), "5");
    }

    #[test]
    fn goto_unknown_label_is_an_error() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = Context::new();
        let program = Parser::new().parse("Goto 9").unwrap();
        let mut interpreter = Interpreter::new(&mut ctx, &program);
        let sink = Rc::clone(&errors);
        interpreter.on_error(move |diag| sink.borrow_mut().push(diag.kind));
        let result = interpreter.evaluate();
        assert!(result.is_error());
        assert_eq!(errors.borrow().as_slice(), &[ErrorKind::Reference]);
    }

    #[test]
    fn recovered_syntax_error_raises_when_executed() {
        assert_eq!(eval("If 1: Then If 2: 5"), "NaN");
        // ... but not when the jump routes around it.
        assert_eq!(eval("Goto 1: ): Lbl 1: 8"), "8");
    }

    #[test]
    fn output_port_and_collection() {
        let outputs = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = Context::new();
        let program = Parser::new().parse("1◢ 2◢ 3").unwrap();
        let mut interpreter = Interpreter::new(&mut ctx, &program);
        let sink = Rc::clone(&outputs);
        interpreter.on_output(move |_, text| sink.borrow_mut().push(text.to_string()));
        interpreter.evaluate();
        assert_eq!(outputs.borrow().as_slice(), &["1", "2"]);
        assert_eq!(interpreter.formatted_outputs(), vec!["1", "2", "3"]);
    }

    #[test]
    fn close_port_fires_with_the_final_value() {
        let closed = Rc::new(RefCell::new(String::new()));
        let mut ctx = Context::new();
        let program = Parser::new().parse("6 * 7").unwrap();
        let mut interpreter = Interpreter::new(&mut ctx, &program);
        let sink = Rc::clone(&closed);
        interpreter.on_close(move |_, text| *sink.borrow_mut() = text.to_string());
        interpreter.evaluate();
        assert_eq!(&*closed.borrow(), "42");
    }

    #[test]
    fn queued_input_takes_priority_over_prompt_handler() {
        let mut ctx = Context::new();
        let program = Parser::new().parse("? → A: A²").unwrap();
        let mut interpreter = Interpreter::new(&mut ctx, &program);
        interpreter.queue_prompt_input("5");
        interpreter.on_prompt(|_| Some("999".to_string()));
        let result = interpreter.evaluate();
        drop(interpreter);
        assert_eq!(ctx.format(&result), "25");
    }

    #[test]
    fn null_prompt_keeps_the_prior_value() {
        assert_eq!(eval("3 → A: ? → A: A"), "3");
    }

    #[test]
    fn memory_accumulation_targets() {
        assert_eq!(eval("5 → M: 3 → M+: M"), "8");
        assert_eq!(eval("5 → M: 3 → M-: M"), "2");
    }

    #[test]
    fn commands_switch_config() {
        assert_eq!(eval("Rad: sin(pi ⌟ 2)"), "1");
        assert_eq!(eval("Bin: 1 + 1"), "10");
        assert_eq!(eval("Bin: Dec: 10 + 1"), "11");
    }

    #[test]
    fn base_prefixes_override_the_literal_base() {
        assert_eq!(eval("b1010 + d2"), "12");
        assert_eq!(eval("h10 + o10"), "24");
    }

    #[test]
    fn data_input_and_summaries() {
        let mut ctx = Context::new();
        ctx.set_mode(ModeKind::Sd);
        assert_eq!(eval_with("1 DT: 2 DT: 3 DT: StatXMean", &mut ctx), "2");
        assert_eq!(eval_with("StatCount", &mut ctx), "3");
        // Data input without a table is a syntax error.
        assert_eq!(eval("1 DT"), "NaN");
    }

    #[test]
    fn regression_and_estimation() {
        let mut ctx = Context::new();
        ctx.set_mode(ModeKind::Reg);
        assert_eq!(
            eval_with("1,3 DT: 2,5 DT: 3,7 DT: StatCoefficientB", &mut ctx),
            "2"
        );
        assert_eq!(eval_with("StatCoefficientA", &mut ctx), "1");
        assert_eq!(eval_with("10ÿ", &mut ctx), "21");
        assert_eq!(eval_with("21ẋ", &mut ctx), "10");
    }

    #[test]
    fn ditto_datum_repeats_the_last_line() {
        let mut ctx = Context::new();
        ctx.set_mode(ModeKind::Sd);
        assert_eq!(eval_with("4 DT: ;2 DT: StatXSum", &mut ctx), "12");
    }

    #[test]
    fn frequency_respects_the_config() {
        let mut ctx = Context::new();
        ctx.set_mode(ModeKind::Sd);
        ctx.config.frequency = FrequencySetting::FreqOff;
        assert_eq!(eval_with("4;3 DT", &mut ctx), "NaN");
    }

    #[test]
    fn derivative_sum_product_and_integral() {
        assert_eq!(eval("d/dx(X², 3)"), "6");
        assert_eq!(eval("Σ(X, 1, 10)"), "55");
        assert_eq!(eval("Π(X, 1, 5)"), "120");
        assert_eq!(eval("∫(X², 0, 3)"), "9");
        assert_eq!(eval("Σ(X, 5, 1)"), "NaN");
    }

    #[test]
    fn expressional_functions_restore_x() {
        let mut ctx = Context::new();
        assert_eq!(eval_with("7 → X: Σ(X, 1, 3): X", &mut ctx), "7");
    }

    #[test]
    fn mixed_number_and_sexagesimal_evaluation() {
        assert_eq!(eval("3⌟1⌟4 + 1⌟2⌟3"), "4⌟11⌟12");
        assert_eq!(eval("2″20″30 + 0″39″30"), "3″0″0");
        assert_eq!(eval("2″20 * 3.5"), "8″10″0");
    }

    #[test]
    fn implicit_multiplication_under_division() {
        let mut ctx = Context::new();
        assert_eq!(eval_with("3 → A: 6/2A", &mut ctx), "1");
    }

    #[test]
    fn postfix_operator_chain() {
        assert_eq!(eval("5!"), "120");
        assert_eq!(eval("-2!"), "-2");
        assert_eq!(eval("70!"), "NaN");
        assert_eq!(eval("25%"), "0.25");
        assert_eq!(eval("4² + 2³"), "24");
    }
}
