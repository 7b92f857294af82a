//! The calculation context — variable memory, mode, and data table.
//!
//! The context is consumed by the interpreter, not owned by it: the
//! interpreter reads and writes named variables and mode flags through it
//! but does not manage its lifecycle, so a context can live across many
//! program runs (the REPL keeps one).

use std::collections::HashMap;

use crate::config::{CalculationMode, Config, ModeKind, NumberBase};
use crate::error::{reference_error, CalcResult, Diagnostic, ErrorKind};
use crate::format;
use crate::table::Table;
use crate::value::{Field, Value};

pub struct Context {
    variables: HashMap<String, Value>,
    pub config: Config,
    pub table: Option<Table>,
    /// Where `Pol(`/`Rec(` store their second result (`Y`, or `F` in the
    /// modes that repurpose `Y`).
    pub secondary_value_variable: &'static str,
}

impl Context {
    pub fn new() -> Self {
        let mut ctx = Self {
            variables: HashMap::new(),
            config: Config::default(),
            table: None,
            secondary_value_variable: "Y",
        };
        ctx.init_memory();
        ctx
    }

    /// Look up a variable. Unknown names are a reference error.
    pub fn get_variable(&self, name: &str) -> CalcResult<Value> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| reference_error(format!("{name} is not defined")))
    }

    /// Rebind a variable; the name must already exist in memory.
    pub fn set_variable(&mut self, name: &str, value: Value) -> CalcResult<()> {
        if !self.variables.contains_key(name) {
            return Err(reference_error(format!("{name} is not defined")));
        }
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    fn init_variable_memory(&mut self) {
        for name in ["A", "B", "C", "D", "E", "F", "X", "Y"] {
            self.variables.insert(name.to_string(), Value::zero());
        }
    }

    fn init_answer_memory(&mut self) {
        self.variables.insert("Ans".to_string(), Value::zero());
        self.variables.insert("PreAns".to_string(), Value::zero());
    }

    fn init_independent_memory(&mut self) {
        self.variables.insert("M".to_string(), Value::zero());
    }

    /// `ClrMemory`.
    pub fn init_memory(&mut self) {
        self.init_variable_memory();
        self.init_answer_memory();
        self.init_independent_memory();
    }

    /// `ClrStat`.
    pub fn init_table(&mut self) {
        if self.config.mode.table_mode() {
            self.table = self.config.mode.create_table();
        } else {
            self.table = None;
        }
    }

    pub fn new_answer(&mut self, value: Value) {
        let previous = self
            .variables
            .insert("Ans".to_string(), value)
            .unwrap_or_else(Value::zero);
        self.variables.insert("PreAns".to_string(), previous);
    }

    pub fn set_mode(&mut self, kind: ModeKind) {
        self.config.mode = CalculationMode::new(kind);
        self.init_table();
    }

    pub fn select_number_base(&mut self, base: NumberBase) {
        self.config.mode.number_base = base;
    }

    /// Raise a range error when a real value leaves the mode's magnitude
    /// or base-width range.
    pub fn validate_range(&self, value: &Value) -> CalcResult<()> {
        if value.field() != Field::Real {
            return Ok(());
        }
        if !self.config.mode.validate_range(value) {
            return Err(Diagnostic::new(ErrorKind::Range).with_detail("value is out of range"));
        }
        Ok(())
    }

    pub fn format(&self, value: &Value) -> String {
        format::format(value, self)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_initialization() {
        let ctx = Context::new();
        assert_eq!(ctx.get_variable("A").unwrap(), Value::zero());
        assert_eq!(ctx.get_variable("Ans").unwrap(), Value::zero());
        assert!(ctx.get_variable("Z").is_err());
    }

    #[test]
    fn set_requires_existing_name() {
        let mut ctx = Context::new();
        assert!(ctx.set_variable("A", Value::integer(5)).is_ok());
        assert_eq!(ctx.get_variable("A").unwrap(), Value::integer(5));
        assert!(ctx.set_variable("Q", Value::integer(5)).is_err());
    }

    #[test]
    fn answer_rotation() {
        let mut ctx = Context::new();
        ctx.new_answer(Value::integer(1));
        ctx.new_answer(Value::integer(2));
        assert_eq!(ctx.get_variable("Ans").unwrap(), Value::integer(2));
        assert_eq!(ctx.get_variable("PreAns").unwrap(), Value::integer(1));
    }

    #[test]
    fn mode_switch_creates_table() {
        let mut ctx = Context::new();
        assert!(ctx.table.is_none());
        ctx.set_mode(ModeKind::Sd);
        assert!(matches!(ctx.table, Some(Table::Single(_))));
        ctx.set_mode(ModeKind::Comp);
        assert!(ctx.table.is_none());
    }

    #[test]
    fn range_violation_is_a_range_error() {
        let mut ctx = Context::new();
        ctx.set_mode(ModeKind::Base);
        ctx.select_number_base(NumberBase::Bin);
        let err = ctx.validate_range(&Value::integer(513)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Range);
        assert!(ctx.validate_range(&Value::integer(511)).is_ok());
    }
}
