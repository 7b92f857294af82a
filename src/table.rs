//! Statistics data tables and summary calculations.
//!
//! SD mode collects single-variable lines, REG mode paired-variable lines;
//! both carry a frequency per line. The summary calculations here are the
//! formula layer the named statistical symbols evaluate against.

use crate::error::{math_error, CalcResult};
use crate::math;
use crate::value::{Repr, Value};

/// The table holds at most this many data lines.
pub const TABLE_CAPACITY: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regression {
    Unknown,
    SingleVar,
    Linear,
}

#[derive(Debug, Clone)]
pub struct SingleVarLine {
    pub x: Value,
    pub frequency: Value,
}

#[derive(Debug, Clone)]
pub struct PairedVarLine {
    pub x: Value,
    pub y: Value,
    pub frequency: Value,
}

#[derive(Debug, Clone)]
pub enum Table {
    Single(Vec<SingleVarLine>),
    Paired {
        lines: Vec<PairedVarLine>,
        regression: Regression,
    },
}

impl Table {
    pub fn single() -> Self {
        Self::Single(Vec::new())
    }

    pub fn paired(regression: Regression) -> Self {
        Self::Paired {
            lines: Vec::new(),
            regression,
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Paired { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(lines) => lines.len(),
            Self::Paired { lines, .. } => lines.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a data line and return its 1-based line number.
    pub fn new_line(&mut self, values: &[Value], frequency: Value) -> CalcResult<usize> {
        if self.len() >= TABLE_CAPACITY {
            return Err(math_error().with_detail("data table is full"));
        }
        match self {
            Self::Single(lines) => {
                let x = values.first().cloned().unwrap_or_else(Value::zero);
                lines.push(SingleVarLine { x, frequency });
            }
            Self::Paired { lines, .. } => {
                let x = values.first().cloned().unwrap_or_else(Value::zero);
                let y = values.get(1).cloned().unwrap_or_else(Value::zero);
                lines.push(PairedVarLine { x, y, frequency });
            }
        }
        Ok(self.len())
    }

    /// The previous line's values, for the ditto datum (`;freq DT`).
    pub fn last_values(&self) -> Option<Vec<Value>> {
        match self {
            Self::Single(lines) => lines.last().map(|line| vec![line.x.clone()]),
            Self::Paired { lines, .. } => lines
                .last()
                .map(|line| vec![line.x.clone(), line.y.clone()]),
        }
    }

    fn weighted(&self) -> Vec<(Value, Value, Value)> {
        match self {
            Self::Single(lines) => lines
                .iter()
                .map(|line| (line.x.clone(), Value::zero(), line.frequency.clone()))
                .collect(),
            Self::Paired { lines, .. } => lines
                .iter()
                .map(|line| (line.x.clone(), line.y.clone(), line.frequency.clone()))
                .collect(),
        }
    }

    fn require_data(&self) -> CalcResult<()> {
        if self.is_empty() {
            return Err(math_error().with_detail("statistics table is empty"));
        }
        Ok(())
    }

    // ── sums and counts ─────────────────────────────────────────────

    pub fn count(&self) -> CalcResult<Value> {
        self.require_data()?;
        let mut n = Value::zero();
        for (_, _, f) in self.weighted() {
            n = n.plus(&f)?;
        }
        Ok(n)
    }

    pub fn sum_x(&self) -> CalcResult<Value> {
        self.weighted_sum(|x, _| Ok(x.clone()))
    }

    pub fn sum_x_square(&self) -> CalcResult<Value> {
        self.weighted_sum(|x, _| x.times(x))
    }

    pub fn sum_x_cube(&self) -> CalcResult<Value> {
        self.weighted_sum(|x, _| x.times(x)?.times(x))
    }

    pub fn sum_x_fourth(&self) -> CalcResult<Value> {
        self.weighted_sum(|x, _| x.times(x)?.times(x)?.times(x))
    }

    pub fn sum_y(&self) -> CalcResult<Value> {
        self.weighted_sum(|_, y| Ok(y.clone()))
    }

    pub fn sum_y_square(&self) -> CalcResult<Value> {
        self.weighted_sum(|_, y| y.times(y))
    }

    pub fn sum_xy(&self) -> CalcResult<Value> {
        self.weighted_sum(|x, y| x.times(y))
    }

    pub fn sum_x_square_y(&self) -> CalcResult<Value> {
        self.weighted_sum(|x, y| x.times(x)?.times(y))
    }

    fn weighted_sum(
        &self,
        term: impl Fn(&Value, &Value) -> CalcResult<Value>,
    ) -> CalcResult<Value> {
        self.require_data()?;
        let mut sum = Value::zero();
        for (x, y, f) in self.weighted() {
            sum = sum.plus(&term(&x, &y)?.times(&f)?)?;
        }
        Ok(sum)
    }

    // ── means and deviations ────────────────────────────────────────

    pub fn mean_x(&self) -> CalcResult<Value> {
        self.sum_x()?.div(&self.count()?)
    }

    pub fn mean_y(&self) -> CalcResult<Value> {
        self.sum_y()?.div(&self.count()?)
    }

    /// Population standard deviation of x: √(Σfx²/n − mean²).
    pub fn population_stddev_x(&self) -> CalcResult<Value> {
        let mean = self.mean_x()?;
        let variance = self
            .sum_x_square()?
            .div(&self.count()?)?
            .minus(&mean.times(&mean)?)?;
        math::sqrt(&variance)
    }

    /// Sample standard deviation of x: √((Σfx² − n·mean²)/(n−1)).
    pub fn sample_stddev_x(&self) -> CalcResult<Value> {
        self.sample_stddev(self.sum_x_square()?, self.mean_x()?)
    }

    pub fn population_stddev_y(&self) -> CalcResult<Value> {
        let mean = self.mean_y()?;
        let variance = self
            .sum_y_square()?
            .div(&self.count()?)?
            .minus(&mean.times(&mean)?)?;
        math::sqrt(&variance)
    }

    pub fn sample_stddev_y(&self) -> CalcResult<Value> {
        self.sample_stddev(self.sum_y_square()?, self.mean_y()?)
    }

    fn sample_stddev(&self, square_sum: Value, mean: Value) -> CalcResult<Value> {
        let n = self.count()?;
        let denominator = n.minus(&Value::one())?;
        if denominator.is_zero() {
            return Err(math_error().with_detail("statistics table is too short"));
        }
        let numerator = square_sum.minus(&n.times(&mean.times(&mean)?)?)?;
        math::sqrt(&numerator.div(&denominator)?)
    }

    // ── extrema ─────────────────────────────────────────────────────

    pub fn min_x(&self) -> CalcResult<Value> {
        self.extremum(|x, _| x.clone(), false)
    }

    pub fn max_x(&self) -> CalcResult<Value> {
        self.extremum(|x, _| x.clone(), true)
    }

    pub fn min_y(&self) -> CalcResult<Value> {
        self.extremum(|_, y| y.clone(), false)
    }

    pub fn max_y(&self) -> CalcResult<Value> {
        self.extremum(|_, y| y.clone(), true)
    }

    fn extremum(
        &self,
        pick: impl Fn(&Value, &Value) -> Value,
        maximum: bool,
    ) -> CalcResult<Value> {
        self.require_data()?;
        let mut best: Option<Value> = None;
        for (x, y, _) in self.weighted() {
            let candidate = pick(&x, &y);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    let replace = if maximum {
                        candidate.gt(&current)?
                    } else {
                        candidate.lt(&current)?
                    };
                    if replace {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
        Ok(best.unwrap_or_else(Value::zero))
    }

    // ── linear regression (y = A + Bx) ──────────────────────────────

    fn sxx(&self) -> CalcResult<Value> {
        let sum_x = self.sum_x()?;
        self.sum_x_square()?
            .minus(&sum_x.times(&sum_x)?.div(&self.count()?)?)
    }

    fn syy(&self) -> CalcResult<Value> {
        let sum_y = self.sum_y()?;
        self.sum_y_square()?
            .minus(&sum_y.times(&sum_y)?.div(&self.count()?)?)
    }

    fn sxy(&self) -> CalcResult<Value> {
        self.sum_xy()?
            .minus(&self.sum_x()?.times(&self.sum_y()?)?.div(&self.count()?)?)
    }

    pub fn coefficient_b(&self) -> CalcResult<Value> {
        self.require_paired()?;
        self.sxy()?.div(&self.sxx()?)
    }

    pub fn coefficient_a(&self) -> CalcResult<Value> {
        let b = self.coefficient_b()?;
        self.mean_y()?.minus(&b.times(&self.mean_x()?)?)
    }

    pub fn coefficient_r(&self) -> CalcResult<Value> {
        self.require_paired()?;
        let denominator = math::sqrt(&self.sxx()?.times(&self.syy()?)?)?;
        self.sxy()?.div(&denominator)
    }

    /// Estimated x for a given y, via the inverted regression line.
    pub fn estimated_x(&self, y: &Value) -> CalcResult<Value> {
        let a = self.coefficient_a()?;
        let b = self.coefficient_b()?;
        y.minus(&a)?.div(&b)
    }

    /// Estimated y for a given x.
    pub fn estimated_y(&self, x: &Value) -> CalcResult<Value> {
        let a = self.coefficient_a()?;
        let b = self.coefficient_b()?;
        a.plus(&b.times(x)?)
    }

    fn require_paired(&self) -> CalcResult<()> {
        self.require_data()?;
        if !self.is_paired() {
            return Err(math_error().with_detail("regression needs paired data"));
        }
        if self.len() < 2 {
            return Err(math_error().with_detail("statistics table is too short"));
        }
        Ok(())
    }
}

/// Frequency default for a plain `DT` line.
pub fn unit_frequency() -> Value {
    Value::real(crate::value::big(1), Repr::Integer)
}
