//! Calculator values — a two-axis tag over exact rational arithmetic.
//!
//! Every value carries an algebraic shape (`Field`) and one numeric
//! representation tag per scalar component (`Repr`). The raw arithmetic is
//! delegated to the exact rational kernel (`num-rational`); this module
//! adds the tagging, the per-operator representation propagation rules,
//! and the complex decomposition arithmetic the calculator performs in
//! terms of real components.

use std::collections::HashMap;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};

use crate::error::{math_error, syntax_error, CalcResult, Diagnostic};

/// The algebraic shape of a value. `Vector`, `Matrix` and `DummyVariable`
/// belong to external numeric routines and are reserved here so the data
/// model matches the system this crate embeds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Real,
    Complex,
    Vector,
    Matrix,
    DummyVariable,
    Multi,
    Error,
}

/// The display-relevant numeric kind of a scalar component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
    Integer,
    Decimal,
    Fraction,
    Sexagesimal,
}

/// Sexagesimal display stops being readable past this magnitude and the
/// tag collapses to decimal.
fn sexagesimal_limit() -> BigRational {
    BigRational::from_integer(BigInt::from(10_000_000))
}

/// A fraction is only displayed while numerator and denominator digits
/// together stay under this cap.
const FRACTION_DIGIT_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    field: Field,
    re: BigRational,
    im: BigRational,
    re_repr: Repr,
    im_repr: Repr,
    /// Present only for `Multi` values (e.g. the quotient that rides along
    /// with a `mod` remainder).
    additional: Vec<Value>,
}

/// Re-validate a representation tag against the component it describes:
/// a fraction whose reduced denominator is 1 collapses to integer, an
/// unreadably long fraction and an oversized sexagesimal collapse to
/// decimal, and the integer/decimal tags track integrality.
fn agree(v: &BigRational, repr: Repr) -> Repr {
    match repr {
        Repr::Fraction => {
            if v.denom().is_one() {
                Repr::Integer
            } else if fraction_digits(v) >= FRACTION_DIGIT_CAP {
                Repr::Decimal
            } else {
                Repr::Fraction
            }
        }
        Repr::Sexagesimal => {
            if v.abs() >= sexagesimal_limit() {
                Repr::Decimal
            } else {
                Repr::Sexagesimal
            }
        }
        Repr::Integer | Repr::Decimal => {
            if v.denom().is_one() {
                Repr::Integer
            } else {
                Repr::Decimal
            }
        }
    }
}

fn fraction_digits(v: &BigRational) -> usize {
    let numer = v.numer().abs().to_string();
    let denom = v.denom().to_string();
    numer.len() + denom.len()
}

impl Value {
    pub fn real(re: BigRational, repr: Repr) -> Self {
        let re_repr = agree(&re, repr);
        Self {
            field: Field::Real,
            re,
            im: BigRational::zero(),
            re_repr,
            im_repr: re_repr,
            additional: Vec::new(),
        }
    }

    /// A complex value collapses to real when the imaginary part is zero.
    pub fn complex(re: BigRational, im: BigRational) -> Self {
        Self::complex_tagged(re, Repr::Decimal, im, Repr::Decimal)
    }

    pub fn complex_tagged(re: BigRational, re_repr: Repr, im: BigRational, im_repr: Repr) -> Self {
        if im.is_zero() {
            return Self::real(re, re_repr);
        }
        Self {
            field: Field::Complex,
            re_repr: agree(&re, re_repr),
            im_repr: agree(&im, im_repr),
            re,
            im,
            additional: Vec::new(),
        }
    }

    pub fn integer(n: i64) -> Self {
        Self::real(BigRational::from_integer(BigInt::from(n)), Repr::Integer)
    }

    pub fn from_bigint(n: BigInt) -> Self {
        Self::real(BigRational::from_integer(n), Repr::Integer)
    }

    pub fn from_f64(f: f64, repr: Repr) -> CalcResult<Self> {
        let rational = BigRational::from_float(f).ok_or_else(math_error)?;
        Ok(Self::real(rational, repr))
    }

    /// The error sentinel, displayed as `NaN`.
    pub fn error() -> Self {
        Self {
            field: Field::Error,
            re: BigRational::zero(),
            im: BigRational::zero(),
            re_repr: Repr::Decimal,
            im_repr: Repr::Decimal,
            additional: Vec::new(),
        }
    }

    pub fn multi(primary: Value, additional: Vec<Value>) -> Self {
        Self {
            field: Field::Multi,
            re: primary.re,
            im: primary.im,
            re_repr: primary.re_repr,
            im_repr: primary.im_repr,
            additional,
        }
    }

    pub fn zero() -> Self {
        Self::integer(0)
    }

    pub fn one() -> Self {
        Self::integer(1)
    }

    /// The same components under a different representation tag
    /// (re-validated on construction as always).
    pub fn retag(&self, repr: Repr) -> Self {
        if self.is_complex() {
            Self::complex_tagged(self.re.clone(), repr, self.im.clone(), repr)
        } else {
            Self::real(self.re.clone(), repr)
        }
    }

    // ── accessors ───────────────────────────────────────────────────

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn repr(&self) -> Repr {
        self.re_repr
    }

    pub fn im_repr(&self) -> Repr {
        self.im_repr
    }

    pub fn re(&self) -> &BigRational {
        &self.re
    }

    pub fn im(&self) -> &BigRational {
        &self.im
    }

    pub fn additional(&self) -> &[Value] {
        &self.additional
    }

    pub fn is_error(&self) -> bool {
        self.field == Field::Error
    }

    pub fn is_real(&self) -> bool {
        matches!(self.field, Field::Real | Field::Multi)
    }

    pub fn is_complex(&self) -> bool {
        self.field == Field::Complex
    }

    pub fn is_integer(&self) -> bool {
        self.is_real() && self.re.denom().is_one()
    }

    pub fn is_fraction(&self) -> bool {
        self.re_repr == Repr::Fraction || self.im_repr == Repr::Fraction
    }

    pub fn is_sexagesimal(&self) -> bool {
        self.is_real() && self.re_repr == Repr::Sexagesimal
    }

    pub fn is_zero(&self) -> bool {
        !self.is_error() && self.re.is_zero() && self.im.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.is_real() && self.re.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.is_real() && self.re.is_positive()
    }

    pub fn as_i64(&self) -> Option<i64> {
        if self.is_integer() {
            self.re.numer().to_i64()
        } else {
            None
        }
    }

    pub fn to_f64(&self) -> CalcResult<f64> {
        if !self.is_real() {
            return Err(math_error());
        }
        self.re.to_f64().ok_or_else(math_error)
    }

    // ── comparisons ─────────────────────────────────────────────────

    /// Calculator equality: componentwise, ignoring representation tags.
    pub fn eq_value(&self, rhs: &Value) -> bool {
        if self.is_error() || rhs.is_error() {
            return false;
        }
        self.re == rhs.re && self.im == rhs.im
    }

    /// Ordering is only defined between real values.
    pub fn cmp_real(&self, rhs: &Value) -> CalcResult<std::cmp::Ordering> {
        if !self.is_real() || !rhs.is_real() {
            return Err(math_error());
        }
        Ok(self.re.cmp(&rhs.re))
    }

    pub fn gt(&self, rhs: &Value) -> CalcResult<bool> {
        Ok(self.cmp_real(rhs)? == std::cmp::Ordering::Greater)
    }

    pub fn lt(&self, rhs: &Value) -> CalcResult<bool> {
        Ok(self.cmp_real(rhs)? == std::cmp::Ordering::Less)
    }

    pub fn gte(&self, rhs: &Value) -> CalcResult<bool> {
        Ok(self.cmp_real(rhs)? != std::cmp::Ordering::Less)
    }

    pub fn lte(&self, rhs: &Value) -> CalcResult<bool> {
        Ok(self.cmp_real(rhs)? != std::cmp::Ordering::Greater)
    }

    // ── arithmetic ──────────────────────────────────────────────────

    pub fn plus(&self, rhs: &Value) -> CalcResult<Value> {
        self.additive(rhs, |a, b| a + b)
    }

    pub fn minus(&self, rhs: &Value) -> CalcResult<Value> {
        self.additive(rhs, |a, b| a - b)
    }

    fn additive(
        &self,
        rhs: &Value,
        f: impl Fn(&BigRational, &BigRational) -> BigRational,
    ) -> CalcResult<Value> {
        self.check_arithmetic(rhs)?;
        let re = f(&self.re, &rhs.re);
        let im = f(&self.im, &rhs.im);
        let re_repr = type_two_terms(self.component(0), rhs.component(0));
        let im_repr = type_two_terms(self.component(1), rhs.component(1));
        Ok(Value::complex_tagged(re, re_repr, im, im_repr))
    }

    pub fn times(&self, rhs: &Value) -> CalcResult<Value> {
        self.check_arithmetic(rhs)?;
        if self.is_complex() || rhs.is_complex() {
            // (A+Bi)(C+Di) = (AC-BD) + (AD+BC)i, computed by explicit
            // decomposition rather than delegated to the kernel.
            let (a, b) = (&self.re, &self.im);
            let (c, d) = (&rhs.re, &rhs.im);
            let re = a * c - b * d;
            let im = a * d + b * c;
            return Ok(Value::complex(re, im));
        }
        let repr = type_same_term(self.component(0), rhs.component(0));
        Ok(Value::real(&self.re * &rhs.re, repr))
    }

    pub fn div(&self, rhs: &Value) -> CalcResult<Value> {
        self.check_arithmetic(rhs)?;
        if self.is_complex() || rhs.is_complex() {
            let (a, b) = (&self.re, &self.im);
            let (c, d) = (&rhs.re, &rhs.im);
            let denominator = c * c + d * d;
            if denominator.is_zero() {
                return Err(math_error());
            }
            let re = (a * c + b * d) / &denominator;
            let im = (b * c - a * d) / &denominator;
            return Ok(Value::complex(re, im));
        }
        if rhs.re.is_zero() {
            return Err(math_error());
        }
        let repr = type_same_term(self.component(0), rhs.component(0));
        Ok(Value::real(&self.re / &rhs.re, repr))
    }

    /// Fraction construction (`⌟`): like `div` but the result is tagged as
    /// a fraction when both operands are fraction-compatible.
    pub fn over(&self, rhs: &Value) -> CalcResult<Value> {
        if !self.is_real() || !rhs.is_real() {
            return Err(math_error());
        }
        if rhs.re.is_zero() {
            return Err(math_error());
        }
        let repr = fraction_outcome(self.component(0), rhs.component(0));
        Ok(Value::real(&self.re / &rhs.re, repr))
    }

    pub fn pow(&self, rhs: &Value) -> CalcResult<Value> {
        if self.is_error() || rhs.is_error() {
            return Err(math_error());
        }
        if self.is_complex() {
            // The kernel has no general complex exponentiation; small
            // integer exponents are expanded instead.
            if rhs.eq_value(&Value::integer(-1)) {
                return Value::one().div(self);
            } else if rhs.eq_value(&Value::integer(2)) {
                return self.times(self);
            } else if rhs.eq_value(&Value::integer(3)) {
                return self.times(self)?.times(self);
            }
            return Err(math_error());
        }
        if !rhs.is_real() {
            return Err(math_error());
        }
        if let Some(exp) = rhs.as_i64() {
            if exp.unsigned_abs() > 1_000_000 {
                return Err(math_error().with_detail("exponent exceeds limits"));
            }
            if self.re.is_zero() && exp < 0 {
                return Err(math_error());
            }
            let result = pow_rational(&self.re, exp);
            return Ok(Value::real(result, self.re_repr));
        }
        // Non-integer exponent: through the float domain.
        let base = self.to_f64()?;
        let exponent = rhs.to_f64()?;
        let result = base.powf(exponent);
        if !result.is_finite() {
            return Err(math_error());
        }
        Value::from_f64(result, Repr::Decimal)
    }

    /// `degree`-th root of `self`. Odd integer degrees keep the sign of a
    /// negative radicand.
    pub fn root(&self, degree: &Value) -> CalcResult<Value> {
        if self.is_complex() || !degree.is_real() {
            return Err(math_error());
        }
        let repr = if degree.is_integer() {
            self.re_repr
        } else {
            Repr::Decimal
        };
        if self.is_negative() {
            if let Some(n) = degree.as_i64() {
                if n % 2 != 0 {
                    let positive = self.neg().root(degree)?;
                    return Ok(positive.neg().retag(repr));
                }
            }
            return Err(math_error());
        }
        let radicand = self.to_f64()?;
        let n = degree.to_f64()?;
        if n == 0.0 {
            return Err(math_error());
        }
        let result = radicand.powf(1.0 / n);
        if !result.is_finite() {
            return Err(math_error());
        }
        Ok(Value::from_f64(result, Repr::Decimal)?.retag(repr))
    }

    pub fn neg(&self) -> Value {
        if self.is_complex() {
            Value::complex_tagged(-&self.re, self.re_repr, -&self.im, self.im_repr)
        } else {
            Value::real(-&self.re, self.re_repr)
        }
    }

    fn component(&self, index: usize) -> (&BigRational, Repr) {
        if index == 0 {
            (&self.re, self.re_repr)
        } else {
            (&self.im, self.im_repr)
        }
    }

    fn check_arithmetic(&self, rhs: &Value) -> CalcResult<()> {
        if self.is_error() || rhs.is_error() {
            return Err(math_error());
        }
        Ok(())
    }
}

pub fn pow_rational(base: &BigRational, exp: i64) -> BigRational {
    if exp == 0 {
        return BigRational::one();
    }
    if exp < 0 {
        return pow_rational(base, -exp).recip();
    }
    let mut result = BigRational::one();
    let mut b = base.clone();
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result *= &b;
        }
        b = &b * &b;
        e >>= 1;
    }
    result
}

// ── representation propagation ──────────────────────────────────────
//
// Keyed by the operands' representation classes. Encodes the rules:
// integer + integer stays integer, any decimal forces decimal, fractions
// absorb integers, and sexagesimal survives only against sexagesimal for
// additive operators (against anything for scaling operators).

fn type_two_terms(lhs: (&BigRational, Repr), rhs: (&BigRational, Repr)) -> Repr {
    let (lv, lr) = lhs;
    let (rv, rr) = rhs;
    let l_int = lv.denom().is_one();
    let r_int = rv.denom().is_one();
    if (lr == Repr::Decimal && !l_int) || (rr == Repr::Decimal && !r_int) {
        return Repr::Decimal;
    }
    if (lr == Repr::Fraction || l_int) && rr == Repr::Fraction {
        return Repr::Fraction;
    }
    if lr == Repr::Fraction && (rr == Repr::Fraction || r_int) {
        return Repr::Fraction;
    }
    if lr == Repr::Sexagesimal || rr == Repr::Sexagesimal {
        if lr == Repr::Sexagesimal && rr == Repr::Sexagesimal {
            return Repr::Sexagesimal;
        }
        return Repr::Decimal;
    }
    lr
}

fn type_same_term(lhs: (&BigRational, Repr), rhs: (&BigRational, Repr)) -> Repr {
    if lhs.1 == Repr::Sexagesimal || rhs.1 == Repr::Sexagesimal {
        return Repr::Sexagesimal;
    }
    type_two_terms(lhs, rhs)
}

fn fraction_outcome(lhs: (&BigRational, Repr), rhs: (&BigRational, Repr)) -> Repr {
    let lhs_ok = lhs.1 == Repr::Fraction || lhs.0.denom().is_one();
    let rhs_ok = rhs.1 == Repr::Fraction || rhs.0.denom().is_one();
    if lhs_ok && rhs_ok {
        Repr::Fraction
    } else {
        Repr::Decimal
    }
}

// ── literal interning ───────────────────────────────────────────────

/// Cache of canonical constant values keyed by literal text, owned by the
/// interpretation session so repeated literals are not re-derived.
pub struct Literals {
    cache: HashMap<String, Value>,
}

impl Literals {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    pub fn constant(&mut self, key: &str) -> CalcResult<Value> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.clone());
        }
        let value = parse_literal(key)?;
        self.cache.insert(key.to_string(), value.clone());
        Ok(value)
    }
}

impl Default for Literals {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_literal(text: &str) -> CalcResult<Value> {
    match text {
        "pi" | "π" => Value::from_f64(std::f64::consts::PI, Repr::Decimal),
        "e" => Value::from_f64(std::f64::consts::E, Repr::Decimal),
        "i" => Ok(Value::complex(BigRational::zero(), BigRational::one())),
        _ => parse_decimal(text),
    }
}

/// Parse a decimal literal (at most one point) into an exact rational.
pub fn parse_decimal(text: &str) -> CalcResult<Value> {
    let rational = parse_decimal_rational(text)?;
    Ok(Value::real(rational, Repr::Decimal))
}

pub fn parse_decimal_rational(text: &str) -> CalcResult<BigRational> {
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text),
    };
    let mut parts = body.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid_number(text));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid_number(text));
    }
    let digits = format!("{int_part}{frac_part}");
    let numer: BigInt = digits.parse().map_err(|_| invalid_number(text))?;
    let denom = BigInt::from(10).pow(frac_part.len() as u32);
    Ok(BigRational::new(numer * sign, denom))
}

fn invalid_number(text: &str) -> Diagnostic {
    syntax_error(format!("{text} is not a valid number"))
}

/// Convenience for building rationals out of small integers.
pub fn ratio(n: i64, d: i64) -> BigRational {
    BigRational::new(BigInt::from(n), BigInt::from(d))
}

pub fn big(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

pub fn from_usize(n: usize) -> Value {
    Value::from_bigint(BigInt::from_usize(n).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn integer_propagation() {
        let a = Value::integer(2);
        let b = Value::integer(3);
        assert_eq!(a.plus(&b).unwrap().repr(), Repr::Integer);
        assert_eq!(a.minus(&b).unwrap().repr(), Repr::Integer);
        assert_eq!(a.times(&b).unwrap().repr(), Repr::Integer);
    }

    #[test]
    fn decimal_is_contagious() {
        let a = Value::integer(2);
        let b = Value::real(ratio(5, 2), Repr::Decimal);
        assert_eq!(a.plus(&b).unwrap().repr(), Repr::Decimal);
        assert_eq!(b.times(&a).unwrap().repr(), Repr::Decimal);
    }

    #[test]
    fn fraction_absorbs_integers() {
        let half = Value::real(ratio(1, 2), Repr::Fraction);
        let two = Value::integer(2);
        assert_eq!(half.plus(&two).unwrap().repr(), Repr::Fraction);
        let third = Value::real(ratio(1, 3), Repr::Fraction);
        let sum = half.plus(&third).unwrap();
        assert_eq!(sum.repr(), Repr::Fraction);
        assert_eq!(*sum.re(), ratio(5, 6));
    }

    #[test]
    fn fraction_with_unit_denominator_collapses() {
        let half = Value::real(ratio(1, 2), Repr::Fraction);
        let sum = half.plus(&half).unwrap();
        assert_eq!(sum.repr(), Repr::Integer);
    }

    #[test]
    fn oversized_fraction_collapses_to_decimal() {
        let v = Value::real(ratio(123_456, 789_011), Repr::Fraction);
        assert_eq!(v.repr(), Repr::Decimal);
    }

    #[test]
    fn sexagesimal_rules() {
        let a = Value::real(ratio(7, 3), Repr::Sexagesimal);
        let b = Value::real(ratio(1, 3), Repr::Sexagesimal);
        assert_eq!(a.plus(&b).unwrap().repr(), Repr::Sexagesimal);
        // Adding a non-sexagesimal operand coerces to decimal...
        let c = Value::real(ratio(1, 2), Repr::Decimal);
        assert_eq!(a.plus(&c).unwrap().repr(), Repr::Decimal);
        // ... but scaling by one keeps the sexagesimal tag.
        let product = a.times(&Value::real(ratio(7, 2), Repr::Decimal)).unwrap();
        assert_eq!(product.repr(), Repr::Sexagesimal);
    }

    #[test]
    fn complex_collapses_when_imaginary_is_zero() {
        let v = Value::complex(big(3), BigRational::zero());
        assert_eq!(v.field(), Field::Real);
        let v = Value::complex(big(3), big(1));
        assert_eq!(v.field(), Field::Complex);
    }

    #[test]
    fn complex_division_by_decomposition() {
        // (2+6i) / 2i = 3 - i
        let lhs = Value::complex(big(2), big(6));
        let rhs = Value::complex(BigRational::zero(), big(2));
        let q = lhs.div(&rhs).unwrap();
        assert_eq!(*q.re(), big(3));
        assert_eq!(*q.im(), big(-1));
    }

    #[test]
    fn complex_pow_small_exponents_only() {
        let z = Value::complex(big(1), big(1));
        let squared = z.pow(&Value::integer(2)).unwrap();
        assert_eq!(*squared.re(), big(0));
        assert_eq!(*squared.im(), big(2));
        assert!(z.pow(&Value::integer(4)).is_err());
        let inverse = z.pow(&Value::integer(-1)).unwrap();
        assert_eq!(*inverse.re(), ratio(1, 2));
        assert_eq!(*inverse.im(), ratio(-1, 2));
    }

    #[test]
    fn division_by_zero_is_a_math_error() {
        let err = Value::one().div(&Value::zero()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Math);
    }

    #[test]
    fn odd_root_of_negative() {
        let v = Value::integer(-27);
        let root = v.root(&Value::integer(3)).unwrap();
        assert!((root.to_f64().unwrap() + 3.0).abs() < 1e-9);
    }

    #[test]
    fn literal_cache_returns_canonical_values() {
        let mut literals = Literals::new();
        let pi1 = literals.constant("pi").unwrap();
        let pi2 = literals.constant("pi").unwrap();
        assert_eq!(pi1, pi2);
        let half = literals.constant("2.5").unwrap();
        assert_eq!(*half.re(), ratio(5, 2));
        assert_eq!(literals.constant("4").unwrap().repr(), Repr::Integer);
    }

    #[test]
    fn exact_decimal_parse() {
        assert_eq!(
            parse_decimal_rational("0.125").unwrap(),
            ratio(1, 8)
        );
        assert!(parse_decimal("abc").is_err());
    }
}
