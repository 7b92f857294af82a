//! Numeric routines over calculator values.
//!
//! Exact operations (factorial, permutations, gcd/lcm, floor/ceil, bitwise
//! logic) stay in the rational kernel; transcendental functions route
//! through `f64` and re-enter the exact domain, where the ten-significant-
//! digit display contract absorbs the float noise.

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rand::Rng;

use crate::config::{AngleUnit, NumberBase};
use crate::error::{argument_error, math_error, syntax_error, CalcResult};
use crate::value::{Repr, Value};

// ── trigonometric / hyperbolic ──────────────────────────────────────

fn through_f64(a: &Value, f: impl Fn(f64) -> f64) -> CalcResult<Value> {
    let result = f(a.to_f64()?);
    if !result.is_finite() {
        return Err(math_error());
    }
    Ok(Value::from_f64(result, Repr::Decimal)?.retag(a.repr()))
}

pub fn sin(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::sin)
}

pub fn cos(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::cos)
}

pub fn tan(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::tan)
}

pub fn asin(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::asin)
}

pub fn acos(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::acos)
}

pub fn atan(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::atan)
}

pub fn sinh(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::sinh)
}

pub fn cosh(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::cosh)
}

pub fn tanh(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::tanh)
}

pub fn asinh(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::asinh)
}

pub fn acosh(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::acosh)
}

pub fn atanh(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::atanh)
}

// ── powers and roots ────────────────────────────────────────────────

pub fn sqrt(a: &Value) -> CalcResult<Value> {
    if a.is_negative() {
        let modulus = a.neg().to_f64()?.sqrt();
        let im = BigRational::from_float(modulus).ok_or_else(math_error)?;
        return Ok(Value::complex(BigRational::zero(), im));
    }
    through_f64(a, f64::sqrt)
}

pub fn cbrt(a: &Value) -> CalcResult<Value> {
    through_f64(a, f64::cbrt)
}

// ── factorial and combinatorics ─────────────────────────────────────

/// Factorial domain: a non-negative integer below 70.
pub fn factorial(a: &Value) -> CalcResult<Value> {
    if !a.is_integer() || a.is_negative() || a.gte(&Value::integer(70))? {
        return Err(math_error());
    }
    let n = a.as_i64().ok_or_else(math_error)?;
    let mut result = BigInt::one();
    for k in 2..=n {
        result *= k;
    }
    Ok(Value::from_bigint(result))
}

pub fn npr(a: &Value, b: &Value) -> CalcResult<Value> {
    if !a.is_positive() || !a.is_integer() || !b.is_positive() || !b.is_integer() || !a.gte(b)? {
        return Err(math_error());
    }
    factorial(a)?.div(&factorial(&a.minus(b)?)?)
}

pub fn ncr(a: &Value, b: &Value) -> CalcResult<Value> {
    npr(a, b)?.div(&factorial(b)?)
}

// ── logarithms and exponentials ─────────────────────────────────────

pub fn log10(a: &Value) -> CalcResult<Value> {
    if !a.is_positive() {
        return Err(math_error());
    }
    Value::from_f64(a.to_f64()?.log10(), Repr::Decimal)
}

/// `log(base, antilogarithm)`.
pub fn log_base(base: &Value, a: &Value) -> CalcResult<Value> {
    if !a.is_positive() || !base.is_positive() || base.eq_value(&Value::one()) {
        return Err(math_error());
    }
    let result = a.to_f64()?.ln() / base.to_f64()?.ln();
    if !result.is_finite() {
        return Err(math_error());
    }
    Value::from_f64(result, Repr::Decimal)
}

pub fn ln(a: &Value) -> CalcResult<Value> {
    if !a.is_positive() {
        return Err(math_error());
    }
    Value::from_f64(a.to_f64()?.ln(), Repr::Decimal)
}

// ── complex structure ───────────────────────────────────────────────

pub fn re(a: &Value) -> Value {
    Value::real(a.re().clone(), a.repr())
}

pub fn im(a: &Value) -> Value {
    Value::real(a.im().clone(), a.im_repr())
}

/// `r∠θ` with the angle already in radians.
pub fn polar_complex(r: &Value, theta: &Value) -> CalcResult<Value> {
    let re = r.times(&cos(theta)?)?;
    let im = r.times(&sin(theta)?)?;
    Ok(Value::complex(re.re().clone(), im.re().clone()))
}

pub fn conjg(a: &Value) -> Value {
    if a.is_complex() {
        Value::complex_tagged(a.re().clone(), a.repr(), -a.im(), a.im_repr())
    } else {
        a.clone()
    }
}

pub fn arg(a: &Value) -> CalcResult<Value> {
    let im = a.im().to_f64().ok_or_else(math_error)?;
    let re = a.re().to_f64().ok_or_else(math_error)?;
    if im == 0.0 && re == 0.0 {
        return Err(math_error());
    }
    Value::from_f64(im.atan2(re), Repr::Decimal)
}

/// Absolute value; the modulus for complex operands.
pub fn abs(a: &Value) -> CalcResult<Value> {
    if a.is_complex() {
        let re = a.re().to_f64().ok_or_else(math_error)?;
        let im = a.im().to_f64().ok_or_else(math_error)?;
        return Value::from_f64(re.hypot(im), Repr::Decimal);
    }
    Ok(Value::real(a.re().abs(), a.repr()))
}

// ── bitwise logic ───────────────────────────────────────────────────

fn to_bits(a: &Value) -> CalcResult<i64> {
    a.as_i64().ok_or_else(math_error)
}

pub fn bit_or(a: &Value, b: &Value) -> CalcResult<Value> {
    Ok(Value::integer(to_bits(a)? | to_bits(b)?))
}

pub fn bit_and(a: &Value, b: &Value) -> CalcResult<Value> {
    Ok(Value::integer(to_bits(a)? & to_bits(b)?))
}

pub fn bit_xor(a: &Value, b: &Value) -> CalcResult<Value> {
    Ok(Value::integer(to_bits(a)? ^ to_bits(b)?))
}

pub fn bit_xnor(a: &Value, b: &Value) -> CalcResult<Value> {
    Ok(Value::integer(!(to_bits(a)? ^ to_bits(b)?)))
}

pub fn bit_not(a: &Value) -> CalcResult<Value> {
    Ok(Value::integer(!to_bits(a)?))
}

pub fn neg(a: &Value) -> Value {
    a.neg()
}

// ── randomness ──────────────────────────────────────────────────────

pub fn ranint(a: &Value, b: &Value) -> CalcResult<Value> {
    if a.gte(b)? {
        return Err(argument_error("lower bound must be below upper bound"));
    }
    let low = a.as_i64().ok_or_else(math_error)?;
    let high = b.as_i64().ok_or_else(math_error)?;
    let n = rand::thread_rng().gen_range(low..=high);
    Ok(Value::integer(n))
}

pub fn rand() -> CalcResult<Value> {
    let r: f64 = rand::thread_rng().gen();
    Value::from_f64(r, Repr::Decimal)
}

// ── integer functions ───────────────────────────────────────────────

pub fn lcm(a: &Value, b: &Value) -> CalcResult<Value> {
    let (a, b) = (integer_of(a)?, integer_of(b)?);
    Ok(Value::from_bigint(a.lcm(&b)))
}

pub fn gcd(a: &Value, b: &Value) -> CalcResult<Value> {
    let (a, b) = (integer_of(a)?, integer_of(b)?);
    Ok(Value::from_bigint(a.gcd(&b)))
}

fn integer_of(a: &Value) -> CalcResult<BigInt> {
    if !a.is_integer() {
        return Err(math_error());
    }
    Ok(a.re().numer().clone())
}

/// Truncation toward zero.
pub fn int(a: &Value) -> Value {
    Value::real(a.re().trunc(), a.repr())
}

pub fn floor(a: &Value) -> Value {
    Value::real(a.re().floor(), a.repr())
}

/// `a mod b` — a multi-value: the remainder, with the floored quotient
/// riding along as an additional value.
pub fn modulo(a: &Value, b: &Value) -> CalcResult<Value> {
    if !a.is_real() || !b.is_real() || b.re().is_zero() {
        return Err(math_error());
    }
    let quotient = (a.re() / b.re()).floor();
    let remainder = a.re() - &quotient * b.re();
    Ok(Value::multi(
        Value::real(remainder, Repr::Decimal),
        vec![Value::real(quotient, Repr::Decimal)],
    ))
}

// ── angle units ─────────────────────────────────────────────────────

fn half_rotation(unit: AngleUnit) -> CalcResult<Value> {
    match unit {
        AngleUnit::Deg => Ok(Value::integer(180)),
        AngleUnit::Rad => Value::from_f64(std::f64::consts::PI, Repr::Decimal),
        AngleUnit::Gra => Ok(Value::integer(200)),
    }
}

pub fn to_angle_unit(value: &Value, from: AngleUnit, to: AngleUnit) -> CalcResult<Value> {
    if from == to {
        return Ok(value.clone());
    }
    value.times(&half_rotation(to)?)?.div(&half_rotation(from)?)
}

// ── number bases ────────────────────────────────────────────────────

/// Map the styled hex digits `𝗔`..`𝗙` to plain letters.
pub fn escape_hex(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '𝗔' => 'a',
            '𝗕' => 'b',
            '𝗖' => 'c',
            '𝗗' => 'd',
            '𝗘' => 'e',
            '𝗙' => 'f',
            _ => c,
        })
        .collect()
}

pub fn unescape_hex(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'a' => '𝗔',
            'b' => '𝗕',
            'c' => '𝗖',
            'd' => '𝗗',
            'e' => '𝗘',
            'f' => '𝗙',
            _ => c,
        })
        .collect()
}

fn check_base(text: &str, base: NumberBase) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    if body.is_empty() {
        return false;
    }
    body.chars().all(|c| match base {
        NumberBase::Bin => matches!(c, '0' | '1'),
        NumberBase::Oct => ('0'..='7').contains(&c),
        NumberBase::Dec => c.is_ascii_digit(),
        NumberBase::Hex => c.is_ascii_hexdigit(),
    })
}

/// Parse literal text as an integer in the given base. Decimal literals
/// may carry a fractional part; the other bases are integer-only.
pub fn literal_in_base(text: &str, base: NumberBase) -> CalcResult<Value> {
    let escaped = escape_hex(text);
    if base == NumberBase::Dec {
        return crate::value::parse_decimal(&escaped);
    }
    if !check_base(&escaped, base) {
        return Err(syntax_error(format!(
            "{escaped} is not a valid integer in base {}",
            base.radix()
        )));
    }
    let parsed = BigInt::parse_bytes(escaped.as_bytes(), base.radix()).ok_or_else(math_error)?;
    Ok(Value::from_bigint(parsed))
}

/// Render an integer value in the given base; hex digits come back in
/// their styled form so the output re-tokenizes as a number.
pub fn to_base_string(value: &Value, base: NumberBase) -> CalcResult<String> {
    let truncated = int(value);
    let n = truncated.re().numer();
    let rendered = n.to_str_radix(base.radix());
    if base == NumberBase::Hex {
        return Ok(unescape_hex(&rendered));
    }
    Ok(rendered)
}

/// Two's-complement style display offset applied to negative values
/// before base conversion.
pub fn base_display_offset(base: NumberBase) -> Option<Value> {
    match base {
        NumberBase::Bin => Some(Value::integer(0b10000000000)),
        NumberBase::Oct => Some(Value::integer(0o10000000000)),
        NumberBase::Hex => Some(Value::integer(0x10000000000)),
        NumberBase::Dec => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::big;

    #[test]
    fn factorial_domain() {
        assert_eq!(factorial(&Value::integer(5)).unwrap(), Value::integer(120));
        assert!(factorial(&Value::integer(70)).is_err());
        assert!(factorial(&Value::integer(-3)).is_err());
        assert!(factorial(&Value::real(crate::value::ratio(1, 10), Repr::Decimal)).is_err());
    }

    #[test]
    fn permutation_and_combination() {
        let n = Value::integer(5);
        let r = Value::integer(2);
        assert_eq!(npr(&n, &r).unwrap(), Value::integer(20));
        assert_eq!(ncr(&n, &r).unwrap(), Value::integer(10));
        assert!(npr(&r, &n).is_err());
    }

    #[test]
    fn bitwise_logic() {
        let a = Value::integer(0b1010);
        let b = Value::integer(0b1100);
        assert_eq!(bit_and(&a, &b).unwrap(), Value::integer(0b1000));
        assert_eq!(bit_or(&a, &b).unwrap(), Value::integer(0b1110));
        assert_eq!(bit_xor(&a, &b).unwrap(), Value::integer(0b0110));
        assert_eq!(bit_not(&a).unwrap(), Value::integer(-11));
    }

    #[test]
    fn modulo_carries_the_quotient() {
        let m = modulo(&Value::integer(17), &Value::integer(5)).unwrap();
        assert_eq!(*m.re(), big(2));
        assert_eq!(*m.additional()[0].re(), big(3));
    }

    #[test]
    fn angle_conversion_round_trip() {
        let deg = Value::integer(180);
        let rad = to_angle_unit(&deg, AngleUnit::Deg, AngleUnit::Rad).unwrap();
        assert!((rad.to_f64().unwrap() - std::f64::consts::PI).abs() < 1e-12);
        let gra = to_angle_unit(&deg, AngleUnit::Deg, AngleUnit::Gra).unwrap();
        assert_eq!(gra, Value::integer(200));
    }

    #[test]
    fn base_literals_and_rendering() {
        let v = literal_in_base("1010", NumberBase::Bin).unwrap();
        assert_eq!(v, Value::integer(10));
        assert_eq!(to_base_string(&v, NumberBase::Bin).unwrap(), "1010");
        let v = literal_in_base("1𝗙", NumberBase::Hex).unwrap();
        assert_eq!(v, Value::integer(31));
        assert_eq!(to_base_string(&v, NumberBase::Hex).unwrap(), "1𝗙");
        assert!(literal_in_base("12", NumberBase::Bin).is_err());
    }

    #[test]
    fn gcd_and_lcm() {
        assert_eq!(
            gcd(&Value::integer(12), &Value::integer(18)).unwrap(),
            Value::integer(6)
        );
        assert_eq!(
            lcm(&Value::integer(4), &Value::integer(6)).unwrap(),
            Value::integer(12)
        );
    }

    #[test]
    fn sqrt_of_negative_is_imaginary() {
        let v = sqrt(&Value::integer(-4)).unwrap();
        assert!(v.is_complex());
        assert!((v.im().to_f64().unwrap() - 2.0).abs() < 1e-12);
    }
}
