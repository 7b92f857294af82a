//! Predefined functions and constants.
//!
//! Each function entry pairs the evaluation routine with per-parameter
//! capability checks and converters, dispatched through a closed
//! `ParamKind` variant rather than a class hierarchy, so the whole table
//! stays a flat data structure.

use crate::config::AngleUnit;
use crate::context::Context;
use crate::error::{argument_error, math_error, CalcResult};
use crate::math;
use crate::value::{Repr, Value};

/// Parameter capability: a validity check plus converters applied to the
/// argument before the call and to the result after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Real, or complex when the mode allows imaginary results.
    Complex,
    Real,
    Integer,
    /// Any non-complex value; converted to radians on the way in and back
    /// to the configured angle unit on the way out.
    Angle,
    /// Passed through unevaluated; the interpreter re-evaluates the
    /// expression with `X` bound.
    Expression,
}

impl ParamKind {
    pub fn validate(self, value: &Value, ctx: &Context) -> bool {
        match self {
            Self::Complex => {
                value.is_real() || (value.is_complex() && ctx.config.mode.allow_imaginary())
            }
            Self::Real => value.is_real(),
            Self::Integer => value.is_real() && value.is_integer(),
            Self::Angle => !value.is_complex(),
            Self::Expression => true,
        }
    }

    pub fn convert_arg(self, value: &Value, ctx: &Context) -> CalcResult<Value> {
        match self {
            Self::Angle => math::to_angle_unit(value, ctx.config.angle_unit, AngleUnit::Rad),
            _ => Ok(value.clone()),
        }
    }

    pub fn convert_result(self, value: &Value, ctx: &Context) -> CalcResult<Value> {
        match self {
            Self::Angle => math::to_angle_unit(value, AngleUnit::Rad, ctx.config.angle_unit),
            _ => Ok(value.clone()),
        }
    }
}

type BuiltinFn = fn(&mut Context, &[Value]) -> CalcResult<Value>;

pub struct Builtin {
    pub name: &'static str,
    pub required: &'static [ParamKind],
    pub optional: &'static [ParamKind],
    pub result: ParamKind,
    eval: BuiltinFn,
}

impl Builtin {
    pub fn arity(&self) -> (usize, usize) {
        (
            self.required.len(),
            self.required.len() + self.optional.len(),
        )
    }

    /// Expression-taking functions (`d/dx`, `∫`, `Σ`, `Π`) are handled by
    /// the interpreter, which owns the AST the expression needs.
    pub fn is_expressional(&self) -> bool {
        self.required.first() == Some(&ParamKind::Expression)
    }

    /// Multi-argument functions cannot be written without parentheses.
    pub fn requires_parens(&self) -> bool {
        self.required.len() > 1
    }

    fn param(&self, index: usize) -> ParamKind {
        if index < self.required.len() {
            self.required[index]
        } else {
            self.optional[index - self.required.len()]
        }
    }

    pub fn call(&self, ctx: &mut Context, args: &[Value]) -> CalcResult<Value> {
        let mut converted = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let param = self.param(i);
            if !param.validate(arg, ctx) {
                return Err(argument_error(format!(
                    "invalid argument {} to {}",
                    i + 1,
                    self.name
                )));
            }
            converted.push(param.convert_arg(arg, ctx)?);
        }
        let result = (self.eval)(ctx, &converted)?;
        if !self.result.validate(&result, ctx) {
            return Err(math_error());
        }
        self.result.convert_result(&result, ctx)
    }
}

use ParamKind::{Angle, Complex, Expression, Integer, Real};

/// The flat function table. Lookup is by exact identifier.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "sin",
        required: &[Angle],
        optional: &[],
        result: Real,
        eval: |_, args| math::sin(&args[0]),
    },
    Builtin {
        name: "cos",
        required: &[Angle],
        optional: &[],
        result: Real,
        eval: |_, args| math::cos(&args[0]),
    },
    Builtin {
        name: "tan",
        required: &[Angle],
        optional: &[],
        result: Real,
        eval: |_, args| math::tan(&args[0]),
    },
    Builtin {
        name: "asin",
        required: &[Real],
        optional: &[],
        result: Angle,
        eval: |_, args| math::asin(&args[0]),
    },
    Builtin {
        name: "acos",
        required: &[Real],
        optional: &[],
        result: Angle,
        eval: |_, args| math::acos(&args[0]),
    },
    Builtin {
        name: "atan",
        required: &[Real],
        optional: &[],
        result: Angle,
        eval: |_, args| math::atan(&args[0]),
    },
    Builtin {
        name: "sinh",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::sinh(&args[0]),
    },
    Builtin {
        name: "cosh",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::cosh(&args[0]),
    },
    Builtin {
        name: "tanh",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::tanh(&args[0]),
    },
    Builtin {
        name: "asinh",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::asinh(&args[0]),
    },
    Builtin {
        name: "acosh",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::acosh(&args[0]),
    },
    Builtin {
        name: "atanh",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::atanh(&args[0]),
    },
    Builtin {
        name: "sqrt",
        required: &[Real],
        optional: &[],
        result: Complex,
        eval: |_, args| math::sqrt(&args[0]),
    },
    Builtin {
        name: "cbrt",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::cbrt(&args[0]),
    },
    Builtin {
        name: "log",
        required: &[Real],
        optional: &[Real],
        result: Real,
        eval: |_, args| {
            if args.len() == 2 {
                math::log_base(&args[0], &args[1])
            } else {
                math::log10(&args[0])
            }
        },
    },
    Builtin {
        name: "ln",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::ln(&args[0]),
    },
    Builtin {
        name: "Abs",
        required: &[Complex],
        optional: &[],
        result: Real,
        eval: |_, args| math::abs(&args[0]),
    },
    Builtin {
        name: "Conjg",
        required: &[Complex],
        optional: &[],
        result: Complex,
        eval: |_, args| Ok(math::conjg(&args[0])),
    },
    Builtin {
        name: "arg",
        required: &[Complex],
        optional: &[],
        result: Angle,
        eval: |_, args| math::arg(&args[0]),
    },
    Builtin {
        name: "Not",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| math::bit_not(&args[0]),
    },
    Builtin {
        name: "Neg",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| Ok(math::neg(&args[0])),
    },
    Builtin {
        name: "Rnd",
        required: &[Real],
        optional: &[],
        result: Real,
        eval: |_, args| Ok(args[0].clone()),
    },
    Builtin {
        name: "RanInt",
        required: &[Integer, Integer],
        optional: &[],
        result: Real,
        eval: |_, args| math::ranint(&args[0], &args[1]),
    },
    Builtin {
        name: "LCM",
        required: &[Integer, Integer],
        optional: &[],
        result: Integer,
        eval: |_, args| math::lcm(&args[0], &args[1]),
    },
    Builtin {
        name: "GCD",
        required: &[Integer, Integer],
        optional: &[],
        result: Integer,
        eval: |_, args| math::gcd(&args[0], &args[1]),
    },
    Builtin {
        name: "Int",
        required: &[Real],
        optional: &[],
        result: Integer,
        eval: |_, args| Ok(math::int(&args[0])),
    },
    Builtin {
        name: "Intg",
        required: &[Real],
        optional: &[],
        result: Integer,
        eval: |_, args| Ok(math::floor(&args[0])),
    },
    Builtin {
        name: "d/dx",
        required: &[Expression, Real],
        optional: &[Real],
        result: Real,
        eval: expressional_stub,
    },
    Builtin {
        name: "∫",
        required: &[Expression, Real, Real],
        optional: &[Real],
        result: Real,
        eval: expressional_stub,
    },
    Builtin {
        name: "Σ",
        required: &[Expression, Integer, Integer],
        optional: &[],
        result: Real,
        eval: expressional_stub,
    },
    Builtin {
        name: "Π",
        required: &[Expression, Integer, Integer],
        optional: &[],
        result: Real,
        eval: expressional_stub,
    },
    Builtin {
        name: "Pol",
        required: &[Real, Real],
        optional: &[],
        result: Real,
        eval: |ctx, args| {
            let r = math::sqrt(
                &args[0]
                    .pow(&Value::integer(2))?
                    .plus(&args[1].pow(&Value::integer(2))?)?,
            )?;
            let theta = math::atan(&args[1].over(&args[0])?)?;
            let secondary = ctx.secondary_value_variable;
            ctx.set_variable("X", r.clone())?;
            let converted = ParamKind::Angle.convert_result(&theta, ctx)?;
            ctx.set_variable(secondary, converted)?;
            Ok(r)
        },
    },
    Builtin {
        name: "Rec",
        required: &[Real, Angle],
        optional: &[],
        result: Real,
        eval: |ctx, args| {
            let x = args[0].times(&math::cos(&args[1])?)?;
            let y = args[0].times(&math::sin(&args[1])?)?;
            let secondary = ctx.secondary_value_variable;
            ctx.set_variable("X", x.clone())?;
            ctx.set_variable(secondary, y)?;
            Ok(x)
        },
    },
];

fn expressional_stub(_: &mut Context, _: &[Value]) -> CalcResult<Value> {
    // Expression-taking functions never reach the table dispatch; the
    // interpreter intercepts them to re-evaluate the expression argument.
    Err(math_error())
}

pub fn builtin(identifier: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|f| f.name == identifier)
}

// ── predefined constants ────────────────────────────────────────────

struct NamedConstant {
    identifier: &'static str,
    aliases: &'static [&'static str],
    value: f64,
}

/// CODATA recommended values, addressable by identifier and 1-based index.
static SCIENTIFIC_CONSTANTS: &[NamedConstant] = &[
    NamedConstant { identifier: "proton_mass", aliases: &[], value: 1.672_621_777e-27 },
    NamedConstant { identifier: "neutron_mass", aliases: &[], value: 1.674_927_351e-27 },
    NamedConstant { identifier: "electron_mass", aliases: &[], value: 9.109_382_91e-31 },
    NamedConstant { identifier: "muon_mass", aliases: &[], value: 1.883_531_475e-28 },
    NamedConstant { identifier: "Bohr_radius", aliases: &[], value: 5.291_772_109e-11 },
    NamedConstant { identifier: "Planck_constant", aliases: &[], value: 6.626_069_57e-34 },
    NamedConstant { identifier: "nuclear_magneton", aliases: &[], value: 5.050_783_53e-27 },
    NamedConstant { identifier: "Bohr_magneton", aliases: &[], value: 9.274_009_68e-24 },
    NamedConstant { identifier: "Planck_constant_rationalized", aliases: &[], value: 1.054_571_726e-34 },
    NamedConstant { identifier: "fine-structure_constant", aliases: &[], value: 7.297_352_57e-3 },
    NamedConstant { identifier: "classical_electron_radius", aliases: &[], value: 2.817_940_327e-15 },
    NamedConstant { identifier: "Compton_wavelength", aliases: &[], value: 2.426_310_239e-12 },
    NamedConstant { identifier: "proton_gyromagnetic_ratio", aliases: &[], value: 267_522_200.5 },
    NamedConstant { identifier: "proton_Compton_wavelength", aliases: &[], value: 1.321_409_856e-15 },
    NamedConstant { identifier: "neutron_Compton_wavelength", aliases: &[], value: 1.319_590_907e-15 },
    NamedConstant { identifier: "Rydberg_constant", aliases: &[], value: 10_973_731.57 },
    NamedConstant { identifier: "atomic_mass_constant", aliases: &[], value: 1.660_538_921e-27 },
    NamedConstant { identifier: "proton_magnetic_moment", aliases: &[], value: 1.410_606_743e-26 },
    NamedConstant { identifier: "electron_magnetic_moment", aliases: &[], value: -9.284_764_3e-24 },
    NamedConstant { identifier: "neutron_magnetic_moment", aliases: &[], value: -9.662_364_7e-27 },
    NamedConstant { identifier: "muon_magnetic_moment", aliases: &[], value: -4.490_448_07e-26 },
    NamedConstant { identifier: "Faraday_constant", aliases: &[], value: 96_485.336_5 },
    NamedConstant { identifier: "elementary_charge", aliases: &[], value: 1.602_176_565e-19 },
    NamedConstant { identifier: "Avogadro_constant", aliases: &[], value: 6.022_141_29e23 },
    NamedConstant { identifier: "Boltzmann_constant", aliases: &[], value: 1.380_648_8e-23 },
    NamedConstant { identifier: "molar_volume_of_ideal_gas", aliases: &[], value: 2.271_095_3e-2 },
    NamedConstant { identifier: "molar_gas_constant", aliases: &[], value: 8.314_462_1 },
    NamedConstant { identifier: "speed_of_light_in_vacuum", aliases: &[], value: 299_792_458.0 },
    NamedConstant { identifier: "first_radiation_constant", aliases: &[], value: 3.741_771_53e-16 },
    NamedConstant { identifier: "second_radiation_constant", aliases: &[], value: 1.438_777e-2 },
    NamedConstant { identifier: "Stefan_Boltzmann_constant", aliases: &[], value: 5.670_373e-8 },
    NamedConstant { identifier: "electric_constant", aliases: &[], value: 8.854_187_817e-12 },
    NamedConstant { identifier: "magnetic_constant", aliases: &[], value: 1.256_637_061e-6 },
    NamedConstant { identifier: "magnetic_flux_quantum", aliases: &[], value: 2.067_833_758e-15 },
    NamedConstant { identifier: "standard_acceleration_of_gravity", aliases: &[], value: 9.806_65 },
    NamedConstant { identifier: "conductance_quantum", aliases: &[], value: 7.748_091_734_6e-5 },
    NamedConstant { identifier: "characteristic_impedance_of_vacuum", aliases: &[], value: 376.730_313_5 },
    NamedConstant { identifier: "Celsius_temperature", aliases: &[], value: 273.15 },
    NamedConstant { identifier: "Newtonian_constant_of_gravitation", aliases: &[], value: 6.673_84e-11 },
    NamedConstant { identifier: "standard_atmosphere", aliases: &[], value: 101_325.0 },
];

/// Look up a predefined constant (`pi`, `e`, or a scientific constant).
pub fn constant(identifier: &str) -> Option<CalcResult<Value>> {
    match identifier {
        "pi" | "π" => Some(Value::from_f64(std::f64::consts::PI, Repr::Decimal)),
        "e" => Some(Value::from_f64(std::f64::consts::E, Repr::Decimal)),
        _ => SCIENTIFIC_CONSTANTS
            .iter()
            .find(|c| c.identifier == identifier || c.aliases.contains(&identifier))
            .map(|c| Value::from_f64(c.value, Repr::Decimal)),
    }
}

/// The 1-based index form used by the constant-recall key.
pub fn scientific_constant(index: usize) -> Option<CalcResult<Value>> {
    if index == 0 {
        return None;
    }
    SCIENTIFIC_CONSTANTS
        .get(index - 1)
        .map(|c| Value::from_f64(c.value, Repr::Decimal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_arity() {
        let log = builtin("log").unwrap();
        assert_eq!(log.arity(), (1, 2));
        assert!(!log.requires_parens());
        let ranint = builtin("RanInt").unwrap();
        assert!(ranint.requires_parens());
        assert!(builtin("nosuch").is_none());
    }

    #[test]
    fn expressional_functions_are_flagged() {
        assert!(builtin("d/dx").unwrap().is_expressional());
        assert!(builtin("Σ").unwrap().is_expressional());
        assert!(!builtin("sin").unwrap().is_expressional());
    }

    #[test]
    fn angle_params_convert_through_radians() {
        let mut ctx = Context::new(); // Deg by default
        let sin = builtin("sin").unwrap();
        let result = sin.call(&mut ctx, &[Value::integer(90)]).unwrap();
        assert!((result.to_f64().unwrap() - 1.0).abs() < 1e-12);
        let asin = builtin("asin").unwrap();
        let result = asin.call(&mut ctx, &[Value::one()]).unwrap();
        assert!((result.to_f64().unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn complex_params_respect_mode() {
        let mut ctx = Context::new(); // Comp: imaginary not allowed
        let abs = builtin("Abs").unwrap();
        let z = Value::complex(crate::value::big(1), crate::value::big(1));
        assert!(abs.call(&mut ctx, &[z.clone()]).is_err());
        ctx.set_mode(crate::config::ModeKind::Complx);
        assert!(abs.call(&mut ctx, &[z]).is_ok());
    }

    #[test]
    fn sqrt_of_negative_needs_complex_mode() {
        let mut ctx = Context::new();
        let sqrt = builtin("sqrt").unwrap();
        assert!(sqrt.call(&mut ctx, &[Value::integer(-4)]).is_err());
        ctx.set_mode(crate::config::ModeKind::Complx);
        assert!(sqrt.call(&mut ctx, &[Value::integer(-4)]).is_ok());
    }

    #[test]
    fn pol_stores_both_results() {
        let mut ctx = Context::new();
        let pol = builtin("Pol").unwrap();
        let r = pol
            .call(&mut ctx, &[Value::integer(3), Value::integer(4)])
            .unwrap();
        assert_eq!(r, ctx.get_variable("X").unwrap());
        assert!((r.to_f64().unwrap() - 5.0).abs() < 1e-9);
        let theta = ctx.get_variable("Y").unwrap().to_f64().unwrap();
        assert!((theta - 53.13010235415598).abs() < 1e-6);
    }

    #[test]
    fn constants_resolve() {
        assert!(constant("pi").is_some());
        assert!(constant("π").is_some());
        assert!(constant("speed_of_light_in_vacuum").is_some());
        assert!(constant("nope").is_none());
        assert!(scientific_constant(1).is_some());
        assert!(scientific_constant(0).is_none());
    }
}
