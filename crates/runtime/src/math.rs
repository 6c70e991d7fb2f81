//! Scalar math helpers (spec §4.6): `llabs`, `fabs`, `pow`, `log10`, and
//! the trig family. These back `Betrag`, `hoch`, `Logarithmus`, and are
//! declared with C linkage so the emitter can call straight into libm
//! where a libm name already matches, and into a thin DDP-named wrapper
//! otherwise.

/// `llabs` — integer absolute value (`Betrag` on a `Zahl`).
#[unsafe(no_mangle)]
pub extern "C" fn llabs(value: i64) -> i64 {
    value.abs()
}

/// `fabs` — float absolute value (`Betrag` on a `Kommazahl`).
#[unsafe(no_mangle)]
pub extern "C" fn fabs(value: f64) -> f64 {
    value.abs()
}

/// `pow` — backs the `hoch` operator.
#[unsafe(no_mangle)]
pub extern "C" fn pow(base: f64, exponent: f64) -> f64 {
    base.powf(exponent)
}

/// `log10` — backs `Logarithmus a b` as `log10(a)/log10(b)`.
#[unsafe(no_mangle)]
pub extern "C" fn log10(value: f64) -> f64 {
    value.log10()
}

macro_rules! trig_fn {
    ($name:ident, $method:ident) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn $name(value: f64) -> f64 {
            value.$method()
        }
    };
}

trig_fn!(_ddp_sin, sin);
trig_fn!(_ddp_cos, cos);
trig_fn!(_ddp_tan, tan);
trig_fn!(_ddp_asin, asin);
trig_fn!(_ddp_acos, acos);
trig_fn!(_ddp_atan, atan);
trig_fn!(_ddp_sinh, sinh);
trig_fn!(_ddp_cosh, cosh);
trig_fn!(_ddp_tanh, tanh);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_handles_negative_values() {
        assert_eq!(llabs(-5), 5);
        assert!((fabs(-2.5) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn pow_matches_float_exponentiation() {
        assert_eq!(pow(2.0, 10.0), 1024.0);
    }

    #[test]
    fn log10_of_ten_thousand_is_four() {
        assert!((log10(10_000.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn trig_sin_zero_is_zero() {
        assert_eq!(_ddp_sin(0.0), 0.0);
    }
}
