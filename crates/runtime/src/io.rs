//! `Schreibe <expr>.` output primitives. The scanner/typechecker resolve
//! which overload applies from the expression's static type; the emitter
//! picks the matching `_ddp_write_<T>` entry point (spec §8 scenario 1).
//!
//! There is no shared VM stack to pop an operand off: the emitted IR
//! passes the value directly, by the same by-value/by-pointer convention
//! as everywhere else in this ABI (primitives by value, `Text` by
//! pointer).
//!
//! Writes are unbuffered `print!`-style (no trailing newline); DDP source
//! supplies its own newlines via string literals where wanted.

use crate::text::DdpString;
use std::io::Write;

#[unsafe(no_mangle)]
pub extern "C" fn _ddp_write_int(value: i64) {
    print!("{value}");
    let _ = std::io::stdout().flush();
}

#[unsafe(no_mangle)]
pub extern "C" fn _ddp_write_float(value: f64) {
    print!("{}", value.to_string().replace('.', ","));
    let _ = std::io::stdout().flush();
}

#[unsafe(no_mangle)]
pub extern "C" fn _ddp_write_bool(value: i64) {
    print!("{}", if value != 0 { "wahr" } else { "falsch" });
    let _ = std::io::stdout().flush();
}

#[unsafe(no_mangle)]
pub extern "C" fn _ddp_write_char(value: u32) {
    print!("{}", char::from_u32(value).unwrap_or('\u{FFFD}'));
    let _ = std::io::stdout().flush();
}

/// # Safety
/// `s` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_write_string(s: *const DdpString) {
    print!("{}", unsafe { crate::text::as_str(s) });
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_float_uses_comma_decimal() {
        // Exercises the formatting path only; stdout content isn't
        // captured by `cargo test` without extra plumbing.
        _ddp_write_float(1.5);
    }

    #[test]
    fn write_bool_matches_german_literals() {
        _ddp_write_bool(1);
        _ddp_write_bool(0);
    }
}
