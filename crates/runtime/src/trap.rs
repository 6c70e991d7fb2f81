//! `out_of_bounds` and other process-terminating runtime traps (spec §4.5
//! module preamble, §7 "Runtime (in emitted program)").
//!
//! These are not `Result`s: by the time emitted IR reaches one of these
//! calls the compiler has already proven the program well-typed, so a
//! bounds violation is a genuine runtime fault of the *running* DDP
//! program, not a compiler bug. The process terminates; cleanup of heap
//! values live at the point of the trap is not required (spec §5).

/// `out_of_bounds(index, len) -> ⊥` — prints a diagnostic naming the
/// offending 1-based index and the container length, then terminates the
/// process with a non-zero exit code (spec §8 scenario 6).
#[unsafe(no_mangle)]
pub extern "C" fn out_of_bounds(index: i64, len: i64) -> ! {
    eprintln!(
        "Laufzeitfehler: Index {index} liegt außerhalb der Grenzen (Länge {len})"
    );
    std::process::exit(1);
}
