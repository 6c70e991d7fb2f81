//! Build orchestration: invoking the IR emitter, shelling out to `gcc` to
//! assemble and link, and the toolchain version probe (SPEC_FULL
//! "Linker/toolchain invocation").
//!
//! `DriverError` mirrors `codegen::CodeGenError`'s shape (manual
//! `Display`/`From`, no `thiserror`): a small closed set of driver-level
//! failures distinct from the `ddp_core::Diagnostic`s a source file
//! itself can produce.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::config::CompilerConfig;

#[derive(Debug)]
pub enum DriverError {
    Io(std::io::Error),
    Ddppath(String),
    InvalidOptLevel(u8),
    Linker(String),
    SourceHasErrors,
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Io(e) => write!(f, "E/A-Fehler: {e}"),
            DriverError::Ddppath(s) => write!(f, "DDPPATH-Fehler: {s}"),
            DriverError::InvalidOptLevel(l) => write!(f, "ungültige Optimierungsstufe: {l}"),
            DriverError::Linker(s) => write!(f, "Linker-Fehler: {s}"),
            DriverError::SourceHasErrors => {
                write!(f, "Übersetzung abgebrochen: das Programm enthält Fehler")
            }
        }
    }
}

impl std::error::Error for DriverError {}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e)
    }
}

static GCC_VERSION: OnceLock<Result<String, String>> = OnceLock::new();

/// Caches `gcc --version`'s first line in a `OnceLock` so `kddp version
/// --wortreich` and repeated builds in the same process only shell out once.
pub fn gcc_version() -> Result<&'static str, &'static str> {
    GCC_VERSION
        .get_or_init(|| {
            Command::new("gcc")
                .arg("--version")
                .output()
                .map_err(|e| format!("gcc nicht gefunden: {e}"))
                .and_then(|out| {
                    if !out.status.success() {
                        return Err("gcc --version schlug fehl".to_string());
                    }
                    String::from_utf8(out.stdout)
                        .map_err(|e| format!("ungültige Ausgabe von gcc: {e}"))
                })
                .and_then(|text| {
                    text.lines()
                        .next()
                        .map(str::to_string)
                        .ok_or_else(|| "leere Ausgabe von gcc --version".to_string())
                })
        })
        .as_deref()
        .map_err(String::as_str)
}

/// Links `object_path` against `libddpruntime.a` under `DDPPATH/lib`
/// (spec §6 "Environment") and libm/libc, producing `output_path`.
pub fn link(config: &CompilerConfig, object_path: &Path, output_path: &Path) -> Result<(), DriverError> {
    let runtime_lib = config.lib_dir().join("libddpruntime.a");
    if !runtime_lib.is_file() {
        return Err(DriverError::Linker(format!(
            "Laufzeitbibliothek nicht gefunden: {}",
            runtime_lib.display()
        )));
    }
    let status = Command::new("gcc")
        .arg(config.opt_level.as_gcc_flag())
        .arg(object_path)
        .arg(&runtime_lib)
        .arg("-lm")
        .arg("-o")
        .arg(output_path)
        .status()?;
    if !status.success() {
        return Err(DriverError::Linker(format!(
            "gcc terminated with {status}"
        )));
    }
    Ok(())
}

/// Assembles a `.ll` text IR file into a native object file via `gcc -c`,
/// which understands LLVM IR directly when built with an LLVM backend
/// integration — simpler and more portable than linking against the LLVM
/// C API directly.
pub fn assemble(ir_path: &Path, object_path: &Path) -> Result<(), DriverError> {
    let status = Command::new("gcc")
        .arg("-c")
        .arg("-x")
        .arg("ir")
        .arg(ir_path)
        .arg("-o")
        .arg(object_path)
        .status()?;
    if !status.success() {
        return Err(DriverError::Linker(format!(
            "gcc -c terminated with {status}"
        )));
    }
    Ok(())
}

/// The target triple-ish string `kddp version --wortreich` reports on its
/// second line. Cargo doesn't hand a binary its own target triple at
/// runtime without a `build.rs`; `std::env::consts` gives the closest
/// equivalent without one.
pub fn target_triple() -> String {
    format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

/// Derives a default output path: the input's file stem with no extension.
pub fn default_output_path(input: &Path) -> PathBuf {
    PathBuf::from(input.file_stem().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_strips_extension() {
        assert_eq!(
            default_output_path(Path::new("/tmp/hallo.ddp")),
            PathBuf::from("hallo")
        );
    }
}
