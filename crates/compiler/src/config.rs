//! Compiler configuration (spec §6 "Environment", SPEC_FULL "Configuration").
//!
//! A plain settings struct: the knobs the CLI exposes, plus `DDPPATH`
//! resolution. DDP has no externally pluggable builtin mechanism, so
//! there is nothing here beyond fixed compiler options.

use std::env;
use std::path::{Path, PathBuf};

use crate::driver::DriverError;

/// Optimization level accepted by `kddp build -O`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    O0,
    O1,
    O2,
}

impl OptLevel {
    pub fn from_arg(level: u8) -> Result<Self, DriverError> {
        match level {
            0 => Ok(OptLevel::O0),
            1 => Ok(OptLevel::O1),
            2 => Ok(OptLevel::O2),
            other => Err(DriverError::InvalidOptLevel(other)),
        }
    }

    pub const fn as_gcc_flag(self) -> &'static str {
        match self {
            OptLevel::O0 => "-O0",
            OptLevel::O1 => "-O1",
            OptLevel::O2 => "-O2",
        }
    }
}

/// Compiler-wide settings threaded through the pipeline and the driver.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub opt_level: OptLevel,
    pub emit_llvm_ir: bool,
    pub emit_object: bool,
    /// Whether a keyword-looking identifier right after `.`/`:` must be
    /// capitalized (spec §4.1 "strict capitalization mode"). A violation is
    /// a warning-severity diagnostic, never an error.
    pub strict_capitalization: bool,
    pub ddppath: PathBuf,
}

impl CompilerConfig {
    pub fn new(ddppath: PathBuf) -> Self {
        CompilerConfig {
            opt_level: OptLevel::default(),
            emit_llvm_ir: false,
            emit_object: false,
            strict_capitalization: true,
            ddppath,
        }
    }

    pub fn with_opt_level(mut self, level: OptLevel) -> Self {
        self.opt_level = level;
        self
    }

    pub fn with_emit_llvm_ir(mut self, emit: bool) -> Self {
        self.emit_llvm_ir = emit;
        self
    }

    pub fn with_emit_object(mut self, emit: bool) -> Self {
        self.emit_object = emit;
        self
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.ddppath.join("bin")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.ddppath.join("lib")
    }

    pub fn duden_dir(&self) -> PathBuf {
        self.ddppath.join("Duden")
    }

    /// Resolve `DDPPATH` (spec §6 "Environment"): read the environment
    /// variable; if unset, derive it from the running executable's own
    /// directory. Then validate `bin/`, `lib/`, `Duden/` all exist under it.
    pub fn resolve_ddppath() -> Result<PathBuf, DriverError> {
        let path = match env::var_os("DDPPATH") {
            Some(val) => PathBuf::from(val),
            None => {
                let exe = env::current_exe().map_err(|e| DriverError::Ddppath(e.to_string()))?;
                exe.parent()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| DriverError::Ddppath("executable has no parent directory".into()))?
            }
        };
        Self::validate_ddppath(&path)?;
        Ok(path)
    }

    fn validate_ddppath(path: &Path) -> Result<(), DriverError> {
        for sub in ["bin", "lib", "Duden"] {
            let dir = path.join(sub);
            if !dir.is_dir() {
                return Err(DriverError::Ddppath(format!(
                    "DDPPATH is missing required directory: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn resolve() -> Result<Self, DriverError> {
        Ok(CompilerConfig::new(Self::resolve_ddppath()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_level_rejects_out_of_range() {
        assert!(matches!(OptLevel::from_arg(3), Err(DriverError::InvalidOptLevel(3))));
        assert_eq!(OptLevel::from_arg(2).unwrap(), OptLevel::O2);
    }

    #[test]
    fn validate_ddppath_requires_all_three_dirs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CompilerConfig::validate_ddppath(dir.path()).is_err());
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        assert!(CompilerConfig::validate_ddppath(dir.path()).is_err());
        std::fs::create_dir(dir.path().join("Duden")).unwrap();
        assert!(CompilerConfig::validate_ddppath(dir.path()).is_ok());
    }

    #[test]
    fn builder_sets_flags() {
        let cfg = CompilerConfig::new(PathBuf::from("/opt/ddp"))
            .with_opt_level(OptLevel::O2)
            .with_emit_llvm_ir(true);
        assert_eq!(cfg.opt_level, OptLevel::O2);
        assert!(cfg.emit_llvm_ir);
        assert!(!cfg.emit_object);
    }
}
