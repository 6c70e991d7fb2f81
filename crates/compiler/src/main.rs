//! DDP Compiler CLI
//!
//! Command-line front end for `kddp`, the DDP compiler (spec §6
//! "Environment"). Thin wrapper over `ddpc::compile_file_with_config` and
//! `ddpc::dump_list_defs`: parses arguments, builds a `CompilerConfig`, and
//! prints diagnostics to stderr on failure.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

use ddpc::{CompilerConfig, OptLevel};

#[derive(ClapParser)]
#[command(name = "kddp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "kddp - Compiler fuer die Programmiersprache DDP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Uebersetzt eine .ddp-Datei zu einem ausfuehrbaren Programm
    Build {
        /// Eingabedatei
        input: PathBuf,

        /// Pfad der Ausgabedatei (Standard: Eingabename ohne Endung)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Optimierungsstufe (0, 1 oder 2)
        #[arg(short = 'O', long = "opt-level", default_value_t = 0)]
        opt_level: u8,

        /// LLVM-IR-Datei (.ll) behalten
        #[arg(long)]
        llvm_ir: bool,

        /// Alias fuer --llvm-ir
        #[arg(long)]
        keep_ir: bool,

        /// Objektdatei (.o) behalten
        #[arg(long)]
        object: bool,
    },

    /// Schreibt die IR-Definitionen der Listentypen, die der Linkschritt benoetigt
    DumpListDefs {
        /// Praefix der Ausgabedatei(en)
        #[arg(short, long)]
        output: PathBuf,

        /// LLVM-IR-Datei (.ll) behalten
        #[arg(long)]
        llvm_ir: bool,

        /// Objektdatei (.o) erzeugen
        #[arg(long)]
        object: bool,
    },

    /// Zeigt die Compiler- und Toolchain-Version an
    Version {
        /// Mehrzeilige Ausgabe mit Ziel-Tripel und GCC-Version
        #[arg(long)]
        wortreich: bool,
    },

    /// Erzeugt Shell-Completion-Skripte
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            opt_level,
            llvm_ir,
            keep_ir,
            object,
        } => run_build(&input, output.as_deref(), opt_level, llvm_ir || keep_ir, object),
        Commands::DumpListDefs { output, llvm_ir, object } => {
            run_dump_list_defs(&output, llvm_ir, object)
        }
        Commands::Version { wortreich } => run_version(wortreich),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_build(input: &std::path::Path, output: Option<&std::path::Path>, opt_level: u8, llvm_ir: bool, object: bool) {
    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| ddpc::driver::default_output_path(input));

    let mut config = match CompilerConfig::resolve() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let level = match OptLevel::from_arg(opt_level) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    config.opt_level = level;
    config.emit_llvm_ir = llvm_ir;
    config.emit_object = object;

    match ddpc::compile_file_with_config(input, &output, &config) {
        Ok(()) => {
            println!("{} -> {}", input.display(), output.display());
        }
        Err(e) => {
            eprint!("{e}");
            process::exit(1);
        }
    }
}

fn run_dump_list_defs(output: &std::path::Path, llvm_ir: bool, object: bool) {
    let mut config = match CompilerConfig::resolve() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    config.emit_llvm_ir = llvm_ir;
    config.emit_object = object;

    if let Err(e) = ddpc::dump_list_defs(output, &config) {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn run_version(wortreich: bool) {
    println!("kddp {}", env!("CARGO_PKG_VERSION"));
    if wortreich {
        println!("{}", ddpc::driver::target_triple());
        match ddpc::driver::gcc_version() {
            Ok(v) => println!("{v}"),
            Err(e) => println!("{e}"),
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
