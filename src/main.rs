use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use stackc::{
    backend::{bytecode::BytecodeProgram, pretty_print::pretty_print_program, verify::verify},
    vm::{Machine, VmError},
};

/// Runs a stack machine program written in the bytecode text format
#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Bytecode text file to execute
    file: PathBuf,

    /// Print a colored listing of the program before running it
    #[arg(long)]
    listing: bool,

    /// Check the static stack discipline and refuse to run on failure
    #[arg(long)]
    verify: bool,

    /// Stop after loading (and the listing or verification, if requested)
    #[arg(long)]
    no_run: bool,

    /// Take `read` input from this file instead of stdin
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn report_error(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("{}: {message}", "error".red().bold());
    ExitCode::FAILURE
}

fn file_argument_problem(path: &Path, what: &str) -> Option<String> {
    if !path.exists() {
        Some(format!("{what} '{}' does not exist!", path.display()))
    } else if !path.is_file() {
        Some(format!("{what} '{}' is not a file!", path.display()))
    } else {
        None
    }
}

fn check_file_argument(path: &Path, what: &str) {
    if let Some(message) = file_argument_problem(path, what) {
        Args::command()
            .error(ErrorKind::InvalidValue, message)
            .exit()
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    check_file_argument(&args.file, "Program file");
    if let Some(input) = &args.input {
        check_file_argument(input, "Input file");
    }

    /* Load the program */

    let text = match std::fs::read_to_string(&args.file) {
        Ok(text) => text,
        Err(error) => {
            return report_error(format!("cannot read '{}': {error}", args.file.display()));
        }
    };

    let program: BytecodeProgram = match text.parse() {
        Ok(program) => program,
        Err(error) => return report_error(format!("{} {error}", args.file.display())),
    };

    if args.listing {
        if let Err(error) = pretty_print_program(&program) {
            return report_error(format!("cannot write listing: {error}"));
        }
    }

    if args.verify {
        if let Err(error) = verify(&program) {
            return report_error(error);
        }
    }

    if args.no_run {
        return ExitCode::SUCCESS;
    }

    /* Execute */

    let result: Result<_, VmError> = match &args.input {
        Some(path) => match File::open(path) {
            Ok(file) => Machine::new(BufReader::new(file), std::io::stdout()).run(&program),
            Err(error) => {
                return report_error(format!("cannot open '{}': {error}", path.display()));
            }
        },
        None => Machine::stdio().run(&program),
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => report_error(error),
    }
}
