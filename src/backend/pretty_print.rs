use std::io::Write;

use colored::Colorize;

use crate::backend::bytecode::{BytecodeProgram, Instruction};

pub fn pretty_print_program(program: &BytecodeProgram) -> std::io::Result<()> {
    write_listing(program, &mut std::io::stdout().lock())
}

/// Writes one line per instruction. Labels are outdented like block headers,
/// everything else is prefixed with its instruction index.
pub fn write_listing(program: &BytecodeProgram, out: &mut impl Write) -> std::io::Result<()> {
    let width = program.len().saturating_sub(1).to_string().len();

    for (pc, instruction) in program.iter().enumerate() {
        match instruction {
            Instruction::Label(label) => {
                writeln!(out, "{}", format!(".label_{label}:").bright_red())?
            }
            _ => writeln!(
                out,
                "    {} {instruction}",
                format!("{pc:>width$}").bright_black()
            )?,
        }
    }

    Ok(())
}
