//! A static type checker, stack code generator and bytecode virtual machine
//! for a small imperative language.
//!
//! An external front end builds the syntax tree (see
//! [`frontend::ast::build::TreeBuilder`]). [`compile`] checks it and lowers it
//! to a [`BytecodeProgram`], which can be written out as text, read back and
//! executed with [`run`].

use std::io::{BufRead, Write};

use thiserror::Error;

use crate::{
    backend::{
        bytecode::BytecodeProgram,
        codegen::{CodeGenerator, CodegenError},
    },
    middle::{
        diagnostic::Diagnostic,
        type_checker::{TypeCheckOptions, TypeChecker},
    },
    vm::{Machine, VariableStore, VmError},
};

pub mod backend;
pub mod frontend;
mod index;
pub mod middle;
pub mod vm;

#[derive(Debug, Error)]
pub enum CompileError {
    /// The program is not well typed; nothing was generated
    #[error("{} type error(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Diagnostics(diagnostics) => diagnostics,
            CompileError::Codegen(_) => &[],
        }
    }
}

/// Checks `program` and, only if it is well typed, lowers it to bytecode
pub fn compile(
    program: &frontend::ast::Program,
    options: &TypeCheckOptions,
) -> Result<BytecodeProgram, CompileError> {
    let types = TypeChecker::check(program, options).map_err(CompileError::Diagnostics)?;

    Ok(CodeGenerator::generate(program, &types)?)
}

/// Executes `program`, taking `read` input from `input` and writing `write`
/// output to `output`
pub fn run<R: BufRead, W: Write>(
    program: &BytecodeProgram,
    input: R,
    output: W,
) -> Result<VariableStore, VmError> {
    Machine::new(input, output).run(program)
}
