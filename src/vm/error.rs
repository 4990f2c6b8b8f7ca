use thiserror::Error;

use crate::{
    backend::bytecode::{Label, Opcode, TypeTag},
    frontend::intern::InternedSymbol,
};

/// A fatal runtime error. `pc` is the index of the failing instruction.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("label {label} is defined at both {first} and {second}")]
    DuplicateLabel {
        label: Label,
        first: usize,
        second: usize,
    },
    #[error("instruction {pc}: jump to undefined label {label}")]
    UndefinedLabel { pc: usize, label: Label },
    #[error("instruction {pc}: '{opcode}' on an empty stack")]
    StackUnderflow { pc: usize, opcode: Opcode },
    #[error("instruction {pc}: '{opcode}' expected {expected}, found {found}")]
    TypeMismatch {
        pc: usize,
        opcode: Opcode,
        expected: &'static str,
        found: &'static str,
    },
    #[error("instruction {pc}: integer division by zero")]
    DivisionByZero { pc: usize },
    #[error("instruction {pc}: variable '{name}' is used before it holds a value")]
    UninitializedVariable { pc: usize, name: InternedSymbol },
    #[error("instruction {pc}: cannot read '{text}' as {tag}")]
    InputParse {
        pc: usize,
        tag: TypeTag,
        text: String,
    },
    #[error("instruction {pc}: input ended before 'read'")]
    EndOfInput { pc: usize },
    #[error("instruction {pc}: {source}")]
    Io {
        pc: usize,
        #[source]
        source: std::io::Error,
    },
}
