use strum::Display;
use thiserror::Error;

use super::ty::StaticType;
use crate::frontend::{Span, ast::BinaryOperatorKind, intern::InternedSymbol};

/// A static error found while checking a program. Checking never stops at the
/// first one, so a run produces a list of these.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{span} {kind}")]
pub struct Diagnostic {
    pub span: Span,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(span: Span, kind: DiagnosticKind) -> Self {
        Self { span, kind }
    }

    pub fn line(&self) -> u32 {
        self.span.line
    }

    pub fn column(&self) -> u32 {
        self.span.column
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConditionKind {
    #[strum(to_string = "IF")]
    If,
    #[strum(to_string = "WHILE")]
    While,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiagnosticKind {
    #[error("Variable '{name}' is already declared.")]
    DuplicateDeclaration { name: InternedSymbol },

    #[error("Variable '{name}' is not declared.")]
    UndeclaredVariable { name: InternedSymbol },

    #[error("Invalid operation '{operator}' between '{lhs}' and '{rhs}'.")]
    InvalidOperands {
        operator: BinaryOperatorKind,
        lhs: StaticType,
        rhs: StaticType,
    },

    #[error("Modulo operator (%) is only valid for integers.")]
    ModuloNonInteger,

    #[error("Type mismatch in equality check: {lhs} {operator} {rhs}")]
    EqualityMismatch {
        operator: BinaryOperatorKind,
        lhs: StaticType,
        rhs: StaticType,
    },

    #[error("Type mismatch in relational operation: {lhs} {operator} {rhs}")]
    RelationalMismatch {
        operator: BinaryOperatorKind,
        lhs: StaticType,
        rhs: StaticType,
    },

    #[error("Type mismatch in logical operation: {lhs} {operator} {rhs}")]
    LogicalMismatch {
        operator: BinaryOperatorKind,
        lhs: StaticType,
        rhs: StaticType,
    },

    #[error("Type mismatch in NOT operation: !{operand}")]
    NotOperand { operand: StaticType },

    #[error("Type mismatch in unary minus operation: -{operand}")]
    NegateOperand { operand: StaticType },

    #[error("Type mismatch in assignment. Cannot assign '{value}' to '{target}'.")]
    AssignmentMismatch {
        target: StaticType,
        value: StaticType,
    },

    #[error("Type mismatch in {kind} condition: {actual}")]
    ConditionNotBool {
        kind: ConditionKind,
        actual: StaticType,
    },

    #[error("Variable '{name}' is not of type 'file'.")]
    NotAFile { name: InternedSymbol },

    #[error("fopen expects a string as file name, got '{actual}'.")]
    FileNameNotString { actual: StaticType },

    #[error("Left side of '<<' must be a file, got '{actual}'.")]
    OutputTargetNotFile { actual: StaticType },

    #[error("Cannot write '{actual}' to file.")]
    UnwritableValue { actual: StaticType },

    #[error("Cannot print a value of type '{actual}'.")]
    UnprintableValue { actual: StaticType },

    #[error("Cannot read into variable '{name}' of type '{ty}'.")]
    UnreadableTarget { name: InternedSymbol, ty: StaticType },
}
