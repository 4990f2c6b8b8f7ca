//! The tree this back end consumes. Producing it from source text (lexing and
//! parsing) is the job of an external front end, which builds nodes through
//! [`ast::build::TreeBuilder`].

pub mod ast;
pub mod intern;

/// Position of a node in the original source text
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
