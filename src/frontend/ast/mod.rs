use strum::{Display, EnumIter, EnumString};

use super::{Span, intern::InternedSymbol};
use crate::index::simple_index;

pub mod build;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

simple_index! {
    /// Identifies an expression node so that passes can attach information to
    /// it (the resolved static type, for instance). Unique within a program.
    pub struct NodeId;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub span: Span,
    pub symbol: InternedSymbol,
}

/// The type keyword of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    Int,
    Float,
    Bool,
    String,
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// int a, b, c;
    Declaration {
        ty: PrimitiveKind,
        names: Vec<Identifier>,
    },
    /// Expression terminated with a semicolon, its value is discarded
    Expression(Box<Expression>),
    If {
        condition: Box<Expression>,
        positive: Box<Statement>,
        negative: Option<Box<Statement>>,
    },
    While {
        condition: Box<Expression>,
        body: Box<Statement>,
    },
    /// { ... }
    Block(Vec<Statement>),
    /// write a, "b", 1 + 2;
    Write(Vec<Expression>),
    /// read a, b;
    Read(Vec<Identifier>),
    /// fopen f "out.txt";
    FileOpen {
        target: Identifier,
        filename: Box<Expression>,
    },
    /// f << a << b;
    ///
    /// Chained outputs arrive flattened: `values` are in source order
    FileOutput {
        file: Box<Expression>,
        values: Vec<Expression>,
    },
    /// Just a semicolon
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Literal),
    Variable(Identifier),
    /// Parenthesized expression, transparent to every pass
    Grouping(Box<Expression>),
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperatorKind,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
    /// Right associative, so `a = b = 1` nests the second assignment in
    /// `value`
    Assignment {
        target: Identifier,
        value: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BinaryOperatorKind {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Subtract,
    #[strum(to_string = "*")]
    Multiply,
    #[strum(to_string = "/")]
    Divide,
    #[strum(to_string = "%")]
    Modulus,
    #[strum(to_string = ".")]
    Concat,
    #[strum(to_string = "==")]
    Equals,
    #[strum(to_string = "!=")]
    NotEquals,
    #[strum(to_string = "<")]
    LessThan,
    #[strum(to_string = ">")]
    GreaterThan,
    #[strum(to_string = "&&")]
    LogicalAnd,
    #[strum(to_string = "||")]
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    /// + - * / %
    Arithmetic,
    /// .
    Concat,
    /// == !=
    Equality,
    /// < >
    Relational,
    /// && ||
    Logical,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulus => {
                BinaryOperatorClass::Arithmetic
            }
            Self::Concat => BinaryOperatorClass::Concat,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
            Self::LessThan | Self::GreaterThan => BinaryOperatorClass::Relational,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum UnaryOperatorKind {
    #[strum(to_string = "!")]
    Not,
    #[strum(to_string = "-")]
    Negate,
}

impl Expression {
    /// Strips any number of enclosing parentheses
    pub fn ungrouped(&self) -> &Expression {
        match &self.kind {
            ExpressionKind::Grouping(inner) => inner.ungrouped(),
            _ => self,
        }
    }
}
