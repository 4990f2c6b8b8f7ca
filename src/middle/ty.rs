use strum::Display;

use crate::frontend::ast::PrimitiveKind;

/// The static type of a declaration or an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StaticType {
    Int,
    Float,
    Bool,
    String,
    File,
    /// The type which is created as a result of some illegal operation which we
    /// can't compute the type of. If you find this in your type, there is no
    /// use emitting another error since one has already been created.
    #[strum(to_string = "<error>")]
    Error,
}

impl From<PrimitiveKind> for StaticType {
    fn from(value: PrimitiveKind) -> Self {
        match value {
            PrimitiveKind::Int => Self::Int,
            PrimitiveKind::Float => Self::Float,
            PrimitiveKind::Bool => Self::Bool,
            PrimitiveKind::String => Self::String,
            PrimitiveKind::File => Self::File,
        }
    }
}

impl StaticType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    /// Result type of `+ - * /` and the operand type of `< >` for a numeric
    /// pair: float if either side is float, int otherwise
    pub fn promote(lhs: Self, rhs: Self) -> Option<Self> {
        match (lhs, rhs) {
            (Self::Int, Self::Int) => Some(Self::Int),
            (Self::Float, Self::Float) | (Self::Int, Self::Float) | (Self::Float, Self::Int) => {
                Some(Self::Float)
            }
            _ => None,
        }
    }

    /// Whether a value of type `value` may be stored in a variable of this
    /// type. The only implicit conversion is int to float.
    pub fn accepts(self, value: Self) -> bool {
        self == value || (self == Self::Float && value == Self::Int)
    }

    /// Whether the pair needs an int operand widened before a float operation
    pub fn needs_widening(lhs: Self, rhs: Self) -> bool {
        matches!(
            (lhs, rhs),
            (Self::Int, Self::Float) | (Self::Float, Self::Int)
        )
    }
}
