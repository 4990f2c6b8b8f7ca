//! The stack machine instruction set and its line oriented text form.
//!
//! Every instruction consumes and produces a fixed number of operand stack
//! slots (see [`Instruction::stack_effect`]). Control flow is expressed with
//! [`Label`]s which are defined once by a `label` instruction and referenced by
//! `jmp` / `fjmp`.

use std::str::FromStr;

use colored::{Color, Colorize};
use itertools::Itertools;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::{
    frontend::intern::InternedSymbol,
    index::{Index, simple_index},
    middle::ty::StaticType,
};

simple_index! {
    /// A symbolic jump target. Labels are handed out by the code generator
    /// from one increasing counter and never reused within a program.
    pub struct Label;
}

impl core::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The textual name of an instruction. Matched case-insensitively when
/// reading; always written in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Opcode {
    Push,
    Pop,
    Load,
    Save,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Uminus,
    Concat,
    Itof,
    Lt,
    Gt,
    Eq,
    And,
    Or,
    Not,
    Label,
    #[strum(to_string = "jmp", serialize = "jump")]
    Jmp,
    #[strum(to_string = "fjmp", serialize = "jump-if-false")]
    Fjmp,
    Print,
    Read,
    Fopen,
    Fappend,
}

/// Operand type carried by typed instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum TypeTag {
    #[strum(to_string = "I")]
    Int,
    #[strum(to_string = "F")]
    Float,
    #[strum(to_string = "S")]
    String,
    #[strum(to_string = "B")]
    Bool,
}

impl TypeTag {
    /// Files have no tag: a handle can't be pushed as a literal, read or
    /// compared
    pub fn of(ty: StaticType) -> Option<Self> {
        match ty {
            StaticType::Int => Some(Self::Int),
            StaticType::Float => Some(Self::Float),
            StaticType::String => Some(Self::String),
            StaticType::Bool => Some(Self::Bool),
            StaticType::File | StaticType::Error => None,
        }
    }
}

/// Tag of arithmetic and ordering instructions, which only exist for numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericTag {
    Int,
    Float,
}

impl NumericTag {
    /// Float if either operand is float. Callers only pass numeric types.
    pub fn of(ty: StaticType) -> Self {
        if ty == StaticType::Float {
            Self::Float
        } else {
            Self::Int
        }
    }
}

impl From<NumericTag> for TypeTag {
    fn from(value: NumericTag) -> Self {
        match value {
            NumericTag::Int => TypeTag::Int,
            NumericTag::Float => TypeTag::Float,
        }
    }
}

impl core::fmt::Display for NumericTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        TypeTag::from(*self).fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOperator {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderingOperator {
    Less,
    Greater,
}

/// A literal operand of `push`
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl Constant {
    pub fn tag(&self) -> TypeTag {
        match self {
            Constant::Int(_) => TypeTag::Int,
            Constant::Float(_) => TypeTag::Float,
            Constant::Bool(_) => TypeTag::Bool,
            Constant::String(_) => TypeTag::String,
        }
    }

    /// The value every variable of the given type starts out with
    pub fn zero(tag: TypeTag) -> Self {
        match tag {
            TypeTag::Int => Constant::Int(0),
            TypeTag::Float => Constant::Float(0.0),
            TypeTag::String => Constant::String(String::new()),
            TypeTag::Bool => Constant::Bool(false),
        }
    }

    pub fn parse(tag: TypeTag, text: &str) -> Result<Self, ParseErrorKind> {
        let malformed = || ParseErrorKind::MalformedLiteral {
            tag,
            text: text.to_owned(),
        };

        match tag {
            TypeTag::Int => text.parse().map(Constant::Int).map_err(|_| malformed()),
            TypeTag::Float => text.parse().map(Constant::Float).map_err(|_| malformed()),
            TypeTag::Bool => parse_bool(text).map(Constant::Bool).ok_or_else(malformed),
            TypeTag::String => unquote(text).map(Constant::String),
        }
    }
}

impl core::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            // Debug formatting keeps the fractional part (`0.0`, not `0`)
            Constant::Float(v) => write!(f, "{v:?}"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::String(v) => f.write_str(&quote(v)),
        }
    }
}

pub fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');

    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            // Line breaks and control characters never appear raw in the text
            c if c.is_control() || (c.is_whitespace() && c != ' ') => {
                quoted.push_str(&format!("\\u{{{:x}}}", u32::from(c)))
            }
            c => quoted.push(c),
        }
    }

    quoted.push('"');
    quoted
}

/// Reads the `{hex}` part of a `\u{hex}` escape
fn unescape_code_point(chars: &mut std::str::Chars<'_>) -> Result<char, ParseErrorKind> {
    let invalid = || ParseErrorKind::InvalidEscape('u');

    if chars.next() != Some('{') {
        return Err(invalid());
    }

    let mut digits = String::new();
    loop {
        match chars.next() {
            Some('}') => break,
            Some(c) if c.is_ascii_hexdigit() && digits.len() < 6 => digits.push(c),
            _ => return Err(invalid()),
        }
    }

    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(invalid)
}

/// Reads a string operand. Quoted operands understand the escapes written by
/// [`quote`]; anything else is taken verbatim.
fn unquote(text: &str) -> Result<String, ParseErrorKind> {
    let Some(body) = text.strip_prefix('"') else {
        return Ok(text.to_owned());
    };

    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                return if chars.as_str().trim().is_empty() {
                    Ok(value)
                } else {
                    Err(ParseErrorKind::TrailingInput(chars.as_str().trim().to_owned()))
                };
            }
            '\\' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('r') => value.push('\r'),
                Some('u') => value.push(unescape_code_point(&mut chars)?),
                Some(c @ ('"' | '\\')) => value.push(c),
                Some(c) => return Err(ParseErrorKind::InvalidEscape(c)),
                None => break,
            },
            c => value.push(c),
        }
    }

    Err(ParseErrorKind::UnterminatedString)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Push(Constant),
    /// Discard the top of the stack
    Pop,
    Load(InternedSymbol),
    Save(InternedSymbol),
    Arithmetic(ArithmeticOperator, NumericTag),
    /// Integer remainder
    Modulo,
    Negate(NumericTag),
    Concat,
    /// Int to float conversion of the top of the stack
    Widen,
    Ordering(OrderingOperator, NumericTag),
    Equal(TypeTag),
    And,
    Or,
    Not,
    Label(Label),
    Jump(Label),
    JumpIfFalse(Label),
    /// Print the top `n` values in the order they were pushed
    Print(usize),
    Read(TypeTag),
    /// Pop a file name, create the file and push its handle
    FileOpen,
    /// Pop `n` values and a handle, append the values and push the handle
    FileAppend(usize),
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Push(_) => Opcode::Push,
            Instruction::Pop => Opcode::Pop,
            Instruction::Load(_) => Opcode::Load,
            Instruction::Save(_) => Opcode::Save,
            Instruction::Arithmetic(operator, _) => match operator {
                ArithmeticOperator::Add => Opcode::Add,
                ArithmeticOperator::Sub => Opcode::Sub,
                ArithmeticOperator::Mul => Opcode::Mul,
                ArithmeticOperator::Div => Opcode::Div,
            },
            Instruction::Modulo => Opcode::Mod,
            Instruction::Negate(_) => Opcode::Uminus,
            Instruction::Concat => Opcode::Concat,
            Instruction::Widen => Opcode::Itof,
            Instruction::Ordering(OrderingOperator::Less, _) => Opcode::Lt,
            Instruction::Ordering(OrderingOperator::Greater, _) => Opcode::Gt,
            Instruction::Equal(_) => Opcode::Eq,
            Instruction::And => Opcode::And,
            Instruction::Or => Opcode::Or,
            Instruction::Not => Opcode::Not,
            Instruction::Label(_) => Opcode::Label,
            Instruction::Jump(_) => Opcode::Jmp,
            Instruction::JumpIfFalse(_) => Opcode::Fjmp,
            Instruction::Print(_) => Opcode::Print,
            Instruction::Read(_) => Opcode::Read,
            Instruction::FileOpen => Opcode::Fopen,
            Instruction::FileAppend(_) => Opcode::Fappend,
        }
    }

    /// Number of stack slots consumed and produced
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Instruction::Push(_) | Instruction::Load(_) | Instruction::Read(_) => (0, 1),
            Instruction::Pop | Instruction::Save(_) | Instruction::JumpIfFalse(_) => (1, 0),
            Instruction::Arithmetic(..)
            | Instruction::Modulo
            | Instruction::Concat
            | Instruction::Ordering(..)
            | Instruction::Equal(_)
            | Instruction::And
            | Instruction::Or => (2, 1),
            Instruction::Negate(_)
            | Instruction::Widen
            | Instruction::Not
            | Instruction::FileOpen => (1, 1),
            Instruction::Label(_) | Instruction::Jump(_) => (0, 0),
            Instruction::Print(count) => (*count, 0),
            Instruction::FileAppend(count) => (*count + 1, 1),
        }
    }

    /// The label this instruction may transfer control to
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Instruction::Jump(label) | Instruction::JumpIfFalse(label) => Some(*label),
            _ => None,
        }
    }

    /// The tokens after the mnemonic, each with the color it is listed in
    fn operands(&self) -> Vec<(String, Color)> {
        match self {
            Instruction::Push(constant) => vec![
                (constant.tag().to_string(), Color::Yellow),
                (constant.to_string(), Color::Magenta),
            ],
            Instruction::Load(name) | Instruction::Save(name) => {
                vec![(name.value().to_owned(), Color::White)]
            }
            Instruction::Arithmetic(_, tag)
            | Instruction::Negate(tag)
            | Instruction::Ordering(_, tag) => vec![(tag.to_string(), Color::Yellow)],
            Instruction::Equal(tag) | Instruction::Read(tag) => {
                vec![(tag.to_string(), Color::Yellow)]
            }
            Instruction::Label(label) => vec![(label.to_string(), Color::BrightRed)],
            Instruction::Jump(label) | Instruction::JumpIfFalse(label) => {
                vec![(label.to_string(), Color::Blue)]
            }
            Instruction::Print(count) | Instruction::FileAppend(count) => {
                vec![(count.to_string(), Color::Magenta)]
            }
            Instruction::Pop
            | Instruction::Modulo
            | Instruction::Concat
            | Instruction::Widen
            | Instruction::And
            | Instruction::Or
            | Instruction::Not
            | Instruction::FileOpen => vec![],
        }
    }

    /// Text form used by the serialized program, never colored
    pub fn to_plain_string(&self) -> String {
        std::iter::once(self.opcode().to_string())
            .chain(self.operands().into_iter().map(|(text, _)| text))
            .join(" ")
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let opcode = self.opcode().to_string();

        match self {
            Instruction::Label(_) => write!(f, "{}", opcode.bright_red())?,
            _ => write!(f, "{}", opcode.cyan())?,
        }

        for (text, color) in self.operands() {
            write!(f, " {}", text.color(color))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {kind}")]
pub struct BytecodeParseError {
    /// 1-based line in the text
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("unknown instruction '{0}'")]
    UnknownInstruction(String),
    #[error("'{opcode}' expects {expected} operand(s), found {found}")]
    OperandCount {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },
    #[error("invalid type tag '{tag}' for '{opcode}'")]
    InvalidTypeTag { opcode: Opcode, tag: String },
    #[error("malformed {tag} literal '{text}'")]
    MalformedLiteral { tag: TypeTag, text: String },
    #[error("invalid count '{0}'")]
    InvalidCount(String),
    #[error("invalid label '{0}'")]
    InvalidLabel(String),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    #[error("unexpected input after literal: '{0}'")]
    TrailingInput(String),
}

fn expect_operands<'a>(
    opcode: Opcode,
    rest: &'a str,
    expected: usize,
) -> Result<Vec<&'a str>, ParseErrorKind> {
    let operands = rest.split_whitespace().collect_vec();

    if operands.len() != expected {
        return Err(ParseErrorKind::OperandCount {
            opcode,
            expected,
            found: operands.len(),
        });
    }

    Ok(operands)
}

fn parse_tag(opcode: Opcode, text: &str) -> Result<TypeTag, ParseErrorKind> {
    TypeTag::from_str(text).map_err(|_| ParseErrorKind::InvalidTypeTag {
        opcode,
        tag: text.to_owned(),
    })
}

fn parse_numeric_tag(opcode: Opcode, text: &str) -> Result<NumericTag, ParseErrorKind> {
    match parse_tag(opcode, text)? {
        TypeTag::Int => Ok(NumericTag::Int),
        TypeTag::Float => Ok(NumericTag::Float),
        TypeTag::String | TypeTag::Bool => Err(ParseErrorKind::InvalidTypeTag {
            opcode,
            tag: text.to_owned(),
        }),
    }
}

fn parse_count(text: &str) -> Result<usize, ParseErrorKind> {
    text.parse()
        .map_err(|_| ParseErrorKind::InvalidCount(text.to_owned()))
}

fn parse_label(text: &str) -> Result<Label, ParseErrorKind> {
    text.parse::<u32>()
        .map(|n| Label::new(n as usize))
        .map_err(|_| ParseErrorKind::InvalidLabel(text.to_owned()))
}

impl FromStr for Instruction {
    type Err = ParseErrorKind;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (mnemonic, rest) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));

        let opcode = Opcode::from_str(mnemonic)
            .map_err(|_| ParseErrorKind::UnknownInstruction(mnemonic.to_owned()))?;

        let no_operands = |instruction: Instruction| {
            expect_operands(opcode, rest, 0).map(|_| instruction)
        };
        let single = || expect_operands(opcode, rest, 1).map(|operands| operands[0]);

        match opcode {
            Opcode::Push => {
                // The literal is the raw remainder of the line since strings
                // may contain spaces
                let rest = rest.trim_start();
                let (tag, literal) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(ParseErrorKind::OperandCount {
                        opcode,
                        expected: 2,
                        found: usize::from(!rest.is_empty()),
                    })?;
                let tag = parse_tag(opcode, tag)?;

                Constant::parse(tag, literal.trim()).map(Instruction::Push)
            }
            Opcode::Pop => no_operands(Instruction::Pop),
            Opcode::Load => single().map(|name| Instruction::Load(InternedSymbol::new(name))),
            Opcode::Save => single().map(|name| Instruction::Save(InternedSymbol::new(name))),
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let operator = match opcode {
                    Opcode::Add => ArithmeticOperator::Add,
                    Opcode::Sub => ArithmeticOperator::Sub,
                    Opcode::Mul => ArithmeticOperator::Mul,
                    _ => ArithmeticOperator::Div,
                };

                Ok(Instruction::Arithmetic(
                    operator,
                    parse_numeric_tag(opcode, single()?)?,
                ))
            }
            Opcode::Mod => no_operands(Instruction::Modulo),
            Opcode::Uminus => Ok(Instruction::Negate(parse_numeric_tag(opcode, single()?)?)),
            Opcode::Concat => no_operands(Instruction::Concat),
            Opcode::Itof => no_operands(Instruction::Widen),
            Opcode::Lt => Ok(Instruction::Ordering(
                OrderingOperator::Less,
                parse_numeric_tag(opcode, single()?)?,
            )),
            Opcode::Gt => Ok(Instruction::Ordering(
                OrderingOperator::Greater,
                parse_numeric_tag(opcode, single()?)?,
            )),
            Opcode::Eq => Ok(Instruction::Equal(parse_tag(opcode, single()?)?)),
            Opcode::And => no_operands(Instruction::And),
            Opcode::Or => no_operands(Instruction::Or),
            Opcode::Not => no_operands(Instruction::Not),
            Opcode::Label => Ok(Instruction::Label(parse_label(single()?)?)),
            Opcode::Jmp => Ok(Instruction::Jump(parse_label(single()?)?)),
            Opcode::Fjmp => Ok(Instruction::JumpIfFalse(parse_label(single()?)?)),
            Opcode::Print => Ok(Instruction::Print(parse_count(single()?)?)),
            Opcode::Read => Ok(Instruction::Read(parse_tag(opcode, single()?)?)),
            Opcode::Fopen => no_operands(Instruction::FileOpen),
            Opcode::Fappend => Ok(Instruction::FileAppend(parse_count(single()?)?)),
        }
    }
}

/// An ordered instruction sequence: the only thing handed from the code
/// generator to the virtual machine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BytecodeProgram {
    pub instructions: Vec<Instruction>,
}

impl BytecodeProgram {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// One instruction per line, without color
    pub fn to_text(&self) -> String {
        self.instructions
            .iter()
            .map(|instruction| instruction.to_plain_string() + "\n")
            .collect()
    }
}

impl FromStr for BytecodeProgram {
    type Err = BytecodeParseError;

    /// Blank lines and lines starting with `#` are skipped
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        text.lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(i, line)| {
                line.parse()
                    .map_err(|kind| BytecodeParseError { line: i + 1, kind })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl<'a> IntoIterator for &'a BytecodeProgram {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}
