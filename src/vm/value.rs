use std::path::{Path, PathBuf};

use hashbrown::HashMap;

use crate::{backend::bytecode::Constant, frontend::intern::InternedSymbol};

/// A runtime value. Mirrors [`Constant`] but lives on the operand stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Int(v) => Value::Int(*v),
            Constant::Float(v) => Value::Float(*v),
            Constant::Bool(v) => Value::Bool(*v),
            Constant::String(v) => Value::String(v.clone()),
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

/// An open output file. Appends reopen the file by path so the handle stays a
/// plain value that can be copied between variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle(PathBuf);

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// One operand stack entry or variable
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    Handle(FileHandle),
}

impl Slot {
    /// Name of the kind of thing held, for error messages
    pub fn describe(&self) -> &'static str {
        match self {
            Slot::Value(Value::Int(_)) => "int",
            Slot::Value(Value::Float(_)) => "float",
            Slot::Value(Value::Bool(_)) => "bool",
            Slot::Value(Value::String(_)) => "string",
            Slot::Handle(_) => "file",
        }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Value(value)
    }
}

/// Variables by name, created on first `save`
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    slots: HashMap<InternedSymbol, Slot>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: InternedSymbol) -> Option<&Slot> {
        self.slots.get(&name)
    }

    pub fn set(&mut self, name: InternedSymbol, slot: Slot) {
        self.slots.insert(name, slot);
    }

    /// Looks a variable up by its source name, if it holds a plain value
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(InternedSymbol::new(name))? {
            Slot::Value(value) => Some(value),
            Slot::Handle(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
