//! The bytecode virtual machine.
//!
//! Executes a [`BytecodeProgram`] against one operand stack and a name keyed
//! variable store. Labels are resolved before the first instruction runs, so a
//! program with a duplicate or dangling label never starts. Any runtime error
//! stops execution; the machine never guesses a value to carry on with.

pub mod error;
pub mod value;

use std::{
    fs::{File, OpenOptions},
    io::{BufRead, StdinLock, Stdout, Write},
};

use hashbrown::HashMap;
use itertools::Itertools;

pub use self::{
    error::VmError,
    value::{FileHandle, Slot, Value, VariableStore},
};
use crate::backend::bytecode::{
    ArithmeticOperator, BytecodeProgram, Instruction, Label, NumericTag, Opcode,
    OrderingOperator, TypeTag, parse_bool,
};

pub struct Machine<R, W> {
    input: R,
    output: W,
    stack: Vec<Slot>,
    variables: VariableStore,
}

impl Machine<StdinLock<'static>, Stdout> {
    /// A machine reading `read` input from stdin and printing to stdout
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Machine<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            stack: Vec::new(),
            variables: VariableStore::new(),
        }
    }

    /// Runs `program` to completion and hands back the final variables
    pub fn run(mut self, program: &BytecodeProgram) -> Result<VariableStore, VmError> {
        let labels = resolve_labels(program)?;
        let mut pc = 0;

        while let Some(instruction) = program.instructions.get(pc) {
            pc = self.step(pc, instruction, &labels)?;
        }

        self.output
            .flush()
            .map_err(|source| VmError::Io { pc, source })?;

        Ok(self.variables)
    }

    /// Executes one instruction and returns the index of the next one
    fn step(
        &mut self,
        pc: usize,
        instruction: &Instruction,
        labels: &HashMap<Label, usize>,
    ) -> Result<usize, VmError> {
        let opcode = instruction.opcode();

        match instruction {
            Instruction::Push(constant) => self.push(constant.into()),
            Instruction::Pop => {
                self.pop(pc, opcode)?;
            }
            Instruction::Load(name) => {
                let slot = self
                    .variables
                    .get(*name)
                    .cloned()
                    .ok_or(VmError::UninitializedVariable { pc, name: *name })?;

                self.stack.push(slot);
            }
            Instruction::Save(name) => {
                let slot = self.pop(pc, opcode)?;
                self.variables.set(*name, slot);
            }
            Instruction::Arithmetic(operator, NumericTag::Int) => {
                let rhs = self.pop_int(pc, opcode)?;
                let lhs = self.pop_int(pc, opcode)?;

                let result = match operator {
                    ArithmeticOperator::Add => lhs.wrapping_add(rhs),
                    ArithmeticOperator::Sub => lhs.wrapping_sub(rhs),
                    ArithmeticOperator::Mul => lhs.wrapping_mul(rhs),
                    ArithmeticOperator::Div => {
                        if rhs == 0 {
                            return Err(VmError::DivisionByZero { pc });
                        }
                        lhs.wrapping_div(rhs)
                    }
                };

                self.push(Value::Int(result));
            }
            Instruction::Arithmetic(operator, NumericTag::Float) => {
                let rhs = self.pop_float(pc, opcode)?;
                let lhs = self.pop_float(pc, opcode)?;

                self.push(Value::Float(match operator {
                    ArithmeticOperator::Add => lhs + rhs,
                    ArithmeticOperator::Sub => lhs - rhs,
                    ArithmeticOperator::Mul => lhs * rhs,
                    ArithmeticOperator::Div => lhs / rhs,
                }));
            }
            Instruction::Modulo => {
                let rhs = self.pop_int(pc, opcode)?;
                let lhs = self.pop_int(pc, opcode)?;

                if rhs == 0 {
                    return Err(VmError::DivisionByZero { pc });
                }

                self.push(Value::Int(lhs.wrapping_rem(rhs)));
            }
            Instruction::Negate(NumericTag::Int) => {
                let operand = self.pop_int(pc, opcode)?;
                self.push(Value::Int(operand.wrapping_neg()));
            }
            Instruction::Negate(NumericTag::Float) => {
                let operand = self.pop_float(pc, opcode)?;
                self.push(Value::Float(-operand));
            }
            Instruction::Concat => {
                // Operands are joined by their printed form
                let [lhs, rhs] = <[Value; 2]>::try_from(self.pop_values(pc, opcode, 2)?)
                    .map_err(|_| VmError::StackUnderflow { pc, opcode })?;

                self.push(Value::String(format!("{lhs}{rhs}")));
            }
            Instruction::Widen => {
                let operand = self.pop_int(pc, opcode)?;
                self.push(Value::Float(operand as f64));
            }
            Instruction::Ordering(operator, tag) => {
                let ordering = match tag {
                    NumericTag::Int => {
                        let rhs = self.pop_int(pc, opcode)?;
                        let lhs = self.pop_int(pc, opcode)?;
                        lhs.partial_cmp(&rhs)
                    }
                    NumericTag::Float => {
                        let rhs = self.pop_float(pc, opcode)?;
                        let lhs = self.pop_float(pc, opcode)?;
                        lhs.partial_cmp(&rhs)
                    }
                };

                let result = match operator {
                    OrderingOperator::Less => ordering.is_some_and(|o| o.is_lt()),
                    OrderingOperator::Greater => ordering.is_some_and(|o| o.is_gt()),
                };

                self.push(Value::Bool(result));
            }
            Instruction::Equal(tag) => {
                let result = match tag {
                    TypeTag::Int => self.pop_int(pc, opcode)? == self.pop_int(pc, opcode)?,
                    TypeTag::Float => self.pop_float(pc, opcode)? == self.pop_float(pc, opcode)?,
                    TypeTag::Bool => self.pop_bool(pc, opcode)? == self.pop_bool(pc, opcode)?,
                    TypeTag::String => {
                        self.pop_string(pc, opcode)? == self.pop_string(pc, opcode)?
                    }
                };

                self.push(Value::Bool(result));
            }
            Instruction::And | Instruction::Or => {
                let rhs = self.pop_bool(pc, opcode)?;
                let lhs = self.pop_bool(pc, opcode)?;

                self.push(Value::Bool(if opcode == Opcode::And {
                    lhs && rhs
                } else {
                    lhs || rhs
                }));
            }
            Instruction::Not => {
                let operand = self.pop_bool(pc, opcode)?;
                self.push(Value::Bool(!operand));
            }
            Instruction::Label(_) => {}
            Instruction::Jump(label) => return jump_target(pc, *label, labels),
            Instruction::JumpIfFalse(label) => {
                if !self.pop_bool(pc, opcode)? {
                    return jump_target(pc, *label, labels);
                }
            }
            Instruction::Print(count) => {
                let values = self.pop_values(pc, opcode, *count)?;

                writeln!(self.output, "{}", values.iter().join(" "))
                    .map_err(|source| VmError::Io { pc, source })?;
            }
            Instruction::Read(tag) => {
                let value = self.read_value(pc, *tag)?;
                self.push(value);
            }
            Instruction::FileOpen => {
                let name = self.pop_string(pc, opcode)?;
                File::create(&name).map_err(|source| VmError::Io { pc, source })?;

                self.stack.push(Slot::Handle(FileHandle::new(name)));
            }
            Instruction::FileAppend(count) => {
                let values = self.pop_values(pc, opcode, *count)?;
                let handle = match self.pop(pc, opcode)? {
                    Slot::Handle(handle) => handle,
                    other => return Err(mismatch(pc, opcode, "file", &other)),
                };

                let mut file = OpenOptions::new()
                    .append(true)
                    .open(handle.path())
                    .map_err(|source| VmError::Io { pc, source })?;

                for value in &values {
                    writeln!(file, "{value}").map_err(|source| VmError::Io { pc, source })?;
                }

                self.stack.push(Slot::Handle(handle));
            }
        }

        Ok(pc + 1)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Slot::Value(value));
    }

    fn pop(&mut self, pc: usize, opcode: Opcode) -> Result<Slot, VmError> {
        self.stack
            .pop()
            .ok_or(VmError::StackUnderflow { pc, opcode })
    }

    /// Pops `count` plain values, returned in the order they were pushed
    fn pop_values(
        &mut self,
        pc: usize,
        opcode: Opcode,
        count: usize,
    ) -> Result<Vec<Value>, VmError> {
        let mut values = (0..count)
            .map(|_| match self.pop(pc, opcode)? {
                Slot::Value(value) => Ok(value),
                other => Err(mismatch(pc, opcode, "value", &other)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        values.reverse();
        Ok(values)
    }

    fn pop_int(&mut self, pc: usize, opcode: Opcode) -> Result<i64, VmError> {
        match self.pop(pc, opcode)? {
            Slot::Value(Value::Int(value)) => Ok(value),
            other => Err(mismatch(pc, opcode, "int", &other)),
        }
    }

    fn pop_float(&mut self, pc: usize, opcode: Opcode) -> Result<f64, VmError> {
        match self.pop(pc, opcode)? {
            Slot::Value(Value::Float(value)) => Ok(value),
            other => Err(mismatch(pc, opcode, "float", &other)),
        }
    }

    fn pop_bool(&mut self, pc: usize, opcode: Opcode) -> Result<bool, VmError> {
        match self.pop(pc, opcode)? {
            Slot::Value(Value::Bool(value)) => Ok(value),
            other => Err(mismatch(pc, opcode, "bool", &other)),
        }
    }

    fn pop_string(&mut self, pc: usize, opcode: Opcode) -> Result<String, VmError> {
        match self.pop(pc, opcode)? {
            Slot::Value(Value::String(value)) => Ok(value),
            other => Err(mismatch(pc, opcode, "string", &other)),
        }
    }

    /// Reads one line of input. Strings take the whole line without its
    /// terminator, everything else is trimmed before parsing.
    fn read_value(&mut self, pc: usize, tag: TypeTag) -> Result<Value, VmError> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|source| VmError::Io { pc, source })?;

        if read == 0 {
            return Err(VmError::EndOfInput { pc });
        }

        let line = line.trim_end_matches(['\n', '\r']);
        let text = line.trim();
        let parse_error = || VmError::InputParse {
            pc,
            tag,
            text: text.to_owned(),
        };

        match tag {
            TypeTag::Int => text.parse().map(Value::Int).map_err(|_| parse_error()),
            TypeTag::Float => text.parse().map(Value::Float).map_err(|_| parse_error()),
            TypeTag::Bool => parse_bool(text).map(Value::Bool).ok_or_else(parse_error),
            TypeTag::String => Ok(Value::String(line.to_owned())),
        }
    }
}

fn mismatch(pc: usize, opcode: Opcode, expected: &'static str, found: &Slot) -> VmError {
    VmError::TypeMismatch {
        pc,
        opcode,
        expected,
        found: found.describe(),
    }
}

fn jump_target(pc: usize, label: Label, labels: &HashMap<Label, usize>) -> Result<usize, VmError> {
    labels
        .get(&label)
        .map(|position| position + 1)
        .ok_or(VmError::UndefinedLabel { pc, label })
}

/// Builds the label table, rejecting duplicate definitions and jumps to labels
/// that are never defined
fn resolve_labels(program: &BytecodeProgram) -> Result<HashMap<Label, usize>, VmError> {
    let mut labels = HashMap::new();

    for (pc, instruction) in program.iter().enumerate() {
        if let Instruction::Label(label) = instruction {
            if let Some(first) = labels.insert(*label, pc) {
                return Err(VmError::DuplicateLabel {
                    label: *label,
                    first,
                    second: pc,
                });
            }
        }
    }

    for (pc, instruction) in program.iter().enumerate() {
        if let Some(label) = instruction.jump_target() {
            if !labels.contains_key(&label) {
                return Err(VmError::UndefinedLabel { pc, label });
            }
        }
    }

    Ok(labels)
}
