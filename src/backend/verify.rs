//! Static stack discipline.
//!
//! Computes the operand stack depth before every reachable instruction by
//! walking the control flow graph from the first instruction. A program that
//! verifies never underflows, reaches every join point with one agreed depth
//! and leaves nothing on the stack when it falls off the end.

use hashbrown::HashMap;
use thiserror::Error;

use super::bytecode::{BytecodeProgram, Instruction, Label};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackReport {
    /// Deepest the operand stack gets on any path
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("label {label} is defined at both {first} and {second}")]
    DuplicateLabel {
        label: Label,
        first: usize,
        second: usize,
    },
    #[error("instruction {pc} jumps to undefined label {label}")]
    UndefinedLabel { pc: usize, label: Label },
    #[error("instruction {pc} needs {needed} operands but the stack holds {depth}")]
    StackUnderflow {
        pc: usize,
        needed: usize,
        depth: usize,
    },
    #[error("instruction {pc} is reached with stack depths {first} and {second}")]
    DepthMismatch {
        pc: usize,
        first: usize,
        second: usize,
    },
    #[error("program ends with {depth} values left on the stack")]
    UnbalancedExit { depth: usize },
}

/// Maps every label to the index of its `label` instruction
pub fn label_positions(program: &BytecodeProgram) -> Result<HashMap<Label, usize>, VerifyError> {
    let mut labels = HashMap::new();

    for (pc, instruction) in program.iter().enumerate() {
        if let Instruction::Label(label) = instruction {
            if let Some(first) = labels.insert(*label, pc) {
                return Err(VerifyError::DuplicateLabel {
                    label: *label,
                    first,
                    second: pc,
                });
            }
        }
    }

    Ok(labels)
}

pub fn verify(program: &BytecodeProgram) -> Result<StackReport, VerifyError> {
    let labels = label_positions(program)?;
    let instructions = &program.instructions;

    // Every jump must resolve, reachable or not
    for (pc, instruction) in instructions.iter().enumerate() {
        if let Some(label) = instruction.jump_target() {
            if !labels.contains_key(&label) {
                return Err(VerifyError::UndefinedLabel { pc, label });
            }
        }
    }

    let mut depths: Vec<Option<usize>> = vec![None; instructions.len()];
    let mut worklist = vec![(0usize, 0usize)];
    let mut max_depth = 0;

    while let Some((pc, depth)) = worklist.pop() {
        if pc == instructions.len() {
            if depth != 0 {
                return Err(VerifyError::UnbalancedExit { depth });
            }
            continue;
        }

        match depths[pc] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(VerifyError::DepthMismatch {
                    pc,
                    first: seen,
                    second: depth,
                });
            }
            None => depths[pc] = Some(depth),
        }

        let instruction = &instructions[pc];
        let (pops, pushes) = instruction.stack_effect();

        if depth < pops {
            return Err(VerifyError::StackUnderflow {
                pc,
                needed: pops,
                depth,
            });
        }

        let after = depth - pops + pushes;
        max_depth = max_depth.max(after);

        let target = instruction.jump_target().map(|label| labels[&label] + 1);

        match instruction {
            Instruction::Jump(_) => worklist.extend(target.map(|t| (t, after))),
            Instruction::JumpIfFalse(_) => {
                worklist.extend(target.map(|t| (t, after)));
                worklist.push((pc + 1, after));
            }
            _ => worklist.push((pc + 1, after)),
        }
    }

    Ok(StackReport { max_depth })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::index::Index;

    fn verify_text(text: &str) -> Result<StackReport, VerifyError> {
        verify(&text.parse().unwrap())
    }

    #[test]
    fn balanced_loop_verifies() {
        let report = verify_text(indoc! {"
            push I 5
            save n
            label 0
            load n
            push I 0
            gt I
            fjmp 1
            load n
            push I 1
            sub I
            save n
            jmp 0
            label 1
        "})
        .unwrap();

        assert_eq!(report.max_depth, 2);
    }

    #[test]
    fn empty_program_verifies() {
        assert_eq!(verify_text("").unwrap().max_depth, 0);
    }

    #[test]
    fn detects_underflow() {
        let error = verify_text(indoc! {"
            push I 1
            add I
        "})
        .unwrap_err();

        assert_eq!(
            error,
            VerifyError::StackUnderflow {
                pc: 1,
                needed: 2,
                depth: 1
            }
        );
    }

    #[test]
    fn detects_leftover_values() {
        let error = verify_text("push S \"left\"").unwrap_err();
        assert_eq!(error, VerifyError::UnbalancedExit { depth: 1 });
    }

    #[test]
    fn detects_bad_labels() {
        let error = verify_text(indoc! {"
            label 3
            label 3
        "})
        .unwrap_err();
        assert!(matches!(error, VerifyError::DuplicateLabel { first: 0, second: 1, .. }));

        let error = verify_text("jmp 9").unwrap_err();
        assert_eq!(
            error,
            VerifyError::UndefinedLabel {
                pc: 0,
                label: Label::new(9)
            }
        );
    }

    #[test]
    fn detects_depth_mismatch_at_join() {
        // The false branch skips the push, so the code after `label 0` is
        // reached with two different depths
        let error = verify_text(indoc! {"
            push B true
            fjmp 0
            push I 1
            label 0
            pop
        "})
        .unwrap_err();

        assert!(matches!(error, VerifyError::DepthMismatch { pc: 4, .. }));
    }
}
