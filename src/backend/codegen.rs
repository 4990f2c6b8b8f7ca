//! Lowering of a checked tree to stack machine instructions.
//!
//! Expressions are flattened into postfix order (operands before their
//! operator). Every expression leaves exactly one value on the stack and every
//! statement leaves the stack as it found it. `if` and `while` become labels
//! and jumps, with labels taken from one counter that only ever increases.

use thiserror::Error;

use super::bytecode::{
    ArithmeticOperator, BytecodeProgram, Constant, Instruction, Label, NumericTag,
    OrderingOperator, TypeTag,
};
use crate::{
    frontend::{
        Span,
        ast::{
            BinaryOperatorClass, BinaryOperatorKind, Expression, ExpressionKind, Identifier,
            Literal, Program, Statement, StatementKind, UnaryOperatorKind,
        },
        intern::InternedSymbol,
    },
    index::Index,
    middle::{type_checker::TypeCheckResults, ty::StaticType},
};

/// Raised when the type information handed to the generator does not describe
/// the tree being lowered (the generator never re-checks a program)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("{span} expression has no resolved type")]
    UntypedExpression { span: Span },
    #[error("{span} variable '{name}' has no resolved declaration")]
    UnresolvedVariable { name: InternedSymbol, span: Span },
    #[error("{span} values of type '{ty}' have no instruction encoding")]
    UnencodableType { ty: StaticType, span: Span },
}

pub struct CodeGenerator<'tcx> {
    types: &'tcx TypeCheckResults,
    instructions: Vec<Instruction>,
    next_label: Label,
}

impl<'tcx> CodeGenerator<'tcx> {
    pub fn generate(
        program: &Program,
        types: &'tcx TypeCheckResults,
    ) -> Result<BytecodeProgram, CodegenError> {
        let mut generator = Self {
            types,
            instructions: Vec::new(),
            next_label: Label::new(0),
        };

        for statement in &program.statements {
            generator.lower_statement(statement)?;
        }

        Ok(BytecodeProgram::new(generator.instructions))
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn create_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label.increment_by(1);
        label
    }

    fn expression_type(&self, expression: &Expression) -> Result<StaticType, CodegenError> {
        match self.types.type_of(expression) {
            StaticType::Error => Err(CodegenError::UntypedExpression {
                span: expression.span,
            }),
            ty => Ok(ty),
        }
    }

    fn variable_type(&self, identifier: &Identifier) -> Result<StaticType, CodegenError> {
        self.types
            .symbols
            .type_of(identifier.symbol)
            .ok_or(CodegenError::UnresolvedVariable {
                name: identifier.symbol,
                span: identifier.span,
            })
    }

    fn type_tag(ty: StaticType, span: Span) -> Result<TypeTag, CodegenError> {
        TypeTag::of(ty).ok_or(CodegenError::UnencodableType { ty, span })
    }

    fn lower_statement(&mut self, statement: &Statement) -> Result<(), CodegenError> {
        match &statement.kind {
            StatementKind::Declaration { ty, names } => {
                let ty = StaticType::from(*ty);

                // A file variable has no value until it is opened
                let Some(tag) = TypeTag::of(ty) else {
                    return Ok(());
                };

                for name in names {
                    self.emit(Instruction::Push(Constant::zero(tag)));
                    self.emit(Instruction::Save(name.symbol));
                }
            }
            StatementKind::Expression(expression) => {
                self.lower_expression(expression)?;
                self.emit(Instruction::Pop);
            }
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                let else_label = self.create_label();
                let end_label = self.create_label();

                self.lower_expression(condition)?;
                self.emit(Instruction::JumpIfFalse(else_label));
                self.lower_statement(positive)?;
                self.emit(Instruction::Jump(end_label));
                self.emit(Instruction::Label(else_label));

                if let Some(negative) = negative {
                    self.lower_statement(negative)?;
                }

                self.emit(Instruction::Label(end_label));
            }
            StatementKind::While { condition, body } => {
                let start_label = self.create_label();
                let end_label = self.create_label();

                self.emit(Instruction::Label(start_label));
                self.lower_expression(condition)?;
                self.emit(Instruction::JumpIfFalse(end_label));
                self.lower_statement(body)?;
                self.emit(Instruction::Jump(start_label));
                self.emit(Instruction::Label(end_label));
            }
            StatementKind::Block(statements) => {
                for statement in statements {
                    self.lower_statement(statement)?;
                }
            }
            StatementKind::Write(expressions) => {
                for expression in expressions {
                    self.lower_expression(expression)?;
                }

                self.emit(Instruction::Print(expressions.len()));
            }
            StatementKind::Read(names) => {
                for name in names {
                    let tag = Self::type_tag(self.variable_type(name)?, name.span)?;

                    self.emit(Instruction::Read(tag));
                    self.emit(Instruction::Save(name.symbol));
                }
            }
            StatementKind::FileOpen { target, filename } => {
                self.lower_expression(filename)?;
                self.emit(Instruction::FileOpen);
                self.emit(Instruction::Save(target.symbol));
            }
            StatementKind::FileOutput { file, values } => {
                self.lower_expression(file)?;

                for value in values {
                    self.lower_expression(value)?;
                }

                self.emit(Instruction::FileAppend(values.len()));
                // The handle comes back for chaining; as a statement it is
                // not needed
                self.emit(Instruction::Pop);
            }
            StatementKind::Empty => {}
        }

        Ok(())
    }

    /// Emits code leaving the value of `expression` on the stack and returns
    /// its static type
    fn lower_expression(&mut self, expression: &Expression) -> Result<StaticType, CodegenError> {
        match &expression.kind {
            ExpressionKind::Literal(literal) => {
                let constant = match literal {
                    Literal::Int(v) => Constant::Int(*v),
                    Literal::Float(v) => Constant::Float(*v),
                    Literal::Bool(v) => Constant::Bool(*v),
                    Literal::String(v) => Constant::String(v.clone()),
                };

                self.emit(Instruction::Push(constant));
            }
            ExpressionKind::Variable(identifier) => {
                self.emit(Instruction::Load(identifier.symbol));
            }
            ExpressionKind::Grouping(inner) => {
                self.lower_expression(inner)?;
            }
            ExpressionKind::Binary { lhs, operator, rhs } => {
                self.lower_binary(lhs, *operator, rhs)?;
            }
            ExpressionKind::Unary { operator, operand } => {
                let operand_ty = self.lower_expression(operand)?;

                match operator {
                    UnaryOperatorKind::Not => self.emit(Instruction::Not),
                    UnaryOperatorKind::Negate => {
                        self.emit(Instruction::Negate(NumericTag::of(operand_ty)))
                    }
                }
            }
            ExpressionKind::Assignment { .. } => {
                self.lower_assignment(expression)?;
            }
        }

        self.expression_type(expression)
    }

    fn lower_binary(
        &mut self,
        lhs: &Expression,
        operator: BinaryOperatorKind,
        rhs: &Expression,
    ) -> Result<(), CodegenError> {
        let class = operator.class();

        if matches!(
            class,
            BinaryOperatorClass::Concat | BinaryOperatorClass::Logical
        ) {
            self.lower_expression(lhs)?;
            self.lower_expression(rhs)?;

            self.emit(match operator {
                BinaryOperatorKind::LogicalAnd => Instruction::And,
                BinaryOperatorKind::LogicalOr => Instruction::Or,
                _ => Instruction::Concat,
            });

            return Ok(());
        }

        // The widen for a mixed pair goes right after the int side is pushed
        let lhs_ty = self.expression_type(lhs)?;
        let rhs_ty = self.expression_type(rhs)?;
        let widen = StaticType::needs_widening(lhs_ty, rhs_ty);

        self.lower_expression(lhs)?;
        if widen && lhs_ty == StaticType::Int {
            self.emit(Instruction::Widen);
        }

        self.lower_expression(rhs)?;
        if widen && rhs_ty == StaticType::Int {
            self.emit(Instruction::Widen);
        }

        let operand_ty = StaticType::promote(lhs_ty, rhs_ty).unwrap_or(lhs_ty);
        let numeric = NumericTag::of(operand_ty);

        match operator {
            BinaryOperatorKind::Add => {
                self.emit(Instruction::Arithmetic(ArithmeticOperator::Add, numeric))
            }
            BinaryOperatorKind::Subtract => {
                self.emit(Instruction::Arithmetic(ArithmeticOperator::Sub, numeric))
            }
            BinaryOperatorKind::Multiply => {
                self.emit(Instruction::Arithmetic(ArithmeticOperator::Mul, numeric))
            }
            BinaryOperatorKind::Divide => {
                self.emit(Instruction::Arithmetic(ArithmeticOperator::Div, numeric))
            }
            BinaryOperatorKind::Modulus => self.emit(Instruction::Modulo),
            BinaryOperatorKind::LessThan => {
                self.emit(Instruction::Ordering(OrderingOperator::Less, numeric))
            }
            BinaryOperatorKind::GreaterThan => {
                self.emit(Instruction::Ordering(OrderingOperator::Greater, numeric))
            }
            BinaryOperatorKind::Equals | BinaryOperatorKind::NotEquals => {
                let tag = Self::type_tag(operand_ty, lhs.span)?;
                self.emit(Instruction::Equal(tag));

                if operator == BinaryOperatorKind::NotEquals {
                    self.emit(Instruction::Not);
                }
            }
            BinaryOperatorKind::Concat
            | BinaryOperatorKind::LogicalAnd
            | BinaryOperatorKind::LogicalOr => unreachable!("handled above"),
        }

        Ok(())
    }

    /// `a = b = c = value`: the value is computed once, stored into the
    /// innermost target first and reloaded for each target further out. The
    /// outermost target is reloaded last as the value of the whole expression.
    fn lower_assignment(&mut self, expression: &Expression) -> Result<(), CodegenError> {
        let mut targets = Vec::new();
        let mut current = expression;

        while let ExpressionKind::Assignment { target, value } = &current.kind {
            targets.push(target);
            current = value.ungrouped();
        }

        let mut carried = self.lower_expression(current)?;
        let mut previous: Option<InternedSymbol> = None;

        for target in targets.iter().rev() {
            if let Some(previous) = previous {
                self.emit(Instruction::Load(previous));
            }

            let target_ty = self.variable_type(target)?;

            // Widen once, at the first float target an int value reaches
            if target_ty == StaticType::Float && carried == StaticType::Int {
                self.emit(Instruction::Widen);
                carried = StaticType::Float;
            }

            self.emit(Instruction::Save(target.symbol));
            previous = Some(target.symbol);
        }

        if let Some(outermost) = targets.first() {
            self.emit(Instruction::Load(outermost.symbol));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::verify::verify,
        frontend::ast::{PrimitiveKind, build::TreeBuilder},
        middle::type_checker::{TypeCheckOptions, TypeChecker},
    };

    fn lower(program: &Program) -> BytecodeProgram {
        let types = TypeChecker::check(program, &TypeCheckOptions::default()).unwrap();
        let bytecode = CodeGenerator::generate(program, &types).unwrap();

        verify(&bytecode).unwrap();
        bytecode
    }

    fn listing(program: &BytecodeProgram) -> Vec<String> {
        program.iter().map(|i| i.to_plain_string()).collect()
    }

    fn count_widens(program: &BytecodeProgram) -> usize {
        program
            .iter()
            .filter(|i| matches!(i, Instruction::Widen))
            .count()
    }

    #[test]
    fn declarations_initialize_to_zero() {
        let b = TreeBuilder::new();
        let program = b.program(vec![
            b.declare(PrimitiveKind::Int, &["i"]),
            b.declare(PrimitiveKind::Float, &["f"]),
            b.declare(PrimitiveKind::String, &["s", "t"]),
            b.declare(PrimitiveKind::Bool, &["b"]),
            b.declare(PrimitiveKind::File, &["out"]),
        ]);

        assert_eq!(
            listing(&lower(&program)),
            [
                "push I 0",
                "save i",
                "push F 0.0",
                "save f",
                "push S \"\"",
                "save s",
                "push S \"\"",
                "save t",
                "push B false",
                "save b",
            ]
        );
    }

    #[test]
    fn assignment_then_write() {
        let mut b = TreeBuilder::new();
        let three = b.int(3);
        let assign = b.assign("x", three);
        let x = b.variable("x");
        let program = b.program(vec![
            b.declare(PrimitiveKind::Int, &["x"]),
            b.expression_statement(assign),
            b.write(vec![x]),
        ]);

        assert_eq!(
            listing(&lower(&program)),
            [
                "push I 0", "save x", "push I 3", "save x", "load x", "pop", "load x", "print 1",
            ]
        );
    }

    #[test]
    fn mixed_operands_widen_exactly_once() {
        for int_on_left in [true, false] {
            let mut b = TreeBuilder::new();
            let int = b.variable("i");
            let float = b.variable("f");
            let (lhs, rhs) = if int_on_left {
                (int, float)
            } else {
                (float, int)
            };
            let sum = b.binary(lhs, BinaryOperatorKind::Add, rhs);
            let program = b.program(vec![
                b.declare(PrimitiveKind::Int, &["i"]),
                b.declare(PrimitiveKind::Float, &["f"]),
                b.write(vec![sum]),
            ]);

            let bytecode = lower(&program);
            assert_eq!(count_widens(&bytecode), 1);

            let lines = listing(&bytecode);
            let body = &lines[4..];
            let expected = if int_on_left {
                ["load i", "itof", "load f", "add F", "print 1"]
            } else {
                ["load f", "load i", "itof", "add F", "print 1"]
            };
            assert_eq!(body, expected);
        }
    }

    #[test]
    fn relational_and_inequality() {
        let mut b = TreeBuilder::new();
        let lhs = b.float(1.5);
        let rhs = b.int(2);
        let lt = b.binary(lhs, BinaryOperatorKind::LessThan, rhs);
        let lhs = b.string("a");
        let rhs = b.string("b");
        let ne = b.binary(lhs, BinaryOperatorKind::NotEquals, rhs);
        let program = b.program(vec![b.write(vec![lt, ne])]);

        assert_eq!(
            listing(&lower(&program)),
            [
                "push F 1.5",
                "push I 2",
                "itof",
                "lt F",
                "push S \"a\"",
                "push S \"b\"",
                "eq S",
                "not",
                "print 2",
            ]
        );
    }

    #[test]
    fn assignment_chain_stores_innermost_first() {
        let mut b = TreeBuilder::new();
        let five = b.int(5);
        let c = b.assign("c", five);
        let bb = b.assign("b", c);
        let a = b.assign("a", bb);
        let program = b.program(vec![
            b.declare(PrimitiveKind::Int, &["a", "b", "c"]),
            b.expression_statement(a),
        ]);

        let lines = listing(&lower(&program));
        assert_eq!(
            &lines[6..],
            [
                "push I 5", "save c", "load c", "save b", "load b", "save a", "load a", "pop",
            ]
        );
    }

    #[test]
    fn assignment_chain_widens_at_first_float_target() {
        let mut b = TreeBuilder::new();
        let five = b.int(5);
        let inner = b.assign("i", five);
        let middle = b.assign("f", inner);
        let outer = b.assign("g", middle);
        let program = b.program(vec![
            b.declare(PrimitiveKind::Int, &["i"]),
            b.declare(PrimitiveKind::Float, &["f", "g"]),
            b.expression_statement(outer),
        ]);

        let bytecode = lower(&program);
        assert_eq!(count_widens(&bytecode), 1);
        assert_eq!(
            &listing(&bytecode)[6..],
            [
                "push I 5", "save i", "load i", "itof", "save f", "load f", "save g", "load g",
                "pop",
            ]
        );
    }

    #[test]
    fn grouped_assignment_widens_into_float_target() {
        let mut b = TreeBuilder::new();
        let five = b.int(5);
        let inner = b.assign("i", five);
        let grouped = b.grouping(inner);
        let outer = b.assign("g", grouped);
        let program = b.program(vec![
            b.declare(PrimitiveKind::Int, &["i"]),
            b.declare(PrimitiveKind::Float, &["g"]),
            b.expression_statement(outer),
        ]);

        let bytecode = lower(&program);
        assert_eq!(count_widens(&bytecode), 1);
        assert_eq!(
            &listing(&bytecode)[4..],
            ["push I 5", "save i", "load i", "itof", "save g", "load g", "pop"]
        );
    }

    #[test]
    fn if_else_layout() {
        let mut b = TreeBuilder::new();
        let condition = b.bool(false);
        let one = b.int(1);
        let two = b.int(2);
        let positive = b.write(vec![one]);
        let negative = b.write(vec![two]);
        let program = b.program(vec![b.if_else(condition, positive, Some(negative))]);

        assert_eq!(
            listing(&lower(&program)),
            [
                "push B false",
                "fjmp 0",
                "push I 1",
                "print 1",
                "jmp 1",
                "label 0",
                "push I 2",
                "print 1",
                "label 1",
            ]
        );
    }

    #[test]
    fn while_layout_and_fresh_labels() {
        let mut b = TreeBuilder::new();
        let n = b.variable("n");
        let zero = b.int(0);
        let condition = b.binary(n, BinaryOperatorKind::GreaterThan, zero);
        let n = b.variable("n");
        let one = b.int(1);
        let decrement = b.binary(n, BinaryOperatorKind::Subtract, one);
        let assign = b.assign("n", decrement);
        let body = b.expression_statement(assign);
        let flag = b.bool(true);
        let then = b.empty();
        let program = b.program(vec![
            b.declare(PrimitiveKind::Int, &["n"]),
            b.while_loop(condition, body),
            b.if_else(flag, then, None),
        ]);

        assert_eq!(
            &listing(&lower(&program))[2..],
            [
                "label 0", "load n", "push I 0", "gt I", "fjmp 1", "load n", "push I 1", "sub I",
                "save n", "load n", "pop", "jmp 0", "label 1", "push B true", "fjmp 2", "jmp 3",
                "label 2", "label 3",
            ]
        );
    }

    #[test]
    fn read_and_file_statements() {
        let mut b = TreeBuilder::new();
        let name = b.string("log.txt");
        let open = b.file_open("out", name);
        let file = b.variable("out");
        let x = b.variable("x");
        let text = b.string("done");
        let output = b.file_output(file, vec![x, text]);
        let program = b.program(vec![
            b.declare(PrimitiveKind::File, &["out"]),
            b.declare(PrimitiveKind::Float, &["x"]),
            b.read(&["x"]),
            open,
            output,
        ]);

        assert_eq!(
            listing(&lower(&program)),
            [
                "push F 0.0",
                "save x",
                "read F",
                "save x",
                "push S \"log.txt\"",
                "fopen",
                "save out",
                "load out",
                "load x",
                "push S \"done\"",
                "fappend 2",
                "pop",
            ]
        );
    }

    #[test]
    fn mismatched_type_results_are_rejected() {
        let mut b = TreeBuilder::new();
        let x = b.variable("x");
        let program = b.program(vec![b.write(vec![x])]);

        let error = CodeGenerator::generate(&program, &TypeCheckResults::default()).unwrap_err();
        assert!(matches!(error, CodegenError::UntypedExpression { .. }));
    }
}
