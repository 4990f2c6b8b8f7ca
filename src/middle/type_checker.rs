//! Static checking of a whole program.
//!
//! The checker walks every statement in order, declaring names into a single
//! flat [`SymbolTable`] and computing the static type of every expression.
//! Problems are collected as [`Diagnostic`]s rather than aborting, so one run
//! reports everything that is wrong with a program.
//!
//! An expression which could not be typed gets [`StaticType::Error`]. Unless
//! [`TypeCheckOptions::cascade_errors`] is set, a parent never reports a
//! second diagnostic because one of its operands already failed.

use hashbrown::HashMap;

use super::{
    diagnostic::{ConditionKind, Diagnostic, DiagnosticKind},
    symbol_table::SymbolTable,
    ty::StaticType,
};
use crate::frontend::{
    Span,
    ast::{
        BinaryOperatorClass, BinaryOperatorKind, Expression, ExpressionKind, Identifier, Literal,
        NodeId, Program, Statement, StatementKind, UnaryOperatorKind,
    },
};

/// How `&&` and `||` constrain their operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogicalOperandPolicy {
    /// Both operands must have the same type and the result has that type.
    /// This is the historical behavior of the language and is kept as the
    /// default; note that it lets `1 && 2` through to run time.
    #[default]
    MatchingTypes,
    /// Both operands must be bool and the result is bool
    RequireBool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeCheckOptions {
    pub logical_operands: LogicalOperandPolicy,
    /// Report a diagnostic on a parent expression even when one of its
    /// operands already failed to type (legacy behavior)
    pub cascade_errors: bool,
}

/// Everything later phases need from checking: the resolved symbol table and
/// the static type of each expression node.
#[derive(Debug, Clone, Default)]
pub struct TypeCheckResults {
    pub symbols: SymbolTable,
    expression_types: HashMap<NodeId, StaticType>,
}

impl TypeCheckResults {
    /// The static type computed for an expression node. Nodes the checker never
    /// saw (which can only happen when handing results for one tree to
    /// another) are reported as [`StaticType::Error`].
    pub fn get_type(&self, id: NodeId) -> StaticType {
        self.expression_types
            .get(&id)
            .copied()
            .unwrap_or(StaticType::Error)
    }

    pub fn type_of(&self, expression: &Expression) -> StaticType {
        self.get_type(expression.id)
    }
}

#[derive(Debug)]
pub struct TypeChecker<'options> {
    options: &'options TypeCheckOptions,
    symbols: SymbolTable,
    expression_types: HashMap<NodeId, StaticType>,
    diagnostics: Vec<Diagnostic>,
}

impl<'options> TypeChecker<'options> {
    /// Checks the whole program. Returns the resolved types when it is well
    /// typed and every diagnostic found otherwise.
    pub fn check(
        program: &Program,
        options: &'options TypeCheckOptions,
    ) -> Result<TypeCheckResults, Vec<Diagnostic>> {
        let mut checker = Self {
            options,
            symbols: SymbolTable::new(),
            expression_types: HashMap::new(),
            diagnostics: Vec::new(),
        };

        for statement in &program.statements {
            checker.check_statement(statement);
        }

        if checker.diagnostics.is_empty() {
            Ok(TypeCheckResults {
                symbols: checker.symbols,
                expression_types: checker.expression_types,
            })
        } else {
            Err(checker.diagnostics)
        }
    }

    fn report(&mut self, span: Span, kind: DiagnosticKind) {
        self.diagnostics.push(Diagnostic::new(span, kind));
    }

    /// True when one of the types already carries an error that has been
    /// reported, meaning the caller should stay quiet
    fn poisoned(&self, types: &[StaticType]) -> bool {
        !self.options.cascade_errors && types.iter().any(|ty| ty.is_error())
    }

    fn lookup(&mut self, identifier: &Identifier) -> StaticType {
        match self.symbols.type_of(identifier.symbol) {
            Some(ty) => ty,
            None => {
                self.report(
                    identifier.span,
                    DiagnosticKind::UndeclaredVariable {
                        name: identifier.symbol,
                    },
                );
                StaticType::Error
            }
        }
    }

    fn check_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Declaration { ty, names } => {
                let ty = StaticType::from(*ty);

                for name in names {
                    if self.symbols.declare(name.symbol, ty, name.span).is_err() {
                        self.report(
                            name.span,
                            DiagnosticKind::DuplicateDeclaration { name: name.symbol },
                        );
                    }
                }
            }
            StatementKind::Expression(expression) => {
                self.check_expression(expression);
            }
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                self.check_condition(condition, statement.span, ConditionKind::If);
                self.check_statement(positive);

                if let Some(negative) = negative {
                    self.check_statement(negative);
                }
            }
            StatementKind::While { condition, body } => {
                self.check_condition(condition, statement.span, ConditionKind::While);
                self.check_statement(body);
            }
            StatementKind::Block(statements) => {
                for statement in statements {
                    self.check_statement(statement);
                }
            }
            StatementKind::Write(expressions) => {
                for expression in expressions {
                    let ty = self.check_expression(expression);

                    if ty == StaticType::File {
                        self.report(
                            expression.span,
                            DiagnosticKind::UnprintableValue { actual: ty },
                        );
                    }
                }
            }
            StatementKind::Read(names) => {
                for name in names {
                    let ty = self.lookup(name);

                    if ty == StaticType::File {
                        self.report(
                            name.span,
                            DiagnosticKind::UnreadableTarget {
                                name: name.symbol,
                                ty,
                            },
                        );
                    }
                }
            }
            StatementKind::FileOpen { target, filename } => {
                let filename_ty = self.check_expression(filename);
                let target_ty = self.lookup(target);

                if !target_ty.is_error() && target_ty != StaticType::File {
                    self.report(
                        target.span,
                        DiagnosticKind::NotAFile {
                            name: target.symbol,
                        },
                    );
                }

                if !self.poisoned(&[filename_ty]) && filename_ty != StaticType::String {
                    self.report(
                        filename.span,
                        DiagnosticKind::FileNameNotString {
                            actual: filename_ty,
                        },
                    );
                }
            }
            StatementKind::FileOutput { file, values } => {
                let file_ty = self.check_expression(file);

                if !self.poisoned(&[file_ty]) && file_ty != StaticType::File {
                    self.report(
                        file.span,
                        DiagnosticKind::OutputTargetNotFile { actual: file_ty },
                    );
                }

                for value in values {
                    let ty = self.check_expression(value);

                    if !self.poisoned(&[ty])
                        && !matches!(
                            ty,
                            StaticType::Int | StaticType::Float | StaticType::String
                        )
                    {
                        self.report(value.span, DiagnosticKind::UnwritableValue { actual: ty });
                    }
                }
            }
            StatementKind::Empty => {}
        }
    }

    fn check_condition(&mut self, condition: &Expression, span: Span, kind: ConditionKind) {
        let ty = self.check_expression(condition);

        if !self.poisoned(&[ty]) && ty != StaticType::Bool {
            self.report(span, DiagnosticKind::ConditionNotBool { kind, actual: ty });
        }
    }

    fn check_expression(&mut self, expression: &Expression) -> StaticType {
        let ty = match &expression.kind {
            ExpressionKind::Literal(literal) => match literal {
                Literal::Int(_) => StaticType::Int,
                Literal::Float(_) => StaticType::Float,
                Literal::Bool(_) => StaticType::Bool,
                Literal::String(_) => StaticType::String,
            },
            ExpressionKind::Variable(identifier) => self.lookup(identifier),
            ExpressionKind::Grouping(inner) => self.check_expression(inner),
            ExpressionKind::Binary { lhs, operator, rhs } => {
                let lhs = self.check_expression(lhs);
                let rhs = self.check_expression(rhs);

                self.check_binary(expression.span, *operator, lhs, rhs)
            }
            ExpressionKind::Unary { operator, operand } => {
                let operand = self.check_expression(operand);

                self.check_unary(expression.span, *operator, operand)
            }
            ExpressionKind::Assignment { target, value } => {
                let value_ty = self.check_expression(value);
                let target_ty = self.lookup(target);

                if !self.poisoned(&[target_ty, value_ty]) && !target_ty.accepts(value_ty) {
                    self.report(
                        expression.span,
                        DiagnosticKind::AssignmentMismatch {
                            target: target_ty,
                            value: value_ty,
                        },
                    );
                }

                // The assignment has the type of its target even when the
                // value was wrong, so chains keep checking
                target_ty
            }
        };

        self.expression_types.insert(expression.id, ty);
        ty
    }

    fn check_binary(
        &mut self,
        span: Span,
        operator: BinaryOperatorKind,
        lhs: StaticType,
        rhs: StaticType,
    ) -> StaticType {
        let result_if_poisoned = match operator.class() {
            BinaryOperatorClass::Equality | BinaryOperatorClass::Relational => StaticType::Bool,
            _ => StaticType::Error,
        };

        if self.poisoned(&[lhs, rhs]) {
            return result_if_poisoned;
        }

        match operator.class() {
            BinaryOperatorClass::Arithmetic => {
                let Some(promoted) = StaticType::promote(lhs, rhs) else {
                    self.report(span, DiagnosticKind::InvalidOperands { operator, lhs, rhs });
                    return StaticType::Error;
                };

                if operator == BinaryOperatorKind::Modulus && promoted != StaticType::Int {
                    self.report(span, DiagnosticKind::ModuloNonInteger);
                    return StaticType::Error;
                }

                promoted
            }
            BinaryOperatorClass::Concat => {
                if lhs == StaticType::String && rhs == StaticType::String {
                    StaticType::String
                } else {
                    self.report(span, DiagnosticKind::InvalidOperands { operator, lhs, rhs });
                    StaticType::Error
                }
            }
            BinaryOperatorClass::Equality => {
                if lhs != rhs {
                    self.report(span, DiagnosticKind::EqualityMismatch { operator, lhs, rhs });
                } else if lhs == StaticType::File {
                    // Handles have no comparable value
                    self.report(span, DiagnosticKind::InvalidOperands { operator, lhs, rhs });
                }

                StaticType::Bool
            }
            BinaryOperatorClass::Relational => {
                if !(lhs.is_numeric() && rhs.is_numeric()) {
                    self.report(
                        span,
                        DiagnosticKind::RelationalMismatch { operator, lhs, rhs },
                    );
                }

                StaticType::Bool
            }
            BinaryOperatorClass::Logical => match self.options.logical_operands {
                LogicalOperandPolicy::MatchingTypes => {
                    if lhs == rhs {
                        lhs
                    } else {
                        self.report(span, DiagnosticKind::LogicalMismatch { operator, lhs, rhs });
                        StaticType::Error
                    }
                }
                LogicalOperandPolicy::RequireBool => {
                    if lhs == StaticType::Bool && rhs == StaticType::Bool {
                        StaticType::Bool
                    } else {
                        self.report(span, DiagnosticKind::LogicalMismatch { operator, lhs, rhs });
                        StaticType::Error
                    }
                }
            },
        }
    }

    fn check_unary(
        &mut self,
        span: Span,
        operator: UnaryOperatorKind,
        operand: StaticType,
    ) -> StaticType {
        if self.poisoned(&[operand]) {
            return StaticType::Error;
        }

        match operator {
            UnaryOperatorKind::Not => {
                if operand == StaticType::Bool {
                    StaticType::Bool
                } else {
                    self.report(span, DiagnosticKind::NotOperand { operand });
                    StaticType::Error
                }
            }
            UnaryOperatorKind::Negate => {
                if operand.is_numeric() {
                    operand
                } else {
                    self.report(span, DiagnosticKind::NegateOperand { operand });
                    StaticType::Error
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{PrimitiveKind, build::TreeBuilder};

    fn check(program: &Program) -> Result<TypeCheckResults, Vec<Diagnostic>> {
        TypeChecker::check(program, &TypeCheckOptions::default())
    }

    fn kinds(diagnostics: &[Diagnostic]) -> Vec<&DiagnosticKind> {
        diagnostics.iter().map(|d| &d.kind).collect()
    }

    #[test]
    fn simple_program_is_well_typed() {
        let mut b = TreeBuilder::new();
        let three = b.int(3);
        let assign = b.assign("x", three);
        let x = b.variable("x");
        let program = b.program(vec![
            b.declare(PrimitiveKind::Int, &["x"]),
            b.expression_statement(assign),
            b.write(vec![x]),
        ]);

        let results = check(&program).unwrap();
        assert_eq!(
            results.symbols.type_of("x".into()),
            Some(StaticType::Int)
        );
    }

    #[test]
    fn duplicate_declaration_points_at_identifier() {
        let mut b = TreeBuilder::new();
        let first = b.declare(PrimitiveKind::Int, &["a"]);
        b.at(2, 6);
        let second = b.declare(PrimitiveKind::Float, &["a"]);
        let program = b.program(vec![first, second]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].span, Span::new(2, 6));
        assert!(diagnostics[0].message().contains("'a'"));
    }

    #[test]
    fn string_assigned_int_is_one_mismatch() {
        let mut b = TreeBuilder::new();
        let one = b.int(1);
        let assign = b.assign("s", one);
        let program = b.program(vec![
            b.declare(PrimitiveKind::String, &["s"]),
            b.expression_statement(assign),
        ]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(
            kinds(&diagnostics),
            [&DiagnosticKind::AssignmentMismatch {
                target: StaticType::String,
                value: StaticType::Int,
            }]
        );
    }

    #[test]
    fn int_widens_into_float_target_only() {
        let mut b = TreeBuilder::new();
        let one = b.int(1);
        let widen = b.assign("f", one);
        let half = b.float(0.5);
        let narrow = b.assign("i", half);
        let program = b.program(vec![
            b.declare(PrimitiveKind::Float, &["f"]),
            b.declare(PrimitiveKind::Int, &["i"]),
            b.expression_statement(widen),
            b.expression_statement(narrow),
        ]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::AssignmentMismatch {
                target: StaticType::Int,
                value: StaticType::Float,
            }
        ));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        let mut b = TreeBuilder::new();
        let lhs = b.int(1);
        let rhs = b.float(2.0);
        let sum = b.binary(lhs, BinaryOperatorKind::Add, rhs);
        let sum_id = sum.id;
        let lhs = b.float(1.0);
        let rhs = b.int(2);
        let product = b.binary(lhs, BinaryOperatorKind::Multiply, rhs);
        let product_id = product.id;
        let program = b.program(vec![
            b.expression_statement(sum),
            b.expression_statement(product),
        ]);

        let results = check(&program).unwrap();
        assert_eq!(results.get_type(sum_id), StaticType::Float);
        assert_eq!(results.get_type(product_id), StaticType::Float);
    }

    #[test]
    fn modulo_with_float_has_its_own_error() {
        let mut b = TreeBuilder::new();
        let lhs = b.float(5.0);
        let rhs = b.int(2);
        let modulo = b.binary(lhs, BinaryOperatorKind::Modulus, rhs);
        let program = b.program(vec![b.expression_statement(modulo)]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(kinds(&diagnostics), [&DiagnosticKind::ModuloNonInteger]);
    }

    #[test]
    fn strings_only_concatenate() {
        let mut b = TreeBuilder::new();
        let lhs = b.string("a");
        let rhs = b.string("b");
        let concat = b.binary(lhs, BinaryOperatorKind::Concat, rhs);
        let lhs = b.string("a");
        let rhs = b.int(1);
        let plus = b.binary(lhs, BinaryOperatorKind::Add, rhs);
        let lhs = b.int(1);
        let rhs = b.int(2);
        let dot = b.binary(lhs, BinaryOperatorKind::Concat, rhs);
        let program = b.program(vec![
            b.expression_statement(concat),
            b.expression_statement(plus),
            b.expression_statement(dot),
        ]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(diagnostics.len(), 2);
        assert!(
            diagnostics
                .iter()
                .all(|d| matches!(d.kind, DiagnosticKind::InvalidOperands { .. }))
        );
    }

    #[test]
    fn equality_requires_identical_types() {
        let mut b = TreeBuilder::new();
        let lhs = b.int(1);
        let rhs = b.float(1.0);
        let eq = b.binary(lhs, BinaryOperatorKind::Equals, rhs);
        let program = b.program(vec![b.expression_statement(eq)]);

        let diagnostics = check(&program).unwrap_err();
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::EqualityMismatch { .. }
        ));
    }

    #[test]
    fn relational_accepts_mixed_numbers() {
        let mut b = TreeBuilder::new();
        let lhs = b.int(1);
        let rhs = b.float(1.5);
        let lt = b.binary(lhs, BinaryOperatorKind::LessThan, rhs);
        let lhs = b.string("x");
        let rhs = b.int(1);
        let gt = b.binary(lhs, BinaryOperatorKind::GreaterThan, rhs);
        let program = b.program(vec![b.expression_statement(lt), b.expression_statement(gt)]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::RelationalMismatch { .. }
        ));
    }

    #[test]
    fn logical_policy_is_configurable() {
        let mut b = TreeBuilder::new();
        let lhs = b.int(1);
        let rhs = b.int(2);
        let and = b.binary(lhs, BinaryOperatorKind::LogicalAnd, rhs);
        let and_id = and.id;
        let program = b.program(vec![b.expression_statement(and)]);

        let results = check(&program).unwrap();
        assert_eq!(results.get_type(and_id), StaticType::Int);

        let strict = TypeCheckOptions {
            logical_operands: LogicalOperandPolicy::RequireBool,
            ..Default::default()
        };
        let diagnostics = TypeChecker::check(&program, &strict).unwrap_err();
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::LogicalMismatch { .. }
        ));
    }

    #[test]
    fn error_type_suppresses_cascades() {
        // (missing + 1) * 2 should only complain about `missing`
        let mut b = TreeBuilder::new();
        let missing = b.variable("missing");
        let one = b.int(1);
        let sum = b.binary(missing, BinaryOperatorKind::Add, one);
        let two = b.int(2);
        let product = b.binary(sum, BinaryOperatorKind::Multiply, two);
        let program = b.program(vec![b.expression_statement(product)]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::UndeclaredVariable { .. }
        ));

        let legacy = TypeCheckOptions {
            cascade_errors: true,
            ..Default::default()
        };
        let diagnostics = TypeChecker::check(&program, &legacy).unwrap_err();
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn conditions_must_be_bool_and_bodies_are_still_checked() {
        let mut b = TreeBuilder::new();
        let condition = b.int(1);
        let missing = b.variable("nope");
        let body = b.write(vec![missing]);
        let program = b.program(vec![b.while_loop(condition, body)]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(diagnostics.len(), 2);
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::ConditionNotBool {
                kind: ConditionKind::While,
                actual: StaticType::Int,
            }
        ));
        assert!(matches!(
            diagnostics[1].kind,
            DiagnosticKind::UndeclaredVariable { .. }
        ));
    }

    #[test]
    fn unary_operators() {
        let mut b = TreeBuilder::new();
        let flag = b.bool(true);
        let not = b.unary(UnaryOperatorKind::Not, flag);
        let number = b.float(1.0);
        let negated = b.unary(UnaryOperatorKind::Negate, number);
        let number = b.int(1);
        let bad_not = b.unary(UnaryOperatorKind::Not, number);
        let text = b.string("x");
        let bad_negate = b.unary(UnaryOperatorKind::Negate, text);
        let program = b.program(vec![
            b.expression_statement(not),
            b.expression_statement(negated),
            b.expression_statement(bad_not),
            b.expression_statement(bad_negate),
        ]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(
            kinds(&diagnostics),
            [
                &DiagnosticKind::NotOperand {
                    operand: StaticType::Int
                },
                &DiagnosticKind::NegateOperand {
                    operand: StaticType::String
                },
            ]
        );
    }

    #[test]
    fn file_operations() {
        let mut b = TreeBuilder::new();
        let name = b.string("out.txt");
        let open = b.file_open("f", name);
        let bad_name = b.int(3);
        let open_int = b.file_open("n", bad_name);
        let file = b.variable("f");
        let value = b.int(1);
        let flag = b.bool(true);
        let output = b.file_output(file, vec![value, flag]);
        let not_file = b.variable("n");
        let value = b.string("x");
        let bad_output = b.file_output(not_file, vec![value]);
        let program = b.program(vec![
            b.declare(PrimitiveKind::File, &["f"]),
            b.declare(PrimitiveKind::Int, &["n"]),
            open,
            open_int,
            output,
            bad_output,
        ]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(
            kinds(&diagnostics),
            [
                &DiagnosticKind::NotAFile { name: "n".into() },
                &DiagnosticKind::FileNameNotString {
                    actual: StaticType::Int
                },
                &DiagnosticKind::UnwritableValue {
                    actual: StaticType::Bool
                },
                &DiagnosticKind::OutputTargetNotFile {
                    actual: StaticType::Int
                },
            ]
        );
    }

    #[test]
    fn file_values_are_not_printed_read_or_compared() {
        let mut b = TreeBuilder::new();
        let printed = b.variable("f");
        let write = b.write(vec![printed]);
        b.at(3, 5);
        let read = b.read(&["f"]);
        let lhs = b.variable("f");
        let rhs = b.variable("g");
        let comparison = b.binary(lhs, BinaryOperatorKind::Equals, rhs);
        let program = b.program(vec![
            b.declare(PrimitiveKind::File, &["f", "g"]),
            write,
            read,
            b.expression_statement(comparison),
        ]);

        let diagnostics = check(&program).unwrap_err();
        assert_eq!(
            kinds(&diagnostics),
            [
                &DiagnosticKind::UnprintableValue {
                    actual: StaticType::File
                },
                &DiagnosticKind::UnreadableTarget {
                    name: "f".into(),
                    ty: StaticType::File
                },
                &DiagnosticKind::InvalidOperands {
                    operator: BinaryOperatorKind::Equals,
                    lhs: StaticType::File,
                    rhs: StaticType::File
                },
            ]
        );
        assert_eq!(diagnostics[1].span, Span::new(3, 5));
    }

    #[test]
    fn assignment_chain_has_target_type() {
        let mut b = TreeBuilder::new();
        let five = b.int(5);
        let inner = b.assign("i", five);
        let outer = b.assign("f", inner);
        let outer_id = outer.id;
        let program = b.program(vec![
            b.declare(PrimitiveKind::Int, &["i"]),
            b.declare(PrimitiveKind::Float, &["f"]),
            b.expression_statement(outer),
        ]);

        let results = check(&program).unwrap();
        assert_eq!(results.get_type(outer_id), StaticType::Float);
    }
}
