//! Node construction for front ends. The builder hands out unique
//! [`NodeId`]s and stamps every node with the position set by
//! [`TreeBuilder::at`].

use super::{
    BinaryOperatorKind, Expression, ExpressionKind, Identifier, Literal, NodeId, PrimitiveKind,
    Program, Statement, StatementKind, UnaryOperatorKind,
};
use crate::{
    frontend::{Span, intern::InternedSymbol},
    index::Index,
};

#[derive(Debug)]
pub struct TreeBuilder {
    next_node_id: NodeId,
    span: Span,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            next_node_id: NodeId::new(0),
            span: Span::new(1, 0),
        }
    }

    /// Sets the position used for every node built after this call
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        self.span = Span::new(line, column);
        self
    }

    fn next_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id.increment_by(1);
        id
    }

    pub fn identifier(&self, name: &str) -> Identifier {
        Identifier {
            span: self.span,
            symbol: InternedSymbol::new(name),
        }
    }

    pub fn program(&self, statements: Vec<Statement>) -> Program {
        Program { statements }
    }

    /* Expressions */

    pub fn expression(&mut self, kind: ExpressionKind) -> Expression {
        Expression {
            id: self.next_id(),
            span: self.span,
            kind,
        }
    }

    pub fn int(&mut self, value: i64) -> Expression {
        self.expression(ExpressionKind::Literal(Literal::Int(value)))
    }

    pub fn float(&mut self, value: f64) -> Expression {
        self.expression(ExpressionKind::Literal(Literal::Float(value)))
    }

    pub fn bool(&mut self, value: bool) -> Expression {
        self.expression(ExpressionKind::Literal(Literal::Bool(value)))
    }

    pub fn string(&mut self, value: &str) -> Expression {
        self.expression(ExpressionKind::Literal(Literal::String(value.to_owned())))
    }

    pub fn variable(&mut self, name: &str) -> Expression {
        let identifier = self.identifier(name);
        self.expression(ExpressionKind::Variable(identifier))
    }

    pub fn grouping(&mut self, inner: Expression) -> Expression {
        self.expression(ExpressionKind::Grouping(Box::new(inner)))
    }

    pub fn binary(
        &mut self,
        lhs: Expression,
        operator: BinaryOperatorKind,
        rhs: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::Binary {
            lhs: Box::new(lhs),
            operator,
            rhs: Box::new(rhs),
        })
    }

    pub fn unary(&mut self, operator: UnaryOperatorKind, operand: Expression) -> Expression {
        self.expression(ExpressionKind::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    pub fn assign(&mut self, target: &str, value: Expression) -> Expression {
        let target = self.identifier(target);
        self.expression(ExpressionKind::Assignment {
            target,
            value: Box::new(value),
        })
    }

    /* Statements */

    pub fn statement(&self, kind: StatementKind) -> Statement {
        Statement {
            span: self.span,
            kind,
        }
    }

    pub fn declare(&self, ty: PrimitiveKind, names: &[&str]) -> Statement {
        let names = names.iter().map(|name| self.identifier(name)).collect();
        self.statement(StatementKind::Declaration { ty, names })
    }

    pub fn expression_statement(&self, expression: Expression) -> Statement {
        self.statement(StatementKind::Expression(Box::new(expression)))
    }

    pub fn if_else(
        &self,
        condition: Expression,
        positive: Statement,
        negative: Option<Statement>,
    ) -> Statement {
        self.statement(StatementKind::If {
            condition: Box::new(condition),
            positive: Box::new(positive),
            negative: negative.map(Box::new),
        })
    }

    pub fn while_loop(&self, condition: Expression, body: Statement) -> Statement {
        self.statement(StatementKind::While {
            condition: Box::new(condition),
            body: Box::new(body),
        })
    }

    pub fn block(&self, statements: Vec<Statement>) -> Statement {
        self.statement(StatementKind::Block(statements))
    }

    pub fn write(&self, expressions: Vec<Expression>) -> Statement {
        self.statement(StatementKind::Write(expressions))
    }

    pub fn read(&self, names: &[&str]) -> Statement {
        let names = names.iter().map(|name| self.identifier(name)).collect();
        self.statement(StatementKind::Read(names))
    }

    pub fn file_open(&self, target: &str, filename: Expression) -> Statement {
        self.statement(StatementKind::FileOpen {
            target: self.identifier(target),
            filename: Box::new(filename),
        })
    }

    pub fn file_output(&self, file: Expression, values: Vec<Expression>) -> Statement {
        self.statement(StatementKind::FileOutput {
            file: Box::new(file),
            values,
        })
    }

    pub fn empty(&self) -> Statement {
        self.statement(StatementKind::Empty)
    }
}
