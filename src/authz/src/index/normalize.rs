//! Target expression to disjunctive normal form

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::boolean::Bool;
use super::clause::DisjunctiveFormula;
use super::literal::Literal;
use crate::ast::{BinaryOperator, Expression, UnaryOperator};

/// Normalize a target into a formula over literals
///
/// Eager `&`, eager `|`, `!` and boolean constants are decomposed; every other
/// node is a leaf literal. When the normal form would exceed `max_clauses`,
/// the whole target becomes one opaque literal.
pub fn normalize(
    target: &Arc<Expression>,
    imports: &Arc<BTreeMap<String, String>>,
    max_clauses: usize,
) -> DisjunctiveFormula {
    match formula(target, imports, max_clauses) {
        Some(formula) => formula,
        None => {
            debug!(max_clauses, "Target exceeds the clause limit, indexing it as one literal");
            DisjunctiveFormula::literal(leaf(target, imports))
        }
    }
}

fn formula(
    expression: &Arc<Expression>,
    imports: &Arc<BTreeMap<String, String>>,
    max_clauses: usize,
) -> Option<DisjunctiveFormula> {
    match expression.as_ref() {
        Expression::Value(literal) => match literal.0.as_bool() {
            Some(value) => Some(DisjunctiveFormula::constant(value)),
            None => Some(DisjunctiveFormula::literal(leaf(expression, imports))),
        },
        Expression::Binary(BinaryOperator::EagerAnd, left, right) => {
            let left = formula(left, imports, max_clauses)?;
            let right = formula(right, imports, max_clauses)?;
            left.and(&right, max_clauses)
        }
        Expression::Binary(BinaryOperator::EagerOr, left, right) => {
            let left = formula(left, imports, max_clauses)?;
            let right = formula(right, imports, max_clauses)?;
            left.or(&right, max_clauses)
        }
        Expression::Unary(UnaryOperator::Not, operand) => {
            formula(operand, imports, max_clauses)?.negate(max_clauses)
        }
        _ => Some(DisjunctiveFormula::literal(leaf(expression, imports))),
    }
}

fn leaf(expression: &Arc<Expression>, imports: &Arc<BTreeMap<String, String>>) -> Literal {
    Literal::new(Bool::expression(expression.clone(), imports.clone()))
}
