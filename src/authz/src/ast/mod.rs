//! Immutable expression and document trees
//!
//! Trees are produced by an external parser (or by the constructors in
//! [`build`]) and shared read-only between all concurrent evaluations. Nodes
//! carry no evaluation state, so structural equality is also semantic
//! equality, which the literal index relies on for deduplication.

pub mod build;
mod document;

pub use document::{
    Document, Entitlement, InvalidDocument, ParsedDocument, Policy, PolicyElement, PolicySet,
    Statement,
};

use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// JSON constant embedded in an expression
///
/// Hashing goes through the canonical serialization because `serde_json::Value`
/// does not implement `Hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonLiteral(pub Value);

impl Hash for JsonLiteral {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_string().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Negate,
    Plus,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Negate => "-",
            Self::Plus => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    Regex,
    ElementOf,
    /// `&&`, right side evaluated only when needed
    LazyAnd,
    /// `||`, right side evaluated only when needed
    LazyOr,
    /// `&`, both sides always evaluated
    EagerAnd,
    /// `|`, both sides always evaluated
    EagerOr,
    Xor,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::Less => "<",
            Self::LessEquals => "<=",
            Self::Greater => ">",
            Self::GreaterEquals => ">=",
            Self::Regex => "=~",
            Self::ElementOf => "in",
            Self::LazyAnd => "&&",
            Self::LazyOr => "||",
            Self::EagerAnd => "&",
            Self::EagerOr => "|",
            Self::Xor => "^",
        }
    }

    pub fn is_lazy(self) -> bool {
        matches!(self, Self::LazyAnd | Self::LazyOr)
    }
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Value(JsonLiteral),
    Undefined,
    Variable(String),
    /// `@`, the value a condition, sub-template or filter argument is relative to
    Relative,
    /// Object construction; members evaluating to undefined are dropped
    Object(Vec<(String, Arc<Expression>)>),
    Array(Vec<Arc<Expression>>),
    Unary(UnaryOperator, Arc<Expression>),
    Binary(BinaryOperator, Arc<Expression>, Arc<Expression>),
    FunctionCall {
        name: String,
        arguments: Vec<Arc<Expression>>,
    },
    /// Environment attribute `<name(args)>` without a subject
    Attribute {
        name: String,
        arguments: Vec<Arc<Expression>>,
        head: bool,
    },
    Path {
        base: Arc<Expression>,
        steps: Arc<[Step]>,
    },
    Filter {
        base: Arc<Expression>,
        statements: Arc<[FilterStatement]>,
    },
    /// `base :: template`
    SubTemplate {
        base: Arc<Expression>,
        template: Arc<Expression>,
    },
}

impl Expression {
    /// Visit this node and every expression nested below it, including
    /// expressions inside steps and filter statements
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expression)) {
        visit(self);
        match self {
            Self::Value(_) | Self::Undefined | Self::Variable(_) | Self::Relative => {}
            Self::Object(members) => members.iter().for_each(|(_, e)| e.walk(visit)),
            Self::Array(items) => items.iter().for_each(|e| e.walk(visit)),
            Self::Unary(_, operand) => operand.walk(visit),
            Self::Binary(_, left, right) => {
                left.walk(visit);
                right.walk(visit);
            }
            Self::FunctionCall { arguments, .. } | Self::Attribute { arguments, .. } => {
                arguments.iter().for_each(|e| e.walk(visit))
            }
            Self::Path { base, steps } => {
                base.walk(visit);
                steps.iter().for_each(|s| s.walk(visit));
            }
            Self::Filter { base, statements } => {
                base.walk(visit);
                for statement in statements.iter() {
                    statement.target.iter().for_each(|s| s.walk(visit));
                    if let FilterAction::Function { arguments, .. } = &statement.action {
                        arguments.iter().for_each(|e| e.walk(visit));
                    }
                }
            }
            Self::SubTemplate { base, template } => {
                base.walk(visit);
                template.walk(visit);
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(JsonLiteral(v)) => write!(f, "{v}"),
            Self::Undefined => f.write_str("undefined"),
            Self::Variable(name) => f.write_str(name),
            Self::Relative => f.write_str("@"),
            Self::Object(members) => {
                f.write_str("{")?;
                for (i, (key, value)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{key}\": {value}")?;
                }
                f.write_str("}")
            }
            Self::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Self::Unary(op, operand) => write!(f, "{}({operand})", op.symbol()),
            Self::Binary(op, left, right) => write!(f, "({left} {} {right})", op.symbol()),
            Self::FunctionCall { name, arguments } => {
                write!(f, "{name}(")?;
                write_list(f, arguments)?;
                f.write_str(")")
            }
            Self::Attribute {
                name,
                arguments,
                head,
            } => {
                f.write_str(if *head { "|<" } else { "<" })?;
                f.write_str(name)?;
                if !arguments.is_empty() {
                    f.write_str("(")?;
                    write_list(f, arguments)?;
                    f.write_str(")")?;
                }
                f.write_str(">")
            }
            Self::Path { base, steps } => {
                write!(f, "{base}")?;
                steps.iter().try_for_each(|s| write!(f, "{s}"))
            }
            Self::Filter { base, statements } => {
                write!(f, "{base} |- {{")?;
                for (i, statement) in statements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{statement}")?;
                }
                f.write_str("}")
            }
            Self::SubTemplate { base, template } => write!(f, "{base} :: {template}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Arc<Expression>]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Path step applied to the value produced by the preceding part of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    Key(String),
    /// Negative indices count from the end
    Index(i64),
    Slice {
        from: Option<i64>,
        to: Option<i64>,
        step: Option<i64>,
    },
    Wildcard,
    RecursiveKey(String),
    RecursiveIndex(i64),
    RecursiveWildcard,
    /// `[(expr)]`, key or index computed relative to the parent
    Expression(Arc<Expression>),
    /// `[?(expr)]`, keeps the elements for which the condition holds
    Condition(Arc<Expression>),
    /// `.<name(args)>`, or `|<name(args)>` when only the first value is wanted
    Attribute {
        name: String,
        arguments: Vec<Arc<Expression>>,
        head: bool,
    },
    IndexUnion(Vec<i64>),
    KeyUnion(Vec<String>),
}

impl Step {
    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expression)) {
        match self {
            Self::Expression(e) | Self::Condition(e) => e.walk(visit),
            Self::Attribute { arguments, .. } => arguments.iter().for_each(|e| e.walk(visit)),
            _ => {}
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, Self::Attribute { .. })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: &Option<i64>| v.map(|i| i.to_string()).unwrap_or_default();
        match self {
            Self::Key(key) => write!(f, ".{key}"),
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Slice { from, to, step } => {
                write!(f, "[{}:{}", opt(from), opt(to))?;
                if step.is_some() {
                    write!(f, ":{}", opt(step))?;
                }
                f.write_str("]")
            }
            Self::Wildcard => f.write_str(".*"),
            Self::RecursiveKey(key) => write!(f, "..{key}"),
            Self::RecursiveIndex(i) => write!(f, "..[{i}]"),
            Self::RecursiveWildcard => f.write_str("..*"),
            Self::Expression(e) => write!(f, "[({e})]"),
            Self::Condition(e) => write!(f, "[?({e})]"),
            Self::Attribute {
                name,
                arguments,
                head,
            } => {
                f.write_str(if *head { "|<" } else { ".<" })?;
                f.write_str(name)?;
                if !arguments.is_empty() {
                    f.write_str("(")?;
                    write_list(f, arguments)?;
                    f.write_str(")")?;
                }
                f.write_str(">")
            }
            Self::IndexUnion(indices) => {
                let parts: Vec<String> = indices.iter().map(i64::to_string).collect();
                write!(f, "[{}]", parts.join(","))
            }
            Self::KeyUnion(keys) => {
                let parts: Vec<String> = keys.iter().map(|k| format!("\"{k}\"")).collect();
                write!(f, "[{}]", parts.join(","))
            }
        }
    }
}

/// What a filter statement does to the addressed value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterAction {
    Remove,
    Function {
        name: String,
        arguments: Vec<Arc<Expression>>,
    },
}

/// One `[each] @.path : action` statement of a filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterStatement {
    pub each: bool,
    pub target: Arc<[Step]>,
    pub action: FilterAction,
}

impl fmt::Display for FilterStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.each {
            f.write_str("each ")?;
        }
        f.write_str("@")?;
        self.target.iter().try_for_each(|s| write!(f, "{s}"))?;
        match &self.action {
            FilterAction::Remove => f.write_str(" : remove"),
            FilterAction::Function { name, arguments } => {
                write!(f, " : {name}(")?;
                write_list(f, arguments)?;
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;
    use serde_json::json;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(e: &Expression) -> u64 {
        let mut hasher = DefaultHasher::new();
        e.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let a = eq(key(var("subject"), "role"), val(json!("admin")));
        let b = eq(key(var("subject"), "role"), val(json!("admin")));
        let c = eq(key(var("subject"), "role"), val(json!("user")));

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn test_walk_reaches_steps() {
        let expr = path(
            var("resource"),
            vec![Step::Condition(gt(relative(), val(json!(1))))],
        );
        let mut relatives = 0;
        expr.walk(&mut |e| {
            if matches!(e, Expression::Relative) {
                relatives += 1;
            }
        });
        assert_eq!(relatives, 1);
    }

    #[test]
    fn test_display() {
        let expr = lazy_and(
            eq(key(var("subject"), "role"), val(json!("admin"))),
            not(var("blocked")),
        );
        assert_eq!(
            expr.to_string(),
            r#"((subject.role == "admin") && !(blocked))"#
        );
    }
}
