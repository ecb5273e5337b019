//! Constructors for expression trees
//!
//! These stand in for a parser front-end: hosts that compile policies
//! themselves, and the tests, build trees with them directly.

use serde_json::Value;
use std::sync::Arc;

use super::{
    BinaryOperator, Expression, FilterAction, FilterStatement, JsonLiteral, Step, UnaryOperator,
};

pub fn val(value: Value) -> Arc<Expression> {
    Arc::new(Expression::Value(JsonLiteral(value)))
}

pub fn undefined() -> Arc<Expression> {
    Arc::new(Expression::Undefined)
}

pub fn var(name: &str) -> Arc<Expression> {
    Arc::new(Expression::Variable(name.to_string()))
}

pub fn relative() -> Arc<Expression> {
    Arc::new(Expression::Relative)
}

pub fn object(members: Vec<(&str, Arc<Expression>)>) -> Arc<Expression> {
    Arc::new(Expression::Object(
        members
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    ))
}

pub fn array(items: Vec<Arc<Expression>>) -> Arc<Expression> {
    Arc::new(Expression::Array(items))
}

pub fn unary(op: UnaryOperator, operand: Arc<Expression>) -> Arc<Expression> {
    Arc::new(Expression::Unary(op, operand))
}

pub fn not(operand: Arc<Expression>) -> Arc<Expression> {
    unary(UnaryOperator::Not, operand)
}

pub fn neg(operand: Arc<Expression>) -> Arc<Expression> {
    unary(UnaryOperator::Negate, operand)
}

pub fn binary(op: BinaryOperator, left: Arc<Expression>, right: Arc<Expression>) -> Arc<Expression> {
    Arc::new(Expression::Binary(op, left, right))
}

macro_rules! binary_constructors {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(left: Arc<Expression>, right: Arc<Expression>) -> Arc<Expression> {
                binary(BinaryOperator::$op, left, right)
            }
        )*
    };
}

binary_constructors! {
    add => Add,
    sub => Subtract,
    mul => Multiply,
    div => Divide,
    rem => Modulo,
    eq => Equals,
    ne => NotEquals,
    lt => Less,
    le => LessEquals,
    gt => Greater,
    ge => GreaterEquals,
    regex => Regex,
    element_of => ElementOf,
    lazy_and => LazyAnd,
    lazy_or => LazyOr,
    and => EagerAnd,
    or => EagerOr,
    xor => Xor,
}

pub fn call(name: &str, arguments: Vec<Arc<Expression>>) -> Arc<Expression> {
    Arc::new(Expression::FunctionCall {
        name: name.to_string(),
        arguments,
    })
}

/// Environment attribute `<name(args)>`
pub fn environment_attribute(name: &str, arguments: Vec<Arc<Expression>>) -> Arc<Expression> {
    Arc::new(Expression::Attribute {
        name: name.to_string(),
        arguments,
        head: false,
    })
}

pub fn path(base: Arc<Expression>, steps: Vec<Step>) -> Arc<Expression> {
    Arc::new(Expression::Path {
        base,
        steps: steps.into(),
    })
}

/// `base.key`
pub fn key(base: Arc<Expression>, key: &str) -> Arc<Expression> {
    path(base, vec![Step::Key(key.to_string())])
}

/// `base[index]`
pub fn index(base: Arc<Expression>, index: i64) -> Arc<Expression> {
    path(base, vec![Step::Index(index)])
}

/// `base.<name(args)>`
pub fn attribute(base: Arc<Expression>, name: &str, arguments: Vec<Arc<Expression>>) -> Arc<Expression> {
    path(
        base,
        vec![Step::Attribute {
            name: name.to_string(),
            arguments,
            head: false,
        }],
    )
}

/// `base |<name(args)>`
pub fn head_attribute(
    base: Arc<Expression>,
    name: &str,
    arguments: Vec<Arc<Expression>>,
) -> Arc<Expression> {
    path(
        base,
        vec![Step::Attribute {
            name: name.to_string(),
            arguments,
            head: true,
        }],
    )
}

pub fn filter(base: Arc<Expression>, statements: Vec<FilterStatement>) -> Arc<Expression> {
    Arc::new(Expression::Filter {
        base,
        statements: statements.into(),
    })
}

pub fn sub_template(base: Arc<Expression>, template: Arc<Expression>) -> Arc<Expression> {
    Arc::new(Expression::SubTemplate { base, template })
}

/// `@.path : name(args)`
pub fn apply(target: Vec<Step>, name: &str, arguments: Vec<Arc<Expression>>) -> FilterStatement {
    FilterStatement {
        each: false,
        target: target.into(),
        action: FilterAction::Function {
            name: name.to_string(),
            arguments,
        },
    }
}

/// `@.path : remove`
pub fn remove(target: Vec<Step>) -> FilterStatement {
    FilterStatement {
        each: false,
        target: target.into(),
        action: FilterAction::Remove,
    }
}

impl FilterStatement {
    /// Apply the statement to every element of an array
    pub fn each(mut self) -> Self {
        self.each = true;
        self
    }
}
