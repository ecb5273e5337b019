//! Static checks on target expressions

use crate::ast::{BinaryOperator, Document, Expression, PolicyElement};
use crate::error::{AuthzError, Result};

/// Reject lazy boolean operators and attribute finders anywhere in a target
pub fn validate_target(target: &Expression) -> Result<()> {
    let mut violation = None;
    target.walk(&mut |node| {
        if violation.is_some() {
            return;
        }
        violation = match node {
            Expression::Binary(BinaryOperator::LazyAnd, _, _) => {
                Some("Lazy AND operator is not allowed in the target".to_string())
            }
            Expression::Binary(BinaryOperator::LazyOr, _, _) => {
                Some("Lazy OR operator is not allowed in the target".to_string())
            }
            Expression::Attribute { name, .. } => {
                Some(format!("Attribute finder <{name}> is not allowed in the target"))
            }
            Expression::Path { steps, .. } => steps
                .iter()
                .find(|s| s.is_attribute())
                .map(|s| format!("Attribute finder {s} is not allowed in the target")),
            _ => None,
        };
    });

    match violation {
        Some(reason) => Err(AuthzError::TargetValidation(reason)),
        None => Ok(()),
    }
}

/// Validate the document target and, for sets, every contained policy target
pub fn validate_document(document: &Document) -> Result<()> {
    let targets: Vec<&Expression> = match &document.element {
        PolicyElement::Policy(policy) => policy.target.iter().map(|t| t.as_ref()).collect(),
        PolicyElement::Set(set) => set
            .target
            .iter()
            .chain(set.policies.iter().filter_map(|p| p.target.as_ref()))
            .map(|t| t.as_ref())
            .collect(),
    };

    for target in targets {
        validate_target(target).map_err(|e| AuthzError::InvalidDocument {
            name: document.name().to_string(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
