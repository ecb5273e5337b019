//! Conjunctive clauses and disjunctive normal forms over literals

use std::fmt;

use super::literal::Literal;

/// Conjunction of literals; the empty clause is `true`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConjunctiveClause {
    literals: Vec<Literal>,
}

impl ConjunctiveClause {
    pub fn new(literals: impl IntoIterator<Item = Literal>) -> Self {
        let mut clause = Self::default();
        for literal in literals {
            clause.push(literal);
        }
        clause
    }

    fn push(&mut self, literal: Literal) {
        if !self.literals.contains(&literal) {
            self.literals.push(literal);
        }
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Contains some literal together with its negation
    pub fn is_contradiction(&self) -> bool {
        self.literals
            .iter()
            .enumerate()
            .any(|(i, a)| self.literals[i + 1..].iter().any(|b| a.contradicts(b)))
    }

    /// Every literal of `self` also occurs in `other`, so `other` implies `self`
    pub fn subsumes(&self, other: &ConjunctiveClause) -> bool {
        self.literals.iter().all(|l| other.literals.contains(l))
    }

    pub fn and(&self, other: &ConjunctiveClause) -> Self {
        let mut clause = self.clone();
        for literal in &other.literals {
            clause.push(literal.clone());
        }
        clause
    }

    /// Fold constant literals away: `None` when the clause is always false
    fn without_constants(self) -> Option<Self> {
        let mut literals = Vec::with_capacity(self.literals.len());
        for literal in self.literals {
            match literal.constant() {
                Some(true) => {}
                Some(false) => return None,
                None => literals.push(literal),
            }
        }
        Some(Self { literals })
    }
}

impl fmt::Display for ConjunctiveClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.literals.is_empty() {
            return write!(f, "true");
        }
        let parts: Vec<String> = self.literals.iter().map(|l| l.to_string()).collect();
        write!(f, "{}", parts.join(" & "))
    }
}

/// Disjunction of conjunctive clauses; no clauses is `false`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisjunctiveFormula {
    clauses: Vec<ConjunctiveClause>,
}

impl DisjunctiveFormula {
    pub fn new(clauses: impl IntoIterator<Item = ConjunctiveClause>) -> Self {
        Self {
            clauses: clauses.into_iter().collect(),
        }
        .reduce()
    }

    pub fn constant(value: bool) -> Self {
        if value {
            Self {
                clauses: vec![ConjunctiveClause::default()],
            }
        } else {
            Self::default()
        }
    }

    pub fn literal(literal: Literal) -> Self {
        Self::new([ConjunctiveClause::new([literal])])
    }

    pub fn clauses(&self) -> &[ConjunctiveClause] {
        &self.clauses
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Disjunction; `None` if the result would exceed `max_clauses`
    pub fn or(&self, other: &DisjunctiveFormula, max_clauses: usize) -> Option<Self> {
        if self.len() + other.len() > max_clauses {
            return None;
        }
        Some(Self::new(
            self.clauses.iter().chain(&other.clauses).cloned(),
        ))
    }

    /// Conjunction by distribution; `None` if the product would exceed
    /// `max_clauses`
    pub fn and(&self, other: &DisjunctiveFormula, max_clauses: usize) -> Option<Self> {
        if self.len().saturating_mul(other.len()) > max_clauses {
            return None;
        }
        let mut clauses = Vec::with_capacity(self.len() * other.len());
        for left in &self.clauses {
            for right in &other.clauses {
                clauses.push(left.and(right));
            }
        }
        Some(Self::new(clauses))
    }

    /// De Morgan: the negation of a disjunction is the conjunction of the
    /// negated clauses, each of which is a disjunction of negated literals
    pub fn negate(&self, max_clauses: usize) -> Option<Self> {
        let mut result = Self::constant(true);
        for clause in &self.clauses {
            let negated = Self::new(
                clause
                    .literals()
                    .iter()
                    .map(|l| ConjunctiveClause::new([l.negate()])),
            );
            result = result.and(&negated, max_clauses)?;
        }
        Some(result)
    }

    /// Drop constant literals, contradictions, duplicates and subsumed clauses
    fn reduce(self) -> Self {
        let mut candidates: Vec<ConjunctiveClause> = self
            .clauses
            .into_iter()
            .filter_map(ConjunctiveClause::without_constants)
            .filter(|c| !c.is_contradiction())
            .collect();
        candidates.sort_by_key(ConjunctiveClause::len);

        let mut clauses: Vec<ConjunctiveClause> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !clauses.iter().any(|kept| kept.subsumes(&candidate)) {
                clauses.push(candidate);
            }
        }
        Self { clauses }
    }
}

impl fmt::Display for DisjunctiveFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "false");
        }
        let parts: Vec<String> = self.clauses.iter().map(|c| format!("({c})")).collect();
        write!(f, "{}", parts.join(" | "))
    }
}
