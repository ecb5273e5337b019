//! Policy retrieval point configuration

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};

/// Default cap on clauses per normalized target
pub const DEFAULT_MAX_CLAUSES: usize = 256;

/// Which document index backs a retrieval point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Shared literals with lazy evaluation
    #[default]
    Canonical,

    /// Evaluate every target on every request
    Naive,
}

impl std::str::FromStr for IndexKind {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canonical" => Ok(Self::Canonical),
            "naive" => Ok(Self::Naive),
            other => Err(AuthzError::InvalidConfig(format!("unknown index kind '{other}'"))),
        }
    }
}

/// Retrieval point configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrpConfig {
    /// Index implementation
    pub index: IndexKind,

    /// Targets whose normal form has more clauses are indexed as one literal
    pub max_clauses_per_target: usize,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for PrpConfig {
    fn default() -> Self {
        Self {
            index: IndexKind::Canonical,
            max_clauses_per_target: DEFAULT_MAX_CLAUSES,
            enable_metrics: true,
        }
    }
}

impl PrpConfig {
    /// Defaults overlaid with `AUTHZ_PRP_INDEX`, `AUTHZ_PRP_MAX_CLAUSES` and
    /// `AUTHZ_PRP_METRICS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(index) = lookup("AUTHZ_PRP_INDEX") {
            config.index = index.parse()?;
        }
        if let Some(max) = lookup("AUTHZ_PRP_MAX_CLAUSES") {
            config.max_clauses_per_target = max.trim().parse().map_err(|_| {
                AuthzError::InvalidConfig(format!("AUTHZ_PRP_MAX_CLAUSES is not a number: '{max}'"))
            })?;
        }
        if let Some(metrics) = lookup("AUTHZ_PRP_METRICS") {
            config.enable_metrics = match metrics.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(AuthzError::InvalidConfig(format!(
                        "AUTHZ_PRP_METRICS is not a boolean: '{other}'"
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuthzError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_clauses_per_target == 0 {
            return Err(AuthzError::InvalidConfig(
                "max_clauses_per_target must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
