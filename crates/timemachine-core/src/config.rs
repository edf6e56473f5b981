//! Configuration model consumed by the kernel.
//!
//! Loading and merging happen elsewhere (`timemachine-store::config`); this
//! module owns the shape, the defaults and validation.

use crate::errors::{Result, TimeMachineError};
use crate::paths;
use crate::tag::{self, TagScheme};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// A risk category and what restoring one of its snapshots requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    #[serde(default)]
    pub verify_on_restore: bool,
    /// Healthcheck argv run when verifying this category, overriding the
    /// global one
    #[serde(default)]
    pub healthcheck: Option<Vec<String>>,
}

impl CategoryConfig {
    pub fn new(name: impl Into<String>, verify_on_restore: bool) -> Self {
        Self {
            name: name.into(),
            verify_on_restore,
            healthcheck: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Paths that must be present after a restore
    pub required_paths: Vec<String>,
    /// Recompute large-object hashes against the restored manifest
    pub large_object_integrity: bool,
    pub healthcheck: Option<Vec<String>>,
    pub healthcheck_timeout_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            required_paths: Vec::new(),
            large_object_integrity: true,
            healthcheck: None,
            healthcheck_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LargeObjectConfig {
    pub enabled: bool,
}

impl Default for LargeObjectConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeMachineConfig {
    pub tracked_paths: Vec<String>,
    pub large_paths: Vec<String>,
    pub protected_paths: Vec<String>,
    pub categories: Vec<CategoryConfig>,
    pub risk_levels: BTreeMap<String, String>,
    pub verification: VerificationConfig,
    pub large_objects: LargeObjectConfig,
    pub backend_timeout_secs: u64,
    pub compensation_attempts: u32,
    pub list_limit: usize,
    pub key_prefixes: Vec<String>,
    pub actor: String,
    pub state_dir: String,
}

impl Default for TimeMachineConfig {
    fn default() -> Self {
        let risk_levels = [
            ("low", "experiment"),
            ("normal", "pre-change"),
            ("high", "stable"),
            ("critical", "stable"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            tracked_paths: vec![
                "config/".to_string(),
                "scripts/".to_string(),
                "policies/".to_string(),
            ],
            large_paths: vec!["models/".to_string(), "data/".to_string()],
            protected_paths: vec![".env".to_string(), "secrets/".to_string()],
            categories: vec![
                CategoryConfig::new("stable", true),
                CategoryConfig::new("pre-change", false),
                CategoryConfig::new("experiment", false),
            ],
            risk_levels,
            verification: VerificationConfig::default(),
            large_objects: LargeObjectConfig::default(),
            backend_timeout_secs: 30,
            compensation_attempts: 1,
            list_limit: 30,
            key_prefixes: vec![
                "config".to_string(),
                "scripts".to_string(),
                "policies".to_string(),
            ],
            actor: "timemachine".to_string(),
            state_dir: ".timemachine".to_string(),
        }
    }
}

impl TimeMachineConfig {
    /// Validate internal consistency.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| TimeMachineError::InvalidConfig { reason };

        if self.categories.is_empty() {
            return Err(invalid("at least one category is required".to_string()));
        }
        let mut seen = HashSet::new();
        for c in &self.categories {
            if !tag::is_valid_category(&c.name) {
                return Err(invalid(format!(
                    "category '{}' must be lowercase alphanumeric words joined by '-'",
                    c.name
                )));
            }
            if !seen.insert(c.name.as_str()) {
                return Err(invalid(format!("duplicate category '{}'", c.name)));
            }
            if c.healthcheck.as_ref().is_some_and(|argv| argv.is_empty()) {
                return Err(invalid(format!(
                    "category '{}' has an empty healthcheck command",
                    c.name
                )));
            }
        }
        for (risk, category) in &self.risk_levels {
            if !seen.contains(category.as_str()) {
                return Err(invalid(format!(
                    "risk level '{}' maps to unknown category '{}'",
                    risk, category
                )));
            }
        }
        if self
            .verification
            .healthcheck
            .as_ref()
            .is_some_and(|argv| argv.is_empty())
        {
            return Err(invalid("verification.healthcheck is empty".to_string()));
        }
        if self.verification.healthcheck_timeout_secs == 0 || self.backend_timeout_secs == 0 {
            return Err(invalid("timeouts must be at least one second".to_string()));
        }
        if self.list_limit == 0 {
            return Err(invalid("list_limit must be positive".to_string()));
        }
        if self.state_dir.trim().is_empty() {
            return Err(invalid("state_dir must not be empty".to_string()));
        }

        for set in [&self.tracked_paths, &self.large_paths, &self.protected_paths] {
            paths::validate_patterns(set).map_err(|e| invalid(e.to_string()))?;
        }
        let overlaps: Vec<String> = paths::find_overlaps(&self.tracked_paths, &self.protected_paths)
            .into_iter()
            .chain(paths::find_overlaps(&self.large_paths, &self.protected_paths))
            .collect();
        if !overlaps.is_empty() {
            return Err(invalid(format!(
                "tracked or large paths overlap protected paths: {}",
                overlaps.join(", ")
            )));
        }
        Ok(())
    }

    pub fn tag_scheme(&self) -> TagScheme {
        TagScheme::new(self.categories.iter().map(|c| c.name.clone()))
    }

    pub fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Category a risk level maps to. A category name is accepted as its
    /// own risk level.
    ///
    /// # Errors
    ///
    /// `UnknownRiskLevel` when neither mapping applies.
    pub fn category_for_risk(&self, risk_level: &str) -> Result<&str> {
        if let Some(category) = self.risk_levels.get(risk_level) {
            return Ok(category.as_str());
        }
        if let Some(category) = self.category(risk_level) {
            return Ok(category.name.as_str());
        }
        Err(TimeMachineError::UnknownRiskLevel {
            risk_level: risk_level.to_string(),
        })
    }

    /// Whether restoring a snapshot of `category` must verify
    pub fn verify_required(&self, category: &str) -> bool {
        self.category(category)
            .map(|c| c.verify_on_restore)
            .unwrap_or(false)
    }

    /// Healthcheck for `category`, falling back to the global one
    pub fn healthcheck_for(&self, category: &str) -> Option<&[String]> {
        self.category(category)
            .and_then(|c| c.healthcheck.as_deref())
            .or(self.verification.healthcheck.as_deref())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn healthcheck_timeout(&self) -> Duration {
        Duration::from_secs(self.verification.healthcheck_timeout_secs)
    }

    /// Large-object paths that take part in snapshots; empty when the
    /// large-object backend is disabled
    pub fn effective_large_paths(&self) -> &[String] {
        if self.large_objects.enabled {
            &self.large_paths
        } else {
            &[]
        }
    }
}
