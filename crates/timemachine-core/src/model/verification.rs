use crate::tag::VersionTag;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overall {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub outcome: CheckOutcome,
    pub detail: String,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: CheckOutcome::Pass,
            detail: detail.into(),
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: CheckOutcome::Fail,
            detail: detail.into(),
        }
    }

    pub fn skipped(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: CheckOutcome::Skipped,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub tag: VersionTag,
    pub checks_run: Vec<CheckResult>,
    pub overall: Overall,
}

impl VerificationResult {
    /// Fold check results; skipped checks never decide the outcome.
    pub fn from_checks(tag: VersionTag, checks_run: Vec<CheckResult>) -> Self {
        let overall = if checks_run
            .iter()
            .any(|c| c.outcome == CheckOutcome::Fail)
        {
            Overall::Fail
        } else {
            Overall::Pass
        };
        Self {
            tag,
            checks_run,
            overall,
        }
    }

    pub fn passed(&self) -> bool {
        self.overall == Overall::Pass
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks_run
            .iter()
            .filter(|c| c.outcome == CheckOutcome::Fail)
    }
}
