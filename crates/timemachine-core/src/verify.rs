//! Verifier.
//!
//! A fixed set of check kinds, chosen by configuration, each with the same
//! `run -> CheckResult` contract. Checks run independently: one failing
//! does not stop the rest. Checks only read repository state.

use crate::backend::{LargeObjectBackend, TextBackend};
use crate::config::TimeMachineConfig;
use crate::model::{CheckResult, ManifestRef, VerificationResult};
use crate::process;
use crate::tag::VersionTag;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

pub const REQUIRED_PATHS: &str = "required-paths";
pub const LARGE_OBJECT_INTEGRITY: &str = "large-object-integrity";
pub const HEALTHCHECK: &str = "healthcheck";

/// What a check may look at
pub struct VerifyContext<'a> {
    pub tag: &'a VersionTag,
    pub text: &'a dyn TextBackend,
    pub large: &'a dyn LargeObjectBackend,
    /// Manifest that was just checked out
    pub manifest: &'a ManifestRef,
    /// Working directory for external commands
    pub workdir: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    RequiredPaths { paths: Vec<String> },
    LargeObjectIntegrity { enabled: bool },
    Healthcheck { command: Option<Vec<String>>, timeout: Duration },
}

impl Check {
    pub fn name(&self) -> &'static str {
        match self {
            Check::RequiredPaths { .. } => REQUIRED_PATHS,
            Check::LargeObjectIntegrity { .. } => LARGE_OBJECT_INTEGRITY,
            Check::Healthcheck { .. } => HEALTHCHECK,
        }
    }

    pub fn run(&self, ctx: &VerifyContext<'_>) -> CheckResult {
        let result = match self {
            Check::RequiredPaths { paths } => required_paths(paths, ctx),
            Check::LargeObjectIntegrity { enabled } => large_object_integrity(*enabled, ctx),
            Check::Healthcheck { command, timeout } => {
                healthcheck(command.as_deref(), *timeout, ctx.workdir)
            }
        };
        tracing::debug!(
            check = result.name.as_str(),
            outcome = ?result.outcome,
            detail = result.detail.as_str(),
            "verification check finished"
        );
        result
    }
}

/// The checks configured for restoring a snapshot of `category`
pub fn checks_for(config: &TimeMachineConfig, category: &str) -> Vec<Check> {
    vec![
        Check::RequiredPaths {
            paths: config.verification.required_paths.clone(),
        },
        Check::LargeObjectIntegrity {
            enabled: config.large_objects.enabled && config.verification.large_object_integrity,
        },
        Check::Healthcheck {
            command: config.healthcheck_for(category).map(|c| c.to_vec()),
            timeout: config.healthcheck_timeout(),
        },
    ]
}

/// Run every check and fold the outcomes.
pub fn verify(checks: &[Check], ctx: &VerifyContext<'_>) -> VerificationResult {
    let results = checks.iter().map(|c| c.run(ctx)).collect();
    VerificationResult::from_checks(ctx.tag.clone(), results)
}

fn required_paths(paths: &[String], ctx: &VerifyContext<'_>) -> CheckResult {
    if paths.is_empty() {
        return CheckResult::skipped(REQUIRED_PATHS, "no required paths configured");
    }
    let mut missing = Vec::new();
    for path in paths {
        match ctx.text.exists(path) {
            Ok(true) => {}
            Ok(false) => missing.push(path.clone()),
            Err(e) => missing.push(format!("{} ({})", path, e)),
        }
    }
    if missing.is_empty() {
        CheckResult::pass(REQUIRED_PATHS, format!("{} present", paths.len()))
    } else {
        CheckResult::fail(REQUIRED_PATHS, format!("missing: {}", missing.join(", ")))
    }
}

fn large_object_integrity(enabled: bool, ctx: &VerifyContext<'_>) -> CheckResult {
    if !enabled {
        return CheckResult::skipped(LARGE_OBJECT_INTEGRITY, "large-object checks disabled");
    }
    match ctx.large.check_integrity(ctx.manifest) {
        Ok(report) if report.checked == 0 => {
            CheckResult::skipped(LARGE_OBJECT_INTEGRITY, "manifest tracks no objects")
        }
        Ok(report) if report.is_clean() => CheckResult::pass(
            LARGE_OBJECT_INTEGRITY,
            format!("{} objects match manifest", report.checked),
        ),
        Ok(report) => {
            let listed: Vec<String> = report.issues.iter().map(|i| i.to_string()).collect();
            CheckResult::fail(LARGE_OBJECT_INTEGRITY, listed.join(", "))
        }
        Err(e) => CheckResult::fail(LARGE_OBJECT_INTEGRITY, e.to_string()),
    }
}

fn healthcheck(command: Option<&[String]>, timeout: Duration, workdir: Option<&Path>) -> CheckResult {
    let Some((program, args)) = command.and_then(|argv| argv.split_first()) else {
        return CheckResult::skipped(HEALTHCHECK, "no healthcheck configured");
    };

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }

    match process::run_with_timeout(cmd, timeout) {
        Ok(output) if output.status.success() => CheckResult::pass(HEALTHCHECK, "exit 0"),
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.trim().lines().last().unwrap_or("").to_string();
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            CheckResult::fail(HEALTHCHECK, format!("exit {}: {}", code, tail))
        }
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => CheckResult::fail(
            HEALTHCHECK,
            format!("timed out after {}s", timeout.as_secs()),
        ),
        Err(e) => CheckResult::fail(HEALTHCHECK, format!("could not run {}: {}", program, e)),
    }
}
