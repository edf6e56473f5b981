//! Path pattern handling for tracked, large and protected path sets.
//!
//! Patterns are globs relative to the repository root. A pattern without
//! glob metacharacters names a file or a directory; a directory pattern
//! (with or without trailing `/`) covers everything beneath it.

use crate::errors::{Result, TimeMachineError};
use glob::Pattern;

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(GLOB_META)
}

/// Strip `./` and trailing `/` so `config/`, `./config` and `config` agree.
pub fn normalize(pattern: &str) -> String {
    let trimmed = pattern.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reject patterns that do not parse as globs.
///
/// # Errors
///
/// `InvalidPattern` naming the first offending pattern.
pub fn validate_patterns(patterns: &[String]) -> Result<()> {
    for p in patterns {
        if p.trim().is_empty() {
            return Err(TimeMachineError::InvalidPattern {
                pattern: p.clone(),
                reason: "empty pattern".to_string(),
            });
        }
        Pattern::new(&normalize(p)).map_err(|e| TimeMachineError::InvalidPattern {
            pattern: p.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Whether `path` falls under `pattern`, directly or via an ancestor.
pub fn matches(pattern: &str, path: &str) -> bool {
    let pattern = normalize(pattern);
    let path = normalize(path);
    if pattern == "." {
        return true;
    }
    if is_ancestor_or_equal(&pattern, &path) {
        return true;
    }
    let Ok(compiled) = Pattern::new(&pattern) else {
        return false;
    };
    let selected = ancestors_and_self(&path).any(|candidate| compiled.matches(candidate));
    selected
}

pub fn matches_any(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|p| matches(p, path))
}

/// Conservative overlap test between two patterns.
///
/// Two literal paths overlap when one contains the other. A glob and a
/// literal overlap when the glob selects the literal (or an ancestor) or
/// the literal contains the glob's fixed prefix. Two globs overlap when
/// their fixed prefixes are related; this may over-report, which for
/// protection is the safe direction.
pub fn patterns_overlap(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    match (is_glob(&a), is_glob(&b)) {
        (false, false) => is_ancestor_or_equal(&a, &b) || is_ancestor_or_equal(&b, &a),
        (true, false) => glob_overlaps_literal(&a, &b),
        (false, true) => glob_overlaps_literal(&b, &a),
        (true, true) => {
            let pa = literal_prefix(&a);
            let pb = literal_prefix(&b);
            is_ancestor_or_equal(&pa, &pb) || is_ancestor_or_equal(&pb, &pa)
        }
    }
}

/// Every `(candidate, protected)` pair that overlaps.
pub fn find_overlaps(candidates: &[String], protected: &[String]) -> Vec<String> {
    let mut overlaps = Vec::new();
    for c in candidates {
        for p in protected {
            if patterns_overlap(c, p) {
                overlaps.push(format!("{} <-> {}", c, p));
            }
        }
    }
    overlaps
}

/// Reject candidate paths that intersect protected paths.
///
/// # Errors
///
/// `ProtectedPathViolation` listing every overlapping pair.
pub fn ensure_disjoint(candidates: &[String], protected: &[String]) -> Result<()> {
    let overlaps = find_overlaps(candidates, protected);
    if overlaps.is_empty() {
        Ok(())
    } else {
        Err(TimeMachineError::ProtectedPathViolation { overlaps })
    }
}

fn glob_overlaps_literal(glob: &str, literal: &str) -> bool {
    if matches(glob, literal) {
        return true;
    }
    let prefix = literal_prefix(glob);
    is_ancestor_or_equal(literal, &prefix)
}

/// Leading path components that contain no glob metacharacters
fn literal_prefix(pattern: &str) -> String {
    let components: Vec<&str> = pattern
        .split('/')
        .take_while(|c| !is_glob(c))
        .collect();
    if components.is_empty() {
        ".".to_string()
    } else {
        components.join("/")
    }
}

fn is_ancestor_or_equal(ancestor: &str, path: &str) -> bool {
    if ancestor == "." {
        return true;
    }
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn ancestors_and_self(path: &str) -> impl Iterator<Item = &str> {
    let cuts = path
        .match_indices('/')
        .map(|(i, _)| i)
        .chain(std::iter::once(path.len()));
    cuts.map(move |i| &path[..i])
}
