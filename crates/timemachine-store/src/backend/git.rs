//! Git text backend
//!
//! Every call shells out to `git -C <root>` through the bounded runner, so a
//! hung git surfaces as `BackendTimeout` instead of blocking the operation.

use crate::errors::{io_error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use timemachine_core::backend::TextBackend;
use timemachine_core::errors::{ExError, ExErrorKind};
use timemachine_core::model::{ChangeKind, FileChange, TextRef};
use timemachine_core::paths;
use timemachine_core::process::{run_backend, run_backend_checked};
use timemachine_core::tag::VersionTag;

const BACKEND: &str = "git";
const FALLBACK_NAME: &str = "TimeMachine";
const FALLBACK_EMAIL: &str = "timemachine@localhost";

#[derive(Debug)]
pub struct GitBackend {
    root: PathBuf,
    timeout: Duration,
    needs_identity: bool,
}

impl GitBackend {
    /// Attach to the work tree at `root`.
    ///
    /// Fails with `BackendUnavailable` if git is missing or `root` is not
    /// inside a work tree.
    pub fn open(root: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let mut backend = Self {
            root: root.into(),
            timeout,
            needs_identity: false,
        };
        let inside = backend.run("open", &["rev-parse", "--is-inside-work-tree"])?;
        if inside != "true" {
            return Err(ExError::new(ExErrorKind::BackendUnavailable)
                .with_backend(BACKEND)
                .with_op("open")
                .with_message(format!("{} is not a git work tree", backend.root.display())));
        }
        let email = run_backend(
            BACKEND,
            "open",
            backend.command(&["config", "user.email"]),
            timeout,
        )?;
        backend.needs_identity = !email.status.success()
            && std::env::var_os("GIT_COMMITTER_EMAIL").is_none();
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keep `relative` out of git's view by listing it in `info/exclude`
    pub fn exclude(&self, relative: &str) -> Result<()> {
        let git_dir = self.run("exclude", &["rev-parse", "--git-dir"])?;
        let git_dir = {
            let p = PathBuf::from(&git_dir);
            if p.is_absolute() {
                p
            } else {
                self.root.join(p)
            }
        };
        let exclude_path = git_dir.join("info").join("exclude");
        let line = format!("/{}/", relative.trim_matches('/'));

        let existing = match std::fs::read_to_string(&exclude_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_error("read_git_exclude", e)),
        };
        if existing.lines().any(|l| l.trim() == line) {
            return Ok(());
        }

        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&line);
        updated.push('\n');
        if let Some(parent) = exclude_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error("write_git_exclude", e))?;
        }
        std::fs::write(&exclude_path, updated).map_err(|e| io_error("write_git_exclude", e))
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.root);
        if self.needs_identity {
            cmd.arg("-c")
                .arg(format!("user.name={}", FALLBACK_NAME))
                .arg("-c")
                .arg(format!("user.email={}", FALLBACK_EMAIL));
        }
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn run(&self, op: &str, args: &[&str]) -> Result<String> {
        run_backend_checked(BACKEND, op, self.command(args), self.timeout)
    }

    /// Exit status only; for git commands that answer yes/no via status
    fn succeeds(&self, op: &str, args: &[&str]) -> Result<bool> {
        let output = run_backend(BACKEND, op, self.command(args), self.timeout)?;
        Ok(output.status.success())
    }

    /// Pathspecs for the tracked patterns that currently select anything,
    /// on disk or in the index. git rejects pathspecs that match nothing.
    fn live_pathspecs(&self, tracked_paths: &[String]) -> Result<Vec<String>> {
        let mut specs = Vec::new();
        for pattern in tracked_paths {
            let spec = pathspec(pattern);
            let listed = self.run(
                "stage_commit",
                &["ls-files", "--cached", "--others", "--exclude-standard", "-z", "--", &spec],
            )?;
            if !listed.is_empty() {
                specs.push(spec);
            }
        }
        Ok(specs)
    }

    fn unified_delta(&self, from: &TextRef, to: &TextRef, path: &str) -> Result<String> {
        self.run(
            "diff",
            &[
                "diff",
                "--no-ext-diff",
                "--no-color",
                "--no-renames",
                from.as_str(),
                to.as_str(),
                "--",
                path,
            ],
        )
    }
}

fn pathspec(pattern: &str) -> String {
    let normalized = paths::normalize(pattern);
    if paths::is_glob(&normalized) {
        format!(":(glob){}", normalized)
    } else {
        normalized
    }
}

fn tag_ref(tag: &VersionTag) -> String {
    format!("refs/tags/{}", tag)
}

/// Parse `git diff --name-status -z` output into `(kind, path)` pairs
fn parse_name_status(output: &str) -> Vec<(ChangeKind, String)> {
    let mut fields = output.split('\0').filter(|f| !f.is_empty());
    let mut changes = Vec::new();
    while let (Some(status), Some(path)) = (fields.next(), fields.next()) {
        let kind = match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('D') => ChangeKind::Removed,
            _ => ChangeKind::Modified,
        };
        changes.push((kind, path.to_string()));
    }
    changes
}

/// Paths `git diff --numstat -z` reports as binary (`-\t-\tpath`)
fn parse_binary_paths(output: &str) -> Vec<String> {
    output
        .split('\0')
        .filter_map(|record| {
            let mut parts = record.splitn(3, '\t');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("-"), Some("-"), Some(path)) => Some(path.to_string()),
                _ => None,
            }
        })
        .collect()
}

impl TextBackend for GitBackend {
    fn name(&self) -> &str {
        BACKEND
    }

    fn stage_commit(&self, tracked_paths: &[String], message: &str) -> Result<TextRef> {
        let specs = self.live_pathspecs(tracked_paths)?;
        if !specs.is_empty() {
            let mut args = vec!["add", "-A", "--"];
            args.extend(specs.iter().map(String::as_str));
            self.run("stage_commit", &args)?;
        }
        // `--only` keeps whatever else sits in the index out of the commit;
        // with no pathspecs it records an empty commit.
        let mut args = vec!["commit", "-q", "--allow-empty", "--only", "-m", message, "--"];
        args.extend(specs.iter().map(String::as_str));
        self.run("stage_commit", &args)?;
        let head = self.run("stage_commit", &["rev-parse", "HEAD"])?;
        tracing::debug!(commit = head.as_str(), pathspecs = specs.len(), "text commit staged");
        Ok(TextRef(head))
    }

    fn tag(&self, reference: &TextRef, tag: &VersionTag) -> Result<()> {
        self.run("tag", &["tag", &tag.to_string(), reference.as_str()])
            .map(|_| ())
            .map_err(|e| e.with_tag(tag.to_string()))
    }

    fn remove_tag(&self, tag: &VersionTag) -> Result<()> {
        if !self.has_tag(tag)? {
            return Ok(());
        }
        self.run("remove_tag", &["tag", "-d", &tag.to_string()])
            .map(|_| ())
            .map_err(|e| e.with_tag(tag.to_string()))
    }

    fn has_tag(&self, tag: &VersionTag) -> Result<bool> {
        self.succeeds("has_tag", &["rev-parse", "-q", "--verify", &tag_ref(tag)])
    }

    fn diff(&self, from: &TextRef, to: &TextRef) -> Result<Vec<FileChange>> {
        let names = self.run(
            "diff",
            &["diff", "--no-renames", "--name-status", "-z", from.as_str(), to.as_str()],
        )?;
        let numstat = self.run(
            "diff",
            &["diff", "--no-renames", "--numstat", "-z", from.as_str(), to.as_str()],
        )?;
        let binaries = parse_binary_paths(&numstat);

        let mut changes = Vec::new();
        for (kind, path) in parse_name_status(&names) {
            let binary = binaries.contains(&path);
            let text_delta = if binary {
                String::new()
            } else {
                self.unified_delta(from, to, &path)?
            };
            changes.push(FileChange {
                path,
                kind,
                text_delta,
                binary,
            });
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    fn checkout(&self, reference: &TextRef) -> Result<()> {
        self.run("checkout", &["checkout", "-q", reference.as_str()])
            .map(|_| ())
    }

    fn head(&self) -> Result<TextRef> {
        let branch = run_backend(
            BACKEND,
            "head",
            self.command(&["symbolic-ref", "-q", "--short", "HEAD"]),
            self.timeout,
        )?;
        if branch.status.success() {
            let name = String::from_utf8_lossy(&branch.stdout).trim().to_string();
            if !name.is_empty() {
                return Ok(TextRef(name));
            }
        }
        self.run("head", &["rev-parse", "HEAD"]).map(TextRef)
    }

    fn is_dirty(&self) -> Result<bool> {
        let status = self.run("is_dirty", &["status", "--porcelain"])?;
        Ok(!status.trim().is_empty())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let normalized = paths::normalize(path);
        if !paths::is_glob(&normalized) {
            return Ok(self.root.join(&normalized).exists());
        }
        let pattern = self.root.join(&normalized);
        let found = glob::glob(&pattern.to_string_lossy())
            .map(|mut matches| matches.any(|m| m.is_ok()))
            .unwrap_or(false);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_status() {
        let out = "M\0config/app.yaml\0A\0scripts/new.sh\0D\0old.txt\0T\0link\0";
        let parsed = parse_name_status(out);
        assert_eq!(
            parsed,
            vec![
                (ChangeKind::Modified, "config/app.yaml".to_string()),
                (ChangeKind::Added, "scripts/new.sh".to_string()),
                (ChangeKind::Removed, "old.txt".to_string()),
                (ChangeKind::Modified, "link".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_binary_paths() {
        let out = "3\t1\tconfig/app.yaml\0-\t-\tassets/logo.png\0";
        assert_eq!(parse_binary_paths(out), vec!["assets/logo.png".to_string()]);
    }

    #[test]
    fn test_pathspec_marks_globs() {
        assert_eq!(pathspec("config/"), "config");
        assert_eq!(pathspec("data/*.csv"), ":(glob)data/*.csv");
    }
}
