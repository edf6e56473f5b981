use crate::model::DiffReport;
use std::fmt::Write;

const MAX_LISTED: usize = 50;

/// Render a report for humans.
///
/// Lists at most 50 entries per section and says how many were left out.
pub fn render_summary(report: &DiffReport) -> String {
    let mut out = String::new();
    if report.is_empty() {
        let _ = writeln!(
            out,
            "No changes between {} and {}",
            report.from_tag, report.to_tag
        );
        return out;
    }

    let _ = writeln!(out, "Diff {} -> {}", report.from_tag, report.to_tag);

    let _ = writeln!(out, "Text changes: {}", report.text_changes.len());
    for change in report.text_changes.iter().take(MAX_LISTED) {
        let marker = if change.binary { " (binary)" } else { "" };
        let _ = writeln!(out, "  {} {}{}", change.kind.marker(), change.path, marker);
    }
    elided(&mut out, report.text_changes.len());

    let _ = writeln!(
        out,
        "Large-object changes: {}",
        report.large_object_changes.len()
    );
    for change in report.large_object_changes.iter().take(MAX_LISTED) {
        let _ = writeln!(
            out,
            "  {} {} ({} -> {})",
            change.kind.marker(),
            change.path,
            short(change.old_hash.as_deref()),
            short(change.new_hash.as_deref())
        );
    }
    elided(&mut out, report.large_object_changes.len());

    if !report.key_changes.is_empty() {
        let _ = writeln!(out, "Key changes:");
        for path in &report.key_changes {
            let _ = writeln!(out, "  {}", path);
        }
    }
    if !report.binary_files.is_empty() {
        let _ = writeln!(out, "Binary files: {}", report.binary_files.join(", "));
    }
    out
}

fn elided(out: &mut String, total: usize) {
    if total > MAX_LISTED {
        let _ = writeln!(out, "  ... and {} more", total - MAX_LISTED);
    }
}

fn short(hash: Option<&str>) -> &str {
    match hash {
        Some(h) if h.len() > 12 => &h[..12],
        Some(h) => h,
        None => "none",
    }
}
