//! Line-based unified diff between configuration captures.

use similar::TextDiff;

/// Computes a unified diff between two configuration texts.
///
/// Output follows unified-diff conventions: `--- BEFORE` / `+++ AFTER`
/// labels, `@@` hunk headers with line ranges, and `-`/`+`/` ` line
/// prefixes, so operators can eyeball exactly what a batch changed.
/// Deterministic for identical inputs; an unchanged configuration produces
/// no lines at all.
pub fn unified(before: &str, after: &str) -> Vec<String> {
    if before == after {
        return Vec::new();
    }

    let diff = TextDiff::from_lines(before, after);
    diff.unified_diff()
        .context_radius(3)
        .header("BEFORE", "AFTER")
        .to_string()
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::unified;

    #[test]
    fn identical_texts_produce_no_lines() {
        let cfg = "hostname R1\ninterface Gi0/0\n no shutdown\n";
        assert!(unified(cfg, cfg).is_empty());
    }

    #[test]
    fn hostname_change_shows_one_removal_and_one_addition() {
        let lines = unified("hostname R1\n", "hostname R2\n");
        assert!(lines.iter().any(|l| l.starts_with("-hostname R1")));
        assert!(lines.iter().any(|l| l.starts_with("+hostname R2")));
    }

    #[test]
    fn labels_are_fixed_before_and_after() {
        let lines = unified("a\n", "b\n");
        assert_eq!(lines[0], "--- BEFORE");
        assert_eq!(lines[1], "+++ AFTER");
    }

    #[test]
    fn swapping_inputs_flips_markers() {
        let forward = unified("hostname R1\n", "hostname R2\n");
        let reverse = unified("hostname R2\n", "hostname R1\n");

        let forward_changes: Vec<&String> = forward
            .iter()
            .filter(|l| l.starts_with('-') && !l.starts_with("---"))
            .collect();
        let reverse_changes: Vec<&String> = reverse
            .iter()
            .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
            .collect();

        assert_eq!(forward_changes.len(), reverse_changes.len());
        for (removed, added) in forward_changes.iter().zip(reverse_changes.iter()) {
            assert_eq!(removed[1..], added[1..]);
        }
    }

    #[test]
    fn unchanged_context_lines_keep_space_prefix() {
        let before = "line one\nline two\nline three\n";
        let after = "line one\nline 2\nline three\n";
        let lines = unified(before, after);
        assert!(lines.iter().any(|l| l == " line one"));
        assert!(lines.iter().any(|l| l == " line three"));
    }
}
