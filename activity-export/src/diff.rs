use std::fmt;

use similar::TextDiff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Unchanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Deleted => "deleted",
            ChangeType::Modified => "modified",
            ChangeType::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub change_type: ChangeType,
    pub diff_text: String,
}

impl DiffResult {
    fn bare(change_type: ChangeType) -> Self {
        Self {
            change_type,
            diff_text: String::new(),
        }
    }
}

/// Compare two versions of a file. An empty string is how the file API says
/// "no such file at that ref", so it counts as absent.
///
/// Only a true modification carries a unified diff body.
pub fn diff(old: Option<&str>, new: Option<&str>) -> DiffResult {
    let old = old.filter(|s| !s.is_empty());
    let new = new.filter(|s| !s.is_empty());

    match (old, new) {
        (None, Some(_)) => DiffResult::bare(ChangeType::Added),
        (Some(_), None) => DiffResult::bare(ChangeType::Deleted),
        (None, None) => DiffResult::bare(ChangeType::Unchanged),
        (Some(old), Some(new)) => {
            if old == new {
                return DiffResult::bare(ChangeType::Unchanged);
            }
            let lines = TextDiff::from_lines(old, new);
            let text = lines
                .unified_diff()
                .context_radius(3)
                .header("old", "new")
                .to_string();
            if text.is_empty() {
                DiffResult::bare(ChangeType::Unchanged)
            } else {
                DiffResult {
                    change_type: ChangeType::Modified,
                    diff_text: text,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_added() {
        assert_eq!(diff(None, Some("a\nb\n")), DiffResult::bare(ChangeType::Added));
        assert_eq!(diff(Some(""), Some("a\n")), DiffResult::bare(ChangeType::Added));
    }

    #[test]
    fn test_deleted() {
        assert_eq!(diff(Some("a\nb\n"), None), DiffResult::bare(ChangeType::Deleted));
    }

    #[test]
    fn test_unchanged() {
        assert_eq!(diff(Some("a\n"), Some("a\n")), DiffResult::bare(ChangeType::Unchanged));
        assert_eq!(diff(None, None), DiffResult::bare(ChangeType::Unchanged));
    }

    #[test]
    fn test_modified_carries_unified_diff() {
        let result = diff(Some("a\n"), Some("b\n"));
        assert_eq!(result.change_type, ChangeType::Modified);
        assert!(result.diff_text.starts_with("--- old\n+++ new\n"));
        assert!(result.diff_text.contains("-a\n"));
        assert!(result.diff_text.contains("+b\n"));
    }

    #[test]
    fn test_context_is_three_lines() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n9\n";
        let new = "1\n2\n3\n4\nfive\n6\n7\n8\n9\n";
        let result = diff(Some(old), Some(new));
        assert!(result.diff_text.contains("@@ -2,7 +2,7 @@"));
        assert!(!result.diff_text.contains(" 1\n"));
        assert!(!result.diff_text.contains(" 9\n"));
    }
}
