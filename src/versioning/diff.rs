use std::collections::HashSet;

use serde::Serialize;

use crate::models::script::ScriptContent;
use crate::models::script_version::ScriptVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub kind: ChangeKind,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Line-level comparison of two SQL bodies.
///
/// Lines are trimmed and blank lines dropped, then compared as sets:
/// a line that moved is not reported, and `modifications` is never filled
/// since lines are not paired up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineDiff {
    pub additions: Vec<String>,
    pub deletions: Vec<String>,
    pub modifications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDiff {
    pub script_id: String,
    pub from_version: String,
    pub to_version: String,
    pub fields: Vec<FieldChange>,
    pub sql: LineDiff,
}

impl VersionDiff {
    pub fn between(from: &ScriptVersion, to: &ScriptVersion) -> Self {
        VersionDiff {
            script_id: to.script_id.clone(),
            from_version: from.version.clone(),
            to_version: to.version.clone(),
            fields: compare_fields(&from.content, &to.content),
            sql: line_diff(&from.content.sql_content, &to.content.sql_content),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.fields.iter().any(|f| f.kind != ChangeKind::Unchanged)
    }
}

fn compared_fields(c: &ScriptContent) -> [(&'static str, Option<&str>); 8] {
    [
        ("name", Some(c.name.as_str())),
        ("name_en", c.name_en.as_deref()),
        ("description", c.description.as_deref()),
        ("description_en", c.description_en.as_deref()),
        ("scope", c.scope.as_deref()),
        ("scope_en", c.scope_en.as_deref()),
        ("author", Some(c.author.as_str())),
        ("sql_content", Some(c.sql_content.as_str())),
    ]
}

fn compare_fields(from: &ScriptContent, to: &ScriptContent) -> Vec<FieldChange> {
    compared_fields(from)
        .into_iter()
        .zip(compared_fields(to))
        .map(|((field, old), (_, new))| {
            // Empty strings count as absent.
            let old = old.filter(|s| !s.is_empty());
            let new = new.filter(|s| !s.is_empty());
            let kind = match (old, new) {
                (None, None) => ChangeKind::Unchanged,
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Removed,
                (Some(a), Some(b)) if a == b => ChangeKind::Unchanged,
                (Some(_), Some(_)) => ChangeKind::Modified,
            };
            FieldChange {
                field,
                kind,
                from: old.map(str::to_string),
                to: new.map(str::to_string),
            }
        })
        .collect()
}

fn significant_lines(sql: &str) -> Vec<&str> {
    sql.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// Lines of `left` missing from `right`, in first-appearance order, without repeats.
fn missing_from<'a>(left: &[&'a str], right: &HashSet<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    left.iter()
        .filter(|l| !right.contains(*l) && seen.insert(**l))
        .map(|l| l.to_string())
        .collect()
}

pub fn line_diff(from: &str, to: &str) -> LineDiff {
    let from_lines = significant_lines(from);
    let to_lines = significant_lines(to);
    let from_set: HashSet<&str> = from_lines.iter().copied().collect();
    let to_set: HashSet<&str> = to_lines.iter().copied().collect();

    LineDiff {
        additions: missing_from(&to_lines, &from_set),
        deletions: missing_from(&from_lines, &to_set),
        modifications: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_difference_of_lines() {
        let diff = line_diff("SELECT 1;\nSELECT 2;", "SELECT 2;\nSELECT 3;");
        assert_eq!(diff.deletions, vec!["SELECT 1;"]);
        assert_eq!(diff.additions, vec!["SELECT 3;"]);
        assert!(diff.modifications.is_empty());
    }

    #[test]
    fn reordering_and_whitespace_are_invisible() {
        let diff = line_diff("  SELECT 1;\n\nSELECT 2;\n", "SELECT 2;\nSELECT 1;   ");
        assert_eq!(diff, LineDiff::default());
    }

    #[test]
    fn repeated_lines_are_reported_once() {
        let diff = line_diff("", "SELECT 9;\nSELECT 9;");
        assert_eq!(diff.additions, vec!["SELECT 9;"]);
    }

    #[test]
    fn empty_field_counts_as_absent() {
        let from = ScriptContent {
            name: "report".into(),
            description: Some(String::new()),
            scope: Some("finance".into()),
            sql_content: "SELECT 1;".into(),
            ..Default::default()
        };
        let to = ScriptContent {
            name: "report v2".into(),
            description: Some("monthly".into()),
            sql_content: "SELECT 1;".into(),
            ..Default::default()
        };
        let fields = compare_fields(&from, &to);
        let kind_of = |name: &str| fields.iter().find(|f| f.field == name).map(|f| f.kind);

        assert_eq!(kind_of("name"), Some(ChangeKind::Modified));
        assert_eq!(kind_of("description"), Some(ChangeKind::Added));
        assert_eq!(kind_of("scope"), Some(ChangeKind::Removed));
        assert_eq!(kind_of("author"), Some(ChangeKind::Unchanged));
        assert_eq!(kind_of("sql_content"), Some(ChangeKind::Unchanged));
    }
}
