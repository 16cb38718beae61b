use std::sync::LazyLock;

use regex::Regex;

use crate::models::approval_request::ScriptType;

static SYSTEM_ADMIN_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:GRANT|REVOKE|BACKUP|RESTORE|SHUTDOWN|KILL)\b|\b(?:CREATE|DROP|ALTER)\s+USER\b").ok()
});

static STRUCTURE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:CREATE|DROP|ALTER)\s+TABLE\b|\b(?:CREATE|DROP)\s+(?:INDEX|DATABASE)\b").ok()
});

static MUTATION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:INSERT|UPDATE|DELETE|TRUNCATE|MERGE)\b").ok());

fn matches(re: &LazyLock<Option<Regex>>, sql: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(sql))
}

/// Infer what a script does from its keywords. First match wins, in order of
/// decreasing privilege; anything unmatched is read-only.
pub fn classify(sql: &str) -> ScriptType {
    if matches(&SYSTEM_ADMIN_RE, sql) {
        ScriptType::SystemAdmin
    } else if matches(&STRUCTURE_RE, sql) {
        ScriptType::StructureChange
    } else if matches(&MUTATION_RE, sql) {
        ScriptType::DataModification
    } else {
        ScriptType::ReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_select_is_read_only() {
        assert_eq!(classify("SELECT * FROM orders WHERE id = 1"), ScriptType::ReadOnly);
        assert_eq!(classify(""), ScriptType::ReadOnly);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(classify("insert into t values (1)"), ScriptType::DataModification);
        assert_eq!(classify("Truncate audit_log"), ScriptType::DataModification);
    }

    #[test]
    fn structural_beats_mutation() {
        let sql = "CREATE TABLE t (id INT);\nINSERT INTO t VALUES (1);";
        assert_eq!(classify(sql), ScriptType::StructureChange);
        assert_eq!(classify("drop   index idx_orders"), ScriptType::StructureChange);
    }

    #[test]
    fn system_admin_beats_everything() {
        let sql = "ALTER TABLE t ADD c INT; GRANT SELECT ON t TO reporting;";
        assert_eq!(classify(sql), ScriptType::SystemAdmin);
        assert_eq!(classify("create user etl"), ScriptType::SystemAdmin);
    }

    #[test]
    fn whole_words_only() {
        assert_eq!(classify("SELECT updated_at, deleted FROM t"), ScriptType::ReadOnly);
        assert_eq!(classify("SELECT * FROM grants_view"), ScriptType::ReadOnly);
    }
}
