// Risk classifier
//
// Pure functions that inspect SQL text and attach a risk tier. None of this is
// real SQL parsing: keywords are matched textually, and WHERE detection is a
// substring search on the upper-cased statement. A WHERE inside a comment or a
// string literal therefore counts as a filter. The row estimate is a fixed 30%
// of the table when a filter is present.

use regex::Regex;
use std::sync::LazyLock;

use crate::dataset::MockDataset;
use crate::query::{OperationType, QueryCandidate, RiskLevel};

/// Table name returned when no clause names one
pub const UNKNOWN_TABLE: &str = "unknown";

static TABLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)FROM\s+(\w+)",
        r"(?i)INTO\s+(\w+)",
        r"(?i)UPDATE\s+(\w+)",
        r"(?i)TABLE\s+(\w+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("table pattern is a valid regex"))
    .collect()
});

/// Statement kind from the leading keyword; anything unrecognized reads as SELECT
pub fn detect_operation_type(sql: &str) -> OperationType {
    let upper = sql.trim().to_uppercase();
    OperationType::ALL
        .into_iter()
        .find(|op| upper.starts_with(op.keyword()))
        .unwrap_or(OperationType::Select)
}

/// Whether the statement textually contains WHERE (case-insensitive)
pub fn has_where_clause(sql: &str) -> bool {
    sql.to_uppercase().contains("WHERE")
}

/// First table named by a FROM, INTO, UPDATE or TABLE clause, lower-cased
pub fn extract_table_name(sql: &str) -> String {
    TABLE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(sql))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| UNKNOWN_TABLE.to_string())
}

/// Approximate rows touched by the statement
pub fn estimate_affected_rows(sql: &str, table: &str, dataset: &MockDataset) -> u64 {
    let table_size = dataset.row_count(table);

    match detect_operation_type(sql) {
        OperationType::Select | OperationType::Delete | OperationType::Update => {
            if has_where_clause(sql) {
                // ceil(size * 0.3)
                (table_size * 3).div_ceil(10)
            } else {
                table_size
            }
        }
        OperationType::Insert => 1,
        _ => table_size,
    }
}

/// Risk policy table
///
/// | operation            | risk     |
/// |----------------------|----------|
/// | DROP                 | critical |
/// | DELETE without WHERE | critical |
/// | UPDATE without WHERE | critical |
/// | DELETE               | high     |
/// | UPDATE               | medium   |
/// | ALTER                | medium   |
/// | INSERT, CREATE       | low      |
/// | SELECT               | low      |
pub fn detect_risk_level(operation: OperationType, sql: &str) -> RiskLevel {
    let filtered = has_where_clause(sql);

    match operation {
        OperationType::Drop => RiskLevel::Critical,
        OperationType::Delete if !filtered => RiskLevel::Critical,
        OperationType::Update if !filtered => RiskLevel::Critical,
        OperationType::Delete => RiskLevel::High,
        OperationType::Update | OperationType::Alter => RiskLevel::Medium,
        OperationType::Insert | OperationType::Create | OperationType::Select => RiskLevel::Low,
    }
}

/// Build a fully classified candidate from generated SQL
pub fn classify(
    sql: impl Into<String>,
    description: impl Into<String>,
    dataset: &MockDataset,
) -> QueryCandidate {
    let sql = sql.into();
    let operation_type = detect_operation_type(&sql);
    let affected_table = extract_table_name(&sql);
    let risk_level = detect_risk_level(operation_type, &sql);
    let estimated_rows = estimate_affected_rows(&sql, &affected_table, dataset);

    QueryCandidate {
        sql,
        description: description.into(),
        affected_table,
        operation_type,
        estimated_rows,
        risk_level,
    }
}
