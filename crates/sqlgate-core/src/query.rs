// Query candidate domain types
//
// A QueryCandidate is produced once per user request by the generator and
// classifier. It is never mutated afterwards: an edit decision carries its own
// SQL and the original candidate stays around for audit display.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// SQL statement kind, taken from the leading keyword
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Create,
    Alter,
}

impl OperationType {
    /// All operation types in keyword-matching order
    pub const ALL: [OperationType; 7] = [
        OperationType::Select,
        OperationType::Insert,
        OperationType::Update,
        OperationType::Delete,
        OperationType::Drop,
        OperationType::Create,
        OperationType::Alter,
    ];

    /// SQL keyword for this operation
    pub fn keyword(&self) -> &'static str {
        match self {
            OperationType::Select => "SELECT",
            OperationType::Insert => "INSERT",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
            OperationType::Drop => "DROP",
            OperationType::Create => "CREATE",
            OperationType::Alter => "ALTER",
        }
    }

    /// Whether the statement changes data or schema
    pub fn is_mutation(&self) -> bool {
        !matches!(self, OperationType::Select)
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Risk tier assigned by the classifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Colored marker used in assistant messages
    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "🔴",
            RiskLevel::High => "🟠",
            RiskLevel::Medium => "🟡",
            RiskLevel::Low => "🟢",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "critical",
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A generated SQL statement with its classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct QueryCandidate {
    /// SQL text as produced by the generator
    pub sql: String,

    /// Short natural-language explanation of the statement
    pub description: String,

    /// Target table ("unknown" when none could be extracted)
    pub affected_table: String,

    /// Statement kind
    pub operation_type: OperationType,

    /// Approximate number of rows touched
    pub estimated_rows: u64,

    /// Risk tier
    pub risk_level: RiskLevel,
}

impl QueryCandidate {
    /// Whether policy lets this candidate run without a human
    pub fn is_auto_approvable(&self) -> bool {
        self.risk_level == RiskLevel::Low && self.operation_type == OperationType::Select
    }
}
