// Mock executor
//
// Applies a decision to a candidate against the injected MockDataset. SELECTs
// read up to MAX_SELECT_ROWS rows; every other statement is only reported, the
// dataset is never modified. This is the single place where a run's final
// user-facing summary is produced, including for rejections.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::approval::Decision;
use crate::classifier::{detect_operation_type, estimate_affected_rows, extract_table_name};
use crate::dataset::MockDataset;
use crate::query::{OperationType, QueryCandidate};

/// Maximum rows returned by a mock SELECT
pub const MAX_SELECT_ROWS: usize = 5;

/// Reason used when a rejection carries none
pub const DEFAULT_REJECT_REASON: &str = "user chose not to run this operation";

const SIMULATED_NOTE: &str = "⚠️ Note: simulated execution, no data was modified.";

/// Terminal stage of an execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Rejected,
    Executed,
    Error,
}

/// Outcome of the execution step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ExecutionResult {
    /// User-visible summary (markdown)
    pub summary: String,

    /// SQL that was run, `None` when nothing ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_sql: Option<String>,

    /// Rows returned by a SELECT
    #[serde(default)]
    pub rows: Vec<Value>,

    /// Error description, if the step failed or hit an unknown table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Terminal stage
    pub stage: ExecutionStage,
}

impl ExecutionResult {
    /// Terminal error result
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            summary: format!("❌ **Error**: {}", message),
            executed_sql: None,
            rows: Vec::new(),
            error: Some(message),
            stage: ExecutionStage::Error,
        }
    }
}

/// Output of a single simulated statement
struct MockOutput {
    text: String,
    rows: Vec<Value>,
    error: Option<String>,
}

/// Executes decisions against the mock dataset
#[derive(Debug, Clone)]
pub struct MockExecutor {
    dataset: Arc<MockDataset>,
}

impl MockExecutor {
    pub fn new(dataset: Arc<MockDataset>) -> Self {
        Self { dataset }
    }

    /// Resolve a decision into a terminal result
    ///
    /// A missing decision is reported as an error result rather than panicking
    /// or leaving the run open.
    pub fn execute(
        &self,
        candidate: &QueryCandidate,
        decision: Option<&Decision>,
    ) -> ExecutionResult {
        let Some(decision) = decision else {
            return ExecutionResult::error("no decision was received for this query");
        };

        match decision {
            Decision::Reject { reason } => Self::rejected(reason.as_deref()),
            Decision::Approve => {
                let output = self.run_sql(&candidate.sql);
                ExecutionResult {
                    summary: format!(
                        "✅ **SQL executed**\n\n```sql\n{}\n```\n\n**Result**:\n{}",
                        candidate.sql, output.text
                    ),
                    executed_sql: Some(candidate.sql.clone()),
                    rows: output.rows,
                    error: output.error,
                    stage: ExecutionStage::Executed,
                }
            }
            Decision::Edit { edited_sql } => {
                let output = self.run_sql(edited_sql);
                ExecutionResult {
                    summary: format!(
                        "✏️ **Edited SQL executed**\n\n\
                         **Original SQL**:\n```sql\n{}\n```\n\n\
                         **Edited SQL**:\n```sql\n{}\n```\n\n\
                         **Result**:\n{}",
                        candidate.sql, edited_sql, output.text
                    ),
                    executed_sql: Some(edited_sql.clone()),
                    rows: output.rows,
                    error: output.error,
                    stage: ExecutionStage::Executed,
                }
            }
        }
    }

    fn rejected(reason: Option<&str>) -> ExecutionResult {
        let reason = reason.unwrap_or(DEFAULT_REJECT_REASON);
        ExecutionResult {
            summary: format!(
                "❌ **Operation rejected**\n\nReason: {}\n\n\
                 Tell me what you need instead and I will draft a new query.",
                reason
            ),
            executed_sql: None,
            rows: Vec::new(),
            error: None,
            stage: ExecutionStage::Rejected,
        }
    }

    fn run_sql(&self, sql: &str) -> MockOutput {
        let operation = detect_operation_type(sql);
        let table = extract_table_name(sql);

        match operation {
            OperationType::Select => match self.dataset.rows(&table) {
                Some(rows) => {
                    let rows: Vec<Value> = rows.iter().take(MAX_SELECT_ROWS).cloned().collect();
                    let pretty =
                        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string());
                    MockOutput {
                        text: format!(
                            "✅ Query succeeded.\n\nReturned {} rows:\n```json\n{}\n```",
                            rows.len(),
                            pretty
                        ),
                        rows,
                        error: None,
                    }
                }
                None => {
                    let message = format!("table \"{}\" not found", table);
                    MockOutput {
                        text: format!("❌ Error: {}", message),
                        rows: Vec::new(),
                        error: Some(message),
                    }
                }
            },
            OperationType::Delete => {
                let affected = estimate_affected_rows(sql, &table, &self.dataset);
                Self::simulated(format!("✅ Delete succeeded.\n\nDeleted {} rows.", affected))
            }
            OperationType::Update => {
                let affected = estimate_affected_rows(sql, &table, &self.dataset);
                Self::simulated(format!("✅ Update succeeded.\n\nUpdated {} rows.", affected))
            }
            OperationType::Insert => Self::simulated(format!(
                "✅ Insert succeeded.\n\nInserted 1 row into {}.",
                table
            )),
            OperationType::Drop => {
                Self::simulated(format!("✅ Table \"{}\" dropped.", table))
            }
            OperationType::Create | OperationType::Alter => {
                Self::simulated("✅ SQL executed.".to_string())
            }
        }
    }

    fn simulated(text: String) -> MockOutput {
        MockOutput {
            text: format!("{}\n\n{}", text, SIMULATED_NOTE),
            rows: Vec::new(),
            error: None,
        }
    }
}
