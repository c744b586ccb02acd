// In-memory mock dataset
//
// Stands in for a real database. The host owns one instance and hands it to
// the assistant, which shares it with the classifier (row estimates) and the
// executor (SELECT results). Nothing ever writes to it; mutating statements
// are only simulated.

use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Read-only table rows keyed by lower-case table name
#[derive(Debug, Clone, Default)]
pub struct MockDataset {
    tables: BTreeMap<String, Vec<Value>>,
}

impl MockDataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Dataset with the `orders`, `users` and `products` demo tables
    pub fn seeded() -> Self {
        Self::new()
            .with_table(
                "orders",
                vec![
                    json!({"id": 1, "customer": "Alice Chen", "amount": 150, "status": "completed", "created_at": "2025-12-01"}),
                    json!({"id": 2, "customer": "Bob Li", "amount": 280, "status": "pending", "created_at": "2025-12-15"}),
                    json!({"id": 3, "customer": "Carol Wang", "amount": 95, "status": "cancelled", "created_at": "2024-06-01"}),
                    json!({"id": 4, "customer": "Dan Zhao", "amount": 420, "status": "completed", "created_at": "2024-01-15"}),
                    json!({"id": 5, "customer": "Eve Qian", "amount": 180, "status": "pending", "created_at": "2024-03-20"}),
                ],
            )
            .with_table(
                "users",
                vec![
                    json!({"id": 1, "name": "Alice Chen", "email": "alice@example.com", "role": "admin"}),
                    json!({"id": 2, "name": "Bob Li", "email": "bob@example.com", "role": "user"}),
                    json!({"id": 3, "name": "Carol Wang", "email": "carol@example.com", "role": "user"}),
                ],
            )
            .with_table(
                "products",
                vec![
                    json!({"id": 1, "name": "Laptop", "price": 5999, "stock": 50, "category": "electronics"}),
                    json!({"id": 2, "name": "Wireless Mouse", "price": 99, "stock": 200, "category": "accessories"}),
                    json!({"id": 3, "name": "Mechanical Keyboard", "price": 399, "stock": 80, "category": "accessories"}),
                ],
            )
    }

    /// Add or replace a table
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.tables.insert(name.into().to_lowercase(), rows);
        self
    }

    /// Rows of a table, `None` if the table does not exist
    pub fn rows(&self, table: &str) -> Option<&[Value]> {
        self.tables.get(table).map(|rows| rows.as_slice())
    }

    /// Row count of a table (0 for unknown tables)
    pub fn row_count(&self, table: &str) -> u64 {
        self.tables
            .get(table)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0)
    }

    /// Whether the table exists
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Table names in sorted order
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}
