//! Upsert and update statement shapes
//!
//! Handlers write through a fixed set of statement shapes, one per
//! (table, column-set). The SQL text is built once per shape and held in
//! a `Lazy` static; execution goes through rusqlite's per-connection
//! prepared-statement cache, so a statement is prepared at most once per
//! database file and never re-prepared on the hot path.

use rusqlite::{Connection, Params};

/// INSERT ... ON CONFLICT DO UPDATE keyed by the table's primary key
///
/// Parameter order is the column order passed to `new`.
pub struct Upsert {
    sql: String,
}

impl Upsert {
    pub fn new(table: &str, key_columns: &[&str], columns: &[&str]) -> Self {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let updates: Vec<String> = columns
            .iter()
            .filter(|col| !key_columns.contains(*col))
            .map(|col| format!("{} = excluded.{}", col, col))
            .collect();

        let conflict_action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        Self {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
                table,
                columns.join(", "),
                placeholders.join(", "),
                key_columns.join(", "),
                conflict_action
            ),
        }
    }

    /// Insert-if-absent shape: existing rows are left untouched
    pub fn insert_or_ignore(table: &str, key_columns: &[&str], columns: &[&str]) -> Self {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        Self {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
                table,
                columns.join(", "),
                placeholders.join(", "),
                key_columns.join(", ")
            ),
        }
    }

    pub fn execute<P: Params>(&self, conn: &Connection, params: P) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare_cached(&self.sql)?;
        stmt.execute(params)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// UPDATE of a fixed column set under a fixed predicate
///
/// Parameter order is the column order, then the predicate's parameters.
pub struct Update {
    sql: String,
}

impl Update {
    pub fn new(table: &str, columns: &[&str], predicate: &str) -> Self {
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} = ?{}", col, i + 1))
            .collect();
        Self {
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                table,
                assignments.join(", "),
                predicate
            ),
        }
    }

    pub fn execute<P: Params>(&self, conn: &Connection, params: P) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare_cached(&self.sql)?;
        stmt.execute(params)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}
