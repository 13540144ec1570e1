use serverdb_core::{Dialect, insert_statement};

/// SQL flavour of SQLite 3.24 and later.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn integer_type(&self) -> &'static str {
        "INTEGER"
    }

    fn auto_increment_primary_key(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn upsert(
        &self,
        table: &str,
        columns: &[&str],
        conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> String {
        let updates: Vec<String> = update_columns
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!(
            "{} ON CONFLICT ({}) DO UPDATE SET {}",
            insert_statement(table, columns),
            conflict_columns.join(", "),
            updates.join(", ")
        )
    }
}
