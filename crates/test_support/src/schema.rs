use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection};

/// Runs every statement of `sql` on one connection, in order.
///
/// # Errors
/// Returns the first failing statement's error, numbered from 1.
pub async fn apply(dsn: &str, sql: &str) -> Result<()> {
    let mut connection = PgConnection::connect(dsn)
        .await
        .context("failed to connect for schema setup")?;

    for (index, statement) in split_statements(sql).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut connection)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(())
}

/// Splits a schema file on lines ending with `;`. Comment-only chunks are
/// dropped; statements must not contain a line-final `;` internally.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            statements.push(current.trim().to_string());
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_line_final_semicolons() {
        let sql = "-- header\nCREATE TABLE a (\n    id int\n);\n\nCREATE INDEX a_idx ON a (id);\n";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert!(statements[0].ends_with(");"));
        assert_eq!(statements[1], "CREATE INDEX a_idx ON a (id);");
    }

    #[test]
    fn keeps_unterminated_tail() {
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1".to_string()]);
        assert!(split_statements("-- only a comment\n").is_empty());
    }
}
