/// PostgreSQL introspection tool set. Connects lazily, keeps one pool for
/// the session, and refuses anything that is not a plain read: free-form
/// SQL passes a SELECT-only guard and identifiers are validated and quoted
/// before they reach a statement.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::mcp::args::{opt_str, opt_u64, require_str};
use crate::mcp::{ToolDescriptor, ToolError, ToolSet};

const DEFAULT_ROW_LIMIT: u64 = 100;
const MAX_ROW_LIMIT: u64 = 1_000;

/// Statement verbs that never belong in a read-only session.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "grant", "revoke",
    "copy", "vacuum", "reindex", "cluster", "comment", "do", "call", "merge",
];

pub struct PostgresTools {
    pool: Mutex<Option<PgPool>>,
    default_url: Option<String>,
    ident_re: Regex,
}

impl PostgresTools {
    pub fn new(default_url: Option<String>) -> Self {
        let ident_re =
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid");
        Self {
            pool: Mutex::new(None),
            default_url,
            ident_re,
        }
    }

    async fn connect(&self, url: &str) -> Result<PgPool, ToolError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| ToolError::Failed(format!("connection failed: {}", e)))?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| ToolError::Failed(format!("connection test failed: {}", e)))?;
        info!("postgres pool established");
        *self.pool.lock().await = Some(pool.clone());
        Ok(pool)
    }

    /// Current pool, establishing one from the configured default if a
    /// `pg_connect` never happened.
    async fn pool(&self) -> Result<PgPool, ToolError> {
        if let Some(pool) = self.pool.lock().await.as_ref() {
            return Ok(pool.clone());
        }
        match &self.default_url {
            Some(url) => {
                let url = url.clone();
                self.connect(&url).await
            }
            None => Err(ToolError::Rejected(
                "not connected; call pg_connect first".to_string(),
            )),
        }
    }

    fn vet_identifier(&self, key: &str, value: &str) -> Result<(), ToolError> {
        if self.ident_re.is_match(value) {
            Ok(())
        } else {
            Err(ToolError::bad_argument(
                key,
                format!("'{}' is not a valid identifier", value),
            ))
        }
    }

    async fn fetch_json(&self, sql: &str) -> Result<Value, ToolError> {
        let pool = self.pool().await?;
        let rows = sqlx::query(sql)
            .fetch_all(&pool)
            .await
            .map_err(|e| ToolError::Failed(format!("query failed: {}", e)))?;
        Ok(json!({
            "row_count": rows.len(),
            "rows": rows.iter().map(row_to_json).collect::<Vec<_>>(),
        }))
    }

    async fn describe_table(&self, schema: &str, table: &str) -> Result<Value, ToolError> {
        let pool = self.pool().await?;

        let columns = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&pool)
        .await
        .map_err(|e| ToolError::Failed(format!("column lookup failed: {}", e)))?;

        if columns.is_empty() {
            return Err(ToolError::Failed(format!(
                "table {}.{} not found",
                schema, table
            )));
        }

        let primary_keys = sqlx::query(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = $1 AND tc.table_name = $2",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&pool)
        .await
        .map_err(|e| ToolError::Failed(format!("primary key lookup failed: {}", e)))?;

        let foreign_keys = sqlx::query(
            "SELECT kcu.column_name, ccu.table_name AS foreign_table, \
                    ccu.column_name AS foreign_column \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON tc.constraint_name = ccu.constraint_name \
             WHERE tc.constraint_type = 'FOREIGN KEY' \
               AND tc.table_schema = $1 AND tc.table_name = $2",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&pool)
        .await
        .map_err(|e| ToolError::Failed(format!("foreign key lookup failed: {}", e)))?;

        Ok(json!({
            "schema": schema,
            "table": table,
            "columns": columns.iter().map(row_to_json).collect::<Vec<_>>(),
            "primary_keys": primary_keys
                .iter()
                .map(|r| r.get::<String, _>("column_name"))
                .collect::<Vec<_>>(),
            "foreign_keys": foreign_keys.iter().map(row_to_json).collect::<Vec<_>>(),
        }))
    }
}

/// Reject anything other than a single SELECT (or WITH ... SELECT)
/// statement. String literals are skipped so a quoted 'delete' does not
/// trip the keyword scan.
pub fn ensure_select_only(sql: &str) -> Result<(), ToolError> {
    // At most one trailing terminator comes off; a second one is chaining.
    let trimmed = sql.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return Err(ToolError::bad_argument("query", "must not be empty"));
    }
    if trimmed.contains(';') {
        return Err(ToolError::Rejected(
            "multiple statements are not allowed".to_string(),
        ));
    }

    let first = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if first != "select" && first != "with" {
        return Err(ToolError::Rejected(
            "only SELECT queries are allowed".to_string(),
        ));
    }

    for word in words_outside_strings(trimmed) {
        if FORBIDDEN_KEYWORDS.contains(&word.as_str()) {
            return Err(ToolError::Rejected(format!(
                "forbidden keyword '{}' in query",
                word
            )));
        }
    }
    Ok(())
}

/// Lowercased word tokens of `sql`, ignoring the contents of single-quoted
/// string literals (with '' escapes).
fn words_outside_strings(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                } else {
                    in_string = false;
                }
            }
            continue;
        }
        match c {
            '\'' => {
                in_string = true;
                flush_word(&mut current, &mut words);
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                current.push(c.to_ascii_lowercase());
            }
            _ => flush_word(&mut current, &mut words),
        }
    }
    flush_word(&mut current, &mut words);
    words
}

fn flush_word(current: &mut String, words: &mut Vec<String>) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

/// Convert one row to JSON by column type name. Types without a mapping
/// come through as a placeholder rather than an error.
fn row_to_json(row: &PgRow) -> Value {
    let mut object = serde_json::Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .map(|v| v.map_or(Value::Null, Value::Bool)),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .map(|v| v.map_or(Value::Null, |n| json!(n))),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .map(|v| v.map_or(Value::Null, |n| json!(n))),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .map(|v| v.map_or(Value::Null, |n| json!(n))),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .map(|v| v.map_or(Value::Null, |n| json!(n))),
            "FLOAT8" | "NUMERIC" => row
                .try_get::<Option<f64>, _>(idx)
                .map(|v| v.map_or(Value::Null, |n| json!(n))),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map_or(Value::Null, Value::String)),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map_or(Value::Null, |t| json!(t.to_rfc3339()))),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(idx)
                .map(|v| v.map_or(Value::Null, |t| json!(t.to_string()))),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map_or(Value::Null, |d| json!(d.to_string()))),
            "UUID" => row
                .try_get::<Option<Uuid>, _>(idx)
                .map(|v| v.map_or(Value::Null, |u| json!(u.to_string()))),
            "JSON" | "JSONB" => row
                .try_get::<Option<Value>, _>(idx)
                .map(|v| v.unwrap_or(Value::Null)),
            other => Ok(Value::String(format!("<unsupported type {}>", other))),
        };
        object.insert(
            column.name().to_string(),
            value.unwrap_or(Value::Null),
        );
    }
    Value::Object(object)
}

fn schema_obj(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[async_trait]
impl ToolSet for PostgresTools {
    fn server_name(&self) -> &'static str {
        "postgres-mcp"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "pg_connect",
                description: "Connect to a PostgreSQL server by URL",
                input_schema: schema_obj(json!({"url": {"type": "string"}}), &["url"]),
            },
            ToolDescriptor {
                name: "pg_count_databases",
                description: "Count non-template databases",
                input_schema: schema_obj(json!({}), &[]),
            },
            ToolDescriptor {
                name: "pg_list_databases",
                description: "List non-template databases with size and owner",
                input_schema: schema_obj(json!({}), &[]),
            },
            ToolDescriptor {
                name: "pg_list_schemas",
                description: "List user schemas in the current database",
                input_schema: schema_obj(json!({}), &[]),
            },
            ToolDescriptor {
                name: "pg_list_tables",
                description: "List tables in a schema (default public)",
                input_schema: schema_obj(json!({"schema": {"type": "string"}}), &[]),
            },
            ToolDescriptor {
                name: "pg_describe_table",
                description: "Columns, primary keys and foreign keys of a table",
                input_schema: schema_obj(
                    json!({
                        "table": {"type": "string"},
                        "schema": {"type": "string"},
                    }),
                    &["table"],
                ),
            },
            ToolDescriptor {
                name: "pg_table_data",
                description: "Sample rows from a table (limit capped at 1000)",
                input_schema: schema_obj(
                    json!({
                        "table": {"type": "string"},
                        "schema": {"type": "string"},
                        "limit": {"type": "integer"},
                    }),
                    &["table"],
                ),
            },
            ToolDescriptor {
                name: "pg_query",
                description: "Run a read-only SELECT query",
                input_schema: schema_obj(
                    json!({
                        "query": {"type": "string"},
                        "limit": {"type": "integer"},
                    }),
                    &["query"],
                ),
            },
        ]
    }

    async fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        match name {
            "pg_connect" => {
                let url = require_str(arguments, "url")?;
                self.connect(url).await?;
                Ok(json!({ "connected": true }))
            }
            "pg_count_databases" => {
                self.fetch_json(
                    "SELECT count(*) AS databases FROM pg_database WHERE datistemplate = false",
                )
                .await
            }
            "pg_list_databases" => {
                self.fetch_json(
                    "SELECT datname, pg_get_userbyid(datdba) AS owner, \
                            pg_size_pretty(pg_database_size(datname)) AS size \
                     FROM pg_database WHERE datistemplate = false ORDER BY datname",
                )
                .await
            }
            "pg_list_schemas" => {
                self.fetch_json(
                    "SELECT schema_name FROM information_schema.schemata \
                     WHERE schema_name NOT IN ('pg_catalog', 'information_schema') \
                     ORDER BY schema_name",
                )
                .await
            }
            "pg_list_tables" => {
                let schema = opt_str(arguments, "schema")?.unwrap_or("public");
                self.vet_identifier("schema", schema)?;
                let pool = self.pool().await?;
                let rows = sqlx::query(
                    "SELECT table_name, table_type FROM information_schema.tables \
                     WHERE table_schema = $1 ORDER BY table_name",
                )
                .bind(schema)
                .fetch_all(&pool)
                .await
                .map_err(|e| ToolError::Failed(format!("table lookup failed: {}", e)))?;
                Ok(json!({
                    "schema": schema,
                    "tables": rows.iter().map(row_to_json).collect::<Vec<_>>(),
                }))
            }
            "pg_describe_table" => {
                let table = require_str(arguments, "table")?;
                let schema = opt_str(arguments, "schema")?.unwrap_or("public");
                self.vet_identifier("table", table)?;
                self.vet_identifier("schema", schema)?;
                self.describe_table(schema, table).await
            }
            "pg_table_data" => {
                let table = require_str(arguments, "table")?;
                let schema = opt_str(arguments, "schema")?.unwrap_or("public");
                self.vet_identifier("table", table)?;
                self.vet_identifier("schema", schema)?;
                let limit = opt_u64(arguments, "limit", DEFAULT_ROW_LIMIT)?.min(MAX_ROW_LIMIT);
                let sql = format!(
                    "SELECT * FROM \"{}\".\"{}\" LIMIT {}",
                    schema, table, limit
                );
                self.fetch_json(&sql).await
            }
            "pg_query" => {
                let query = require_str(arguments, "query")?;
                ensure_select_only(query)?;
                let limit = opt_u64(arguments, "limit", DEFAULT_ROW_LIMIT)?.min(MAX_ROW_LIMIT);
                let inner = query.trim();
                let inner = inner.strip_suffix(';').unwrap_or(inner);
                let bounded =
                    format!("SELECT * FROM ({}) AS bounded LIMIT {}", inner, limit);
                self.fetch_json(&bounded).await
            }
            other => Err(self.unknown_tool(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_select_passes() {
        assert!(ensure_select_only("SELECT * FROM res_partner").is_ok());
        assert!(ensure_select_only("  select 1;  ").is_ok());
    }

    #[test]
    fn cte_select_passes() {
        assert!(ensure_select_only(
            "WITH recent AS (SELECT id FROM res_users) SELECT * FROM recent"
        )
        .is_ok());
    }

    #[test]
    fn mutations_are_rejected() {
        assert!(ensure_select_only("DROP TABLE res_partner").is_err());
        assert!(ensure_select_only("DELETE FROM res_partner").is_err());
        assert!(ensure_select_only("UPDATE res_users SET login = 'x'").is_err());
        assert!(ensure_select_only("INSERT INTO t VALUES (1)").is_err());
    }

    #[test]
    fn stacked_statements_are_rejected() {
        assert!(ensure_select_only("SELECT 1; DROP TABLE res_partner").is_err());
        assert!(ensure_select_only("SELECT 1;;").is_err());
        assert!(ensure_select_only("SELECT 1 ;; ").is_err());
        assert!(ensure_select_only("SELECT 1; ;").is_err());
    }

    #[test]
    fn single_trailing_terminator_is_tolerated() {
        assert!(ensure_select_only("SELECT 1;").is_ok());
        assert!(ensure_select_only("SELECT 1 ;  ").is_ok());
    }

    #[test]
    fn bare_forbidden_word_is_rejected_even_deep_in_the_query() {
        assert!(ensure_select_only("SELECT * FROM t WHERE id IN (DELETE FROM u RETURNING id)").is_err());
        // Prefixed words are distinct tokens and stay allowed.
        assert!(ensure_select_only("SELECT updated_at FROM res_partner").is_ok());
    }

    #[test]
    fn keyword_inside_string_literal_is_fine() {
        assert!(ensure_select_only("SELECT * FROM log WHERE action = 'delete'").is_ok());
        assert!(ensure_select_only("SELECT 'drop table users; --'").is_err());
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(ensure_select_only("   ").is_err());
        assert!(ensure_select_only(";").is_err());
    }

    #[test]
    fn identifier_pattern_blocks_quoting_tricks() {
        let tools = PostgresTools::new(None);
        assert!(tools.vet_identifier("table", "res_partner").is_ok());
        assert!(tools.vet_identifier("table", "_internal").is_ok());
        assert!(tools.vet_identifier("table", "res\"partner").is_err());
        assert!(tools.vet_identifier("table", "res partner").is_err());
        assert!(tools.vet_identifier("table", "1table").is_err());
    }

    #[tokio::test]
    async fn unconnected_session_without_default_is_rejected() {
        let tools = PostgresTools::new(None);
        let err = tools.pool().await;
        assert!(matches!(err, Err(ToolError::Rejected(_))));
    }

    #[test]
    fn string_literal_tokenizer_handles_escaped_quotes() {
        let words = words_outside_strings("SELECT 'it''s a delete' FROM t");
        assert!(words.contains(&"select".to_string()));
        assert!(words.contains(&"t".to_string()));
        assert!(!words.contains(&"delete".to_string()));
    }
}
