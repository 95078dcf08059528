// ABOUTME: PgStore - TableStore implementation over a tokio-postgres client
// ABOUTME: Decodes typed rows, binds insert parameters, and isolates row failures with savepoints

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Statement;

use super::connection::{connect_with_retry, Connection};
use crate::config::ConnectionDescriptor;
use crate::tail::{Row, RowSet, TableStore, Value, Window};
use crate::utils::quote_ident;

const ROW_SAVEPOINT: &str = "tail_replicator_row";

/// A prepared INSERT for one table.
pub struct PgInsert {
    table: String,
    statement: Statement,
}

/// One PostgreSQL database, scoped to a schema and optionally a table owner.
pub struct PgStore {
    conn: Connection,
    label: String,
    schema: String,
    owner: Option<String>,
    autocommit: bool,
    in_transaction: bool,
}

impl PgStore {
    /// Connect to the database described by `descriptor`.
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        schema: &str,
        owner: Option<&str>,
    ) -> Result<Self> {
        let label = descriptor.label();
        tracing::info!("Connecting to {}", label);
        let config = descriptor.to_pg_config()?;
        let conn = connect_with_retry(&config)
            .await
            .with_context(|| format!("Failed to connect to {}", label))?;
        tracing::info!("Connected to {}", label);

        Ok(Self {
            conn,
            label,
            schema: schema.to_string(),
            owner: owner.map(str::to_string),
            autocommit: true,
            in_transaction: false,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Close the connection and wait for its task to finish.
    pub async fn close(self) {
        let Connection { client, task } = self.conn;
        drop(client);
        if let Err(e) = task.await {
            tracing::warn!("Connection task for {} did not shut down cleanly: {}", self.label, e);
        }
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    /// Names and types of `columns` (every column when empty) without reading any rows.
    async fn describe_columns(&self, qualified_table: &str, columns: &[String]) -> Result<Vec<(String, Type)>> {
        let projection: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let query = build_select_query(
            qualified_table,
            &projection,
            Window {
                offset: 0,
                limit: Some(0),
            },
        );
        let statement = self
            .conn
            .client
            .prepare(&query)
            .await
            .with_context(|| format!("Failed to describe columns of {}", qualified_table))?;

        Ok(statement
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.type_().clone()))
            .collect())
    }
}

/// Types decoded into a typed `Value`. Every other type travels as its text form.
fn is_native(ty: &Type) -> bool {
    matches!(
        ty.name(),
        "bool"
            | "int2"
            | "int4"
            | "int8"
            | "float4"
            | "float8"
            | "text"
            | "varchar"
            | "bpchar"
            | "name"
            | "citext"
            | "bytea"
            | "uuid"
            | "date"
            | "time"
            | "timestamp"
            | "timestamptz"
            | "json"
            | "jsonb"
    )
}

/// Schema-qualified type name usable in a cast.
fn type_reference(ty: &Type) -> String {
    format!("{}.{}", quote_ident(ty.schema()), quote_ident(ty.name()))
}

/// Select expression for one column: native types as-is, the rest cast to text.
fn select_expr(name: &str, ty: &Type) -> String {
    let quoted = quote_ident(name);
    if is_native(ty) {
        quoted
    } else {
        format!("{0}::text AS {0}", quoted)
    }
}

/// Build the SELECT used for tail and full-table reads.
///
/// `projection` holds rendered select expressions; empty selects every column.
fn build_select_query(qualified_table: &str, projection: &[String], window: Window) -> String {
    let column_list = if projection.is_empty() {
        "*".to_string()
    } else {
        projection.join(", ")
    };

    let mut query = format!("SELECT {} FROM {}", column_list, qualified_table);
    if window.offset > 0 {
        query.push_str(&format!(" OFFSET {}", window.offset));
    }
    if let Some(limit) = window.limit {
        query.push_str(&format!(" LIMIT {}", limit));
    }
    query
}

/// Build a single-row parameterized INSERT over an explicit column list.
///
/// Columns of non-native type take a text parameter that the server casts to
/// the column's type.
fn build_insert_query(qualified_table: &str, columns: &[String], types: &[Type]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = types
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            if is_native(ty) {
                format!("${}", i + 1)
            } else {
                format!("${}::text::{}", i + 1, type_reference(ty))
            }
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table,
        quoted.join(", "),
        placeholders.join(", ")
    )
}

/// Decode one column of a result row into a `Value`.
fn decode_value(row: &tokio_postgres::Row, idx: usize) -> Result<Value> {
    let column = &row.columns()[idx];
    let value = match column.type_().name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(Value::I16),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(Value::I32),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::I64),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.map(Value::F32),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(Value::F64),
        "text" | "varchar" | "bpchar" | "name" | "citext" => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        "uuid" => row.try_get::<_, Option<uuid::Uuid>>(idx)?.map(Value::Uuid),
        "date" => row.try_get::<_, Option<chrono::NaiveDate>>(idx)?.map(Value::Date),
        "time" => row.try_get::<_, Option<chrono::NaiveTime>>(idx)?.map(Value::Time),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(Value::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(Value::TimestampTz),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::Json),
        // select_expr casts every other type to text
        other => bail!(
            "Column '{}' of type '{}' was not read as text",
            column.name(),
            other
        ),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    (0..row.len())
        .map(|idx| decode_value(row, idx))
        .collect::<Result<Vec<_>>>()
        .map(Row::new)
}

/// A NULL of the parameter's own type.
///
/// Parameters are either native types or text (see `build_insert_query`), so
/// the text NULL covers every remaining case.
fn null_for(ty: &Type) -> Box<dyn ToSql + Sync + Send> {
    match ty.name() {
        "bool" => Box::new(None::<bool>),
        "int2" => Box::new(None::<i16>),
        "int4" => Box::new(None::<i32>),
        "int8" => Box::new(None::<i64>),
        "float4" => Box::new(None::<f32>),
        "float8" => Box::new(None::<f64>),
        "bytea" => Box::new(None::<Vec<u8>>),
        "uuid" => Box::new(None::<uuid::Uuid>),
        "date" => Box::new(None::<chrono::NaiveDate>),
        "time" => Box::new(None::<chrono::NaiveTime>),
        "timestamp" => Box::new(None::<chrono::NaiveDateTime>),
        "timestamptz" => Box::new(None::<chrono::DateTime<chrono::Utc>>),
        "json" | "jsonb" => Box::new(None::<serde_json::Value>),
        _ => Box::new(None::<String>),
    }
}

/// Convert a value into a parameter for a column of type `ty`.
///
/// Integers and floats are converted to the width the target column expects.
/// A text parameter accepts any value through its string form. Everything else
/// is bound as-is and the server rejects real mismatches.
fn bind_value(value: &Value, ty: &Type) -> Result<Box<dyn ToSql + Sync + Send>> {
    if *ty == Type::TEXT && !matches!(value, Value::Null | Value::Text(_)) {
        return Ok(Box::new(value.to_string()));
    }

    let integer = match value {
        Value::I16(v) => Some(i64::from(*v)),
        Value::I32(v) => Some(i64::from(*v)),
        Value::I64(v) => Some(*v),
        _ => None,
    };
    if let Some(v) = integer {
        return Ok(match ty.name() {
            "int2" => Box::new(i16::try_from(v).context("Value out of range for smallint")?),
            "int4" => Box::new(i32::try_from(v).context("Value out of range for integer")?),
            "float8" => Box::new(v as f64),
            _ => Box::new(v),
        });
    }

    Ok(match value {
        Value::Null => null_for(ty),
        Value::Bool(v) => Box::new(*v),
        Value::F32(v) if ty.name() == "float8" => Box::new(f64::from(*v)),
        Value::F32(v) => Box::new(*v),
        Value::F64(v) if ty.name() == "float4" => Box::new(*v as f32),
        Value::F64(v) => Box::new(*v),
        Value::Text(v) => Box::new(v.clone()),
        Value::Bytes(v) => Box::new(v.clone()),
        Value::Uuid(v) => Box::new(*v),
        Value::Date(v) => Box::new(*v),
        Value::Time(v) => Box::new(*v),
        Value::Timestamp(v) => Box::new(*v),
        Value::TimestampTz(v) => Box::new(*v),
        Value::Json(v) => Box::new(v.clone()),
        Value::I16(_) | Value::I32(_) | Value::I64(_) => unreachable!("integers bound above"),
    })
}

#[async_trait]
impl TableStore for PgStore {
    type Insert = PgInsert;

    async fn base_tables(&mut self, names: &[String]) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .conn
            .client
            .query(
                "SELECT tablename::text
                 FROM pg_catalog.pg_tables
                 WHERE schemaname = $1
                   AND tablename = ANY($2)
                   AND ($3::text IS NULL OR tableowner = $3)",
                &[&self.schema, &names, &self.owner],
            )
            .await
            .with_context(|| format!("Failed to query catalog of {}", self.label))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", self.qualified(table));
        let row = self.conn.client.query_one(&query, &[]).await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn fetch_rows(
        &mut self,
        table: &str,
        columns: &[String],
        window: Window,
    ) -> Result<RowSet> {
        let qualified = self.qualified(table);
        let described = self.describe_columns(&qualified, columns).await?;
        let projection: Vec<String> = described
            .iter()
            .map(|(name, ty)| select_expr(name, ty))
            .collect();
        let names = described.into_iter().map(|(name, _)| name).collect();

        let query = build_select_query(&qualified, &projection, window);
        let rows = self.conn.client.query(&query, &[]).await?;
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(RowSet::new(names, rows))
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        if enabled && self.in_transaction {
            // Never leave a transaction dangling when auto-commit comes back
            tracing::warn!("Rolling back open transaction on {}", self.label);
            self.conn.client.batch_execute("ROLLBACK").await?;
            self.in_transaction = false;
        }
        self.autocommit = enabled;
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.conn.client.batch_execute("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.client.batch_execute("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.conn.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn prepare_insert(&mut self, table: &str, columns: &[String]) -> Result<PgInsert> {
        if columns.is_empty() {
            bail!("No columns to insert into {}", table);
        }
        let qualified = self.qualified(table);
        let types: Vec<Type> = self
            .describe_columns(&qualified, columns)
            .await?
            .into_iter()
            .map(|(_, ty)| ty)
            .collect();
        let query = build_insert_query(&qualified, columns, &types);
        let statement = self.conn.client.prepare(&query).await?;
        Ok(PgInsert {
            table: table.to_string(),
            statement,
        })
    }

    async fn insert_row(&mut self, insert: &PgInsert, row: &Row) -> Result<u64> {
        let types = insert.statement.params();
        if row.len() != types.len() {
            bail!(
                "Row has {} values but INSERT into {} expects {}",
                row.len(),
                insert.table,
                types.len()
            );
        }

        let values = row
            .values()
            .iter()
            .zip(types)
            .map(|(value, ty)| bind_value(value, ty))
            .collect::<Result<Vec<_>>>()?;
        let params: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .map(|v| v.as_ref() as &(dyn ToSql + Sync))
            .collect();

        if self.autocommit || !self.in_transaction {
            return Ok(self.conn.client.execute(&insert.statement, &params).await?);
        }

        // A failed statement aborts the whole transaction in PostgreSQL, so each
        // row runs under its own savepoint.
        let client = &self.conn.client;
        client
            .batch_execute(&format!("SAVEPOINT {}", ROW_SAVEPOINT))
            .await?;
        match client.execute(&insert.statement, &params).await {
            Ok(affected) => {
                client
                    .batch_execute(&format!("RELEASE SAVEPOINT {}", ROW_SAVEPOINT))
                    .await?;
                Ok(affected)
            }
            Err(e) => {
                client
                    .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", ROW_SAVEPOINT))
                    .await?;
                Err(e.into())
            }
        }
    }
}
