use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{error, info};

use super::{Sink, Transaction};
use crate::config::DorisConfig;
use crate::error::SinkError;
use crate::record::{RecordKind, Row, Table};

// MySQL protocol limit on bound parameters in one prepared statement.
const MAX_PLACEHOLDERS: usize = 65_535;

/// Batched inserts into Doris over its MySQL-protocol frontend.
pub struct DorisSink {
    pool: MySqlPool,
    batch_size: usize,
}

impl DorisSink {
    /// Connections are opened on first use, so an unreachable warehouse shows
    /// up as failed batches rather than a startup error.
    pub fn new(config: &DorisConfig, batch_size: usize) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy_with(options);

        Self::with_pool(pool, batch_size)
    }

    pub fn with_pool(pool: MySqlPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    /// Rows per insert for `table`: the configured batch size, capped so one
    /// statement stays under the placeholder limit.
    pub fn batch_limit(&self, table: &Table) -> usize {
        let per_statement = (MAX_PLACEHOLDERS / table.columns.len().max(1)).max(1);
        self.batch_size.min(per_statement)
    }

    /// Insert one batch in its own transaction. A failure is logged and the
    /// batch rolled back; it never stops later batches.
    async fn write_batch(
        &self,
        table: &'static Table,
        rows: Vec<Vec<Value>>,
    ) -> Result<usize, SinkError> {
        let count = rows.len();
        match self.try_write_batch(table, rows).await {
            Ok(()) => {
                metrics::counter!("activity_export_rows_written_total", "sink" => "doris")
                    .increment(count as u64);
                info!("Successfully inserted {count} rows into {}", table.name);
                Ok(count)
            }
            Err(e) => {
                metrics::counter!("activity_export_batches_failed_total", "table" => table.name)
                    .increment(1);
                error!("Dropping batch of {count} rows: {e}");
                Err(e)
            }
        }
    }

    async fn try_write_batch(
        &self,
        table: &'static Table,
        rows: Vec<Vec<Value>>,
    ) -> Result<(), SinkError> {
        let db_error = |source| SinkError::Database {
            table: table.name.to_owned(),
            source,
        };

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut query = insert_query(table, rows);
        if let Err(e) = query.build().execute(&mut *tx).await {
            if let Err(rollback) = tx.rollback().await {
                error!("Rollback on {} failed: {rollback}", table.name);
            }
            return Err(db_error(e));
        }
        tx.commit().await.map_err(db_error)
    }
}

pub fn insert_query(table: &Table, rows: Vec<Vec<Value>>) -> QueryBuilder<'static, MySql> {
    let mut query = QueryBuilder::<MySql>::new(format!(
        "INSERT INTO {} ({}) ",
        table.name,
        table.columns.join(", ")
    ));
    query.push_values(rows, |mut separated, row| {
        for value in row {
            bind_value(&mut separated, value);
        }
    });
    query
}

// Containers go in as JSON text
fn bind_value(separated: &mut Separated<'_, 'static, MySql, &'static str>, value: Value) {
    match value {
        Value::Null => separated.push_bind(None::<String>),
        Value::Bool(b) => separated.push_bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => separated.push_bind(i),
            None => separated.push_bind(n.as_f64()),
        },
        Value::String(s) => separated.push_bind(s),
        other => separated.push_bind(other.to_string()),
    };
}

#[async_trait]
impl Sink for DorisSink {
    async fn begin<'a>(
        &'a self,
        _kind: &'static RecordKind,
    ) -> Result<Box<dyn Transaction<'a> + 'a>, SinkError> {
        Ok(Box::new(DorisTransaction::new(self)))
    }
}

struct Buffer {
    table: &'static Table,
    rows: Vec<Vec<Value>>,
}

/// Buffers rows per destination table and flushes a table whenever it
/// reaches its batch limit, and everything left on commit.
pub struct DorisTransaction<'a> {
    sink: &'a DorisSink,
    buffers: BTreeMap<&'static str, Buffer>,
    written: usize,
    batches: usize,
    failed_batches: usize,
}

impl<'a> DorisTransaction<'a> {
    fn new(sink: &'a DorisSink) -> Self {
        Self {
            sink,
            buffers: BTreeMap::new(),
            written: 0,
            batches: 0,
            failed_batches: 0,
        }
    }

    async fn flush(&mut self, table: &'static Table, rows: Vec<Vec<Value>>) {
        self.batches += 1;
        match self.sink.write_batch(table, rows).await {
            Ok(count) => self.written += count,
            Err(_) => self.failed_batches += 1,
        }
    }

    async fn flush_all(&mut self) {
        for (_, buffer) in std::mem::take(&mut self.buffers) {
            if !buffer.rows.is_empty() {
                self.flush(buffer.table, buffer.rows).await;
            }
        }
    }
}

#[async_trait]
impl<'a> Transaction<'a> for DorisTransaction<'a> {
    async fn emit(&mut self, rows: Vec<Row>) -> Result<(), SinkError> {
        for table_row in rows.into_iter().filter_map(|row| row.table_row) {
            let table = table_row.table;
            let limit = self.sink.batch_limit(table);
            let buffer = self.buffers.entry(table.name).or_insert_with(|| Buffer {
                table,
                rows: Vec::new(),
            });
            buffer.rows.push(table_row.values);

            if buffer.rows.len() >= limit {
                let batch = std::mem::take(&mut buffer.rows);
                self.flush(table, batch).await;
            }
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<usize, SinkError> {
        self.flush_all().await;
        if self.failed_batches > 0 {
            error!(
                "{} of {} batches failed, {} rows written",
                self.failed_batches, self.batches, self.written
            );
        }
        Ok(self.written)
    }
}
