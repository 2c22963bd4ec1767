use crate::model::{
    parse_day, ColumnInfo, DailyMetrics, DateRange, ProductBreakdown, TpvComparison,
    TransactionRecord,
};
use crate::query::{Column, Filter, QueryDescriptor, ResultSet, TabularStore, Value};
use crate::{DatabaseConfig, OpsError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite-backed transactions table.
pub struct StorageManager {
    pool: SqlitePool,
    table: String,
    query_timeout: Duration,
}

impl StorageManager {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;

        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(url = %config.url, "Database connection established");

        Ok(Self {
            pool,
            table: config.table.clone(),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the table with the contents of a daily-aggregated CSV.
    /// Returns the number of rows loaded.
    pub async fn load_csv<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "Loading CSV");

        let records = tokio::task::spawn_blocking(move || read_csv(&path))
            .await
            .map_err(|e| OpsError::Other(e.to_string()))??;

        let drop_sql = format!("DROP TABLE IF EXISTS {}", self.table);
        let create_sql = format!(
            "CREATE TABLE {} (
                day TEXT NOT NULL,
                entity TEXT,
                product TEXT,
                price_tier TEXT,
                anticipation_method TEXT,
                payment_method TEXT,
                installments INTEGER,
                amount_transacted REAL NOT NULL,
                quantity_transactions INTEGER NOT NULL,
                quantity_of_merchants INTEGER NOT NULL
            )",
            self.table
        );
        let insert_sql = format!(
            "INSERT INTO {} (day, entity, product, price_tier, anticipation_method,
                payment_method, installments, amount_transacted, quantity_transactions,
                quantity_of_merchants) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );
        let index_sql = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_day ON {table}(day)",
            table = self.table
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(&drop_sql).execute(&mut *tx).await?;
        sqlx::query(&create_sql).execute(&mut *tx).await?;

        for record in &records {
            sqlx::query(&insert_sql)
                .bind(record.day.as_str())
                .bind(record.entity.as_deref())
                .bind(record.product.as_deref())
                .bind(record.price_tier.as_deref())
                .bind(record.anticipation_method.as_deref())
                .bind(record.payment_method.as_deref())
                .bind(record.installments)
                .bind(record.amount_transacted)
                .bind(record.quantity_transactions)
                .bind(record.quantity_of_merchants)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(&index_sql).execute(&mut *tx).await?;
        tx.commit().await?;

        let rows_loaded = records.len() as u64;
        info!(rows = rows_loaded, table = %self.table, "CSV loaded");
        Ok(rows_loaded)
    }

    pub async fn schema(&self) -> Result<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info({})", self.table);
        self.timed(async {
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            rows.iter()
                .map(|row| -> Result<ColumnInfo> {
                    Ok(ColumnInfo {
                        name: row.try_get("name")?,
                        data_type: row.try_get("type")?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
    }

    pub async fn date_range(&self) -> Result<Option<DateRange>> {
        let sql = format!(
            "SELECT MIN(day) AS start_day, MAX(day) AS end_day FROM {}",
            self.table
        );
        self.timed(async {
            let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
            let start: Option<String> = row.try_get("start_day")?;
            let end: Option<String> = row.try_get("end_day")?;
            let range = match (start, end) {
                (Some(start), Some(end)) => Some(DateRange {
                    start: parse_day(&start)?,
                    end: parse_day(&end)?,
                }),
                _ => None,
            };
            Ok::<_, OpsError>(range)
        })
        .await
    }

    pub async fn total_tpv(&self) -> Result<f64> {
        let sql = format!(
            "SELECT CAST(COALESCE(SUM(amount_transacted), 0) AS REAL) AS total FROM {}",
            self.table
        );
        self.timed(async {
            let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
            let total: f64 = row.try_get("total")?;
            Ok::<_, OpsError>(total)
        })
        .await
    }

    pub async fn daily_metrics(&self) -> Result<Vec<DailyMetrics>> {
        let sql = format!(
            "SELECT day,
                CAST(SUM(amount_transacted) AS REAL) AS tpv,
                CAST(SUM(quantity_transactions) AS REAL) AS transactions,
                CAST(SUM(quantity_of_merchants) AS REAL) AS merchants
            FROM {}
            GROUP BY day
            ORDER BY day",
            self.table
        );
        self.timed(async {
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            rows.iter()
                .map(|row| -> Result<DailyMetrics> {
                    let day: String = row.try_get("day")?;
                    Ok(DailyMetrics {
                        day: parse_day(&day)?,
                        tpv: row.try_get("tpv")?,
                        transactions: row.try_get("transactions")?,
                        merchants: row.try_get("merchants")?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
    }

    pub async fn tpv_by_product(&self) -> Result<Vec<ProductBreakdown>> {
        let sql = format!(
            "SELECT product,
                CAST(SUM(amount_transacted) AS REAL) AS tpv,
                CAST(SUM(quantity_transactions) AS REAL) AS transactions
            FROM {}
            WHERE product IS NOT NULL
            GROUP BY product
            ORDER BY tpv DESC",
            self.table
        );
        self.timed(async {
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            rows.iter()
                .map(|row| -> Result<ProductBreakdown> {
                    Ok(ProductBreakdown::new(
                        row.try_get("product")?,
                        row.try_get("tpv")?,
                        row.try_get("transactions")?,
                    ))
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
    }

    pub async fn tpv_comparison(&self) -> Result<Option<TpvComparison>> {
        let daily = self.daily_metrics().await?;
        Ok(TpvComparison::from_daily(&daily))
    }

    async fn daily_sum(&self, column: Column, filter: Option<&Filter>) -> Result<ResultSet> {
        if !column.is_numeric() {
            return Err(OpsError::DataAccess(format!(
                "Cannot sum non-numeric column '{}'",
                column
            )));
        }

        let mut sql = format!(
            "SELECT day, CAST(SUM({}) AS REAL) AS value FROM {}",
            column, self.table
        );
        if let Some(filter) = filter {
            if !filter.column.is_categorical() {
                return Err(OpsError::DataAccess(format!(
                    "Cannot filter on non-categorical column '{}'",
                    filter.column
                )));
            }
            sql.push_str(&format!(" WHERE {} = ?", filter.column));
        }
        sql.push_str(" GROUP BY day ORDER BY day");

        debug!(%sql, filter = ?filter.map(|f| &f.value), "Executing daily sum");

        let mut query = sqlx::query(&sql);
        if let Some(filter) = filter {
            query = query.bind(filter.value.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut set = ResultSet::new(vec!["day".to_string(), "value".to_string()]);
        for row in rows {
            let day: String = row.try_get("day")?;
            let value: Option<f64> = row.try_get("value")?;
            set.rows
                .push(vec![Value::Text(day), value.map(Value::Real).unwrap_or(Value::Null)]);
        }
        Ok(set)
    }

    async fn distinct(&self, column: Column) -> Result<ResultSet> {
        if !column.is_categorical() {
            return Err(OpsError::DataAccess(format!(
                "Column '{}' is not categorical",
                column
            )));
        }

        let sql = format!(
            "SELECT DISTINCT {col} AS value FROM {table} WHERE {col} IS NOT NULL ORDER BY value",
            col = column,
            table = self.table
        );
        debug!(%sql, "Executing distinct");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut set = ResultSet::new(vec!["value".to_string()]);
        for row in rows {
            let value: String = row.try_get("value")?;
            set.rows.push(vec![Value::Text(value)]);
        }
        Ok(set)
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| {
                OpsError::DataAccess(format!(
                    "Query timed out after {}s",
                    self.query_timeout.as_secs()
                ))
            })?
    }
}

#[async_trait]
impl TabularStore for StorageManager {
    async fn execute(&self, query: &QueryDescriptor) -> Result<ResultSet> {
        match query {
            QueryDescriptor::DailySum { column, filter } => {
                self.timed(self.daily_sum(*column, filter.as_ref())).await
            }
            QueryDescriptor::Distinct { column } => self.timed(self.distinct(*column)).await,
        }
    }
}

fn read_csv(path: &Path) -> Result<Vec<TransactionRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();

    for result in reader.deserialize() {
        let mut record: TransactionRecord = result?;
        record.day = parse_day(&record.day)?.format("%Y-%m-%d").to_string();
        records.push(record);
    }

    Ok(records)
}
