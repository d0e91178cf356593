use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OpenFlags};
use tracing::{debug, info};

use crate::error::{BoundaryErrorExt, Result, ScoreError};
use crate::types::{TradingRecord, TrainingRow};

/// Max bound parameters per `IN (...)` query
const KEY_CHUNK_SIZE: usize = 500;

/// Read access to historical trading data.
pub trait FeatureStore: Send + Sync {
    /// Rows for the given players, in storage order.
    fn fetch_records(&self, keys: &[String]) -> Result<Vec<TradingRecord>>;

    /// Sum of buy and sell volume across every row of one player. 0 when absent.
    fn fetch_aggregate_volume(&self, key: &str) -> Result<f64>;

    /// Every labeled row of the table, for training.
    fn fetch_training_rows(&self) -> Result<Vec<TrainingRow>>;
}

/// `trading_data` table in a SQLite file behind an r2d2 pool.
pub struct SqliteFeatureStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteFeatureStore {
    /// Open an existing database. Never creates the file, its directory or
    /// the table; a missing one is a configuration error.
    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ScoreError::Configuration(format!(
                "database {} does not exist",
                path.display()
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let store = Self::with_manager(SqliteConnectionManager::file(path).with_flags(flags), pool_size, timeout)?;

        let has_table: bool = store
            .conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'trading_data')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| ScoreError::Configuration(format!("inspect {}: {}", path.display(), e)))?;
        if !has_table {
            return Err(ScoreError::Configuration(format!(
                "database {} has no trading_data table",
                path.display()
            )));
        }

        info!("✅ Feature store opened: {}", path.display());
        Ok(store)
    }

    /// Open or create the database and its schema. Loader and test path only.
    pub fn create<P: AsRef<Path>>(path: P, pool_size: u32, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ScoreError::Configuration(format!("database directory: {}", e)))?;
            }
        }

        let store = Self::with_manager(SqliteConnectionManager::file(path), pool_size, timeout)?;
        store.initialize_schema()?;

        info!("✅ Feature store ready: {}", path.display());
        Ok(store)
    }

    fn with_manager(manager: SqliteConnectionManager, pool_size: u32, timeout: Duration) -> Result<Self> {
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(timeout)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(timeout)
            .build(manager)
            .map_err(|e| ScoreError::Configuration(format!("database pool: {}", e)))?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().storage_err("connection checkout")
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS trading_data (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    player_key TEXT NOT NULL,
                    hold_duration REAL,
                    buy_volume REAL,
                    sell_volume REAL,
                    transaction_frequency REAL,
                    trading_score REAL
                );

                CREATE INDEX IF NOT EXISTS idx_trading_data_player ON trading_data(player_key);
                "#,
            )
            .storage_err("initialize schema")?;

        debug!("📊 trading_data schema initialized");
        Ok(())
    }

    /// Append one row. Used by loaders and tests; the scoring path never writes.
    pub fn insert_row(&self, player_key: &str, row: &TrainingRow) -> Result<()> {
        self.conn()?
            .execute(
                r#"
                INSERT INTO trading_data (
                    player_key, hold_duration, buy_volume, sell_volume,
                    transaction_frequency, trading_score
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    player_key,
                    row.hold_duration,
                    row.buy_volume,
                    row.sell_volume,
                    row.transaction_frequency,
                    row.trading_score,
                ],
            )
            .storage_err("insert row")?;
        Ok(())
    }

    pub fn insert_record(&self, record: &TradingRecord, trading_score: Option<f64>) -> Result<()> {
        self.insert_row(
            &record.player_key,
            &TrainingRow {
                hold_duration: Some(record.hold_duration),
                buy_volume: Some(record.buy_volume),
                sell_volume: Some(record.sell_volume),
                transaction_frequency: Some(record.transaction_frequency),
                trading_score,
            },
        )
    }
}

impl FeatureStore for SqliteFeatureStore {
    fn fetch_records(&self, keys: &[String]) -> Result<Vec<TradingRecord>> {
        // IN (...) has set semantics; dedup so chunking can't double-count a row
        let mut seen = HashSet::new();
        let unique: Vec<&String> = keys.iter().filter(|k| seen.insert(k.as_str())).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut rows: Vec<(i64, TradingRecord)> = Vec::new();

        for chunk in unique.chunks(KEY_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT id, player_key, hold_duration, buy_volume, sell_volume, transaction_frequency
                 FROM trading_data
                 WHERE player_key IN ({})
                 ORDER BY id ASC",
                placeholders
            );
            let mut stmt = conn.prepare(&sql).storage_err("prepare scoring query")?;
            let chunk_rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        TradingRecord {
                            player_key: row.get(1)?,
                            hold_duration: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                            buy_volume: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                            sell_volume: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                            transaction_frequency: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                        },
                    ))
                })
                .storage_err("scoring query")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage_err("scoring row")?;
            rows.extend(chunk_rows);
        }

        rows.sort_by_key(|(id, _)| *id);
        debug!("Fetched {} records for {} keys", rows.len(), unique.len());
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }

    fn fetch_aggregate_volume(&self, key: &str) -> Result<f64> {
        let total: Option<f64> = self
            .conn()?
            .query_row(
                "SELECT SUM(buy_volume + sell_volume) FROM trading_data WHERE player_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .storage_err("volume query")?;
        Ok(total.unwrap_or(0.0))
    }

    fn fetch_training_rows(&self) -> Result<Vec<TrainingRow>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT hold_duration, buy_volume, sell_volume, transaction_frequency, trading_score
                FROM trading_data
                ORDER BY id ASC
                "#,
            )
            .storage_err("prepare training query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok(TrainingRow {
                    hold_duration: row.get(0)?,
                    buy_volume: row.get(1)?,
                    sell_volume: row.get(2)?,
                    transaction_frequency: row.get(3)?,
                    trading_score: row.get(4)?,
                })
            })
            .storage_err("training query")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage_err("training row")?;

        info!("📥 Loaded {} training rows", rows.len());
        Ok(rows)
    }
}
