//! SQLite position store.
//!
//! One row per symbol; writes are `INSERT OR REPLACE` so a repeated save after
//! a restart is idempotent.

use crate::domain::error::TraderError;
use crate::domain::position::PersistedPositionRecord;
use crate::ports::config_port::ConfigPort;
use crate::ports::position_store::PositionStore;
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SqlitePositionStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlitePositionStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;
        Self::open(&db_path, config.get_int("sqlite", "pool_size", 2) as u32)
    }

    pub fn open(db_path: &str, pool_size: u32) -> Result<Self, TraderError> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e: r2d2::Error| TraderError::Persistence {
                reason: e.to_string(),
            })?;
        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, TraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| TraderError::Persistence {
                reason: e.to_string(),
            })?;
        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TraderError> {
        self.pool.get().map_err(|e: r2d2::Error| TraderError::Persistence {
            reason: e.to_string(),
        })
    }

    fn initialize_schema(&self) -> Result<(), TraderError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS positions (
                    symbol TEXT PRIMARY KEY,
                    size REAL NOT NULL,
                    price REAL NOT NULL,
                    entry_datetime TEXT NOT NULL
                );",
            )
            .map_err(|e: rusqlite::Error| TraderError::Persistence {
                reason: e.to_string(),
            })
    }
}

impl PositionStore for SqlitePositionStore {
    fn load_all(&self) -> Result<Vec<PersistedPositionRecord>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol, size, price, entry_datetime FROM positions ORDER BY symbol")
            .map_err(|e: rusqlite::Error| TraderError::Persistence {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map([], |row| {
                let ts_str: String = row.get(3)?;
                let entry_time =
                    NaiveDateTime::parse_from_str(&ts_str, DATETIME_FORMAT).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                Ok(PersistedPositionRecord {
                    symbol: row.get(0)?,
                    size: row.get(1)?,
                    price: row.get(2)?,
                    entry_time,
                })
            })
            .map_err(|e: rusqlite::Error| TraderError::Persistence {
                reason: e.to_string(),
            })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e: rusqlite::Error| TraderError::Persistence {
                reason: e.to_string(),
            })?);
        }
        Ok(records)
    }

    fn save(&self, record: &PersistedPositionRecord) -> Result<(), TraderError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO positions (symbol, size, price, entry_datetime)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.symbol,
                    record.size,
                    record.price,
                    record.entry_time.format(DATETIME_FORMAT).to_string()
                ],
            )
            .map_err(|e: rusqlite::Error| TraderError::Persistence {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn delete(&self, symbol: &str) -> Result<(), TraderError> {
        self.conn()?
            .execute("DELETE FROM positions WHERE symbol = ?1", params![symbol])
            .map_err(|e: rusqlite::Error| TraderError::Persistence {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
