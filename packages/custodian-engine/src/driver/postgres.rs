//! Relational [`StorageDriver`] backend, feature `postgres`.
//!
//! A `sqlx::PgPool`, plain runtime-checked SQL (no ORM), and pool stats read
//! straight off `PgPool::size`/`num_idle`. An `events` table keyed by
//! `record_id` with a `(shard, death_date)` index for the reclaimer scan,
//! and a `blacklist` table for the denylist.
//!
//! `record_id` is `GENERATED BY DEFAULT AS IDENTITY`: the batched writer
//! forwards records with `record_id == 0` (id assignment is the driver's
//! job, not the caller's), so those rows omit the column and let Postgres
//! assign it; records that already carry a nonzero id insert it explicitly
//! and fall back to `ON CONFLICT DO NOTHING`.

use async_trait::async_trait;
use custodian_core::{AlgTag, DenylistedItem, Record, RecordToDelete, RecordType};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{require_non_empty, DenylistSource, Inserter, PoolStats, Pruner, RecordGetter, StorageDriver};

/// `StorageDriver` backed by PostgreSQL via `sqlx`.
pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    /// Connects to `database_url`, capping the pool at `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or initial handshake fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an already-constructed pool, e.g. one shared with another
    /// subsystem or configured with custom connect options.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `events` and `blacklist` tables if they do not exist.
    /// Intended for tests and local development; production deployments are
    /// expected to manage schema migrations externally.
    ///
    /// # Errors
    ///
    /// Returns an error if any `CREATE TABLE` statement fails.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                record_id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                type SMALLINT NOT NULL,
                device_id TEXT NOT NULL,
                birth_date BIGINT NOT NULL,
                death_date BIGINT NOT NULL,
                data BYTEA NOT NULL,
                nonce BYTEA NOT NULL,
                alg TEXT NOT NULL,
                kid TEXT NOT NULL,
                shard INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS events_shard_death_date_idx ON events (shard, death_date)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS events_device_id_birth_date_idx ON events (device_id, birth_date DESC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blacklist (
                id TEXT PRIMARY KEY,
                reason TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> anyhow::Result<Record> {
    let type_tag: i16 = row.try_get("type")?;
    let alg_str: String = row.try_get("alg")?;
    Ok(Record {
        r#type: RecordType::try_from(u8::try_from(type_tag)?)?,
        device_id: row.try_get("device_id")?,
        birth_date: row.try_get("birth_date")?,
        death_date: row.try_get("death_date")?,
        data: row.try_get("data")?,
        nonce: row.try_get("nonce")?,
        alg: alg_str.parse::<AlgTag>()?,
        kid: row.try_get("kid")?,
        record_id: row.try_get("record_id")?,
        shard: row.try_get("shard")?,
    })
}

#[async_trait]
impl Inserter for PostgresDriver {
    async fn insert_many(&self, records: &[Record]) -> anyhow::Result<u64> {
        require_non_empty(records)?;
        let mut tx = self.pool.begin().await?;
        for record in records {
            if record.record_id == 0 {
                sqlx::query(
                    "INSERT INTO events
                        (type, device_id, birth_date, death_date, data, nonce, alg, kid, shard)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(i16::from(record.r#type.tag()))
                .bind(&record.device_id)
                .bind(record.birth_date)
                .bind(record.death_date)
                .bind(&record.data)
                .bind(&record.nonce)
                .bind(record.alg.as_str())
                .bind(&record.kid)
                .bind(record.shard)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    "INSERT INTO events
                        (record_id, type, device_id, birth_date, death_date, data, nonce, alg, kid, shard)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                     ON CONFLICT (record_id) DO NOTHING",
                )
                .bind(record.record_id)
                .bind(i16::from(record.r#type.tag()))
                .bind(&record.device_id)
                .bind(record.birth_date)
                .bind(record.death_date)
                .bind(&record.data)
                .bind(&record.nonce)
                .bind(record.alg.as_str())
                .bind(&record.kid)
                .bind(record.shard)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(records.len() as u64)
    }
}

#[async_trait]
impl RecordGetter for PostgresDriver {
    async fn find_records(&self, device_id: &str, limit: u32) -> anyhow::Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE device_id = $1 ORDER BY birth_date DESC LIMIT $2",
        )
        .bind(device_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_records_of_type(
        &self,
        device_id: &str,
        limit: u32,
        record_type: RecordType,
    ) -> anyhow::Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE device_id = $1 AND type = $2 ORDER BY birth_date DESC LIMIT $3",
        )
        .bind(device_id)
        .bind(i16::from(record_type.tag()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl Pruner for PostgresDriver {
    async fn find_records_to_delete(
        &self,
        shard: i32,
        limit: u32,
        now_ns: i64,
    ) -> anyhow::Result<Vec<RecordToDelete>> {
        let rows = sqlx::query(
            "SELECT shard, death_date, record_id FROM events
             WHERE shard = $1 AND death_date < $2
             ORDER BY death_date, record_id
             LIMIT $3",
        )
        .bind(shard)
        .bind(now_ns)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(RecordToDelete {
                    shard: row.try_get("shard")?,
                    death_date: row.try_get("death_date")?,
                    record_id: row.try_get("record_id")?,
                })
            })
            .collect()
    }

    async fn delete_record(&self, shard: i32, death_date: i64, record_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM events WHERE shard = $1 AND death_date = $2 AND record_id = $3")
            .bind(shard)
            .bind(death_date)
            .bind(record_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DenylistSource for PostgresDriver {
    async fn get_denylist(&self) -> anyhow::Result<Vec<DenylistedItem>> {
        let rows = sqlx::query("SELECT id, reason FROM blacklist").fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(DenylistedItem {
                    id: row.try_get("id")?,
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StorageDriver for PostgresDriver {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            open: u32::from(self.pool.size()),
            in_use: u32::from(self.pool.size()) - u32::try_from(self.pool.num_idle()).unwrap_or(0),
            idle: u32::try_from(self.pool.num_idle()).unwrap_or(0),
        }
    }
}
