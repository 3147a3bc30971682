use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use thiserror::Error;

use crate::{config::StorageConfig, reading::Message};

const INSERT_SENSOR_DATA: &str = r#"
    INSERT INTO sensor_data (time, device_id, temperature, humidity, lpg, co, smoke, light, motion)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    "#;

/// One `sensor_data` row: a flattened [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub struct StorageRow {
    pub time: DateTime<Utc>,
    pub device_id: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub lpg: Option<f64>,
    pub co: Option<f64>,
    pub smoke: Option<f64>,
    pub light: bool,
    pub motion: bool,
}

impl From<Message> for StorageRow {
    fn from(message: Message) -> Self {
        let data = message.data;
        Self {
            time: message.time,
            device_id: message.device_id,
            temperature: data.temperature,
            humidity: data.humidity,
            lpg: data.lpg,
            co: data.co,
            smoke: data.smoke,
            light: data.light,
            motion: data.motion,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("insert statement failed: {0}")]
    Statement(#[source] sqlx::Error),
}

impl StorageError {
    /// Classifies an error raised while executing a statement on an already
    /// acquired connection.
    pub fn from_statement(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::Connection(err),
            _ => StorageError::Statement(err),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

pub trait StorageSink: Send + Sync {
    fn insert(&self, row: &StorageRow) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Builds the pool without connecting; connections are opened on first use.
pub fn new_pool(config: &StorageConfig) -> PgPool {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database);

    PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(config.acquire_timeout())
        .connect_lazy_with(options)
}

#[derive(Debug, Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl StorageSink for PgSink {
    async fn insert(&self, row: &StorageRow) -> Result<(), StorageError> {
        // Dropping the connection returns it to the pool on every path.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(StorageError::Connection)?;

        sqlx::query(INSERT_SENSOR_DATA)
            .bind(row.time)
            .bind(&row.device_id)
            .bind(row.temperature)
            .bind(row.humidity)
            .bind(row.lpg)
            .bind(row.co)
            .bind(row.smoke)
            .bind(row.light)
            .bind(row.motion)
            .execute(&mut *conn)
            .await
            .map_err(StorageError::from_statement)?;

        Ok(())
    }
}
