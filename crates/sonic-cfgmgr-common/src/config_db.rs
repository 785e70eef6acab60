//! Redis CONFIG_DB access for cfgmgr daemons.
//!
//! Provides connection management, whole-table reads and keyspace
//! notification subscriptions. CONFIG_DB entries are Redis hashes keyed
//! `<TABLE>|<key>`; change notifications arrive on
//! `__keyspace@<db>__:<TABLE>|<key>` channels and require the server to run
//! with `notify-keyspace-events` enabled (SONiC images enable `AKE`).

use futures::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{CfgMgrError, CfgMgrResult};
use crate::types::{DbId, FieldValues};

/// Separator between table name and key in CONFIG_DB.
pub const TABLE_KEY_SEPARATOR: char = '|';

/// Configuration for a Redis connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Redis server hostname or IP
    pub host: String,
    /// Redis server port
    pub port: u16,
    /// Database index
    pub db: u32,
}

impl RedisConfig {
    /// Creates a new Redis configuration.
    pub fn new(host: impl Into<String>, port: u16, db: u32) -> Self {
        Self {
            host: host.into(),
            port,
            db,
        }
    }

    /// Creates CONFIG_DB connection config.
    pub fn config_db(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, DbId::ConfigDb.id())
    }

    /// Returns the Redis connection URI.
    pub fn uri(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }

    /// Returns the keyspace notification pattern covering every key of `table`.
    pub fn keyspace_pattern(&self, table: &str) -> String {
        format!("__keyspace@{}__:{}{}*", self.db, table, TABLE_KEY_SEPARATOR)
    }
}

/// A CONFIG_DB connection.
pub struct RedisDatabase {
    config: RedisConfig,
    client: redis::Client,
    connection: ConnectionManager,
}

impl RedisDatabase {
    /// Opens a connection to the configured database.
    pub async fn new(config: RedisConfig) -> CfgMgrResult<Self> {
        let uri = config.uri();

        let client = redis::Client::open(uri.clone())
            .map_err(|e| CfgMgrError::database("open", format!("{}: {}", uri, e)))?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| CfgMgrError::database("connect", e.to_string()))?;

        info!(host = %config.host, port = config.port, db = config.db, "Connected to Redis");

        Ok(Self {
            config,
            client,
            connection,
        })
    }

    /// Reads every entry of a table.
    ///
    /// Entries are returned sorted by key so callers get a stable order
    /// regardless of Redis hash-slot iteration.
    pub async fn read_table(&mut self, table_name: &str) -> CfgMgrResult<Vec<(String, FieldValues)>> {
        let pattern = format!("{}{}*", table_name, TABLE_KEY_SEPARATOR);

        let mut keys: Vec<String> = self
            .connection
            .keys(&pattern)
            .await
            .map_err(|e| CfgMgrError::database("keys", e.to_string()))?;
        keys.sort();

        let mut entries = Vec::with_capacity(keys.len());
        for redis_key in keys {
            let fvs: HashMap<String, String> = self
                .connection
                .hgetall(&redis_key)
                .await
                .map_err(|e| CfgMgrError::database("hgetall", e.to_string()))?;

            let Some(key) = split_table_key(&redis_key, table_name) else {
                continue;
            };

            let mut fvs: FieldValues = fvs.into_iter().collect();
            fvs.sort();
            entries.push((key.to_string(), fvs));
        }

        debug!(table = table_name, count = entries.len(), "Read table");
        Ok(entries)
    }

    /// Returns a handle that opens keyspace subscriptions for `table_name`.
    pub fn keyspace_subscriber(&self, table_name: &str) -> KeyspaceSubscriber {
        KeyspaceSubscriber {
            client: self.client.clone(),
            pattern: self.config.keyspace_pattern(table_name),
        }
    }
}

/// Opens keyspace notification subscriptions for one table.
///
/// Each call to [`subscribe`](Self::subscribe) uses a fresh pubsub
/// connection, so a subscription lost with the server can be reopened.
#[derive(Clone)]
pub struct KeyspaceSubscriber {
    client: redis::Client,
    pattern: String,
}

impl KeyspaceSubscriber {
    /// Returns the subscribed channel pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Subscribes to the table's keyspace notifications.
    ///
    /// The stream yields the notification channel name for every
    /// modification of a key of the table and ends when the subscription
    /// connection drops.
    pub async fn subscribe(&self) -> CfgMgrResult<impl Stream<Item = String> + Send + 'static> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CfgMgrError::database("pubsub", e.to_string()))?;

        pubsub
            .psubscribe(&self.pattern)
            .await
            .map_err(|e| CfgMgrError::database("psubscribe", e.to_string()))?;

        info!(pattern = %self.pattern, "Subscribed to keyspace notifications");

        Ok(pubsub
            .into_on_message()
            .map(|msg| msg.get_channel_name().to_string()))
    }
}

/// Splits `<TABLE>|<key>` into the key part, if it belongs to `table_name`.
pub fn split_table_key<'a>(redis_key: &'a str, table_name: &str) -> Option<&'a str> {
    redis_key
        .split_once(TABLE_KEY_SEPARATOR)
        .filter(|(table, _)| *table == table_name)
        .map(|(_, key)| key)
}
