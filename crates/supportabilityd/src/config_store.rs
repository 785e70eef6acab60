//! Config store access for the remote syslog table.
//!
//! A store hands out ordered [`RemoteDestination`] rows together with a
//! change sequence number. The number only ever grows; the dispatch loop
//! compares it with the last value it reconciled to decide whether the
//! table needs another pass.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use sonic_cfgmgr_common::{FieldValues, KeyspaceSubscriber, RedisConfig, RedisDatabase};

use crate::constants::{RESUBSCRIBE_INITIAL_DELAY_MS, RESUBSCRIBE_MAX_DELAY_MS};
use crate::error::StoreError;
use crate::types::RemoteDestination;
use crate::CFG_SYSLOG_REMOTE_TABLE_NAME;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Receiver that observes every change sequence number
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Current change sequence number
    fn change_seqno(&self) -> u64;

    /// Current table contents, in table order
    async fn read_remote_destinations(&self) -> Result<Vec<RemoteDestination>, StoreError>;
}

/// Decodes raw table rows, skipping rows that fail validation
pub fn decode_rows(rows: &[(String, FieldValues)]) -> Vec<RemoteDestination> {
    rows.iter()
        .filter_map(|(key, values)| match RemoteDestination::from_field_values(key, values) {
            Ok(dest) => Some(dest),
            Err(e) => {
                warn!("Skipping {}|{}: {}", CFG_SYSLOG_REMOTE_TABLE_NAME, key, e);
                None
            }
        })
        .collect()
}

/// In-process store; rows keep their insertion order
#[derive(Debug)]
pub struct MemoryConfigStore {
    rows: Mutex<Vec<(String, FieldValues)>>,
    seqno: watch::Sender<u64>,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        let (seqno, _) = watch::channel(0);
        Self {
            rows: Mutex::new(Vec::new()),
            seqno,
        }
    }

    /// Inserts or replaces a row; a replaced row keeps its position
    pub fn set(&self, key: impl Into<String>, values: FieldValues) {
        let key = key.into();
        {
            let mut rows = self.rows.lock();
            match rows.iter_mut().find(|(k, _)| *k == key) {
                Some(row) => row.1 = values,
                None => rows.push((key, values)),
            }
        }
        self.bump();
    }

    /// Removes a row; returns whether it existed
    pub fn del(&self, key: &str) -> bool {
        let removed = {
            let mut rows = self.rows.lock();
            let before = rows.len();
            rows.retain(|(k, _)| k != key);
            rows.len() != before
        };
        if removed {
            self.bump();
        }
        removed
    }

    /// Replaces the whole table in one change
    pub fn replace_all(&self, rows: Vec<(String, FieldValues)>) {
        *self.rows.lock() = rows;
        self.bump();
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    fn bump(&self) {
        self.seqno.send_modify(|seq| *seq += 1);
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    fn subscribe(&self) -> watch::Receiver<u64> {
        self.seqno.subscribe()
    }

    fn change_seqno(&self) -> u64 {
        *self.seqno.borrow()
    }

    async fn read_remote_destinations(&self) -> Result<Vec<RemoteDestination>, StoreError> {
        let rows = self.rows.lock().clone();
        Ok(decode_rows(&rows))
    }
}

/// Source of table change notifications that can be reopened after it ends
#[async_trait]
pub trait NotificationSource: Send + Sync + 'static {
    async fn subscribe(&self) -> Result<BoxStream<'static, String>, StoreError>;
}

#[async_trait]
impl NotificationSource for KeyspaceSubscriber {
    async fn subscribe(&self) -> Result<BoxStream<'static, String>, StoreError> {
        Ok(KeyspaceSubscriber::subscribe(self).await?.boxed())
    }
}

/// Delay between resubscription attempts, doubling up to `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(RESUBSCRIBE_INITIAL_DELAY_MS),
            max: Duration::from_millis(RESUBSCRIBE_MAX_DELAY_MS),
        }
    }
}

/// Bumps `seqno` for every notification, reopening the subscription
/// whenever the stream ends.
///
/// Changes made while unsubscribed are never notified, so every successful
/// resubscription also bumps the sequence number to force a full re-read.
pub async fn follow_notifications<S: NotificationSource>(
    source: S,
    mut notifications: BoxStream<'static, String>,
    seqno: Arc<watch::Sender<u64>>,
    backoff: Backoff,
) {
    loop {
        while let Some(channel) = notifications.next().await {
            debug!(channel = %channel, "Keyspace notification");
            seqno.send_modify(|seq| *seq += 1);
        }
        warn!(
            "Keyspace notification stream for {} ended, resubscribing",
            CFG_SYSLOG_REMOTE_TABLE_NAME
        );

        notifications = resubscribe(&source, backoff).await;
        seqno.send_modify(|seq| *seq += 1);
        info!("Resubscribed to {} notifications", CFG_SYSLOG_REMOTE_TABLE_NAME);
    }
}

async fn resubscribe<S: NotificationSource>(
    source: &S,
    backoff: Backoff,
) -> BoxStream<'static, String> {
    let mut delay = backoff.initial;
    loop {
        sleep(delay).await;
        match source.subscribe().await {
            Ok(notifications) => return notifications,
            Err(e) => {
                warn!("Resubscribe failed, retrying in {:?}: {}", delay, e);
                delay = (delay * 2).min(backoff.max);
            }
        }
    }
}

/// CONFIG_DB-backed store.
///
/// A background task follows keyspace notifications for the table and
/// bumps the sequence number on each one. Rows come back sorted by key.
pub struct RedisConfigStore {
    db: AsyncMutex<RedisDatabase>,
    seqno: Arc<watch::Sender<u64>>,
    listener: JoinHandle<()>,
}

impl RedisConfigStore {
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let db = RedisDatabase::new(config).await?;
        let subscriber = db.keyspace_subscriber(CFG_SYSLOG_REMOTE_TABLE_NAME);
        let notifications = NotificationSource::subscribe(&subscriber).await?;

        let (seqno, _) = watch::channel(0);
        let seqno = Arc::new(seqno);

        let listener = tokio::spawn(follow_notifications(
            subscriber,
            notifications,
            Arc::clone(&seqno),
            Backoff::default(),
        ));

        info!("Watching {} in CONFIG_DB", CFG_SYSLOG_REMOTE_TABLE_NAME);
        Ok(Self {
            db: AsyncMutex::new(db),
            seqno,
            listener,
        })
    }
}

impl Drop for RedisConfigStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl ConfigStore for RedisConfigStore {
    fn subscribe(&self) -> watch::Receiver<u64> {
        self.seqno.subscribe()
    }

    fn change_seqno(&self) -> u64 {
        *self.seqno.borrow()
    }

    async fn read_remote_destinations(&self) -> Result<Vec<RemoteDestination>, StoreError> {
        let rows = self
            .db
            .lock()
            .await
            .read_table(CFG_SYSLOG_REMOTE_TABLE_NAME)
            .await?;
        Ok(decode_rows(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::types::Transport;
    use futures::stream;
    use sonic_cfgmgr_common::{field_values, CfgMgrError};
    use std::collections::VecDeque;
    use tokio::time::timeout;

    /// Hands out queued subscriptions; `None` fails the attempt and an
    /// empty queue yields a stream that never ends
    #[derive(Clone, Default)]
    struct ScriptedSource {
        queue: Arc<Mutex<VecDeque<Option<Vec<String>>>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Option<Vec<String>>>) -> Self {
            Self {
                queue: Arc::new(Mutex::new(script.into())),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl NotificationSource for ScriptedSource {
        async fn subscribe(&self) -> Result<BoxStream<'static, String>, StoreError> {
            *self.calls.lock() += 1;
            match self.queue.lock().pop_front() {
                Some(Some(channels)) => Ok(stream::iter(channels).boxed()),
                Some(None) => Err(CfgMgrError::database("psubscribe", "connection refused").into()),
                None => Ok(stream::pending().boxed()),
            }
        }
    }

    #[tokio::test]
    async fn test_memory_store_keeps_insertion_order() {
        let store = MemoryConfigStore::new();
        store.set("10.0.0.9", field_values![fields::REMOTE_HOST => "10.0.0.9"]);
        store.set("10.0.0.1", field_values![fields::REMOTE_HOST => "10.0.0.1"]);

        let rows = store.read_remote_destinations().await.unwrap();
        let hosts: Vec<_> = rows.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.9", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_memory_store_replace_keeps_position() {
        let store = MemoryConfigStore::new();
        store.set("a", field_values![fields::REMOTE_HOST => "10.0.0.1"]);
        store.set("b", field_values![fields::REMOTE_HOST => "10.0.0.2"]);
        store.set(
            "a",
            field_values![fields::REMOTE_HOST => "10.0.0.1", fields::TRANSPORT => "tcp"],
        );

        let rows = store.read_remote_destinations().await.unwrap();
        assert_eq!(rows[0].transport, Transport::Tcp);
        assert_eq!(rows[1].host, "10.0.0.2");
    }

    #[test]
    fn test_seqno_bumps_on_change() {
        let store = MemoryConfigStore::new();
        let rx = store.subscribe();
        assert_eq!(store.change_seqno(), 0);

        store.set("a", field_values![fields::REMOTE_HOST => "10.0.0.1"]);
        assert_eq!(store.change_seqno(), 1);
        assert!(rx.has_changed().unwrap());

        assert!(!store.del("missing"));
        assert_eq!(store.change_seqno(), 1);
        assert!(store.del("a"));
        assert_eq!(store.change_seqno(), 2);
    }

    #[tokio::test]
    async fn test_invalid_rows_skipped() {
        let store = MemoryConfigStore::new();
        store.set("good", field_values![fields::REMOTE_HOST => "10.0.0.1"]);
        store.set(
            "bad",
            field_values![fields::REMOTE_HOST => "10.0.0.2", fields::PORT_NUMBER => "0"],
        );

        let rows = store.read_remote_destinations().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].host, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_row_with_multiline_host_is_skipped() {
        let store = MemoryConfigStore::new();
        store.set("10.0.0.8", field_values![fields::REMOTE_HOST => "10.0.0.8"]);
        store.set(
            "10.0.0.9",
            field_values![fields::REMOTE_HOST => "10.0.0.9:514\n*.* @evil.example"],
        );

        let rows = store.read_remote_destinations().await.unwrap();
        assert_eq!(crate::render_config(&rows), "*.debug @10.0.0.8:514\n");
    }

    #[tokio::test]
    async fn test_ended_notification_stream_is_resubscribed() {
        let source = ScriptedSource::new(vec![None, Some(vec!["ch".to_string()])]);
        let initial = stream::iter(vec!["ch".to_string()]).boxed();
        let (seqno, mut rx) = watch::channel(0);
        let backoff = Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(4),
        };

        let task = tokio::spawn(follow_notifications(
            source.clone(),
            initial,
            Arc::new(seqno),
            backoff,
        ));

        // One bump per notification plus one per successful resubscribe
        timeout(Duration::from_secs(5), rx.wait_for(|seq| *seq >= 4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source.calls(), 3);

        task.abort();
    }
}
