use crate::config::load_worker_config;
use crate::entry::Entry;
use crate::error::Result;
use crate::storage::KvStore;
use crate::store::StoreEvent;
use crate::sync::{PushOutcome, SyncClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Background task that mirrors every store change to the remote endpoint
/// when auto-backup is on. Failures are logged and dropped, never retried.
pub struct AutoBackup {
    handle: JoinHandle<()>,
}

impl AutoBackup {
    /// Returns the sender to hand to `EntryStore::with_notifier`.
    pub fn spawn<S: KvStore + 'static>(kv: Arc<S>) -> (UnboundedSender<StoreEvent>, Self) {
        Self::spawn_with_timeout(kv, crate::sync::DEFAULT_TIMEOUT)
    }

    pub fn spawn_with_timeout<S: KvStore + 'static>(
        kv: Arc<S>,
        timeout: Duration,
    ) -> (UnboundedSender<StoreEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(kv, rx, timeout));
        (tx, Self { handle })
    }

    /// Wait for queued pushes to finish. Every sender must be dropped first.
    pub async fn drain(self) {
        if let Err(e) = self.handle.await {
            warn!("auto-backup task ended abnormally: {e}");
        }
    }
}

async fn run<S: KvStore>(kv: Arc<S>, mut rx: UnboundedReceiver<StoreEvent>, timeout: Duration) {
    while let Some(event) = rx.recv().await {
        let StoreEvent::Changed { entries } = event;
        match backup_once(kv.as_ref(), &entries, timeout).await {
            Ok(Some(outcome)) => debug!(status = outcome.status, "auto-backup done"),
            Ok(None) => {}
            Err(e) => warn!("auto-backup failed: {e}"),
        }
    }
    debug!("auto-backup task stopped");
}

/// `Ok(None)` when auto-backup is off or the config is incomplete.
async fn backup_once<S: KvStore>(
    kv: &S,
    entries: &[Entry],
    timeout: Duration,
) -> Result<Option<PushOutcome>> {
    let Some(cfg) = load_worker_config(kv)? else {
        return Ok(None);
    };
    if !cfg.enable_auto_backup || !cfg.is_complete() {
        return Ok(None);
    }
    let client = SyncClient::with_timeout(cfg, timeout)?;
    client.push(entries).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WorkerConfig, save_worker_config};
    use crate::entry::EntryDraft;
    use crate::storage::MemoryStore;
    use crate::store::EntryStore;

    #[tokio::test]
    async fn disabled_auto_backup_pushes_nothing() {
        let kv = Arc::new(MemoryStore::new());
        // unroutable: a push attempt would error, not hang
        save_worker_config(kv.as_ref(), &WorkerConfig::new("http://127.0.0.1:9", "tok", false))
            .unwrap();

        let outcome = backup_once(kv.as_ref(), &[], Duration::from_secs(1)).await;
        assert!(matches!(outcome, Ok(None)));
    }

    #[tokio::test]
    async fn missing_config_is_skipped() {
        let kv = MemoryStore::new();
        assert!(matches!(
            backup_once(&kv, &[], Duration::from_secs(1)).await,
            Ok(None)
        ));
    }

    #[tokio::test]
    async fn push_failure_is_swallowed() {
        let kv = Arc::new(MemoryStore::new());
        save_worker_config(kv.as_ref(), &WorkerConfig::new("http://127.0.0.1:9", "tok", true))
            .unwrap();

        let (tx, hook) = AutoBackup::spawn_with_timeout(kv.clone(), Duration::from_secs(2));
        let store = EntryStore::new(kv.clone()).with_notifier(tx);
        store
            .upsert(&EntryDraft {
                secret: "JBSWY3DPEHPK3PXP".to_string(),
                domain: "x.com".to_string(),
                ..Default::default()
            })
            .unwrap();
        drop(store);

        hook.drain().await;
        assert_eq!(store_len(&kv), 1);
    }

    fn store_len(kv: &Arc<MemoryStore>) -> usize {
        EntryStore::new(kv.clone()).list().unwrap().len()
    }
}
