use crate::entry::{Entry, EntryDraft, new_entry_id};
use crate::error::Result;
use crate::storage::{ENTRIES_KEY, KvStore};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Published after every successful write, carrying the stored collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Changed { entries: Vec<Entry> },
}

/// CRUD over the `entries` key. Each mutation is one whole-collection write.
pub struct EntryStore<S: KvStore> {
    kv: Arc<S>,
    notifier: Option<UnboundedSender<StoreEvent>>,
}

impl<S: KvStore> EntryStore<S> {
    pub fn new(kv: Arc<S>) -> Self {
        Self { kv, notifier: None }
    }

    pub fn with_notifier(mut self, tx: UnboundedSender<StoreEvent>) -> Self {
        self.notifier = Some(tx);
        self
    }

    pub fn list(&self) -> Result<Vec<Entry>> {
        match self.kv.get(ENTRIES_KEY)? {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<Entry>> {
        Ok(self.list()?.into_iter().find(|e| e.id == id))
    }

    /// Replace the fields of the entry with `draft.id`, or append a new entry
    /// under a fresh id.
    pub fn upsert(&self, draft: &EntryDraft) -> Result<Entry> {
        let valid = draft.validate()?;
        let mut entries = self.list()?;

        let existing = valid
            .id
            .as_deref()
            .and_then(|id| entries.iter().position(|e| e.id == id));

        let saved = match existing {
            Some(idx) => {
                let entry = &mut entries[idx];
                entry.secret = valid.secret;
                entry.domain = valid.domain;
                entry.username = valid.username;
                entry.clone()
            }
            None => {
                let mut id = new_entry_id();
                while entries.iter().any(|e| e.id == id) {
                    id = new_entry_id();
                }
                let entry = Entry {
                    id,
                    secret: valid.secret,
                    domain: valid.domain,
                    username: valid.username,
                };
                entries.push(entry.clone());
                entry
            }
        };

        self.write(entries)?;
        debug!(id = %saved.id, domain = %saved.domain, "entry saved");
        Ok(saved)
    }

    /// Returns whether an entry was removed. Unknown ids leave storage alone.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let entries = self.list()?;
        let before = entries.len();
        let kept: Vec<Entry> = entries.into_iter().filter(|e| e.id != id).collect();
        if kept.len() == before {
            debug!(id, "remove: no such entry");
            return Ok(false);
        }
        self.write(kept)?;
        debug!(id, "entry removed");
        Ok(true)
    }

    /// Overwrite the collection. Input must already be validated.
    pub fn replace_all(&self, entries: Vec<Entry>) -> Result<()> {
        debug!(count = entries.len(), "replacing all entries");
        self.write(entries)
    }

    fn write(&self, entries: Vec<Entry>) -> Result<()> {
        self.kv.set(ENTRIES_KEY, serde_json::to_value(&entries)?)?;
        if let Some(tx) = &self.notifier {
            // receiver gone means nobody is listening for backups
            let _ = tx.send(StoreEvent::Changed { entries });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    const SECRET: &str = "JBSWY3DPEHPK3PXP";

    fn draft(domain: &str) -> EntryDraft {
        EntryDraft {
            id: None,
            secret: SECRET.to_string(),
            domain: domain.to_string(),
            username: Some("me".to_string()),
        }
    }

    fn store() -> EntryStore<MemoryStore> {
        EntryStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn empty_store_lists_nothing() {
        assert!(store().list().unwrap().is_empty());
    }

    #[test]
    fn upsert_appends_with_unique_ids() {
        let store = store();
        for i in 0..20 {
            store.upsert(&draft(&format!("site{i}.com"))).unwrap();
        }
        let entries = store.list().unwrap();
        let ids: HashSet<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(entries.len(), 20);
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn upsert_with_known_id_edits_in_place() {
        let store = store();
        let first = store.upsert(&draft("a.com")).unwrap();
        store.upsert(&draft("b.com")).unwrap();

        let edited = store
            .upsert(&EntryDraft {
                id: Some(first.id.clone()),
                secret: SECRET.to_string(),
                domain: "C.com".to_string(),
                username: None,
            })
            .unwrap();

        assert_eq!(edited.id, first.id);
        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].domain, "c.com");
        assert_eq!(entries[0].username, None);
    }

    #[test]
    fn upsert_with_unknown_id_appends_under_fresh_id() {
        let store = store();
        let saved = store
            .upsert(&EntryDraft {
                id: Some("ghost".to_string()),
                ..draft("a.com")
            })
            .unwrap();
        assert_ne!(saved.id, "ghost");
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn invalid_draft_is_not_stored() {
        let store = store();
        let err = store.upsert(&draft("")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn remove_unknown_id_leaves_collection_unchanged() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = store().with_notifier(tx);
        store.upsert(&draft("a.com")).unwrap();
        let before = store.list().unwrap();
        let _ = rx.try_recv();

        assert!(!store.remove("missing").unwrap());
        assert_eq!(store.list().unwrap(), before);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn remove_drops_entry() {
        let store = store();
        let a = store.upsert(&draft("a.com")).unwrap();
        let b = store.upsert(&draft("b.com")).unwrap();
        assert!(store.remove(&a.id).unwrap());
        assert_eq!(store.list().unwrap(), vec![b]);
    }

    #[test]
    fn replace_all_overwrites() {
        let store = store();
        store.upsert(&draft("a.com")).unwrap();
        let replacement = vec![Entry {
            id: "x".to_string(),
            secret: SECRET.to_string(),
            domain: "z.com".to_string(),
            username: None,
        }];
        store.replace_all(replacement.clone()).unwrap();
        assert_eq!(store.list().unwrap(), replacement);
        assert_eq!(store.get("x").unwrap(), Some(replacement[0].clone()));
    }

    #[test]
    fn mutations_publish_snapshot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = store().with_notifier(tx);
        let saved = store.upsert(&draft("a.com")).unwrap();

        let StoreEvent::Changed { entries } = rx.try_recv().unwrap();
        assert_eq!(entries, vec![saved.clone()]);

        store.remove(&saved.id).unwrap();
        let StoreEvent::Changed { entries } = rx.try_recv().unwrap();
        assert!(entries.is_empty());
    }
}
