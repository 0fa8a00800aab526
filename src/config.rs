use crate::error::{Error, Result};
use crate::storage::{KvStore, WORKER_CONFIG_KEY};
use serde::{Deserialize, Serialize};
use url::Url;

/// Remote backup settings, stored under `workerConfig`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub enable_auto_backup: bool,
}

impl WorkerConfig {
    pub fn new(url: &str, token: &str, enable_auto_backup: bool) -> Self {
        Self {
            url: url.trim().to_string(),
            token: token.trim().to_string(),
            enable_auto_backup,
        }
    }

    /// Sync may only be attempted when both are set.
    pub fn is_complete(&self) -> bool {
        !self.url.is_empty() && !self.token.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.is_complete() {
            return Err(Error::Config(
                "worker URL and API token are both required".to_string(),
            ));
        }
        Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("worker URL is invalid: {e}")))?;
        Ok(())
    }

    /// `<url>/<name>` with exactly one separator in between.
    pub fn endpoint(&self, name: &str) -> String {
        let base = self.url.trim_end_matches('/');
        format!("{base}/{}", name.trim_start_matches('/'))
    }

    pub fn masked_token(&self) -> String {
        let n = self.token.chars().count();
        if n <= 4 {
            return "*".repeat(n);
        }
        let tail: String = self.token.chars().skip(n - 4).collect();
        format!("{}{tail}", "*".repeat(n - 4))
    }
}

pub fn load_worker_config<S: KvStore + ?Sized>(kv: &S) -> Result<Option<WorkerConfig>> {
    match kv.get(WORKER_CONFIG_KEY)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// Load and require a complete config.
pub fn require_worker_config<S: KvStore + ?Sized>(kv: &S) -> Result<WorkerConfig> {
    let cfg = load_worker_config(kv)?
        .ok_or_else(|| Error::Config("worker config is not saved".to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Validate and overwrite the stored config as a whole.
pub fn save_worker_config<S: KvStore + ?Sized>(kv: &S, cfg: &WorkerConfig) -> Result<()> {
    cfg.validate()?;
    kv.set(WORKER_CONFIG_KEY, serde_json::to_value(cfg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn endpoint_has_single_separator() {
        let a = WorkerConfig::new("https://x.com", "t", false);
        let b = WorkerConfig::new("https://x.com/", "t", false);
        assert_eq!(a.endpoint("backup"), "https://x.com/backup");
        assert_eq!(b.endpoint("backup"), "https://x.com/backup");
        assert_eq!(b.endpoint("restore"), a.endpoint("restore"));
        assert_eq!(
            WorkerConfig::new("https://w.dev/api//", "t", false).endpoint("restore"),
            "https://w.dev/api/restore"
        );
    }

    #[test]
    fn stored_with_camel_case_keys() {
        let kv = MemoryStore::new();
        save_worker_config(&kv, &WorkerConfig::new(" https://x.com ", " tok ", true)).unwrap();
        assert_eq!(
            kv.get(WORKER_CONFIG_KEY).unwrap(),
            Some(json!({"url": "https://x.com", "token": "tok", "enableAutoBackup": true}))
        );
    }

    #[test]
    fn save_requires_url_and_token() {
        let kv = MemoryStore::new();
        let err = save_worker_config(&kv, &WorkerConfig::new("https://x.com", "", false));
        assert!(matches!(err, Err(Error::Config(_))));
        assert!(load_worker_config(&kv).unwrap().is_none());
    }

    #[test]
    fn save_rejects_relative_url() {
        let kv = MemoryStore::new();
        let err = save_worker_config(&kv, &WorkerConfig::new("x.com/api", "tok", false));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn partial_stored_config_is_incomplete() {
        let kv = MemoryStore::new();
        kv.set(WORKER_CONFIG_KEY, json!({"url": "https://x.com"})).unwrap();
        let cfg = load_worker_config(&kv).unwrap().unwrap();
        assert!(!cfg.is_complete());
        assert!(!cfg.enable_auto_backup);
        assert!(matches!(require_worker_config(&kv), Err(Error::Config(_))));
    }

    #[test]
    fn stored_relative_url_is_rejected() {
        let kv = MemoryStore::new();
        kv.set(WORKER_CONFIG_KEY, json!({"url": "x.com/api", "token": "tok"})).unwrap();
        assert!(matches!(require_worker_config(&kv), Err(Error::Config(_))));
    }

    #[test]
    fn token_is_masked() {
        assert_eq!(WorkerConfig::new("u", "abcdefgh", false).masked_token(), "****efgh");
        assert_eq!(WorkerConfig::new("u", "abc", false).masked_token(), "***");
    }
}
