use crate::error::{Error, Result};
use crate::otp;
use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub secret: String,
    pub domain: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl Entry {
    /// `host` is the current page host; subdomains of `domain` match too.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim().to_lowercase();
        let domain = self.domain.to_lowercase();
        if host.is_empty() || domain.is_empty() {
            return true;
        }
        host == domain || host.ends_with(&format!(".{domain}"))
    }
}

/// Add/edit form input. `id` is set when editing an existing entry.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub id: Option<String>,
    pub secret: String,
    pub domain: String,
    pub username: Option<String>,
}

/// Cleaned-up draft fields, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub id: Option<String>,
    pub secret: String,
    pub domain: String,
    pub username: Option<String>,
}

impl EntryDraft {
    pub fn validate(&self) -> Result<ValidDraft> {
        let secret = self.secret.trim().to_string();
        let domain = self.domain.trim().to_lowercase();
        if secret.is_empty() || domain.is_empty() {
            return Err(Error::Validation(
                "Secret and Domain are required!".to_string(),
            ));
        }
        otp::decode_secret(&secret).map_err(|_| {
            Error::Validation("Invalid Secret format. It should be a Base32 string.".to_string())
        })?;

        let username = self
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        let id = self
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(ValidDraft {
            id,
            secret,
            domain,
            username,
        })
    }
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Millisecond timestamp followed by a 5-char base-36 suffix.
pub fn new_entry_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..5)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{millis}{suffix}")
}

/// Entries visible for `host`; an empty host shows everything.
pub fn filter_for_host<'a>(entries: &'a [Entry], host: &str) -> Vec<&'a Entry> {
    entries.iter().filter(|e| e.matches_host(host)).collect()
}

/// Accept either a full page URL or a bare hostname.
pub fn host_from_input(input: &str) -> String {
    let input = input.trim();
    match Url::parse(input) {
        Ok(url) if url.host_str().is_some() => {
            url.host_str().unwrap_or_default().to_lowercase()
        }
        _ => input.to_lowercase(),
    }
}
