use crate::entry::{Entry, new_entry_id};
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Pretty-printed JSON array, secrets included.
pub fn export(entries: &[Entry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// Parse and validate a backup document. Entries without an id get a fresh
/// one. Storage is not touched.
pub fn import(raw: &str) -> Result<Vec<Entry>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::Format(format!("not valid JSON: {e}")))?;
    entries_from_value(value)
}

/// Validate an already-parsed document, shared with remote restore.
pub fn entries_from_value(value: Value) -> Result<Vec<Entry>> {
    let Value::Array(items) = value else {
        return Err(Error::Format(
            "Invalid backup file format: Not an array.".to_string(),
        ));
    };

    let entries = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| entry_from_value(idx, item))
        .collect::<Result<Vec<_>>>()?;

    // later repeats of an explicit id are treated like a missing id
    let mut taken: HashSet<String> = entries.iter().filter_map(|(_, id)| id.clone()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    Ok(entries
        .into_iter()
        .map(|(mut entry, id)| {
            entry.id = match id.filter(|id| seen.insert(id.clone())) {
                Some(id) => id,
                None => {
                    let mut fresh = new_entry_id();
                    while taken.contains(&fresh) {
                        fresh = new_entry_id();
                    }
                    taken.insert(fresh.clone());
                    seen.insert(fresh.clone());
                    fresh
                }
            };
            entry
        })
        .collect())
}

fn entry_from_value(idx: usize, item: Value) -> Result<(Entry, Option<String>)> {
    let invalid = |what: &str| Error::Format(format!("Invalid entry format at index {idx}: {what}"));

    let Value::Object(obj) = item else {
        return Err(invalid("not an object"));
    };

    let secret = match obj.get("secret") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => return Err(invalid("'secret' must be a non-empty string")),
    };
    let domain = match obj.get("domain") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_lowercase(),
        _ => return Err(invalid("'domain' must be a non-empty string")),
    };
    let username = match obj.get("username") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(invalid("'username' must be a string or null")),
    };
    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => return Err(invalid("'id' must be a string")),
    };

    let entry = Entry {
        id: String::new(),
        secret,
        domain,
        username,
    };
    Ok((entry, id))
}

/// `totp_backup_2024-05-01.json`
pub fn backup_file_name(date: Date) -> String {
    let fmt = format_description!("[year]-[month]-[day]");
    let day = date
        .format(&fmt)
        .unwrap_or_else(|_| date.to_string());
    format!("totp_backup_{day}.json")
}

pub fn default_backup_path() -> PathBuf {
    PathBuf::from(backup_file_name(OffsetDateTime::now_utc().date()))
}

pub fn write_backup_file(path: &Path, entries: &[Entry]) -> Result<()> {
    std::fs::write(path, export(entries)?)?;
    Ok(())
}

pub fn read_backup_file(path: &Path) -> Result<Vec<Entry>> {
    let raw = std::fs::read_to_string(path)?;
    import(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn sample() -> Vec<Entry> {
        vec![
            Entry {
                id: "1714550400000abcde".to_string(),
                secret: "JBSWY3DPEHPK3PXP".to_string(),
                domain: "github.com".to_string(),
                username: Some("octo".to_string()),
            },
            Entry {
                id: "1714550400001fghij".to_string(),
                secret: "GEZDGNBVGY3TQOJQ".to_string(),
                domain: "google.com".to_string(),
                username: None,
            },
        ]
    }

    #[test]
    fn export_then_import_is_identity() {
        let entries = sample();
        let doc = export(&entries).unwrap();
        assert!(doc.starts_with("[\n"));
        assert_eq!(import(&doc).unwrap(), entries);
    }

    #[test]
    fn object_document_is_rejected() {
        assert!(matches!(import(r#"{"not":"an array"}"#), Err(Error::Format(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(import("not json"), Err(Error::Format(_))));
    }

    #[test]
    fn missing_id_is_assigned() {
        let entries = import(r#"[{"secret":"AAAA","domain":"x.com"}]"#).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].id.is_empty());
        assert_eq!(entries[0].username, None);
    }

    #[test]
    fn assigned_ids_are_unique() {
        let doc = r#"[
            {"secret":"AAAA","domain":"a.com"},
            {"secret":"AAAA","domain":"b.com","id":""},
            {"secret":"AAAA","domain":"c.com","id":null}
        ]"#;
        let entries = import(doc).unwrap();
        let ids: HashSet<_> = entries.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn numeric_id_is_kept() {
        let entries = import(r#"[{"id":1714550400000,"secret":"AAAA","domain":"x.com"}]"#).unwrap();
        assert_eq!(entries[0].id, "1714550400000");
    }

    #[test]
    fn non_string_secret_or_domain_is_rejected() {
        assert!(matches!(
            import(r#"[{"secret":42,"domain":"x.com"}]"#),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            import(r#"[{"secret":"AAAA"}]"#),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn username_type_is_checked_even_with_valid_fields() {
        assert!(matches!(
            import(r#"[{"secret":"AAAA","domain":"x.com","username":7}]"#),
            Err(Error::Format(_))
        ));
        assert!(import(r#"[{"secret":"AAAA","domain":"x.com","username":null}]"#).is_ok());
    }

    #[test]
    fn domain_is_lowercased() {
        let entries = import(r#"[{"secret":"AAAA","domain":"X.COM"}]"#).unwrap();
        assert_eq!(entries[0].domain, "x.com");
    }

    #[test]
    fn domain_is_trimmed() {
        let entries = import(r#"[{"secret":"AAAA","domain":"  Mail.X.com \n"}]"#).unwrap();
        assert_eq!(entries[0].domain, "mail.x.com");
    }

    #[test]
    fn repeated_id_gets_fresh_one() {
        let doc = r#"[
            {"id":"a","secret":"AAAA","domain":"one.com"},
            {"id":"a","secret":"BBBB","domain":"two.com"},
            {"secret":"CCCC","domain":"three.com"}
        ]"#;
        let entries = import(doc).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, "a");
        assert_eq!(entries[0].domain, "one.com");
        assert_ne!(entries[1].id, "a");
        assert_eq!(entries[1].domain, "two.com");
        let ids: HashSet<_> = entries.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn repeated_id_is_stored_once() {
        use crate::storage::MemoryStore;
        use crate::store::EntryStore;
        use std::sync::Arc;

        let doc = r#"[
            {"id":"a","secret":"AAAA","domain":"one.com"},
            {"id":"a","secret":"BBBB","domain":"two.com"}
        ]"#;
        let store = EntryStore::new(Arc::new(MemoryStore::new()));
        store.replace_all(import(doc).unwrap()).unwrap();

        assert!(store.remove("a").unwrap());
        let left = store.list().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].domain, "two.com");
    }

    #[test]
    fn file_name_embeds_iso_date() {
        let date = Date::from_calendar_date(2024, Month::May, 1).unwrap();
        assert_eq!(backup_file_name(date), "totp_backup_2024-05-01.json");
    }

    #[test]
    fn backup_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        write_backup_file(&path, &sample()).unwrap();
        assert_eq!(read_backup_file(&path).unwrap(), sample());
    }
}
