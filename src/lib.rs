//! TOTP entry store with file backups, autofill and remote backup sync.

pub mod autofill;
pub mod backup;
pub mod config;
pub mod entry;
pub mod error;
pub mod hook;
pub mod otp;
pub mod storage;
pub mod store;
pub mod sync;

pub use entry::{Entry, EntryDraft};
pub use error::{Error, Result};
