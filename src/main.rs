mod prompt;

use crate::prompt::{confirm, prompt_hidden};
use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use totp_sync::autofill::{AutofillDispatcher, HeuristicMatcher, Page};
use totp_sync::backup::{default_backup_path, read_backup_file, write_backup_file};
use totp_sync::config::{WorkerConfig, load_worker_config, require_worker_config, save_worker_config};
use totp_sync::entry::{filter_for_host, host_from_input};
use totp_sync::hook::AutoBackup;
use totp_sync::otp::{generate_current, parse_secret_input};
use totp_sync::storage::{FileStore, default_store_path};
use totp_sync::store::EntryStore;
use totp_sync::sync::SyncClient;
use totp_sync::{Entry, EntryDraft};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

type Store = EntryStore<FileStore>;

#[derive(Parser, Debug)]
#[command(
    name = "totp-sync",
    version,
    about = "TOTP codes with autofill and remote backup"
)]
struct Cli {
    /// Storage file (defaults to the user data dir)
    #[arg(long, global = true, env = "TOTP_SYNC_STORE")]
    store: Option<PathBuf>,

    /// Debug logging (TOTP_SYNC_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List entries with their current codes
    ///
    /// Examples:
    ///   totp-sync list
    ///   totp-sync list --host https://mail.google.com/
    List {
        /// Page URL or hostname; shows matching entries only
        #[arg(long)]
        host: Option<String>,
    },

    /// Add a new entry
    Add {
        /// Site domain, e.g. github.com
        domain: String,
        /// Base32 secret or otpauth:// URL (prompted when omitted)
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },

    /// Change an entry's secret, domain or username
    Edit {
        id: String,
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        /// Empty string clears the username
        #[arg(long)]
        username: Option<String>,
    },

    /// Delete an entry
    Rm {
        id: String,
        #[arg(long)]
        yes: bool,
    },

    /// Print the current code of an entry
    Code { id: String },

    /// Keep printing codes until Ctrl-C
    Watch {
        #[arg(long)]
        host: Option<String>,
    },

    /// Fill an entry's code into a page snapshot (JSON)
    Fill {
        id: String,
        /// Page snapshot: {"fields": [{"tag": "input", "type": "text", "readOnly": false, ...}]}
        #[arg(long)]
        page: PathBuf,
    },

    /// Write all entries to a JSON backup file
    Export {
        /// Defaults to totp_backup_<date>.json
        file: Option<PathBuf>,
    },

    /// Replace all entries with the contents of a backup file
    Import {
        file: PathBuf,
        #[arg(long)]
        yes: bool,
    },

    /// Remote backup settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },

    /// Remote backup and restore
    Sync {
        #[command(subcommand)]
        cmd: SyncCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Save remote settings (overwrites previous ones)
    ///
    /// Examples:
    ///   totp-sync config set --url https://backup.example.workers.dev --auto-backup
    Set {
        #[arg(long)]
        url: String,
        /// API token (prompted when omitted)
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        auto_backup: bool,
    },
    /// Show remote settings, token masked
    Show,
}

#[derive(Subcommand, Debug)]
enum SyncCommands {
    /// Upload all entries
    Push,
    /// Download entries, replacing local ones
    Pull {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let path = match cli.store {
        Some(p) => p,
        None => default_store_path()?,
    };
    let kv = Arc::new(FileStore::open(path));

    let (tx, hook) = AutoBackup::spawn(kv.clone());
    let store = EntryStore::new(kv.clone()).with_notifier(tx);

    let result = run(cli.command, &kv, &store).await;

    // closes the event channel so the hook can finish
    drop(store);
    hook.drain().await;
    result
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("TOTP_SYNC_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("totp_sync=debug")
        } else {
            EnvFilter::new("totp_sync=warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run(command: Commands, kv: &Arc<FileStore>, store: &Store) -> anyhow::Result<()> {
    match command {
        Commands::List { host } => cmd_list(store, host.as_deref())?,
        Commands::Add {
            domain,
            secret,
            username,
        } => cmd_add(store, domain, secret, username)?,
        Commands::Edit {
            id,
            secret,
            domain,
            username,
        } => cmd_edit(store, &id, secret, domain, username)?,
        Commands::Rm { id, yes } => cmd_rm(store, &id, yes)?,
        Commands::Code { id } => cmd_code(store, &id)?,
        Commands::Watch { host } => cmd_watch(store, host.as_deref()).await?,
        Commands::Fill { id, page } => cmd_fill(store, &id, &page)?,
        Commands::Export { file } => cmd_export(store, file)?,
        Commands::Import { file, yes } => cmd_import(store, &file, yes)?,
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Set {
                url,
                token,
                auto_backup,
            } => cmd_config_set(kv, &url, token, auto_backup)?,
            ConfigCommands::Show => cmd_config_show(kv)?,
        },
        Commands::Sync { cmd } => match cmd {
            SyncCommands::Push => cmd_sync_push(kv, store).await?,
            SyncCommands::Pull { yes } => cmd_sync_pull(kv, store, yes).await?,
        },
    }
    Ok(())
}

fn find_entry(store: &Store, id: &str) -> anyhow::Result<Entry> {
    store
        .get(id)?
        .ok_or_else(|| anyhow!("No entry with id {id}"))
}

fn print_entries(entries: &[Entry], host: &str) -> anyhow::Result<()> {
    if entries.is_empty() {
        println!("No entries yet. Run `totp-sync add <domain>` to add one.");
        return Ok(());
    }

    let shown = filter_for_host(entries, host);
    if shown.is_empty() {
        println!("No entries match {host}. Run without --host to show all.");
        return Ok(());
    }

    for entry in shown {
        let code = match generate_current(&entry.secret) {
            Ok(c) => format!("{} ({:>2}s)", c.code, c.seconds_remaining),
            Err(e) => {
                tracing::warn!(id = %entry.id, "cannot generate code: {e}");
                "Error".to_string()
            }
        };
        println!(
            "{:<20} {:<24} {:<20} {}",
            entry.id,
            entry.domain,
            entry.username.as_deref().unwrap_or("N/A"),
            code
        );
    }
    Ok(())
}

fn cmd_list(store: &Store, host: Option<&str>) -> anyhow::Result<()> {
    let host = host.map(host_from_input).unwrap_or_default();
    print_entries(&store.list()?, &host)
}

fn cmd_add(
    store: &Store,
    domain: String,
    secret: Option<String>,
    username: Option<String>,
) -> anyhow::Result<()> {
    let raw = match secret {
        Some(s) => s,
        None => prompt_hidden("Secret (base32) or otpauth:// URL: ")?,
    };
    let secret = parse_secret_input(&raw)?;

    let entry = store.upsert(&EntryDraft {
        id: None,
        secret,
        domain,
        username,
    })?;
    println!("Saved entry {} for {}", entry.id, entry.domain);
    Ok(())
}

fn cmd_edit(
    store: &Store,
    id: &str,
    secret: Option<String>,
    domain: Option<String>,
    username: Option<String>,
) -> anyhow::Result<()> {
    let current = find_entry(store, id)?;
    let secret = match secret {
        Some(raw) => parse_secret_input(&raw)?,
        None => current.secret,
    };

    let entry = store.upsert(&EntryDraft {
        id: Some(current.id),
        secret,
        domain: domain.unwrap_or(current.domain),
        username: username.or(current.username),
    })?;
    println!("Updated entry {} ({})", entry.id, entry.domain);
    Ok(())
}

fn cmd_rm(store: &Store, id: &str, yes: bool) -> anyhow::Result<()> {
    let entry = find_entry(store, id)?;
    if !confirm(
        &format!("Delete entry {} for {}?", entry.id, entry.domain),
        yes,
    )? {
        return Ok(());
    }
    store.remove(id)?;
    println!("Deleted entry {id}");
    Ok(())
}

fn cmd_code(store: &Store, id: &str) -> anyhow::Result<()> {
    let entry = find_entry(store, id)?;
    let code = generate_current(&entry.secret)?;
    println!("{}", code.code);
    Ok(())
}

async fn cmd_watch(store: &Store, host: Option<&str>) -> anyhow::Result<()> {
    let host = host.map(host_from_input).unwrap_or_default();
    let mut ticker = tokio::time::interval(Duration::from_secs(15));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                println!();
                print_entries(&store.list()?, &host)?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn cmd_fill(store: &Store, id: &str, page_path: &Path) -> anyhow::Result<()> {
    let entry = find_entry(store, id)?;
    let data = std::fs::read_to_string(page_path)
        .with_context(|| format!("cannot read page snapshot {}", page_path.display()))?;
    let mut page: Page = serde_json::from_str(&data)
        .with_context(|| format!("invalid page snapshot {}", page_path.display()))?;

    let code = generate_current(&entry.secret)?;
    let dispatcher = AutofillDispatcher::new(HeuristicMatcher::default());
    let outcome = dispatcher.fill(&code.code, &mut page);
    if !outcome.filled {
        bail!(
            "{}",
            outcome
                .reason
                .unwrap_or_else(|| "fill failed".to_string())
        );
    }

    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

fn cmd_export(store: &Store, file: Option<PathBuf>) -> anyhow::Result<()> {
    let entries = store.list()?;
    if entries.is_empty() {
        println!("No entries to backup.");
        return Ok(());
    }
    let path = file.unwrap_or_else(default_backup_path);
    write_backup_file(&path, &entries)?;
    println!("Backup of {} entries written to {}", entries.len(), path.display());
    Ok(())
}

fn cmd_import(store: &Store, file: &Path, yes: bool) -> anyhow::Result<()> {
    let entries = read_backup_file(file)
        .with_context(|| format!("Restore failed for {}", file.display()))?;
    if !confirm(
        "Restoring will overwrite all current entries. Are you sure?",
        yes,
    )? {
        return Ok(());
    }
    let count = entries.len();
    store.replace_all(entries)?;
    println!("Restore successful! {count} entries loaded.");
    Ok(())
}

fn cmd_config_set(
    kv: &Arc<FileStore>,
    url: &str,
    token: Option<String>,
    auto_backup: bool,
) -> anyhow::Result<()> {
    let token = match token {
        Some(t) => t,
        None => prompt_hidden("API token: ")?,
    };
    let cfg = WorkerConfig::new(url, &token, auto_backup);
    save_worker_config(kv.as_ref(), &cfg)?;
    println!("Worker config saved.");
    Ok(())
}

fn cmd_config_show(kv: &Arc<FileStore>) -> anyhow::Result<()> {
    let Some(cfg) = load_worker_config(kv.as_ref())? else {
        println!("No worker config saved.");
        return Ok(());
    };
    println!("URL:         {}", cfg.url);
    println!("Token:       {}", cfg.masked_token());
    println!("Auto-backup: {}", if cfg.enable_auto_backup { "on" } else { "off" });
    Ok(())
}

async fn cmd_sync_push(kv: &Arc<FileStore>, store: &Store) -> anyhow::Result<()> {
    let client = SyncClient::new(require_worker_config(kv.as_ref())?)?;
    let entries = store.list()?;
    let outcome = client.push(&entries).await.context("Backup failed")?;
    println!("Backed up {} entries (HTTP {}).", entries.len(), outcome.status);
    if let Some(resp) = outcome.response {
        tracing::debug!("backup response: {resp}");
    }
    Ok(())
}

async fn cmd_sync_pull(kv: &Arc<FileStore>, store: &Store, yes: bool) -> anyhow::Result<()> {
    let client = SyncClient::new(require_worker_config(kv.as_ref())?)?;
    if !confirm(
        "Restoring from the remote will overwrite all local entries. Continue?",
        yes,
    )? {
        return Ok(());
    }
    let entries = client.pull().await.context("Restore failed")?;
    let count = entries.len();
    store.replace_all(entries)?;
    println!("Restored {count} entries from remote.");
    Ok(())
}
