use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use isrc_catalog::{AuditAction, AuditFilter, SqliteCatalogStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(about = "Catalog manager core for sound-recording metadata")]
struct CliArgs {
    /// Path to the catalog store file (created and migrated on open).
    #[clap(value_parser = parse_path)]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the store and run any pending schema migrations.
    Migrate,
    /// Run the self-consistency check.
    Verify,
    /// Create a verified backup under the store's backups directory.
    Backup,
    /// Replace the store with a backup file.
    Restore {
        #[clap(value_parser = parse_path)]
        file: PathBuf,
        /// Skip the interactive confirmation.
        #[clap(long)]
        yes: bool,
    },
    /// Show recent audit entries.
    Audit {
        /// Filter by action category (CREATE, UPDATE, MIGRATE, ...).
        #[clap(long)]
        action: Option<String>,
        /// Filter by entity name.
        #[clap(long)]
        entity: Option<String>,
        #[clap(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show or change the per-catalog identifier settings.
    Settings {
        /// Set the 5-character registrant prefix (2 letters + 3 alphanumerics).
        #[clap(long)]
        prefix: Option<String>,
        /// Set the 2-digit artist code (00-99).
        #[clap(long)]
        artist_code: Option<String>,
    },
    /// Preview the next free ISRC without reserving it.
    Allocate {
        /// 2-digit allocation year; defaults to the current year.
        #[clap(long)]
        year: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!("Opening catalog store at {:?}...", cli_args.store);
    let store = SqliteCatalogStore::open(&cli_args.store)?;

    match cli_args.command {
        Command::Migrate => {
            // Migrations already ran as part of open.
            println!("store is up to date");
        }
        Command::Verify => {
            let report = store.verify()?;
            if report.ok {
                println!("integrity check: ok");
            } else {
                bail!("integrity check failed: {}", report.messages.join("; "));
            }
        }
        Command::Backup => {
            let path = store.backup()?;
            println!("backup created: {}", path.display());
        }
        Command::Restore { file, yes } => {
            if !yes && !confirm(&format!(
                "This will replace the current store with {:?}. Type 'yes' to continue: ",
                file
            ))? {
                println!("restore cancelled");
                return Ok(());
            }
            let safety_copy = store.restore(&file)?;
            println!("store restored from {}", file.display());
            if let Some(copy) = safety_copy {
                println!("previous store kept at {}", copy.display());
            }
        }
        Command::Audit {
            action,
            entity,
            limit,
        } => {
            let action = action
                .map(|a| {
                    AuditAction::from_db_str(&a.to_ascii_uppercase())
                        .with_context(|| format!("unknown audit action '{a}'"))
                })
                .transpose()?;
            let entries = store.audit().query(&AuditFilter {
                action,
                entity,
                since: None,
                limit: Some(limit),
            })?;
            for entry in entries {
                println!(
                    "{} {:8} {:16} {:8} {}",
                    entry.ts,
                    entry.action,
                    entry.entity.unwrap_or_default(),
                    entry.ref_id.unwrap_or_default(),
                    entry.details.unwrap_or_default()
                );
            }
        }
        Command::Settings {
            prefix,
            artist_code,
        } => {
            if let Some(prefix) = prefix {
                store.set_registrant_prefix(&prefix)?;
            }
            if let Some(code) = artist_code {
                store.set_artist_code(&code)?;
            }
            let settings = store.settings()?;
            println!(
                "registrant prefix: {}",
                settings.registrant_prefix.as_deref().unwrap_or("(unset)")
            );
            println!("artist code: {}", settings.artist_code);
        }
        Command::Allocate { year } => {
            let settings = store.settings()?;
            let prefix = settings
                .registrant_prefix
                .context("registrant prefix is not configured; set it with the settings command")?;
            let year = year.unwrap_or(Utc::now().year() as u32 % 100);
            let iso = store.allocate_isrc(&prefix, year, &settings.artist_code)?;
            println!("{iso}");
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("yes"))
}
