//! Backup, restore and integrity checking.
//!
//! Backups prefer mechanisms that keep the live connection open: the
//! SQLite online backup API first, `VACUUM INTO` second, and only as a
//! last resort a checkpointed raw file copy together with the write-ahead
//! companion files. Whichever path produced the file, it only counts as a
//! backup once `PRAGMA integrity_check` passes against it on a fresh
//! connection.
//!
//! Restore takes a one-shot safety copy of the current store before
//! overwriting it. A failure after the file replacement step is reported
//! with the safety-copy location but never auto-rolled-back: a second
//! automatic replacement after a failure is itself a corruption risk.

use anyhow::{anyhow, Context};
use chrono::Utc;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::sqlite_persistence::migrate_schema;

use super::audit::AuditAction;
use super::error::{StoreError, StoreResult};
use super::models::IntegrityReport;
use super::store::SqliteCatalogStore;

impl SqliteCatalogStore {
    /// Produce a verified full copy of the store (schema, data, binary
    /// attachments) under `<store-dir>/backups/` and return its path.
    pub fn backup(&self) -> StoreResult<PathBuf> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let stem = self
            .db_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "catalog".to_string());
        let backup_dir = self
            .db_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("backups");
        fs::create_dir_all(&backup_dir)
            .with_context(|| format!("failed to create backup directory {backup_dir:?}"))?;
        let dst = backup_dir.join(format!("{stem}_{stamp}.db"));

        {
            let guard = self.conn.lock().unwrap();

            let mut done = match online_backup(&guard, &dst) {
                Ok(()) => {
                    info!("backup: used the online backup API");
                    true
                }
                Err(e) => {
                    warn!("backup: online backup API failed, trying VACUUM INTO: {e}");
                    false
                }
            };

            if !done {
                remove_if_exists(&dst);
                done = match vacuum_into(&guard, &dst) {
                    Ok(()) => {
                        info!("backup: used VACUUM INTO");
                        true
                    }
                    Err(e) => {
                        warn!("backup: VACUUM INTO failed, falling back to file copy: {e}");
                        false
                    }
                };
            }

            if !done {
                remove_if_exists(&dst);
                checkpoint_and_copy(&guard, &self.db_path, &dst)
                    .context("backup failed during file copy")?;
                info!("backup: used checkpointed file copy");
            }
        }

        if let Err(e) = verify_store_file(&dst) {
            remove_if_exists(&dst);
            return Err(StoreError::IntegrityFailure(format!(
                "backup created but failed verification and was discarded: {e}"
            )));
        }

        info!("store backed up to {dst:?}");
        self.audit.record(
            AuditAction::Backup,
            "store",
            Some(&dst.display().to_string()),
            Some("full store (schema + data), custom fields included"),
            None,
        );
        Ok(dst)
    }

    /// Replace the live store with the file at `source`.
    ///
    /// The caller is responsible for user confirmation. Returns the
    /// location of the pre-restore safety copy, if one could be taken.
    pub fn restore(&self, source: &Path) -> StoreResult<Option<PathBuf>> {
        if !source.exists() {
            return Err(StoreError::Validation(format!(
                "backup file {source:?} does not exist"
            )));
        }

        let mut guard = self.conn.lock().unwrap();

        let safety_copy = match take_safety_copy(&self.db_path) {
            Ok(path) => path,
            Err(e) => {
                warn!("failed to take pre-restore safety copy, continuing: {e:#}");
                None
            }
        };
        let on_failure = match &safety_copy {
            Some(p) => format!("the previous store was kept at {p:?}; restore it manually"),
            None => "no safety copy could be taken".to_string(),
        };

        // Swap the live connection out and close it so the file handle is
        // released before the replacement.
        let placeholder = Connection::open_in_memory()?;
        let old = std::mem::replace(&mut *guard, placeholder);
        if let Err((_, e)) = old.close() {
            warn!("error closing store connection before restore: {e}");
        }

        // Point of no return: from here failures are reported together
        // with the safety-copy location, never auto-rolled-back.
        fs::copy(source, &self.db_path)
            .with_context(|| format!("failed to replace store file; {on_failure}"))?;
        for companion in companion_files(&self.db_path) {
            remove_if_exists(&companion);
        }

        let mut new_conn = Connection::open(&self.db_path)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("failed to reopen the restored store; {on_failure}"))?;
        Self::apply_pragmas(&new_conn)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("failed to configure the restored store; {on_failure}"))?;
        migrate_schema(&mut new_conn)
            .with_context(|| format!("failed to migrate the restored store; {on_failure}"))?;

        let messages = integrity_messages(&new_conn)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("failed to verify the restored store; {on_failure}"))?;
        *guard = new_conn;
        drop(guard);

        if !is_ok(&messages) {
            return Err(StoreError::IntegrityFailure(format!(
                "restored store failed the self-consistency check ({}); {on_failure}",
                messages.join("; ")
            )));
        }

        info!("store restored from {source:?}");
        self.audit.record(
            AuditAction::Restore,
            "store",
            Some(&source.display().to_string()),
            Some(&format!("restored to {}", self.db_path.display())),
            None,
        );
        Ok(safety_copy)
    }

    /// Run the self-consistency check. Read-only, safe at any time.
    pub fn verify(&self) -> StoreResult<IntegrityReport> {
        let messages = {
            let conn = self.conn.lock().unwrap();
            integrity_messages(&conn)?
        };
        let ok = is_ok(&messages);
        info!("integrity check: {}", messages.join("; "));
        self.audit.record(
            AuditAction::Verify,
            "store",
            Some(&self.db_path.display().to_string()),
            Some(&messages.join("; ")),
            None,
        );
        Ok(IntegrityReport { ok, messages })
    }
}

fn integrity_messages(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let messages = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(messages)
}

fn is_ok(messages: &[String]) -> bool {
    messages.len() == 1 && messages[0].eq_ignore_ascii_case("ok")
}

/// Open `path` on a fresh connection and run the self-consistency check.
fn verify_store_file(path: &Path) -> anyhow::Result<()> {
    let conn = Connection::open(path)?;
    let messages = integrity_messages(&conn)?;
    if !is_ok(&messages) {
        anyhow::bail!("integrity check reported: {}", messages.join("; "));
    }
    Ok(())
}

fn online_backup(src: &Connection, dst: &Path) -> anyhow::Result<()> {
    let mut dst_conn = Connection::open(dst)?;
    let backup = rusqlite::backup::Backup::new(src, &mut dst_conn)?;
    backup.run_to_completion(100, Duration::from_millis(250), None)?;
    Ok(())
}

fn vacuum_into(src: &Connection, dst: &Path) -> anyhow::Result<()> {
    let escaped = dst.display().to_string().replace('\'', "''");
    src.execute_batch(&format!("VACUUM INTO '{escaped}'"))?;
    Ok(())
}

/// Flush the write-ahead log into the main file, then copy it together
/// with any companion files that still exist.
fn checkpoint_and_copy(conn: &Connection, src: &Path, dst: &Path) -> anyhow::Result<()> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_: &rusqlite::Row| Ok(()))?;
    fs::copy(src, dst)?;
    for (src_companion, dst_companion) in companion_files(src).iter().zip(companion_files(dst)) {
        if src_companion.exists() {
            fs::copy(src_companion, dst_companion)?;
        }
    }
    Ok(())
}

/// The transient write-ahead companions of a store file.
fn companion_files(db_path: &Path) -> [PathBuf; 2] {
    let base = db_path.display().to_string();
    [PathBuf::from(format!("{base}-wal")), PathBuf::from(format!("{base}-shm"))]
}

fn take_safety_copy(db_path: &Path) -> anyhow::Result<Option<PathBuf>> {
    if !db_path.exists() {
        return Ok(None);
    }
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "catalog".to_string());
    let dir = db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("backups")
        .join("pre_restore");
    fs::create_dir_all(&dir)?;
    let copy = dir.join(format!("{stem}_pre_restore_{stamp}.db"));
    fs::copy(db_path, &copy)?;
    info!("pre-restore safety copy saved to {copy:?}");
    Ok(Some(copy))
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("failed to remove {path:?}: {e}");
        }
    }
}
