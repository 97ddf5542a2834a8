//! Diagnostics for PureDrop.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform, local paths
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::db::DbState;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 14;

/// File name prefix of the daily log files.
pub const LOG_FILE_PREFIX: &str = "puredrop";

/// Returns version, build and platform info plus the local state paths.
pub fn get_about_info(data_dir: &Path, db: Option<&DbState>) -> Value {
    let schema_version = db.and_then(|db| {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get::<_, i64>(0),
            )?)
        })
        .ok()
    });

    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
        "dataDir": data_dir.display().to_string(),
        "logDir": get_log_dir(data_dir).display().to_string(),
        "schemaVersion": schema_version,
    })
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Returns the log directory path (same location used by lib.rs).
pub fn get_log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let prefix = format!("{LOG_FILE_PREFIX}.");
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with(&prefix) {
                    let modified = entry
                        .metadata()
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .unwrap_or(std::time::UNIX_EPOCH);
                    log_files.push((path, modified));
                }
            }
        }
    }

    // Newest first; ties broken by name so dated files order correctly.
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("puredrop_diag_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_about_info_has_required_fields() {
        let db = DbState::in_memory().unwrap();
        let info = get_about_info(Path::new("/tmp/puredrop"), Some(&db));
        assert!(info.get("version").is_some());
        assert!(info.get("buildTimestamp").is_some());
        assert!(info.get("gitSha").is_some());
        assert_eq!(info["schemaVersion"], 2);
        assert!(info["logDir"].as_str().unwrap().ends_with("logs"));
    }

    #[test]
    fn test_prune_keeps_newest_log_files_only() {
        let dir = temp_dir();
        for day in 1..=20 {
            fs::write(dir.join(format!("puredrop.2026-09-{day:02}")), "x").unwrap();
        }
        fs::write(dir.join("other.log"), "keep").unwrap();

        prune_old_logs(&dir);

        let remaining: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.starts_with("puredrop."))
            .collect();
        assert_eq!(remaining.len(), MAX_LOG_FILES);
        assert!(dir.join("other.log").exists());
        assert!(dir.join("puredrop.2026-09-20").exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
