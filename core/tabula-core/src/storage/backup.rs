//! Backup Manager — pre-write snapshots of physical table artifacts.
//!
//! With [`BackupPolicy::TimestampedCopies`], the file about to be replaced is
//! copied to `<data>/backup/<stem>_<YYYY-MM-DDTHH-MM-SS>.<suffix>`. Backups are
//! never overwritten: a second backup within the same second gets a `_<n>`
//! discriminator.

use crate::error::TabulaResult;
use crate::storage::BackupPolicy;
use std::path::{Path, PathBuf};
use tracing::info;

/// Filename-safe timestamp (colons replaced by hyphens).
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

#[derive(Debug, Clone)]
pub struct BackupManager {
    policy: BackupPolicy,
    backup_folder: PathBuf,
}

impl BackupManager {
    pub fn new(data_folder: &Path, policy: BackupPolicy) -> Self {
        Self {
            policy,
            backup_folder: data_folder.join("backup"),
        }
    }

    pub fn policy(&self) -> BackupPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: BackupPolicy) {
        self.policy = policy;
    }

    pub fn backup_folder(&self) -> &Path {
        &self.backup_folder
    }

    /// Copy `file` into the backup folder as `<stem>_<timestamp>.<suffix>`.
    ///
    /// Returns the backup path, or `None` when the policy is `None`. Any I/O
    /// failure is returned so the caller aborts its write.
    pub fn backup(&self, file: &Path, stem: &str, suffix: &str) -> TabulaResult<Option<PathBuf>> {
        if self.policy == BackupPolicy::None {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.backup_folder)?;

        let stamp = chrono::Local::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let target = self.free_name(stem, &stamp, suffix);
        std::fs::copy(file, &target)?;
        info!(source = %file.display(), backup = %target.display(), "backed up table file");
        Ok(Some(target))
    }

    fn free_name(&self, stem: &str, stamp: &str, suffix: &str) -> PathBuf {
        let candidate = self.backup_folder.join(format!("{stem}_{stamp}.{suffix}"));
        if !candidate.exists() {
            return candidate;
        }
        (1..)
            .map(|n| self.backup_folder.join(format!("{stem}_{stamp}_{n}.{suffix}")))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &Path) -> PathBuf {
        let path = dir.join("t.parquet");
        std::fs::write(&path, b"old contents").unwrap();
        path
    }

    #[test]
    fn none_policy_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let file = source(tmp.path());
        let manager = BackupManager::new(tmp.path(), BackupPolicy::None);
        assert_eq!(manager.backup(&file, "t", "parquet").unwrap(), None);
        assert!(!manager.backup_folder().exists());
    }

    #[test]
    fn timestamped_copy_has_original_contents() {
        let tmp = TempDir::new().unwrap();
        let file = source(tmp.path());
        let manager = BackupManager::new(tmp.path(), BackupPolicy::TimestampedCopies);
        let target = manager.backup(&file, "t", "parquet").unwrap().unwrap();

        assert_eq!(target.parent().unwrap(), tmp.path().join("backup"));
        let name = target.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("t_"));
        assert!(name.ends_with(".parquet"));
        assert!(!name.contains(':'));
        assert_eq!(std::fs::read(&target).unwrap(), b"old contents");
    }

    #[test]
    fn same_second_backups_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let file = source(tmp.path());
        let manager = BackupManager::new(tmp.path(), BackupPolicy::TimestampedCopies);
        let paths: Vec<PathBuf> = (0..3)
            .map(|_| manager.backup(&file, "t", "ver.parquet").unwrap().unwrap())
            .collect();
        assert_ne!(paths[0], paths[1]);
        assert_ne!(paths[1], paths[2]);
        assert_eq!(std::fs::read_dir(manager.backup_folder()).unwrap().count(), 3);
    }

    #[test]
    fn missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let manager = BackupManager::new(tmp.path(), BackupPolicy::TimestampedCopies);
        assert!(manager.backup(&tmp.path().join("absent"), "absent", "parquet").is_err());
    }
}
