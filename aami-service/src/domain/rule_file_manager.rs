//! Rule-file manager (§4.3): durable, verifiable file mutation on a shared directory
//! possibly watched by an external process (the metrics engine).
//!
//! Every write goes through a temp-file-then-rename so external readers never observe
//! a half-written file (§5). Validation, when enabled, shells out to an external binary
//! (`promtool check rules`); a non-zero exit restores the previous content from the
//! newest backup rather than leaving a broken file in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tokio::process::Command;

use crate::config::RuleFileConfig;
use crate::error::{Error, Result};
use crate::ids::GroupId;

/// Writes `bytes` to `path` atomically via temp-file-then-rename, for callers (the SD
/// projection's file-SD variant, §4.7) that need the same never-half-written guarantee
/// as the rule-file manager without its backup/validation machinery.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::DirectoryNotFound(format!("{}: {e}", parent.display())))?;
    }

    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| Error::AtomicWriteFailed(format!("{}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::AtomicWriteFailed(format!("{}: {e}", path.display())))?;
    Ok(())
}

fn rule_file_name(group_id: &GroupId) -> String {
    format!("group-{}.yml", group_id.as_str())
}

fn backup_file_name(group_id: &GroupId, now: chrono::DateTime<Utc>) -> String {
    format!("group-{}.{}.yml", group_id.as_str(), now.format("%Y%m%d-%H%M%S"))
}

/// Manages the on-disk rule-file directory: atomic writes, backups, external
/// validation, and restore.
#[derive(Debug)]
pub struct RuleFileManager {
    config: RuleFileConfig,
    validation_enabled: bool,
}

impl RuleFileManager {
    /// Constructs the manager and performs startup validator discovery (§4.3): if
    /// `enable_validation` is set but the configured binary isn't usable, validation is
    /// degraded to disabled with a warning rather than failing startup.
    pub fn new(config: RuleFileConfig) -> Self {
        let validation_enabled = config.enable_validation && Self::validator_is_usable(&config.validator_path);
        if config.enable_validation && !validation_enabled {
            tracing::warn!(
                validator_path = %config.validator_path.display(),
                "rule validator not found or not executable; disabling rule validation"
            );
        }
        Self { config, validation_enabled }
    }

    /// Hand-rolled executable check (no `which` crate in the dependency tree): the
    /// path must exist, be a file, and carry an execute bit for someone.
    fn validator_is_usable(path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;

        let candidates: Vec<PathBuf> = if path.is_absolute() || path.components().count() > 1 {
            vec![path.to_path_buf()]
        } else {
            std::env::var_os("PATH")
                .map(|paths| std::env::split_paths(&paths).map(|dir| dir.join(path)).collect())
                .unwrap_or_default()
        };

        candidates.iter().any(|candidate| {
            std::fs::metadata(candidate)
                .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    fn target_path(&self, group_id: &GroupId) -> PathBuf {
        self.config.base_path.join(rule_file_name(group_id))
    }

    fn tmp_path(&self, group_id: &GroupId) -> PathBuf {
        self.config.base_path.join(format!("{}.tmp", rule_file_name(group_id)))
    }

    async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.config.base_path)
            .await
            .map_err(|e| Error::DirectoryNotFound(format!("{}: {e}", self.config.base_path.display())))?;
        if self.config.enable_backup {
            fs::create_dir_all(self.config.backup_dir())
                .await
                .map_err(|e| Error::DirectoryNotFound(format!("{}: {e}", self.config.backup_dir().display())))?;
        }
        Ok(())
    }

    /// Public entry point for callers that must guarantee a backup exists before doing
    /// work upstream of the write itself (e.g. rendering a rule file's body) that might
    /// fail before `write_rule_file`/`delete_rule_file` ever runs. No-op if there is
    /// nothing to back up or backups are disabled.
    pub async fn backup_before_write(&self, group_id: &GroupId) -> Result<Option<PathBuf>> {
        self.ensure_dirs().await?;
        self.backup_current(group_id).await
    }

    /// Copies the current file for `group_id` into the backup directory, if it exists
    /// and backups are enabled. No-op (and `Ok(None)`) if there is nothing to back up.
    async fn backup_current(&self, group_id: &GroupId) -> Result<Option<PathBuf>> {
        if !self.config.enable_backup {
            return Ok(None);
        }
        let target = self.target_path(group_id);
        if fs::metadata(&target).await.is_err() {
            return Ok(None);
        }

        let backup_path = self.config.backup_dir().join(backup_file_name(group_id, Utc::now()));
        fs::copy(&target, &backup_path)
            .await
            .map_err(|e| Error::BackupFailed(format!("{}: {e}", target.display())))?;
        Ok(Some(backup_path))
    }

    /// Finds the newest backup for `group_id` by filename (timestamps sort lexically).
    async fn newest_backup(&self, group_id: &GroupId) -> Result<Option<PathBuf>> {
        let prefix = format!("group-{}.", group_id.as_str());
        let mut entries = fs::read_dir(self.config.backup_dir())
            .await
            .map_err(|e| Error::RestoreFailed(e.to_string()))?;

        let mut newest: Option<(String, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::RestoreFailed(e.to_string()))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".yml") {
                if newest.as_ref().is_none_or(|(best, _)| &name > best) {
                    newest = Some((name, entry.path()));
                }
            }
        }
        Ok(newest.map(|(_, path)| path))
    }

    /// Restores `group_id`'s file from its newest backup, or removes the file if no
    /// backup exists and none existed before this write attempt.
    async fn restore_from_backup(&self, group_id: &GroupId) -> Result<()> {
        let target = self.target_path(group_id);
        match self.newest_backup(group_id).await? {
            Some(backup) => {
                fs::copy(&backup, &target)
                    .await
                    .map_err(|e| Error::RestoreFailed(e.to_string()))?;
            }
            None => {
                let _ = fs::remove_file(&target).await;
            }
        }
        Ok(())
    }

    /// Runs the configured validator against `path`, returning its stderr on failure.
    async fn validate(&self, path: &Path) -> Result<()> {
        let invocation = Command::new(&self.config.validator_path)
            .arg("check")
            .arg("rules")
            .arg(path)
            .output();

        let output = tokio::time::timeout(self.config.validator_timeout(), invocation)
            .await
            .map_err(|_| Error::ValidationError {
                field: "rule_file".to_string(),
                message: format!("validator timed out after {:?}", self.config.validator_timeout()),
            })?
            .map_err(|e| Error::ValidationError {
                field: "rule_file".to_string(),
                message: format!("failed to invoke validator: {e}"),
            })?;

        if !output.status.success() {
            return Err(Error::ValidationError {
                field: "rule_file".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Writes `bytes` for `group_id` atomically, with backup and (if enabled)
    /// validation (§4.3 Write contract).
    pub async fn write_rule_file(&self, group_id: &GroupId, bytes: &[u8]) -> Result<()> {
        self.ensure_dirs().await?;
        self.backup_current(group_id).await?;

        let tmp = self.tmp_path(group_id);
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| Error::AtomicWriteFailed(format!("{}: {e}", tmp.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = fs::metadata(&tmp).await {
                let mut perms = meta.permissions();
                perms.set_mode(0o644);
                let _ = fs::set_permissions(&tmp, perms).await;
            }
        }

        if self.validation_enabled {
            if let Err(err) = self.validate(&tmp).await {
                let _ = fs::remove_file(&tmp).await;
                self.restore_from_backup(group_id).await?;
                return Err(err);
            }
        }

        let target = self.target_path(group_id);
        fs::rename(&tmp, &target)
            .await
            .map_err(|e| Error::AtomicWriteFailed(format!("{}: {e}", target.display())))?;

        Ok(())
    }

    /// Deletes the file for `group_id`, backing it up first if enabled. No-op if the
    /// file did not exist.
    pub async fn delete_rule_file(&self, group_id: &GroupId) -> Result<()> {
        self.ensure_dirs().await?;
        self.backup_current(group_id).await?;
        match fs::remove_file(self.target_path(group_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e.to_string())),
        }
    }

    /// Enumerates `group-*.yml` files in the base directory, returning bare group ids.
    pub async fn list_rule_files(&self) -> Result<Vec<String>> {
        self.ensure_dirs().await?;
        let mut entries = fs::read_dir(&self.config.base_path)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        let mut groups = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::Io(e.to_string()))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(rest) = name.strip_prefix("group-").and_then(|s| s.strip_suffix(".yml")) {
                groups.push(rest.to_string());
            }
        }
        Ok(groups)
    }

    /// Removes backups older than `max_age` (§4.3 `CleanupOldBackups`).
    pub async fn cleanup_old_backups(&self, max_age: Duration) -> Result<usize> {
        if !self.config.enable_backup {
            return Ok(0);
        }
        let mut entries = fs::read_dir(self.config.backup_dir())
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        let cutoff = std::time::SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(std::time::UNIX_EPOCH);

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::Io(e.to_string()))? {
            if let Ok(metadata) = entry.metadata().await {
                if let Ok(modified) = metadata.modified() {
                    if modified < cutoff {
                        if fs::remove_file(entry.path()).await.is_ok() {
                            removed += 1;
                        }
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn test_config(base: &Path) -> RuleFileConfig {
        RuleFileConfig {
            base_path: base.to_path_buf(),
            backup_path: None,
            enable_validation: false,
            enable_backup: true,
            validator_path: PathBuf::from("promtool"),
            validator_timeout_secs: 5,
        }
    }

    async fn write_fake_validator(dir: &Path, succeed: bool) -> PathBuf {
        let path = dir.join("fake-promtool");
        let script = if succeed {
            "#!/bin/sh\nexit 0\n"
        } else {
            "#!/bin/sh\necho 'bad rule' >&2\nexit 1\n"
        };
        fs::write(&path, script).await.unwrap();
        let mut perms = fs::metadata(&path).await.unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RuleFileManager::new(test_config(dir.path()));
        let group_id = GroupId::new();

        manager.write_rule_file(&group_id, b"groups: []\n").await.unwrap();

        let content = fs::read(manager.target_path(&group_id)).await.unwrap();
        assert_eq!(content, b"groups: []\n");
    }

    #[tokio::test]
    async fn test_write_creates_timestamped_backup_of_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RuleFileManager::new(test_config(dir.path()));
        let group_id = GroupId::new();

        manager.write_rule_file(&group_id, b"groups: []\n").await.unwrap();
        manager.write_rule_file(&group_id, b"groups: [v2]\n").await.unwrap();

        let backup = manager.newest_backup(&group_id).await.unwrap();
        assert!(backup.is_some());
        let backup_content = fs::read(backup.unwrap()).await.unwrap();
        assert_eq!(backup_content, b"groups: []\n");
    }

    #[tokio::test]
    async fn test_validation_failure_restores_previous_content_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let validator = write_fake_validator(dir.path(), false).await;

        let mut config = test_config(dir.path());
        config.enable_validation = true;
        config.validator_path = validator;

        let manager = RuleFileManager::new(config);
        let group_id = GroupId::new();

        manager
            .write_rule_file(&group_id, b"groups: [good]\n")
            .await
            .unwrap();

        // Force validation on for the second write by re-running validate directly,
        // since the manager only enables validation if discovery at construction
        // succeeded (it did here).
        let result = manager.write_rule_file(&group_id, b"groups: [bad]\n").await;
        assert!(matches!(result, Err(Error::ValidationError { .. })));

        let content = fs::read(manager.target_path(&group_id)).await.unwrap();
        assert_eq!(content, b"groups: [good]\n");
    }

    #[tokio::test]
    async fn test_validator_not_found_disables_validation_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.enable_validation = true;
        config.validator_path = PathBuf::from("/nonexistent/promtool-binary");

        let manager = RuleFileManager::new(config);
        assert!(!manager.validation_enabled());
    }

    #[tokio::test]
    async fn test_list_rule_files_returns_bare_group_ids() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RuleFileManager::new(test_config(dir.path()));
        let group_id = GroupId::new();

        manager.write_rule_file(&group_id, b"groups: []\n").await.unwrap();

        let files = manager.list_rule_files().await.unwrap();
        assert_eq!(files, vec![group_id.as_str().to_string()]);
    }

    #[tokio::test]
    async fn test_delete_rule_file_is_noop_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RuleFileManager::new(test_config(dir.path()));
        let group_id = GroupId::new();

        manager.delete_rule_file(&group_id).await.unwrap();
    }
}
