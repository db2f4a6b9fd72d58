//! Write-with-rotation for tabular files
//!
//! New content always lands in a fresh timestamped file inside a backup
//! directory next to the target. The target path itself becomes a symbolic
//! link to the newest file, so every earlier version stays on disk. A plain
//! file found at the target is moved into the backup directory first.

use crate::error::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Backup directory name used when none is given: `.<stem>s`
pub fn default_backup_dir_name(target: &Path) -> String {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(".{stem}s")
}

/// Write `content` to `target`, keeping previous versions
///
/// Returns the path of the file holding the new content. Under `dry_run`
/// nothing is touched and the would-be path is returned.
pub fn save(
    content: &str,
    target: &Path,
    backup_dir_name: Option<&str>,
    use_relative_path: bool,
    dry_run: bool,
) -> Result<Option<PathBuf>> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let dir_name = backup_dir_name
        .map(str::to_string)
        .unwrap_or_else(|| default_backup_dir_name(target));
    let backup_dir = parent.join(&dir_name);

    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let backup_path = unique_path(&backup_dir, target, &timestamp);

    if dry_run {
        log::warn!(
            "[dry run] would write {} and point {} to it",
            backup_path.display(),
            target.display()
        );
        return Ok(Some(backup_path));
    }

    fs::create_dir_all(&backup_dir)?;
    write_atomic(&backup_dir, &backup_path, content)?;
    log::info!("wrote {}", backup_path.display());

    relocate_plain_file(&backup_dir, target)?;

    let link_value = if use_relative_path {
        match backup_path.file_name() {
            Some(file_name) => PathBuf::from(&dir_name).join(file_name),
            None => fs::canonicalize(&backup_path)?,
        }
    } else {
        fs::canonicalize(&backup_path)?
    };
    point_to(target, &backup_path, &link_value)?;
    log::debug!("{} -> {}", target.display(), link_value.display());

    Ok(Some(backup_path))
}

/// `<stem>-<timestamp>[-N].<ext>` inside `dir`, not yet taken
fn unique_path(dir: &Path, target: &Path, timestamp: &str) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = dir.join(format!("{stem}-{timestamp}{ext}"));
    let mut counter = 1;
    while fs::symlink_metadata(&candidate).is_ok() {
        candidate = dir.join(format!("{stem}-{timestamp}-{counter}{ext}"));
        counter += 1;
    }
    candidate
}

fn write_atomic(dir: &Path, path: &Path, content: &str) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Move a regular file at `target` into the backup directory, named after
/// its modification time
fn relocate_plain_file(backup_dir: &Path, target: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if !meta.file_type().is_file() {
        return Ok(());
    }

    let modified: DateTime<Local> = meta
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| Local::now());
    let previous = unique_path(
        backup_dir,
        target,
        &modified.format(TIMESTAMP_FORMAT).to_string(),
    );
    fs::rename(target, &previous)?;
    log::info!(
        "moved existing {} to {}",
        target.display(),
        previous.display()
    );
    Ok(())
}

#[cfg(unix)]
fn point_to(target: &Path, _backup_path: &Path, link_value: &Path) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_link = target.with_file_name(format!(".{file_name}.link"));
    if fs::symlink_metadata(&tmp_link).is_ok() {
        fs::remove_file(&tmp_link)?;
    }
    std::os::unix::fs::symlink(link_value, &tmp_link)?;
    // rename swaps the link in place
    fs::rename(&tmp_link, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn point_to(target: &Path, backup_path: &Path, _link_value: &Path) -> Result<()> {
    fs::copy(backup_path, target)?;
    Ok(())
}
