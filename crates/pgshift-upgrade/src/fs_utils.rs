use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Creates a single directory readable only by its owner. PostgreSQL refuses
/// to start on a data directory with group-write or any world access.
pub(crate) fn create_private_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

        fs::DirBuilder::new().mode(0o700).create(path)?;
        let mut permissions = fs::metadata(path)?.permissions();
        if permissions.mode() & 0o777 != 0o700 {
            permissions.set_mode(0o700);
            fs::set_permissions(path, permissions)?;
        }
    }
    #[cfg(not(unix))]
    {
        fs::create_dir(path)?;
    }
    Ok(())
}

/// True for any directory entry at `path`, including dangling symlinks.
pub(crate) fn entry_exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to stat {}", path.display())),
    }
}

/// Moves every entry of `src` into `dst`, leaving `src` empty. Entries named
/// in `skip` stay where they are. Refuses to overwrite existing entries.
pub(crate) fn move_entries(src: &Path, dst: &Path, skip: &[&str]) -> Result<Vec<OsString>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry.with_context(|| format!("failed to read {}", src.display()))?;
        let name = entry.file_name();
        if skip.iter().any(|skipped| name.as_os_str() == OsStr::new(skipped)) {
            continue;
        }
        names.push(name);
    }
    names.sort();

    for name in &names {
        let from = src.join(name);
        let to = dst.join(name);
        if entry_exists(&to)? {
            return Err(anyhow!(
                "refusing to overwrite existing entry {} while moving {}",
                to.display(),
                from.display()
            ));
        }
        move_dir_or_copy(&from, &to)?;
    }
    Ok(names)
}

fn move_dir_or_copy(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            let metadata = fs::symlink_metadata(src)
                .with_context(|| format!("failed to stat {}", src.display()))?;
            if metadata.is_dir() {
                copy_dir_recursive(src, dst)?;
                fs::remove_dir_all(src)
                    .with_context(|| format!("failed to remove moved dir: {}", src.display()))?;
            } else {
                copy_entry(src, dst, &metadata).with_context(|| {
                    format!(
                        "failed to move {} to {} (rename failed: {rename_err})",
                        src.display(),
                        dst.display()
                    )
                })?;
                fs::remove_file(src)
                    .with_context(|| format!("failed to remove moved file: {}", src.display()))?;
            }
            Ok(())
        }
    }
}

pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)
            .with_context(|| format!("failed to stat {}", src_path.display()))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }
        copy_entry(&src_path, &dst_path, &metadata)?;
    }
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path, metadata: &fs::Metadata) -> Result<()> {
    #[cfg(unix)]
    {
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(src)
                .with_context(|| format!("failed to read symlink {}", src.display()))?;
            std::os::unix::fs::symlink(&target, dst).with_context(|| {
                format!(
                    "failed to create symlink {} -> {}",
                    dst.display(),
                    target.display()
                )
            })?;
            return Ok(());
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}
