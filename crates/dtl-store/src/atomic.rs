//! Atomic file publishing
//!
//! Every persistent artifact reaches disk through one of two primitives:
//!
//! - [`write_exclusive`]: write-once. Data is staged in a temp file in the
//!   target directory, fsynced, then published under the final name only if
//!   that name is still free. Concurrent writers to the same path race on the
//!   publish step; exactly one wins and the rest see
//!   [`StoreError::FileExists`].
//! - [`write_replace`]: atomic overwrite for mutable snapshots such as
//!   prewrite tokens and queue state.

use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Hook run before anything touches disk; an `Err` aborts the write
pub type Validator<'a> = &'a dyn Fn(&Value) -> Result<(), String>;

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn stage(path: &Path, data: &[u8]) -> StoreResult<NamedTempFile> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut staged = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    staged
        .as_file_mut()
        .write_all(data)
        .map_err(|e| StoreError::io(staged.path(), e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| StoreError::io(staged.path(), e))?;
    Ok(staged)
}

/// Create-only fallback for filesystems where the no-clobber publish is
/// unsupported.
fn create_new_direct(path: &Path, data: &[u8]) -> StoreResult<()> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(StoreError::FileExists {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };
    file.write_all(data).map_err(|e| StoreError::io(path, e))?;
    file.sync_all().map_err(|e| StoreError::io(path, e))
}

/// Write `data` to `path` only if `path` does not exist yet
///
/// # Errors
/// - [`StoreError::FileExists`] if the path exists before or at publish time
/// - [`StoreError::Io`] on any filesystem failure
pub fn write_exclusive(path: &Path, data: &[u8]) -> StoreResult<()> {
    if path.exists() {
        return Err(StoreError::FileExists {
            path: path.to_path_buf(),
        });
    }

    let staged = stage(path, data)?;
    match staged.persist_noclobber(path) {
        Ok(_) => {
            tracing::debug!("Published {}", path.display());
            Ok(())
        }
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            tracing::debug!("Lost publish race for {}", path.display());
            Err(StoreError::FileExists {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            tracing::warn!(
                "No-clobber publish failed for {} ({}), falling back to exclusive create",
                path.display(),
                e.error
            );
            drop(e.file);
            create_new_direct(path, data)
        }
    }
}

/// Serialize `value` as pretty JSON and publish it write-once, running
/// `validator` first
///
/// # Errors
/// - [`StoreError::Validation`] if the validator rejects `value`
/// - any error from [`write_exclusive`]
pub fn write_json_exclusive(
    path: &Path,
    value: &Value,
    validator: Option<Validator<'_>>,
) -> StoreResult<()> {
    if path.exists() {
        return Err(StoreError::FileExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(validate) = validator {
        validate(value).map_err(|reason| StoreError::validation(path, reason))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    write_exclusive(path, &bytes)
}

/// Atomically replace `path` with `data`
///
/// # Errors
/// Returns [`StoreError::Io`] on any filesystem failure
pub fn write_replace(path: &Path, data: &[u8]) -> StoreResult<()> {
    let staged = stage(path, data)?;
    staged
        .persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

/// Move `from` to `to` without ever overwriting `to`
///
/// # Errors
/// - [`StoreError::FileExists`] if `to` already exists
/// - [`StoreError::NotFound`] if `from` is missing
/// - [`StoreError::Io`] on any other failure
pub fn move_noclobber(from: &Path, to: &Path) -> StoreResult<()> {
    if to.exists() {
        return Err(StoreError::FileExists {
            path: to.to_path_buf(),
        });
    }
    if let Some(dir) = to.parent() {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    }

    match fs::hard_link(from, to) {
        Ok(()) => match fs::remove_file(from) {
            // A concurrent cleanup already removed the source.
            Err(e) if e.kind() != ErrorKind::NotFound => Err(StoreError::io(from, e)),
            _ => Ok(()),
        },
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::FileExists {
            path: to.to_path_buf(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
            path: from.to_path_buf(),
        }),
        Err(_) => {
            // No hard links here: recheck, then plain rename.
            if to.exists() {
                return Err(StoreError::FileExists {
                    path: to.to_path_buf(),
                });
            }
            fs::rename(from, to).map_err(|e| StoreError::io(to, e))
        }
    }
}
