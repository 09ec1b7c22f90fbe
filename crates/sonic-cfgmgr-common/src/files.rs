//! Small state-file helpers shared by the daemons and their hook binaries.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{CfgMgrError, CfgMgrResult};

/// Default mode for replaced files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Replaces the contents of `path` with `data`.
///
/// The data is written to a temporary file in the same directory and then
/// renamed over `path`, so concurrent readers see either the old or the new
/// content and never a partial write.
pub fn replace_file(path: &Path, data: &str, mode: u32) -> CfgMgrResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CfgMgrError::file(dir, e))?;
    tmp.write_all(data.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| CfgMgrError::file(tmp.path(), e))?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))
        .map_err(|e| CfgMgrError::file(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| CfgMgrError::file(path, e.error))?;

    Ok(())
}

/// Reads a small value file, returning `None` if it is missing or blank.
pub fn read_value(path: &Path) -> CfgMgrResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let value = content.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CfgMgrError::file(path, e)),
    }
}
