//! Crash-safe file replacement
//!
//! Writes go to a uniquely named temporary file next to the target, are
//! flushed to stable storage with owner-only permissions, and are then
//! renamed over the target. A reader sees either the old file or the new
//! one, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Owner read/write
pub const PRIVATE_FILE_MODE: u32 = 0o600;
/// Owner read/write/search
pub const PRIVATE_DIR_MODE: u32 = 0o700;

const CREATE_ATTEMPTS: u32 = 5;

/// Create `dir` (and parents) owner-only if it does not exist yet.
///
/// Existing directories keep their permissions.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
        fs::DirBuilder::new()
            .recursive(true)
            .mode(PRIVATE_DIR_MODE)
            .create(dir)?;
        // The builder mode is filtered through the umask.
        fs::set_permissions(dir, fs::Permissions::from_mode(PRIVATE_DIR_MODE))?;
    }
    #[cfg(not(unix))]
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Atomically replace `path` with `contents` (mode 0600).
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    StagedWrite::stage(path, contents)?.commit()
}

/// A fully written temporary file waiting to be renamed over its target
///
/// Dropping a staged write without committing removes the temporary file
/// and leaves the target untouched.
#[derive(Debug)]
pub struct StagedWrite {
    tmp_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Write `contents` to a temporary sibling of `path` and sync it
    pub fn stage(path: &Path, contents: &[u8]) -> io::Result<Self> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no parent directory", path.display()),
            )
        })?;
        let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no valid file name", path.display()),
            )
        })?;
        ensure_private_dir(parent)?;

        let (mut file, tmp_path) = create_temp(parent, file_name)?;
        let staged = Self {
            tmp_path,
            target: path.to_path_buf(),
            committed: false,
        };

        file.write_all(contents)?;
        file.flush()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(
                &staged.tmp_path,
                fs::Permissions::from_mode(PRIVATE_FILE_MODE),
            )?;
        }
        file.sync_all()?;
        Ok(staged)
    }

    /// Path of the temporary file
    pub fn temp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Rename the temporary file over the target
    pub fn commit(mut self) -> io::Result<()> {
        if let Err(err) = fs::rename(&self.tmp_path, &self.target) {
            #[cfg(windows)]
            {
                if self.target.exists() {
                    let _ = fs::remove_file(&self.target);
                }
                if fs::rename(&self.tmp_path, &self.target).is_ok() {
                    self.committed = true;
                    return Ok(());
                }
            }
            return Err(err);
        }
        self.committed = true;
        sync_parent(&self.target);
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn create_temp(parent: &Path, file_name: &str) -> io::Result<(File, PathBuf)> {
    let pid = std::process::id();
    let mut attempt = 0u32;
    loop {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let tmp_path = parent.join(format!(".{file_name}.tmp-{pid}-{nanos}-{attempt}"));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(PRIVATE_FILE_MODE);
        }

        match options.open(&tmp_path) {
            Ok(file) => return Ok((file, tmp_path)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempt + 1 < CREATE_ATTEMPTS => {
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// Persist the rename itself; best effort since not every platform allows
// opening a directory.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
