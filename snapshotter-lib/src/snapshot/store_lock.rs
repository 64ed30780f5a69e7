use crate::Result;
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "     store";

/// Name of the advisory lock file placed in the output directory.
pub const LOCK_FILE_NAME: &str = ".snapshotter.lock";

/// Holds the output directory for one run.
///
/// While held, the lock file contains the PID of the owning process. The file is emptied
/// and unlocked on drop.
#[derive(Debug)]
pub struct OutputLockGuard {
    file: File,
    path: PathBuf,
}

impl OutputLockGuard {
    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            log::debug!(target: LOG_TARGET, "Could not clear '{}': {e:#}", self.path.display());
        }

        if let Err(e) = self.file.unlock() {
            log::warn!(target: LOG_TARGET, "Could not unlock output directory '{}': {e:#}", self.path.display());
        }
    }
}

/// PID recorded in the lock file of `dir`, if a run holds or last crashed holding it.
#[must_use]
pub fn lock_holder(dir: &Path) -> Option<u32> {
    fs::read_to_string(dir.join(LOCK_FILE_NAME)).ok()?.trim().parse().ok()
}

/// Take the whole-run advisory lock for an output directory, waiting for other processes to finish.
///
/// The directory is created if needed. Once the lock is held, the current PID is written
/// to the lock file so that a waiting run can report who it is waiting for.
pub async fn acquire_output_lock(dir: &Path) -> Result<OutputLockGuard> {
    fs::create_dir_all(dir).into_app_err_with(|| format!("creating output directory '{}'", dir.display()))?;
    let lock_path = dir.join(LOCK_FILE_NAME);

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .into_app_err_with(|| format!("opening output lock '{LOCK_FILE_NAME}' in '{}'", dir.display()))?;

    if let Some(pid) = lock_holder(dir) {
        log::info!(target: LOG_TARGET, "Output directory '{}' may be in use by process {pid}, waiting for it", dir.display());
    }

    // Blocks until any other holder exits
    let path = lock_path.clone();
    let mut file = tokio::task::spawn_blocking(move || {
        file.lock_exclusive()
            .into_app_err_with(|| format!("acquiring exclusive lock on '{}'", path.display()))?;
        Ok::<_, ohno::AppError>(file)
    })
    .await
    .into_app_err("lock task panicked")??;

    record_pid(&mut file).into_app_err_with(|| format!("writing owner of output lock '{}'", lock_path.display()))?;
    log::debug!(target: LOG_TARGET, "Acquired output lock at '{}'", lock_path.display());

    Ok(OutputLockGuard { file, path: lock_path })
}

fn record_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}
