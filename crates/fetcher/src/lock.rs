//! Single-instance run lock.
//!
//! The lock file holds the RFC 3339 start time of the running instance. A
//! lock older than `lock_hours` is considered stale and broken; a younger
//! one aborts this run. The lock is removed on release and, as a backstop,
//! on drop.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

use ff_domain::error::{Error, Result};

pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    pub fn acquire(path: PathBuf, lock_hours: i64) -> Result<Self> {
        if path.exists() {
            tracing::info!(path = %path.display(), "lock file exists");
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::Lock(format!("cannot read lock file age: {e}")))?;
            let locked_at = DateTime::parse_from_rfc3339(raw.trim())
                .map_err(|e| Error::Lock(format!("cannot read lock file age: {e}")))?
                .with_timezone(&Utc);
            let age = Utc::now() - locked_at;
            if age >= Duration::hours(lock_hours) {
                std::fs::remove_file(&path)?;
                tracing::info!("lock file has expired, removed");
            } else {
                tracing::info!(
                    age_minutes = age.num_minutes(),
                    lock_hours,
                    "lock file age below lock-hours"
                );
                return Err(Error::Lock(format!(
                    "another run locked {} minutes ago",
                    age.num_minutes()
                )));
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Utc::now().to_rfc3339())?;
        Ok(Self { path, released: false })
    }

    pub fn release(mut self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        self.released = true;
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "could not remove lock file");
            }
        }
    }
}
