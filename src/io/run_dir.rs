//! Files shared with the host inside a job's output directory.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

pub const PROGRESS_FILE: &str = "stdout.txt";
pub const LOG_FILE: &str = "separation_log.txt";
pub const DONE_FILE: &str = "done.txt";

/// Outcome written to `done.txt` once the worker is finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Done,
    Error,
}

impl Marker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::Done => "DONE",
            Marker::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    /// Create `root` if needed and clear a stale completion marker.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let done = root.join(DONE_FILE);
        if done.exists() {
            fs::remove_file(&done)?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join(PROGRESS_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn done_path(&self) -> PathBuf {
        self.root.join(DONE_FILE)
    }

    /// Truncated diagnostic log file for this run.
    pub fn open_log(&self) -> io::Result<File> {
        File::create(self.log_path())
    }

    /// Best-effort; a host that cannot read the marker falls back to the exit code.
    pub fn write_marker(&self, marker: Marker) {
        if let Err(e) = fs::write(self.done_path(), format!("{}\n", marker.as_str())) {
            log::warn!("could not write {}: {}", self.done_path().display(), e);
        }
    }
}
