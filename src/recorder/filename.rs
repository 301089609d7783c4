//! Output file allocation
//!
//! Recordings are named after their creation time, to the millisecond,
//! optionally followed by the producer's label. Files are created with
//! `create_new` so two recorders starting in the same millisecond never
//! share a file; the loser moves on to the next numbered candidate.

use crate::error::{RecorderError, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Candidates tried per file: the bare stem, then `-01` to `-99`.
pub const MAX_CANDIDATES: usize = 100;

#[cfg(windows)]
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3f";
#[cfg(not(windows))]
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub fn filename_stem(now: DateTime<Local>, label: &str) -> String {
    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    if label.is_empty() {
        timestamp
    } else {
        format!("{}-{}", timestamp, label)
    }
}

/// Create `<stem>.webm`, or the first free `<stem>-NN.webm`.
pub fn create_unique_file(directory: &Path, stem: &str) -> Result<(File, PathBuf)> {
    for counter in 0..MAX_CANDIDATES {
        let name = if counter == 0 {
            format!("{}.webm", stem)
        } else {
            format!("{}-{:02}.webm", stem, counter)
        };
        let path = directory.join(name);

        match open_exclusive(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(RecorderError::CouldNotCreateFile)
}

/// Allocate a fresh output file for a recording starting now.
pub fn open_disk_file(directory: &Path, label: &str) -> Result<(File, PathBuf)> {
    create_unique_file(directory, &filename_stem(Local::now(), label))
}

fn open_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Create a room directory readable by the owner only.
pub fn create_room_directory(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}
