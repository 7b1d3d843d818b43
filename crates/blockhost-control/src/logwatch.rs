//! Follow a log file for confirmation lines.
//!
//! A watch attaches at the current end of the file, so only lines written
//! after attaching are considered. A log that is truncated or rotated while
//! watched is read again from the start.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::Instant;
use tracing::{debug, warn};

/// How often the log is re-read while waiting.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Engine log line confirming autosave was already on.
pub const AUTOSAVE_ALREADY_ON: &str = "INFO]: Saving is already turned on";
/// Engine log line confirming autosave was just switched on.
pub const AUTOSAVE_TURNED_ON: &str = "INFO]: Turned on world auto-saving";
/// Engine log line confirming a world save.
pub const WORLD_SAVED: &str = "INFO]: Saved the world";

/// A tail on one log file.
#[derive(Debug)]
pub struct LogWatch {
    path: PathBuf,
    offset: u64,
    partial: String,
}

impl LogWatch {
    /// Attach at the current end of `path`. A missing file is watched from
    /// its first byte once it appears.
    pub async fn attach(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let offset = tokio::fs::metadata(&path).await.map_or(0, |m| m.len());
        Self {
            path,
            offset,
            partial: String::new(),
        }
    }

    /// The watched file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until a new line contains one of `patterns`.
    ///
    /// Returns the index of the matched pattern, or `None` if `window`
    /// elapsed or the log could not be read.
    pub async fn wait_for(&mut self, patterns: &[&str], window: Duration) -> Option<usize> {
        let deadline = Instant::now() + window;

        loop {
            match self.read_new_lines().await {
                Ok(lines) => {
                    for line in &lines {
                        if let Some(index) = patterns.iter().position(|p| line.contains(p)) {
                            debug!(path = %self.path.display(), line = %line, "Matched log line");
                            return Some(index);
                        }
                    }
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Cannot read log");
                    return None;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn read_new_lines(&mut self) -> std::io::Result<Vec<String>> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            debug!(path = %self.path.display(), "Log truncated, rereading");
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        file.take(len - self.offset).read_to_end(&mut buf).await?;
        self.offset += buf.len() as u64;

        self.partial.push_str(&String::from_utf8_lossy(&buf));
        let mut lines: Vec<String> = self.partial.split('\n').map(str::to_string).collect();
        self.partial = lines.pop().unwrap_or_default();
        Ok(lines)
    }
}
