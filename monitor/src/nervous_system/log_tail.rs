use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::debug;

use crate::debug_log::{DebugLog, LogLevel};
use crate::error::Result;

const ERROR_MARKERS: [&str; 3] = ["ERROR", "Fatal error", "PHP Warning"];

/// Follows application logs and reports error lines appended since the last scan.
pub struct LogTailScanner {
    files: Vec<PathBuf>,
    offsets: HashMap<PathBuf, u64>,
}

impl LogTailScanner {
    /// Start following `files` from their current end, so old errors are not re-reported.
    pub fn new(files: Vec<PathBuf>) -> Self {
        let offsets = files
            .iter()
            .filter_map(|f| std::fs::metadata(f).ok().map(|m| (f.clone(), m.len())))
            .collect();
        Self { files, offsets }
    }

    /// Scan every followed file; returns the total number of new error lines.
    pub fn scan(&mut self, log: &DebugLog) -> Result<usize> {
        let mut total = 0;
        for path in self.files.clone() {
            let found = match self.scan_file(&path) {
                Ok(n) => n,
                Err(e) => {
                    debug!(file = %path.display(), "log tail skipped: {e}");
                    continue;
                }
            };
            if found > 0 {
                log.record(
                    LogLevel::Warning,
                    "New errors found in application log",
                    json!({ "new_errors": found, "source": path.display().to_string() }),
                );
            }
            total += found;
        }
        Ok(total)
    }

    fn scan_file(&mut self, path: &Path) -> Result<usize> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut offset = self.offsets.get(path).copied().unwrap_or(0);
        if len < offset {
            // Truncated or rotated.
            offset = 0;
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        file.take(len - offset).read_to_end(&mut buf)?;

        // Leave a trailing partial line for the next scan.
        let complete = buf.iter().rposition(|b| *b == b'\n').map(|i| i + 1).unwrap_or(0);
        let text = String::from_utf8_lossy(&buf[..complete]);
        let found = text
            .lines()
            .filter(|line| ERROR_MARKERS.iter().any(|m| line.contains(m)))
            .count();
        self.offsets.insert(path.to_path_buf(), offset + complete as u64);
        Ok(found)
    }
}
