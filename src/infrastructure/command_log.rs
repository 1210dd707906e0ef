use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const COMMAND_LOG_FILE: &str = "commands.log";

/// Append-only JSON-lines record of planner commands. Every entry is also
/// forwarded to the `log` facade so the host's logger sees it.
#[derive(Debug)]
pub struct CommandLog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl CommandLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join(COMMAND_LOG_FILE),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, command: &str, message: &str) {
        log::info!("{command}: {message}");
        self.append("info", command, message);
    }

    pub fn error(&self, command: &str, message: &str) {
        log::error!("{command}: {message}");
        self.append("error", command, message);
    }

    fn append(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{payload}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let log = CommandLog::new(dir.path());
        log.info("move_block", "moved block_id=blk-1");
        log.error("persist_blocks", "disk full");

        let raw = fs::read_to_string(log.path()).expect("read log");
        let entries = raw
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("valid json line"))
            .collect::<Vec<_>>();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["command"], "move_block");
        assert_eq!(entries[0]["level"], "info");
        assert_eq!(entries[1]["level"], "error");
        assert!(entries[1]["timestamp"].as_str().is_some());
    }
}
