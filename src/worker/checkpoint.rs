//! Checkpoint marker files, written before every backend call so progress survives
//! a backend outage. Writes are atomic: content lands in a sibling temp file
//! first, then is renamed into place, so a crash mid-write never leaves a
//! half-written checkpoint.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Checkpoint<'a> {
    pub event: &'a str,
    pub timestamp: String,
    pub packet_id: i64,
    pub packet_name: &'a str,
    pub tasks_completed: i64,
    pub tasks_total: i64,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

pub fn checkpoint_path(worktree: &Path, packet_id: i64, packet_name: &str) -> PathBuf {
    worktree
        .join(".spellbook")
        .join("checkpoints")
        .join(format!("packet-{packet_id}-{packet_name}.json"))
}

/// Serializes `checkpoint` and writes it atomically to `path`.
pub fn write_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    let parent = path
        .parent()
        .context("checkpoint path has no parent directory")?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create checkpoint directory {}", parent.display()))?;

    let content = serde_json::to_string_pretty(checkpoint).context("failed to serialize checkpoint")?;
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("checkpoint")
    ));
    std::fs::write(&tmp_path, content)
        .with_context(|| format!("failed to write checkpoint temp file {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to install checkpoint {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn checkpoint_path_matches_expected_layout() {
        let path = checkpoint_path(Path::new("/tmp/wt"), 3, "core-api");
        assert_eq!(
            path,
            PathBuf::from("/tmp/wt/.spellbook/checkpoints/packet-3-core-api.json")
        );
    }

    #[test]
    fn write_checkpoint_creates_parent_dirs_and_is_readable() {
        let dir = tempdir().unwrap();
        let path = checkpoint_path(dir.path(), 1, "core-api");
        let checkpoint = Checkpoint {
            event: "registered",
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            packet_id: 1,
            packet_name: "core-api",
            tasks_completed: 0,
            tasks_total: 5,
            data: serde_json::json!({}),
        };

        write_checkpoint(&path, &checkpoint).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["event"], "registered");
        assert_eq!(parsed["tasks_total"], 5);
    }

    #[test]
    fn write_checkpoint_overwrites_previous_content() {
        let dir = tempdir().unwrap();
        let path = checkpoint_path(dir.path(), 1, "core-api");

        for (event, completed) in [("registered", 0), ("progress", 1)] {
            let checkpoint = Checkpoint {
                event,
                timestamp: "2026-01-01T00:00:00Z".to_string(),
                packet_id: 1,
                packet_name: "core-api",
                tasks_completed: completed,
                tasks_total: 5,
                data: serde_json::json!({}),
            };
            write_checkpoint(&path, &checkpoint).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["event"], "progress");
        assert_eq!(parsed["tasks_completed"], 1);
    }
}
