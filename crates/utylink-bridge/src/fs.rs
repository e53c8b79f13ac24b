//! [`LocalBridge`] over a plain directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use utylink_protocol::SlotId;

use crate::artifact::{
    Artifact, CHECK_LOG, INBOUND_DEATH, ItemArtifact, OUTBOUND_DEATH, PeerPosition, SCOUT_REQUEST,
    SELF_POSITION, hint_file_name, parse_id_lines,
};
use crate::{BridgeError, LocalBridge, Scan};

/// The interface directory on disk.
///
/// Only the top level is looked at. Writes are plain `fs::write` calls;
/// the game may observe a file mid-write and is expected to retry.
#[derive(Debug, Clone)]
pub struct FsBridge {
    root: PathBuf,
}

impl FsBridge {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), BridgeError> {
        let path = self.path(name);
        fs::write(&path, contents).map_err(|e| BridgeError::io("write", path, e))
    }

    /// Removes every top-level file whose classification passes `filter`.
    fn remove_matching(&self, filter: impl Fn(&Artifact) -> bool) -> Result<usize, BridgeError> {
        let mut removed = 0;
        for (name, artifact) in self.list()? {
            if filter(&artifact) && remove_if_exists(&self.path(&name))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Lists top-level files with their classification.
    fn list(&self) -> Result<Vec<(String, Artifact)>, BridgeError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BridgeError::io("list", &self.root, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BridgeError::io("list", &self.root, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let artifact = Artifact::classify(&name);
            files.push((name, artifact));
        }
        Ok(files)
    }
}

impl LocalBridge for FsBridge {
    fn root(&self) -> &Path {
        &self.root
    }

    fn set_root(&mut self, root: PathBuf) {
        tracing::info!(from = %self.root.display(), to = %root.display(), "interface directory moved");
        self.root = root;
    }

    fn ensure_root(&self) -> Result<(), BridgeError> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(BridgeError::InvalidRoot(self.root.clone()));
        }
        fs::create_dir_all(&self.root).map_err(|e| BridgeError::io("create", &self.root, e))
    }

    fn scan(&self) -> Result<Scan, BridgeError> {
        let mut scan = Scan::default();
        for (_, artifact) in self.list()? {
            match artifact {
                Artifact::OutboundDeath => scan.outbound_death = true,
                Artifact::ScoutRequest => scan.scout_request = true,
                Artifact::CheckLog => scan.check_log = true,
                Artifact::SelfPosition => scan.self_position = true,
                Artifact::PeerPosition => scan.peer_positions += 1,
                Artifact::Victory(stem) => scan.victories.push(stem),
                Artifact::Item => scan.items += 1,
                _ => {}
            }
        }
        scan.victories.sort();
        Ok(scan)
    }

    fn purge_transient(&self) -> Result<usize, BridgeError> {
        let removed = self.remove_matching(Artifact::is_transient)?;
        if removed > 0 {
            tracing::debug!(removed, root = %self.root.display(), "purged transient artifacts");
        }
        Ok(removed)
    }

    fn clear_items(&self) -> Result<usize, BridgeError> {
        self.remove_matching(|a| *a == Artifact::Item)
    }

    fn write_item(&self, item: &ItemArtifact) -> Result<(), BridgeError> {
        self.write(&item.file_name(), &item.value.to_string())
    }

    fn write_inbound_death(&self) -> Result<(), BridgeError> {
        self.write(INBOUND_DEATH, "")
    }

    fn take_outbound_death(&self) -> Result<bool, BridgeError> {
        remove_if_exists(&self.path(OUTBOUND_DEATH))
    }

    fn take_scout_request(&self) -> Result<Vec<i64>, BridgeError> {
        let path = self.path(SCOUT_REQUEST);
        let read = fs::read_to_string(&path);
        let removed = remove_if_exists(&path);
        let text = match read {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BridgeError::io("read", path, e)),
        };
        removed?;
        Ok(parse_id_lines(&path, &text))
    }

    fn read_check_log(&self) -> Result<Vec<i64>, BridgeError> {
        let path = self.path(CHECK_LOG);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(parse_id_lines(&path, &text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(BridgeError::io("read", path, e)),
        }
    }

    fn append_check_log(&self, ids: &[i64]) -> Result<(), BridgeError> {
        if ids.is_empty() {
            return Ok(());
        }
        let path = self.path(CHECK_LOG);
        let text: String = ids.iter().map(|id| format!("{id}\n")).collect();
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(text.as_bytes()))
            .map_err(|e| BridgeError::io("append", path, e))
    }

    fn write_hint(&self, local_location: i64, preview: &str) -> Result<(), BridgeError> {
        self.write(&hint_file_name(local_location), preview)
    }

    fn write_peer_position(&self, position: &PeerPosition) -> Result<(), BridgeError> {
        self.write(&position.file_name(), &position.to_text())
    }

    fn remove_peer_positions(&self) -> Result<usize, BridgeError> {
        self.remove_matching(|a| *a == Artifact::PeerPosition)
    }

    fn read_self_position(&self, player: SlotId) -> Result<Option<PeerPosition>, BridgeError> {
        let path = self.path(SELF_POSITION);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BridgeError::io("read", path, e)),
        };
        let position = PeerPosition::from_text(player, &text);
        if position.is_none() {
            tracing::warn!(file = %path.display(), "incomplete position file, skipping");
        }
        Ok(position)
    }
}

/// Deletes `path`, treating an already-missing file as success.
/// Returns whether a file was actually removed.
fn remove_if_exists(path: &Path) -> Result<bool, BridgeError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BridgeError::io("remove", path, e)),
    }
}
