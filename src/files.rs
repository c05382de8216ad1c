//! Content-addressed store for files carried in the capture.
//!
//! Files are identified by a short prefix of their SHA-256. Duplicate
//! detection compares the full digest, so two different payloads that share
//! a prefix are both kept; the later one gets a longer identifier.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::format::{generate_tree, sha256_hex, SHORT_ID_LEN};

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub content: Vec<u8>,
    pub origin: String,
    pub id: String,
    digest: String,
}

impl StoredFile {
    pub fn size(&self) -> usize {
        self.content.len()
    }

    fn description(&self) -> String {
        format!(
            "Filename: {}\nHash: {}\nOrigin: {}\nSize: {}",
            self.name,
            self.id,
            self.origin,
            self.size()
        )
    }
}

/// Which stored files to write out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Nothing,
    All,
    Ids(Vec<String>),
}

#[derive(Debug, Default)]
pub struct FileStore {
    files: Vec<StoredFile>,
    not_found: Vec<String>,
    extracted: usize,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a payload. Empty payloads and exact duplicates are dropped.
    /// Returns the identifier of the new entry.
    pub fn register(&mut self, name: &str, content: Vec<u8>, origin: &str) -> Option<String> {
        if content.is_empty() {
            debug!("Avoided registering file from {} because it is empty", origin);
            return None;
        }

        let digest = sha256_hex(&content);
        if let Some(existing) = self.files.iter().find(|f| f.digest == digest) {
            debug!(
                "Avoided registering file from {} because it has the same content as {}",
                origin, existing.id
            );
            return None;
        }

        let mut len = SHORT_ID_LEN;
        while self.files.iter().any(|f| f.id == digest[..len]) {
            warn!(
                "Identifier {} is already taken by different content, using a longer one",
                &digest[..len]
            );
            len += 2;
        }

        let id = digest[..len].to_string();
        self.files.push(StoredFile {
            name: name.to_string(),
            content,
            origin: origin.to_string(),
            id: id.clone(),
            digest,
        });
        Some(id)
    }

    pub fn files(&self) -> &[StoredFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn extracted(&self) -> usize {
        self.extracted
    }

    pub fn not_found(&self) -> &[String] {
        &self.not_found
    }

    /// Writes the selected files (and a `.info` sidecar each) to `dir`.
    /// A failed write is logged and skipped.
    pub fn extract(&mut self, selection: &Selection, dir: &Path) {
        let targets: Vec<usize> = match selection {
            Selection::Nothing => return,
            Selection::All => (0..self.files.len()).collect(),
            Selection::Ids(ids) => {
                let mut targets = Vec::new();
                for id in ids {
                    match self.files.iter().position(|f| &f.id == id) {
                        Some(idx) => targets.push(idx),
                        None => self.not_found.push(id.clone()),
                    }
                }
                targets
            }
        };

        if targets.is_empty() {
            return;
        }

        if let Err(e) = fs::create_dir_all(dir) {
            warn!("Unable to create output directory {}: {}", dir.display(), e);
        }

        for idx in targets {
            if write_out(&self.files[idx], dir) {
                self.extracted += 1;
            }
        }
        info!("Extracted {} files to {}", self.extracted, dir.display());
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} files found in stream.\n{} files extracted from stream.\n",
            self.files.len(),
            self.extracted
        );

        if !self.files.is_empty() {
            let lines: Vec<String> = self
                .files
                .iter()
                .map(|f| {
                    let name = if f.name.is_empty() { "(no name found)" } else { f.name.as_str() };
                    format!("{}: {} ({}), {} bytes", f.id, name, f.origin, f.size())
                })
                .collect();
            summary.push_str("Found files:\n");
            summary.push_str(&generate_tree(&lines));
        }

        if !self.not_found.is_empty() {
            summary.push_str(&format!(
                "Unable to find requested file(s): {}\n",
                self.not_found.join(", ")
            ));
        }

        summary
    }
}

fn write_out(file: &StoredFile, dir: &Path) -> bool {
    let target = dir.join(&file.id);
    if let Err(e) = fs::write(&target, &file.content) {
        warn!("Unable to write file {}: {}", target.display(), e);
        return false;
    }

    let info = dir.join(format!("{}.info", file.id));
    if let Err(e) = fs::write(&info, file.description()) {
        warn!("Unable to write file {}: {}", info.display(), e);
        return false;
    }

    true
}
