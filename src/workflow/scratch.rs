use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
};

use tracing::warn;
use uuid::Uuid;

/// Per-request scratch directory under the upload root.
///
/// Every request gets its own subdirectory, so identically named uploads from
/// concurrent requests never meet on disk.
pub struct ScratchDir {
    path: PathBuf,
    used_names: HashSet<String>,
    removed: bool,
}

/// A file written into a [`ScratchDir`].
#[derive(Debug, Clone)]
pub struct ScratchFile {
    pub stored_name: String,
    pub path: PathBuf,
}

impl ScratchDir {
    pub async fn create(root: &Path) -> io::Result<Self> {
        let path = root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self {
            path,
            used_names: HashSet::new(),
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `content` under a sanitized, de-duplicated version of `original_name`.
    pub async fn save(&mut self, original_name: &str, content: &[u8]) -> io::Result<ScratchFile> {
        let stored_name = unique_name(sanitized_name(original_name), &mut self.used_names);
        let path = self.path.join(&stored_name);
        tokio::fs::write(&path, content).await?;
        Ok(ScratchFile { stored_name, path })
    }

    pub async fn remove(mut self) {
        self.removed = true;
        if let Err(err) = tokio::fs::remove_dir_all(&self.path).await {
            warn!(?err, path = %self.path.display(), "failed to remove scratch directory");
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

fn sanitized_name(original_name: &str) -> String {
    let sanitized = sanitize_filename::sanitize(original_name);
    if sanitized.trim().is_empty() {
        "documento".to_string()
    } else {
        sanitized
    }
}

fn unique_name(candidate: String, used: &mut HashSet<String>) -> String {
    if used.insert(candidate.clone()) {
        return candidate;
    }

    let (stem, extension) = split_name(&candidate);
    let mut counter = 1usize;
    loop {
        let attempt = if extension.is_empty() {
            format!("{stem}_{counter}")
        } else {
            format!("{stem}_{counter}.{extension}")
        };
        if used.insert(attempt.clone()) {
            return attempt;
        }
        counter += 1;
    }
}

fn split_name(name: &str) -> (String, String) {
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem.to_string(), extension.to_string()),
        _ => (name.to_string(), String::new()),
    }
}
