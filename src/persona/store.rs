use super::StyleProfile;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Read-only access to the precomputed style profile JSON.
///
/// The profile is produced by an offline extraction pass over the user's chat
/// exports; this store never writes it. A missing or unreadable file degrades
/// to the default (neutral) profile, matching the behavior of the original
/// assistant when no profile had been extracted yet.
pub struct StyleProfileStore {
    path: PathBuf,
}

impl StyleProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the profile, falling back to the neutral profile when the file is
    /// absent. A present-but-corrupt file is an error; silently ignoring it
    /// would mask a broken extraction run.
    pub fn load(&self) -> Result<StyleProfile> {
        if !self.path.exists() {
            tracing::warn!(
                path = %self.path.display(),
                "Style profile not found, using neutral defaults"
            );
            return Ok(StyleProfile::neutral());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read style profile {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse style profile {}", self.path.display()))
    }
}
