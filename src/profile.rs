//! Named field-value profiles persisted as JSON files
//!
//! Each profile `<name>` lives at `<dir>/<name>.json`. Saving the same name
//! again overwrites the previous file.

use crate::error::{Error, Result};
use crate::pdf::FieldValueMap;
use std::path::{Path, PathBuf};

const PROFILE_EXTENSION: &str = "json";

/// Directory-backed profile storage
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the profile directory if it does not exist
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Write `values` under `name` as pretty-printed JSON
    pub fn save(&self, name: &str, values: &FieldValueMap) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(values)?;
        std::fs::write(&path, json)?;
        tracing::debug!(profile = name, path = %path.display(), "profile saved");
        Ok(path)
    }

    /// Stored JSON text of a profile, exactly as on disk
    pub fn load_raw(&self, name: &str) -> Result<String> {
        let path = self.path_for(name)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::ProfileNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn load(&self, name: &str) -> Result<FieldValueMap> {
        let text = self.load_raw(name)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Profile names, sorted. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext == PROFILE_EXTENSION)
            })
            .filter_map(|path| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, PROFILE_EXTENSION)))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(Error::InvalidProfileName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Overlay `overrides` on a profile's values; overrides win on conflict.
pub fn merge_profile(profile: FieldValueMap, overrides: Option<FieldValueMap>) -> FieldValueMap {
    let mut merged = profile;
    if let Some(overrides) = overrides {
        merged.extend(overrides);
    }
    merged
}
