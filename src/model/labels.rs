//! Ordered class-name lists.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Accepted label file layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    /// `["tench", "goldfish", ...]`
    List(Vec<String>),
    /// `{"0": "tench", ...}` or `{"0": ["n01440764", "tench"], ...}`
    Index(BTreeMap<String, LabelEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelEntry {
    Name(String),
    Pair(String, String),
}

impl LabelEntry {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) | Self::Pair(_, name) => name,
        }
    }
}

/// Class names indexed by the classifier's output position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    /// Read labels from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let labels = Self::parse(&json, path)?;

        tracing::debug!("Loaded {} labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    /// Parse labels from JSON text.
    ///
    /// Errors name the source as `<inline>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, or if an index map has
    /// non-numeric keys or gaps.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::parse(json, Path::new("<inline>"))
    }

    fn parse(json: &str, path: &Path) -> Result<Self> {
        let file = serde_json::from_str::<LabelFile>(json).map_err(|source| Error::LabelParse {
            path: path.to_path_buf(),
            source,
        })?;

        match file {
            LabelFile::List(names) => Ok(Self { names }),
            LabelFile::Index(map) => Self::from_index_map(map, path),
        }
    }

    fn from_index_map(map: BTreeMap<String, LabelEntry>, path: &Path) -> Result<Self> {
        let mut indexed = Vec::with_capacity(map.len());
        for (key, entry) in map {
            let index = key.trim().parse::<usize>().map_err(|_| Error::LabelLayout {
                path: path.to_path_buf(),
                reason: format!("key {key:?} is not a class index"),
            })?;
            indexed.push((index, entry.into_name()));
        }

        // BTreeMap orders keys as strings ("10" < "2")
        indexed.sort_unstable_by_key(|(index, _)| *index);

        let mut names = Vec::with_capacity(indexed.len());
        for (position, (index, name)) in indexed.into_iter().enumerate() {
            if index != position {
                return Err(Error::LabelLayout {
                    path: path.to_path_buf(),
                    reason: format!("missing class index {position}"),
                });
            }
            names.push(name);
        }

        Ok(Self { names })
    }

    /// Name of class `index`, if known.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for Labels {
    fn from(names: Vec<String>) -> Self {
        Self { names }
    }
}
