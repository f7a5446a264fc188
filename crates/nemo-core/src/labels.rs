//! Label vocabulary: class directory name -> dense class index

use crate::error::{NemoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Mapping from class name to index, built once from the training split
/// and shared by every other split and by inference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelVocabulary {
    labels: BTreeMap<String, usize>,
}

impl LabelVocabulary {
    /// Build from class names; indices follow the sorted order of the names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();

        let labels = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name, index))
            .collect();

        Self { labels }
    }

    /// Build from the immediate subdirectories of `dir`
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| NemoError::io(dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| NemoError::io(dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        tracing::debug!("Found {} label directories in {:?}", names.len(), dir);
        Ok(Self::from_names(names))
    }

    /// Read a vocabulary previously written with [`LabelVocabulary::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| NemoError::io(path, e))?;
        let vocabulary: Self = serde_json::from_str(&text)?;
        vocabulary.check_dense()?;
        Ok(vocabulary)
    }

    /// Write the whole vocabulary as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| NemoError::io(path, e))
    }

    /// Index of `label`; `path` is only used to report a mismatch
    pub fn index(&self, label: &str, path: &Path) -> Result<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| NemoError::LabelMismatch {
                label: label.to_string(),
                path: path.to_path_buf(),
            })
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    /// Class name for an index
    pub fn name(&self, index: usize) -> Option<&str> {
        self.labels
            .iter()
            .find(|(_, i)| **i == index)
            .map(|(name, _)| name.as_str())
    }

    /// Class names ordered by index
    pub fn names(&self) -> Vec<&str> {
        let mut pairs: Vec<(&str, usize)> =
            self.labels.iter().map(|(n, i)| (n.as_str(), *i)).collect();
        pairs.sort_by_key(|(_, i)| *i);
        pairs.into_iter().map(|(n, _)| n).collect()
    }

    /// One-hot encoding of `index` over the vocabulary
    pub fn one_hot(&self, index: usize) -> Vec<f32> {
        let mut encoded = vec![0.0; self.len()];
        if let Some(slot) = encoded.get_mut(index) {
            *slot = 1.0;
        }
        encoded
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    // Hand-edited files must still map onto 0..len
    fn check_dense(&self) -> Result<()> {
        let mut indices: Vec<usize> = self.labels.values().copied().collect();
        indices.sort_unstable();
        if indices.iter().enumerate().any(|(expected, &i)| expected != i) {
            return Err(NemoError::Config(format!(
                "label indices are not dense: {:?}",
                indices
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_names_sorted() {
        let vocab = LabelVocabulary::from_names(["catB", "catA"]);
        assert_eq!(vocab.get("catA"), Some(0));
        assert_eq!(vocab.get("catB"), Some(1));
        assert_eq!(vocab.names(), vec!["catA", "catB"]);
    }

    #[test]
    fn test_index_mismatch() {
        let vocab = LabelVocabulary::from_names(["good", "bad"]);
        let err = vocab
            .index("ugly", Path::new("valid/ugly/x.png"))
            .unwrap_err();
        assert!(matches!(err, NemoError::LabelMismatch { ref label, .. } if label == "ugly"));
    }

    #[test]
    fn test_one_hot() {
        let vocab = LabelVocabulary::from_names(["a", "b", "c"]);
        assert_eq!(vocab.one_hot(1), vec![0.0, 1.0, 0.0]);
        assert_eq!(vocab.name(2), Some("c"));
    }

    #[test]
    fn test_load_rejects_sparse_indices() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| NemoError::io("tmp", e))?;
        let path = dir.path().join("labels.json");
        fs::write(&path, r#"{"a": 0, "b": 5}"#).map_err(|e| NemoError::io(&path, e))?;

        assert!(matches!(
            LabelVocabulary::load(&path),
            Err(NemoError::Config(_))
        ));
        Ok(())
    }
}
