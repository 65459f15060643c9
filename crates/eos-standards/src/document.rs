//! Documents and the document loader
//!
//! A [`Document`] is an immutable `(path, content)` pair. The loader either
//! wraps caller-provided pairs untouched, or reads files and directory trees
//! from disk.

use crate::error::LoadError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

/// A loaded standards document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    path: String,
    content: String,
}

impl Document {
    /// Create document from path identifier and raw content
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Path identifier
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw text content
    #[inline]
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Loads documents from pairs or from the filesystem
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    extensions: Vec<String>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self {
            extensions: vec!["md".to_string(), "markdown".to_string()],
        }
    }
}

impl DocumentLoader {
    /// Loader accepting `.md` and `.markdown` files
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the accepted extensions (without dot)
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Wrap `(path, content)` pairs as documents, in input order
    pub fn from_pairs<I, P, C>(pairs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(path, content)| Document::new(path, content))
            .collect()
    }

    /// Check if a file found during a directory walk should be loaded
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|known| known == ext))
    }

    /// Load files and directory trees
    ///
    /// Files named explicitly are loaded whatever their extension. Directories
    /// are walked recursively and only accepted extensions are kept. The result
    /// is sorted by path and free of duplicates.
    ///
    /// # Errors
    /// Returns `LoadError` if a path does not exist, cannot be read, or is not
    /// UTF-8.
    pub async fn load_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<Vec<Document>, LoadError> {
        let mut files = BTreeSet::new();

        for root in paths {
            let root = root.as_ref();
            let metadata = tokio::fs::metadata(root)
                .await
                .map_err(|e| LoadError::io_error(root, e))?;

            if metadata.is_dir() {
                for file in self.walk(root).await? {
                    files.insert(file);
                }
            } else {
                files.insert(root.to_path_buf());
            }
        }

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| LoadError::io_error(&path, e))?;
            let content =
                String::from_utf8(bytes).map_err(|_| LoadError::InvalidUtf8(path.clone()))?;
            documents.push(Document::new(path.display().to_string(), content));
        }

        tracing::debug!(count = documents.len(), "loaded standards documents");
        Ok(documents)
    }

    /// Collect accepted files below `root`
    async fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| LoadError::io_error(&dir, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| LoadError::io_error(&dir, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| LoadError::io_error(&path, e))?;

                if file_type.is_dir() {
                    let skipped = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                    if !skipped {
                        pending.push(path);
                    }
                } else if file_type.is_file() && self.accepts(&path) {
                    found.push(path);
                }
            }
        }

        Ok(found)
    }
}
