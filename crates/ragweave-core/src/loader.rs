//! File loaders.
//!
//! A [`Loader`] reads one file and returns normalised [`TextDocument`]s
//! carrying `source`, `file_name` and `file_type` metadata.
//! [`LoaderFactory::select`] picks the loader by lowercase extension:
//!
//! | Extension | Loader |
//! |-----------|--------|
//! | `.txt` | [`TextLoader`] |
//! | `.md`, `.markdown` | [`MarkdownLoader`] (adds `format = "markdown"`) |
//! | `.pdf` | fails with [`Error::Unsupported`] |
//! | anything else | [`TextLoader`] |

use async_trait::async_trait;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{Metadata, TextDocument};

#[async_trait]
pub trait Loader: Send + Sync {
    /// Read `path` into one or more documents.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the path does not exist.
    /// - [`Error::Empty`] if the file has zero bytes.
    async fn load(&self, path: &Path) -> Result<Vec<TextDocument>>;
}

/// Lowercase extension with its leading dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Read a file, distinguishing missing and empty files.
async fn read_file(path: &Path) -> Result<String> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("file {}", path.display())));
        }
        Err(e) => return Err(Error::upstream(format!("read {}: {e}", path.display()))),
    };
    if bytes.is_empty() {
        return Err(Error::Empty(format!("file {}", path.display())));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn base_metadata(path: &Path) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), path.display().to_string().into());
    metadata.insert(
        "file_name".into(),
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
            .into(),
    );
    metadata.insert("file_type".into(), extension_of(path).into());
    metadata
}

/// Plain text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

#[async_trait]
impl Loader for TextLoader {
    async fn load(&self, path: &Path) -> Result<Vec<TextDocument>> {
        let content = read_file(path).await?;
        Ok(vec![TextDocument {
            content,
            metadata: base_metadata(path),
        }])
    }
}

/// Markdown files; the body is kept verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownLoader;

#[async_trait]
impl Loader for MarkdownLoader {
    async fn load(&self, path: &Path) -> Result<Vec<TextDocument>> {
        let content = read_file(path).await?;
        let mut metadata = base_metadata(path);
        metadata.insert("format".into(), "markdown".into());
        Ok(vec![TextDocument { content, metadata }])
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoaderFactory;

impl LoaderFactory {
    pub fn new() -> Self {
        Self
    }

    /// Choose a loader for `path` by its lowercase extension.
    pub fn select(&self, path: &Path) -> Result<Box<dyn Loader>> {
        match extension_of(path).as_str() {
            ".txt" => Ok(Box::new(TextLoader)),
            ".md" | ".markdown" => Ok(Box::new(MarkdownLoader)),
            ".pdf" => Err(Error::Unsupported(format!(
                "no PDF loader for {}",
                path.display()
            ))),
            _ => Ok(Box::new(TextLoader)),
        }
    }
}
