//! The document loader boundary.
//!
//! Raw extraction is a collaborator of the pipeline, not part of it: anything that
//! implements [`DocumentLoader`] can feed ingestion. [`TextLoader`] is the bundled
//! implementation and reads plain text, Markdown, HTML and the text layer of PDFs.

use crate::document::Document;
use crate::error::LoadError;
use ignore::WalkBuilder;
use regex::Regex;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
        .expect("valid script/style pattern")
});
static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment pattern"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Formats a document may be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Html,
    Pdf,
}

impl DocumentFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        extension.parse()
    }
}

impl FromStr for DocumentFormat {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_lowercase().as_str() {
            "txt" | "text" | "plain" | "text/plain" => Ok(Self::PlainText),
            "md" | "markdown" | "text/markdown" => Ok(Self::Markdown),
            "html" | "htm" | "text/html" => Ok(Self::Html),
            "pdf" | "application/pdf" => Ok(Self::Pdf),
            other => Err(LoadError::UnsupportedFormat {
                format: if other.is_empty() {
                    "<none>".to_string()
                } else {
                    other.to_string()
                },
            }),
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentFormat::PlainText => write!(f, "text"),
            DocumentFormat::Markdown => write!(f, "markdown"),
            DocumentFormat::Html => write!(f, "html"),
            DocumentFormat::Pdf => write!(f, "pdf"),
        }
    }
}

/// Turns raw bytes of a declared format into plain text.
pub trait DocumentLoader: Send + Sync {
    /// Extract plain text from `bytes`.
    fn extract(
        &self,
        source_id: &str,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<String, LoadError>;

    /// Extract and wrap the text as a [`Document`], rejecting documents with no
    /// readable text.
    fn load(
        &self,
        source_id: &str,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<Document, LoadError> {
        let text = self.extract(source_id, bytes, format)?;
        if text.trim().is_empty() {
            return Err(LoadError::Empty {
                source_id: source_id.to_string(),
            });
        }
        Ok(Document::new(source_id, text))
    }

    /// Read a file from disk, inferring its format from the extension. The file
    /// name becomes the document's source identifier.
    fn load_path(&self, path: &Path) -> Result<Document, LoadError> {
        self.load_path_as(path, &file_source_id(path))
    }

    /// Read a file from disk under an explicit source identifier.
    fn load_path_as(&self, path: &Path, source_id: &str) -> Result<Document, LoadError> {
        let format = DocumentFormat::from_path(path)?;
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load(source_id, &bytes, format)
    }
}

/// A file found on disk and the source identifier it is indexed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source_id: String,
}

/// The files to load for `path`.
///
/// A file is returned as is, identified by its file name, and left for the
/// loader to accept or reject. A directory is walked in path order, honouring
/// `.gitignore` and skipping hidden entries; only files of a supported format
/// are kept, identified by their path relative to the directory.
pub fn expand_path(path: &Path) -> Vec<Result<SourceFile, LoadError>> {
    if !path.is_dir() {
        return vec![Ok(SourceFile {
            path: path.to_path_buf(),
            source_id: file_source_id(path),
        })];
    }

    let mut files = Vec::new();
    let walker = WalkBuilder::new(path)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();
    for result in walker {
        match result {
            Ok(entry) => {
                let is_file = entry.file_type().is_some_and(|t| t.is_file());
                if !is_file || DocumentFormat::from_path(entry.path()).is_err() {
                    continue;
                }
                let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
                let source_id = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(Ok(SourceFile {
                    path: entry.into_path(),
                    source_id,
                }));
            }
            Err(e) => {
                let message = e.to_string();
                files.push(Err(LoadError::Io {
                    path: path.to_path_buf(),
                    source: e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other(message)),
                }));
            }
        }
    }
    files
}

fn file_source_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Bundled loader for text, Markdown, HTML and PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn extract(
        &self,
        source_id: &str,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<String, LoadError> {
        if format == DocumentFormat::Pdf {
            return Ok(normalize_whitespace(&pdf_to_text(source_id, bytes)?));
        }

        let raw = std::str::from_utf8(bytes)
            .map_err(|e| LoadError::parse(source_id, format!("invalid UTF-8: {e}")))?;
        let text = match format {
            DocumentFormat::Html => html_to_text(raw),
            _ => raw.to_string(),
        };
        Ok(normalize_whitespace(&text))
    }
}

/// Extract the text layer of a PDF. Scanned pages without one yield nothing.
pub fn pdf_to_text(source_id: &str, bytes: &[u8]) -> Result<String, LoadError> {
    // pdf-extract panics on some malformed files instead of returning an error.
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(LoadError::parse(source_id, format!("unreadable PDF: {e}"))),
        Err(_) => Err(LoadError::parse(source_id, "unreadable PDF")),
    }
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Strip markup from an HTML document, keeping only its visible text.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_comments = HTML_COMMENT.replace_all(&without_scripts, " ");
    let without_tags = HTML_TAG.replace_all(&without_comments, " ");
    decode_entities(&without_tags)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
