//! Data model shared by the sync client, the caches and the durable index.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// One line of a content-addressed index file.
///
/// Wire form is `hash:type:id:subfileCount:sizeBytes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RemoteIndexEntry {
    pub hash: String,
    pub kind: String,
    pub id: String,
    pub subfile_count: u64,
    pub size_bytes: u64,
}

impl RemoteIndexEntry {
    /// Parse a single index line.
    ///
    /// Returns `None` unless the line has exactly five fields, non-empty `hash`
    /// and `id`, and numeric counts.
    pub fn parse_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.trim_end_matches('\r').split(':').collect();
        let [hash, kind, id, subfiles, size] = parts.as_slice() else {
            return None;
        };

        if hash.is_empty() || id.is_empty() {
            return None;
        }

        Some(Self {
            hash: (*hash).to_string(),
            kind: (*kind).to_string(),
            id: (*id).to_string(),
            subfile_count: subfiles.parse().ok()?,
            size_bytes: size.parse().ok()?,
        })
    }

    /// Whether this component is the document's metadata blob.
    pub fn is_metadata(&self) -> bool {
        self.id.ends_with(".metadata")
    }
}

/// Kind of item in the remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub enum DocType {
    #[serde(rename = "DocumentType")]
    Document,
    #[serde(rename = "CollectionType")]
    Collection,
}

impl DocType {
    /// Map the metadata `type` field; anything but `CollectionType` is a document.
    pub fn from_remote(value: &str) -> Self {
        if value == "CollectionType" { DocType::Collection } else { DocType::Document }
    }
}

/// A document or folder in the remote collection.
///
/// Identity is `id`. `hash` changes whenever the remote content changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Document {
    pub id: String,
    pub hash: String,
    pub name: String,
    pub doc_type: DocType,
    /// Parent folder id; empty string for the root, `trash` for trashed items.
    pub parent_id: String,
    pub deleted: bool,
    pub pinned: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub component_files: Vec<RemoteIndexEntry>,
    /// False when the document is archived to the cloud and not on the device.
    pub synced: bool,
}

impl Document {
    pub fn is_folder(&self) -> bool {
        self.doc_type == DocType::Collection
    }

    pub fn is_trashed(&self) -> bool {
        self.parent_id == "trash"
    }

    pub fn is_cloud_archived(&self) -> bool {
        !self.synced || self.is_trashed()
    }

    /// File type inferred from the visible name: `pdf`, `epub` or `notebook`.
    pub fn file_type(&self) -> &'static str {
        let name = self.name.to_lowercase();
        if name.ends_with(".pdf") {
            "pdf"
        } else if name.ends_with(".epub") {
            "epub"
        } else {
            "notebook"
        }
    }
}

/// Root of the remote collection, fetched atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSnapshot {
    pub root_hash: String,
    pub entries: Vec<RemoteIndexEntry>,
}

/// Category of a durable page row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    TypedText,
    Highlight,
    Ocr,
}

impl ContentType {
    /// Preview priority order.
    pub const PRIORITY: [ContentType; 3] = [ContentType::TypedText, ContentType::Highlight, ContentType::Ocr];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::TypedText => "typed_text",
            ContentType::Highlight => "highlight",
            ContentType::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "typed_text" => Ok(ContentType::TypedText),
            "highlight" => Ok(ContentType::Highlight),
            "ocr" => Ok(ContentType::Ocr),
            other => Err(Error::InvalidInput(format!("unknown content type: {other}"))),
        }
    }
}

/// Output of the external extraction/OCR collaborators for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExtractionResult {
    #[serde(default)]
    pub typed_text: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub handwritten_text: Vec<String>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub page_ids: Vec<String>,
    #[serde(default)]
    pub ocr_backend: Option<String>,
}

impl ExtractionResult {
    /// Content categories present in this result, joined per category.
    ///
    /// Yields `(content_type, content, backend)` for each non-empty category.
    pub fn categories(&self) -> Vec<(ContentType, String, Option<String>)> {
        let mut parts = Vec::new();
        if !self.typed_text.is_empty() {
            parts.push((ContentType::TypedText, self.typed_text.join("\n\n"), None));
        }
        if !self.highlights.is_empty() {
            parts.push((ContentType::Highlight, self.highlights.join("\n\n"), None));
        }
        if !self.handwritten_text.is_empty() {
            parts.push((ContentType::Ocr, self.handwritten_text.join("\n\n"), self.ocr_backend.clone()));
        }
        parts
    }
}
