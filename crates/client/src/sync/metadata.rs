//! Document metadata blobs.

use chrono::{DateTime, Utc};
use rmsync_core::{DocType, Document, RemoteIndexEntry};
use serde::Deserialize;
use serde_json::Value;

/// JSON stored in a document's `.metadata` component.
///
/// Every field is optional; missing values fall back to the defaults used
/// by [`RawMetadata::into_document`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    pub visible_name: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub pinned: bool,
    /// Epoch milliseconds, sent as a string or a number.
    pub last_modified: Option<Value>,
    pub synced: Option<bool>,
}

fn parse_millis(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        _ => return None,
    };
    DateTime::from_timestamp_millis(millis)
}

impl RawMetadata {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified.as_ref().and_then(parse_millis)
    }

    /// Build a document from its root index entry and component list.
    pub fn into_document(self, entry: &RemoteIndexEntry, component_files: Vec<RemoteIndexEntry>) -> Document {
        let last_modified = self.last_modified();
        Document {
            id: entry.id.clone(),
            hash: entry.hash.clone(),
            name: self.visible_name.unwrap_or_else(|| entry.id.clone()),
            doc_type: DocType::from_remote(self.doc_type.as_deref().unwrap_or("DocumentType")),
            parent_id: self.parent.unwrap_or_default(),
            deleted: self.deleted,
            pinned: self.pinned,
            last_modified,
            size_bytes: entry.size_bytes,
            component_files,
            synced: self.synced.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RemoteIndexEntry {
        RemoteIndexEntry::parse_line("h1:80000000:doc-1:3:2048").unwrap()
    }

    #[test]
    fn test_full_metadata() {
        let raw = RawMetadata::parse(
            br#"{"visibleName":"Notes","type":"DocumentType","parent":"f1","deleted":false,
                 "pinned":true,"lastModified":"1700000000000"}"#,
        )
        .unwrap();
        let doc = raw.into_document(&entry(), Vec::new());

        assert_eq!(doc.name, "Notes");
        assert_eq!(doc.parent_id, "f1");
        assert!(doc.pinned);
        assert_eq!(doc.size_bytes, 2048);
        assert_eq!(doc.last_modified.unwrap().timestamp(), 1_700_000_000);
        assert!(doc.synced);
    }

    #[test]
    fn test_numeric_timestamp_and_collection() {
        let raw = RawMetadata::parse(br#"{"visibleName":"Work","type":"CollectionType","lastModified":1700000000000}"#)
            .unwrap();
        let doc = raw.into_document(&entry(), Vec::new());
        assert!(doc.is_folder());
        assert!(doc.last_modified.is_some());
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let doc = RawMetadata::parse(b"{}").unwrap().into_document(&entry(), Vec::new());
        assert_eq!(doc.name, "doc-1");
        assert_eq!(doc.doc_type, DocType::Document);
        assert_eq!(doc.parent_id, "");
        assert!(doc.last_modified.is_none());
    }

    #[test]
    fn test_bad_timestamp_ignored() {
        let raw = RawMetadata::parse(br#"{"lastModified":"yesterday"}"#).unwrap();
        assert!(raw.last_modified().is_none());
    }

    #[test]
    fn test_unsynced_flag() {
        let doc = RawMetadata::parse(br#"{"synced":false}"#).unwrap().into_document(&entry(), Vec::new());
        assert!(doc.is_cloud_archived());
    }
}
