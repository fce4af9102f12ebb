//! Folder path helpers over the parent-id forest.

use std::collections::{HashMap, HashSet};

use crate::models::Document;

/// Index a collection by document id.
pub fn items_by_id(documents: &[Document]) -> HashMap<&str, &Document> {
    documents.iter().map(|d| (d.id.as_str(), d)).collect()
}

/// Build the full `/Folder/Sub/Name` path of an item.
///
/// Parents missing from `by_id` end the walk; a revisited id stops it so a
/// malformed parent chain cannot loop.
pub fn item_path(item: &Document, by_id: &HashMap<&str, &Document>) -> String {
    let mut parts = vec![item.name.as_str()];
    let mut visited: HashSet<&str> = HashSet::from([item.id.as_str()]);
    let mut parent_id = item.parent_id.as_str();

    while !parent_id.is_empty() && !visited.contains(parent_id) {
        let Some(parent) = by_id.get(parent_id) else {
            break;
        };
        visited.insert(parent_id);
        parts.push(parent.name.as_str());
        parent_id = parent.parent_id.as_str();
    }

    parts.reverse();
    format!("/{}", parts.join("/"))
}

/// Normalize a configured root: `""`, `"/"` → `/`; `Work/` → `/Work`.
pub fn normalize_root(root: &str) -> String {
    let root = root.trim();
    if root.is_empty() || root == "/" {
        return "/".to_string();
    }
    let trimmed = root.trim_end_matches('/');
    if trimmed.starts_with('/') { trimmed.to_string() } else { format!("/{trimmed}") }
}

/// Remainder of `path` after a case-insensitive `prefix`, sliced at a char
/// boundary of `path`.
fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.to_lowercase();
    let mut folded = String::with_capacity(prefix.len());
    for (offset, c) in path.char_indices() {
        if folded.len() >= prefix.len() {
            return (folded == prefix).then(|| &path[offset..]);
        }
        folded.extend(c.to_lowercase());
        if !prefix.starts_with(folded.as_str()) {
            return None;
        }
    }
    (folded == prefix).then_some("")
}

/// Whether `path` equals `root` or lies beneath it (case-insensitive).
pub fn is_within_root(path: &str, root: &str) -> bool {
    if root == "/" {
        return true;
    }
    strip_prefix_ignore_case(path, root).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Strip `root` from the front of `path`, keeping the original case of the rest.
pub fn apply_root_filter(path: &str, root: &str) -> String {
    if root == "/" {
        return path.to_string();
    }
    match strip_prefix_ignore_case(path, root) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}
