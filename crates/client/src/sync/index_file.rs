//! Index file parsing.
//!
//! An index file is newline-separated text. The first line is a schema
//! version marker; each following line is `hash:type:id:subfileCount:sizeBytes`.

use rmsync_core::RemoteIndexEntry;

/// Parse an index file, dropping malformed lines with a warning.
pub fn parse_index(content: &str) -> Vec<RemoteIndexEntry> {
    content
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let entry = RemoteIndexEntry::parse_line(line);
            if entry.is_none() {
                let preview: String = line.chars().take(100).collect();
                tracing::warn!(line = %preview, "skipping malformed index line");
            }
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_schema_line() {
        let entries = parse_index("3\nabc:80000000:doc-1:4:1024\ndef:0:doc-2:0:10\n");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "doc-1");
        assert_eq!(entries[1].hash, "def");
    }

    #[test]
    fn test_malformed_line_dropped() {
        let entries = parse_index("3\nabc:0:doc-1:4:1024\nbroken:0:doc-2:0");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "doc-1");
    }

    #[test]
    fn test_short_line_before_valid_line() {
        let entries = parse_index("3\nbroken:0:doc-1:4\nabc:0:doc-2:0:10");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "doc-2");
        assert_eq!(entries[0].size_bytes, 10);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let entries = parse_index("3\r\nabc:0:doc-1:4:1024\r\n\r\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size_bytes, 1024);
    }

    #[test]
    fn test_schema_line_only() {
        assert!(parse_index("3\n").is_empty());
        assert!(parse_index("").is_empty());
    }
}
