//! Export filename parsing

use serde::{Deserialize, Serialize};

/// Parts of a dotted export filename
///
/// `sales.csv.gz` names the file `sales`, the format `csv` and the
/// compression `gzip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFile {
    /// Base name
    pub filepart: String,
    /// Format extension
    pub extension: Option<String>,
    /// Compression scheme
    pub compression: Option<String>,
}

impl ExportFile {
    /// Split a filename on dots
    ///
    /// Segments past the third are ignored. `gz` is normalized to `gzip`.
    pub fn parse(filename: &str) -> Self {
        let mut parts = filename.split('.');
        let filepart = parts.next().unwrap_or_default().to_string();
        let extension = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        let compression = parts
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| if s == "gz" { "gzip".to_string() } else { s.to_string() });

        Self {
            filepart,
            extension,
            compression,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        let file = ExportFile::parse("sales.csv.gz");
        assert_eq!(file.filepart, "sales");
        assert_eq!(file.extension.as_deref(), Some("csv"));
        assert_eq!(file.compression.as_deref(), Some("gzip"));
    }

    #[test]
    fn test_partial_names() {
        let file = ExportFile::parse("sales.csv");
        assert_eq!(file.extension.as_deref(), Some("csv"));
        assert_eq!(file.compression, None);

        let file = ExportFile::parse("sales");
        assert_eq!(file.filepart, "sales");
        assert_eq!(file.extension, None);
    }

    #[test]
    fn test_other_compression_kept() {
        let file = ExportFile::parse("sales.json.zip");
        assert_eq!(file.compression.as_deref(), Some("zip"));
    }
}
