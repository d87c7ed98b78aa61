use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::FormatError;

/// An office-document package: a ZIP container of named XML parts.
pub struct DocumentPackage {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl DocumentPackage {
    /// Opens a byte blob as a document package. Blobs that are not valid
    /// ZIP containers (plain PDFs, images, truncated downloads) fail with
    /// `FormatError::NotAPackage`.
    pub fn open(bytes: Vec<u8>) -> Result<Self, FormatError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(DocumentPackage { archive })
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Returns the path and content of the first entry whose path ends
    /// with `suffix`, walking entries in archive member order. Suffix
    /// comparison is case-sensitive.
    pub fn find_entry(&mut self, suffix: &str) -> Result<Option<(String, Vec<u8>)>, FormatError> {
        for index in 0..self.archive.len() {
            let mut entry = self.archive.by_index(index)?;
            if !entry.name().ends_with(suffix) {
                continue;
            }
            let path = entry.name().to_string();
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            return Ok(Some((path, bytes)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_open_valid_package() {
        let bytes = build_zip(&[("docProps/custom.xml", b"<Properties/>")]);
        let package = DocumentPackage::open(bytes).unwrap();
        assert_eq!(package.len(), 1);
        assert!(!package.is_empty());
    }

    #[test]
    fn test_open_rejects_non_package() {
        let result = DocumentPackage::open(b"%PDF-1.7 not a zip".to_vec());
        assert!(matches!(result, Err(FormatError::NotAPackage(_))));
    }

    #[test]
    fn test_find_entry_by_suffix() {
        let bytes = build_zip(&[
            ("[Content_Types].xml", b"<Types/>"),
            ("docProps/custom.xml", b"<Properties/>"),
        ]);
        let mut package = DocumentPackage::open(bytes).unwrap();
        let (path, content) = package.find_entry("custom.xml").unwrap().unwrap();
        assert_eq!(path, "docProps/custom.xml");
        assert_eq!(content, b"<Properties/>");
    }

    #[test]
    fn test_find_entry_first_match_in_member_order() {
        let bytes = build_zip(&[
            ("a/custom.xml", b"first"),
            ("b/custom.xml", b"second"),
        ]);
        let mut package = DocumentPackage::open(bytes).unwrap();
        let (path, content) = package.find_entry("custom.xml").unwrap().unwrap();
        assert_eq!(path, "a/custom.xml");
        assert_eq!(content, b"first");
    }

    #[test]
    fn test_find_entry_suffix_is_case_sensitive() {
        let bytes = build_zip(&[("docProps/CUSTOM.XML", b"<Properties/>")]);
        let mut package = DocumentPackage::open(bytes).unwrap();
        assert!(package.find_entry("custom.xml").unwrap().is_none());
    }

    #[test]
    fn test_find_entry_missing() {
        let bytes = build_zip(&[("word/document.xml", b"<w:document/>")]);
        let mut package = DocumentPackage::open(bytes).unwrap();
        assert!(package.find_entry("custom.xml").unwrap().is_none());
    }
}
