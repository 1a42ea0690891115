//! File type detection from a leading byte sample.
//!
//! # Responsibilities
//! - Recognize the supported types by magic number
//! - Fall back to declared text MIME types when the sample decodes as UTF-8
//! - Produce a non-empty candidate list or a rejection
//!
//! # Design Decisions
//! - Only the first `SAMPLE_SIZE` bytes (or the whole file, if shorter) are seen
//! - OOXML containers are reported as xlsx, the only OOXML type accepted
//! - CSV and plain text have no signature; they rely on the declared MIME type

use serde::{Serialize, Serializer};

use crate::multipart::error::MultipartError;

/// Bytes buffered before classification.
pub const SAMPLE_SIZE: usize = 100;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF87A: &[u8] = b"GIF87a";
const GIF89A: &[u8] = b"GIF89a";
const PDF: &[u8] = b"%PDF-";
const OLE2: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_NAME_LEN_OFFSET: usize = 26;
const ZIP_NAME_OFFSET: usize = 30;
const OOXML_ENTRIES: [&[u8]; 4] = [b"[Content_Types].xml", b"_rels/", b"docProps/", b"xl/"];

/// Accepted upload types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Csv,
    Jpeg,
    Gif,
    Pdf,
    Png,
    Txt,
    Xls,
    Xlsx,
}

impl FileType {
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Jpeg => "jpg",
            FileType::Gif => "gif",
            FileType::Pdf => "pdf",
            FileType::Png => "png",
            FileType::Txt => "txt",
            FileType::Xls => "xls",
            FileType::Xlsx => "xlsx",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            FileType::Csv => "text/csv",
            FileType::Jpeg => "image/jpeg",
            FileType::Gif => "image/gif",
            FileType::Pdf => "application/pdf",
            FileType::Png => "image/png",
            FileType::Txt => "text/plain",
            FileType::Xls => "application/vnd.ms-excel",
            FileType::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

impl Serialize for FileType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("FileType", 2)?;
        state.serialize_field("ext", self.extension())?;
        state.serialize_field("mime", self.mime())?;
        state.end()
    }
}

/// Plausible types for an accepted file. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileTypeCandidates(Vec<FileType>);

impl FileTypeCandidates {
    /// `None` for an empty list.
    pub fn new(candidates: Vec<FileType>) -> Option<Self> {
        if candidates.is_empty() {
            None
        } else {
            Some(Self(candidates))
        }
    }

    pub fn primary(&self) -> FileType {
        self.0[0]
    }

    pub fn contains(&self, file_type: FileType) -> bool {
        self.0.contains(&file_type)
    }

    pub fn as_slice(&self) -> &[FileType] {
        &self.0
    }
}

/// Magic-number detection.
pub fn detect_signature(sample: &[u8]) -> Option<FileType> {
    if sample.starts_with(PNG) {
        Some(FileType::Png)
    } else if sample.starts_with(JPEG) {
        Some(FileType::Jpeg)
    } else if sample.starts_with(GIF87A) || sample.starts_with(GIF89A) {
        Some(FileType::Gif)
    } else if sample.starts_with(PDF) {
        Some(FileType::Pdf)
    } else if sample.starts_with(OLE2) {
        Some(FileType::Xls)
    } else if is_ooxml(sample) {
        Some(FileType::Xlsx)
    } else {
        None
    }
}

/// Zip whose first entry is an OOXML part. A name cut off by the sample
/// boundary is compared on what is available.
fn is_ooxml(sample: &[u8]) -> bool {
    if !sample.starts_with(ZIP_LOCAL_HEADER) || sample.len() <= ZIP_NAME_OFFSET {
        return false;
    }
    let name_len = u16::from_le_bytes([
        sample[ZIP_NAME_LEN_OFFSET],
        sample[ZIP_NAME_LEN_OFFSET + 1],
    ]) as usize;
    let truncated = ZIP_NAME_OFFSET + name_len > sample.len();
    let end = (ZIP_NAME_OFFSET + name_len).min(sample.len());
    let name = &sample[ZIP_NAME_OFFSET..end];
    if name.is_empty() {
        return false;
    }

    OOXML_ENTRIES.iter().any(|entry| {
        let n = name.len().min(entry.len());
        // Full entry prefix, or a truncated name that is still consistent with it.
        name.starts_with(entry) || (truncated && name[..n] == entry[..n])
    })
}

fn text_fallback(declared_mime: &str) -> Option<FileType> {
    let essence = declared_mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "text/csv" => Some(FileType::Csv),
        "text/plain" | "text/html" => Some(FileType::Txt),
        _ => None,
    }
}

/// Strict UTF-8, except that a sequence cut off at the end of a sample taken
/// from a still-open stream is not an error.
fn is_valid_text(sample: &[u8], stream_ended: bool) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => !stream_ended && e.error_len().is_none(),
    }
}

/// Decide whether a file is acceptable from its leading bytes.
pub fn classify(
    sample: &[u8],
    declared_mime: Option<&str>,
    stream_ended: bool,
) -> Result<FileTypeCandidates, MultipartError> {
    let mut candidates = Vec::new();

    if let Some(detected) = detect_signature(sample) {
        candidates.push(detected);
    } else if let Some(text_type) = declared_mime.and_then(text_fallback) {
        if !is_valid_text(sample, stream_ended) {
            return Err(MultipartError::InvalidText);
        }
        candidates.push(text_type);
    }

    match FileTypeCandidates::new(candidates) {
        Some(candidates) => Ok(candidates),
        None if stream_ended => Err(MultipartError::TooSmallOrUnsupported),
        None => Err(MultipartError::UnsupportedFileType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(head: &[u8], len: usize) -> Vec<u8> {
        let mut sample = head.to_vec();
        sample.resize(len, 0);
        sample
    }

    fn zip_with_entry(name: &str) -> Vec<u8> {
        let mut sample = b"PK\x03\x04".to_vec();
        sample.extend_from_slice(&[0u8; 22]);
        sample.extend_from_slice(&(name.len() as u16).to_le_bytes());
        sample.extend_from_slice(&[0u8; 2]);
        sample.extend_from_slice(name.as_bytes());
        sample
    }

    #[test]
    fn detects_binary_signatures() {
        assert_eq!(detect_signature(&padded(PNG, 100)), Some(FileType::Png));
        assert_eq!(detect_signature(&padded(&[0xFF, 0xD8, 0xFF, 0xE0], 100)), Some(FileType::Jpeg));
        assert_eq!(detect_signature(b"GIF89a......"), Some(FileType::Gif));
        assert_eq!(detect_signature(b"%PDF-1.7\n"), Some(FileType::Pdf));
        assert_eq!(detect_signature(&padded(OLE2, 100)), Some(FileType::Xls));
        assert_eq!(detect_signature(b"plain words"), None);
    }

    #[test]
    fn detects_xlsx_by_first_zip_entry() {
        assert_eq!(detect_signature(&zip_with_entry("[Content_Types].xml")), Some(FileType::Xlsx));
        assert_eq!(detect_signature(&zip_with_entry("xl/workbook.xml")), Some(FileType::Xlsx));
        assert_eq!(detect_signature(&zip_with_entry("photos/cat.png")), None);

        let mut truncated = zip_with_entry("[Content_Types].xml");
        truncated.truncate(ZIP_NAME_OFFSET + 5);
        assert_eq!(detect_signature(&truncated), Some(FileType::Xlsx));
    }

    #[test]
    fn signature_wins_over_declared_mime() {
        let candidates = classify(&padded(PNG, 100), Some("text/plain"), false).unwrap();
        assert_eq!(candidates.as_slice(), &[FileType::Png]);
    }

    #[test]
    fn text_fallback_for_declared_text_types() {
        let csv = classify(b"a,b\n1,2\n", Some("text/csv"), true).unwrap();
        assert_eq!(csv.primary(), FileType::Csv);

        let html = classify(b"<html></html>", Some("text/html; charset=utf-8"), true).unwrap();
        assert_eq!(html.primary(), FileType::Txt);
    }

    #[test]
    fn invalid_text_is_a_failure() {
        let err = classify(&[b'a', 0xFF, b'b'], Some("text/plain"), true).unwrap_err();
        assert!(matches!(err, MultipartError::InvalidText));
    }

    #[test]
    fn split_code_point_tolerated_only_on_live_stream() {
        // "é" is C3 A9; the sample ends after C3.
        let sample = [b'c', b'a', b'f', 0xC3];
        assert!(classify(&sample, Some("text/plain"), false).is_ok());
        assert!(matches!(
            classify(&sample, Some("text/plain"), true),
            Err(MultipartError::InvalidText)
        ));
    }

    #[test]
    fn rejection_depends_on_stream_end() {
        let small = classify(b"hello", Some("application/octet-stream"), true).unwrap_err();
        assert!(matches!(small, MultipartError::TooSmallOrUnsupported));

        let large = classify(&[7u8; 100], Some("application/octet-stream"), false).unwrap_err();
        assert!(matches!(large, MultipartError::UnsupportedFileType));

        let undeclared = classify(&[7u8; 100], None, false).unwrap_err();
        assert!(matches!(undeclared, MultipartError::UnsupportedFileType));
    }

    #[test]
    fn candidates_never_empty() {
        assert!(FileTypeCandidates::new(Vec::new()).is_none());
        let json = serde_json::to_value(FileTypeCandidates::new(vec![FileType::Png]).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!([{ "ext": "png", "mime": "image/png" }]));
    }
}
