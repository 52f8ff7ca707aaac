use std::path::Path;

use crate::types::EvidenceType;

/// Extension-driven classification with a content fallback for PDFs. Pure:
/// the caller supplies the probe bytes, nothing here touches the filesystem.

const EMAIL_EXTENSIONS: &[&str] = &["eml", "msg", "mbox"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff"];
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "mp3", "wav", "m4a", "flac", "ogg",
];

/// Classify an artifact. `probe` holds the first bytes of the file when the
/// caller was able to read them; it only matters for PDFs.
pub fn detect_evidence_type(extension: &str, probe: Option<&[u8]>) -> EvidenceType {
    let ext = extension.to_ascii_lowercase();

    if EMAIL_EXTENSIONS.contains(&ext.as_str()) {
        return EvidenceType::Email;
    }
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return EvidenceType::Image;
    }
    if ext == "txt" {
        return EvidenceType::Document;
    }
    if ext == "pdf" {
        // Text-bearing PDFs analyze as documents; image-only scans go
        // through the vision analyzer.
        return match probe {
            Some(bytes) if pdf_has_text_layer(bytes) => EvidenceType::Document,
            _ => EvidenceType::Image,
        };
    }
    if MEDIA_EXTENSIONS.contains(&ext.as_str()) {
        return EvidenceType::Other;
    }

    EvidenceType::Other
}

/// Lowercased extension without the leading dot; empty string when absent.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Declared MIME type for a known extension.
pub fn mime_type_of(extension: &str) -> &'static str {
    match extension {
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "eml" => "message/rfc822",
        "msg" => "application/vnd.ms-outlook",
        "mbox" => "application/mbox",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Heuristic text-layer probe over the first bytes of a PDF. Real extraction
/// lives behind the reader interface; this only steers analyzer routing.
fn pdf_has_text_layer(bytes: &[u8]) -> bool {
    if !bytes.starts_with(b"%PDF") {
        return false;
    }
    contains_subslice(bytes, b"/Font") || contains_subslice(bytes, b"/Text")
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_email_extensions() {
        for ext in ["eml", "msg", "mbox", "EML"] {
            assert_eq!(detect_evidence_type(ext, None), EvidenceType::Email);
        }
    }

    #[test]
    fn test_image_extensions() {
        for ext in ["jpg", "jpeg", "png", "gif", "bmp", "tiff"] {
            assert_eq!(detect_evidence_type(ext, None), EvidenceType::Image);
        }
    }

    #[test]
    fn test_text_is_document() {
        assert_eq!(detect_evidence_type("txt", None), EvidenceType::Document);
    }

    #[test]
    fn test_pdf_with_text_layer_is_document() {
        let probe = b"%PDF-1.7 ... /Type /Font /Subtype ...";
        assert_eq!(
            detect_evidence_type("pdf", Some(probe)),
            EvidenceType::Document
        );
    }

    #[test]
    fn test_image_only_pdf_routes_to_vision() {
        let probe = b"%PDF-1.4 ... /Image /DCTDecode ...";
        assert_eq!(detect_evidence_type("pdf", Some(probe)), EvidenceType::Image);
        // No probe available: conservative, treat as scan
        assert_eq!(detect_evidence_type("pdf", None), EvidenceType::Image);
    }

    #[test]
    fn test_media_and_unknown_are_other() {
        assert_eq!(detect_evidence_type("mp4", None), EvidenceType::Other);
        assert_eq!(detect_evidence_type("wav", None), EvidenceType::Other);
        assert_eq!(detect_evidence_type("xyz", None), EvidenceType::Other);
        assert_eq!(detect_evidence_type("", None), EvidenceType::Other);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(&PathBuf::from("a/b/Email.EML")), "eml");
        assert_eq!(extension_of(&PathBuf::from("noext")), "");
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(mime_type_of("txt"), "text/plain");
        assert_eq!(mime_type_of("weird"), "application/octet-stream");
    }
}
