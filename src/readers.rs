use std::fs;
use std::path::Path;

use regex::Regex;

use crate::errors::{ErrorKind, PipelineError, PipelineResult};

/// Type-specific content readers. Format parsing is deliberately shallow
/// here; richer extractors plug in behind [`ContentReader`] without touching
/// the analyzers.
pub trait ContentReader: Send + Sync {
    /// Extract the text content of a document artifact.
    fn extract_text(&self, path: &Path) -> PipelineResult<String>;

    /// Parse the envelope and body of an email artifact.
    fn read_email(&self, path: &Path) -> PipelineResult<EmailContent>;

    /// Load a vision-capable payload for an image artifact.
    fn read_image(&self, path: &Path) -> PipelineResult<ImagePayload>;
}

/// A parsed mailbox, `Name <addr>` or bare address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub address: String,
}

impl Mailbox {
    /// Display name when present, else the address local part with dots and
    /// digits stripped into a readable name.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        crate::correlate::name_from_local_part(&self.address)
            .unwrap_or_else(|| self.address.clone())
    }
}

/// Parsed email envelope plus body text.
#[derive(Debug, Clone, Default)]
pub struct EmailContent {
    pub from: Vec<Mailbox>,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    pub subject: String,
    /// Header date normalized to RFC 3339 UTC, when parseable
    pub date_utc: Option<String>,
    pub body: String,
}

/// Bytes plus media type, handed to the vision analyzer.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Built-in reader: plain text passthrough, printable-run extraction for
/// PDFs, line-oriented RFC 822 header parsing for `.eml`.
pub struct DefaultReader {
    mailbox_re: Regex,
}

impl Default for DefaultReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultReader {
    pub fn new() -> Self {
        DefaultReader {
            mailbox_re: Regex::new(r#"^\s*"?([^"<>]*?)"?\s*<([^<>\s]+@[^<>\s]+)>\s*$"#)
                .expect("mailbox regex"),
        }
    }

    fn parse_mailbox(&self, raw: &str) -> Option<Mailbox> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(caps) = self.mailbox_re.captures(raw) {
            let name = caps.get(1).map(|m| m.as_str().trim().to_string());
            return Some(Mailbox {
                name: name.filter(|n| !n.is_empty()),
                address: caps[2].to_ascii_lowercase(),
            });
        }
        if raw.contains('@') {
            return Some(Mailbox {
                name: None,
                address: raw.trim_matches(&['<', '>'][..]).to_ascii_lowercase(),
            });
        }
        None
    }

    fn parse_mailbox_list(&self, raw: &str) -> Vec<Mailbox> {
        raw.split(',').filter_map(|m| self.parse_mailbox(m)).collect()
    }
}

impl ContentReader for DefaultReader {
    fn extract_text(&self, path: &Path) -> PipelineResult<String> {
        let bytes =
            fs::read(path).map_err(|e| PipelineError::io(ErrorKind::Analyzer, &e, path))?;

        if crate::detect::extension_of(path) == "pdf" {
            return Ok(printable_runs(&bytes));
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_email(&self, path: &Path) -> PipelineResult<EmailContent> {
        let raw =
            fs::read_to_string(path).map_err(|e| PipelineError::io(ErrorKind::Analyzer, &e, path))?;

        let mut content = EmailContent::default();
        let mut body_lines: Vec<&str> = Vec::new();
        let mut in_body = false;
        let mut last_header: Option<String> = None;

        for line in raw.lines() {
            if in_body {
                body_lines.push(line);
                continue;
            }
            if line.trim().is_empty() {
                in_body = true;
                continue;
            }
            // Folded header continuation
            if (line.starts_with(' ') || line.starts_with('\t')) && last_header.is_some() {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_ascii_lowercase();
                let value = value.trim();
                match key.as_str() {
                    "from" => content.from = self.parse_mailbox_list(value),
                    "to" => content.to = self.parse_mailbox_list(value),
                    "cc" => content.cc = self.parse_mailbox_list(value),
                    "bcc" => content.bcc = self.parse_mailbox_list(value),
                    "subject" => content.subject = value.to_string(),
                    "date" => {
                        content.date_utc = chrono::DateTime::parse_from_rfc2822(value)
                            .ok()
                            .map(|d| d.with_timezone(&chrono::Utc).to_rfc3339());
                    }
                    _ => {}
                }
                last_header = Some(key);
            }
        }

        content.body = body_lines.join("\n");
        if content.from.is_empty() && content.to.is_empty() && content.body.is_empty() {
            return Err(PipelineError::analyzer(&format!(
                "no parseable email content in {}",
                path.display()
            )));
        }
        Ok(content)
    }

    fn read_image(&self, path: &Path) -> PipelineResult<ImagePayload> {
        let bytes =
            fs::read(path).map_err(|e| PipelineError::io(ErrorKind::Analyzer, &e, path))?;
        let extension = crate::detect::extension_of(path);
        Ok(ImagePayload {
            media_type: crate::detect::mime_type_of(&extension).to_string(),
            bytes,
        })
    }
}

/// Runs of printable ASCII (length >= 4) joined by spaces. Stand-in text
/// layer for PDFs until a real extractor is plugged in.
fn printable_runs(bytes: &[u8]) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        if (0x20..0x7f).contains(&b) {
            current.push(b as char);
        } else {
            if current.trim().len() >= 4 {
                runs.push(current.trim().to_string());
            }
            current.clear();
        }
    }
    if current.trim().len() >= 4 {
        runs.push(current.trim().to_string());
    }
    runs.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const SAMPLE_EML: &str = "From: Sarah Chen <sarah.chen@example.com>\n\
To: Paul.Boucherat.9241@example.com, \"HR Team\" <hr@example.com>\n\
Cc: legal@example.com\n\
Subject: Suspension meeting\n\
Date: Mon, 25 Aug 2025 09:30:00 +0100\n\
\n\
Paul,\n\
The suspension occurred on 24/08/2025.\n";

    fn write_temp(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_plain_text_extraction() {
        let dir = tempdir().unwrap();
        let path = write_temp(dir.path(), "doc.txt", b"Hello\n");
        let reader = DefaultReader::new();
        assert_eq!(reader.extract_text(&path).unwrap(), "Hello\n");
    }

    #[test]
    fn test_email_envelope_parsing() {
        let dir = tempdir().unwrap();
        let path = write_temp(dir.path(), "mail.eml", SAMPLE_EML.as_bytes());
        let reader = DefaultReader::new();
        let email = reader.read_email(&path).unwrap();

        assert_eq!(email.from.len(), 1);
        assert_eq!(email.from[0].address, "sarah.chen@example.com");
        assert_eq!(email.from[0].name.as_deref(), Some("Sarah Chen"));

        assert_eq!(email.to.len(), 2);
        assert_eq!(email.to[0].address, "paul.boucherat.9241@example.com");
        assert_eq!(email.to[1].name.as_deref(), Some("HR Team"));

        assert_eq!(email.cc.len(), 1);
        assert_eq!(email.subject, "Suspension meeting");
        assert!(email.body.contains("suspension occurred"));

        // 09:30 +0100 normalizes to 08:30 UTC
        let date = email.date_utc.as_deref().unwrap();
        assert!(date.starts_with("2025-08-25T08:30:00"), "got {}", date);
    }

    #[test]
    fn test_mailbox_display_name_from_local_part() {
        let mailbox = Mailbox {
            name: None,
            address: "paul.boucherat.9241@example.com".to_string(),
        };
        assert_eq!(mailbox.display_name(), "Paul Boucherat");
    }

    #[test]
    fn test_unparseable_email_is_error() {
        let dir = tempdir().unwrap();
        let path = write_temp(dir.path(), "empty.eml", b"");
        let reader = DefaultReader::new();
        assert!(reader.read_email(&path).is_err());
    }

    #[test]
    fn test_printable_runs_skips_binary() {
        let mut bytes = b"%PDF-1.4 ".to_vec();
        bytes.extend_from_slice(&[0u8, 1, 2, 3]);
        bytes.extend_from_slice(b"Grievance raised by employee");
        bytes.extend_from_slice(&[0xff, 0xfe]);
        let text = printable_runs(&bytes);
        assert!(text.contains("Grievance raised by employee"));
        assert!(!text.contains('\u{0}'));
    }

    #[test]
    fn test_image_payload_media_type() {
        let dir = tempdir().unwrap();
        let path = write_temp(dir.path(), "scan.png", b"\x89PNG\r\n");
        let reader = DefaultReader::new();
        let payload = reader.read_image(&path).unwrap();
        assert_eq!(payload.media_type, "image/png");
        assert_eq!(payload.bytes.len(), 6);
    }
}
