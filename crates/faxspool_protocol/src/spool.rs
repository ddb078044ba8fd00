//! Spool file formats
//!
//! Text formats exchanged with legacy fax-queue tooling through the spool
//! directory. All formats are newline-terminated.
//!
//! ```text
//! job42.sfc     +15551234567\ninvoice.pdf\n
//! job42.jobid   job42
//! job42.sts     state:6\nnpages:0\ntotpages:0\nstatus:Sent to WebHook\n
//! job42.done    (empty)
//! job42.fail    (empty)
//! recv_*.recv   <timestamp>\n<session token>\n<document>\n<caller>\n
//! ```

use crate::defaults::{DESCRIPTOR_EXTENSION, INBOUND_PREFIX};
use crate::error::{ProtocolError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;

/// Timestamp format used on the first line of `.recv` files (UTC).
pub const RECEIPT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parsed `.sfc` job descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub fax_number: String,
    pub document_name: String,
}

impl Descriptor {
    /// Parse descriptor content: line 1 is the callee number, line 2 the
    /// document filename. Trailing lines are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().map(str::trim);
        let fax_number = lines.next().unwrap_or_default();
        let document_name = match lines.next() {
            Some(line) => line,
            None => {
                return Err(ProtocolError::MalformedDescriptor(
                    "expected two lines (fax number, document filename)".to_string(),
                ))
            }
        };

        if fax_number.is_empty() {
            return Err(ProtocolError::MalformedDescriptor(
                "fax number is empty".to_string(),
            ));
        }
        if document_name.is_empty() {
            return Err(ProtocolError::MalformedDescriptor(
                "document filename is empty".to_string(),
            ));
        }
        if document_name.contains('/') || document_name.contains('\\') {
            return Err(ProtocolError::MalformedDescriptor(format!(
                "document filename must not contain a path: {}",
                document_name
            )));
        }

        Ok(Self {
            fax_number: fax_number.to_string(),
            document_name: document_name.to_string(),
        })
    }

    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.fax_number, self.document_name)
    }
}

/// HylaFax-style job state codes written to `.sts` files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    /// In progress (busy, ringing, sending)
    InProgress = 3,
    /// Handed to the webhook transport
    SentToTransport = 6,
    /// Terminal
    Completed = 7,
}

impl StatusCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            3 => Some(Self::InProgress),
            6 => Some(Self::SentToTransport),
            7 => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Content of a `.sts` status sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSentinel {
    pub state: StatusCode,
    pub npages: u32,
    pub totpages: u32,
    pub status: String,
}

impl StatusSentinel {
    pub fn new(state: StatusCode, status: impl Into<String>) -> Self {
        Self {
            state,
            npages: 0,
            totpages: 0,
            status: status.into(),
        }
    }

    pub fn with_pages(mut self, npages: u32, totpages: u32) -> Self {
        self.npages = npages;
        self.totpages = totpages;
        self
    }

    /// Render the four-line status file. Newlines in the status text are
    /// flattened so the file always has exactly four lines.
    pub fn render(&self) -> String {
        let status = self.status.replace(['\r', '\n'], " ");
        format!(
            "state:{}\nnpages:{}\ntotpages:{}\nstatus:{}\n",
            self.state, self.npages, self.totpages, status
        )
    }

    /// Parse a status file. Keys may appear in any order; missing page counts
    /// default to zero. The `state` key is required.
    pub fn parse(content: &str) -> Result<Self> {
        let mut state = None;
        let mut npages = 0;
        let mut totpages = 0;
        let mut status = String::new();

        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "state" => {
                    let code: u8 = value.trim().parse().map_err(|_| {
                        ProtocolError::MalformedStatus(format!("invalid state: {}", value))
                    })?;
                    state = Some(StatusCode::from_u8(code).ok_or_else(|| {
                        ProtocolError::MalformedStatus(format!("unknown state code: {}", code))
                    })?);
                }
                "npages" => npages = value.trim().parse().unwrap_or(0),
                "totpages" => totpages = value.trim().parse().unwrap_or(0),
                "status" => status = value.to_string(),
                _ => {}
            }
        }

        let state =
            state.ok_or_else(|| ProtocolError::MalformedStatus("missing state".to_string()))?;
        Ok(Self {
            state,
            npages,
            totpages,
            status,
        })
    }
}

/// Content of a `.recv` receipt sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSentinel {
    pub received_at: DateTime<Utc>,
    pub session_token: String,
    pub document_name: String,
    pub caller_number: String,
}

impl ReceiptSentinel {
    pub fn render(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n",
            self.received_at.format(RECEIPT_TIMESTAMP_FORMAT),
            single_line(&self.session_token),
            single_line(&self.document_name),
            single_line(&self.caller_number),
        )
    }
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Role of a file found in the spool directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Descriptor,
    Document,
    Ignored,
}

/// Classify a spool file by its extension (case-insensitive).
///
/// Hidden files and documents written by the inbound path are ignored.
pub fn classify_file(path: &Path, document_extensions: &[String]) -> FileRole {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return FileRole::Ignored;
    };
    if name.starts_with('.') {
        return FileRole::Ignored;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return FileRole::Ignored;
    };

    if ext.eq_ignore_ascii_case(DESCRIPTOR_EXTENSION) {
        return FileRole::Descriptor;
    }
    if document_extensions
        .iter()
        .any(|doc| ext.eq_ignore_ascii_case(doc.trim_start_matches('.')))
    {
        if name.starts_with(INBOUND_PREFIX) {
            return FileRole::Ignored;
        }
        return FileRole::Document;
    }
    FileRole::Ignored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pdf() -> Vec<String> {
        vec!["pdf".to_string()]
    }

    #[test]
    fn descriptor_parses_two_lines() {
        let d = Descriptor::parse("+15551234567\ninvoice.pdf").unwrap();
        assert_eq!(d.fax_number, "+15551234567");
        assert_eq!(d.document_name, "invoice.pdf");
    }

    #[test]
    fn descriptor_tolerates_crlf_and_trailing_lines() {
        let d = Descriptor::parse("+15551234567\r\ninvoice.pdf\r\nextra\n").unwrap();
        assert_eq!(d.document_name, "invoice.pdf");
    }

    #[test]
    fn descriptor_rejects_short_content() {
        assert!(matches!(
            Descriptor::parse("+15551234567"),
            Err(ProtocolError::MalformedDescriptor(_))
        ));
        assert!(Descriptor::parse("").is_err());
        assert!(Descriptor::parse("+1555\n\n").is_err());
        assert!(Descriptor::parse("\ninvoice.pdf").is_err());
        assert!(Descriptor::parse("+1555\n../x.pdf").is_err());
    }

    #[test]
    fn status_renders_four_lines() {
        let sts = StatusSentinel::new(StatusCode::SentToTransport, "Sent to WebHook");
        assert_eq!(
            sts.render(),
            "state:6\nnpages:0\ntotpages:0\nstatus:Sent to WebHook\n"
        );
    }

    #[test]
    fn status_parse_keeps_colons_in_text() {
        let sts = StatusSentinel::new(StatusCode::Completed, "Failed: NO CARRIER").with_pages(1, 3);
        let parsed = StatusSentinel::parse(&sts.render()).unwrap();
        assert_eq!(parsed, sts);
    }

    #[test]
    fn status_parse_requires_known_state() {
        assert!(StatusSentinel::parse("npages:1\n").is_err());
        assert!(StatusSentinel::parse("state:9\n").is_err());
        let parsed = StatusSentinel::parse("state:3\r\nstatus:ringing\r\n").unwrap();
        assert_eq!(parsed.state, StatusCode::InProgress);
        assert_eq!(parsed.status, "ringing");
    }

    #[test]
    fn receipt_renders_four_lines() {
        let receipt = ReceiptSentinel {
            received_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            session_token: "S00000042".to_string(),
            document_name: "recv_abc_20240309140507_00000042.pdf".to_string(),
            caller_number: "+15550001111".to_string(),
        };
        let rendered = receipt.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "2024-03-09 14:05:07",
                "S00000042",
                "recv_abc_20240309140507_00000042.pdf",
                "+15550001111"
            ]
        );
    }

    #[test]
    fn classify_by_extension() {
        assert_eq!(classify_file(Path::new("/q/job42.sfc"), &pdf()), FileRole::Descriptor);
        assert_eq!(classify_file(Path::new("/q/JOB42.SFC"), &pdf()), FileRole::Descriptor);
        assert_eq!(classify_file(Path::new("/q/invoice.PDF"), &pdf()), FileRole::Document);
        assert_eq!(classify_file(Path::new("/q/job42.sts"), &pdf()), FileRole::Ignored);
        assert_eq!(classify_file(Path::new("/q/README"), &pdf()), FileRole::Ignored);
        assert_eq!(classify_file(Path::new("/q/.tmp_x.pdf"), &pdf()), FileRole::Ignored);
        assert_eq!(
            classify_file(Path::new("/q/recv_abc_1.pdf"), &pdf()),
            FileRole::Ignored
        );
    }
}
