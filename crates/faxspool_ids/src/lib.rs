//! Shared identifier wrappers for the FaxSpool bridge.
//!
//! Two numbering domains meet in the spool: the legacy job identifier derived
//! from a descriptor filename, and the remote job identifier handed out by the
//! webhook transport. Both end up in file names, so every wrapper rejects
//! values that could escape the spool directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Error returned when an identifier fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

fn validate(value: &str, label: &str) -> Result<(), IdParseError> {
    if value.trim().is_empty() {
        return Err(IdParseError::new(format!("Invalid {}: empty", label)));
    }
    if value == "." || value == ".." {
        return Err(IdParseError::new(format!("Invalid {}: {:?}", label, value)));
    }
    if value
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(IdParseError::new(format!(
            "Invalid {}: {:?} contains a path separator or control character",
            label, value
        )));
    }
    Ok(())
}

macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                validate(value, $label)?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                validate(&value, $label)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Legacy job identifier: the descriptor filename without its extension.
    LegacyJobId,
    "legacy job ID"
);
define_string_id!(
    /// Job identifier assigned by the remote transport on submission.
    RemoteJobId,
    "remote job ID"
);
define_string_id!(
    /// Identifier of an inbound delivery as reported by the transport.
    SourceId,
    "source ID"
);

impl LegacyJobId {
    /// Derive the legacy job ID from a descriptor file name by stripping the
    /// descriptor extension (case-insensitive). Any directory part is dropped.
    pub fn from_descriptor_name(file_name: &str, extension: &str) -> Result<Self, IdParseError> {
        let base = file_name
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(file_name);
        let suffix = format!(".{}", extension.trim_start_matches('.'));
        let stem = match base.len().checked_sub(suffix.len()) {
            Some(idx)
                if idx > 0
                    && base.is_char_boundary(idx)
                    && base[idx..].eq_ignore_ascii_case(&suffix) =>
            {
                &base[..idx]
            }
            _ => base,
        };
        Self::parse(stem)
    }
}

/// Size of the session sequence space (8 decimal digits).
pub const SEQUENCE_SPACE: u64 = 100_000_000;

/// Process-wide identifier source for spool file names.
///
/// Values are drawn from a monotonically increasing counter seeded with a
/// random offset and rendered as 8 decimal digits. The counter wraps modulo
/// [`SEQUENCE_SPACE`], so a value repeats only after 10^8 allocations within
/// one process lifetime.
#[derive(Debug)]
pub struct SessionSequence {
    next: AtomicU64,
}

impl SessionSequence {
    /// Create a sequence seeded from a random v4 UUID.
    pub fn new() -> Self {
        let (high, _) = Uuid::new_v4().as_u64_pair();
        Self::starting_at(high % SEQUENCE_SPACE)
    }

    /// Create a sequence with a fixed starting value (tests, replay).
    pub fn starting_at(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed % SEQUENCE_SPACE),
        }
    }

    /// Allocate the next value in `0..SEQUENCE_SPACE`.
    pub fn next_value(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) % SEQUENCE_SPACE
    }

    /// Allocate the next value rendered as a zero-padded 8 digit token.
    pub fn next_token(&self) -> String {
        format!("{:08}", self.next_value())
    }
}

impl Default for SessionSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn legacy_id_strips_descriptor_extension() {
        let id = LegacyJobId::from_descriptor_name("job42.sfc", "sfc").unwrap();
        assert_eq!(id.as_str(), "job42");

        let id = LegacyJobId::from_descriptor_name("/spool/q/JOB7.SFC", "sfc").unwrap();
        assert_eq!(id.as_str(), "JOB7");
    }

    #[test]
    fn legacy_id_without_extension_is_kept() {
        let id = LegacyJobId::from_descriptor_name("job42", "sfc").unwrap();
        assert_eq!(id.as_str(), "job42");
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(RemoteJobId::parse("../etc/passwd").is_err());
        assert!(RemoteJobId::parse("..").is_err());
        assert!(SourceId::parse("").is_err());
        assert!(SourceId::parse("a\nb").is_err());
        assert!(LegacyJobId::from_descriptor_name("q/..", "sfc").is_err());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: RemoteJobId = serde_json::from_str("\"abc-123\"").unwrap();
        assert_eq!(ok.as_str(), "abc-123");
        assert!(serde_json::from_str::<RemoteJobId>("\"a/b\"").is_err());
    }

    #[test]
    fn sequence_wraps_within_space() {
        let seq = SessionSequence::starting_at(SEQUENCE_SPACE - 1);
        assert_eq!(seq.next_token(), "99999999");
        assert_eq!(seq.next_token(), "00000000");
        assert_eq!(seq.next_token(), "00000001");
    }

    #[test]
    fn sequence_is_unique_across_threads() {
        let seq = std::sync::Arc::new(SessionSequence::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seq = seq.clone();
                std::thread::spawn(move || (0..250).map(|_| seq.next_value()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "duplicate sequence value {}", value);
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
