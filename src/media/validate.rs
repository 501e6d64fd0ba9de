//! Allow-list checks for anything that ends up in a filesystem path or an
//! ffmpeg argument.

use once_cell::sync::Lazy;
use regex::Regex;

use super::MediaError;
use crate::models::MediaParams;

const MAX_EPISODE_NAME_LEN: usize = 200;
const MAX_TIMESTAMP_DIGITS: usize = 12;

pub const CLIP_EXTENSION: &str = "webm";

/// Letters and digits in any script, plus the punctuation that shows up in
/// episode titles. No path separators, no control characters.
static RE_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}\p{N}\p{M} _\-.,'()&!#+\[\]]+$").unwrap());

/// `<episode>.<timestamp>.webm`
static RE_CLIP_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+)\.(\d+)\.webm$").unwrap());

/// A validated `(episode, timestamp)` pair, safe to turn into paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRequest {
    pub episode_name: String,
    pub timestamp_ms: u64,
}

impl MediaRequest {
    pub fn new(episode_name: &str, timestamp_ms: u64) -> Result<Self, MediaError> {
        Ok(Self {
            episode_name: episode_name_checked(episode_name)?.to_string(),
            timestamp_ms,
        })
    }

    pub fn from_params(params: &MediaParams) -> Result<Self, MediaError> {
        Self::new(&params.episode_name, timestamp(&params.timestamp)?)
    }

    /// File name of the clip for this request.
    pub fn clip_file_name(&self) -> String {
        format!("{}.{}.{CLIP_EXTENSION}", self.episode_name, self.timestamp_ms)
    }
}

pub fn episode_name_checked(name: &str) -> Result<&str, MediaError> {
    let invalid = |why: &str| MediaError::InvalidInput(format!("episodeName {why}"));

    if name.is_empty() {
        return Err(invalid("is required"));
    }
    if name.chars().count() > MAX_EPISODE_NAME_LEN {
        return Err(invalid("is too long"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(invalid("must not start with '.' or '-'"));
    }
    if !RE_EPISODE.is_match(name) {
        return Err(invalid("contains unsupported characters"));
    }
    Ok(name)
}

/// Millisecond offset as plain decimal digits. A leading `+` or `-`,
/// whitespace, or an absurd length is rejected.
pub fn timestamp(raw: &str) -> Result<u64, MediaError> {
    if raw.is_empty() {
        return Err(MediaError::InvalidInput("timestamp is required".into()));
    }
    if raw.len() > MAX_TIMESTAMP_DIGITS || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MediaError::InvalidInput(format!(
            "timestamp must be a non-negative millisecond count, got {raw:?}"
        )));
    }
    raw.parse()
        .map_err(|_| MediaError::InvalidInput(format!("timestamp out of range: {raw:?}")))
}

/// Parse a requested static file name back into the clip it names.
///
/// Only names this service could have generated are accepted, which keeps
/// the static route from serving anything else in the clip directory.
pub fn parse_clip_file_name(file: &str) -> Option<MediaRequest> {
    let caps = RE_CLIP_FILE.captures(file)?;
    let ts = timestamp(&caps[2]).ok()?;
    let request = MediaRequest::new(&caps[1], ts).ok()?;
    // Reject non-canonical spellings such as a zero-padded timestamp.
    (request.clip_file_name() == file).then_some(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(name: &str) -> bool {
        matches!(episode_name_checked(name), Err(MediaError::InvalidInput(_)))
    }

    #[test]
    fn accepts_ordinary_titles() {
        for name in [
            "Ep1",
            "S01E02 - The One With, Commas",
            "Rick & Morty (Pilot)",
            "Épisode spécial",
            "第1話",
            "v1.2 final",
        ] {
            assert!(episode_name_checked(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn rejects_path_tricks() {
        for name in [
            "a/b",
            "a\\b",
            "..",
            "../etc/passwd",
            "ep..1",
            ".hidden",
            "-ss",
            "",
            "tab\there",
            "nul\0byte",
            "semi;colon",
            "quote\"s",
        ] {
            assert!(rejected(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overlong_names() {
        assert!(rejected(&"a".repeat(MAX_EPISODE_NAME_LEN + 1)));
        assert!(!rejected(&"a".repeat(MAX_EPISODE_NAME_LEN)));
    }

    #[test]
    fn timestamps_must_be_plain_digits() {
        assert_eq!(timestamp("0").unwrap(), 0);
        assert_eq!(timestamp("3661001").unwrap(), 3_661_001);
        for bad in ["", "-1", "+1", "1.5", " 1", "1e3", "abc", "9999999999999"] {
            assert!(timestamp(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn clip_file_name_follows_convention() {
        let r = MediaRequest::new("Ep1", 1500).unwrap();
        assert_eq!(r.clip_file_name(), "Ep1.1500.webm");
    }

    #[test]
    fn parses_generated_clip_names_only() {
        assert_eq!(
            parse_clip_file_name("Ep 1.2.1500.webm"),
            Some(MediaRequest::new("Ep 1.2", 1500).unwrap())
        );
        assert_eq!(parse_clip_file_name("Ep1.01500.webm"), None);
        assert_eq!(parse_clip_file_name("Ep1.webm"), None);
        assert_eq!(parse_clip_file_name("Ep1.1500.webm.part"), None);
        assert_eq!(parse_clip_file_name("..%2f.1.webm"), None);
        assert_eq!(parse_clip_file_name(".hidden.1.webm"), None);
    }
}
