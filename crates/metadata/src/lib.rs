use std::io::Cursor;

use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use lofty::probe::Probe;

/// What an uploaded audio payload tells us about itself.
#[derive(Debug, Default, Clone)]
pub struct AudioProbe {
    pub duration_secs: Option<f64>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Decodes container metadata from an in-memory payload.
pub fn probe_audio(bytes: &[u8]) -> Result<AudioProbe, MetadataError> {
    let tagged_file = Probe::new(Cursor::new(bytes))
        .guess_file_type()?
        .read()?;
    let properties = tagged_file.properties();

    let mut probe = AudioProbe::default();

    let duration = properties.duration();
    if !duration.is_zero() {
        probe.duration_secs = Some(duration.as_secs_f64());
    }

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        probe.title = tag
            .get_string(&ItemKey::TrackTitle)
            .and_then(clean_text);
        probe.album = tag
            .get_string(&ItemKey::AlbumTitle)
            .and_then(clean_text);
        probe.year = tag.get_string(&ItemKey::Year).and_then(parse_year);
    }

    Ok(probe)
}

fn clean_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_year_from_tag_text() {
        assert_eq!(parse_year("1998-04-02"), Some(1998));
        assert_eq!(parse_year("  2003"), Some(2003));
        assert_eq!(parse_year("98"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn garbage_payload_is_an_error_not_a_panic() {
        assert!(probe_audio(b"definitely not audio").is_err());
    }

    #[test]
    fn blank_tag_text_is_dropped() {
        assert_eq!(clean_text("   "), None);
        assert_eq!(clean_text(" Live "), Some("Live".to_string()));
    }
}
