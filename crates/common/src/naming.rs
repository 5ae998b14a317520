//! Canonical stored file names.
//!
//! A stored name is `"{song} - {detail}{year}{ext}"`. The function is pure so
//! that callers can detect whether a rename is needed by comparing outputs.

use unicode_normalization::UnicodeNormalization;

use crate::{AssetType, FileMetadata};

const ILLEGAL_CHARS: [char; 10] = ['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];
const UNTITLED_SONG: &str = "Untitled Song";

pub fn compute_file_name(
    metadata: &FileMetadata,
    asset_type: AssetType,
    song_name: &str,
    original_file_name: &str,
) -> String {
    let detail = sanitize_name(detail_token(metadata, asset_type));
    let song = if song_name.trim().is_empty() {
        UNTITLED_SONG.to_string()
    } else {
        sanitize_name(song_name)
    };
    let year = match find_year(&metadata.date) {
        Some(year) => format!(" -- {}", year),
        None => String::new(),
    };
    format!(
        "{} - {}{}{}",
        song,
        detail,
        year,
        extension_of(original_file_name)
    )
}

/// Replaces characters that are unsafe in file names with `_` and normalizes
/// to composed (NFC) form.
pub fn sanitize_name(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ILLEGAL_CHARS.contains(&ch) {
                '_'
            } else {
                ch
            }
        })
        .nfc()
        .collect()
}

/// Extension of the last path component including the dot, or `""`.
pub fn extension_of(file_name: &str) -> &str {
    let base = match file_name.rfind(['/', '\\']) {
        Some(idx) => &file_name[idx + 1..],
        None => file_name,
    };
    match base.rfind('.') {
        Some(idx) => &base[idx..],
        None => "",
    }
}

fn detail_token(metadata: &FileMetadata, asset_type: AssetType) -> &str {
    let candidates: [&str; 2] = match asset_type {
        AssetType::Recordings => [metadata.album.as_str(), metadata.name.as_str()],
        AssetType::SheetMusic => [metadata.instrument.as_str(), metadata.name.as_str()],
        AssetType::Lyrics | AssetType::OtherFiles => [metadata.name.as_str(), ""],
    };
    for candidate in candidates {
        if !candidate.trim().is_empty() {
            return candidate;
        }
    }
    match asset_type {
        AssetType::Recordings => "Recording",
        AssetType::SheetMusic => "Sheet",
        AssetType::Lyrics => "Lyrics",
        AssetType::OtherFiles => "File",
    }
}

/// First standalone run of exactly four ASCII digits.
fn find_year(date: &str) -> Option<&str> {
    let bytes = date.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut idx = 0;
    while idx < bytes.len() {
        if !bytes[idx].is_ascii_digit() {
            idx += 1;
            continue;
        }
        let start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        let bounded_left = start == 0 || !is_word(bytes[start - 1]);
        let bounded_right = idx == bytes.len() || !is_word(bytes[idx]);
        if idx - start == 4 && bounded_left && bounded_right {
            return Some(&date[start..idx]);
        }
    }
    None
}
