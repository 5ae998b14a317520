pub mod layout;
pub mod naming;

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use layout::{file_relpath, resolve_dir, song_dir, CollectionRef, SongRef};
pub use naming::{compute_file_name, extension_of, sanitize_name};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetType {
    #[serde(rename = "Recordings")]
    Recordings,
    #[serde(rename = "Sheet Music")]
    SheetMusic,
    #[serde(rename = "Lyrics")]
    Lyrics,
    #[serde(rename = "Other Files")]
    OtherFiles,
}

impl AssetType {
    pub const ALL: [AssetType; 4] = [
        AssetType::Recordings,
        AssetType::SheetMusic,
        AssetType::Lyrics,
        AssetType::OtherFiles,
    ];

    /// Directory name and wire label.
    pub fn label(self) -> &'static str {
        match self {
            AssetType::Recordings => "Recordings",
            AssetType::SheetMusic => "Sheet Music",
            AssetType::Lyrics => "Lyrics",
            AssetType::OtherFiles => "Other Files",
        }
    }

    /// Short token used inside catalog index keys.
    pub fn key(self) -> &'static str {
        match self {
            AssetType::Recordings => "rec",
            AssetType::SheetMusic => "sheet",
            AssetType::Lyrics => "lyrics",
            AssetType::OtherFiles => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "recordings" | "recording" => Some(AssetType::Recordings),
            "sheetmusic" | "sheet" => Some(AssetType::SheetMusic),
            "lyrics" => Some(AssetType::Lyrics),
            "otherfiles" | "other" => Some(AssetType::OtherFiles),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: u64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

/// Mutable song fields as submitted by a client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongDraft {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: u64,
    pub song_id: u64,
    pub asset_type: AssetType,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMetadata {
    pub name: String,
    pub description: String,
    pub date: String,
    pub album: String,
    pub instrument: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetFile {
    pub id: u64,
    pub song_id: u64,
    pub asset_type: AssetType,
    pub collection_id: Option<u64>,
    pub metadata: FileMetadata,
    /// Seconds; zero when unknown or not a recording.
    pub duration: f64,
    /// Extension of the originally uploaded file, including the dot.
    pub extension: String,
    pub file_path: String,
    pub content_hash: String,
}

pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Joins a `/`-separated relative path onto `root`, dropping empty, `.` and
/// `..` segments so the result never escapes `root`.
pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split(['/', '\\']) {
        if part.is_empty() || part == "." || part == ".." {
            continue;
        }
        out.push(part);
    }
    out
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Parent directory of a relative path, or `""` for top-level entries.
pub fn parent_relpath(relpath: &str) -> &str {
    match relpath.rfind('/') {
        Some(idx) => &relpath[..idx],
        None => "",
    }
}
