//! Directory layout of the uploads tree:
//! `<song>/<asset type>/[<collection>/]<file name>`.
//!
//! Nothing here touches the filesystem; directory creation belongs to the
//! file store.

use crate::naming::sanitize_name;
use crate::{AssetType, Collection, Song};

#[derive(Clone, Copy, Debug)]
pub struct SongRef<'a> {
    pub id: u64,
    pub name: &'a str,
}

#[derive(Clone, Copy, Debug)]
pub struct CollectionRef<'a> {
    pub id: u64,
    pub name: &'a str,
}

impl<'a> From<&'a Song> for SongRef<'a> {
    fn from(song: &'a Song) -> Self {
        SongRef {
            id: song.id,
            name: &song.name,
        }
    }
}

impl<'a> From<&'a Collection> for CollectionRef<'a> {
    fn from(collection: &'a Collection) -> Self {
        CollectionRef {
            id: collection.id,
            name: &collection.name,
        }
    }
}

pub fn song_dir(song: SongRef<'_>) -> String {
    segment(song.name, || format!("song_{}", song.id))
}

pub fn resolve_dir(
    song: SongRef<'_>,
    asset_type: AssetType,
    collection: Option<CollectionRef<'_>>,
) -> String {
    let mut out = song_dir(song);
    out.push('/');
    out.push_str(asset_type.label());
    if let Some(collection) = collection {
        out.push('/');
        out.push_str(&segment(collection.name, || {
            format!("collection_{}", collection.id)
        }));
    }
    out
}

pub fn file_relpath(dir: &str, file_name: &str) -> String {
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", dir, file_name)
    }
}

fn segment(name: &str, fallback: impl FnOnce() -> String) -> String {
    if name.trim().is_empty() {
        return fallback();
    }
    let cleaned = sanitize_name(name);
    match cleaned.as_str() {
        "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: u64, name: &str) -> SongRef<'_> {
        SongRef { id, name }
    }

    #[test]
    fn ungrouped_files_have_two_segments() {
        let dir = resolve_dir(song(5, "Test Song"), AssetType::Recordings, None);
        assert_eq!(dir, "Test Song/Recordings");
    }

    #[test]
    fn collection_adds_third_segment() {
        let collection = CollectionRef {
            id: 9,
            name: "Live Takes",
        };
        let dir = resolve_dir(song(5, "Test Song"), AssetType::SheetMusic, Some(collection));
        assert_eq!(dir, "Test Song/Sheet Music/Live Takes");
    }

    #[test]
    fn unnamed_song_and_collection_fall_back_to_ids() {
        let collection = CollectionRef { id: 3, name: " " };
        let dir = resolve_dir(song(12, ""), AssetType::Lyrics, Some(collection));
        assert_eq!(dir, "song_12/Lyrics/collection_3");
    }

    #[test]
    fn dot_segments_cannot_climb_out() {
        assert_eq!(song_dir(song(1, "..")), "_");
        assert_eq!(song_dir(song(1, "a/b")), "a_b");
    }

    #[test]
    fn file_relpath_joins_with_slash() {
        assert_eq!(file_relpath("A/Lyrics", "A - Lyrics.txt"), "A/Lyrics/A - Lyrics.txt");
        assert_eq!(file_relpath("", "x"), "x");
    }
}
