//! File store over a drive-like folder tree where nodes are addressed by id
//! and names are not unique per folder. Every create is preceded by a
//! lookup so the store never produces duplicate names.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::{non_root_segments, segments, FileStore, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
}

/// Minimal surface of a remote folder-tree API.
pub trait FolderApi: Send + Sync {
    fn root_id(&self) -> String;
    fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<FolderNode>, StoreError>;
    fn list_children(&self, parent_id: &str) -> Result<Vec<FolderNode>, StoreError>;
    fn create_folder(&self, parent_id: &str, name: &str) -> Result<FolderNode, StoreError>;
    fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<FolderNode, StoreError>;
    fn update_file(&self, file_id: &str, bytes: &[u8]) -> Result<(), StoreError>;
    fn read_file(&self, file_id: &str) -> Result<Vec<u8>, StoreError>;
    fn move_node(&self, node_id: &str, new_parent_id: &str, new_name: &str)
        -> Result<(), StoreError>;
    /// Deletes a node; folders are deleted with their contents.
    fn delete_node(&self, node_id: &str) -> Result<(), StoreError>;
}

pub struct FolderTreeStore<A: FolderApi> {
    api: A,
}

impl<A: FolderApi> FolderTreeStore<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn resolve(&self, parts: &[&str]) -> Result<Option<FolderNode>, StoreError> {
        let mut current = FolderNode {
            id: self.api.root_id(),
            name: String::new(),
            is_folder: true,
        };
        for part in parts {
            if !current.is_folder {
                return Ok(None);
            }
            current = match self.api.find_child(&current.id, part)? {
                Some(node) => node,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    fn ensure_folders(&self, parts: &[&str]) -> Result<String, StoreError> {
        let mut parent_id = self.api.root_id();
        for part in parts {
            parent_id = match self.api.find_child(&parent_id, part)? {
                Some(node) if node.is_folder => node.id,
                Some(_) => return Err(StoreError::AlreadyExists(parts.join("/"))),
                None => {
                    debug!("creating folder {:?} under {}", part, parent_id);
                    self.api.create_folder(&parent_id, part)?.id
                }
            };
        }
        Ok(parent_id)
    }

    fn resolve_file(&self, relpath: &str) -> Result<Option<FolderNode>, StoreError> {
        let parts = non_root_segments(relpath)?;
        Ok(self.resolve(&parts)?.filter(|node| !node.is_folder))
    }

    fn prune_folder(&self, folder_id: &str) -> Result<bool, StoreError> {
        let mut empty = true;
        for child in self.api.list_children(folder_id)? {
            if child.is_folder && self.prune_folder(&child.id)? {
                self.api.delete_node(&child.id)?;
            } else {
                empty = false;
            }
        }
        Ok(empty)
    }
}

impl<A: FolderApi> FileStore for FolderTreeStore<A> {
    fn put(&self, relpath: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let parts = non_root_segments(relpath)?;
        let (name, dirs) = match parts.split_last() {
            Some(split) => split,
            None => return Err(StoreError::InvalidPath(relpath.to_string())),
        };
        let parent_id = self.ensure_folders(dirs)?;
        match self.api.find_child(&parent_id, name)? {
            Some(node) if node.is_folder => Err(StoreError::AlreadyExists(relpath.to_string())),
            Some(node) => self.api.update_file(&node.id, bytes),
            None => self.api.create_file(&parent_id, name, bytes).map(|_| ()),
        }
    }

    fn get(&self, relpath: &str) -> Result<Vec<u8>, StoreError> {
        match self.resolve_file(relpath)? {
            Some(node) => self.api.read_file(&node.id),
            None => Err(StoreError::NotFound(relpath.to_string())),
        }
    }

    fn exists(&self, relpath: &str) -> Result<bool, StoreError> {
        Ok(self.resolve_file(relpath)?.is_some())
    }

    fn move_file(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let from_parts = non_root_segments(from)?;
        let to_parts = non_root_segments(to)?;
        if from_parts == to_parts {
            return Ok(());
        }
        let source = match self.resolve_file(from)? {
            Some(node) => node,
            None => return Err(StoreError::NotFound(from.to_string())),
        };
        if self.resolve(&to_parts)?.is_some() {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        let (name, dirs) = match to_parts.split_last() {
            Some(split) => split,
            None => return Err(StoreError::InvalidPath(to.to_string())),
        };
        let parent_id = self.ensure_folders(dirs)?;
        self.api.move_node(&source.id, &parent_id, name)
    }

    fn delete(&self, relpath: &str) -> Result<(), StoreError> {
        match self.resolve_file(relpath)? {
            Some(node) => self.api.delete_node(&node.id),
            None => Ok(()),
        }
    }

    fn ensure_dir(&self, relpath: &str) -> Result<(), StoreError> {
        self.ensure_folders(&segments(relpath)).map(|_| ())
    }

    fn remove_tree(&self, relpath: &str) -> Result<(), StoreError> {
        let parts = non_root_segments(relpath)?;
        match self.resolve(&parts)? {
            Some(node) => self.api.delete_node(&node.id),
            None => Ok(()),
        }
    }

    fn prune_empty_dirs(&self, relpath: &str) -> Result<(), StoreError> {
        let parts = segments(relpath);
        let node = match self.resolve(&parts)? {
            Some(node) if node.is_folder => node,
            _ => return Ok(()),
        };
        let empty = self.prune_folder(&node.id)?;
        if empty && !parts.is_empty() {
            self.api.delete_node(&node.id)?;
        }
        Ok(())
    }
}

const ROOT_ID: &str = "root";

/// In-process folder tree. Like a real drive it accepts duplicate names under
/// one folder; de-duplication is the store's job.
#[derive(Default)]
pub struct MemoryFolderApi {
    tree: Mutex<MemoryTree>,
}

#[derive(Default)]
struct MemoryTree {
    nodes: HashMap<String, MemoryNode>,
    next_id: u64,
}

struct MemoryNode {
    parent_id: String,
    name: String,
    content: Option<Vec<u8>>,
}

impl MemoryFolderApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes named `name` directly under `parent_id`.
    pub fn count_named(&self, parent_id: &str, name: &str) -> usize {
        self.tree
            .lock()
            .nodes
            .values()
            .filter(|node| node.parent_id == parent_id && node.name == name)
            .count()
    }
}

impl MemoryTree {
    fn insert(&mut self, parent_id: &str, name: &str, content: Option<Vec<u8>>) -> FolderNode {
        self.next_id += 1;
        let id = format!("node-{}", self.next_id);
        let is_folder = content.is_none();
        self.nodes.insert(
            id.clone(),
            MemoryNode {
                parent_id: parent_id.to_string(),
                name: name.to_string(),
                content,
            },
        );
        FolderNode {
            id,
            name: name.to_string(),
            is_folder,
        }
    }

    fn check_folder(&self, id: &str) -> Result<(), StoreError> {
        if id == ROOT_ID {
            return Ok(());
        }
        match self.nodes.get(id) {
            Some(node) if node.content.is_none() => Ok(()),
            Some(_) => Err(StoreError::Backend(format!("{} is not a folder", id))),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn children(&self, parent_id: &str) -> Vec<FolderNode> {
        let mut items: Vec<FolderNode> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent_id == parent_id)
            .map(|(id, node)| FolderNode {
                id: id.clone(),
                name: node.name.clone(),
                is_folder: node.content.is_none(),
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        items
    }
}

impl FolderApi for MemoryFolderApi {
    fn root_id(&self) -> String {
        ROOT_ID.to_string()
    }

    fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<FolderNode>, StoreError> {
        let tree = self.tree.lock();
        Ok(tree
            .children(parent_id)
            .into_iter()
            .find(|node| node.name == name))
    }

    fn list_children(&self, parent_id: &str) -> Result<Vec<FolderNode>, StoreError> {
        let tree = self.tree.lock();
        tree.check_folder(parent_id)?;
        Ok(tree.children(parent_id))
    }

    fn create_folder(&self, parent_id: &str, name: &str) -> Result<FolderNode, StoreError> {
        let mut tree = self.tree.lock();
        tree.check_folder(parent_id)?;
        Ok(tree.insert(parent_id, name, None))
    }

    fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<FolderNode, StoreError> {
        let mut tree = self.tree.lock();
        tree.check_folder(parent_id)?;
        Ok(tree.insert(parent_id, name, Some(bytes.to_vec())))
    }

    fn update_file(&self, file_id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut tree = self.tree.lock();
        match tree.nodes.get_mut(file_id) {
            Some(node) if node.content.is_some() => {
                node.content = Some(bytes.to_vec());
                Ok(())
            }
            _ => Err(StoreError::NotFound(file_id.to_string())),
        }
    }

    fn read_file(&self, file_id: &str) -> Result<Vec<u8>, StoreError> {
        let tree = self.tree.lock();
        match tree.nodes.get(file_id).and_then(|node| node.content.as_ref()) {
            Some(content) => Ok(content.clone()),
            None => Err(StoreError::NotFound(file_id.to_string())),
        }
    }

    fn move_node(
        &self,
        node_id: &str,
        new_parent_id: &str,
        new_name: &str,
    ) -> Result<(), StoreError> {
        let mut tree = self.tree.lock();
        tree.check_folder(new_parent_id)?;
        match tree.nodes.get_mut(node_id) {
            Some(node) => {
                node.parent_id = new_parent_id.to_string();
                node.name = new_name.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound(node_id.to_string())),
        }
    }

    fn delete_node(&self, node_id: &str) -> Result<(), StoreError> {
        let mut tree = self.tree.lock();
        if !tree.nodes.contains_key(node_id) {
            return Err(StoreError::NotFound(node_id.to_string()));
        }
        let mut pending = vec![node_id.to_string()];
        while let Some(id) = pending.pop() {
            pending.extend(tree.children(&id).into_iter().map(|child| child.id));
            tree.nodes.remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FolderTreeStore<MemoryFolderApi> {
        FolderTreeStore::new(MemoryFolderApi::new())
    }

    #[test]
    fn repeated_puts_never_duplicate_names() {
        let store = store();
        store.put("S/Recordings/a.mp3", b"one").unwrap();
        store.put("S/Recordings/a.mp3", b"two").unwrap();
        store.put("S/Recordings/b.mp3", b"b").unwrap();
        store.ensure_dir("S/Recordings").unwrap();

        let api = store.api();
        assert_eq!(api.count_named(ROOT_ID, "S"), 1);
        let song = api.find_child(ROOT_ID, "S").unwrap().unwrap();
        assert_eq!(api.count_named(&song.id, "Recordings"), 1);
        let recordings = api.find_child(&song.id, "Recordings").unwrap().unwrap();
        assert_eq!(api.count_named(&recordings.id, "a.mp3"), 1);
        assert_eq!(store.get("S/Recordings/a.mp3").unwrap(), b"two");
    }

    #[test]
    fn move_follows_file_store_contract() {
        let store = store();
        assert!(matches!(
            store.move_file("S/a", "S/b"),
            Err(StoreError::NotFound(_))
        ));
        store.put("S/a", b"a").unwrap();
        store.put("S/b", b"b").unwrap();
        assert!(matches!(
            store.move_file("S/a", "S/b"),
            Err(StoreError::AlreadyExists(_))
        ));
        store.move_file("S/a", "T/Lyrics/a").unwrap();
        assert!(!store.exists("S/a").unwrap());
        assert_eq!(store.get("T/Lyrics/a").unwrap(), b"a");
    }

    #[test]
    fn delete_and_prune() {
        let store = store();
        store.put("S/Lyrics/l.txt", b"l").unwrap();
        store.ensure_dir("S/Recordings/Live").unwrap();
        store.delete("S/Lyrics/missing.txt").unwrap();

        store.prune_empty_dirs("S").unwrap();
        assert!(store.exists("S/Lyrics/l.txt").unwrap());
        let song = store.api().find_child(ROOT_ID, "S").unwrap().unwrap();
        assert!(store.api().find_child(&song.id, "Recordings").unwrap().is_none());

        store.remove_tree("S").unwrap();
        assert!(store.api().list_children(ROOT_ID).unwrap().is_empty());
        store.remove_tree("S").unwrap();
    }
}
