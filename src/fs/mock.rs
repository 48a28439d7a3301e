// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File {
        content: Vec<u8>,
        modified: SystemTime,
    },
    Dir(Vec<String>), // List of child names
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockEntry>,
    /// How many times each file was opened or read.
    reads: HashMap<PathBuf, usize>,
    /// Paths whose writes and removals fail.
    failing: HashSet<PathBuf>,
    /// Logical clock used for modification times.
    clock: u64,
}

/// In-memory filesystem for tests.
///
/// Every write advances a logical clock, so modification times change on
/// each write unless a test pins them with [`MockFileSystem::set_modified`].
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.state
            .lock()
            .unwrap()
            .files
            .insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));
        fs
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(state.clock);
        state.files.insert(
            path.clone(),
            MockEntry::File {
                content: content.into(),
                modified,
            },
        );

        if let Some(parent) = parent_of(&path) {
            ensure_dir_entry(&mut state.files, &parent);
            link_child(&mut state.files, &parent, &path);
        }
    }

    /// Create an empty directory (and its ancestors).
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.state.lock().unwrap();
        ensure_dir_entry(&mut state.files, path.as_ref());
    }

    /// Pin the modification time of an existing file.
    pub fn set_modified(&self, path: impl AsRef<Path>, at: SystemTime) {
        let mut state = self.state.lock().unwrap();
        if let Some(MockEntry::File { modified, .. }) = state.files.get_mut(path.as_ref()) {
            *modified = at;
        }
    }

    /// Replace file content without touching its modification time.
    pub fn replace_content_keep_mtime(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        if let Some(MockEntry::File { content, .. }) = state.files.get_mut(path.as_ref()) {
            *content = data.into();
        }
    }

    /// Number of times `path` has been opened or read.
    pub fn reads(&self, path: impl AsRef<Path>) -> usize {
        let state = self.state.lock().unwrap();
        state.reads.get(path.as_ref()).copied().unwrap_or(0)
    }

    /// Make writes and removals of `path` fail.
    pub fn fail_on(&self, path: impl AsRef<Path>) {
        let mut state = self.state.lock().unwrap();
        state.failing.insert(path.as_ref().to_path_buf());
    }

    pub fn content(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        match state.files.get(path.as_ref()) {
            Some(MockEntry::File { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }

    fn file_content(&self, path: &Path) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        let content = match state.files.get(path) {
            Some(MockEntry::File { content, .. }) => content.clone(),
            Some(MockEntry::Dir(_)) => return Err(anyhow!("Is a directory: {:?}", path)),
            None => return Err(anyhow!("File not found: {:?}", path)),
        };
        *state.reads.entry(path.to_path_buf()).or_insert(0) += 1;
        Ok(content)
    }
}

fn parent_of(path: &Path) -> Option<PathBuf> {
    path.parent().map(|parent| {
        if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        }
    })
}

fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
        if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
    }
}

fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
    if let Some(parent) = parent_of(path) {
        if parent != path {
            ensure_dir_entry(files, &parent);
            link_child(files, &parent, path);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let content = self.file_content(path)?;
        Ok(Box::new(Cursor::new(content)))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.file_content(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if self.state.lock().unwrap().failing.contains(path) {
            return Err(anyhow!("injected write failure: {:?}", path));
        }
        self.add_file(path, contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(path) {
            return Err(anyhow!("injected remove failure: {:?}", path));
        }
        match state.files.get(path) {
            Some(MockEntry::File { .. }) => {}
            Some(MockEntry::Dir(_)) => return Err(anyhow!("Is a directory: {:?}", path)),
            None => return Err(anyhow!("File not found: {:?}", path)),
        }
        state.files.remove(path);
        if let (Some(parent), Some(name)) = (parent_of(path), path.file_name()) {
            if let Some(MockEntry::Dir(children)) = state.files.get_mut(&parent) {
                children.retain(|c| c.as_str() != name.to_string_lossy());
            }
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state.lock().unwrap().files.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.files.get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.files.get(path), Some(MockEntry::Dir(_)))
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        let state = self.state.lock().unwrap();
        match state.files.get(path) {
            Some(MockEntry::File { modified, .. }) => Ok(*modified),
            Some(MockEntry::Dir(_)) => Ok(SystemTime::UNIX_EPOCH),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state.lock().unwrap();
        match state.files.get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}
