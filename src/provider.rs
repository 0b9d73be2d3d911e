//! Tree and blob providers
//!
//! The engine never touches a filesystem directly: a [`TreeProvider`] hands
//! it the hierarchy once per load, raw file bytes on demand, and refreshed
//! single-level listings for incremental merges. [`DiskProvider`] serves a
//! local checkout (gitignore-aware), [`MemoryProvider`] serves a synthetic
//! tree and backs most of the test suite.

use crate::tree::{ContentState, DirListing, EntryId, EntryKind, FileTree, ListingEntry};
use ignore::WalkBuilder;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors crossing the provider boundary. They degrade (a node shows as an
/// empty box) and never propagate into the render loop.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("i/o error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed tree data: {0}")]
    Malformed(String),
}

/// A freshly loaded hierarchy plus its total weight
pub struct TreeData {
    pub tree: FileTree,
    pub total_weight: u64,
}

/// External tree/blob collaborator
pub trait TreeProvider {
    /// One-shot load replacing the whole working tree
    fn load_tree(&mut self) -> Result<TreeData, ProviderError>;

    /// Raw bytes of one file, by slash-delimited path from the tree root
    fn read_file_bytes(&mut self, path: &str) -> Result<Vec<u8>, ProviderError>;

    /// Refreshed single-level listing of one directory
    fn read_dir(&mut self, path: &str) -> Result<DirListing, ProviderError>;
}

/// Rough line-count estimate used as the layout weight
fn weight_from_len(len: u64) -> u64 {
    len / 40 + 1
}

/// Serves a repository checkout from local disk. The walk respects ignore
/// rules and skips hidden files, so generated and vendored trees do not
/// drown the layout.
pub struct DiskProvider {
    root: PathBuf,
}

impl DiskProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut out = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            out.push(segment);
        }
        out
    }

    fn io_error(path: &Path, source: std::io::Error) -> ProviderError {
        let path = path.display().to_string();
        if source.kind() == std::io::ErrorKind::NotFound {
            ProviderError::NotFound(path)
        } else {
            ProviderError::Io { path, source }
        }
    }
}

impl TreeProvider for DiskProvider {
    fn load_tree(&mut self) -> Result<TreeData, ProviderError> {
        let root_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo".to_string());
        let mut tree = FileTree::new(&root_name);
        let mut dirs: HashMap<PathBuf, EntryId> = HashMap::new();
        dirs.insert(PathBuf::new(), tree.root());

        for item in WalkBuilder::new(&self.root).build() {
            let item = match item {
                Ok(i) => i,
                Err(err) => {
                    log::warn!("walk error under {}: {err}", self.root.display());
                    continue;
                }
            };
            let rel = match item.path().strip_prefix(&self.root) {
                Ok(r) if !r.as_os_str().is_empty() => r.to_path_buf(),
                _ => continue,
            };
            let parent = match rel.parent().and_then(|p| dirs.get(p)) {
                Some(&id) => id,
                // parent was skipped by ignore rules
                None => continue,
            };
            let name = match rel.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => continue,
            };
            let is_dir = item.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                let id = tree.add_child(parent, &name, EntryKind::Dir { children: Vec::new() }, 0);
                dirs.insert(rel, id);
            } else {
                let weight = item
                    .metadata()
                    .map(|m| weight_from_len(m.len()))
                    .unwrap_or(1);
                tree.add_child(
                    parent,
                    &name,
                    EntryKind::File {
                        content: ContentState::Unfetched,
                    },
                    weight,
                );
            }
        }
        tree.rollup_weights();
        let total_weight = tree.entry(tree.root()).weight;
        Ok(TreeData { tree, total_weight })
    }

    fn read_file_bytes(&mut self, path: &str) -> Result<Vec<u8>, ProviderError> {
        let full = self.resolve(path);
        std::fs::read(&full).map_err(|e| Self::io_error(&full, e))
    }

    fn read_dir(&mut self, path: &str) -> Result<DirListing, ProviderError> {
        let full = self.resolve(path);
        if !full.is_dir() {
            return Err(ProviderError::NotFound(full.display().to_string()));
        }
        let mut listing = DirListing::default();
        for item in WalkBuilder::new(&full).max_depth(Some(1)).build() {
            let item = item.map_err(|e| ProviderError::Malformed(e.to_string()))?;
            if item.depth() == 0 {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            let is_dir = item.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let weight = if is_dir {
                0
            } else {
                item.metadata().map(|m| weight_from_len(m.len())).unwrap_or(1)
            };
            listing.entries.push(ListingEntry { name, is_dir, weight });
        }
        Ok(listing)
    }
}

/// In-memory provider: a synthetic tree built from path strings
#[derive(Default)]
pub struct MemoryProvider {
    files: Vec<(String, Vec<u8>)>,
    fail_paths: HashSet<String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file at a slash-delimited path like "/src/main.rs"
    pub fn add_file(&mut self, path: &str, contents: &[u8]) -> &mut Self {
        self.files.push((path.to_string(), contents.to_vec()));
        self
    }

    /// Make `read_file_bytes` fail for this path
    pub fn fail_path(&mut self, path: &str) -> &mut Self {
        self.fail_paths.insert(path.to_string());
        self
    }

    pub fn remove_file(&mut self, path: &str) {
        self.files.retain(|(p, _)| p != path);
    }
}

impl TreeProvider for MemoryProvider {
    fn load_tree(&mut self) -> Result<TreeData, ProviderError> {
        let mut tree = FileTree::new("mem");
        for (path, contents) in &self.files {
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            if segments.is_empty() {
                return Err(ProviderError::Malformed(format!("empty path: {path:?}")));
            }
            let mut cur = tree.root();
            for dir in &segments[..segments.len() - 1] {
                cur = match tree.find_child(cur, dir) {
                    Some(id) => id,
                    None => tree.add_child(cur, dir, EntryKind::Dir { children: Vec::new() }, 0),
                };
            }
            let name = segments[segments.len() - 1];
            if tree.find_child(cur, name).is_none() {
                let weight = contents.iter().filter(|&&b| b == b'\n').count() as u64 + 1;
                tree.add_child(
                    cur,
                    name,
                    EntryKind::File {
                        content: ContentState::Unfetched,
                    },
                    weight,
                );
            }
        }
        tree.rollup_weights();
        let total_weight = tree.entry(tree.root()).weight;
        Ok(TreeData { tree, total_weight })
    }

    fn read_file_bytes(&mut self, path: &str) -> Result<Vec<u8>, ProviderError> {
        if self.fail_paths.contains(path) {
            return Err(ProviderError::Io {
                path: path.to_string(),
                source: std::io::Error::other("simulated failure"),
            });
        }
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))
    }

    fn read_dir(&mut self, path: &str) -> Result<DirListing, ProviderError> {
        let prefix = if path == "/" || path.is_empty() {
            String::new()
        } else {
            path.trim_end_matches('/').to_string()
        };
        let mut seen: Vec<ListingEntry> = Vec::new();
        for (p, contents) in &self.files {
            let Some(rest) = p.strip_prefix(&prefix) else {
                continue;
            };
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                continue;
            }
            let (name, is_dir) = match rest.split_once('/') {
                Some((head, _)) => (head, true),
                None => (rest, false),
            };
            if !seen.iter().any(|e| e.name == name) {
                seen.push(ListingEntry {
                    name: name.to_string(),
                    is_dir,
                    weight: if is_dir {
                        0
                    } else {
                        contents.iter().filter(|&&b| b == b'\n').count() as u64 + 1
                    },
                });
            }
        }
        Ok(DirListing { entries: seen })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_provider_builds_a_weighted_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), vec![b'x'; 400]).unwrap();
        std::fs::write(dir.path().join("README.md"), b"hello").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"nope").unwrap();

        let mut provider = DiskProvider::new(dir.path());
        let data = provider.load_tree().expect("load");
        let t = &data.tree;
        assert!(t.entry_by_path("/src/main.rs").is_some());
        assert!(t.entry_by_path("/README.md").is_some());
        assert!(t.entry_by_path("/.hidden").is_none());

        let main = t.entry_by_path("/src/main.rs").unwrap();
        assert_eq!(t.entry(main).weight, 400 / 40 + 1);
        assert_eq!(data.total_weight, t.entry(t.root()).weight);
    }

    #[test]
    fn disk_provider_reads_bytes_and_reports_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), b"contents").unwrap();
        let mut provider = DiskProvider::new(dir.path());
        assert_eq!(provider.read_file_bytes("/a.txt").unwrap(), b"contents");
        assert!(matches!(
            provider.read_file_bytes("/missing.txt"),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn disk_provider_lists_one_level() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/inner.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"y").unwrap();

        let mut provider = DiskProvider::new(dir.path());
        let listing = provider.read_dir("/").expect("listing");
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"sub"));
        assert!(names.contains(&"top.txt"));
        assert!(!names.contains(&"inner.txt"));
    }

    #[test]
    fn memory_provider_round_trips() {
        let mut provider = MemoryProvider::new();
        provider
            .add_file("/src/a.rs", b"fn a() {}\n")
            .add_file("/src/deep/b.rs", b"fn b() {}\n");
        let data = provider.load_tree().expect("load");
        assert!(data.tree.entry_by_path("/src/deep/b.rs").is_some());
        assert_eq!(provider.read_file_bytes("/src/a.rs").unwrap(), b"fn a() {}\n");

        let listing = provider.read_dir("/src").expect("list");
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"a.rs"));
        assert!(names.contains(&"deep"));
    }
}
