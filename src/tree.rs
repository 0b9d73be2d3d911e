//! Arena-backed file tree
//!
//! The whole hierarchy lives in one `Vec` of entries addressed by [`EntryId`]
//! handles; parents are non-owning back-references, so the cyclic
//! parent/child structure needs no reference counting. Layout, buffer and
//! content fields live directly on the entry and are written by their owning
//! subsystems (layout engine, buffer manager, content loader).

use std::cmp::Ordering;

/// Stable handle to an entry in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Content lifecycle of a file entry, mutated only by the content loader
#[derive(Debug, Clone, PartialEq)]
pub enum ContentState {
    /// Nothing fetched; eligible for streaming
    Unfetched,
    /// Admitted to the visible set, fetch not yet started or in flight
    Queued,
    /// Fetched, geometry being built across scheduler slices
    Building,
    /// Content geometry attached and renderable
    Ready(ContentInfo),
    /// Provider failed for this path; never retried this session
    Failed,
}

/// Text-space metrics recorded when a file's content geometry is attached,
/// used for line-accurate navigation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentInfo {
    pub line_count: u32,
    /// Height of one text line in world units
    pub text_scale: f32,
    /// Total height of the text block in world units
    pub text_height: f32,
    /// Left edge of the text block
    pub text_x: f32,
    /// Bottom edge of the text block
    pub text_y: f32,
    /// Top edge of the text block; line `n` sits at
    /// `text_y_zero - ((n + 0.5) / line_count) * text_height`
    pub text_y_zero: f32,
}

/// Directory-or-file tag; the layout engine and LOD selector branch on this
/// rather than probing for optional fields
#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Dir { children: Vec<EntryId> },
    File { content: ContentState },
}

/// One file or directory in the tree
#[derive(Debug, Clone)]
pub struct FsEntry {
    pub name: String,
    pub parent: Option<EntryId>,
    pub kind: EntryKind,
    /// Provider-supplied weight (for example a line-count estimate); drives
    /// the area share the layout engine allocates
    pub weight: u64,

    // Layout square [x, x+scale] x [y, y+scale] at depth z, written once per
    // layout pass
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub scale: f32,

    // Rectangle draw range (vertex units), contiguous over the entry and,
    // for directories, all descendants in layout-visit order
    pub vertex_index: i32,
    pub last_vertex_index: i32,

    // Text draw range into the shared text arena, -1 while unmaterialized
    pub text_vertex_index: i32,
    pub last_text_vertex_index: i32,

    /// Bumped on eviction; in-flight work holding a stale generation must
    /// discard its result instead of attaching
    pub content_gen: u32,
    /// Deferred line navigation, resolved when content streaming completes
    pub target_line: Option<u32>,
}

impl FsEntry {
    fn new(name: String, parent: Option<EntryId>, kind: EntryKind, weight: u64) -> Self {
        Self {
            name,
            parent,
            kind,
            weight,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            scale: 0.0,
            vertex_index: -1,
            last_vertex_index: -1,
            text_vertex_index: -1,
            last_text_vertex_index: -1,
            content_gen: 0,
            target_line: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Dir { .. })
    }

    pub fn content(&self) -> Option<&ContentInfo> {
        match &self.kind {
            EntryKind::File {
                content: ContentState::Ready(info),
            } => Some(info),
            _ => None,
        }
    }

    pub fn content_state(&self) -> Option<&ContentState> {
        match &self.kind {
            EntryKind::File { content } => Some(content),
            _ => None,
        }
    }

    pub fn set_content_state(&mut self, state: ContentState) {
        if let EntryKind::File { content } = &mut self.kind {
            *content = state;
        }
    }

    /// Tree depth derived from the layer-encoded z
    pub fn depth(&self) -> u32 {
        (self.z / crate::constants::layout::Z_STEP).round() as u32
    }
}

/// One entry of an incremental directory listing from the provider
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub weight: u64,
}

/// Result of `readDir` against the provider: the refreshed single level of
/// one directory
#[derive(Debug, Clone, Default)]
pub struct DirListing {
    pub entries: Vec<ListingEntry>,
}

/// Outcome of merging a directory refresh into the tree
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub added: Vec<EntryId>,
    pub removed: Vec<EntryId>,
}

/// The arena. Built once per tree load; only runtime/content fields mutate
/// afterwards, except for incremental directory merges.
pub struct FileTree {
    entries: Vec<FsEntry>,
    root: EntryId,
}

/// Sibling ordering: directories before files, then lexicographic by name.
/// Stable, so re-layout is deterministic.
fn sibling_order(a_is_dir: bool, a_name: &str, b_is_dir: bool, b_name: &str) -> Ordering {
    b_is_dir.cmp(&a_is_dir).then_with(|| a_name.cmp(b_name))
}

impl FileTree {
    pub fn new(root_name: &str) -> Self {
        let root = FsEntry::new(
            root_name.to_string(),
            None,
            EntryKind::Dir { children: Vec::new() },
            0,
        );
        Self {
            entries: vec![root],
            root: EntryId(0),
        }
    }

    pub fn root(&self) -> EntryId {
        self.root
    }

    /// Total number of arena slots, including any detached by merges
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: EntryId) -> &FsEntry {
        &self.entries[id.index()]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut FsEntry {
        &mut self.entries[id.index()]
    }

    pub fn children(&self, id: EntryId) -> &[EntryId] {
        match &self.entry(id).kind {
            EntryKind::Dir { children } => children,
            EntryKind::File { .. } => &[],
        }
    }

    /// Insert a child under `parent`, keeping the sibling order invariant
    pub fn add_child(
        &mut self,
        parent: EntryId,
        name: &str,
        kind: EntryKind,
        weight: u64,
    ) -> EntryId {
        let id = EntryId(self.entries.len() as u32);
        let is_dir = matches!(kind, EntryKind::Dir { .. });
        self.entries
            .push(FsEntry::new(name.to_string(), Some(parent), kind, weight));
        let at = {
            let children = match &self.entries[parent.index()].kind {
                EntryKind::Dir { children } => children,
                // a file cannot take children; the slot stays detached
                EntryKind::File { .. } => return id,
            };
            let entries = &self.entries;
            children
                .binary_search_by(|&c| {
                    let e = &entries[c.index()];
                    sibling_order(e.is_dir(), &e.name, is_dir, name)
                })
                .unwrap_or_else(|i| i)
        };
        if let EntryKind::Dir { children } = &mut self.entries[parent.index()].kind {
            children.insert(at, id);
        }
        id
    }

    pub fn find_child(&self, dir: EntryId, name: &str) -> Option<EntryId> {
        self.children(dir)
            .iter()
            .copied()
            .find(|&c| self.entry(c).name == name)
    }

    /// Resolve a slash-delimited path from the root; empty segments are
    /// ignored, so `/a//b/` and `a/b` resolve identically
    pub fn entry_by_path(&self, path: &str) -> Option<EntryId> {
        let mut cur = self.root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            cur = self.find_child(cur, segment)?;
        }
        Some(cur)
    }

    /// Slash-delimited path from the root; the root itself is the empty path
    pub fn full_path(&self, id: EntryId) -> String {
        let mut segments = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.entry(cur).parent {
            segments.push(self.entry(cur).name.clone());
            cur = parent;
        }
        segments.reverse();
        let mut path = String::new();
        for s in &segments {
            path.push('/');
            path.push_str(s);
        }
        path
    }

    /// Sibling ids of `id`, including itself
    pub fn siblings(&self, id: EntryId) -> Vec<EntryId> {
        match self.entry(id).parent {
            Some(p) => self.children(p).to_vec(),
            None => vec![id],
        }
    }

    /// Pre-order ids of the subtree rooted at `id`, in layout-visit order
    pub fn subtree_ids(&self, id: EntryId) -> Vec<EntryId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            // push in reverse so children pop in sibling order
            for &c in self.children(cur).iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// Number of entries in the subtree rooted at `id`
    pub fn node_count(&self, id: EntryId) -> usize {
        let mut n = 0;
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            n += 1;
            stack.extend_from_slice(self.children(cur));
        }
        n
    }

    /// Roll file weights up into their ancestor directories. Called once
    /// after the provider finishes building the hierarchy.
    pub fn rollup_weights(&mut self) {
        // children always follow their parent in the arena only for freshly
        // built trees, so walk an explicit post-order instead of relying on it
        let order = self.subtree_ids(self.root);
        for &id in order.iter().rev() {
            if self.entry(id).is_dir() {
                let sum: u64 = self
                    .children(id)
                    .iter()
                    .map(|&c| self.entry(c).weight)
                    .sum();
                self.entry_mut(id).weight = sum;
            }
        }
    }

    /// Merge a refreshed single-level listing into `dir`: children present in
    /// the listing but not the tree are added, children absent from the
    /// listing are detached (their arena slots become unreachable for the
    /// rest of the session). Weights of surviving children are left alone.
    pub fn merge_dir(&mut self, dir: EntryId, listing: &DirListing) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if !self.entry(dir).is_dir() {
            return outcome;
        }

        for item in &listing.entries {
            if self.find_child(dir, &item.name).is_none() {
                let kind = if item.is_dir {
                    EntryKind::Dir { children: Vec::new() }
                } else {
                    EntryKind::File {
                        content: ContentState::Unfetched,
                    }
                };
                outcome.added.push(self.add_child(dir, &item.name, kind, item.weight));
            }
        }

        let stale: Vec<EntryId> = self
            .children(dir)
            .iter()
            .copied()
            .filter(|&c| {
                let name = &self.entry(c).name;
                !listing.entries.iter().any(|e| &e.name == name)
            })
            .collect();
        for id in stale {
            if let EntryKind::Dir { children } = &mut self.entries[dir.index()].kind {
                children.retain(|&c| c != id);
            }
            self.entry_mut(id).parent = None;
            outcome.removed.push(id);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> EntryKind {
        EntryKind::File {
            content: ContentState::Unfetched,
        }
    }

    fn dir() -> EntryKind {
        EntryKind::Dir { children: Vec::new() }
    }

    fn sample_tree() -> (FileTree, EntryId, EntryId) {
        let mut t = FileTree::new("repo");
        let src = t.add_child(t.root(), "src", dir(), 0);
        t.add_child(src, "main.rs", file(), 120);
        t.add_child(src, "lib.rs", file(), 40);
        let readme = t.add_child(t.root(), "README.md", file(), 30);
        t.rollup_weights();
        (t, src, readme)
    }

    #[test]
    fn children_sort_dirs_first_then_by_name() {
        let mut t = FileTree::new("repo");
        t.add_child(t.root(), "zeta.rs", file(), 1);
        t.add_child(t.root(), "beta", dir(), 1);
        t.add_child(t.root(), "alpha.rs", file(), 1);
        t.add_child(t.root(), "delta", dir(), 1);
        let names: Vec<&str> = t
            .children(t.root())
            .iter()
            .map(|&c| t.entry(c).name.as_str())
            .collect();
        assert_eq!(names, ["beta", "delta", "alpha.rs", "zeta.rs"]);
    }

    #[test]
    fn path_round_trip() {
        let (t, src, _) = sample_tree();
        let main = t.entry_by_path("/src/main.rs").expect("path resolves");
        assert_eq!(t.full_path(main), "/src/main.rs");
        assert_eq!(t.entry(main).parent, Some(src));
        assert_eq!(t.entry_by_path("src//main.rs/"), Some(main));
        assert!(t.entry_by_path("/src/missing.rs").is_none());
    }

    #[test]
    fn weights_roll_up_to_ancestors() {
        let (t, src, _) = sample_tree();
        assert_eq!(t.entry(src).weight, 160);
        assert_eq!(t.entry(t.root()).weight, 190);
    }

    #[test]
    fn merge_adds_and_removes_children() {
        let (mut t, src, _) = sample_tree();
        let listing = DirListing {
            entries: vec![
                ListingEntry {
                    name: "main.rs".into(),
                    is_dir: false,
                    weight: 120,
                },
                ListingEntry {
                    name: "util.rs".into(),
                    is_dir: false,
                    weight: 10,
                },
            ],
        };
        let outcome = t.merge_dir(src, &listing);
        assert_eq!(outcome.added.len(), 1);
        assert_eq!(outcome.removed.len(), 1);
        assert!(t.entry_by_path("/src/util.rs").is_some());
        assert!(t.entry_by_path("/src/lib.rs").is_none());
        assert_eq!(t.entry(outcome.removed[0]).parent, None);
    }
}
