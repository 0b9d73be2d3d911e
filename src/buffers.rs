//! Geometry buffer manager
//!
//! Owns the fixed-capacity CPU-side vertex arrays the treemap is drawn from:
//! one rectangle buffer sized to the node count at tree load, one text arena
//! shared by the visible set, and a dirty-range ledger so the GPU upload each
//! frame is the union of touched ranges rather than the whole buffer.
//!
//! Rectangle ranges are assigned by a pre-order visit, so a directory's range
//! always contains all descendant ranges and "draw only the covering
//! subtree" is a single index-range selection. Recoloring a node touches
//! exactly its four vertices and never reallocates. Text ranges come from a
//! first-fit free list and are returned on eviction; the base rectangle
//! range persists for the node's lifetime.

use crate::tree::{EntryId, FileTree, FsEntry};
use bytemuck::Zeroable;
use std::ops::Range;

/// One vertex of treemap geometry: position plus straight RGBA
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

pub const VERTEX_SIZE: u64 = std::mem::size_of::<Vertex>() as u64;

/// Map a vertex range (multiples of 4) to the matching index range
/// (6 indices per quad, emitted in vertex order)
pub fn index_range(verts: Range<u32>) -> Range<u32> {
    verts.start / 4 * 6..verts.end / 4 * 6
}

/// Build the static quad index pattern for a buffer of `capacity` vertices
pub fn quad_indices(capacity: u32) -> Vec<u32> {
    let quads = capacity / 4;
    let mut out = Vec::with_capacity(quads as usize * 6);
    for q in 0..quads {
        let v = q * 4;
        out.extend_from_slice(&[v, v + 1, v + 2, v + 2, v + 3, v]);
    }
    out
}

/// Sorted, coalescing set of touched vertex ranges
#[derive(Debug, Default)]
struct DirtySet {
    ranges: Vec<Range<u32>>,
}

impl DirtySet {
    fn mark(&mut self, range: Range<u32>) {
        if !range.is_empty() {
            self.ranges.push(range);
        }
    }

    fn drain_merged(&mut self) -> Vec<Range<u32>> {
        if self.ranges.is_empty() {
            return Vec::new();
        }
        self.ranges.sort_by_key(|r| r.start);
        let mut merged: Vec<Range<u32>> = Vec::new();
        for r in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
                _ => merged.push(r),
            }
        }
        merged
    }
}

/// Upload chunk: destination vertex offset plus the vertex data to write
pub type Upload = (u32, Vec<Vertex>);

/// The shared vertex arrays for one loaded tree
pub struct GeometryBuffers {
    rect: Vec<Vertex>,
    text: Vec<Vertex>,
    rect_dirty: DirtySet,
    text_dirty: DirtySet,
    /// Free text segments as (start, len), sorted by start, pairwise
    /// non-adjacent
    free_text: Vec<(u32, u32)>,
    /// Bumped when a new tree replaces the buffers wholesale, so the GPU
    /// side knows to rebuild its resources
    pub generation: u64,
}

impl GeometryBuffers {
    /// Allocate buffers for `tree` and assign every entry its pre-order
    /// rectangle range. Prior GPU resources are abandoned by bumping the
    /// generation.
    pub fn for_tree(tree: &mut FileTree, text_capacity: u32, generation: u64) -> Self {
        let rect_capacity = tree.len() as u32 * 4;
        let mut buffers = Self {
            rect: vec![Vertex::zeroed(); rect_capacity as usize],
            text: vec![Vertex::zeroed(); text_capacity as usize],
            rect_dirty: DirtySet::default(),
            text_dirty: DirtySet::default(),
            free_text: vec![(0, text_capacity)],
            generation,
        };
        let root = tree.root();
        let mut cursor = 0u32;
        buffers.assign(tree, root, &mut cursor);
        buffers
    }

    fn assign(&mut self, tree: &mut FileTree, id: EntryId, cursor: &mut u32) {
        tree.entry_mut(id).vertex_index = *cursor as i32;
        *cursor += 4;
        let children: Vec<EntryId> = tree.children(id).to_vec();
        for child in children {
            self.assign(tree, child, cursor);
        }
        tree.entry_mut(id).last_vertex_index = *cursor as i32;
    }

    /// Reassign ranges for the subtree under `dir` inside its existing span
    /// after an incremental merge changed the child set. Ranges outside the
    /// span are untouched. Returns false when the subtree no longer fits,
    /// in which case the caller must rebuild the whole buffer.
    pub fn reassign_subtree(&mut self, tree: &mut FileTree, dir: EntryId) -> bool {
        let span_start = tree.entry(dir).vertex_index as u32;
        let span_end = tree.entry(dir).last_vertex_index as u32;
        let needed = tree.node_count(dir) as u32 * 4;
        if needed > span_end - span_start {
            return false;
        }
        self.zero_rect_range(span_start..span_end);
        let mut cursor = span_start;
        self.assign(tree, dir, &mut cursor);
        // keep the directory's original span so future merges reuse its slack
        tree.entry_mut(dir).last_vertex_index = span_end as i32;
        true
    }

    pub fn rect_capacity(&self) -> u32 {
        self.rect.len() as u32
    }

    pub fn text_capacity(&self) -> u32 {
        self.text.len() as u32
    }

    /// Write the four corner vertices of an entry's square
    pub fn write_rect(&mut self, entry: &FsEntry, color: [f32; 4]) {
        let vi = entry.vertex_index;
        debug_assert!(vi >= 0, "write_rect before range assignment");
        if vi < 0 {
            return;
        }
        let vi = vi as usize;
        let (x, y, z, s) = (entry.x, entry.y, entry.z, entry.scale);
        self.rect[vi] = Vertex {
            position: [x, y, z],
            color,
        };
        self.rect[vi + 1] = Vertex {
            position: [x + s, y, z],
            color,
        };
        self.rect[vi + 2] = Vertex {
            position: [x + s, y + s, z],
            color,
        };
        self.rect[vi + 3] = Vertex {
            position: [x, y + s, z],
            color,
        };
        self.rect_dirty.mark(vi as u32..vi as u32 + 4);
    }

    /// Collapse a vertex range to degenerate quads (used when a merge
    /// removes a subtree; the range itself stays allocated)
    pub fn zero_rect_range(&mut self, range: Range<u32>) {
        for v in &mut self.rect[range.start as usize..range.end as usize] {
            *v = Vertex::zeroed();
        }
        self.rect_dirty.mark(range);
    }

    /// First-fit allocation from the text arena, in vertices. Returns the
    /// start offset, or None under capacity pressure.
    pub fn alloc_text(&mut self, verts: u32) -> Option<u32> {
        let slot = self.free_text.iter().position(|&(_, len)| len >= verts)?;
        let (start, len) = self.free_text[slot];
        if len == verts {
            self.free_text.remove(slot);
        } else {
            self.free_text[slot] = (start + verts, len - verts);
        }
        Some(start)
    }

    /// Return a text segment to the free list, coalescing neighbors, and
    /// clear its vertices so stale quads stop rendering
    pub fn free_text(&mut self, start: u32, verts: u32) {
        if verts == 0 {
            return;
        }
        for v in &mut self.text[start as usize..(start + verts) as usize] {
            *v = Vertex::zeroed();
        }
        self.text_dirty.mark(start..start + verts);

        let at = self
            .free_text
            .partition_point(|&(s, _)| s < start);
        self.free_text.insert(at, (start, verts));
        // merge with successor, then predecessor
        if at + 1 < self.free_text.len() {
            let (s, l) = self.free_text[at];
            let (ns, nl) = self.free_text[at + 1];
            if s + l == ns {
                self.free_text[at] = (s, l + nl);
                self.free_text.remove(at + 1);
            }
        }
        if at > 0 {
            let (ps, pl) = self.free_text[at - 1];
            let (s, l) = self.free_text[at];
            if ps + pl == s {
                self.free_text[at - 1] = (ps, pl + l);
                self.free_text.remove(at);
            }
        }
    }

    /// Write a run of text vertices starting at `start`
    pub fn write_text(&mut self, start: u32, verts: &[Vertex]) {
        let end = start as usize + verts.len();
        self.text[start as usize..end].copy_from_slice(verts);
        self.text_dirty.mark(start..end as u32);
    }

    /// Drain the dirty ledgers into upload chunks for the GPU callback
    pub fn take_uploads(&mut self) -> (Vec<Upload>, Vec<Upload>) {
        let rect = self
            .rect_dirty
            .drain_merged()
            .into_iter()
            .map(|r| (r.start, self.rect[r.start as usize..r.end as usize].to_vec()))
            .collect();
        let text = self
            .text_dirty
            .drain_merged()
            .into_iter()
            .map(|r| (r.start, self.text[r.start as usize..r.end as usize].to_vec()))
            .collect();
        (rect, text)
    }

    #[cfg(test)]
    pub(crate) fn rect_vertex(&self, at: u32) -> Vertex {
        self.rect[at as usize]
    }

    #[cfg(test)]
    pub(crate) fn text_vertex(&self, at: u32) -> Vertex {
        self.text[at as usize]
    }

    #[cfg(test)]
    pub(crate) fn free_text_segments(&self) -> &[(u32, u32)] {
        &self.free_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ContentState, EntryKind};

    fn file() -> EntryKind {
        EntryKind::File {
            content: ContentState::Unfetched,
        }
    }

    fn dir() -> EntryKind {
        EntryKind::Dir { children: Vec::new() }
    }

    fn build() -> (FileTree, GeometryBuffers) {
        let mut t = FileTree::new("repo");
        let src = t.add_child(t.root(), "src", dir(), 0);
        t.add_child(src, "a.rs", file(), 1);
        t.add_child(src, "b.rs", file(), 1);
        t.add_child(t.root(), "README.md", file(), 1);
        let b = GeometryBuffers::for_tree(&mut t, 1024, 1);
        (t, b)
    }

    #[test]
    fn ranges_nest_and_siblings_are_disjoint() {
        let (t, _) = build();
        let root = t.root();
        let rr = t.entry(root).vertex_index..t.entry(root).last_vertex_index;
        assert_eq!(rr, 0..20);

        for &child in t.children(root) {
            let e = t.entry(child);
            assert!(e.vertex_index >= rr.start && e.last_vertex_index <= rr.end);
        }
        // pairwise disjoint across siblings under root
        let kids = t.children(root);
        for i in 0..kids.len() {
            for j in i + 1..kids.len() {
                let a = t.entry(kids[i]);
                let b = t.entry(kids[j]);
                assert!(
                    a.last_vertex_index <= b.vertex_index
                        || b.last_vertex_index <= a.vertex_index
                );
            }
        }
        // a directory's range covers its descendants
        let src = t.entry_by_path("/src").unwrap();
        let a = t.entry_by_path("/src/a.rs").unwrap();
        let src_e = t.entry(src);
        let a_e = t.entry(a);
        assert!(src_e.vertex_index < a_e.vertex_index);
        assert!(a_e.last_vertex_index <= src_e.last_vertex_index);
    }

    #[test]
    fn recolor_touches_exactly_four_vertices() {
        let (mut t, mut b) = build();
        let a = t.entry_by_path("/src/a.rs").unwrap();
        {
            let e = t.entry_mut(a);
            e.x = 1.0;
            e.y = 2.0;
            e.scale = 0.5;
        }
        b.take_uploads();
        b.write_rect(t.entry(a), [1.0, 0.0, 0.0, 1.0]);
        let (rects, text) = b.take_uploads();
        assert!(text.is_empty());
        assert_eq!(rects.len(), 1);
        let (offset, data) = &rects[0];
        assert_eq!(*offset as i32, t.entry(a).vertex_index);
        assert_eq!(data.len(), 4);
        assert_eq!(data[0].position, [1.0, 2.0, 0.0]);
        assert_eq!(data[2].position, [1.5, 2.5, 0.0]);
    }

    #[test]
    fn text_arena_allocates_first_fit_and_coalesces() {
        let (_, mut b) = build();
        let a = b.alloc_text(100).unwrap();
        let c = b.alloc_text(200).unwrap();
        let d = b.alloc_text(50).unwrap();
        assert_eq!((a, c, d), (0, 100, 300));

        b.free_text(c, 200);
        // freed middle segment is reused first-fit
        assert_eq!(b.alloc_text(150), Some(100));
        b.free_text(a, 100);
        b.free_text(100, 150);
        b.free_text(d, 50);
        // everything freed coalesces back into a single segment
        assert_eq!(b.free_text_segments(), &[(0, 1024)]);
    }

    #[test]
    fn freeing_text_zeroes_the_segment() {
        let (_, mut b) = build();
        let at = b.alloc_text(4).unwrap();
        b.write_text(
            at,
            &[
                Vertex {
                    position: [1.0, 1.0, 0.0],
                    color: [1.0; 4],
                };
                4
            ],
        );
        b.free_text(at, 4);
        assert_eq!(b.text_vertex(at), Vertex::zeroed());
    }

    #[test]
    fn reassign_subtree_keeps_outside_ranges() {
        let (mut t, mut b) = build();
        let src = t.entry_by_path("/src").unwrap();
        let readme = t.entry_by_path("/README.md").unwrap();
        let readme_range = (
            t.entry(readme).vertex_index,
            t.entry(readme).last_vertex_index,
        );
        let span = (
            t.entry(src).vertex_index,
            t.entry(src).last_vertex_index,
        );

        // drop one child of src, reassign inside the old span
        let listing = crate::tree::DirListing {
            entries: vec![crate::tree::ListingEntry {
                name: "a.rs".into(),
                is_dir: false,
                weight: 1,
            }],
        };
        t.merge_dir(src, &listing);
        assert!(b.reassign_subtree(&mut t, src));

        assert_eq!(
            (t.entry(src).vertex_index, t.entry(src).last_vertex_index),
            span
        );
        assert_eq!(
            (
                t.entry(readme).vertex_index,
                t.entry(readme).last_vertex_index
            ),
            readme_range
        );
        let a = t.entry_by_path("/src/a.rs").unwrap();
        let a_e = t.entry(a);
        assert!(a_e.vertex_index >= span.0 && a_e.last_vertex_index <= span.1);
    }
}
