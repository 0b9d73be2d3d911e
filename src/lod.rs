//! LOD / frustum selection
//!
//! Runs once per rendered frame against the laid-out tree and the camera.
//! Walks the hierarchy from the root, culling subtrees outside the world
//! window, classifying in-window nodes as box-visible or content-eligible by
//! apparent size, and locating the navigation target: the deepest node whose
//! square fully covers the viewport, with a softer centered-node fallback.
//! The covering node also bounds the rectangle draw range, which keeps the
//! per-frame drawn-vertex count independent of total tree size.
//!
//! The selection is a pure function of (tree, camera): running it twice with
//! unchanged inputs yields an identical result.

use crate::camera::{CameraRig, WorldRect};
use crate::constants::lod::{APPARENT_K, CENTER_TOL, COVER_FALLBACK};
use crate::tree::{EntryId, FileTree, FsEntry};
use glam::Vec2;
use std::collections::HashSet;
use std::ops::Range;

/// Apparent on-screen size proxy for a node
pub fn apparent_size(scale: f32, lod_fov: f32) -> f32 {
    scale * APPARENT_K / lod_fov.max(f32::EPSILON)
}

fn entry_rect(e: &FsEntry) -> WorldRect {
    WorldRect::new(
        Vec2::new(e.x, e.y),
        Vec2::new(e.x + e.scale, e.y + e.scale),
    )
}

/// Per-frame output of the selector
#[derive(Debug, Clone)]
pub struct FrameSelection {
    /// Deepest covering node (or centered fallback); drives the breadcrumb
    /// path and the active draw range
    pub nav_target: Option<EntryId>,
    /// Rectangle vertex range to draw this frame
    pub rect_draw: Range<u32>,
    /// Files visible at content detail, in traversal order
    pub content_eligible: Vec<EntryId>,
    eligible: HashSet<EntryId>,
    /// Nodes rendered as flat colored boxes only
    pub box_visible: u32,
}

impl FrameSelection {
    pub fn empty() -> Self {
        Self {
            nav_target: None,
            rect_draw: 0..0,
            content_eligible: Vec::new(),
            eligible: HashSet::new(),
            box_visible: 0,
        }
    }

    /// Is this entry visible at content detail this frame?
    pub fn is_eligible(&self, id: EntryId) -> bool {
        self.eligible.contains(&id)
    }

    #[cfg(test)]
    pub(crate) fn for_test(eligible: Vec<EntryId>) -> Self {
        Self {
            nav_target: None,
            rect_draw: 0..0,
            eligible: eligible.iter().copied().collect(),
            content_eligible: eligible,
            box_visible: 0,
        }
    }
}

/// Select visible nodes, the navigation target and the active draw range
pub fn select_frame(
    tree: &FileTree,
    camera: &CameraRig,
    aspect: f32,
    threshold: f32,
) -> FrameSelection {
    let window = camera.window(aspect);
    let lod_fov = camera.lod_fov();
    let window_center = window.center();
    let half_y = window.height() * 0.5;

    let mut sel = FrameSelection::empty();
    // (depth, id); deeper wins, first-found wins among equals
    let mut cover: Option<(u32, EntryId)> = None;
    let mut soft: Option<(u32, EntryId)> = None;

    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let e = tree.entry(id);
        let rect = entry_rect(e);
        if !window.intersects(&rect) {
            continue;
        }
        if apparent_size(e.scale, lod_fov) < threshold {
            sel.box_visible += 1;
            continue;
        }

        let depth = e.depth();
        if rect.contains_rect(&window) {
            if cover.map_or(true, |(d, _)| depth > d) {
                cover = Some((depth, id));
            }
        } else {
            let coverage = e.scale / window.height().max(f32::EPSILON);
            let centered = (rect.center() - window_center).length() < CENTER_TOL * half_y;
            if coverage >= COVER_FALLBACK && centered && soft.map_or(true, |(d, _)| depth > d) {
                soft = Some((depth, id));
            }
        }

        if e.is_dir() {
            for &c in tree.children(id).iter().rev() {
                stack.push(c);
            }
        } else {
            sel.content_eligible.push(id);
            sel.eligible.insert(id);
        }
    }

    // deeper candidate wins; a fully covering node wins depth ties
    sel.nav_target = match (cover, soft) {
        (Some((cd, c)), Some((sd, s))) => Some(if sd > cd { s } else { c }),
        (cover, soft) => cover.or(soft).map(|(_, id)| id),
    };
    let range_of = |id: EntryId| {
        let e = tree.entry(id);
        e.vertex_index.max(0) as u32..e.last_vertex_index.max(0) as u32
    };
    sel.rect_draw = range_of(sel.nav_target.unwrap_or(tree.root()));
    sel
}

/// Deepest entry whose square contains the world-space point
pub fn pick(tree: &FileTree, point: Vec2) -> Option<EntryId> {
    let root = tree.root();
    if !entry_rect(tree.entry(root)).contains_point(point) {
        return None;
    }
    let mut cur = root;
    'descend: loop {
        for &c in tree.children(cur) {
            if entry_rect(tree.entry(c)).contains_point(point) {
                cur = c;
                continue 'descend;
            }
        }
        return Some(cur);
    }
}
