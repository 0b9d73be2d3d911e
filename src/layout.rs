//! Spatial layout engine
//!
//! Recursively partitions a weighted tree into nested squares. Each
//! directory's children share its inner area (inset by a margin that
//! reserves label space at the top) in proportion to their weights; sibling
//! order is the tree's stable comparator, so a re-layout of the same tree is
//! bit-identical. Z steps down one layer per depth level so descendants draw
//! above ancestors.
//!
//! A full pass over a large tree can exceed the frame budget, so the pass is
//! a [`LayoutTask`]: one directory per schedulable unit, resumable across
//! slices without revisiting completed subtrees.

use crate::buffers::GeometryBuffers;
use crate::constants::layout::{
    GAP_FRAC, MARGIN_FRAC, MAX_FIT_PASSES, MIN_SCALE_FRAC, TOP_MARGIN_FRAC, Z_STEP,
};
use crate::scheduler::{FrameTask, Step};
use crate::session::Engine;
use crate::theme;
use crate::tree::{EntryId, FileTree};
use log::debug;

/// Height consumed by greedy row packing of `sides` into a row of `width`
fn packed_height(sides: &[f32], width: f32, gap: f32) -> f32 {
    let mut cx = 0.0f32;
    let mut row_h = 0.0f32;
    let mut height = 0.0f32;
    for &side in sides {
        if cx > 0.0 && cx + side > width {
            height += row_h + gap;
            cx = 0.0;
            row_h = 0.0;
        }
        cx += side + gap;
        row_h = row_h.max(side);
    }
    height + row_h
}

/// Assign squares to the children of `dir` inside its cell and write their
/// base rectangles. The directory's own cell must already be assigned.
pub fn layout_children(tree: &mut FileTree, buffers: &mut GeometryBuffers, dir: EntryId) {
    let (px, py, pz, ps) = {
        let e = tree.entry(dir);
        (e.x, e.y, e.z, e.scale)
    };
    let child_ids: Vec<EntryId> = tree.children(dir).to_vec();
    if child_ids.is_empty() {
        // childless directory: the empty cell still occupies its allotted
        // area, keeping sibling spacing deterministic
        return;
    }

    let margin = ps * MARGIN_FRAC;
    let top_inset = ps * TOP_MARGIN_FRAC;
    let inner_w = ps - 2.0 * margin;
    let inner_h = ps - margin - top_inset;
    if inner_w <= f32::EPSILON || inner_h <= f32::EPSILON {
        debug!("layout: cell for entry {:?} too small to subdivide", dir);
        return;
    }
    let gap = ps * GAP_FRAC;
    let min_side = ps * MIN_SCALE_FRAC;

    // ideal sides: child area is exactly its weight share of the inner area
    let total: u64 = child_ids.iter().map(|&c| tree.entry(c).weight).sum();
    let base = (inner_w * inner_h).sqrt();
    let ideal: Vec<f32> = child_ids
        .iter()
        .map(|&c| {
            let share = if total == 0 {
                1.0 / child_ids.len() as f32
            } else {
                tree.entry(c).weight as f32 / total as f32
            };
            (share.sqrt() * base).max(min_side)
        })
        .collect();

    // shrink uniformly until the rows fit the inner height; ratios between
    // sibling areas survive the scaling exactly
    let mut sides = ideal.clone();
    let mut fit = 1.0f32;
    for _ in 0..MAX_FIT_PASSES {
        let used = packed_height(&sides, inner_w, gap);
        if used <= inner_h {
            break;
        }
        fit *= (inner_h / used) * 0.99;
        sides = ideal.iter().map(|s| (s * fit).max(min_side)).collect();
    }

    let left = px + margin;
    let right = px + ps - margin;
    let row_start = py + ps - top_inset;
    let mut cx = left;
    let mut row_top = row_start;
    let mut row_h = 0.0f32;
    for (i, &id) in child_ids.iter().enumerate() {
        let side = sides[i].min(inner_w);
        if cx > left && cx + side > right {
            row_top -= row_h + gap;
            cx = left;
            row_h = 0.0;
        }
        {
            let e = tree.entry_mut(id);
            e.x = cx;
            e.y = row_top - side;
            e.z = pz + Z_STEP;
            e.scale = side;
        }
        let e = tree.entry(id);
        buffers.write_rect(e, theme::entry_fill(e));
        cx += side + gap;
        row_h = row_h.max(side);
    }
}

/// Suspend-capable layout traversal: lays out one directory's children per
/// unit, depth-first. Created for the whole tree at load, or for one
/// subtree after an incremental merge.
pub struct LayoutTask {
    stack: Vec<EntryId>,
}

impl LayoutTask {
    pub fn new(root: EntryId) -> Self {
        Self { stack: vec![root] }
    }
}

impl FrameTask<Engine> for LayoutTask {
    fn step(&mut self, engine: &mut Engine) -> Step {
        match self.stack.pop() {
            Some(dir) => {
                layout_children(&mut engine.tree, &mut engine.buffers, dir);
                for &c in engine.tree.children(dir) {
                    if engine.tree.entry(c).is_dir() {
                        self.stack.push(c);
                    }
                }
                Step::Yield
            }
            None => {
                engine.layout_finished();
                Step::Done
            }
        }
    }

    fn label(&self) -> &'static str {
        "layout"
    }
}
