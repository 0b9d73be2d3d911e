//! Search-highlight and cross-reference link overlays
//!
//! Both overlays reuse the engine's vertex layout and dirty-upload path,
//! writing into a small dedicated quad buffer keyed to the same node
//! coordinate system as the treemap. Whole-node search hits recolor the
//! node's base rectangle through the buffer manager (four vertices, no
//! reallocation); line hits and links add quads on top.

use crate::buffers::Vertex;
use crate::camera::CameraRig;
use crate::session::Engine;
use crate::theme;
use crate::tree::EntryId;
use glam::Vec2;
use log::debug;

/// One search result; `line == 0` highlights the whole node, `line > 0`
/// highlights that text line (1-based) once the node is materialized
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub path: String,
    pub line: u32,
}

/// Link endpoint: a tree node by path, or a screen-anchored UI element in
/// viewport fractions (x right, y up, 0..1)
#[derive(Debug, Clone)]
pub enum LinkEnd {
    Entry(String),
    Screen(Vec2),
}

/// One cross-reference line between two endpoints
#[derive(Debug, Clone)]
pub struct Link {
    pub src: LinkEnd,
    pub dst: LinkEnd,
    pub color: [f32; 4],
}

/// Capacity-bounded quad buffer shared by both overlays, rebuilt wholesale
/// whenever either overlay changes
pub struct OverlayGeometry {
    verts: Vec<Vertex>,
    capacity_quads: u32,
    dirty: bool,
}

impl OverlayGeometry {
    pub fn new(capacity_quads: u32) -> Self {
        Self {
            verts: Vec::new(),
            capacity_quads,
            dirty: false,
        }
    }

    pub fn clear(&mut self) {
        self.verts.clear();
        self.dirty = true;
    }

    pub fn quads(&self) -> u32 {
        (self.verts.len() / 4) as u32
    }

    fn push_quad(&mut self, corners: [[f32; 3]; 4], color: [f32; 4]) {
        if self.quads() >= self.capacity_quads {
            debug!("overlay: quad capacity {} reached, dropping", self.capacity_quads);
            return;
        }
        for position in corners {
            self.verts.push(Vertex { position, color });
        }
        self.dirty = true;
    }

    /// Axis-aligned quad from min/max corners
    fn push_rect(&mut self, min: Vec2, max: Vec2, z: f32, color: [f32; 4]) {
        self.push_quad(
            [
                [min.x, min.y, z],
                [max.x, min.y, z],
                [max.x, max.y, z],
                [min.x, max.y, z],
            ],
            color,
        );
    }

    /// Thin quad along the segment a..b
    fn push_line(&mut self, a: Vec2, b: Vec2, z: f32, width: f32, color: [f32; 4]) {
        let dir = b - a;
        if dir.length_squared() < f32::EPSILON {
            return;
        }
        let perp = Vec2::new(-dir.y, dir.x).normalize() * (width * 0.5);
        self.push_quad(
            [
                [a.x - perp.x, a.y - perp.y, z],
                [b.x - perp.x, b.y - perp.y, z],
                [b.x + perp.x, b.y + perp.y, z],
                [a.x + perp.x, a.y + perp.y, z],
            ],
            color,
        );
    }

    /// Full vertex upload when the buffer changed since the last take
    pub fn take_upload(&mut self) -> Option<Vec<Vertex>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.verts.clone())
    }
}

/// Search-result highlighting keyed by `(path, line)` pairs
#[derive(Default)]
pub struct SearchOverlay {
    hits: Vec<SearchHit>,
    highlighted: Vec<EntryId>,
    dirty: bool,
}

impl SearchOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_results(&mut self, hits: Vec<SearchHit>) {
        self.hits = hits;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_hits(&self) -> bool {
        !self.hits.is_empty() || !self.highlighted.is_empty()
    }

    /// Recolor whole-node hits and emit line-hit quads. Line hits on
    /// unmaterialized nodes stay pending; the caller re-applies once the
    /// loader attaches content and marks the scene changed.
    pub fn apply(&mut self, engine: &mut Engine, out: &mut OverlayGeometry) {
        for id in std::mem::take(&mut self.highlighted) {
            let e = engine.tree.entry(id);
            if e.vertex_index >= 0 && e.parent.is_some() {
                engine.buffers.write_rect(e, theme::entry_fill(e));
            }
        }
        for hit in &self.hits {
            let Some(id) = engine.tree.entry_by_path(&hit.path) else {
                continue;
            };
            let e = engine.tree.entry(id);
            if hit.line == 0 {
                engine.buffers.write_rect(e, theme::colors().search_hit);
                self.highlighted.push(id);
            } else if let Some(info) = e.content() {
                let row = (hit.line - 1).min(info.line_count.saturating_sub(1));
                let y1 = info.text_y_zero - row as f32 * info.text_scale;
                let y0 = y1 - info.text_scale;
                let x0 = info.text_x - e.scale * 0.02;
                let x1 = e.x + e.scale * 0.92;
                out.push_rect(
                    Vec2::new(x0, y0),
                    Vec2::new(x1, y1),
                    e.z + 0.003,
                    theme::colors().search_line,
                );
            }
        }
        self.dirty = false;
    }
}

/// Cross-reference link rendering with mixed endpoint kinds
#[derive(Default)]
pub struct LinkOverlay {
    links: Vec<Link>,
    dirty: bool,
}

impl LinkOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_links(&mut self, links: Vec<Link>) {
        self.links = links;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_links(&self) -> bool {
        !self.links.is_empty()
    }

    fn resolve(
        engine: &Engine,
        camera: &CameraRig,
        aspect: f32,
        end: &LinkEnd,
    ) -> Option<(Vec2, f32)> {
        match end {
            LinkEnd::Entry(path) => {
                let id = engine.tree.entry_by_path(path)?;
                let e = engine.tree.entry(id);
                // anchor at the top edge of the node square
                Some((Vec2::new(e.x + e.scale * 0.5, e.y + e.scale), e.z))
            }
            LinkEnd::Screen(frac) => {
                let w = camera.window(aspect);
                Some((
                    Vec2::new(
                        w.min.x + frac.x * w.width(),
                        w.min.y + frac.y * w.height(),
                    ),
                    0.5,
                ))
            }
        }
    }

    /// Emit link quads for the current camera. Screen-anchored endpoints
    /// move with the window, so this runs every frame while animating.
    pub fn build(&mut self, engine: &Engine, camera: &CameraRig, aspect: f32, out: &mut OverlayGeometry) {
        for link in &self.links {
            let Some((a, az)) = Self::resolve(engine, camera, aspect, &link.src) else {
                continue;
            };
            let Some((b, bz)) = Self::resolve(engine, camera, aspect, &link.dst) else {
                continue;
            };
            let z = az.max(bz) + 0.004;
            let width = camera.half_extent() * 0.008;
            out.push_line(a, b, z, width, link.color);
        }
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::camera::DECAY_BASE;
    use crate::highlight::PlainHighlighter;
    use crate::layout::LayoutTask;
    use crate::provider::MemoryProvider;
    use crate::scheduler::{FrameTask, Step};
    use crate::session::{Engine, EngineConfig};
    use crate::tree::{ContentInfo, ContentState};

    fn engine() -> Engine {
        let mut provider = MemoryProvider::new();
        provider.add_file("/src/a.rs", b"fn a() {}\n");
        provider.add_file("/src/b.rs", b"fn b() {}\n");
        let mut engine = Engine::new(
            Box::new(provider),
            Box::new(PlainHighlighter),
            EngineConfig::default(),
            1,
        )
        .expect("engine");
        let mut task = LayoutTask::new(engine.tree.root());
        engine.layout_started();
        while task.step(&mut engine) == Step::Yield {}
        engine
    }

    #[test]
    fn whole_node_hits_recolor_and_restore() {
        let mut engine = engine();
        let mut overlay = SearchOverlay::new();
        let mut quads = OverlayGeometry::new(64);
        let a = engine.tree.entry_by_path("/src/a.rs").unwrap();
        let vi = engine.tree.entry(a).vertex_index as u32;
        let base = engine.buffers.rect_vertex(vi).color;

        overlay.set_results(vec![SearchHit {
            path: "/src/a.rs".into(),
            line: 0,
        }]);
        overlay.apply(&mut engine, &mut quads);
        assert_eq!(
            engine.buffers.rect_vertex(vi).color,
            theme::colors().search_hit
        );
        assert_eq!(quads.quads(), 0);

        overlay.set_results(Vec::new());
        overlay.apply(&mut engine, &mut quads);
        assert_eq!(engine.buffers.rect_vertex(vi).color, base);
    }

    #[test]
    fn line_hits_wait_for_materialized_content() {
        let mut engine = engine();
        let mut overlay = SearchOverlay::new();
        let mut quads = OverlayGeometry::new(64);
        let a = engine.tree.entry_by_path("/src/a.rs").unwrap();

        overlay.set_results(vec![SearchHit {
            path: "/src/a.rs".into(),
            line: 3,
        }]);
        overlay.apply(&mut engine, &mut quads);
        assert_eq!(quads.quads(), 0, "line hit drawn before content attach");

        // fake a materialized file and re-apply
        let info = ContentInfo {
            line_count: 10,
            text_scale: 0.01,
            text_height: 0.1,
            text_x: 0.1,
            text_y: 0.05,
            text_y_zero: 0.15,
        };
        engine
            .tree
            .entry_mut(a)
            .set_content_state(ContentState::Ready(info));
        quads.clear();
        overlay.set_results(vec![SearchHit {
            path: "/src/a.rs".into(),
            line: 3,
        }]);
        overlay.apply(&mut engine, &mut quads);
        assert_eq!(quads.quads(), 1);
    }

    #[test]
    fn links_support_mixed_endpoints() {
        let engine = engine();
        let mut links = LinkOverlay::new();
        let mut quads = OverlayGeometry::new(64);
        let mut cam = CameraRig::new(DECAY_BASE);
        cam.snap_to_target();

        links.set_links(vec![
            Link {
                src: LinkEnd::Entry("/src/a.rs".into()),
                dst: LinkEnd::Entry("/src/b.rs".into()),
                color: [1.0, 0.0, 0.0, 1.0],
            },
            Link {
                src: LinkEnd::Entry("/src/a.rs".into()),
                dst: LinkEnd::Screen(Vec2::new(0.5, 1.0)),
                color: [0.0, 1.0, 0.0, 1.0],
            },
            Link {
                src: LinkEnd::Entry("/missing.rs".into()),
                dst: LinkEnd::Entry("/src/b.rs".into()),
                color: [0.0, 0.0, 1.0, 1.0],
            },
        ]);
        links.build(&engine, &cam, 1.0, &mut quads);
        // unresolvable endpoint drops its link, the other two render
        assert_eq!(quads.quads(), 2);
    }

    #[test]
    fn overlay_capacity_is_clamped() {
        let mut quads = OverlayGeometry::new(2);
        for _ in 0..5 {
            quads.push_rect(Vec2::ZERO, Vec2::ONE, 0.0, [1.0; 4]);
        }
        assert_eq!(quads.quads(), 2);
    }
}
