//! Per-session context
//!
//! One [`Session`] owns everything a loaded tree needs: the arena, the
//! geometry buffers, the camera rig, the cooperative scheduler, the overlays
//! and the frame selection. It is constructed per tree load and torn down
//! wholesale on tree replacement; nothing here is a global.
//!
//! [`Engine`] is the subset the scheduler's tasks mutate (tree, buffers,
//! visible set, collaborators); the session wraps it together with the parts
//! only the frame loop touches.

use crate::buffers::{index_range, GeometryBuffers};
use crate::camera::CameraRig;
use crate::constants::buffers::{OVERLAY_CAPACITY_QUADS, TEXT_CAPACITY};
use crate::constants::{
    camera as camera_consts, loader as loader_consts, lod as lod_consts,
    scheduler as scheduler_consts,
};
use crate::gpu::{FrameUploads, Uniforms};
use crate::highlight::Highlighter;
use crate::layout::LayoutTask;
use crate::loader::{self, VisibleSet};
use crate::lod::{pick, select_frame, FrameSelection};
use crate::overlay::{Link, LinkOverlay, OverlayGeometry, SearchHit, SearchOverlay};
use crate::provider::{ProviderError, TreeData, TreeProvider};
use crate::scheduler::{FrameScheduler, MonotonicClock};
use crate::theme;
use crate::tree::EntryId;
use glam::Vec2;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;

/// Session tuning, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub frame_budget_ms: u64,
    pub max_visible: usize,
    pub lod_threshold: f32,
    pub camera_decay: f32,
    pub max_lines: usize,
    pub max_quads_per_file: usize,
    pub text_capacity: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: scheduler_consts::FRAME_BUDGET_MS,
            max_visible: loader_consts::MAX_VISIBLE,
            lod_threshold: lod_consts::CONTENT_THRESHOLD,
            camera_decay: camera_consts::DECAY_BASE,
            max_lines: loader_consts::MAX_LINES,
            max_quads_per_file: loader_consts::MAX_QUADS_PER_FILE,
            text_capacity: TEXT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Deferred line navigation produced by the loader at content attach
#[derive(Debug, Clone, Copy)]
pub struct NavRequest {
    pub entry: EntryId,
    pub line: u32,
}

/// The state the scheduler's tasks operate on
pub struct Engine {
    pub tree: crate::tree::FileTree,
    pub buffers: GeometryBuffers,
    pub visible: VisibleSet,
    pub provider: Box<dyn TreeProvider>,
    pub highlighter: Box<dyn Highlighter>,
    pub config: EngineConfig,
    pub nav_requests: Vec<NavRequest>,
    /// Some component changed the scene; a settled camera repaints only
    /// when this is set
    pub changed: bool,
    pending_layouts: u32,
}

impl Engine {
    pub fn new(
        mut provider: Box<dyn TreeProvider>,
        highlighter: Box<dyn Highlighter>,
        config: EngineConfig,
        generation: u64,
    ) -> Result<Self, ProviderError> {
        let TreeData {
            mut tree,
            total_weight,
        } = provider.load_tree()?;
        info!(
            "tree loaded: {} entries, total weight {total_weight}",
            tree.len()
        );
        let buffers = GeometryBuffers::for_tree(&mut tree, config.text_capacity, generation);
        let mut engine = Self {
            tree,
            buffers,
            visible: VisibleSet::new(config.max_visible),
            provider,
            highlighter,
            config,
            nav_requests: Vec::new(),
            changed: true,
            pending_layouts: 0,
        };
        engine.place_root();
        Ok(engine)
    }

    /// Reload the tree from the provider, discarding buffers and content
    pub fn rebuild(&mut self, generation: u64) -> Result<(), ProviderError> {
        let TreeData {
            mut tree,
            total_weight,
        } = self.provider.load_tree()?;
        info!(
            "tree reloaded: {} entries, total weight {total_weight}",
            tree.len()
        );
        self.buffers = GeometryBuffers::for_tree(&mut tree, self.config.text_capacity, generation);
        self.tree = tree;
        self.visible.clear();
        self.nav_requests.clear();
        self.pending_layouts = 0;
        self.changed = true;
        self.place_root();
        Ok(())
    }

    fn place_root(&mut self) {
        let root = self.tree.root();
        {
            let e = self.tree.entry_mut(root);
            e.x = 0.0;
            e.y = 0.0;
            e.z = 0.0;
            e.scale = 1.0;
        }
        self.buffers
            .write_rect(self.tree.entry(root), theme::entry_fill(self.tree.entry(root)));
    }

    pub fn layout_started(&mut self) {
        self.pending_layouts += 1;
    }

    pub fn layout_finished(&mut self) {
        self.pending_layouts = self.pending_layouts.saturating_sub(1);
        self.changed = true;
    }

    /// Layout fields may be read without defensive checks only once this
    /// holds; the LOD selector is gated on it
    pub fn layout_ready(&self) -> bool {
        self.pending_layouts == 0
    }
}

/// Everything one loaded tree needs, wired together
pub struct Session {
    pub engine: Engine,
    pub camera: CameraRig,
    scheduler: FrameScheduler<Engine>,
    search: SearchOverlay,
    links: LinkOverlay,
    overlay: OverlayGeometry,
    selection: FrameSelection,
    nav_target: String,
    aspect: f32,
    generation: u64,
}

impl Session {
    pub fn new(
        provider: Box<dyn TreeProvider>,
        highlighter: Box<dyn Highlighter>,
        config: EngineConfig,
    ) -> Result<Self, ProviderError> {
        let scheduler = FrameScheduler::new(
            Duration::from_millis(config.frame_budget_ms),
            Box::new(MonotonicClock::new()),
        );
        let camera = CameraRig::new(config.camera_decay);
        let engine = Engine::new(provider, highlighter, config, 1)?;
        let mut session = Self {
            engine,
            camera,
            scheduler,
            search: SearchOverlay::new(),
            links: LinkOverlay::new(),
            overlay: OverlayGeometry::new(OVERLAY_CAPACITY_QUADS),
            selection: FrameSelection::empty(),
            nav_target: String::new(),
            aspect: 1.0,
            generation: 1,
        };
        session.start_layout(session.engine.tree.root());
        let root = session.engine.tree.root();
        session.camera.frame_entry(session.engine.tree.entry(root));
        session.camera.snap_to_target();
        Ok(session)
    }

    fn start_layout(&mut self, root: EntryId) {
        self.engine.layout_started();
        self.scheduler.enqueue(Box::new(LayoutTask::new(root)));
    }

    /// Replace the whole working tree from the provider
    pub fn reload(&mut self) -> Result<(), ProviderError> {
        self.generation += 1;
        self.scheduler.clear();
        self.engine.rebuild(self.generation)?;
        self.selection = FrameSelection::empty();
        self.nav_target.clear();
        self.start_layout(self.engine.tree.root());
        Ok(())
    }

    /// Advance one frame: drain suspended work, select LOD, admit content,
    /// resolve deferred navigation, move the camera and refresh overlays.
    /// Returns whether another frame should be rendered.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.scheduler.run_slice(&mut self.engine);

        if self.engine.layout_ready() {
            self.selection = select_frame(
                &self.engine.tree,
                &self.camera,
                self.aspect,
                self.engine.config.lod_threshold,
            );
            let path = match self.selection.nav_target {
                Some(id) => self.engine.tree.full_path(id),
                None => String::new(),
            };
            if path != self.nav_target {
                debug!("navigation target: {path}");
                self.nav_target = path;
            }
            loader::admit(&mut self.engine, &self.selection, &mut self.scheduler);
        }

        for req in std::mem::take(&mut self.engine.nav_requests) {
            let e = self.engine.tree.entry(req.entry);
            if let Some(info) = e.content() {
                self.camera.go_to_line(e, info, req.line);
            }
        }

        let animating = self.camera.update(dt);

        let overlays_live = self.search.has_hits() || self.links.has_links();
        if self.search.is_dirty()
            || self.links.is_dirty()
            || (overlays_live && (animating || self.engine.changed))
        {
            self.overlay.clear();
            self.search.apply(&mut self.engine, &mut self.overlay);
            self.links
                .build(&self.engine, &self.camera, self.aspect, &mut self.overlay);
        }

        let repaint = animating || self.engine.changed || !self.scheduler.is_idle();
        self.engine.changed = false;
        repaint
    }

    /// Slash-delimited path of the current navigation target, updated once
    /// per frame
    pub fn navigation_target(&self) -> &str {
        &self.nav_target
    }

    pub fn set_viewport_aspect(&mut self, aspect: f32) {
        if (aspect - self.aspect).abs() > f32::EPSILON {
            self.aspect = aspect;
            self.engine.changed = true;
        }
    }

    /// Fly the camera to an entry by path
    pub fn go_to_path(&mut self, path: &str) -> bool {
        let Some(id) = self.engine.tree.entry_by_path(path) else {
            return false;
        };
        self.camera.frame_entry(self.engine.tree.entry(id));
        self.engine.changed = true;
        true
    }

    /// Fly to a specific line of a file. If the content is not materialized
    /// yet the line lands as a deferred `target_line`, resolved when the
    /// loader attaches the content.
    pub fn go_to_path_at_line(&mut self, path: &str, line: u32) -> bool {
        let Some(id) = self.engine.tree.entry_by_path(path) else {
            return false;
        };
        let e = self.engine.tree.entry(id);
        if let Some(info) = e.content() {
            self.camera.go_to_line(e, info, line);
        } else {
            self.engine.tree.entry_mut(id).target_line = Some(line);
            // framing the file makes it content-eligible, which triggers the
            // load that resolves the deferred line
            self.camera.frame_entry(self.engine.tree.entry(id));
        }
        self.engine.changed = true;
        true
    }

    /// Navigate a `path#line` URL fragment
    pub fn go_to_url(&mut self, url: &str) -> bool {
        match url.split_once('#') {
            Some((path, frag)) => match frag.parse::<u32>() {
                Ok(line) => self.go_to_path_at_line(path, line),
                Err(_) => self.go_to_path(path),
            },
            None => self.go_to_path(url),
        }
    }

    pub fn set_search_results(&mut self, hits: Vec<SearchHit>) {
        self.search.set_results(hits);
        self.engine.changed = true;
    }

    pub fn set_links(&mut self, links: Vec<Link>) {
        self.links.set_links(links);
        self.engine.changed = true;
    }

    /// Click navigation: frame the deepest entry under the world point
    pub fn click(&mut self, world: Vec2) {
        if !self.engine.layout_ready() {
            return;
        }
        if let Some(id) = pick(&self.engine.tree, world) {
            self.camera.frame_entry(self.engine.tree.entry(id));
            self.engine.changed = true;
        }
    }

    /// Re-read one directory from the provider and merge the result into
    /// the tree. Removed subtrees free their buffer ranges in place;
    /// additions re-layout the affected subtree inside its span, falling
    /// back to a full rebuild when the span is too small.
    pub fn refresh_dir(&mut self, path: &str) -> Result<(), ProviderError> {
        if !self.engine.layout_ready() {
            debug!("refresh of {path} ignored while layout is pending");
            return Ok(());
        }
        let Some(dir) = self.engine.tree.entry_by_path(path) else {
            return Err(ProviderError::NotFound(path.to_string()));
        };
        let listing = self.engine.provider.read_dir(path)?;
        let outcome = self.engine.tree.merge_dir(dir, &listing);
        if outcome.added.is_empty() && outcome.removed.is_empty() {
            return Ok(());
        }
        info!(
            "refresh {path}: +{} -{} entries",
            outcome.added.len(),
            outcome.removed.len()
        );

        for &removed in &outcome.removed {
            for id in self.engine.tree.subtree_ids(removed) {
                if self.engine.visible.contains(id) {
                    loader::evict(&mut self.engine, id);
                }
            }
            let e = self.engine.tree.entry(removed);
            let (vi, lvi) = (e.vertex_index, e.last_vertex_index);
            if vi >= 0 && lvi > vi {
                self.engine.buffers.zero_rect_range(vi as u32..lvi as u32);
            }
        }

        if !outcome.added.is_empty() {
            // surviving content under the dir will be re-positioned; evict it
            for id in self.engine.tree.subtree_ids(dir) {
                if self.engine.visible.contains(id) {
                    loader::evict(&mut self.engine, id);
                }
            }
            if self.engine.buffers.reassign_subtree(&mut self.engine.tree, dir) {
                self.engine
                    .buffers
                    .write_rect(self.engine.tree.entry(dir), theme::entry_fill(self.engine.tree.entry(dir)));
                self.start_layout(dir);
            } else {
                info!("refresh {path}: subtree outgrew its buffer span, rebuilding");
                return self.reload();
            }
        }
        self.engine.changed = true;
        Ok(())
    }

    /// Gather this frame's GPU work: dirty-range uploads, the uniform
    /// matrix and the draw list bounded by the covering node
    pub fn frame_uploads(&mut self) -> FrameUploads {
        let (rects, text) = self.engine.buffers.take_uploads();
        let overlay = self.overlay.take_upload();
        let text_draws: Vec<Range<u32>> = self
            .engine
            .visible
            .iter()
            .filter_map(|id| {
                let e = self.engine.tree.entry(id);
                e.content()?;
                Some(index_range(
                    e.text_vertex_index as u32..e.last_text_vertex_index as u32,
                ))
            })
            .collect();
        FrameUploads {
            generation: self.engine.buffers.generation,
            rect_capacity: self.engine.buffers.rect_capacity(),
            text_capacity: self.engine.buffers.text_capacity(),
            overlay_capacity: OVERLAY_CAPACITY_QUADS * 4,
            rects,
            text,
            overlay,
            overlay_quads: self.overlay.quads(),
            uniforms: Uniforms::from_window(&self.camera.window(self.aspect)),
            rect_draw: index_range(self.selection.rect_draw.clone()),
            text_draws,
        }
    }

    #[cfg(test)]
    pub(crate) fn selection(&self) -> &FrameSelection {
        &self.selection
    }
}
