//! Content streaming loader
//!
//! Materializes file contents for nodes the LOD selector deems
//! content-eligible: fetch raw bytes from the provider, tokenize through the
//! highlighter seam, build token-quad geometry into the shared text arena,
//! then attach the content metrics in one commit step. All of it runs as a
//! [`ContentTask`] under the cooperative scheduler, a bounded batch of lines
//! per unit.
//!
//! Fetch, convert and attach are cancellable up to the attach step: the task
//! carries the entry's content generation from admission time, and every
//! unit re-checks it. Evicting a node bumps the generation, so a stale task
//! wakes up, notices, and dies without touching the visible set or the
//! buffers.

use crate::buffers::Vertex;
use crate::highlight::TokenSpan;
use crate::lod::FrameSelection;
use crate::scheduler::{FrameScheduler, FrameTask, Step};
use crate::session::{Engine, NavRequest};
use crate::theme;
use crate::tree::{ContentInfo, ContentState, EntryId};
use log::{debug, warn};

/// Horizontal inset of the text block inside its file square
const TEXT_INSET_X: f32 = 0.1;
/// Top inset (below the file label), as a fraction of the square side
const TEXT_INSET_TOP: f32 = 0.15;
/// Bottom inset, as a fraction of the square side
const TEXT_INSET_BOTTOM: f32 = 0.05;
/// Character advance as a fraction of the line height
const CHAR_ASPECT: f32 = 0.6;
/// Quad height as a fraction of the line height
const QUAD_FILL: f32 = 0.85;

/// The authoritative record of which nodes hold (or are acquiring) content
/// geometry, in admission order, capacity-bounded
pub struct VisibleSet {
    entries: Vec<(String, EntryId)>,
    capacity: usize,
}

impl VisibleSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.iter().any(|&(_, e)| e == id)
    }

    pub fn insert(&mut self, path: String, id: EntryId) {
        if !self.contains(id) {
            self.entries.push((path, id));
        }
    }

    pub fn remove(&mut self, id: EntryId) -> Option<String> {
        let at = self.entries.iter().position(|&(_, e)| e == id)?;
        Some(self.entries.remove(at).0)
    }

    /// Entry ids oldest-first
    pub fn iter(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.entries.iter().map(|&(_, id)| id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Evict one node: drop its text geometry, bump its cancellation generation
/// and return it to the unfetched pool (failed nodes stay failed)
pub fn evict(engine: &mut Engine, id: EntryId) {
    engine.visible.remove(id);
    let e = engine.tree.entry_mut(id);
    e.content_gen = e.content_gen.wrapping_add(1);
    let start = e.text_vertex_index;
    let last = e.last_text_vertex_index;
    e.text_vertex_index = -1;
    e.last_text_vertex_index = -1;
    if !matches!(e.content_state(), Some(ContentState::Failed)) {
        e.set_content_state(ContentState::Unfetched);
    }
    if start >= 0 && last > start {
        engine.buffers.free_text(start as u32, (last - start) as u32);
    }
    engine.changed = true;
}

/// Admit content-eligible files into the visible set, evicting the oldest
/// non-eligible entries under capacity pressure. A frame where every entry
/// is still eligible admits nothing and retries next frame.
pub fn admit(
    engine: &mut Engine,
    selection: &FrameSelection,
    scheduler: &mut FrameScheduler<Engine>,
) {
    for &id in &selection.content_eligible {
        if !matches!(
            engine.tree.entry(id).content_state(),
            Some(ContentState::Unfetched)
        ) {
            continue;
        }
        if engine.visible.contains(id) {
            continue;
        }
        if engine.visible.len() >= engine.visible.capacity() {
            let victim = engine.visible.iter().find(|&v| !selection.is_eligible(v));
            match victim {
                Some(v) => evict(engine, v),
                None => break,
            }
        }
        let path = engine.tree.full_path(id);
        let gen = engine.tree.entry(id).content_gen;
        engine
            .tree
            .entry_mut(id)
            .set_content_state(ContentState::Queued);
        engine.visible.insert(path.clone(), id);
        debug!("content: admit {path}");
        scheduler.enqueue(Box::new(ContentTask::new(id, path, gen)));
    }
}

enum Phase {
    Fetch,
    Tokenize {
        lines: Vec<String>,
        spans: Vec<Vec<TokenSpan>>,
    },
    Build {
        spans: Vec<Vec<TokenSpan>>,
        info: ContentInfo,
        arena_start: u32,
        quad_budget: u32,
        quads_written: u32,
        next_line: usize,
    },
}

/// Scheduler task materializing one file's content geometry
pub struct ContentTask {
    entry: EntryId,
    path: String,
    gen: u32,
    phase: Phase,
}

impl ContentTask {
    pub fn new(entry: EntryId, path: String, gen: u32) -> Self {
        Self {
            entry,
            path,
            gen,
            phase: Phase::Fetch,
        }
    }

    /// True while this task still owns the node's pending request
    fn still_owner(&self, engine: &Engine) -> bool {
        let e = engine.tree.entry(self.entry);
        e.content_gen == self.gen
            && matches!(
                e.content_state(),
                Some(ContentState::Queued | ContentState::Building)
            )
    }

    fn abort_unfetched(&self, engine: &mut Engine, reason: &str) {
        debug!("content: {} aborted ({reason})", self.path);
        engine.visible.remove(self.entry);
        engine
            .tree
            .entry_mut(self.entry)
            .set_content_state(ContentState::Unfetched);
    }

    fn step_fetch(&mut self, engine: &mut Engine) -> Step {
        engine
            .tree
            .entry_mut(self.entry)
            .set_content_state(ContentState::Building);
        let bytes = match engine.provider.read_file_bytes(&self.path) {
            Ok(b) => b,
            Err(err) => {
                // permanently un-fetchable this session; no retry storm
                warn!("content: fetch failed for {}: {err}", self.path);
                engine.visible.remove(self.entry);
                engine
                    .tree
                    .entry_mut(self.entry)
                    .set_content_state(ContentState::Failed);
                engine
                    .buffers
                    .write_rect(engine.tree.entry(self.entry), theme::colors().failed_file);
                engine.changed = true;
                return Step::Done;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut lines: Vec<String> = text
            .lines()
            .take(engine.config.max_lines)
            .map(str::to_string)
            .collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        self.phase = Phase::Tokenize {
            lines,
            spans: Vec::new(),
        };
        Step::Yield
    }

    fn step_tokenize(&mut self, engine: &mut Engine) -> Step {
        let Phase::Tokenize { lines, spans } = &mut self.phase else {
            return Step::Done;
        };
        let batch = crate::constants::loader::TOKENIZE_LINES_PER_STEP;
        let upto = (spans.len() + batch).min(lines.len());
        while spans.len() < upto {
            spans.push(engine.highlighter.tokenize_line(&lines[spans.len()]));
        }
        if spans.len() < lines.len() {
            return Step::Yield;
        }

        // all lines tokenized: size the geometry and claim an arena segment
        let e = engine.tree.entry(self.entry);
        let line_count = lines.len() as u32;
        let text_height = e.scale * (1.0 - TEXT_INSET_TOP - TEXT_INSET_BOTTOM);
        let line_h = text_height / line_count as f32;
        let info = ContentInfo {
            line_count,
            text_scale: line_h,
            text_height,
            text_x: e.x + e.scale * TEXT_INSET_X,
            text_y: e.y + e.scale * TEXT_INSET_BOTTOM,
            text_y_zero: e.y + e.scale * (1.0 - TEXT_INSET_TOP),
        };
        let quad_budget = spans
            .iter()
            .map(|s| s.len() as u32)
            .sum::<u32>()
            .min(engine.config.max_quads_per_file as u32)
            .max(1);

        let mut arena_start = engine.buffers.alloc_text(quad_budget * 4);
        while arena_start.is_none() {
            // capacity pressure in the arena itself: retire the oldest
            // materialized entry and retry
            let victim = engine.visible.iter().find(|&v| {
                v != self.entry
                    && matches!(
                        engine.tree.entry(v).content_state(),
                        Some(ContentState::Ready(_))
                    )
            });
            match victim {
                Some(v) => {
                    evict(engine, v);
                    arena_start = engine.buffers.alloc_text(quad_budget * 4);
                }
                None => break,
            }
        }
        let Some(arena_start) = arena_start else {
            // back to the pool; the node stays eligible and retries later
            self.abort_unfetched(engine, "text arena exhausted");
            return Step::Done;
        };
        {
            let e = engine.tree.entry_mut(self.entry);
            e.text_vertex_index = arena_start as i32;
            e.last_text_vertex_index = (arena_start + quad_budget * 4) as i32;
        }

        let spans = match std::mem::replace(&mut self.phase, Phase::Fetch) {
            Phase::Tokenize { spans, .. } => spans,
            _ => unreachable!(),
        };
        self.phase = Phase::Build {
            spans,
            info,
            arena_start,
            quad_budget,
            quads_written: 0,
            next_line: 0,
        };
        Step::Yield
    }

    fn step_build(&mut self, engine: &mut Engine) -> Step {
        let Phase::Build {
            spans,
            info,
            arena_start,
            quad_budget,
            quads_written,
            next_line,
            ..
        } = &mut self.phase
        else {
            return Step::Done;
        };
        let z = engine.tree.entry(self.entry).z + 0.002;
        let char_w = info.text_scale * CHAR_ASPECT;
        let max_cols = ((engine.tree.entry(self.entry).scale * (1.0 - 2.0 * TEXT_INSET_X))
            / char_w.max(f32::EPSILON)) as u32;
        let batch_end = (*next_line + crate::constants::loader::BUILD_LINES_PER_STEP)
            .min(spans.len());

        let mut verts: Vec<Vertex> = Vec::new();
        let write_from = *arena_start + *quads_written * 4;
        while *next_line < batch_end {
            let line_top = info.text_y_zero - *next_line as f32 * info.text_scale;
            for span in &spans[*next_line] {
                if *quads_written >= *quad_budget || span.start >= max_cols {
                    continue;
                }
                let len = span.len.min(max_cols - span.start);
                let x0 = info.text_x + span.start as f32 * char_w;
                let x1 = x0 + len as f32 * char_w;
                let y1 = line_top;
                let y0 = line_top - info.text_scale * QUAD_FILL;
                let color = theme::token_color(span.class);
                verts.extend_from_slice(&[
                    Vertex { position: [x0, y0, z], color },
                    Vertex { position: [x1, y0, z], color },
                    Vertex { position: [x1, y1, z], color },
                    Vertex { position: [x0, y1, z], color },
                ]);
                *quads_written += 1;
            }
            *next_line += 1;
        }
        if !verts.is_empty() {
            engine.buffers.write_text(write_from, &verts);
        }
        if *next_line < spans.len() && *quads_written < *quad_budget {
            return Step::Yield;
        }

        // attach: the single commit point making the content visible
        let info = *info;
        let e = engine.tree.entry_mut(self.entry);
        e.set_content_state(ContentState::Ready(info));
        if let Some(line) = e.target_line.take() {
            engine.nav_requests.push(NavRequest {
                entry: self.entry,
                line,
            });
        }
        engine.changed = true;
        debug!("content: attached {} ({} lines)", self.path, info.line_count);
        Step::Done
    }
}

impl FrameTask<Engine> for ContentTask {
    fn step(&mut self, engine: &mut Engine) -> Step {
        if !self.still_owner(engine) {
            // evicted or superseded while in flight; drop without writes
            debug!("content: stale task for {} discarded", self.path);
            return Step::Done;
        }
        match self.phase {
            Phase::Fetch => self.step_fetch(engine),
            Phase::Tokenize { .. } => self.step_tokenize(engine),
            Phase::Build { .. } => self.step_build(engine),
        }
    }

    fn label(&self) -> &'static str {
        "content"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::camera::DECAY_BASE;
    use crate::constants::lod::CONTENT_THRESHOLD;
    use crate::camera::CameraRig;
    use crate::highlight::PlainHighlighter;
    use crate::layout::LayoutTask;
    use crate::lod::select_frame;
    use crate::provider::MemoryProvider;
    use crate::scheduler::test_clock::FakeClock;
    use crate::session::{Engine, EngineConfig};
    use std::time::Duration;

    fn engine_with(provider: MemoryProvider, config: EngineConfig) -> Engine {
        let mut engine =
            Engine::new(Box::new(provider), Box::new(PlainHighlighter), config, 1)
                .expect("engine");
        // run the whole layout synchronously
        let mut task = LayoutTask::new(engine.tree.root());
        engine.layout_started();
        while task.step(&mut engine) == Step::Yield {}
        assert!(engine.layout_ready());
        engine
    }

    fn camera_framing(engine: &Engine, path: &str) -> CameraRig {
        let id = engine.tree.entry_by_path(path).expect("path");
        let mut cam = CameraRig::new(DECAY_BASE);
        cam.frame_entry(engine.tree.entry(id));
        cam.snap_to_target();
        cam
    }

    fn scheduler_ms(budget: u64, clock: &FakeClock) -> FrameScheduler<Engine> {
        FrameScheduler::new(Duration::from_millis(budget), Box::new(clock.clone()))
    }

    fn drain(engine: &mut Engine, sched: &mut FrameScheduler<Engine>) {
        let mut slices = 0;
        while !sched.is_idle() {
            sched.run_slice(engine);
            slices += 1;
            assert!(slices < 10_000, "scheduler never drained");
        }
    }

    #[test]
    fn eligible_file_streams_in_and_attaches() {
        let mut provider = MemoryProvider::new();
        provider.add_file("/src/main.rs", b"fn main() {\n    run();\n}\n");
        let mut engine = engine_with(provider, EngineConfig::default());
        let cam = camera_framing(&engine, "/src/main.rs");
        let clock = FakeClock::new();
        let mut sched = scheduler_ms(10, &clock);

        let sel = select_frame(&engine.tree, &cam, 1.0, CONTENT_THRESHOLD);
        let id = engine.tree.entry_by_path("/src/main.rs").unwrap();
        assert!(sel.is_eligible(id));

        admit(&mut engine, &sel, &mut sched);
        assert!(engine.visible.contains(id));
        drain(&mut engine, &mut sched);

        let e = engine.tree.entry(id);
        let info = e.content().expect("content attached");
        assert_eq!(info.line_count, 3);
        assert!(e.text_vertex_index >= 0);
        assert!(e.last_text_vertex_index > e.text_vertex_index);
        // line anchor math: top line sits just under text_y_zero
        assert!(info.text_y_zero > info.text_y);
        assert!((info.text_height - info.text_scale * 3.0).abs() < 1e-5);
    }

    #[test]
    fn admission_is_idempotent_while_in_flight() {
        let mut provider = MemoryProvider::new();
        provider.add_file("/a.rs", b"x\n");
        let mut engine = engine_with(provider, EngineConfig::default());
        let cam = camera_framing(&engine, "/a.rs");
        let clock = FakeClock::new();
        let mut sched = scheduler_ms(10, &clock);
        let sel = select_frame(&engine.tree, &cam, 1.0, CONTENT_THRESHOLD);

        admit(&mut engine, &sel, &mut sched);
        let pending = sched.pending();
        admit(&mut engine, &sel, &mut sched);
        assert_eq!(sched.pending(), pending, "double admission");
        assert_eq!(engine.visible.len(), 1);
    }

    #[test]
    fn eviction_never_hits_a_currently_eligible_node() {
        let mut provider = MemoryProvider::new();
        provider.add_file("/a.rs", b"a\n");
        provider.add_file("/b.rs", b"b\n");
        let mut config = EngineConfig::default();
        config.max_visible = 1;
        let mut engine = engine_with(provider, config);
        let clock = FakeClock::new();
        let mut sched = scheduler_ms(10, &clock);

        let a = engine.tree.entry_by_path("/a.rs").unwrap();
        let b = engine.tree.entry_by_path("/b.rs").unwrap();

        // materialize a
        let sel = crate::lod::FrameSelection::for_test(vec![a]);
        admit(&mut engine, &sel, &mut sched);
        drain(&mut engine, &mut sched);
        assert!(engine.tree.entry(a).content().is_some());

        // both eligible at capacity 1: b must wait, a stays
        let sel_both = crate::lod::FrameSelection::for_test(vec![a, b]);
        admit(&mut engine, &sel_both, &mut sched);
        assert!(engine.visible.contains(a));
        assert!(!engine.visible.contains(b));
        assert!(sched.is_idle());

        // once a scrolls out of content detail it is the eviction victim
        let sel_b = crate::lod::FrameSelection::for_test(vec![b]);
        admit(&mut engine, &sel_b, &mut sched);
        drain(&mut engine, &mut sched);
        assert!(!engine.visible.contains(a));
        assert!(engine.tree.entry(a).content().is_none());
        assert!(engine.tree.entry(b).content().is_some());
    }

    #[test]
    fn eviction_mid_flight_cancels_the_attach() {
        let mut provider = MemoryProvider::new();
        provider.add_file("/a.rs", b"line one\nline two\n");
        let mut engine = engine_with(provider, EngineConfig::default());
        let clock = FakeClock::new();
        // zero budget: exactly one unit per slice
        let mut sched = scheduler_ms(0, &clock);
        let a = engine.tree.entry_by_path("/a.rs").unwrap();

        let sel = crate::lod::FrameSelection::for_test(vec![a]);
        admit(&mut engine, &sel, &mut sched);
        // run only the fetch unit, then evict while tokenize/build remain
        clock.advance(Duration::from_millis(1));
        sched.run_slice(&mut engine);
        assert!(!sched.is_idle(), "task should be suspended mid-pipeline");
        evict(&mut engine, a);
        let _ = engine.buffers.take_uploads();

        drain(&mut engine, &mut sched);
        // the stale completion must not have attached or touched state
        let e = engine.tree.entry(a);
        assert!(e.content().is_none());
        assert_eq!(*e.content_state().unwrap(), ContentState::Unfetched);
        assert!(!engine.visible.contains(a));
        assert_eq!(e.text_vertex_index, -1);
        let (_, text_uploads) = engine.buffers.take_uploads();
        assert!(text_uploads.is_empty(), "cancelled task wrote text geometry");
    }

    #[test]
    fn provider_failure_marks_the_node_permanently_failed() {
        let mut provider = MemoryProvider::new();
        provider.add_file("/a.rs", b"a\n");
        provider.fail_path("/a.rs");
        let mut engine = engine_with(provider, EngineConfig::default());
        let clock = FakeClock::new();
        let mut sched = scheduler_ms(10, &clock);
        let a = engine.tree.entry_by_path("/a.rs").unwrap();

        let sel = crate::lod::FrameSelection::for_test(vec![a]);
        admit(&mut engine, &sel, &mut sched);
        drain(&mut engine, &mut sched);
        assert_eq!(*engine.tree.entry(a).content_state().unwrap(), ContentState::Failed);
        assert!(!engine.visible.contains(a));

        // re-admission is refused for the rest of the session
        admit(&mut engine, &sel, &mut sched);
        assert!(sched.is_idle());
        assert!(!engine.visible.contains(a));
    }

    #[test]
    fn deferred_target_line_resolves_at_attach() {
        let mut provider = MemoryProvider::new();
        provider.add_file("/a.rs", &b"x\n".repeat(100));
        let mut engine = engine_with(provider, EngineConfig::default());
        let clock = FakeClock::new();
        let mut sched = scheduler_ms(10, &clock);
        let a = engine.tree.entry_by_path("/a.rs").unwrap();
        engine.tree.entry_mut(a).target_line = Some(42);

        let sel = crate::lod::FrameSelection::for_test(vec![a]);
        admit(&mut engine, &sel, &mut sched);
        assert!(engine.nav_requests.is_empty(), "nav resolved before attach");
        drain(&mut engine, &mut sched);

        assert_eq!(engine.nav_requests.len(), 1);
        let req = &engine.nav_requests[0];
        assert_eq!((req.entry, req.line), (a, 42));
        assert_eq!(engine.tree.entry(a).target_line, None);
    }
}
