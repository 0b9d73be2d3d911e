//! Application-wide constants and default tuning values
//!
//! Centralized location for the layout, LOD, scheduler and buffer numbers so
//! the individual engine modules stay free of magic values.

/// Spatial layout constants
pub mod layout {
    /// Margin reserved on the left/right/bottom edges of a directory square,
    /// as a fraction of the directory's side length
    pub const MARGIN_FRAC: f32 = 0.04;

    /// Extra top inset reserving space for the directory label, as a fraction
    /// of the directory's side length
    pub const TOP_MARGIN_FRAC: f32 = 0.08;

    /// Z increment per tree depth level, keeps descendants layered above ancestors
    pub const Z_STEP: f32 = 0.01;

    /// Minimum child side length as a fraction of the parent side, so
    /// zero-weight entries stay clickable
    pub const MIN_SCALE_FRAC: f32 = 0.01;

    /// Gap between sibling squares as a fraction of the parent side
    pub const GAP_FRAC: f32 = 0.006;

    /// Maximum repack iterations when shrinking rows to fit the parent square
    pub const MAX_FIT_PASSES: usize = 4;
}

/// LOD and frustum selection constants
pub mod lod {
    /// Apparent-size numerator: apparent = scale * APPARENT_K / max(fov, target_fov)
    pub const APPARENT_K: f32 = 50.0;

    /// World-window divisor: the camera sees a square of half-extent fov / WINDOW_K
    pub const WINDOW_K: f32 = 50.0;

    /// Apparent size below which a node renders as a flat colored box only
    pub const CONTENT_THRESHOLD: f32 = 0.2;

    /// Viewport-coverage fraction for the soft navigation-target fallback
    pub const COVER_FALLBACK: f32 = 0.9;

    /// Center-distance tolerance for the soft fallback, as a fraction of the
    /// window half-extent
    pub const CENTER_TOL: f32 = 0.05;
}

/// Cooperative scheduler constants
pub mod scheduler {
    /// Soft deadline per time slice, in milliseconds
    pub const FRAME_BUDGET_MS: u64 = 10;
}

/// Content streaming constants
pub mod loader {
    /// Maximum number of simultaneously materialized content nodes
    pub const MAX_VISIBLE: usize = 40;

    /// Line cap per file; longer files are truncated for display
    pub const MAX_LINES: usize = 4000;

    /// Lines tokenized per scheduler unit
    pub const TOKENIZE_LINES_PER_STEP: usize = 256;

    /// Lines converted to quads per scheduler unit
    pub const BUILD_LINES_PER_STEP: usize = 128;

    /// Token-quad cap per file; excess tokens are dropped from display
    pub const MAX_QUADS_PER_FILE: usize = 4096;
}

/// Geometry buffer capacities
pub mod buffers {
    /// Text arena capacity in vertices (shared across the visible set)
    pub const TEXT_CAPACITY: u32 =
        (super::loader::MAX_VISIBLE * super::loader::MAX_QUADS_PER_FILE * 4) as u32;

    /// Overlay buffer capacity in quads (search line highlights + links)
    pub const OVERLAY_CAPACITY_QUADS: u32 = 4096;
}

/// Camera motion constants
pub mod camera {
    /// Exponential decay base per 16 ms of animation
    pub const DECAY_BASE: f32 = 0.85;

    /// Minimum dt used by the decay step, in milliseconds
    pub const MIN_DT_MS: f32 = 16.0;

    /// Snap epsilon as a fraction of the current field of view
    pub const SNAP_EPS: f32 = 2.0e-4;

    /// Default field of view for a fresh session
    pub const DEFAULT_FOV: f32 = 60.0;

    /// Slack factor applied when framing an entry so its square does not
    /// touch the viewport edges
    pub const FRAME_SLACK: f32 = 1.1;

    /// Lines kept in view after a line-accurate navigation
    pub const LINE_VIEW_LINES: f32 = 24.0;
}
