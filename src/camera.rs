//! Camera motion controller
//!
//! Two states: settled (camera equals its target) and animating. Each frame
//! the position and field of view decay exponentially toward the target;
//! once the residual falls under an epsilon proportional to the current FOV
//! the camera snaps exactly onto the target and settles. While animating a
//! repaint is requested every frame; settled frames repaint only when some
//! other component marks the scene changed.
//!
//! The FOV doubles as the zoom level: the camera sees a world window of
//! half-extent `fov / WINDOW_K` around its position.

use crate::constants::camera::{DEFAULT_FOV, FRAME_SLACK, LINE_VIEW_LINES, MIN_DT_MS, SNAP_EPS};
use crate::constants::lod::WINDOW_K;
use crate::tree::{ContentInfo, FsEntry};
use glam::{Vec2, Vec3};

/// Axis-aligned world-space rectangle (y up)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl WorldRect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn intersects(&self, other: &WorldRect) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    pub fn contains_rect(&self, other: &WorldRect) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }
}

/// Camera position/FOV pair chasing a target pair
pub struct CameraRig {
    pub pos: Vec3,
    pub fov: f32,
    pub target_pos: Vec3,
    pub target_fov: f32,
    decay: f32,
    animating: bool,
}

impl CameraRig {
    pub fn new(decay: f32) -> Self {
        let pos = Vec3::new(0.5, 0.5, 10.0);
        Self {
            pos,
            fov: DEFAULT_FOV,
            target_pos: pos,
            target_fov: DEFAULT_FOV,
            decay,
            animating: false,
        }
    }

    pub fn animating(&self) -> bool {
        self.animating
    }

    /// Begin animating toward a new target
    pub fn set_target(&mut self, pos: Vec3, fov: f32) {
        self.target_pos = pos;
        self.target_fov = fov.max(f32::EPSILON);
        self.animating = true;
    }

    /// Jump to the target immediately (initial placement, tree reload)
    pub fn snap_to_target(&mut self) {
        self.pos = self.target_pos;
        self.fov = self.target_fov;
        self.animating = false;
    }

    /// Advance the animation by `dt` seconds. Returns true while animating.
    pub fn update(&mut self, dt: f32) -> bool {
        if !self.animating {
            return false;
        }
        let dt_ms = (dt * 1000.0).max(MIN_DT_MS);
        let t = 1.0 - self.decay.powf(dt_ms / MIN_DT_MS);
        self.pos += (self.target_pos - self.pos) * t;
        self.fov += (self.target_fov - self.fov) * t;

        let eps = SNAP_EPS * self.fov;
        if (self.target_pos - self.pos).length() < eps && (self.target_fov - self.fov).abs() < eps
        {
            self.snap_to_target();
        }
        self.animating
    }

    /// Half-extent of the world window at the current FOV
    pub fn half_extent(&self) -> f32 {
        self.fov / WINDOW_K
    }

    /// World-space window currently in view, widened by the display aspect
    /// ratio (width / height)
    pub fn window(&self, aspect: f32) -> WorldRect {
        let half_y = self.half_extent();
        let half_x = half_y * aspect.max(f32::EPSILON);
        let c = Vec2::new(self.pos.x, self.pos.y);
        WorldRect::new(
            Vec2::new(c.x - half_x, c.y - half_y),
            Vec2::new(c.x + half_x, c.y + half_y),
        )
    }

    /// Larger of the current and target FOV; the LOD selector measures
    /// apparent sizes against this so zoom-in animations do not thrash
    /// content admission
    pub fn lod_fov(&self) -> f32 {
        self.fov.max(self.target_fov)
    }

    /// Aim at an entry's square so it fills the view with a little slack
    pub fn frame_entry(&mut self, entry: &FsEntry) {
        let cx = entry.x + entry.scale * 0.5;
        let cy = entry.y + entry.scale * 0.5;
        let fov = WINDOW_K * entry.scale * 0.5 * FRAME_SLACK;
        self.set_target(Vec3::new(cx, cy, self.pos.z), fov);
    }

    /// Aim at one text line of a materialized file, per the content anchor
    /// points recorded at attach time
    pub fn go_to_line(&mut self, entry: &FsEntry, info: &ContentInfo, line: u32) {
        let line = line.min(info.line_count.saturating_sub(1));
        let y = info.text_y_zero
            - ((line as f32 + 0.5) / info.line_count.max(1) as f32) * info.text_height;
        let cx = entry.x + entry.scale * 0.5;
        let fov = WINDOW_K * info.text_scale * LINE_VIEW_LINES * 0.5;
        self.set_target(Vec3::new(cx, y, self.pos.z), fov);
    }

    /// Pan the target by a world-space delta, keeping any in-flight zoom
    pub fn pan(&mut self, delta: Vec2) {
        let target = self.target_pos + Vec3::new(delta.x, delta.y, 0.0);
        self.set_target(target, self.target_fov);
    }

    /// Zoom by `factor` (< 1 zooms in) keeping `anchor` stationary on screen
    pub fn zoom_at(&mut self, anchor: Vec2, factor: f32) {
        let factor = factor.clamp(0.05, 20.0);
        let fov = (self.target_fov * factor).clamp(1.0e-4, 4000.0);
        let center = Vec2::new(self.target_pos.x, self.target_pos.y);
        let new_center = anchor + (center - anchor) * (fov / self.target_fov);
        self.set_target(
            Vec3::new(new_center.x, new_center.y, self.target_pos.z),
            fov,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::camera::DECAY_BASE;

    #[test]
    fn settles_and_snaps_exactly_onto_target() {
        let mut cam = CameraRig::new(DECAY_BASE);
        cam.set_target(Vec3::new(3.0, 4.0, 10.0), 20.0);
        assert!(cam.animating());
        let mut frames = 0;
        while cam.update(1.0 / 60.0) {
            frames += 1;
            assert!(frames < 10_000, "camera never settled");
        }
        assert_eq!(cam.pos, Vec3::new(3.0, 4.0, 10.0));
        assert_eq!(cam.fov, 20.0);
        assert!(!cam.animating());
        // settled camera reports no further animation
        assert!(!cam.update(1.0 / 60.0));
    }

    #[test]
    fn motion_is_monotonic_toward_the_target() {
        let mut cam = CameraRig::new(DECAY_BASE);
        cam.set_target(Vec3::new(10.0, 0.5, 10.0), DEFAULT_FOV);
        let mut last = (cam.target_pos - cam.pos).length();
        for _ in 0..50 {
            cam.update(1.0 / 60.0);
            let d = (cam.target_pos - cam.pos).length();
            assert!(d <= last + f32::EPSILON);
            last = d;
        }
    }

    #[test]
    fn irregular_frame_pacing_is_clamped() {
        let mut a = CameraRig::new(DECAY_BASE);
        let mut b = CameraRig::new(DECAY_BASE);
        a.set_target(Vec3::new(1.0, 1.0, 10.0), 30.0);
        b.set_target(Vec3::new(1.0, 1.0, 10.0), 30.0);
        // a 1 ms frame behaves like a 16 ms frame, not a tiny fraction of one
        a.update(0.001);
        b.update(0.016);
        assert!((a.pos - b.pos).length() < 1e-5);
    }

    #[test]
    fn zoom_keeps_the_anchor_fixed() {
        let mut cam = CameraRig::new(DECAY_BASE);
        cam.snap_to_target();
        let anchor = Vec2::new(0.9, 0.7);
        let before = cam.window(1.0);
        let frac = (anchor - before.center()) / (before.width() * 0.5);

        cam.zoom_at(anchor, 0.5);
        cam.snap_to_target();
        let after = cam.window(1.0);
        let frac_after = (anchor - after.center()) / (after.width() * 0.5);
        assert!((frac - frac_after).length() < 1e-4);
    }

    #[test]
    fn framing_an_entry_centers_its_square() {
        use crate::tree::{ContentState, EntryKind, FileTree};
        let mut cam = CameraRig::new(DECAY_BASE);
        let mut t = FileTree::new("repo");
        let id = t.add_child(
            t.root(),
            "f.rs",
            EntryKind::File {
                content: ContentState::Unfetched,
            },
            1,
        );
        {
            let e = t.entry_mut(id);
            e.x = 2.0;
            e.y = 3.0;
            e.scale = 0.5;
        }
        cam.frame_entry(t.entry(id));
        cam.snap_to_target();
        let w = cam.window(1.0);
        assert!((w.center() - Vec2::new(2.25, 3.25)).length() < 1e-6);
        // the square fits inside the window with slack
        assert!(w.contains_rect(&WorldRect::new(
            Vec2::new(2.0, 3.0),
            Vec2::new(2.5, 3.5)
        )));
    }
}
