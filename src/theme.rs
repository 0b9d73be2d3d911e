//! Centralized theme and styling for the Tessera treemap
//!
//! Single source of truth for the treemap fill colors, token colors and
//! overlay colors used by the geometry writers and the UI chrome.

use crate::highlight::TokenClass;
use crate::tree::{ContentState, FsEntry};
use egui::Color32;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Color palette for the treemap view
pub struct Colors {
    // Chrome
    pub main_background: Color32,
    pub breadcrumb_text: Color32,

    // Base geometry (linear RGBA as written into vertex buffers)
    pub directory_base: [f32; 4],
    pub directory_deep: [f32; 4],
    pub file_default: [f32; 4],
    pub failed_file: [f32; 4],

    // Overlays
    pub search_hit: [f32; 4],
    pub search_line: [f32; 4],
    pub link_default: [f32; 4],
}

impl Colors {
    pub fn default() -> Self {
        Self {
            main_background: Color32::from_rgb(16, 18, 22),
            breadcrumb_text: Color32::from_rgb(200, 205, 215),

            directory_base: [0.13, 0.16, 0.22, 1.0],
            directory_deep: [0.20, 0.24, 0.33, 1.0],
            file_default: [0.30, 0.32, 0.36, 1.0],
            failed_file: [0.25, 0.12, 0.12, 1.0],

            search_hit: [0.95, 0.80, 0.25, 1.0],
            search_line: [0.95, 0.80, 0.25, 0.55],
            link_default: [0.35, 0.75, 0.95, 0.8],
        }
    }
}

static THEME: Lazy<Colors> = Lazy::new(Colors::default);

/// Get the active color palette
pub fn colors() -> &'static Colors {
    &THEME
}

/// Per-extension file fills, keyed by lowercase extension
static FILE_FILLS: Lazy<HashMap<&'static str, [f32; 4]>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("rs", [0.72, 0.45, 0.25, 1.0]);
    m.insert("c", [0.35, 0.45, 0.65, 1.0]);
    m.insert("h", [0.40, 0.50, 0.70, 1.0]);
    m.insert("cpp", [0.35, 0.45, 0.70, 1.0]);
    m.insert("py", [0.30, 0.55, 0.75, 1.0]);
    m.insert("js", [0.80, 0.75, 0.35, 1.0]);
    m.insert("ts", [0.35, 0.55, 0.80, 1.0]);
    m.insert("go", [0.35, 0.70, 0.75, 1.0]);
    m.insert("java", [0.65, 0.40, 0.30, 1.0]);
    m.insert("md", [0.50, 0.65, 0.50, 1.0]);
    m.insert("toml", [0.55, 0.45, 0.60, 1.0]);
    m.insert("json", [0.55, 0.55, 0.40, 1.0]);
    m.insert("yml", [0.50, 0.55, 0.45, 1.0]);
    m.insert("yaml", [0.50, 0.55, 0.45, 1.0]);
    m.insert("sh", [0.45, 0.60, 0.45, 1.0]);
    m.insert("html", [0.75, 0.45, 0.35, 1.0]);
    m.insert("css", [0.45, 0.50, 0.75, 1.0]);
    m
});

/// Fill color for a file, by extension
pub fn file_fill(name: &str) -> [f32; 4] {
    let ext = name.rsplit('.').next().unwrap_or("");
    let ext = ext.to_ascii_lowercase();
    FILE_FILLS
        .get(ext.as_str())
        .copied()
        .unwrap_or(colors().file_default)
}

/// Fill color for a directory, shaded by depth so nesting stays readable
pub fn dir_fill(depth: u32) -> [f32; 4] {
    let t = (depth as f32 / 12.0).min(1.0);
    let a = colors().directory_base;
    let b = colors().directory_deep;
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        1.0,
    ]
}

/// Base fill for an entry's rectangle
pub fn entry_fill(entry: &FsEntry) -> [f32; 4] {
    if matches!(entry.content_state(), Some(ContentState::Failed)) {
        return colors().failed_file;
    }
    if entry.is_dir() {
        dir_fill(entry.depth())
    } else {
        file_fill(&entry.name)
    }
}

/// Color for a token quad, by token class
pub fn token_color(class: TokenClass) -> [f32; 4] {
    match class {
        TokenClass::Word => [0.78, 0.80, 0.84, 1.0],
        TokenClass::Number => [0.55, 0.75, 0.95, 1.0],
        TokenClass::StringLit => [0.60, 0.80, 0.55, 1.0],
        TokenClass::Comment => [0.45, 0.50, 0.45, 1.0],
        TokenClass::Symbol => [0.60, 0.60, 0.68, 1.0],
    }
}
