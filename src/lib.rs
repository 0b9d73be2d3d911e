//! Tessera core library
//!
//! A continuously zoomable treemap renderer for source-code repositories:
//! a weighted tree is laid out as nested squares, drawn from shared vertex
//! buffers with per-node draw ranges, and file contents stream in as token
//! geometry when the camera gets close enough. All long-running work is
//! time-sliced through a cooperative frame-budget scheduler so the render
//! loop never blocks.

// Public modules
pub mod buffers;
pub mod camera;
pub mod constants;
pub mod gpu;
pub mod highlight;
pub mod layout;
pub mod loader;
pub mod lod;
pub mod overlay;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod theme;
pub mod tree;

// Re-export commonly used types
pub use provider::{DiskProvider, MemoryProvider, ProviderError, TreeProvider};
pub use session::{EngineConfig, Session};
