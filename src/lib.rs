#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod diagnostics;
pub mod engine;
pub mod options;
pub mod scene;
pub mod types;

// Pipeline internals: public for tools and tests, but considered unstable.
pub mod buffer;
pub mod chain;
pub mod classify;
pub mod cull;
pub mod intersect;
pub mod loader;
pub mod math;
pub mod occlusion;
pub mod tiles;

// --- High-level re-exports -------------------------------------------------

// Main entry points: engine + params + results.
pub use crate::engine::{spawn_compute, LineArtEngine, LineArtOutput, LineView};
pub use crate::options::{ChainOptions, LineArtParams};
pub use crate::types::{LineArtResult, LineCategory, RenderStatus, StatusHandle};

// High-level diagnostics returned by the engine.
pub use crate::diagnostics::{ComputeReport, PipelineTrace};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use line_art::prelude::*;
///
/// # fn main() {
/// let mut engine = LineArtEngine::new(LineArtParams::default());
/// let report = engine.process(&Scene::default());
/// assert!(report.is_err()); // an empty scene has no camera
/// # }
/// ```
pub mod prelude {
    pub use crate::chain::LineChain;
    pub use crate::scene::{Camera, MeshData, Projection, Scene, SceneObject};
    pub use crate::{LineArtEngine, LineArtParams, LineArtResult, LineCategory};
}
