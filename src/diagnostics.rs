//! Structured per-pass diagnostics.
//!
//! The engine returns a [`ComputeReport`]: the compact result plus a
//! [`PipelineTrace`] describing every stage (timings and counters) in a
//! serializable form, so tooling can dump a run to JSON and diff pipelines
//! across scenes or parameter changes.
use crate::types::LineArtResult;
use serde::{Deserialize, Serialize};

/// Timing entry for a single pipeline stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

impl StageTiming {
    pub fn new(label: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            label: label.into(),
            elapsed_ms,
        }
    }
}

/// Aggregated timing trace for one compute pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn with_total(total_ms: f64) -> Self {
        Self {
            total_ms,
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, elapsed_ms: f64) {
        self.stages.push(StageTiming::new(label, elapsed_ms));
    }
}

/// Input description echoed into the trace.
#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub width: u32,
    pub height: u32,
    pub objects: usize,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStage {
    pub elapsed_ms: f64,
    pub objects: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub lines: usize,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CullStage {
    pub elapsed_ms: f64,
    pub discarded: usize,
    pub clipped: usize,
    pub new_triangles: usize,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyStage {
    pub elapsed_ms: f64,
    pub contours: usize,
    pub creases: usize,
    pub materials: usize,
    pub edge_marks: usize,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileStage {
    pub elapsed_ms: f64,
    pub cells: usize,
    pub splits: usize,
    pub triangles_linked: usize,
    pub intersection_lines: usize,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcclusionStage {
    pub elapsed_ms: f64,
    pub lines_processed: usize,
    pub threads: usize,
    pub canceled: bool,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStage {
    pub elapsed_ms: f64,
    pub chains: usize,
    pub connected: usize,
    pub discarded_short: usize,
}

/// Full structured trace of one compute pass.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrace {
    pub input: InputDescriptor,
    pub timings: TimingBreakdown,
    pub load: LoadStage,
    pub cull: CullStage,
    pub classify: ClassifyStage,
    pub tiles: TileStage,
    pub occlusion: OcclusionStage,
    pub chain: Option<ChainStage>,
}

/// Result plus trace, returned by [`crate::LineArtEngine::process`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeReport {
    pub result: LineArtResult,
    pub trace: PipelineTrace,
}
