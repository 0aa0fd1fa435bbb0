//! Parameter types configuring the extraction pipeline.
//!
//! Defaults aim at typical stylized-render scenes; the crease threshold is
//! the dot product of adjacent face normals below which an edge counts as a
//! crease (0.7 ≈ 45.6° dihedral), not an angle.
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Engine-wide parameters controlling the multi-stage pipeline.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LineArtParams {
    /// Target width in pixels; together with `height` it only fixes the
    /// aspect ratio, nothing is rasterized.
    pub width: u32,
    pub height: u32,
    /// `dot(n_left, n_right)` below this marks a crease.
    pub crease_threshold: f64,
    /// Highest occlusion level still resolved; lines fully past it stop
    /// accumulating cuts early.
    pub max_occlusion: u32,
    /// Generate mesh-mesh intersection lines.
    pub use_intersections: bool,
    /// Stitch same-occlusion segments into chains after resolving.
    pub chaining: bool,
    pub chain: ChainOptions,
    /// Worker threads for the occlusion stage; 0 picks the available
    /// parallelism.
    pub thread_count: usize,
    /// Lines handed to a worker per queue request, per category.
    pub batch_size: usize,
}

impl Default for LineArtParams {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            crease_threshold: 0.7,
            max_occlusion: 0,
            use_intersections: true,
            chaining: false,
            chain: ChainOptions::default(),
            thread_count: 0,
            batch_size: 2048,
        }
    }
}

/// Chain stitching configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChainOptions {
    /// Image-space endpoint distance below which two chains connect.
    pub connect_threshold: f64,
    /// Chains shorter than this (image space) are discarded.
    pub min_length: f64,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            connect_threshold: 0.01,
            min_length: 0.0,
        }
    }
}

/// Reads parameters from a JSON file.
pub fn load_params(path: &Path) -> Result<LineArtParams, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&data).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_deserialize_with_partial_fields() {
        let params: LineArtParams =
            serde_json::from_str(r#"{"crease_threshold": 0.5}"#).expect("parse");
        assert!((params.crease_threshold - 0.5).abs() < 1e-12);
        assert_eq!(params.batch_size, 2048);
    }
}
