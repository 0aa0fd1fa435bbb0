//! Pipeline orchestration: the engine driving all stages end-to-end.
//!
//! A [`LineArtEngine`] owns the parameters and, after a pass, the produced
//! output (arenas, tile grid, chains). Internally `process` runs: geometry
//! load, near-plane cull, perspective division, tile-grid construction,
//! feature classification, triangle insertion with intersections, occlusion
//! resolution on the worker pool, and optional chaining, timing each stage
//! into the trace.
//!
//! Typical usage:
//! ```no_run
//! use line_art::{LineArtEngine, LineArtParams};
//! use line_art::scene::Scene;
//!
//! # fn example(scene: Scene) -> Result<(), String> {
//! let mut engine = LineArtEngine::new(LineArtParams::default());
//! let report = engine.process(&scene)?;
//! println!("contours: {}", report.result.contour_count);
//! # Ok(())
//! # }
//! ```
use crate::buffer::{CameraState, LineSegment, RenderBuffer};
use crate::chain::{build_chains, LineChain};
use crate::classify::classify_lines;
use crate::cull::{cull_triangles, perspective_division};
use crate::diagnostics::{
    ChainStage, ClassifyStage, ComputeReport, CullStage, InputDescriptor, LoadStage,
    OcclusionStage, PipelineTrace, TileStage, TimingBreakdown,
};
use crate::intersect::add_triangles;
use crate::loader::load_geometry;
use crate::occlusion::resolve_occlusion;
use crate::options::LineArtParams;
use crate::scene::Scene;
use crate::tiles::TileGrid;
use crate::types::{
    EdgeFlags, LineArtResult, LineCategory, LineId, ObjectId, RenderStatus, StatusHandle,
};
use log::debug;
use nalgebra::{Vector2, Vector3};
use std::thread::JoinHandle;
use std::time::Instant;

/// Everything a pass produced, retained for downstream consumption.
#[derive(Debug, Default)]
pub struct LineArtOutput {
    pub buffer: RenderBuffer,
    pub grid: TileGrid,
    pub chains: Vec<LineChain>,
}

/// Read-only view of one output line: endpoint positions, object reference
/// and the resolved segment list.
#[derive(Clone, Copy, Debug)]
pub struct LineView<'a> {
    pub from: Vector3<f64>,
    pub to: Vector3<f64>,
    pub from_ndc: Vector2<f64>,
    pub to_ndc: Vector2<f64>,
    pub object: Option<ObjectId>,
    pub flags: EdgeFlags,
    pub segments: &'a [LineSegment],
    pub min_occlusion: u32,
}

impl LineArtOutput {
    /// Lines of one category, as output views.
    pub fn lines(&self, category: LineCategory) -> impl Iterator<Item = LineView<'_>> {
        self.buffer
            .category_list(category)
            .iter()
            .map(move |&id| self.line_view(id))
    }

    fn line_view(&self, id: LineId) -> LineView<'_> {
        let line = self.buffer.line(id);
        LineView {
            from: self.buffer.vert(line.l).gloc,
            to: self.buffer.vert(line.r).gloc,
            from_ndc: self.buffer.vert(line.l).fb2(),
            to_ndc: self.buffer.vert(line.r).fb2(),
            object: line.object,
            flags: line.flags,
            segments: &line.segments,
            min_occlusion: line.min_occ,
        }
    }
}

/// Feature-line extraction engine.
pub struct LineArtEngine {
    params: LineArtParams,
    output: Option<LineArtOutput>,
}

impl LineArtEngine {
    pub fn new(params: LineArtParams) -> Self {
        Self {
            params,
            output: None,
        }
    }

    pub fn params(&self) -> &LineArtParams {
        &self.params
    }

    /// Output of the last completed pass.
    pub fn output(&self) -> Option<&LineArtOutput> {
        self.output.as_ref()
    }

    /// Runs the full pipeline on `scene`.
    ///
    /// Errors only when the scene has neither camera nor viewport override;
    /// everything else is absorbed into the result.
    pub fn process(&mut self, scene: &Scene) -> Result<ComputeReport, String> {
        self.process_with_status(scene, &StatusHandle::new())
    }

    /// Runs the pipeline observing an externally shared status flag.
    ///
    /// Cancel the flag from another thread to stop the occlusion stage
    /// early; a canceled pass leaves partially populated category lists the
    /// caller must discard.
    pub fn process_with_status(
        &mut self,
        scene: &Scene,
        status: &StatusHandle,
    ) -> Result<ComputeReport, String> {
        let camera = CameraState::from_scene(scene, self.params.width, self.params.height)?;
        status.set(RenderStatus::Running);
        self.output = None;

        debug!(
            "LineArtEngine::process start objects={} {}x{}",
            scene.objects.len(),
            self.params.width,
            self.params.height
        );
        let total_start = Instant::now();
        let mut buffer = RenderBuffer::default();

        let load_start = Instant::now();
        let load_stats = load_geometry(scene, &camera, &mut buffer);
        let load_ms = load_start.elapsed().as_secs_f64() * 1000.0;

        let cull_start = Instant::now();
        let cull_stats = cull_triangles(&mut buffer, &camera);
        let cull_ms = cull_start.elapsed().as_secs_f64() * 1000.0;

        let divide_start = Instant::now();
        perspective_division(&mut buffer, &camera);
        let divide_ms = divide_start.elapsed().as_secs_f64() * 1000.0;

        let mut grid = TileGrid::new();

        let classify_start = Instant::now();
        let classify_stats =
            classify_lines(&mut buffer, &mut grid, &camera, self.params.crease_threshold);
        let classify_ms = classify_start.elapsed().as_secs_f64() * 1000.0;

        let tiles_start = Instant::now();
        let tile_stats = add_triangles(
            &mut buffer,
            &mut grid,
            &camera,
            self.params.use_intersections,
        );
        let tiles_ms = tiles_start.elapsed().as_secs_f64() * 1000.0;

        let occlusion_start = Instant::now();
        let occlusion_stats = resolve_occlusion(
            &mut buffer,
            &grid,
            &camera,
            self.params.max_occlusion,
            self.params.thread_count,
            self.params.batch_size,
            status,
        );
        let occlusion_ms = occlusion_start.elapsed().as_secs_f64() * 1000.0;

        let mut chains: Vec<LineChain> = Vec::new();
        let mut chain_stage: Option<ChainStage> = None;
        let mut chain_ms = 0.0f64;
        if self.params.chaining && !occlusion_stats.canceled {
            let chain_start = Instant::now();
            let (built, chain_stats) = build_chains(&buffer, &self.params.chain);
            chain_ms = chain_start.elapsed().as_secs_f64() * 1000.0;
            chains = built;
            chain_stage = Some(ChainStage {
                elapsed_ms: chain_ms,
                chains: chain_stats.chains,
                connected: chain_stats.connected,
                discarded_short: chain_stats.discarded_short,
            });
        }

        status.set(RenderStatus::Finished);
        let final_status = status.get();
        let latency = total_start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "LineArtEngine::process done status={:?} latency_ms={:.3}",
            final_status, latency
        );

        let result = LineArtResult {
            status: final_status,
            contour_count: buffer.contours.len(),
            crease_count: buffer.creases.len(),
            material_count: buffer.materials.len(),
            edge_mark_count: buffer.edge_marks.len(),
            intersection_count: buffer.intersections.len(),
            chain_count: chains.len(),
            latency_ms: latency,
        };

        let mut timings = TimingBreakdown::with_total(latency);
        timings.push("load", load_ms);
        timings.push("cull", cull_ms);
        timings.push("divide", divide_ms);
        timings.push("classify", classify_ms);
        timings.push("tiles", tiles_ms);
        timings.push("occlusion", occlusion_ms);
        if chain_stage.is_some() {
            timings.push("chain", chain_ms);
        }

        let trace = PipelineTrace {
            input: InputDescriptor {
                width: self.params.width,
                height: self.params.height,
                objects: scene.objects.len(),
            },
            timings,
            load: LoadStage {
                elapsed_ms: load_ms,
                objects: load_stats.objects,
                vertices: load_stats.vertices,
                triangles: load_stats.triangles,
                lines: load_stats.lines,
            },
            cull: CullStage {
                elapsed_ms: cull_ms,
                discarded: cull_stats.discarded,
                clipped: cull_stats.clipped,
                new_triangles: cull_stats.new_triangles,
            },
            classify: ClassifyStage {
                elapsed_ms: classify_ms,
                contours: classify_stats.contours,
                creases: classify_stats.creases,
                materials: classify_stats.materials,
                edge_marks: classify_stats.edge_marks,
            },
            tiles: TileStage {
                elapsed_ms: tiles_ms,
                cells: grid.len(),
                splits: grid.split_count(),
                triangles_linked: tile_stats.triangles_linked,
                intersection_lines: tile_stats.lines_created,
            },
            occlusion: OcclusionStage {
                elapsed_ms: occlusion_ms,
                lines_processed: occlusion_stats.lines_processed,
                threads: occlusion_stats.threads,
                canceled: occlusion_stats.canceled,
            },
            chain: chain_stage,
        };

        self.output = Some(LineArtOutput {
            buffer,
            grid,
            chains,
        });

        Ok(ComputeReport { result, trace })
    }
}

/// Runs a full pass on a background thread.
///
/// Returns the join handle and the shared status flag; call
/// [`StatusHandle::cancel`] to stop the pass cooperatively. The engine and
/// report come back through the handle.
pub fn spawn_compute(
    params: LineArtParams,
    scene: Scene,
) -> (
    JoinHandle<Result<(LineArtEngine, ComputeReport), String>>,
    StatusHandle,
) {
    let status = StatusHandle::new();
    let worker_status = status.clone();
    let handle = std::thread::spawn(move || {
        let mut engine = LineArtEngine::new(params);
        let report = engine.process_with_status(&scene, &worker_status)?;
        Ok((engine, report))
    });
    (handle, status)
}
