//! Render buffer: the per-pass arenas every stage reads and writes.
//!
//! All geometry lives in index-addressed vectors instead of linked nodes;
//! handles stay valid across arena growth and the whole pass is released by
//! dropping the buffer. One buffer exists per computation and is rebuilt from
//! scratch for the next one.
use crate::math::close_enough;
use crate::scene::{Camera, Projection, Scene, ViewportOverride};
use crate::types::{CullStatus, EdgeFlags, LineCategory, LineId, ObjectId, TriId, VertId};
use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// One projected vertex.
#[derive(Clone, Debug)]
pub struct RenderVert {
    /// World-space position, used by the geometric (3-D) tests.
    pub gloc: Vector3<f64>,
    /// Clip-space position; NDC after perspective division.
    pub fbcoord: Vector4<f64>,
    /// For intersection-line endpoints: the source triangle this vertex lies
    /// on, so the occlusion pass never cuts a line against its own surface.
    pub intersecting_with: Option<TriId>,
}

impl RenderVert {
    pub fn new(gloc: Vector3<f64>, fbcoord: Vector4<f64>) -> Self {
        Self {
            gloc,
            fbcoord,
            intersecting_with: None,
        }
    }

    #[inline]
    pub fn fb2(&self) -> Vector2<f64> {
        self.fbcoord.xy()
    }
}

/// Occlusion interval: applies from `at` until the next segment's `at`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSegment {
    pub at: f64,
    pub occlusion: u32,
}

/// One candidate feature edge.
///
/// `l`/`r` are naming convention only, not geometric sides. The segment list
/// partitions [0, 1]: sorted strictly ascending, first entry at 0.
#[derive(Clone, Debug)]
pub struct RenderLine {
    pub l: VertId,
    pub r: VertId,
    pub tl: Option<TriId>,
    pub tr: Option<TriId>,
    pub flags: EdgeFlags,
    pub object: Option<ObjectId>,
    pub segments: Vec<LineSegment>,
    pub min_occ: u32,
    /// Whether the owning object contributes candidate lines at all
    /// (false for occlusion-only objects).
    pub candidate: bool,
    /// Detached by the near-plane culler; no longer a candidate.
    pub discarded: bool,
}

impl RenderLine {
    pub fn new(l: VertId, r: VertId) -> Self {
        Self {
            l,
            r,
            tl: None,
            tr: None,
            flags: EdgeFlags::default(),
            object: None,
            segments: vec![LineSegment {
                at: 0.0,
                occlusion: 0,
            }],
            min_occ: 0,
            candidate: true,
            discarded: false,
        }
    }

    /// Occlusion intervals as `(from, to, occlusion)` triples.
    pub fn occlusion_ranges(&self) -> impl Iterator<Item = (f64, f64, u32)> + '_ {
        self.segments.iter().enumerate().map(move |(i, seg)| {
            let end = self
                .segments
                .get(i + 1)
                .map(|next| next.at)
                .unwrap_or(1.0);
            (seg.at, end, seg.occlusion)
        })
    }
}

/// One render triangle with its edge references.
///
/// `rl[k]` is the edge between `v[k]` and `v[(k + 1) % 3]`.
#[derive(Clone, Debug)]
pub struct RenderTriangle {
    pub v: [VertId; 3],
    pub rl: [LineId; 3],
    /// World-space unit normal.
    pub gn: Vector3<f64>,
    /// Clip-space centroid.
    pub gc: Vector3<f64>,
    pub material: i32,
    pub cull: CullStatus,
}

impl RenderTriangle {
    pub fn shares_edge(&self, line: LineId) -> bool {
        self.rl[0] == line || self.rl[1] == line || self.rl[2] == line
    }

    /// The edge of this triangle not touching `vert`, if `vert` is a corner.
    pub fn opposite_edge(&self, vert: VertId) -> Option<LineId> {
        if self.v[0] == vert {
            Some(self.rl[1])
        } else if self.v[1] == vert {
            Some(self.rl[2])
        } else if self.v[2] == vert {
            Some(self.rl[0])
        } else {
            None
        }
    }
}

/// Camera snapshot the geometric stages work against.
#[derive(Clone, Debug)]
pub struct CameraState {
    pub view_projection: Matrix4<f64>,
    /// Viewer position in world space.
    pub position: Vector3<f64>,
    /// World-space vector pointing from the scene toward the viewer.
    pub back_vector: Vector3<f64>,
    pub is_perspective: bool,
    pub near: f64,
    pub far: f64,
    pub shift_x: f64,
    pub shift_y: f64,
}

impl CameraState {
    /// Builds the snapshot from the scene's camera or viewport override.
    ///
    /// Errors when the scene has neither: the pass must not start.
    pub fn from_scene(scene: &Scene, width: u32, height: u32) -> Result<Self, String> {
        if let Some(ov) = &scene.viewport_override {
            return Ok(Self::from_override(ov));
        }
        match &scene.camera {
            Some(cam) => Ok(Self::from_camera(cam, width, height)),
            None => Err("no active camera and no viewport override".into()),
        }
    }

    fn from_override(ov: &ViewportOverride) -> Self {
        Self {
            view_projection: ov.view_projection,
            position: ov.position,
            back_vector: ov.back_vector,
            is_perspective: ov.perspective,
            near: ov.near,
            far: ov.far,
            shift_x: 0.0,
            shift_y: 0.0,
        }
    }

    fn from_camera(cam: &Camera, width: u32, height: u32) -> Self {
        let aspect = width.max(1) as f64 / height.max(1) as f64;
        let projection = match cam.projection {
            Projection::Perspective { fov_y } => {
                perspective_matrix(fov_y, aspect, cam.clip_start, cam.clip_end)
            }
            Projection::Orthographic { scale } => {
                let w = scale / 2.0;
                ortho_matrix(-w, w, -w / aspect, w / aspect, cam.clip_start, cam.clip_end)
            }
        };
        let view = cam.matrix.try_inverse().unwrap_or_else(Matrix4::identity);
        Self {
            view_projection: projection * view,
            position: cam.position(),
            back_vector: cam.back_vector(),
            is_perspective: matches!(cam.projection, Projection::Perspective { .. }),
            near: cam.clip_start,
            far: cam.clip_end,
            shift_x: cam.shift_x,
            shift_y: cam.shift_y,
        }
    }

    /// Projects a world point to clip space.
    #[inline]
    pub fn project(&self, gloc: Vector3<f64>) -> Vector4<f64> {
        self.view_projection * Vector4::new(gloc.x, gloc.y, gloc.z, 1.0)
    }
}

fn perspective_matrix(fov_y: f64, aspect: f64, near: f64, far: f64) -> Matrix4<f64> {
    let f = 1.0 / (fov_y / 2.0).tan();
    Matrix4::new(
        f / aspect, 0.0, 0.0, 0.0,
        0.0, f, 0.0, 0.0,
        0.0, 0.0, (far + near) / (near - far), 2.0 * far * near / (near - far),
        0.0, 0.0, -1.0, 0.0,
    )
}

fn ortho_matrix(l: f64, r: f64, b: f64, t: f64, near: f64, far: f64) -> Matrix4<f64> {
    Matrix4::new(
        2.0 / (r - l), 0.0, 0.0, -(r + l) / (r - l),
        0.0, 2.0 / (t - b), 0.0, -(t + b) / (t - b),
        0.0, 0.0, -2.0 / (far - near), -(far + near) / (far - near),
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Aggregate per-pass state: arenas, category lists and counters.
#[derive(Debug, Default)]
pub struct RenderBuffer {
    pub verts: Vec<RenderVert>,
    pub lines: Vec<RenderLine>,
    pub triangles: Vec<RenderTriangle>,
    /// Every non-discarded candidate line, load order.
    pub candidates: Vec<LineId>,
    /// Output category lists; a marked line appears both in its geometric
    /// category and in `edge_marks`.
    pub contours: Vec<LineId>,
    pub creases: Vec<LineId>,
    pub materials: Vec<LineId>,
    pub edge_marks: Vec<LineId>,
    pub intersections: Vec<LineId>,
    /// Disjoint occlusion work lists, indexed by [`LineCategory`] order;
    /// the edge-mark slot only holds lines in no other category.
    pub work_lists: [Vec<LineId>; 5],
    pub intersection_count: usize,
}

impl RenderBuffer {
    pub fn push_vert(&mut self, vert: RenderVert) -> VertId {
        let id = VertId(self.verts.len() as u32);
        self.verts.push(vert);
        id
    }

    pub fn push_line(&mut self, line: RenderLine) -> LineId {
        let id = LineId(self.lines.len() as u32);
        self.lines.push(line);
        id
    }

    pub fn push_triangle(&mut self, tri: RenderTriangle) -> TriId {
        let id = TriId(self.triangles.len() as u32);
        self.triangles.push(tri);
        id
    }

    #[inline]
    pub fn vert(&self, id: VertId) -> &RenderVert {
        &self.verts[id.idx()]
    }

    #[inline]
    pub fn line(&self, id: LineId) -> &RenderLine {
        &self.lines[id.idx()]
    }

    #[inline]
    pub fn tri(&self, id: TriId) -> &RenderTriangle {
        &self.triangles[id.idx()]
    }

    pub fn category_list(&self, category: LineCategory) -> &[LineId] {
        match category {
            LineCategory::Contour => &self.contours,
            LineCategory::Crease => &self.creases,
            LineCategory::Intersection => &self.intersections,
            LineCategory::Material => &self.materials,
            LineCategory::EdgeMark => &self.edge_marks,
        }
    }

    /// Line endpoints as NDC 2-D positions.
    pub fn line_ndc(&self, id: LineId) -> (Vector2<f64>, Vector2<f64>) {
        let line = self.line(id);
        (self.vert(line.l).fb2(), self.vert(line.r).fb2())
    }
}

/// Cuts a line's segment chain so `[begin, end]` gains one occlusion level.
///
/// Boundaries numerically close to existing cut points are reused instead of
/// inserted. Maintains the partition invariant: sorted strictly ascending
/// `at` values in [0, 1], first at 0. Returns the new minimum occlusion.
pub fn cut_segments(segments: &mut Vec<LineSegment>, begin: f64, end: f64) -> u32 {
    let mut begin = if begin.is_nan() { 0.0 } else { begin };
    let mut end = if end.is_nan() { 0.0 } else { end };
    if begin > end {
        std::mem::swap(&mut begin, &mut end);
    }
    begin = begin.clamp(0.0, 1.0);
    end = end.clamp(0.0, 1.0);

    if !close_enough(begin, end) {
        let begin_idx = ensure_boundary(segments, begin);
        let end_idx = if close_enough(end, 1.0) {
            segments.len()
        } else {
            ensure_boundary(segments, end)
        };
        for seg in &mut segments[begin_idx..end_idx] {
            seg.occlusion += 1;
        }
    }

    segments
        .iter()
        .map(|s| s.occlusion)
        .min()
        .unwrap_or(0)
}

/// Index of the segment starting at `at`, inserting a boundary if none is
/// close enough.
fn ensure_boundary(segments: &mut Vec<LineSegment>, at: f64) -> usize {
    for (i, seg) in segments.iter().enumerate() {
        if close_enough(seg.at, at) {
            return i;
        }
        if seg.at > at {
            let occlusion = segments[i - 1].occlusion;
            segments.insert(i, LineSegment { at, occlusion });
            return i;
        }
    }
    let occlusion = segments.last().map(|s| s.occlusion).unwrap_or(0);
    segments.push(LineSegment { at, occlusion });
    segments.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Vec<LineSegment> {
        vec![LineSegment {
            at: 0.0,
            occlusion: 0,
        }]
    }

    fn assert_partition(segments: &[LineSegment]) {
        assert!(!segments.is_empty());
        assert_eq!(segments[0].at, 0.0);
        for pair in segments.windows(2) {
            assert!(pair[0].at < pair[1].at, "segments out of order: {:?}", segments);
        }
        for seg in segments {
            assert!((0.0..=1.0).contains(&seg.at));
        }
    }

    #[test]
    fn single_cut_splits_into_three() {
        let mut segs = fresh();
        let min = cut_segments(&mut segs, 0.25, 0.75);
        assert_partition(&segs);
        assert_eq!(min, 0);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1].occlusion, 1);
        assert_eq!(segs[2].occlusion, 0);
    }

    #[test]
    fn full_cover_raises_min_occlusion() {
        let mut segs = fresh();
        let min = cut_segments(&mut segs, 0.0, 1.0);
        assert_eq!(min, 1);
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn overlapping_cuts_accumulate() {
        let mut segs = fresh();
        cut_segments(&mut segs, 0.0, 0.6);
        let min = cut_segments(&mut segs, 0.4, 1.0);
        assert_partition(&segs);
        assert_eq!(min, 1);
        // [0, 0.4) = 1, [0.4, 0.6) = 2, [0.6, 1] = 1
        assert_eq!(segs.iter().map(|s| s.occlusion).collect::<Vec<_>>(), vec![1, 2, 1]);
    }

    #[test]
    fn reversed_and_nan_inputs_are_absorbed() {
        let mut segs = fresh();
        cut_segments(&mut segs, 0.8, 0.2);
        assert_partition(&segs);
        assert_eq!(segs.len(), 3);

        let mut segs = fresh();
        let min = cut_segments(&mut segs, f64::NAN, f64::NAN);
        assert_eq!(min, 0);
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn close_boundaries_are_reused_not_duplicated() {
        let mut segs = fresh();
        cut_segments(&mut segs, 0.5, 0.9);
        cut_segments(&mut segs, 0.5 + 1e-12, 0.9 - 1e-12);
        assert_partition(&segs);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1].occlusion, 2);
    }

    #[test]
    fn random_cut_sequences_keep_the_partition() {
        // Deterministic pseudo-random cut positions.
        let mut state = 0x9e3779b97f4a7c15u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        let mut segs = fresh();
        for _ in 0..200 {
            let a = next();
            let b = next();
            cut_segments(&mut segs, a, b);
            assert_partition(&segs);
        }
    }
}
