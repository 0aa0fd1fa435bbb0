//! Triangle insertion and mesh-mesh intersection lines.
//!
//! Triangles enter the tile grid one by one; whenever one lands in a leaf
//! cell it is tested against the triangles already resident there. Surviving
//! pairs (no shared edge, overlapping screen/depth bounds) produce an
//! intersection segment: the points where one triangle's edges pierce the
//! other's plane, confined to both triangles. The segment becomes a regular
//! render line of the intersection category, registered into the grid like
//! any classified line.
//!
//! A per-triangle pairwise marker keeps a pair from being tested once per
//! shared leaf, and plane crossings are cached per (triangle, edge) so a
//! mesh edge shared by two faces is solved once.
use crate::buffer::{CameraState, RenderBuffer, RenderLine, RenderVert};
use crate::math::{close_enough, point_inside_triangle_3d};
use crate::tiles::TileGrid;
use crate::types::{AreaId, EdgeFlags, LineId, TriId, VertId};
use crate::types::CullStatus;
use log::debug;
use nalgebra::Vector4;
use std::collections::HashMap;

/// Per-pass intersection counters, reported in the pipeline trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntersectionStats {
    pub triangles_linked: usize,
    pub lines_created: usize,
}

/// Inserts every kept triangle into the grid, producing intersection lines
/// along the way when enabled.
pub fn add_triangles(
    buffer: &mut RenderBuffer,
    grid: &mut TileGrid,
    camera: &CameraState,
    use_intersections: bool,
) -> IntersectionStats {
    let mut stats = IntersectionStats::default();
    let mut finder = IntersectionFinder::new(buffer.triangles.len());
    let mut leaves: Vec<AreaId> = Vec::new();

    for idx in 0..buffer.triangles.len() {
        let tri_id = TriId(idx as u32);
        if buffer.tri(tri_id).cull != CullStatus::Keep {
            continue;
        }
        leaves.clear();
        let on_screen = grid.link_triangle(
            &buffer.verts,
            &buffer.lines,
            &buffer.triangles,
            tri_id,
            true,
            Some(&mut leaves),
        );
        if !on_screen {
            continue;
        }
        stats.triangles_linked += 1;
        if use_intersections {
            for &leaf in &leaves {
                stats.lines_created +=
                    finder.intersect_in_area(buffer, grid, camera, tri_id, leaf);
            }
        }
    }
    buffer.intersection_count = stats.lines_created;
    debug!(
        "add_triangles linked={} intersections={}",
        stats.triangles_linked, stats.lines_created
    );
    stats
}

struct IntersectionFinder {
    /// Per-triangle marker: the initiator it was last tested against.
    tested: Vec<Option<TriId>>,
    /// Plane-crossing cache keyed by (plane triangle, edge line).
    crossings: HashMap<(u32, u32), Option<VertId>>,
}

impl IntersectionFinder {
    fn new(triangle_count: usize) -> Self {
        Self {
            tested: vec![None; triangle_count],
            crossings: HashMap::new(),
        }
    }

    /// Tests `tri` against every triangle resident under `area`.
    ///
    /// Returns the number of intersection lines created.
    fn intersect_in_area(
        &mut self,
        buffer: &mut RenderBuffer,
        grid: &mut TileGrid,
        camera: &CameraState,
        tri: TriId,
        area: AreaId,
    ) -> usize {
        let mut partners: Vec<TriId> = Vec::new();
        grid.for_each_resident_triangle(area, &mut |id| partners.push(id));

        let mut created = 0usize;
        for partner in partners {
            if partner == tri || self.tested[partner.idx()] == Some(tri) {
                continue;
            }
            self.tested[partner.idx()] = Some(tri);
            if shares_edge(buffer, tri, partner) {
                continue;
            }
            if !depth_bounds_overlap(buffer, tri, partner) {
                continue;
            }
            if let Some(line) = self.generate_intersection_line(buffer, camera, tri, partner) {
                let (l2, r2) = buffer.line_ndc(line);
                grid.register_line(line, l2, r2);
                created += 1;
            }
        }
        created
    }

    /// Crossing of `edge` with `plane_tri`'s plane, confined to the triangle.
    ///
    /// `last` suppresses a crossing numerically identical to an already found
    /// endpoint (the shared-vertex grazing case).
    fn edge_plane_crossing(
        &mut self,
        buffer: &mut RenderBuffer,
        edge: LineId,
        plane_tri: TriId,
        last: Option<VertId>,
    ) -> Option<VertId> {
        let key = (plane_tri.0, edge.0);
        if let Some(&cached) = self.crossings.get(&key) {
            return cached;
        }

        let plane = buffer.tri(plane_tri);
        let p0 = buffer.vert(plane.v[0]).gloc;
        let p1 = buffer.vert(plane.v[1]).gloc;
        let p2 = buffer.vert(plane.v[2]).gloc;
        let gn = plane.gn;

        let line = buffer.line(edge);
        let lg = buffer.vert(line.l).gloc;
        let rg = buffer.vert(line.r).gloc;
        let dot_l = (lg - p0).dot(&gn);
        let dot_r = (rg - p0).dot(&gn);

        if dot_l * dot_r > 0.0 || (dot_l == 0.0 && dot_r == 0.0) {
            self.crossings.insert(key, None);
            return None;
        }

        let la = dot_l.abs();
        let ra = dot_r.abs();
        let gloc = lg.lerp(&rg, la / (la + ra));

        if let Some(prev) = last {
            let pg = buffer.vert(prev).gloc;
            if close_enough(pg.x, gloc.x)
                && close_enough(pg.y, gloc.y)
                && close_enough(pg.z, gloc.z)
            {
                // Same point as the other endpoint; pair-specific, not cached.
                return None;
            }
        }

        if !point_inside_triangle_3d(gloc, p0, p1, p2) {
            self.crossings.insert(key, None);
            return None;
        }

        let vert = buffer.push_vert(RenderVert::new(gloc, Vector4::zeros()));
        self.crossings.insert(key, Some(vert));
        Some(vert)
    }

    /// Materializes the intersection line between two triangles, if any.
    fn generate_intersection_line(
        &mut self,
        buffer: &mut RenderBuffer,
        camera: &CameraState,
        tri: TriId,
        testing: TriId,
    ) -> Option<LineId> {
        let (l_vert, r_vert) = if let Some(share) = shared_vertex(buffer, tri, testing) {
            // One endpoint is pinned to the shared corner; the other comes
            // from the opposite edge of either triangle.
            let share_gloc = buffer.vert(share).gloc;
            let opposite = buffer.tri(tri).opposite_edge(share)?;
            let r = match self.edge_plane_crossing(buffer, opposite, testing, None) {
                Some(r) => r,
                None => {
                    let opposite = buffer.tri(testing).opposite_edge(share)?;
                    self.edge_plane_crossing(buffer, opposite, tri, None)?
                }
            };
            let l = buffer.push_vert(RenderVert::new(share_gloc, Vector4::zeros()));
            (l, r)
        } else {
            let tri_edges = buffer.tri(tri).rl;
            let testing_edges = buffer.tri(testing).rl;
            let attempts = [
                (tri_edges[0], testing),
                (tri_edges[1], testing),
                (tri_edges[2], testing),
                (testing_edges[0], tri),
                (testing_edges[1], tri),
                (testing_edges[2], tri),
            ];
            let mut first: Option<VertId> = None;
            let mut second: Option<VertId> = None;
            for (edge, plane) in attempts {
                if second.is_some() {
                    break;
                }
                if let Some(v) = self.edge_plane_crossing(buffer, edge, plane, first) {
                    if first.is_none() {
                        first = Some(v);
                    } else {
                        second = Some(v);
                    }
                }
            }
            (first?, second?)
        };

        for (vert, source) in [(l_vert, tri), (r_vert, testing)] {
            project_intersection_vert(buffer, camera, vert);
            buffer.verts[vert.idx()].intersecting_with = Some(source);
        }

        let mut line = RenderLine::new(l_vert, r_vert);
        line.tl = Some(tri);
        line.tr = Some(testing);
        line.flags.insert(EdgeFlags::INTERSECTION);
        let id = buffer.push_line(line);
        buffer.candidates.push(id);
        buffer.intersections.push(id);
        buffer.work_lists[2].push(id);
        Some(id)
    }
}

/// Projects an intersection vertex to NDC, remapping depth into the
/// near/far range the occlusion tests expect.
fn project_intersection_vert(buffer: &mut RenderBuffer, camera: &CameraState, vert: VertId) {
    let gloc = buffer.vert(vert).gloc;
    let mut fb = camera.project(gloc);
    if fb.w != 0.0 {
        fb.x /= fb.w;
        fb.y /= fb.w;
        fb.z /= fb.w;
    }
    fb.x -= camera.shift_x * 2.0;
    fb.y -= camera.shift_y * 2.0;
    let near = camera.near;
    let far = camera.far;
    fb.z = near * far / (far - fb.z.abs() * (far - near));
    buffer.verts[vert.idx()].fbcoord = fb;
}

fn shares_edge(buffer: &RenderBuffer, a: TriId, b: TriId) -> bool {
    let ta = buffer.tri(a);
    let tb = buffer.tri(b);
    ta.rl.iter().any(|e| tb.rl.contains(e))
}

fn shared_vertex(buffer: &RenderBuffer, a: TriId, b: TriId) -> Option<VertId> {
    let ta = buffer.tri(a);
    let tb = buffer.tri(b);
    ta.v.iter().copied().find(|v| tb.v.contains(v))
}

/// Screen-space and depth bbox reject between two triangles.
fn depth_bounds_overlap(buffer: &RenderBuffer, a: TriId, b: TriId) -> bool {
    let bounds = |id: TriId| {
        let t = buffer.tri(id);
        let p: Vec<_> = t.v.iter().map(|&v| buffer.vert(v).fbcoord).collect();
        let min = |axis: fn(&Vector4<f64>) -> f64| {
            p.iter().map(axis).fold(f64::INFINITY, f64::min)
        };
        let max = |axis: fn(&Vector4<f64>) -> f64| {
            p.iter().map(axis).fold(f64::NEG_INFINITY, f64::max)
        };
        (
            min(|v| v.x),
            max(|v| v.x),
            min(|v| v.y),
            max(|v| v.y),
            min(|v| v.z),
            max(|v| v.z),
        )
    };
    let (ax0, ax1, ay0, ay1, az0, az1) = bounds(a);
    let (bx0, bx1, by0, by1, bz0, bz1) = bounds(b);
    !(az0 > bz1
        || az1 < bz0
        || ax0 > bx1
        || ax1 < bx0
        || ay0 > by1
        || ay1 < by0)
}
