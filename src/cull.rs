//! Near-plane culling and perspective division.
//!
//! Triangles crossing the camera near plane are retriangulated into one or
//! two clipped triangles; fully-behind triangles are discarded together with
//! their edges. Crossing vertices are placed by the camera-direction depth
//! ratio, not naive parametric interpolation, so perspective projection stays
//! correct. Replacement edges inherit the clipped triangle's neighbors and a
//! surviving edge has its triangle reference rewritten, so later stages never
//! follow a stale adjacency link.
use crate::buffer::{CameraState, RenderBuffer, RenderLine, RenderTriangle, RenderVert};
use crate::types::{CullStatus, LineId, TriId, VertId};
use log::debug;
use nalgebra::Vector3;
use rayon::prelude::*;

/// Per-pass cull counters, reported in the pipeline trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct CullStats {
    pub discarded: usize,
    pub clipped: usize,
    pub new_triangles: usize,
}

/// Partitions triangles against the near plane, rebuilding the ones that
/// straddle it.
pub fn cull_triangles(buffer: &mut RenderBuffer, camera: &CameraState) -> CullStats {
    let mut stats = CullStats::default();
    // Near plane passes through the camera position advanced by the clip
    // distance along the view axis.
    let plane_pos = camera.position - camera.back_vector * camera.near;
    let back = camera.back_vector;

    let original_count = buffer.triangles.len();
    for idx in 0..original_count {
        let tri_id = TriId(idx as u32);
        let tri = buffer.tri(tri_id);
        let behind = [
            buffer.vert(tri.v[0]).fbcoord.w < camera.near,
            buffer.vert(tri.v[1]).fbcoord.w < camera.near,
            buffer.vert(tri.v[2]).fbcoord.w < camera.near,
        ];
        match behind.iter().filter(|&&b| b).count() {
            0 => {}
            3 => {
                buffer.triangles[tri_id.idx()].cull = CullStatus::Discarded;
                detach_edges(buffer, tri_id, [true; 3]);
                stats.discarded += 1;
            }
            2 => {
                let survivor = behind.iter().position(|&b| !b).expect("one survivor");
                clip_two_behind(buffer, camera, plane_pos, back, tri_id, survivor);
                stats.clipped += 1;
                stats.new_triangles += 1;
            }
            1 => {
                let lost = behind.iter().position(|&b| b).expect("one behind");
                clip_one_behind(buffer, camera, plane_pos, back, tri_id, lost);
                stats.clipped += 1;
                stats.new_triangles += 2;
            }
            _ => unreachable!(),
        }
    }
    debug!(
        "cull_triangles discarded={} clipped={} new={}",
        stats.discarded, stats.clipped, stats.new_triangles
    );
    stats
}

/// Signed distance of a point to the near plane along the view axis.
#[inline]
fn plane_side(p: Vector3<f64>, plane_pos: Vector3<f64>, back: Vector3<f64>) -> f64 {
    (p - plane_pos).dot(&back)
}

/// New vertex where segment `(a, b)` crosses the near plane.
fn near_crossing(
    buffer: &mut RenderBuffer,
    camera: &CameraState,
    plane_pos: Vector3<f64>,
    back: Vector3<f64>,
    a: VertId,
    b: VertId,
) -> VertId {
    let pa = buffer.vert(a).gloc;
    let pb = buffer.vert(b).gloc;
    let fa = plane_side(pa, plane_pos, back);
    let fb = plane_side(pb, plane_pos, back);
    let denom = fa - fb;
    let ratio = if denom.abs() < f64::EPSILON {
        0.5
    } else {
        fa / denom
    };
    let gloc = pa.lerp(&pb, ratio);
    let fbcoord = camera.project(gloc);
    buffer.push_vert(RenderVert::new(gloc, fbcoord))
}

fn detach_edges(buffer: &mut RenderBuffer, tri_id: TriId, which: [bool; 3]) {
    let rl = buffer.tri(tri_id).rl;
    for (k, line_id) in rl.into_iter().enumerate() {
        if which[k] {
            buffer.lines[line_id.idx()].discarded = true;
        }
    }
}

/// Replaces the neighbor slot pointing at `old` with `new`, leaving the other
/// side untouched.
fn inherit_neighbors(line: &RenderLine, old: TriId, new: TriId) -> (Option<TriId>, Option<TriId>) {
    let map = |t: Option<TriId>| {
        if t == Some(old) {
            Some(new)
        } else {
            t
        }
    };
    (map(line.tl), map(line.tr))
}

/// The neighbor of `old` across `line`, when there is one.
fn other_neighbor(line: &RenderLine, old: TriId) -> Option<TriId> {
    if line.tl == Some(old) {
        line.tr
    } else {
        line.tl
    }
}

fn push_cull_line(buffer: &mut RenderBuffer, mut line: RenderLine, candidate: bool) -> LineId {
    line.candidate = candidate;
    let id = buffer.push_line(line);
    if candidate {
        buffer.candidates.push(id);
    }
    id
}

fn finish_triangle(buffer: &mut RenderBuffer, source: TriId, v: [VertId; 3], rl: [LineId; 3]) -> TriId {
    let src = buffer.tri(source);
    let gn = src.gn;
    let material = src.material;
    let gc = (buffer.vert(v[0]).fbcoord.xyz()
        + buffer.vert(v[1]).fbcoord.xyz()
        + buffer.vert(v[2]).fbcoord.xyz())
        / 3.0;
    buffer.push_triangle(RenderTriangle {
        v,
        rl,
        gn,
        gc,
        material,
        cull: CullStatus::Keep,
    })
}

/// Two vertices behind: one clipped triangle replaces the original.
fn clip_two_behind(
    buffer: &mut RenderBuffer,
    camera: &CameraState,
    plane_pos: Vector3<f64>,
    back: Vector3<f64>,
    tri_id: TriId,
    s_idx: usize,
) {
    buffer.triangles[tri_id.idx()].cull = CullStatus::Replaced;
    let tri = buffer.tri(tri_id).clone();
    let s = tri.v[s_idx];
    let p = tri.v[(s_idx + 1) % 3];
    let q = tri.v[(s_idx + 2) % 3];
    let edge_sp = tri.rl[s_idx];
    let edge_qs = tri.rl[(s_idx + 2) % 3];
    let candidate = buffer.line(edge_sp).candidate;
    detach_edges(buffer, tri_id, [true; 3]);

    let rv1 = near_crossing(buffer, camera, plane_pos, back, s, p);
    let rv0 = near_crossing(buffer, camera, plane_pos, back, s, q);

    let new_tri = TriId(buffer.triangles.len() as u32);
    let object = buffer.line(tri.rl[0]).object;

    // Boundary segment of the old s-p edge.
    let (tl_b, tr_b) = inherit_neighbors(buffer.line(edge_sp), tri_id, new_tri);
    let mut line_b = RenderLine::new(s, rv1);
    line_b.tl = tl_b;
    line_b.tr = tr_b;
    line_b.object = object;
    let line_b = push_cull_line(buffer, line_b, candidate);

    // Clip edge along the near plane.
    let mut line_a = RenderLine::new(rv1, rv0);
    line_a.tl = Some(new_tri);
    line_a.object = object;
    let line_a = push_cull_line(buffer, line_a, candidate);

    // Boundary segment of the old q-s edge.
    let (tl_c, tr_c) = inherit_neighbors(buffer.line(edge_qs), tri_id, new_tri);
    let mut line_c = RenderLine::new(rv0, s);
    line_c.tl = tl_c;
    line_c.tr = tr_c;
    line_c.object = object;
    let line_c = push_cull_line(buffer, line_c, candidate);

    let created = finish_triangle(buffer, tri_id, [s, rv1, rv0], [line_b, line_a, line_c]);
    debug_assert_eq!(created, new_tri);
}

/// One vertex behind: two clipped triangles replace the original.
fn clip_one_behind(
    buffer: &mut RenderBuffer,
    camera: &CameraState,
    plane_pos: Vector3<f64>,
    back: Vector3<f64>,
    tri_id: TriId,
    b_idx: usize,
) {
    buffer.triangles[tri_id.idx()].cull = CullStatus::Replaced;
    let tri = buffer.tri(tri_id).clone();
    let b = tri.v[b_idx];
    let p = tri.v[(b_idx + 1) % 3];
    let q = tri.v[(b_idx + 2) % 3];
    let edge_bp = tri.rl[b_idx];
    let edge_pq = tri.rl[(b_idx + 1) % 3];
    let edge_qb = tri.rl[(b_idx + 2) % 3];
    let candidate = buffer.line(edge_bp).candidate;
    // The two crossing edges are gone; the p-q edge survives.
    buffer.lines[edge_bp.idx()].discarded = true;
    buffer.lines[edge_qb.idx()].discarded = true;

    let rv0 = near_crossing(buffer, camera, plane_pos, back, b, p);
    let rv1 = near_crossing(buffer, camera, plane_pos, back, b, q);

    let t1 = TriId(buffer.triangles.len() as u32);
    let t2 = TriId(buffer.triangles.len() as u32 + 1);
    let object = buffer.line(tri.rl[0]).object;

    // Internal edge shared by the two replacements.
    let mut line_c = RenderLine::new(p, rv1);
    line_c.tl = Some(t1);
    line_c.tr = Some(t2);
    line_c.object = object;
    let line_c = push_cull_line(buffer, line_c, candidate);

    // Clip edge along the near plane.
    let mut line_a = RenderLine::new(rv1, rv0);
    line_a.tl = Some(t1);
    line_a.object = object;
    let line_a = push_cull_line(buffer, line_a, candidate);

    // Boundary segment of the old b-p edge.
    let mut line_b = RenderLine::new(rv0, p);
    line_b.tl = Some(t1);
    line_b.tr = other_neighbor(buffer.line(edge_bp), tri_id);
    line_b.object = object;
    let line_b = push_cull_line(buffer, line_b, candidate);

    // Boundary segment of the old q-b edge.
    let mut line_d = RenderLine::new(q, rv1);
    line_d.tl = Some(t2);
    line_d.tr = other_neighbor(buffer.line(edge_qb), tri_id);
    line_d.object = object;
    let line_d = push_cull_line(buffer, line_d, candidate);

    // The surviving p-q edge now belongs to the second replacement.
    {
        let line = &mut buffer.lines[edge_pq.idx()];
        if line.tl == Some(tri_id) {
            line.tl = Some(t2);
        }
        if line.tr == Some(tri_id) {
            line.tr = Some(t2);
        }
    }

    let created1 = finish_triangle(buffer, tri_id, [p, rv1, rv0], [line_c, line_a, line_b]);
    let created2 = finish_triangle(buffer, tri_id, [rv1, p, q], [line_c, edge_pq, line_d]);
    debug_assert_eq!(created1, t1);
    debug_assert_eq!(created2, t2);
}

/// Normalizes clip coordinates to NDC and applies the sensor shift.
///
/// Skipped entirely for orthographic cameras, whose clip w is already 1.
pub fn perspective_division(buffer: &mut RenderBuffer, camera: &CameraState) {
    if !camera.is_perspective {
        return;
    }
    let shift_x = camera.shift_x * 2.0;
    let shift_y = camera.shift_y * 2.0;
    buffer.verts.par_iter_mut().for_each(|vert| {
        let w = vert.fbcoord.w;
        if w != 0.0 {
            vert.fbcoord.x /= w;
            vert.fbcoord.y /= w;
            vert.fbcoord.z /= w;
        }
        vert.fbcoord.x -= shift_x;
        vert.fbcoord.y -= shift_y;
    });
}
