//! Occlusion resolution: cutting feature lines against the triangles that
//! hide them.
//!
//! Each line starts as a single visible segment spanning [0, 1]. The resolver
//! walks the tile grid along the line's screen direction and tests the line
//! against every triangle linked to each visited cell; a hit cuts the
//! parametric range it covers, incrementing the occlusion count of everything
//! strictly inside. A line whose minimum occlusion passes the requested
//! maximum level stops early.
//!
//! Work is drained in fixed-size chunks per category from a shared cursor
//! under one lock; the cancellation flag lives behind a separate lock and is
//! polled between categories. Workers accumulate their results privately and
//! merge after the join, so no line state is shared while computing.
use crate::buffer::{cut_segments, CameraState, LineSegment, RenderBuffer};
use crate::math::{
    line_segment_cross_2d, linear_ratio, point_triangle_relation, sort3_indices, PointTriangle,
    TRI_EPS,
};
use crate::tiles::TileGrid;
use crate::types::{LineId, StatusHandle, TriId};
use log::debug;
use std::ops::Range;
use std::sync::Mutex;

/// Per-pass occlusion counters, reported in the pipeline trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct OcclusionStats {
    pub lines_processed: usize,
    pub threads: usize,
    pub canceled: bool,
}

/// Screen-space visibility range `[from, to]` of `line` hidden by `tri`.
///
/// Combines a 2-D bbox reject, an edge-sharing reject, signed plane-distance
/// tests of both endpoints, the parametric plane crossing re-projected to
/// screen space, and an endpoint inside/on-edge/outside classification
/// driving the final combinatorial range selection.
pub fn triangle_line_occlusion(
    buffer: &RenderBuffer,
    camera: &CameraState,
    tri_id: TriId,
    line_id: LineId,
) -> Option<(f64, f64)> {
    let tri = buffer.tri(tri_id);
    let line = buffer.line(line_id);
    let lv = buffer.vert(line.l);
    let rv = buffer.vert(line.r);
    let lfbc = lv.fb2();
    let rfbc = rv.fb2();
    let fbc0 = buffer.vert(tri.v[0]).fb2();
    let fbc1 = buffer.vert(tri.v[1]).fb2();
    let fbc2 = buffer.vert(tri.v[2]).fb2();

    if fbc0.x.max(fbc1.x).max(fbc2.x) < lfbc.x.min(rfbc.x)
        || fbc0.x.min(fbc1.x).min(fbc2.x) > lfbc.x.max(rfbc.x)
        || fbc0.y.max(fbc1.y).max(fbc2.y) < lfbc.y.min(rfbc.y)
        || fbc0.y.min(fbc1.y).min(fbc2.y) > lfbc.y.max(rfbc.y)
    {
        return None;
    }

    if tri.shares_edge(line_id) {
        return None;
    }

    // Crossing ratios of the line against the triangle's three edges.
    let (hit_a, is_a) = line_segment_cross_2d(lfbc, rfbc, fbc0, fbc1);
    let (hit_b, is_b) = line_segment_cross_2d(lfbc, rfbc, fbc1, fbc2);
    let (hit_c, is_c) = line_segment_cross_2d(lfbc, rfbc, fbc2, fbc0);
    let is = [is_a, is_b, is_c];
    let hit = [hit_a, hit_b, hit_c];
    let order = sort3_indices(is);

    let v0 = buffer.vert(tri.v[0]).gloc;
    let lv3 = lv.gloc - v0;
    let rv3 = rv.gloc - v0;
    let cv = if camera.is_perspective {
        camera.position - v0
    } else {
        camera.back_vector
    };

    let mut dot_l = lv3.dot(&tri.gn);
    let mut dot_r = rv3.dot(&tri.gn);
    let dot_f = cv.dot(&tri.gn);
    if dot_f == 0.0 {
        return None;
    }

    if !hit_a && !hit_b && !hit_c {
        let l_rel = point_triangle_relation(lfbc, fbc0, fbc1, fbc2);
        let r_rel = point_triangle_relation(rfbc, fbc0, fbc1, fbc2);
        if l_rel == PointTriangle::Outside && r_rel == PointTriangle::Outside {
            return None;
        }
    }
    let st_l = point_triangle_relation(lfbc, fbc0, fbc1, fbc2);
    let st_r = point_triangle_relation(rfbc, fbc0, fbc1, fbc2);

    let mut dot_la = dot_l.abs();
    if dot_la < f64::EPSILON {
        dot_la = 0.0;
        dot_l = 0.0;
    }
    let mut dot_ra = dot_r.abs();
    if dot_ra < f64::EPSILON {
        dot_ra = 0.0;
        dot_r = 0.0;
    }

    // Parametric position where the line crosses the triangle's plane.
    let mut cut = if dot_l - dot_r == 0.0 {
        100000.0
    } else if dot_l * dot_r <= 0.0 {
        dot_la / (dot_l - dot_r).abs()
    } else {
        let c = (dot_r + dot_l).abs() / (dot_l - dot_r).abs();
        if dot_ra > dot_la {
            1.0 - c
        } else {
            c
        }
    };

    // Re-derive the cut in screen space; under perspective the world-space
    // midpoint does not project to the parametric midpoint.
    let trans = if camera.is_perspective {
        let gloc = lv.gloc.lerp(&rv.gloc, cut);
        let mut t = camera.project(gloc);
        if t.w != 0.0 {
            t.x /= t.w;
            t.y /= t.w;
        }
        t.x -= camera.shift_x * 2.0;
        t.y -= camera.shift_y * 2.0;
        t.xy()
    } else {
        lfbc.lerp(&rfbc, cut)
    };
    cut = if lfbc.x != rfbc.x {
        linear_ratio(lfbc.x, rfbc.x, trans.x)
    } else {
        linear_ratio(lfbc.y, rfbc.y, trans.y)
    };

    // Index of the ordered crossing just below / above `num`.
    let just_smaller = |num: f64| -> usize {
        if num > is[order[2]] {
            order[2]
        } else if num > is[order[1]] {
            order[1]
        } else {
            order[0]
        }
    };
    let just_greater = |num: f64| -> usize {
        if num < is[order[0]] {
            order[0]
        } else if num < is[order[1]] {
            order[1]
        } else {
            order[2]
        }
    };

    let lim = TRI_EPS;
    let mut lcross;
    let mut rcross;
    match (st_l, st_r) {
        (PointTriangle::Inside | PointTriangle::OnEdge, PointTriangle::Inside)
        | (PointTriangle::Inside, PointTriangle::OnEdge) => {
            lcross = just_smaller(lim);
            rcross = just_greater(1.0 - lim);
        }
        (PointTriangle::OnEdge, PointTriangle::OnEdge) => {
            lcross = just_smaller(lim);
            rcross = just_greater(1.0 - lim);
        }
        (PointTriangle::Inside, PointTriangle::Outside) => {
            lcross = just_smaller(lim);
            rcross = just_greater(0.0);
        }
        (PointTriangle::OnEdge, PointTriangle::Outside) => {
            rcross = just_greater(lim);
            if hit[rcross] && is[rcross] > lim {
                lcross = just_smaller(lim);
            } else {
                lcross = just_smaller(-lim);
                rcross = just_greater(-lim);
            }
        }
        (PointTriangle::Outside, PointTriangle::Inside) => {
            lcross = just_smaller(1.0 - lim);
            rcross = just_greater(1.0 - lim);
        }
        (PointTriangle::Outside, PointTriangle::OnEdge) => {
            lcross = just_smaller(1.0 - lim);
            if hit[lcross] && is[lcross] < 1.0 - lim {
                rcross = just_greater(1.0 - lim);
            } else {
                lcross = just_smaller(1.0 + lim);
                rcross = just_greater(1.0 + lim);
            }
        }
        (PointTriangle::Outside, PointTriangle::Outside) => {
            lcross = just_greater(0.0);
            if hit[lcross] && is[lcross] > 0.0 {
                rcross = just_greater(is[lcross]);
            } else {
                let anchor = is[lcross];
                lcross = just_greater(anchor);
                rcross = just_greater(is[lcross]);
            }
        }
    }

    let lf = dot_l * dot_f;
    let rf = dot_r * dot_f;
    let has_depth = dot_l != 0.0 || dot_r != 0.0;

    if lf <= 0.0 && rf <= 0.0 && has_depth {
        let from = is[lcross].max(0.0);
        let to = is[rcross].min(1.0);
        (from < to).then_some((from, to))
    } else if lf >= 0.0 && rf <= 0.0 && has_depth {
        let from = is[lcross].max(cut);
        let to = is[rcross].min(1.0);
        (from < to).then_some((from, to))
    } else if lf <= 0.0 && rf >= 0.0 && has_depth {
        let from = is[lcross].max(0.0);
        let to = is[rcross].min(cut);
        (from < to).then_some((from, to))
    } else {
        None
    }
}

/// Resolves one line completely, returning its final segment chain.
///
/// `scratch` maps triangle index to the last line id tested against it, so a
/// triangle straddling several visited cells is tested once.
pub fn resolve_line(
    buffer: &RenderBuffer,
    grid: &TileGrid,
    camera: &CameraState,
    line_id: LineId,
    max_occlusion: u32,
    scratch: &mut [u32],
) -> (Vec<LineSegment>, u32) {
    let line = buffer.line(line_id);
    let (l2, r2) = buffer.line_ndc(line_id);
    let mut segments = vec![LineSegment {
        at: 0.0,
        occlusion: 0,
    }];
    let mut min_occ = 0u32;

    let dx = r2.x - l2.x;
    let dy = r2.y - l2.y;
    let k = dy / (dx + 1e-30);
    let px = if dx > 0.0 {
        1
    } else if dx == 0.0 {
        0
    } else {
        -1
    };
    let py = if dy > 0.0 {
        1
    } else if dy == 0.0 {
        0
    } else {
        -1
    };

    let mut x = l2.x;
    let mut y = l2.y;
    let mut area = Some(grid.first_area_of_line(l2, r2));

    while let Some(current) = area {
        for &tri_id in &grid.area(current).triangles {
            if scratch[tri_id.idx()] == line_id.0 {
                continue;
            }
            if buffer.vert(line.l).intersecting_with == Some(tri_id)
                || buffer.vert(line.r).intersecting_with == Some(tri_id)
            {
                continue;
            }
            scratch[tri_id.idx()] = line_id.0;
            if let Some((from, to)) = triangle_line_occlusion(buffer, camera, tri_id, line_id) {
                min_occ = cut_segments(&mut segments, from, to);
                if min_occ > max_occlusion {
                    return (segments, min_occ);
                }
            }
        }
        area = grid
            .next_area_along_line(current, l2, r2, x, y, k, px, py)
            .map(|(next, nx, ny)| {
                x = nx;
                y = ny;
                next
            });
    }
    (segments, min_occ)
}

type LineResult = (LineId, Vec<LineSegment>, u32);

/// One chunk of work: a range into each category's work list.
fn next_chunk(
    cursor: &Mutex<[usize; 5]>,
    lists: &[&[LineId]; 5],
    batch: usize,
) -> Option<[Range<usize>; 5]> {
    let mut cur = cursor.lock().unwrap_or_else(|e| e.into_inner());
    let mut any = false;
    let mut out: [Range<usize>; 5] = [0..0, 0..0, 0..0, 0..0, 0..0];
    for i in 0..5 {
        let start = cur[i];
        let end = (start + batch).min(lists[i].len());
        out[i] = start..end;
        if end > start {
            any = true;
        }
        cur[i] = end;
    }
    any.then_some(out)
}

/// Runs the occlusion stage over all work lists with a worker pool.
pub fn resolve_occlusion(
    buffer: &mut RenderBuffer,
    grid: &TileGrid,
    camera: &CameraState,
    max_occlusion: u32,
    thread_count: usize,
    batch_size: usize,
    status: &StatusHandle,
) -> OcclusionStats {
    let threads = if thread_count == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        thread_count
    };
    let batch = batch_size.max(1);
    let lists: [&[LineId]; 5] = [
        &buffer.work_lists[0],
        &buffer.work_lists[1],
        &buffer.work_lists[2],
        &buffer.work_lists[3],
        &buffer.work_lists[4],
    ];
    let total: usize = lists.iter().map(|l| l.len()).sum();
    let cursor = Mutex::new([0usize; 5]);
    let results: Mutex<Vec<LineResult>> = Mutex::new(Vec::with_capacity(total));

    let shared = &*buffer;
    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                let mut scratch = vec![u32::MAX; shared.triangles.len()];
                let mut local: Vec<LineResult> = Vec::new();
                'work: while let Some(chunk) = next_chunk(&cursor, &lists, batch) {
                    for (category, range) in chunk.into_iter().enumerate() {
                        for &line_id in &lists[category][range] {
                            let (segments, min_occ) = resolve_line(
                                shared,
                                grid,
                                camera,
                                line_id,
                                max_occlusion,
                                &mut scratch,
                            );
                            local.push((line_id, segments, min_occ));
                        }
                        if status.is_canceled() {
                            break 'work;
                        }
                    }
                }
                if let Ok(mut merged) = results.lock() {
                    merged.extend(local);
                }
            });
        }
    });

    let merged = results.into_inner().unwrap_or_else(|e| e.into_inner());
    let processed = merged.len();
    for (line_id, segments, min_occ) in merged {
        let line = &mut buffer.lines[line_id.idx()];
        line.segments = segments;
        line.min_occ = min_occ;
    }

    let canceled = status.is_canceled();
    debug!(
        "resolve_occlusion processed={}/{} threads={} canceled={}",
        processed, total, threads, canceled
    );
    OcclusionStats {
        lines_processed: processed,
        threads,
        canceled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{RenderLine, RenderTriangle, RenderVert};
    use crate::types::{CullStatus, RenderStatus};
    use nalgebra::{Matrix4, Vector3, Vector4};

    fn ortho_camera() -> CameraState {
        CameraState {
            view_projection: Matrix4::identity(),
            position: Vector3::new(0.0, 0.0, 10.0),
            back_vector: Vector3::z(),
            is_perspective: false,
            near: 0.1,
            far: 100.0,
            shift_x: 0.0,
            shift_y: 0.0,
        }
    }

    /// Buffer with one big triangle at z=0 and one test line at `line_z`.
    fn fixture(line_z: f64) -> (RenderBuffer, TriId, LineId) {
        let mut buffer = RenderBuffer::default();
        let vert = |x: f64, y: f64, z: f64| {
            RenderVert::new(Vector3::new(x, y, z), Vector4::new(x, y, z, 1.0))
        };
        let v0 = buffer.push_vert(vert(-2.0, -2.0, 0.0));
        let v1 = buffer.push_vert(vert(2.0, -2.0, 0.0));
        let v2 = buffer.push_vert(vert(0.0, 3.0, 0.0));
        let e0 = buffer.push_line(RenderLine::new(v0, v1));
        let e1 = buffer.push_line(RenderLine::new(v1, v2));
        let e2 = buffer.push_line(RenderLine::new(v2, v0));
        let tri = buffer.push_triangle(RenderTriangle {
            v: [v0, v1, v2],
            rl: [e0, e1, e2],
            gn: Vector3::z(),
            gc: Vector3::zeros(),
            material: 0,
            cull: CullStatus::Keep,
        });

        let l = buffer.push_vert(vert(-0.2, 0.0, line_z));
        let r = buffer.push_vert(vert(0.2, 0.0, line_z));
        let line = buffer.push_line(RenderLine::new(l, r));
        (buffer, tri, line)
    }

    #[test]
    fn line_behind_triangle_is_fully_occluded() {
        let (buffer, tri, line) = fixture(-1.0);
        let camera = ortho_camera();
        let range = triangle_line_occlusion(&buffer, &camera, tri, line);
        let (from, to) = range.expect("expected an occluded range");
        assert!(from <= 1e-9, "from={}", from);
        assert!((to - 1.0).abs() <= 1e-9, "to={}", to);
    }

    #[test]
    fn line_in_front_of_triangle_is_not_occluded() {
        let (buffer, tri, line) = fixture(1.0);
        let camera = ortho_camera();
        assert!(triangle_line_occlusion(&buffer, &camera, tri, line).is_none());
    }

    #[test]
    fn triangle_never_occludes_its_own_edges() {
        let (buffer, tri, _) = fixture(-1.0);
        let camera = ortho_camera();
        let own_edge = buffer.tri(tri).rl[0];
        assert!(triangle_line_occlusion(&buffer, &camera, tri, own_edge).is_none());
    }

    #[test]
    fn resolve_line_cuts_and_reports_min_occlusion() {
        let (buffer, tri, line) = fixture(-1.0);
        let camera = ortho_camera();
        let mut grid = TileGrid::new();
        grid.link_triangle(
            &buffer.verts,
            &buffer.lines,
            &buffer.triangles,
            tri,
            true,
            None,
        );
        let mut scratch = vec![u32::MAX; buffer.triangles.len()];
        let (segments, min_occ) =
            resolve_line(&buffer, &grid, &camera, line, 10, &mut scratch);
        assert_eq!(min_occ, 1, "segments: {:?}", segments);
        assert!(segments.iter().all(|s| s.occlusion == 1));
    }

    #[test]
    fn canceled_pass_stops_after_the_current_category() {
        let mut buffer = RenderBuffer::default();
        let vert = |x: f64, y: f64| {
            RenderVert::new(Vector3::new(x, y, 0.0), Vector4::new(x, y, 0.0, 1.0))
        };
        for i in 0..5 {
            let off = i as f64 * 0.1;
            let l = buffer.push_vert(vert(-0.5 + off, 0.0));
            let r = buffer.push_vert(vert(0.5 + off, 0.0));
            buffer.push_line(RenderLine::new(l, r));
        }
        // Three contours, two creases.
        buffer.work_lists[0] = vec![LineId(0), LineId(1), LineId(2)];
        buffer.work_lists[1] = vec![LineId(3), LineId(4)];

        let grid = TileGrid::new();
        let camera = ortho_camera();
        let status = StatusHandle::new();
        status.cancel();

        let stats = resolve_occlusion(&mut buffer, &grid, &camera, 0, 1, 16, &status);
        assert!(stats.canceled);
        assert_eq!(
            stats.lines_processed, 3,
            "only the first category should run after a cancel"
        );
        assert_eq!(status.get(), RenderStatus::Canceled);
    }
}
