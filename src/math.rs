//! Geometric predicates shared by the culling, intersection and occlusion
//! stages.
//!
//! Everything here works on plain `f64` coordinates and reports degenerate
//! configurations through its return value; the predicates never panic.
//! Epsilon choices follow the screen-space scale of NDC coordinates: `SEG_EPS`
//! merges parametric cut points along a line, `TRI_EPS` fudges the
//! point-versus-triangle tests for endpoints grazing an edge.
use nalgebra::{Vector2, Vector3};

/// Tolerance for merging parametric positions along a line.
pub const SEG_EPS: f64 = 1e-9;

/// Tolerance for endpoint-versus-triangle-edge classification.
pub const TRI_EPS: f64 = 1e-8;

/// True when `a` and `b` are within [`SEG_EPS`].
#[inline]
pub fn close_enough(a: f64, b: f64) -> bool {
    (a - b).abs() < SEG_EPS
}

/// Parametric position of `v` between `l` and `r`.
///
/// Returns 0 when the span is degenerate.
#[inline]
pub fn linear_ratio(l: f64, r: f64, v: f64) -> f64 {
    if r == l {
        0.0
    } else {
        (v - l) / (r - l)
    }
}

/// Where a point sits relative to a 2-D triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointTriangle {
    Outside,
    OnEdge,
    Inside,
}

/// Crossing of segment `(a1, a2)`'s supporting line with segment `(b1, b2)`.
///
/// Returns `(hit, ratio)` where `ratio` is the parametric position of the
/// crossing along `(a1, a2)` (not clamped to [0, 1]) and `hit` reports
/// whether the crossing actually lies within the `(b1, b2)` segment. Parallel
/// configurations return `(false, 0.0)`.
pub fn line_segment_cross_2d(
    a1: Vector2<f64>,
    a2: Vector2<f64>,
    b1: Vector2<f64>,
    b2: Vector2<f64>,
) -> (bool, f64) {
    let ad = a2 - a1;
    let bd = b2 - b1;
    let denom = ad.x * bd.y - ad.y * bd.x;
    if denom.abs() < f64::EPSILON {
        return (false, 0.0);
    }
    let d = b1 - a1;
    let ratio_a = (d.x * bd.y - d.y * bd.x) / denom;
    let ratio_b = (d.x * ad.y - d.y * ad.x) / denom;
    ((0.0..=1.0).contains(&ratio_b), ratio_a)
}

/// Strict 2-D point-in-triangle test; points on an edge count as outside.
pub fn point_inside_triangle_2d(
    v: Vector2<f64>,
    v0: Vector2<f64>,
    v1: Vector2<f64>,
    v2: Vector2<f64>,
) -> bool {
    let side = |a: Vector2<f64>, b: Vector2<f64>| -> f64 {
        (a.x - v.x) * (b.y - v.y) - (a.y - v.y) * (b.x - v.x)
    };
    let c0 = side(v0, v1);
    let c1 = side(v1, v2);
    if c0 * c1 <= 0.0 {
        return false;
    }
    let c2 = side(v2, v0);
    if c1 * c2 <= 0.0 {
        return false;
    }
    c2 * c0 > 0.0
}

/// True when `v` lies on the closed segment `(v0, v1)`.
pub fn point_on_segment_2d(v: Vector2<f64>, v0: Vector2<f64>, v1: Vector2<f64>) -> bool {
    let c1 = linear_ratio(v0.x, v1.x, v.x);
    let c2 = linear_ratio(v0.y, v1.y, v.y);
    // A degenerate axis yields ratio 0; compare against the other axis then.
    let (r, other_on) = if v0.x == v1.x {
        (c2, close_enough(v.x, v0.x))
    } else if v0.y == v1.y {
        (c1, close_enough(v.y, v0.y))
    } else {
        (c1, close_enough(c1, c2))
    };
    other_on && (0.0..=1.0).contains(&r)
}

/// Classifies `v` against the 2-D triangle `(v0, v1, v2)`.
///
/// `OnEdge` wins over the sign tests so endpoints grazing a triangle edge are
/// handled by the dedicated occlusion branches.
pub fn point_triangle_relation(
    v: Vector2<f64>,
    v0: Vector2<f64>,
    v1: Vector2<f64>,
    v2: Vector2<f64>,
) -> PointTriangle {
    if point_on_segment_2d(v, v0, v1)
        || point_on_segment_2d(v, v1, v2)
        || point_on_segment_2d(v, v2, v0)
    {
        return PointTriangle::OnEdge;
    }
    let side = |a: Vector2<f64>, b: Vector2<f64>| -> f64 {
        (a.x - v.x) * (b.y - v.y) - (a.y - v.y) * (b.x - v.x)
    };
    let c0 = side(v0, v1);
    let c1 = side(v1, v2);
    let r1 = c0 * c1;
    if r1 < 0.0 {
        return PointTriangle::Outside;
    }
    let c2 = side(v2, v0);
    let r2 = c1 * c2;
    if r2 < 0.0 {
        return PointTriangle::Outside;
    }
    let r3 = c2 * c0;
    if r3 < 0.0 {
        return PointTriangle::Outside;
    }
    if r3 == 0.0 {
        return PointTriangle::OnEdge;
    }
    PointTriangle::Inside
}

/// 3-D point-in-triangle containment via consistent cross-product directions.
pub fn point_inside_triangle_3d(
    v: Vector3<f64>,
    v0: Vector3<f64>,
    v1: Vector3<f64>,
    v2: Vector3<f64>,
) -> bool {
    let n0 = (v1 - v0).cross(&(v - v1));
    let n1 = (v2 - v1).cross(&(v - v2));
    if n0.dot(&n1) < 0.0 {
        return false;
    }
    let n2 = (v0 - v2).cross(&(v - v0));
    if n1.dot(&n2) < 0.0 {
        return false;
    }
    n2.dot(&n0) >= 0.0
}

/// Orders three values ascending, returning their indices.
pub fn sort3_indices(values: [f64; 3]) -> [usize; 3] {
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_cross_reports_ratio_along_first() {
        let (hit, ratio) = line_segment_cross_2d(
            Vector2::new(-1.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.5, -1.0),
            Vector2::new(0.5, 1.0),
        );
        assert!(hit);
        assert!((ratio - 0.75).abs() < 1e-12);
    }

    #[test]
    fn segment_cross_outside_second_segment() {
        let (hit, ratio) = line_segment_cross_2d(
            Vector2::new(-1.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.5, 1.0),
            Vector2::new(0.5, 2.0),
        );
        assert!(!hit);
        // Ratio along the supporting line is still reported for the caller.
        assert!((ratio - 0.75).abs() < 1e-12);
    }

    #[test]
    fn parallel_segments_do_not_cross() {
        let (hit, _) = line_segment_cross_2d(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 1.0),
        );
        assert!(!hit);
    }

    #[test]
    fn triangle_relation_distinguishes_the_three_zones() {
        let v0 = Vector2::new(0.0, 0.0);
        let v1 = Vector2::new(2.0, 0.0);
        let v2 = Vector2::new(0.0, 2.0);
        assert_eq!(
            point_triangle_relation(Vector2::new(0.4, 0.4), v0, v1, v2),
            PointTriangle::Inside
        );
        assert_eq!(
            point_triangle_relation(Vector2::new(1.0, 0.0), v0, v1, v2),
            PointTriangle::OnEdge
        );
        assert_eq!(
            point_triangle_relation(Vector2::new(3.0, 3.0), v0, v1, v2),
            PointTriangle::Outside
        );
    }

    #[test]
    fn inside_triangle_3d_accepts_centroid_rejects_offset() {
        let v0 = Vector3::new(0.0, 0.0, 0.0);
        let v1 = Vector3::new(1.0, 0.0, 0.0);
        let v2 = Vector3::new(0.0, 1.0, 0.0);
        let centroid = (v0 + v1 + v2) / 3.0;
        assert!(point_inside_triangle_3d(centroid, v0, v1, v2));
        assert!(!point_inside_triangle_3d(Vector3::new(2.0, 2.0, 0.0), v0, v1, v2));
    }

    #[test]
    fn sort3_orders_ascending() {
        assert_eq!(sort3_indices([0.3, 0.1, 0.2]), [1, 2, 0]);
    }
}
