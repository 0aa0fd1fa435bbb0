//! Adaptive tile grid over NDC space.
//!
//! A fixed 4×4 root grid covers [-1, 1]²; any cell holding more than
//! [`SPLIT_THRESHOLD`] triangles splits into four equal quadrants. Cells keep
//! four directional adjacency lists (up/down/left/right) so a line can be
//! walked cell-to-cell without touching the tree again; the lists are rewired
//! incrementally on every split, never recomputed globally.
//!
//! Two cells are neighbors iff their shared boundary has nonzero overlap.
//! Triangles are linked into every leaf they conservatively cover (vertex in
//! cell, cell corner in triangle, or edge crossing); lines into every leaf
//! they cross.
use crate::buffer::{RenderLine, RenderTriangle, RenderVert};
use crate::math::{linear_ratio, line_segment_cross_2d, point_inside_triangle_2d};
use crate::types::{AreaId, LineId, TriId};
use log::debug;
use nalgebra::Vector2;

/// Linked-triangle count above which a cell splits.
pub const SPLIT_THRESHOLD: usize = 200;

/// Axis-aligned screen-space bounding box.
#[derive(Clone, Copy, Debug)]
pub struct Bbox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Bbox {
    pub fn of_triangle(verts: &[RenderVert], tri: &RenderTriangle) -> Bbox {
        let p0 = verts[tri.v[0].idx()].fb2();
        let p1 = verts[tri.v[1].idx()].fb2();
        let p2 = verts[tri.v[2].idx()].fb2();
        Bbox {
            x_min: p0.x.min(p1.x).min(p2.x),
            x_max: p0.x.max(p1.x).max(p2.x),
            y_min: p0.y.min(p1.y).min(p2.y),
            y_max: p0.y.max(p1.y).max(p2.y),
        }
    }

    pub fn of_segment(l: Vector2<f64>, r: Vector2<f64>) -> Bbox {
        Bbox {
            x_min: l.x.min(r.x),
            x_max: l.x.max(r.x),
            y_min: l.y.min(r.y),
            y_max: l.y.max(r.y),
        }
    }

    #[inline]
    fn outside_ndc(&self) -> bool {
        self.x_min > 1.0 || self.x_max < -1.0 || self.y_min > 1.0 || self.y_max < -1.0
    }
}

/// One cell of the tile tree.
#[derive(Clone, Debug, Default)]
pub struct BoundingArea {
    pub l: f64,
    pub r: f64,
    pub u: f64,
    pub b: f64,
    pub cx: f64,
    pub cy: f64,
    pub children: Option<[AreaId; 4]>,
    pub up: Vec<AreaId>,
    pub down: Vec<AreaId>,
    pub left: Vec<AreaId>,
    pub right: Vec<AreaId>,
    pub triangles: Vec<TriId>,
    pub lines: Vec<LineId>,
}

impl BoundingArea {
    fn with_bounds(l: f64, r: f64, u: f64, b: f64) -> Self {
        Self {
            l,
            r,
            u,
            b,
            cx: (l + r) / 2.0,
            cy: (u + b) / 2.0,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline]
    fn contains_point(&self, x: f64, y: f64) -> bool {
        self.l <= x && self.r >= x && self.b <= y && self.u >= y
    }

    fn bbox_overlaps(&self, b: &Bbox) -> bool {
        b.x_min < self.r && b.x_max > self.l && b.y_min < self.u && b.y_max > self.b
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Up,
    Down,
    Left,
    Right,
}

impl Side {
    fn opposite(self) -> Side {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// The tile tree: arena of cells, root grid first.
#[derive(Debug)]
pub struct TileGrid {
    areas: Vec<BoundingArea>,
    tiles_x: usize,
    tiles_y: usize,
    tile_width: f64,
    tile_height: f64,
    split_count: usize,
}

impl TileGrid {
    /// Builds the 4×4 root grid with its seed adjacency.
    pub fn new() -> Self {
        let tiles_x = 4usize;
        let tiles_y = 4usize;
        let span_w = 2.0 / tiles_x as f64;
        let span_h = 2.0 / tiles_y as f64;
        let mut areas = Vec::with_capacity(tiles_x * tiles_y);

        for row in 0..tiles_y {
            for col in 0..tiles_x {
                let l = span_w * col as f64 - 1.0;
                let r = if col == tiles_x - 1 {
                    1.0
                } else {
                    span_w * (col + 1) as f64 - 1.0
                };
                let u = 1.0 - span_h * row as f64;
                let b = if row == tiles_y - 1 {
                    -1.0
                } else {
                    1.0 - span_h * (row + 1) as f64
                };
                areas.push(BoundingArea::with_bounds(l, r, u, b));
            }
        }

        let id = |row: usize, col: usize| AreaId((row * tiles_x + col) as u32);
        for row in 0..tiles_y {
            for col in 0..tiles_x {
                let this = id(row, col).idx();
                if row > 0 {
                    areas[this].up.push(id(row - 1, col));
                }
                if col > 0 {
                    areas[this].left.push(id(row, col - 1));
                }
                if row < tiles_y - 1 {
                    areas[this].down.push(id(row + 1, col));
                }
                if col < tiles_x - 1 {
                    areas[this].right.push(id(row, col + 1));
                }
            }
        }

        Self {
            areas,
            tiles_x,
            tiles_y,
            tile_width: span_w,
            tile_height: span_h,
            split_count: 0,
        }
    }

    #[inline]
    pub fn area(&self, id: AreaId) -> &BoundingArea {
        &self.areas[id.idx()]
    }

    /// Total cell count, root grid included.
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Number of splits performed so far.
    pub fn split_count(&self) -> usize {
        self.split_count
    }

    /// All leaf cell ids.
    pub fn leaves(&self) -> impl Iterator<Item = AreaId> + '_ {
        (0..self.areas.len()).filter_map(|i| {
            let id = AreaId(i as u32);
            self.areas[i].is_leaf().then_some(id)
        })
    }

    /// Root cells overlapped by `bbox`, as an id iterator; `None` when the
    /// bbox misses NDC space entirely.
    fn root_range(&self, bbox: &Bbox) -> Option<Vec<AreaId>> {
        if bbox.outside_ndc() {
            return None;
        }
        let clamp = |v: isize, hi: usize| v.clamp(0, hi as isize - 1) as usize;
        let col_begin = clamp(((bbox.x_min + 1.0) / self.tile_width) as isize, self.tiles_x);
        let col_end = clamp(((bbox.x_max + 1.0) / self.tile_width) as isize, self.tiles_x);
        let row_begin = clamp(
            self.tiles_y as isize - ((bbox.y_max + 1.0) / self.tile_height) as isize - 1,
            self.tiles_y,
        );
        let row_end = clamp(
            self.tiles_y as isize - ((bbox.y_min + 1.0) / self.tile_height) as isize - 1,
            self.tiles_y,
        );
        let mut out = Vec::new();
        for row in row_begin..=row_end {
            for col in col_begin..=col_end {
                out.push(AreaId((row * self.tiles_x + col) as u32));
            }
        }
        Some(out)
    }

    /// Links a triangle into every leaf it covers.
    ///
    /// `recursive` permits splitting overfull cells along the way; leaf cells
    /// the triangle landed in (pre-split ids) are appended to `leaves` when
    /// provided. Returns false for fully off-screen triangles.
    pub fn link_triangle(
        &mut self,
        verts: &[RenderVert],
        lines: &[RenderLine],
        tris: &[RenderTriangle],
        tri: TriId,
        recursive: bool,
        mut leaves: Option<&mut Vec<AreaId>>,
    ) -> bool {
        let bbox = Bbox::of_triangle(verts, &tris[tri.idx()]);
        let Some(roots) = self.root_range(&bbox) else {
            return false;
        };
        for root in roots {
            self.link_triangle_in(
                root,
                verts,
                lines,
                tris,
                tri,
                &bbox,
                recursive,
                leaves.as_deref_mut(),
            );
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn link_triangle_in(
        &mut self,
        area_id: AreaId,
        verts: &[RenderVert],
        lines: &[RenderLine],
        tris: &[RenderTriangle],
        tri: TriId,
        bbox: &Bbox,
        recursive: bool,
        mut leaves: Option<&mut Vec<AreaId>>,
    ) {
        if !self.triangle_covers_area(verts, &tris[tri.idx()], area_id) {
            return;
        }
        match self.areas[area_id.idx()].children {
            None => {
                self.areas[area_id.idx()].triangles.push(tri);
                if self.areas[area_id.idx()].triangles.len() > SPLIT_THRESHOLD && recursive {
                    self.split(area_id, verts, lines, tris);
                }
                if let Some(out) = leaves {
                    out.push(area_id);
                }
            }
            Some(children) => {
                for child in children {
                    if self.areas[child.idx()].bbox_overlaps(bbox) {
                        self.link_triangle_in(
                            child,
                            verts,
                            lines,
                            tris,
                            tri,
                            bbox,
                            recursive,
                            leaves.as_deref_mut(),
                        );
                    }
                }
            }
        }
    }

    /// Links a line into every leaf it crosses, starting from the root cells
    /// of its bbox. Returns false for off-screen or non-finite lines.
    pub fn register_line(&mut self, line: LineId, l: Vector2<f64>, r: Vector2<f64>) -> bool {
        if !l.x.is_finite() || !r.x.is_finite() {
            return false;
        }
        let bbox = Bbox::of_segment(l, r);
        let Some(roots) = self.root_range(&bbox) else {
            return false;
        };
        for root in roots {
            self.link_line_in(root, line, l, r);
        }
        true
    }

    fn link_line_in(&mut self, area_id: AreaId, line: LineId, l: Vector2<f64>, r: Vector2<f64>) {
        match self.areas[area_id.idx()].children {
            None => {
                if self.line_crosses_area(l, r, area_id) {
                    self.areas[area_id.idx()].lines.push(line);
                }
            }
            Some(children) => {
                for child in children {
                    if self.line_crosses_area(l, r, child) {
                        self.link_line_in(child, line, l, r);
                    }
                }
            }
        }
    }

    /// Splits `root` into four quadrant children, rewiring adjacency and
    /// redistributing its residents. Children never split during the
    /// redistribution.
    fn split(&mut self, root: AreaId, verts: &[RenderVert], lines: &[RenderLine], tris: &[RenderTriangle]) {
        let (l, r, u, b, cx, cy) = {
            let a = &self.areas[root.idx()];
            (a.l, a.r, a.u, a.b, a.cx, a.cy)
        };
        let base = self.areas.len() as u32;
        // Child order: 0 top-right, 1 top-left, 2 bottom-left, 3 bottom-right.
        self.areas.push(BoundingArea::with_bounds(cx, r, u, cy));
        self.areas.push(BoundingArea::with_bounds(l, cx, u, cy));
        self.areas.push(BoundingArea::with_bounds(l, cx, cy, b));
        self.areas.push(BoundingArea::with_bounds(cx, r, cy, b));
        let children = [
            AreaId(base),
            AreaId(base + 1),
            AreaId(base + 2),
            AreaId(base + 3),
        ];
        self.areas[root.idx()].children = Some(children);
        self.split_count += 1;
        debug!("TileGrid::split cell {} -> {} cells", root.0, self.areas.len());

        self.connect_children(root, children);

        let resident_tris = std::mem::take(&mut self.areas[root.idx()].triangles);
        for tri in resident_tris {
            let bbox = Bbox::of_triangle(verts, &tris[tri.idx()]);
            for child in children {
                if self.areas[child.idx()].bbox_overlaps(&bbox) {
                    self.link_triangle_in(child, verts, lines, tris, tri, &bbox, false, None);
                }
            }
        }

        let resident_lines = std::mem::take(&mut self.areas[root.idx()].lines);
        for line in resident_lines {
            let rl = &lines[line.idx()];
            let lp = verts[rl.l.idx()].fb2();
            let rp = verts[rl.r.idx()].fb2();
            self.link_line_in(root, line, lp, rp);
        }
    }

    fn connect_children(&mut self, root: AreaId, ch: [AreaId; 4]) {
        // Internal adjacency between the four quadrants.
        self.areas[ch[1].idx()].right.push(ch[0]);
        self.areas[ch[0].idx()].left.push(ch[1]);
        self.areas[ch[1].idx()].down.push(ch[2]);
        self.areas[ch[2].idx()].up.push(ch[1]);
        self.areas[ch[2].idx()].right.push(ch[3]);
        self.areas[ch[3].idx()].left.push(ch[2]);
        self.areas[ch[3].idx()].up.push(ch[0]);
        self.areas[ch[0].idx()].down.push(ch[3]);

        // Children exposed on each outer side of the parent.
        let side_children = |side: Side| -> [AreaId; 2] {
            match side {
                Side::Left => [ch[1], ch[2]],
                Side::Right => [ch[0], ch[3]],
                Side::Up => [ch[0], ch[1]],
                Side::Down => [ch[2], ch[3]],
            }
        };

        for side in [Side::Left, Side::Right, Side::Up, Side::Down] {
            let neighbors = std::mem::take(self.side_list_mut(root, side));
            for neighbor in neighbors {
                let opposite = self.side_list_mut(neighbor, side.opposite());
                opposite.retain(|&id| id != root);
                for child in side_children(side) {
                    if self.sides_touch(child, neighbor, side) {
                        self.side_list_mut(child, side).push(neighbor);
                        self.side_list_mut(neighbor, side.opposite()).push(child);
                    }
                }
            }
        }
    }

    fn side_list_mut(&mut self, id: AreaId, side: Side) -> &mut Vec<AreaId> {
        let area = &mut self.areas[id.idx()];
        match side {
            Side::Up => &mut area.up,
            Side::Down => &mut area.down,
            Side::Left => &mut area.left,
            Side::Right => &mut area.right,
        }
    }

    /// Nonzero boundary overlap between `a` and its `side`-neighbor `b`.
    fn sides_touch(&self, a: AreaId, b: AreaId, side: Side) -> bool {
        let a = &self.areas[a.idx()];
        let b = &self.areas[b.idx()];
        match side {
            Side::Left | Side::Right => a.u > b.b && a.b < b.u,
            Side::Up | Side::Down => a.r > b.l && a.l < b.r,
        }
    }

    /// Conservative triangle-covers-cell test: vertex in cell, cell corner in
    /// triangle, or triangle edge crossing the cell.
    fn triangle_covers_area(
        &self,
        verts: &[RenderVert],
        tri: &RenderTriangle,
        area_id: AreaId,
    ) -> bool {
        let area = &self.areas[area_id.idx()];
        let p0 = verts[tri.v[0].idx()].fb2();
        let p1 = verts[tri.v[1].idx()].fb2();
        let p2 = verts[tri.v[2].idx()].fb2();

        if area.contains_point(p0.x, p0.y)
            || area.contains_point(p1.x, p1.y)
            || area.contains_point(p2.x, p2.y)
        {
            return true;
        }

        let corners = [
            Vector2::new(area.l, area.b),
            Vector2::new(area.r, area.b),
            Vector2::new(area.l, area.u),
            Vector2::new(area.r, area.u),
        ];
        if corners
            .iter()
            .any(|&c| point_inside_triangle_2d(c, p0, p1, p2))
        {
            return true;
        }

        self.line_crosses_area(p0, p1, area_id)
            || self.line_crosses_area(p1, p2, area_id)
            || self.line_crosses_area(p2, p0, area_id)
    }

    /// True when segment `(l, r)` intersects the cell rectangle.
    fn line_crosses_area(&self, l: Vector2<f64>, r: Vector2<f64>, area_id: AreaId) -> bool {
        let area = &self.areas[area_id.idx()];
        if area.l > l.x.max(r.x)
            || area.r < l.x.min(r.x)
            || area.b > l.y.max(r.y)
            || area.u < l.y.min(r.y)
        {
            return false;
        }

        // Sign changes of the corner cross products mean the supporting line
        // separates the corners; combined with the bbox pass that is a hit.
        let vx = l.x - r.x;
        let vy = l.y - r.y;
        let corner = |px: f64, py: f64| vx * (py - l.y) - vy * (px - l.x);

        let mut c = corner(area.l, area.b);
        for (px, py) in [(area.r, area.b), (area.l, area.u), (area.r, area.u)] {
            let c1 = corner(px, py);
            if c1 * c <= 0.0 {
                return true;
            }
            c = c1;
        }
        false
    }

    /// Deepest leaf containing the NDC point, clamped to the grid.
    pub fn point_area(&self, x: f64, y: f64) -> AreaId {
        let col = (((x + 1.0) / self.tile_width) as isize).clamp(0, self.tiles_x as isize - 1);
        let row = (self.tiles_y as isize - ((y + 1.0) / self.tile_height) as isize - 1)
            .clamp(0, self.tiles_y as isize - 1);
        let mut id = AreaId((row as usize * self.tiles_x + col as usize) as u32);
        while let Some(ch) = self.areas[id.idx()].children {
            let area = &self.areas[id.idx()];
            id = if x > area.cx {
                if y > area.cy {
                    ch[0]
                } else {
                    ch[3]
                }
            } else if y > area.cy {
                ch[1]
            } else {
                ch[2]
            };
        }
        id
    }

    /// First leaf a line's walk starts in.
    ///
    /// When the start endpoint sits outside NDC space, the segment is clipped
    /// against the box first and the walk starts at its entry point.
    pub fn first_area_of_line(&self, l: Vector2<f64>, r: Vector2<f64>) -> AreaId {
        if l.x > -1.0 && l.x < 1.0 && l.y > -1.0 && l.y < 1.0 {
            return self.point_area(l.x, l.y);
        }
        let lu = Vector2::new(-1.0, 1.0);
        let ru = Vector2::new(1.0, 1.0);
        let lb = Vector2::new(-1.0, -1.0);
        let rb = Vector2::new(1.0, -1.0);
        let mut ratio = 1.0f64;
        for (b1, b2) in [(lu, ru), (lb, rb), (lb, lu), (rb, ru)] {
            let (hit, sr) = line_segment_cross_2d(l, r, b1, b2);
            if hit && sr > 0.0 && sr < ratio {
                ratio = sr;
            }
        }
        let entry = l.lerp(&r, ratio);
        self.point_area(entry.x, entry.y)
    }

    /// Steps from `current` to the next leaf the line crosses.
    ///
    /// `(x, y)` is the walk position inside `current`; `k` the screen-space
    /// slope; `px`/`py` the step signs of the line direction. Returns the next
    /// cell and the updated walk position, or `None` once the parametric
    /// position passes the line end or no neighbor is registered.
    #[allow(clippy::too_many_arguments)]
    pub fn next_area_along_line(
        &self,
        current: AreaId,
        l: Vector2<f64>,
        r: Vector2<f64>,
        x: f64,
        y: f64,
        k: f64,
        px: i32,
        py: i32,
    ) -> Option<(AreaId, f64, f64)> {
        let area = &self.areas[current.idx()];

        let search_vertical = |list: &[AreaId], cross_y: f64| -> Option<AreaId> {
            list.iter()
                .copied()
                .find(|&id| {
                    let ba = &self.areas[id.idx()];
                    ba.u >= cross_y && ba.b < cross_y
                })
        };
        let search_horizontal = |list: &[AreaId], cross_x: f64| -> Option<AreaId> {
            list.iter()
                .copied()
                .find(|&id| {
                    let ba = &self.areas[id.idx()];
                    ba.r >= cross_x && ba.l < cross_x
                })
        };

        if px > 0 {
            let rx = area.r;
            let ry = y + k * (rx - x);
            if py != 0 {
                let (edge_y, step_down) = if py > 0 { (area.u, false) } else { (area.b, true) };
                let ex = x + (edge_y - y) / k;
                let r1 = linear_ratio(l.x, r.x, rx);
                let r2 = linear_ratio(l.x, r.x, ex);
                if r1.min(r2) > 1.0 {
                    return None;
                }
                if r1 <= r2 {
                    return search_vertical(&area.right, ry).map(|id| (id, rx, ry));
                }
                let list = if step_down { &area.down } else { &area.up };
                return search_horizontal(list, ex).map(|id| (id, ex, edge_y));
            }
            if linear_ratio(l.x, r.x, area.r) > 1.0 {
                return None;
            }
            return search_vertical(&area.right, y).map(|id| (id, area.r, y));
        }

        if px < 0 {
            let lx = area.l;
            let ly = y + k * (lx - x);
            if py != 0 {
                let (edge_y, step_down) = if py > 0 { (area.u, false) } else { (area.b, true) };
                let ex = x + (edge_y - y) / k;
                let r1 = linear_ratio(l.x, r.x, lx);
                let r2 = linear_ratio(l.x, r.x, ex);
                if r1.min(r2) > 1.0 {
                    return None;
                }
                if r1 <= r2 {
                    return search_vertical(&area.left, ly).map(|id| (id, lx, ly));
                }
                let list = if step_down { &area.down } else { &area.up };
                return search_horizontal(list, ex).map(|id| (id, ex, edge_y));
            }
            if linear_ratio(l.x, r.x, area.l) > 1.0 {
                return None;
            }
            return search_vertical(&area.left, y).map(|id| (id, area.l, y));
        }

        // Vertical line.
        if py > 0 {
            if linear_ratio(l.y, r.y, area.u) > 1.0 {
                return None;
            }
            return area
                .up
                .iter()
                .copied()
                .find(|&id| {
                    let ba = &self.areas[id.idx()];
                    ba.r > x && ba.l <= x
                })
                .map(|id| (id, x, area.u));
        }
        if py < 0 {
            if linear_ratio(l.y, r.y, area.b) > 1.0 {
                return None;
            }
            return area
                .down
                .iter()
                .copied()
                .find(|&id| {
                    let ba = &self.areas[id.idx()];
                    ba.r > x && ba.l <= x
                })
                .map(|id| (id, x, area.b));
        }
        None
    }

    /// Visits every triangle resident in `area` or its descendants.
    pub fn for_each_resident_triangle(&self, area: AreaId, f: &mut impl FnMut(TriId)) {
        match self.areas[area.idx()].children {
            None => {
                for &tri in &self.areas[area.idx()].triangles {
                    f(tri);
                }
            }
            Some(children) => {
                for child in children {
                    self.for_each_resident_triangle(child, f);
                }
            }
        }
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{RenderTriangle, RenderVert};
    use crate::types::{CullStatus, LineId, VertId};
    use nalgebra::{Vector3, Vector4};

    struct Fixture {
        verts: Vec<RenderVert>,
        tris: Vec<RenderTriangle>,
        lines: Vec<RenderLine>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                verts: Vec::new(),
                tris: Vec::new(),
                lines: Vec::new(),
            }
        }

        fn add_triangle(&mut self, points: [(f64, f64); 3]) -> TriId {
            let base = self.verts.len() as u32;
            for (x, y) in points {
                self.verts.push(RenderVert::new(
                    Vector3::zeros(),
                    Vector4::new(x, y, 0.5, 1.0),
                ));
            }
            let id = TriId(self.tris.len() as u32);
            self.tris.push(RenderTriangle {
                v: [VertId(base), VertId(base + 1), VertId(base + 2)],
                rl: [LineId(u32::MAX), LineId(u32::MAX), LineId(u32::MAX)],
                gn: Vector3::z(),
                gc: Vector3::zeros(),
                material: 0,
                cull: CullStatus::Keep,
            });
            id
        }
    }

    fn opposite_list(grid: &TileGrid, id: AreaId, side: Side) -> &Vec<AreaId> {
        let area = grid.area(id);
        match side {
            Side::Up => &area.up,
            Side::Down => &area.down,
            Side::Left => &area.left,
            Side::Right => &area.right,
        }
    }

    fn assert_adjacency_symmetry(grid: &TileGrid) {
        for i in 0..grid.len() {
            let id = AreaId(i as u32);
            if !grid.area(id).is_leaf() {
                continue;
            }
            for side in [Side::Up, Side::Down, Side::Left, Side::Right] {
                for &neighbor in opposite_list(grid, id, side) {
                    assert!(
                        opposite_list(grid, neighbor, side.opposite()).contains(&id),
                        "cell {} lists {} as {:?} neighbor without the reverse link",
                        id.0,
                        neighbor.0,
                        side
                    );
                    assert!(
                        grid.sides_touch(id, neighbor, side),
                        "cells {} and {} are linked but do not touch",
                        id.0,
                        neighbor.0
                    );
                }
            }
        }
    }

    #[test]
    fn root_grid_adjacency_is_symmetric() {
        let grid = TileGrid::new();
        assert_eq!(grid.len(), 16);
        assert_adjacency_symmetry(&grid);
    }

    #[test]
    fn splits_preserve_adjacency_symmetry() {
        let mut fx = Fixture::new();
        let mut grid = TileGrid::new();
        // Pile small triangles into one corner cell until it splits twice.
        let mut state = 1u64;
        let mut rand = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        for _ in 0..420 {
            let cx = -0.95 + rand() * 0.2;
            let cy = 0.75 + rand() * 0.2;
            let tri = fx.add_triangle([(cx, cy), (cx + 0.01, cy), (cx, cy + 0.01)]);
            grid.link_triangle(&fx.verts, &fx.lines, &fx.tris, tri, true, None);
        }
        assert!(grid.split_count() > 0, "expected at least one split");
        assert!(grid.len() > 16);
        assert_adjacency_symmetry(&grid);
    }

    #[test]
    fn covers_test_never_misses_an_overlapping_triangle() {
        let mut fx = Fixture::new();
        let grid = TileGrid::new();
        let mut state = 7u64;
        let mut rand = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        for _ in 0..200 {
            let pts = [
                (rand() * 2.0 - 1.0, rand() * 2.0 - 1.0),
                (rand() * 2.0 - 1.0, rand() * 2.0 - 1.0),
                (rand() * 2.0 - 1.0, rand() * 2.0 - 1.0),
            ];
            let tri = fx.add_triangle(pts);
            for cell in 0..16u32 {
                let id = AreaId(cell);
                let area = grid.area(id);
                // Sample the cell interior; an interior point inside the
                // triangle means the covers test must accept.
                let mut overlapped = false;
                for sx in 1..8 {
                    for sy in 1..8 {
                        let px = area.l + (area.r - area.l) * sx as f64 / 8.0;
                        let py = area.b + (area.u - area.b) * sy as f64 / 8.0;
                        let p0 = fx.verts[fx.tris[tri.idx()].v[0].idx()].fb2();
                        let p1 = fx.verts[fx.tris[tri.idx()].v[1].idx()].fb2();
                        let p2 = fx.verts[fx.tris[tri.idx()].v[2].idx()].fb2();
                        if point_inside_triangle_2d(Vector2::new(px, py), p0, p1, p2) {
                            overlapped = true;
                        }
                    }
                }
                if overlapped {
                    assert!(
                        grid.triangle_covers_area(&fx.verts, &fx.tris[tri.idx()], id),
                        "covers test missed an overlapping triangle"
                    );
                }
            }
        }
    }

    #[test]
    fn diagonal_walk_visits_distinct_cells() {
        let grid = TileGrid::new();
        // Slope chosen so no crossing lands exactly on a cell corner.
        let l = Vector2::new(-0.9, -0.7);
        let r = Vector2::new(0.9, 0.75);
        let k = (r.y - l.y) / (r.x - l.x + 1e-30);
        let mut visited = vec![grid.first_area_of_line(l, r)];
        let (mut x, mut y) = (l.x, l.y);
        while let Some((next, nx, ny)) =
            grid.next_area_along_line(*visited.last().expect("nonempty"), l, r, x, y, k, 1, 1)
        {
            assert!(!visited.contains(&next), "walk revisited a cell");
            visited.push(next);
            x = nx;
            y = ny;
        }
        assert!(visited.len() >= 6, "diagonal should cross several cells");
    }

    #[test]
    fn off_screen_start_is_clipped_to_the_box_entry() {
        let grid = TileGrid::new();
        let l = Vector2::new(-2.0, 0.05);
        let r = Vector2::new(2.0, 0.05);
        let first = grid.first_area_of_line(l, r);
        let area = grid.area(first);
        assert!(area.l <= -0.99 && area.b <= 0.05 && area.u >= 0.05);
    }

    #[test]
    fn point_lookup_descends_into_children() {
        let mut fx = Fixture::new();
        let mut grid = TileGrid::new();
        for i in 0..(SPLIT_THRESHOLD + 2) {
            let off = i as f64 * 1e-6;
            let tri = fx.add_triangle([
                (-0.9 + off, 0.9),
                (-0.89 + off, 0.9),
                (-0.9 + off, 0.89),
            ]);
            grid.link_triangle(&fx.verts, &fx.lines, &fx.tris, tri, true, None);
        }
        assert!(grid.split_count() >= 1);
        let leaf = grid.point_area(-0.895, 0.895);
        assert!(grid.area(leaf).is_leaf());
        assert!(grid.area(leaf).contains_point(-0.895, 0.895));
    }
}
