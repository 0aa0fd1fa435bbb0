//! Feature classification of candidate edges.
//!
//! Every surviving candidate line is tested against its adjacent face
//! normals: boundary edges and front/back facing transitions become
//! contours, sharp dihedral angles become creases, material slot changes
//! become material boundaries. A user edge-mark is recorded orthogonally.
//! Classified lines are registered into every tile-grid leaf they cross so
//! the occlusion walker can find them; the classification itself is a pure
//! function of geometry, camera and threshold.
use crate::buffer::{CameraState, RenderBuffer};
use crate::tiles::TileGrid;
use crate::types::{EdgeFlags, LineCategory};
use log::debug;

/// Per-pass classification counters, reported in the pipeline trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassifyStats {
    pub contours: usize,
    pub creases: usize,
    pub materials: usize,
    pub edge_marks: usize,
}

/// Classifies all candidate lines and registers them into the grid.
pub fn classify_lines(
    buffer: &mut RenderBuffer,
    grid: &mut TileGrid,
    camera: &CameraState,
    crease_threshold: f64,
) -> ClassifyStats {
    let mut stats = ClassifyStats::default();
    let candidates = buffer.candidates.clone();

    for line_id in candidates {
        if buffer.line(line_id).discarded {
            continue;
        }

        let line = buffer.line(line_id);
        // The view direction varies per line under perspective; orthographic
        // cameras share one direction for the whole scene.
        let view_dir = if camera.is_perspective {
            buffer.vert(line.l).gloc - camera.position
        } else {
            camera.back_vector
        };

        let mut category: Option<LineCategory> = None;
        match (line.tl, line.tr) {
            (Some(tl), Some(tr)) => {
                let n_l = buffer.tri(tl).gn;
                let n_r = buffer.tri(tr).gn;
                let dot_l = view_dir.dot(&n_l);
                let dot_r = view_dir.dot(&n_r);
                if dot_l * dot_r <= 0.0 && (dot_l + dot_r) != 0.0 {
                    category = Some(LineCategory::Contour);
                } else if n_l.dot(&n_r) < crease_threshold {
                    category = Some(LineCategory::Crease);
                } else if buffer.tri(tl).material != buffer.tri(tr).material {
                    category = Some(LineCategory::Material);
                }
            }
            // Boundary edges always silhouette.
            _ => category = Some(LineCategory::Contour),
        }

        let marked = buffer.line(line_id).flags.contains(EdgeFlags::EDGE_MARK);
        if category.is_none() && !marked {
            continue;
        }

        match category {
            Some(LineCategory::Contour) => {
                buffer.lines[line_id.idx()].flags.insert(EdgeFlags::CONTOUR);
                buffer.contours.push(line_id);
                buffer.work_lists[0].push(line_id);
                stats.contours += 1;
            }
            Some(LineCategory::Crease) => {
                buffer.lines[line_id.idx()].flags.insert(EdgeFlags::CREASE);
                buffer.creases.push(line_id);
                buffer.work_lists[1].push(line_id);
                stats.creases += 1;
            }
            Some(LineCategory::Material) => {
                buffer.lines[line_id.idx()].flags.insert(EdgeFlags::MATERIAL);
                buffer.materials.push(line_id);
                buffer.work_lists[3].push(line_id);
                stats.materials += 1;
            }
            _ => {
                // Marked but otherwise featureless: occlusion-resolved in the
                // edge-mark slot so the work lists stay disjoint.
                buffer.work_lists[4].push(line_id);
            }
        }
        if marked {
            buffer.edge_marks.push(line_id);
            stats.edge_marks += 1;
        }

        let (l2, r2) = buffer.line_ndc(line_id);
        grid.register_line(line_id, l2, r2);
    }

    debug!(
        "classify_lines contours={} creases={} materials={} marks={}",
        stats.contours, stats.creases, stats.materials, stats.edge_marks
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cull::{cull_triangles, perspective_division};
    use crate::loader::load_geometry;
    use crate::scene::{Camera, Face, MeshData, Projection, Scene, SceneObject};
    use nalgebra::{Matrix4, Vector3};

    /// Tent of two faces meeting at a 90° ridge, seen from above.
    fn tent_scene(materials: [i32; 2]) -> Scene {
        let mesh = MeshData {
            positions: vec![
                Vector3::new(-1.0, 0.0, -1.0),
                Vector3::new(-1.0, 0.0, 1.0),
                Vector3::new(0.0, 1.0, -1.0),
                Vector3::new(0.0, 1.0, 1.0),
                Vector3::new(1.0, 0.0, -1.0),
                Vector3::new(1.0, 0.0, 1.0),
            ],
            faces: vec![
                Face {
                    verts: vec![0, 1, 3, 2],
                    material: materials[0],
                },
                Face {
                    verts: vec![2, 3, 5, 4],
                    material: materials[1],
                },
            ],
            marked_edges: vec![],
        };
        Scene {
            camera: Some(Camera {
                projection: Projection::Perspective {
                    fov_y: std::f64::consts::FRAC_PI_2,
                },
                // Above the tent, looking straight down -Y: camera +Z maps
                // to world +Y.
                matrix: Matrix4::new(
                    1.0, 0.0, 0.0, 0.0,
                    0.0, 0.0, 1.0, 6.0,
                    0.0, -1.0, 0.0, 0.0,
                    0.0, 0.0, 0.0, 1.0,
                ),
                clip_start: 0.1,
                clip_end: 100.0,
                shift_x: 0.0,
                shift_y: 0.0,
            }),
            objects: vec![SceneObject {
                name: "tent".into(),
                transform: Matrix4::identity(),
                mesh,
                usage: Default::default(),
            }],
            ..Default::default()
        }
    }

    fn run_classify(scene: &Scene, threshold: f64) -> (RenderBuffer, ClassifyStats) {
        let camera = CameraState::from_scene(scene, 640, 480).expect("camera");
        let mut buffer = RenderBuffer::default();
        load_geometry(scene, &camera, &mut buffer);
        cull_triangles(&mut buffer, &camera);
        perspective_division(&mut buffer, &camera);
        let mut grid = TileGrid::new();
        let stats = classify_lines(&mut buffer, &mut grid, &camera, threshold);
        (buffer, stats)
    }

    #[test]
    fn ridge_classifies_as_crease_under_threshold() {
        // dot of the two face normals is 0 for a 90° ridge.
        let (buffer, stats) = run_classify(&tent_scene([0, 0]), 0.7);
        assert!(stats.creases >= 1, "expected the ridge crease");
        // Perimeter boundary edges are contours.
        assert!(stats.contours >= 4);
        // Quad diagonals are featureless.
        let classified: usize = stats.contours + stats.creases + stats.materials;
        assert!(classified < buffer.lines.len());
    }

    #[test]
    fn material_change_beats_nothing_but_not_crease() {
        let (_, stats) = run_classify(&tent_scene([0, 1]), -2.0);
        // Threshold below -1 disables creases; the ridge becomes a material
        // boundary instead.
        assert_eq!(stats.creases, 0);
        assert!(stats.materials >= 1);
    }

    #[test]
    fn classification_is_idempotent() {
        let (buffer_a, _) = run_classify(&tent_scene([0, 0]), 0.7);
        let (buffer_b, _) = run_classify(&tent_scene([0, 0]), 0.7);
        assert_eq!(buffer_a.contours, buffer_b.contours);
        assert_eq!(buffer_a.creases, buffer_b.creases);
        assert_eq!(buffer_a.materials, buffer_b.materials);
    }
}
