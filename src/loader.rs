//! Geometry loading: scene objects to render-space arenas.
//!
//! Objects are processed sequentially; each contributes vertices transformed
//! to world and clip space, one render line per unique mesh edge and one
//! render triangle per triangulated face. Edge/triangle adjacency is wired
//! here and stays valid for the whole pass. Usage policy (include / exclude /
//! occlusion-only, with collection overrides) is resolved per object before
//! loading.
use crate::buffer::{CameraState, RenderBuffer, RenderLine, RenderTriangle, RenderVert};
use crate::scene::{Face, ObjectUsage, Scene};
use crate::types::{EdgeFlags, LineId, ObjectId, TriId, VertId};
use log::{debug, warn};
use nalgebra::{Vector3, Vector4};
use std::collections::HashMap;

/// Per-pass load counters, reported in the pipeline trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadStats {
    pub objects: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub lines: usize,
}

/// Loads every eligible scene object into the buffer.
pub fn load_geometry(scene: &Scene, camera: &CameraState, buffer: &mut RenderBuffer) -> LoadStats {
    let mut stats = LoadStats::default();
    for (index, object) in scene.objects.iter().enumerate() {
        let usage = scene.effective_usage(index);
        if usage == ObjectUsage::Exclude || object.mesh.is_empty() {
            continue;
        }
        load_object(scene, camera, buffer, index, usage, &mut stats);
        stats.objects += 1;
    }
    debug!(
        "load_geometry done objects={} verts={} tris={} lines={}",
        stats.objects, stats.vertices, stats.triangles, stats.lines
    );
    stats
}

fn load_object(
    scene: &Scene,
    camera: &CameraState,
    buffer: &mut RenderBuffer,
    index: usize,
    usage: ObjectUsage,
    stats: &mut LoadStats,
) {
    let object = &scene.objects[index];
    let object_id = ObjectId(index as u32);
    let mesh = &object.mesh;
    let vert_count = mesh.positions.len();

    // World + clip transforms for the whole vertex array.
    let base_vert = buffer.verts.len() as u32;
    for pos in &mesh.positions {
        let world = (object.transform * Vector4::new(pos.x, pos.y, pos.z, 1.0)).xyz();
        let clip = camera.project(world);
        buffer.push_vert(RenderVert::new(world, clip));
    }
    stats.vertices += vert_count;

    let marked: std::collections::HashSet<(u32, u32)> = mesh
        .marked_edges
        .iter()
        .map(|&[a, b]| (a.min(b), a.max(b)))
        .collect();

    let mut edge_map: HashMap<(u32, u32), LineId> = HashMap::new();
    let mut warned_vertex = false;
    let mut warned_material = false;

    for face in &mesh.faces {
        if face.verts.iter().any(|&v| v as usize >= vert_count) {
            if !warned_vertex {
                warn!(
                    "load_object {:?}: face vertex index out of range, face skipped",
                    object.name
                );
                warned_vertex = true;
            }
            continue;
        }
        let material = if face.material < 0 {
            if !warned_material {
                warn!(
                    "load_object {:?}: negative material index clamped to 0",
                    object.name
                );
                warned_material = true;
            }
            0
        } else {
            face.material
        };

        for [i0, i1, i2] in triangulate(face, &mesh.positions) {
            let v = [
                VertId(base_vert + i0),
                VertId(base_vert + i1),
                VertId(base_vert + i2),
            ];
            let mut rl = [LineId(0); 3];
            for (k, (a, b)) in [(i0, i1), (i1, i2), (i2, i0)].into_iter().enumerate() {
                let key = (a.min(b), a.max(b));
                let line_id = *edge_map.entry(key).or_insert_with(|| {
                    let mut line = RenderLine::new(VertId(base_vert + a), VertId(base_vert + b));
                    line.object = Some(object_id);
                    line.candidate = usage != ObjectUsage::OcclusionOnly;
                    if marked.contains(&key) {
                        line.flags.insert(EdgeFlags::EDGE_MARK);
                    }
                    let is_candidate = line.candidate;
                    let id = buffer.push_line(line);
                    if is_candidate {
                        buffer.candidates.push(id);
                    }
                    stats.lines += 1;
                    id
                });
                rl[k] = line_id;
            }

            let p0 = buffer.vert(v[0]).gloc;
            let p1 = buffer.vert(v[1]).gloc;
            let p2 = buffer.vert(v[2]).gloc;
            let mut gn = (p1 - p0).cross(&(p2 - p0));
            let norm = gn.norm();
            if norm > f64::EPSILON {
                gn /= norm;
            }
            let gc = (buffer.vert(v[0]).fbcoord.xyz()
                + buffer.vert(v[1]).fbcoord.xyz()
                + buffer.vert(v[2]).fbcoord.xyz())
                / 3.0;

            let tri_id = buffer.push_triangle(RenderTriangle {
                v,
                rl,
                gn,
                gc,
                material,
                cull: Default::default(),
            });
            assign_triangle_to_edges(buffer, tri_id);
            stats.triangles += 1;
        }
    }
}

/// Registers a triangle on its three edges' free adjacency slots.
fn assign_triangle_to_edges(buffer: &mut RenderBuffer, tri_id: TriId) {
    let rl = buffer.tri(tri_id).rl;
    for line_id in rl {
        let line = &mut buffer.lines[line_id.idx()];
        if line.tl.is_none() {
            line.tl = Some(tri_id);
        } else if line.tr.is_none() {
            line.tr = Some(tri_id);
        }
    }
}

/// Splits a polygon face into triangles, as local vertex-index triples.
///
/// Quads split along their shorter diagonal; larger polygons fan from the
/// first vertex. Degenerate faces (fewer than three vertices) yield nothing.
fn triangulate(face: &Face, positions: &[Vector3<f64>]) -> Vec<[u32; 3]> {
    let n = face.verts.len();
    match n {
        0..=2 => Vec::new(),
        3 => vec![[face.verts[0], face.verts[1], face.verts[2]]],
        4 => {
            let [a, b, c, d] = [face.verts[0], face.verts[1], face.verts[2], face.verts[3]];
            let diag_ac = (positions[a as usize] - positions[c as usize]).norm_squared();
            let diag_bd = (positions[b as usize] - positions[d as usize]).norm_squared();
            if diag_ac <= diag_bd {
                vec![[a, b, c], [a, c, d]]
            } else {
                vec![[a, b, d], [b, c, d]]
            }
        }
        _ => (1..n - 1)
            .map(|i| [face.verts[0], face.verts[i], face.verts[i + 1]])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Camera, MeshData, Projection, SceneObject};
    use nalgebra::Matrix4;

    fn test_scene() -> Scene {
        let mesh = MeshData {
            positions: vec![
                Vector3::new(-1.0, -1.0, 0.0),
                Vector3::new(1.0, -1.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(-1.0, 1.0, 0.0),
            ],
            faces: vec![Face {
                verts: vec![0, 1, 2, 3],
                material: 0,
            }],
            marked_edges: vec![[0, 1]],
        };
        Scene {
            camera: Some(Camera {
                projection: Projection::Perspective {
                    fov_y: std::f64::consts::FRAC_PI_2,
                },
                matrix: Matrix4::new(
                    1.0, 0.0, 0.0, 0.0,
                    0.0, 1.0, 0.0, 0.0,
                    0.0, 0.0, 1.0, 5.0,
                    0.0, 0.0, 0.0, 1.0,
                ),
                clip_start: 0.1,
                clip_end: 100.0,
                shift_x: 0.0,
                shift_y: 0.0,
            }),
            objects: vec![SceneObject {
                name: "quad".into(),
                transform: Matrix4::identity(),
                mesh,
                usage: ObjectUsage::Inherent,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn quad_loads_as_two_triangles_with_five_edges() {
        let scene = test_scene();
        let camera = CameraState::from_scene(&scene, 640, 480).expect("camera");
        let mut buffer = RenderBuffer::default();
        let stats = load_geometry(&scene, &camera, &mut buffer);

        assert_eq!(stats.triangles, 2);
        assert_eq!(stats.lines, 5); // 4 perimeter edges + 1 diagonal
        assert_eq!(buffer.candidates.len(), 5);

        // The diagonal is the one edge with two adjacent triangles.
        let interior = buffer
            .lines
            .iter()
            .filter(|l| l.tl.is_some() && l.tr.is_some())
            .count();
        assert_eq!(interior, 1);

        // Edge-mark flag propagated from the mesh metadata.
        let marked = buffer
            .lines
            .iter()
            .filter(|l| l.flags.contains(EdgeFlags::EDGE_MARK))
            .count();
        assert_eq!(marked, 1);
    }

    #[test]
    fn occlusion_only_objects_contribute_no_candidates() {
        let mut scene = test_scene();
        scene.objects[0].usage = ObjectUsage::OcclusionOnly;
        let camera = CameraState::from_scene(&scene, 640, 480).expect("camera");
        let mut buffer = RenderBuffer::default();
        let stats = load_geometry(&scene, &camera, &mut buffer);
        assert_eq!(stats.triangles, 2);
        assert!(buffer.candidates.is_empty());
        assert_eq!(buffer.lines.len(), 5);
    }

    #[test]
    fn face_normal_is_unit_length_and_perpendicular() {
        let scene = test_scene();
        let camera = CameraState::from_scene(&scene, 640, 480).expect("camera");
        let mut buffer = RenderBuffer::default();
        load_geometry(&scene, &camera, &mut buffer);
        for tri in &buffer.triangles {
            assert!((tri.gn.norm() - 1.0).abs() < 1e-9);
            let e = buffer.vert(tri.v[1]).gloc - buffer.vert(tri.v[0]).gloc;
            assert!(tri.gn.dot(&e).abs() < 1e-9);
        }
    }
}
