//! Synthetic scene builders shared by the end-to-end tests.
use line_art::scene::{Camera, Face, MeshData, Projection, Scene, SceneObject};
use nalgebra::{Matrix4, Vector3};

/// Camera at `(0, 0, height)` looking down the world -Z axis.
pub fn camera_looking_down_z(height: f64) -> Camera {
    Camera {
        projection: Projection::Perspective {
            fov_y: std::f64::consts::FRAC_PI_3,
        },
        matrix: Matrix4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, height,
            0.0, 0.0, 0.0, 1.0,
        ),
        clip_start: 0.1,
        clip_end: 100.0,
        shift_x: 0.0,
        shift_y: 0.0,
    }
}

pub fn object(name: &str, mesh: MeshData) -> SceneObject {
    SceneObject {
        name: name.into(),
        transform: Matrix4::identity(),
        mesh,
        usage: Default::default(),
    }
}

/// Unit cube centered at the origin, six quad faces.
pub fn cube_mesh() -> MeshData {
    let positions = vec![
        Vector3::new(-1.0, -1.0, -1.0),
        Vector3::new(1.0, -1.0, -1.0),
        Vector3::new(1.0, 1.0, -1.0),
        Vector3::new(-1.0, 1.0, -1.0),
        Vector3::new(-1.0, -1.0, 1.0),
        Vector3::new(1.0, -1.0, 1.0),
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::new(-1.0, 1.0, 1.0),
    ];
    let quads = [
        [0u32, 3, 2, 1], // back (z = -1)
        [4, 5, 6, 7],    // front (z = +1)
        [0, 1, 5, 4],    // bottom
        [2, 3, 7, 6],    // top
        [1, 2, 6, 5],    // right
        [0, 4, 7, 3],    // left
    ];
    MeshData {
        positions,
        faces: quads
            .iter()
            .map(|q| Face {
                verts: q.to_vec(),
                material: 0,
            })
            .collect(),
        marked_edges: vec![],
    }
}

/// Cube viewed axis-aligned from the +Z side.
pub fn cube_scene() -> Scene {
    Scene {
        camera: Some(camera_looking_down_z(8.0)),
        objects: vec![object("cube", cube_mesh())],
        ..Default::default()
    }
}

/// Two coplanar quads sharing one interior edge, facing the camera.
pub fn coplanar_quads_scene() -> Scene {
    let mesh = MeshData {
        positions: vec![
            Vector3::new(-2.0, -1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(-2.0, 1.0, 0.0),
            Vector3::new(2.0, -1.0, 0.0),
            Vector3::new(2.0, 1.0, 0.0),
        ],
        faces: vec![
            Face {
                verts: vec![0, 1, 2, 3],
                material: 0,
            },
            Face {
                verts: vec![1, 4, 5, 2],
                material: 0,
            },
        ],
        marked_edges: vec![],
    };
    Scene {
        camera: Some(camera_looking_down_z(8.0)),
        objects: vec![object("plane", mesh)],
        ..Default::default()
    }
}

/// A flat quad at z = 0 and a tilted quad crossing it along y = 0.
pub fn crossing_planes_scene() -> Scene {
    let flat = MeshData {
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
        marked_edges: vec![],
    };
    // Plane z = y / 2: above the flat quad for y > 0, below it for y < 0.
    let tilted = MeshData {
        positions: vec![
            Vector3::new(-1.0, -1.0, -0.5),
            Vector3::new(1.0, -1.0, -0.5),
            Vector3::new(1.0, 1.0, 0.5),
            Vector3::new(-1.0, 1.0, 0.5),
        ],
        faces: vec![Face {
            verts: vec![0, 1, 2, 3],
            material: 0,
        }],
        marked_edges: vec![],
    };
    Scene {
        camera: Some(camera_looking_down_z(8.0)),
        objects: vec![object("flat", flat), object("tilted", tilted)],
        ..Default::default()
    }
}

/// A strip much wider than the view: its long edges cross the screen but
/// both endpoints project far outside NDC space.
pub fn wide_strip_scene() -> Scene {
    let mesh = MeshData {
        positions: vec![
            Vector3::new(-50.0, -0.1, 0.0),
            Vector3::new(50.0, -0.1, 0.0),
            Vector3::new(50.0, 0.1, 0.0),
            Vector3::new(-50.0, 0.1, 0.0),
        ],
        faces: vec![Face {
            verts: vec![0, 1, 2, 3],
            material: 0,
        }],
        marked_edges: vec![],
    };
    Scene {
        camera: Some(camera_looking_down_z(5.0)),
        objects: vec![object("strip", mesh)],
        ..Default::default()
    }
}
