//! Demo: extracts feature lines from a unit cube and dumps the trace.
use line_art::prelude::*;
use line_art::scene::Face;
use nalgebra::{Matrix4, Vector3};

fn cube_scene() -> Scene {
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
        [0u32, 3, 2, 1],
        [4, 5, 6, 7],
        [0, 1, 5, 4],
        [2, 3, 7, 6],
        [1, 2, 6, 5],
        [0, 4, 7, 3],
    ];
    let mesh = MeshData {
        positions,
        faces: quads
            .iter()
            .map(|q| Face {
                verts: q.to_vec(),
                material: 0,
            })
            .collect(),
        marked_edges: vec![],
    };
    Scene {
        camera: Some(Camera {
            projection: Projection::Perspective {
                fov_y: std::f64::consts::FRAC_PI_3,
            },
            // Looking down -Z from z = 8.
            matrix: Matrix4::new(
                1.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
                0.0, 0.0, 1.0, 8.0,
                0.0, 0.0, 0.0, 1.0,
            ),
            clip_start: 0.1,
            clip_end: 100.0,
            shift_x: 0.0,
            shift_y: 0.0,
        }),
        objects: vec![SceneObject {
            name: "cube".into(),
            transform: Matrix4::identity(),
            mesh,
            usage: Default::default(),
        }],
        ..Default::default()
    }
}

fn main() {
    let mut engine = LineArtEngine::new(LineArtParams {
        chaining: true,
        ..Default::default()
    });
    match engine.process(&cube_scene()) {
        Ok(report) => {
            println!(
                "contours={} creases={} chains={} latency_ms={:.3}",
                report.result.contour_count,
                report.result.crease_count,
                report.result.chain_count,
                report.result.latency_ms
            );
            match serde_json::to_string_pretty(&report.trace) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("trace serialization failed: {}", e),
            }
        }
        Err(e) => eprintln!("feature-line computation failed: {}", e),
    }
}
