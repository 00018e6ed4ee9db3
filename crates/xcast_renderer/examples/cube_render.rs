//! Render a unit cube specimen from a rotated pose.
//!
//! Run with: cargo run --example cube_render
//! Optionally pass a binary STL file: cargo run --example cube_render -- specimen.stl

use std::env;
use std::sync::Arc;
use std::time::Instant;

use xcast_core::{load_stl, Mesh};
use xcast_math::Vec3;
use xcast_renderer::{ColorMode, Engine, RenderSettings, Scene};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut mesh = if args.len() > 1 {
        println!("Loading specimen: {}", &args[1]);
        match load_stl(&args[1]) {
            Ok(mesh) => mesh,
            Err(e) => {
                eprintln!("Failed to load {}: {}", &args[1], e);
                return;
            }
        }
    } else {
        println!("No STL given, using the built-in unit cube");
        unit_cube()
    };
    mesh.center_to_origin();
    println!(
        "Specimen: {} triangles, {} vertices",
        mesh.triangle_count(),
        mesh.vertex_count()
    );

    let settings = RenderSettings {
        thread_grid_x: 4,
        thread_grid_y: 4,
        min_tri_per_node: 2,
        max_penetration: 2.0,
        ..Default::default()
    };

    // Build the scene and its BSP tree
    let start = Instant::now();
    let scene = match Scene::from_mesh(&mesh, &settings) {
        Ok(scene) => Arc::new(scene),
        Err(e) => {
            eprintln!("Scene build failed: {}", e);
            return;
        }
    };
    println!(
        "Scene built in {:?} (tree depth {})",
        start.elapsed(),
        scene.tree().depth()
    );

    // Render from a tilted pose
    let mut engine = Engine::new(scene, settings, 512, 512);
    engine.set_rotation(0.4, 0.6, 0.0);

    let start = Instant::now();
    engine.render(ColorMode::Penetration, false);
    println!("Penetration render in {:?}", start.elapsed());
    println!(
        "  avg penetration {:.4}, max {:.4}",
        engine.last_avg_penetration(),
        engine.report().max_penetration
    );
    if let Err(e) = engine.screen().save_png("penetration.png") {
        eprintln!("Failed to save penetration.png: {}", e);
    }

    let start = Instant::now();
    engine.render(ColorMode::DipAngle, false);
    println!("Dip-angle render in {:?}", start.elapsed());
    println!(
        "  avg dip |cos| {:.4}, bad surface {:.1}%",
        engine.last_avg_dip_angle(),
        engine.report().bad_area_percent * 100.0
    );
    if let Err(e) = engine.screen().save_png("dip_angle.png") {
        eprintln!("Failed to save dip_angle.png: {}", e);
    }

    println!("Saved penetration.png and dip_angle.png");
}

fn unit_cube() -> Mesh {
    let p = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
    let positions = vec![
        p(0.0, 0.0, 0.0),
        p(1.0, 0.0, 0.0),
        p(1.0, 1.0, 0.0),
        p(0.0, 1.0, 0.0),
        p(0.0, 0.0, 1.0),
        p(1.0, 0.0, 1.0),
        p(1.0, 1.0, 1.0),
        p(0.0, 1.0, 1.0),
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // z = 0
        4, 5, 6, 4, 6, 7, // z = 1
        0, 1, 5, 0, 5, 4, // y = 0
        3, 6, 2, 3, 7, 6, // y = 1
        0, 4, 7, 0, 7, 3, // x = 0
        1, 2, 6, 1, 6, 5, // x = 1
    ];
    Mesh::new(positions, indices, None)
}
