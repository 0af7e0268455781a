//! # Headless Demo
//!
//! Demonstrates:
//! - Full renderer lifecycle without a window: prepare, frame loop, teardown
//! - An orbiting camera driving the once-per-change uniform refresh
//! - Per-node depth bias on the hub mesh
//! - Cycling through every framebuffer logic operation (`--cycle-logic-ops`)
//! - Backend selection between the journaling dummy device and native Vulkan
//!
//! The scene is a ring of cubes around a translucent fan, over a gradient
//! environment background.

use std::sync::Arc;

use clap::Parser;
use glam::{Mat4, Vec3, Vec4};

use marigold_core::material::Material;
use marigold_core::mesh::{unit_cube, CpuMesh};
use marigold_core::scene::{Background, Node, Scene, SceneMesh, Submesh};
use marigold_core::texture::CpuTexture;
use marigold_graphics::device::dummy::DummyDevice;
use marigold_graphics::device::vulkan::{VulkanDevice, VulkanDeviceConfig};
use marigold_graphics::{
    Extent2d, LogicOp, RenderDevice, RenderError, Renderer, RendererConfig,
};

// === CLI ===

/// Render device to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum DemoBackend {
    /// Journaling device; records every frame without touching a GPU.
    #[default]
    Dummy,
    /// Native Vulkan device rendering offscreen.
    Vulkan,
}

/// Marigold headless demo arguments.
#[derive(Parser, Debug)]
#[command(
    name = "headless_demo",
    about = "Spin a demo scene through the Marigold renderer without a window",
    version
)]
struct Args {
    /// Render device to drive.
    #[arg(long, default_value = "dummy", value_enum)]
    backend: DemoBackend,

    /// Number of frames to render before exiting.
    #[arg(long, default_value = "180")]
    frames: u32,

    /// Render target width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Render target height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Step through every framebuffer logic operation while rendering.
    #[arg(long)]
    cycle_logic_ops: bool,

    /// Disable Vulkan validation layers.
    #[arg(long)]
    no_validation: bool,
}

// === Scene ===

/// Triangle fan in the XY plane: a center vertex and two rim vertices per
/// blade, all facing +Z.
fn fan(blades: u16, label: &str) -> CpuMesh {
    let mut positions = vec![[0.0, 0.0, 0.0]];
    let mut indices = Vec::with_capacity(blades as usize * 3);
    for blade in 0..blades {
        let arc = std::f32::consts::TAU / blades as f32;
        let start = blade as f32 * arc;
        positions.push([start.cos(), start.sin(), 0.0]);
        positions.push([(start + arc * 0.8).cos(), (start + arc * 0.8).sin(), 0.0]);
        indices.extend_from_slice(&[0, blade * 2 + 1, blade * 2 + 2]);
    }
    let normals = vec![[0.0, 0.0, 1.0]; positions.len()];
    CpuMesh::new()
        .with_positions(positions)
        .with_normals(normals)
        .with_indices_u16(&indices)
        .with_label(label)
}

/// Vertical night-sky gradient for the background pass.
fn gradient_environment() -> CpuTexture {
    const SIZE: u32 = 64;
    let mut pixels = Vec::with_capacity((SIZE * SIZE * 4) as usize);
    for y in 0..SIZE {
        let t = y as f32 / (SIZE - 1) as f32;
        let r = (12.0 + 48.0 * t) as u8;
        let g = (16.0 + 72.0 * t) as u8;
        let b = (48.0 + 160.0 * t) as u8;
        for _ in 0..SIZE {
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    CpuTexture::new(SIZE, SIZE, pixels).with_label("environment")
}

fn build_scene() -> Scene {
    let mut ring = SceneMesh::new()
        .with_name("ring")
        .with_submesh(Submesh::new(
            unit_cube(),
            Material::new(Vec4::new(0.9, 0.6, 0.2, 1.0)),
        ));
    for i in 0..6 {
        let angle = i as f32 * std::f32::consts::TAU / 6.0;
        ring = ring.with_node(Node::new(
            Mat4::from_rotation_y(angle) * Mat4::from_translation(Vec3::X * 2.2),
        ));
    }

    let hub = SceneMesh::new()
        .with_name("hub")
        .with_node(Node::new(Mat4::IDENTITY).with_depth_bias(true))
        .with_submesh(Submesh::new(
            fan(12, "hub_fan"),
            Material::new(Vec4::new(0.2, 0.8, 0.9, 0.4)),
        ));

    Scene::new(Background::new(unit_cube(), gradient_environment()))
        .with_mesh(ring)
        .with_mesh(hub)
}

// === Frame loop ===

fn run<D: RenderDevice>(device: Arc<D>, args: &Args) -> Result<(), RenderError> {
    log::info!("rendering on '{}'", device.name());

    let scene = build_scene();
    let config =
        RendererConfig::default().with_extent(Extent2d::new(args.width, args.height));
    let frames_in_flight = config.frames_in_flight;

    let mut renderer = Renderer::new(device, config);
    renderer.prepare(&scene)?;
    if let Some(capabilities) = renderer.capabilities() {
        log::info!(
            "scene: {} object draws + background, optional dynamic states {:?}",
            scene.entry_count(),
            capabilities.optional_states()
        );
    }

    for frame in 0..args.frames {
        let angle = frame as f32 * 0.02;
        renderer
            .camera_mut()
            .set_position(Vec3::new(4.0 * angle.cos(), 1.5, 4.0 * angle.sin()));

        if args.cycle_logic_ops && frame % 24 == 0 {
            let op = LogicOp::ALL[(frame as usize / 24) % LogicOp::ALL.len()];
            log::info!("frame {frame}: logic op -> {}", op.name());
            renderer.set_logic_op(op);
        }

        renderer.render(frame % frames_in_flight)?;
        if (frame + 1) % 60 == 0 {
            log::info!("rendered {} frames", frame + 1);
        }
    }

    renderer.teardown();
    Ok(())
}

// === Entry Point ===

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Starting Marigold headless demo ({:?} backend)", args.backend);

    let result = match args.backend {
        DemoBackend::Dummy => run(Arc::new(DummyDevice::new()), &args),
        DemoBackend::Vulkan => VulkanDevice::with_config(&VulkanDeviceConfig {
            extent: Extent2d::new(args.width, args.height),
            validation: !args.no_validation,
        })
        .and_then(|device| run(Arc::new(device), &args)),
    };

    if let Err(err) = result {
        log::error!("demo failed: {err}");
        std::process::exit(1);
    }
    log::info!("demo finished");
}
