//! Renderer integration tests on the journaling dummy device.
//!
//! Everything here drives the public [`Renderer`] lifecycle end to end —
//! prepare, record, execute, teardown — and asserts on the exact command
//! stream the frames record, using the dummy device's journal and write
//! counters.
//!
//! # Test Categories
//!
//! - **Frame Shape Tests**: fixed step order of a frame and the draws it
//!   contains
//! - **Uniform Refresh Tests**: camera-keyed uploads happen exactly once
//!   per change
//! - **Capability Tests**: missing optional features degrade to baked
//!   state; a missing logic op fails preparation outright
//! - **Failure Unwind Tests**: a creation failure anywhere in preparation
//!   releases everything already built
//! - **Lifecycle Tests**: state transitions, safe no-ops, idempotent
//!   teardown
//!
//! ```bash
//! cargo test --test renderer_tests
//! ```

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{
    background_uniform_buffer, draw_counts, environment, fan_mesh, layered_scene,
    object_uniform_buffer, prepared, single_cube_scene, FailingDevice,
};
use glam::{Mat4, Vec3};
use marigold_core::material::Material;
use marigold_core::mesh::unit_cube;
use marigold_core::scene::{Background, Node, Scene, SceneMesh, Submesh};
use marigold_graphics::commands::RenderCommand;
use marigold_graphics::device::dummy::DummyDevice;
use marigold_graphics::device::BoundResource;
use marigold_graphics::{
    CommandSequence, DeviceFeatures, DynamicStateSet, Extent2d, LogicOp, OverlayHook,
    PipelineVariant, RenderDevice, RenderError, Renderer, RendererConfig, RendererState,
};

// ============================================================================
// Frame Shape Tests
// ============================================================================

/// One frame of the layered scene has the full fixed step order.
///
/// This test verifies that:
/// 1. The frame begins with the cleared target and ends with EndRendering
/// 2. Viewport and scissor are set before any pipeline is bound
/// 3. Object draws come first, in draw-list order, then the background
/// 4. The object pipeline is bound before the background pipeline
#[test]
fn test_recorded_frame_has_fixed_step_order() {
    let (_, mut renderer) = prepared(&layered_scene());
    let sequence = renderer.record_frame(0).unwrap();
    let commands = sequence.commands();

    assert!(matches!(
        commands[0],
        RenderCommand::BeginRendering { clear_color, clear_depth }
            if clear_color == [0.0; 4] && clear_depth == 0.0
    ));
    assert!(matches!(commands[1], RenderCommand::SetViewport(_)));
    assert!(matches!(commands[2], RenderCommand::SetScissor(_)));
    assert!(matches!(
        commands[commands.len() - 1],
        RenderCommand::EndRendering
    ));

    let object_bind = commands
        .iter()
        .position(|c| {
            matches!(
                c,
                RenderCommand::BindPipeline {
                    variant: PipelineVariant::Object,
                    ..
                }
            )
        })
        .expect("object pipeline should be bound");
    let background_bind = commands
        .iter()
        .position(|c| {
            matches!(
                c,
                RenderCommand::BindPipeline {
                    variant: PipelineVariant::Background,
                    ..
                }
            )
        })
        .expect("background pipeline should be bound");
    assert!(object_bind < background_bind);

    assert_eq!(draw_counts(&sequence), [36, 24, 12, 36]);
    renderer.teardown();
}

/// Draws scale as one per flattened entry plus exactly one background draw.
#[rstest]
#[case::empty(0)]
#[case::single(1)]
#[case::several(5)]
fn test_draw_count_is_entries_plus_background(#[case] node_count: usize) {
    let mut mesh = SceneMesh::new()
        .with_name("instanced")
        .with_submesh(Submesh::new(unit_cube(), Material::default()));
    for i in 0..node_count {
        mesh = mesh.with_node(Node::new(Mat4::from_translation(Vec3::X * i as f32)));
    }
    let scene = Scene::new(Background::new(unit_cube(), environment())).with_mesh(mesh);
    assert_eq!(scene.entry_count(), node_count);

    let (_, mut renderer) = prepared(&scene);
    let sequence = renderer.record_frame(0).unwrap();
    assert_eq!(sequence.draw_count(), node_count + 1);
    renderer.teardown();
}

/// A scene with no object entries still renders the background.
#[test]
fn test_empty_scene_renders_background_only() {
    let scene = Scene::new(Background::new(unit_cube(), environment()));
    let (_, mut renderer) = prepared(&scene);
    let sequence = renderer.record_frame(0).unwrap();

    assert_eq!(draw_counts(&sequence), [36]);
    // The object pass still binds and applies its baseline even when the
    // draw list is empty.
    assert!(sequence.commands().iter().any(|c| {
        matches!(
            c,
            RenderCommand::BindPipeline {
                variant: PipelineVariant::Object,
                ..
            }
        )
    }));
    renderer.teardown();
}

/// Push constants follow mesh → node → submesh flatten order, carrying
/// each entry's world transform and material color.
#[test]
fn test_push_constants_follow_flatten_order() {
    let (_, mut renderer) = prepared(&layered_scene());
    let sequence = renderer.record_frame(0).unwrap();

    let blocks = sequence.push_constant_blocks();
    assert_eq!(blocks.len(), 3);
    let xs: Vec<f32> = blocks.iter().map(|block| block.transform[3][0]).collect();
    assert_eq!(xs, [0.0, 1.0, 2.0]);
    // The fin's translucent green rides along in the second block.
    assert_eq!(blocks[1].color, [0.2, 0.8, 0.2, 0.5]);
    renderer.teardown();
}

/// Per-node transient toggles apply to the requesting draws and reset
/// before the background pass.
#[test]
fn test_node_toggles_reset_before_background() {
    let biased = SceneMesh::new()
        .with_name("biased")
        .with_node(
            Node::new(Mat4::IDENTITY)
                .with_depth_bias(true)
                .with_rasterizer_discard(true),
        )
        .with_submesh(Submesh::new(unit_cube(), Material::default()));
    let plain = SceneMesh::new()
        .with_name("plain")
        .with_node(Node::new(Mat4::from_translation(Vec3::X)))
        .with_submesh(Submesh::new(fan_mesh(8, "plain"), Material::default()));
    let scene = Scene::new(Background::new(unit_cube(), environment()))
        .with_mesh(biased)
        .with_mesh(plain);

    let (_, mut renderer) = prepared(&scene);
    let sequence = renderer.record_frame(0).unwrap();

    let bias: Vec<bool> = sequence
        .commands()
        .iter()
        .filter_map(|c| match c {
            RenderCommand::SetDepthBiasEnable(v) => Some(*v),
            _ => None,
        })
        .collect();
    // Baseline, on for the first node, off for the second, and the
    // unconditional post-loop reset.
    assert_eq!(bias, [false, true, false, false]);

    let background_at = sequence
        .commands()
        .iter()
        .position(|c| {
            matches!(
                c,
                RenderCommand::BindPipeline {
                    variant: PipelineVariant::Background,
                    ..
                }
            )
        })
        .unwrap();
    for command in &sequence.commands()[background_at..] {
        assert!(
            !matches!(
                command,
                RenderCommand::SetDepthBiasEnable(_) | RenderCommand::SetRasterizerDiscard(_)
            ),
            "toggle leaked past the object pass: {command:?}"
        );
    }
    renderer.teardown();
}

/// The background descriptor set carries the uniform block and the
/// environment texture with its sampler.
#[test]
fn test_background_set_carries_environment() {
    let (device, mut renderer) = prepared(&single_cube_scene());
    let sequence = renderer.record_frame(0).unwrap();

    let set = sequence
        .commands()
        .iter()
        .find_map(|command| match command {
            RenderCommand::BindDescriptorSet {
                variant: PipelineVariant::Background,
                set,
            } => Some(*set),
            _ => None,
        })
        .expect("background descriptor set should be bound");

    let resources = device.descriptor_set_resources(set).unwrap();
    assert_eq!(resources.len(), 2);
    assert!(matches!(resources[0], BoundResource::UniformBuffer(_)));
    assert!(matches!(
        resources[1],
        BoundResource::CombinedImageSampler { .. }
    ));
    renderer.teardown();
}

/// The overlay hook records into its slot after the background draw and
/// before the frame ends.
#[test]
fn test_overlay_slot_is_between_background_and_end() {
    struct Marker;
    impl OverlayHook for Marker {
        fn record_overlay(&self, sequence: &mut CommandSequence) {
            sequence.push(RenderCommand::DrawIndexed { index_count: 6 });
        }
    }

    let (device, mut renderer) = prepared(&single_cube_scene());
    renderer.set_overlay(Box::new(Marker));
    renderer.render(0).unwrap();

    let sequence = device.last_sequence().unwrap();
    let commands = sequence.commands();
    assert!(matches!(
        commands[commands.len() - 1],
        RenderCommand::EndRendering
    ));
    assert!(matches!(
        commands[commands.len() - 2],
        RenderCommand::DrawIndexed { index_count: 6 }
    ));
    renderer.teardown();
}

// ============================================================================
// Uniform Refresh Tests
// ============================================================================

/// The camera-keyed refresh writes both uniform blocks exactly once per
/// change, however many frames are recorded in between.
///
/// This test verifies that:
/// 1. Preparation performs the initial upload
/// 2. Recording with an unchanged camera writes nothing
/// 3. One camera mutation leads to exactly one more write per block
#[test]
fn test_uniforms_refresh_exactly_once_per_camera_change() {
    let (device, mut renderer) = prepared(&single_cube_scene());
    assert_eq!(device.buffer_write_count(object_uniform_buffer(&device)), 1);
    assert_eq!(
        device.buffer_write_count(background_uniform_buffer(&device)),
        1
    );

    for frame in 0..4u32 {
        renderer.record_frame(frame % 2).unwrap();
    }
    assert_eq!(device.buffer_write_count(object_uniform_buffer(&device)), 1);
    assert_eq!(
        device.buffer_write_count(background_uniform_buffer(&device)),
        1
    );

    renderer.camera_mut().set_position(Vec3::new(0.0, 1.0, 4.0));
    renderer.record_frame(0).unwrap();
    assert_eq!(device.buffer_write_count(object_uniform_buffer(&device)), 2);
    assert_eq!(
        device.buffer_write_count(background_uniform_buffer(&device)),
        2
    );

    // The flag was consumed; the next frame writes nothing again.
    renderer.record_frame(1).unwrap();
    assert_eq!(device.buffer_write_count(object_uniform_buffer(&device)), 2);
    renderer.teardown();
}

/// Resizing retargets the viewport and re-uploads the matrices with the
/// new aspect ratio.
#[test]
fn test_set_extent_updates_viewport_and_uniforms() {
    let (device, mut renderer) = prepared(&single_cube_scene());
    renderer.record_frame(0).unwrap();
    assert_eq!(device.buffer_write_count(object_uniform_buffer(&device)), 1);

    renderer.set_extent(Extent2d::new(2560, 1440));
    let sequence = renderer.record_frame(1).unwrap();
    assert_eq!(device.buffer_write_count(object_uniform_buffer(&device)), 2);

    let viewport = sequence
        .commands()
        .iter()
        .find_map(|c| match c {
            RenderCommand::SetViewport(v) => Some(*v),
            _ => None,
        })
        .unwrap();
    assert_eq!(viewport.width, 2560.0);
    assert_eq!(viewport.height, 1440.0);
    renderer.teardown();
}

// ============================================================================
// Capability Tests
// ============================================================================

/// Optional categories missing on the device are baked into the pipeline
/// and never emit dynamic commands.
///
/// This test verifies that:
/// 1. Preparation succeeds with any subset of the optional features
/// 2. The object pipeline declares baseline + logic op + surviving options
/// 3. The background pipeline declares the baseline only
/// 4. No command is recorded for a baked category
#[rstest]
#[case::logic_op_only(DeviceFeatures::logic_op_only())]
#[case::no_topology({
    let mut features = DeviceFeatures::all();
    features.dynamic_primitive_topology = false;
    features
})]
#[case::no_toggles({
    let mut features = DeviceFeatures::all();
    features.dynamic_rasterizer_discard = false;
    features.dynamic_depth_bias_enable = false;
    features
})]
fn test_missing_optional_features_are_baked(#[case] features: DeviceFeatures) {
    let device = Arc::new(DummyDevice::with_features(features));
    let mut renderer = Renderer::new(device.clone(), RendererConfig::default());
    renderer.prepare(&single_cube_scene()).unwrap();

    let optional = renderer.capabilities().unwrap().optional_states();
    let sequence = renderer.record_frame(0).unwrap();

    if !optional.contains(DynamicStateSet::PRIMITIVE_TOPOLOGY) {
        assert!(!sequence
            .commands()
            .iter()
            .any(|c| matches!(c, RenderCommand::SetPrimitiveTopology(_))));
    }
    if !optional.contains(DynamicStateSet::PRIMITIVE_RESTART_ENABLE) {
        assert!(!sequence
            .commands()
            .iter()
            .any(|c| matches!(c, RenderCommand::SetPrimitiveRestart(_))));
    }
    if !optional.contains(DynamicStateSet::RASTERIZER_DISCARD_ENABLE) {
        assert!(!sequence
            .commands()
            .iter()
            .any(|c| matches!(c, RenderCommand::SetRasterizerDiscard(_))));
    }
    if !optional.contains(DynamicStateSet::DEPTH_BIAS_ENABLE) {
        assert!(!sequence
            .commands()
            .iter()
            .any(|c| matches!(c, RenderCommand::SetDepthBiasEnable(_))));
    }
    // The mandatory logic op stays dynamic on every device that prepares.
    assert!(sequence
        .commands()
        .iter()
        .any(|c| matches!(c, RenderCommand::SetLogicOp(_))));

    let object_pipeline = sequence
        .commands()
        .iter()
        .find_map(|c| match c {
            RenderCommand::BindPipeline {
                variant: PipelineVariant::Object,
                pipeline,
            } => Some(*pipeline),
            _ => None,
        })
        .unwrap();
    let object_desc = device.pipeline_description(object_pipeline).unwrap();
    assert_eq!(
        object_desc.dynamic,
        DynamicStateSet::BASELINE | DynamicStateSet::LOGIC_OP | optional
    );

    let background_pipeline = sequence
        .commands()
        .iter()
        .find_map(|c| match c {
            RenderCommand::BindPipeline {
                variant: PipelineVariant::Background,
                pipeline,
            } => Some(*pipeline),
            _ => None,
        })
        .unwrap();
    let background_desc = device.pipeline_description(background_pipeline).unwrap();
    assert_eq!(background_desc.dynamic, DynamicStateSet::BASELINE);

    renderer.teardown();
}

/// The blend-stage logic op is mandatory: without it preparation fails
/// and the device is left untouched.
#[test]
fn test_missing_logic_op_fails_prepare() {
    let mut features = DeviceFeatures::all();
    features.dynamic_logic_op = false;
    let device = Arc::new(DummyDevice::with_features(features));
    let mut renderer = Renderer::new(device.clone(), RendererConfig::default());

    let err = renderer.prepare(&single_cube_scene()).unwrap_err();
    assert!(matches!(err, RenderError::MissingCapability(_)));
    assert_eq!(renderer.state(), RendererState::Uninitialized);
    assert_eq!(device.live_resource_count(), 0);
    assert_eq!(device.execution_count(), 0);
}

/// Changing the logic op between frames changes only the value the
/// recording carries, never the stream shape.
#[test]
fn test_logic_op_changes_between_frames() {
    let (_, mut renderer) = prepared(&single_cube_scene());

    let first = renderer.record_frame(0).unwrap();
    renderer.set_logic_op(LogicOp::Xor);
    let second = renderer.record_frame(1).unwrap();

    assert_eq!(first.len(), second.len());
    let logic_op = |sequence: &CommandSequence| {
        sequence.commands().iter().find_map(|c| match c {
            RenderCommand::SetLogicOp(op) => Some(*op),
            _ => None,
        })
    };
    assert_eq!(logic_op(&first), Some(LogicOp::Copy));
    assert_eq!(logic_op(&second), Some(LogicOp::Xor));
    renderer.teardown();
}

// ============================================================================
// Failure Unwind Tests
// ============================================================================

/// A buffer failure partway through a geometry upload releases the buffers
/// the same call already created.
#[test]
fn test_failed_geometry_upload_releases_partial_buffers() {
    let device = FailingDevice::fail_at(2);

    let err = device.create_geometry(&unit_cube()).unwrap_err();
    assert!(matches!(err, RenderError::ResourceCreation(_)));
    assert_eq!(device.live_resource_count(), 0);
}

/// A creation failure anywhere in preparation releases everything built
/// before it.
///
/// The cases walk the fixed creation order of a single-cube prepare: the
/// binder's uniform buffers, environment texture, sampler, layouts and
/// descriptor sets are creation calls 1-8, the cube and background
/// geometry buffers are 9-14, and the two pipelines are 15-16.
///
/// This test verifies that:
/// 1. The device's creation error reaches the caller unchanged
/// 2. The renderer stays uninitialized
/// 3. No resource outlives the failed prepare
#[rstest]
#[case::second_uniform_buffer(2)]
#[case::environment_sampler(4)]
#[case::background_descriptor_set(8)]
#[case::cube_normal_buffer(10)]
#[case::background_index_buffer(14)]
#[case::object_pipeline(15)]
#[case::background_pipeline(16)]
fn test_failed_prepare_releases_everything(#[case] failing_call: u32) {
    let device = Arc::new(FailingDevice::fail_at(failing_call));
    let mut renderer = Renderer::new(device.clone(), RendererConfig::default());

    let err = renderer.prepare(&single_cube_scene()).unwrap_err();
    assert!(matches!(err, RenderError::ResourceCreation(_)));
    assert_eq!(renderer.state(), RendererState::Uninitialized);
    assert_eq!(
        device.live_resource_count(),
        0,
        "a failed prepare must not leave device resources behind"
    );
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

/// A frame loop alternating in-flight indices executes every frame, and a
/// final teardown releases every device resource.
#[test]
fn test_render_loop_executes_every_frame() {
    let (device, mut renderer) = prepared(&layered_scene());

    for frame in 0..6u32 {
        renderer.render(frame % 2).unwrap();
    }
    assert_eq!(device.execution_count(), 6);
    let frame_indices: Vec<u32> = device
        .executed_sequences()
        .iter()
        .map(|s| s.frame_index())
        .collect();
    assert_eq!(frame_indices, [0, 1, 0, 1, 0, 1]);

    renderer.teardown();
    assert_eq!(device.live_resource_count(), 0);
    assert_eq!(renderer.state(), RendererState::Destroyed);
}

/// Rendering before preparation is a logged no-op, and teardown is
/// idempotent in every state.
#[test]
fn test_unprepared_render_and_repeated_teardown_are_safe() {
    let device = Arc::new(DummyDevice::new());
    let mut renderer = Renderer::new(device.clone(), RendererConfig::default());

    renderer.render(0).unwrap();
    assert_eq!(device.execution_count(), 0);
    assert_eq!(renderer.state(), RendererState::Uninitialized);

    renderer.teardown();
    renderer.teardown();
    assert_eq!(renderer.state(), RendererState::Destroyed);

    // Destroyed renderers keep recording nothing.
    assert!(renderer.record_frame(0).unwrap().is_empty());
    assert_eq!(device.execution_count(), 0);
}
