//! Integration tests for particle configuration and runtime controls.
//!
//! Everything here runs without a GPU: settings flow from command-line
//! flags through the defines file into draw protocols and widget edits.

use std::fs;
use std::path::PathBuf;

use vbparts_core::RuntimeSettings;
use vbparts_renderer::frame::{
    Acquired, FrameCursor, FrameState, classify_acquire, classify_present,
};
use vbparts_renderer::particles::settings::{MAX_PARTICLE_COUNT, TEXTURED_COMPLEXITY};
use vbparts_renderer::particles::{DrawProtocol, fragment_shader, particle_texture};
use vbparts_renderer::ubo::UploadTracker;
use vbparts_renderer::{GenerationMode, ParticleSettings, Rebuild, TechniqueKind, WidgetState};
use vbparts_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use vbparts_rhi::vk;

fn defines_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "vbparts_it_{}_{}.defines",
        name,
        std::process::id()
    ));
    fs::write(
        &path,
        "#define PARTICLE_COMPLEXITY_1\n#define PARTICLE_CUTOUT_MODE_0\n",
    )
    .unwrap();
    path
}

fn widgets(settings: &ParticleSettings, technique: TechniqueKind) -> WidgetState {
    WidgetState {
        show_ui: true,
        technique,
        debug_view: 0,
        particles_only: true,
        mode: settings.mode(),
        count: settings.count(),
        complexity: settings.complexity(),
        cutout: settings.cutout(),
        half_size: settings.half_size,
        spread: settings.density,
        gravity: settings.gravity,
        initial_upwards_force: settings.initial_upwards_force,
    }
}

#[test]
fn test_flags_flow_into_defines_and_draw_protocol() {
    let path = defines_file("flags");
    let runtime = RuntimeSettings::parse_args([
        "vbparts",
        "-pmode:co",
        "-pcount:1000",
        "-cutout:1",
        "-shadercomp:0",
    ])
    .unwrap();
    let settings = ParticleSettings::load(&runtime, &path).unwrap();

    assert_eq!(settings.mode(), GenerationMode::Compute);
    assert!(settings.cutout());
    assert_eq!(settings.complexity(), TEXTURED_COMPLEXITY);
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("PARTICLE_COMPLEXITY_2"));
    assert!(contents.contains("PARTICLE_CUTOUT_MODE_1"));

    let protocol = DrawProtocol::new(settings.mode(), settings.count());
    assert_eq!(protocol.vertex_count, 6000);
    assert_eq!(protocol.dispatch_groups, Some(4));
    assert_eq!(protocol.storage_records(), 6000);

    let technique = TechniqueKind::Visibility;
    assert_eq!(fragment_shader(technique, settings.mode()), "comp_particles_v");
    assert_eq!(
        particle_texture(technique, settings.complexity(), settings.cutout()),
        Some("leaf.png")
    );

    fs::remove_file(path).unwrap();
}

#[test]
fn test_widget_edits_classify_rebuilds() {
    let path = defines_file("widgets");
    let settings = ParticleSettings::load(&RuntimeSettings::default(), &path).unwrap();
    let before = widgets(&settings, TechniqueKind::Visibility);

    let mut after = before;
    after.count = u32::MAX;
    let after = after.clamped();
    assert_eq!(after.count, MAX_PARTICLE_COUNT);
    assert_eq!(after.rebuild_from(&before), Rebuild::Swapchain);

    let mut after = before;
    after.gravity = 0.5;
    after.spread = 0.6;
    assert_eq!(after.clamped().rebuild_from(&before), Rebuild::None);

    let mut after = before;
    after.particles_only = false;
    assert_eq!(after.rebuild_from(&before), Rebuild::Repaint);

    fs::remove_file(path).unwrap();
}

#[test]
fn test_geometry_modes_shrink_draws() {
    let count = 1024 * 1024;
    let geometry = DrawProtocol::new(GenerationMode::GeometryExpansion, count);
    let hybrid = DrawProtocol::new(GenerationMode::VertexGeometry, count);
    let vertex = DrawProtocol::new(GenerationMode::VertexExpansion, count);

    assert_eq!(geometry.vertex_count, count.div_ceil(28));
    assert_eq!(hybrid.vertex_count, count);
    assert_eq!(vertex.vertex_count, count * 6);
    assert!(geometry.dispatch_groups.is_none());
    assert_eq!(vertex.storage_records(), 0);
}

#[test]
fn test_unchanged_uniform_stops_uploading() {
    let copies = 3;
    let mut tracker = UploadTracker::new(copies);
    let mut uploads = 0;
    for frame in 0..12 {
        if tracker.should_upload(frame % copies, 7u32) {
            uploads += 1;
        }
    }
    assert_eq!(uploads, copies);
    assert_eq!(tracker.stale_copies(), 0);

    assert!(tracker.should_upload(0, 8));
    assert_eq!(tracker.stale_copies(), copies - 1);
}

#[test]
fn test_stale_frames_keep_slot() {
    let mut cursor = FrameCursor::new();

    // A presented frame advances
    assert_eq!(classify_acquire(Ok((0, false))).unwrap(), Acquired::Image(0));
    cursor.enter(FrameState::Acquiring);
    cursor.enter(FrameState::GraphicsSubmitted);
    cursor.enter(FrameState::Presenting);
    assert!(!classify_present(Ok(false), false).unwrap());
    cursor.advance();
    assert_eq!(cursor.slot(), 1 % MAX_FRAMES_IN_FLIGHT);

    // A stale acquire rebuilds without advancing
    assert_eq!(
        classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
        Acquired::Stale
    );
    cursor.enter(FrameState::ComputeSubmitted);
    cursor.enter(FrameState::Acquiring);
    cursor.enter(FrameState::Resizing);
    cursor.finish_rebuild();
    assert_eq!(cursor.slot(), 1 % MAX_FRAMES_IN_FLIGHT);
    assert_eq!(cursor.state(), FrameState::Idle);
}
