//! End-to-end heatmap layer tests on a headless adapter.
//!
//! Every test returns early when no adapter is available (CI without a GPU or
//! software rasterizer).

use heatlayer_engine::device::{Gpu, GpuInit, read_rgba8};
use heatlayer_engine::geo::{LngLat, PixelSize, SphericalMercator};
use heatlayer_engine::logging::{LoggingConfig, init_logging};
use heatlayer_engine::paint::{Gradient, GradientStop, StopColor};
use heatlayer_engine::render::framebuffer::{COLOR_FORMAT, DEPTH_FORMAT};
use heatlayer_engine::render::{PipelineState, Program, ProgramDesc, ResourceKind, ResourceLedger};
use heatlayer_engine::{
    ContractViolation, HeatmapConfig, HeatmapError, HeatmapRenderer, Point, RenderCtx,
    RenderProps, World,
};

const FRAME: PixelSize = PixelSize::new(64, 64);

fn gpu() -> Option<Gpu> {
    init_logging(LoggingConfig::for_tests());
    match Gpu::new_blocking(GpuInit::default()) {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            println!("Skipping - no GPU adapter: {err:#}");
            None
        }
    }
}

fn origin_point() -> Vec<Point> {
    vec![Point::new(LngLat::new(0.0, 0.0), 1.0)]
}

fn renderer(ctx: &RenderCtx<'_>, points: Vec<Point>, config: HeatmapConfig) -> HeatmapRenderer {
    HeatmapRenderer::new(
        ctx,
        Box::new(SphericalMercator),
        Box::new(move || points.clone()),
        config,
    )
    .expect("renderer should build")
}

fn red_ramp() -> Gradient {
    Gradient::new(vec![
        GradientStop::new(StopColor::rgba(255.0, 255.0, 255.0, 0.0), 0.0),
        GradientStop::new(StopColor::rgba(255.0, 0.0, 0.0, 1.0), 1.0),
    ])
}

fn flat_program<'a>(vertex: &'a str, fragment: &'a str) -> ProgramDesc<'a> {
    ProgramDesc {
        label: "flat",
        vertex_source: vertex,
        fragment_source: fragment,
        attributes: &[],
        uniforms: &[],
        state: PipelineState {
            color_format: COLOR_FORMAT,
            depth_format: DEPTH_FORMAT,
            blend: None,
            depth_write: false,
            depth_compare: wgpu::CompareFunction::Always,
            dynamic_uniforms: false,
        },
    }
}

const FLAT_VS: &str = "
    @vertex fn vs_main() -> @builtin(position) vec4<f32> {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }";

const FLAT_FS: &str = "
    @fragment fn fs_main() -> @location(0) vec4<f32> {
        return vec4<f32>(1.0);
    }";

fn pixel(pixels: &[u8], size: PixelSize, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * size.width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

/// Renders one frame, submits it and reads the layer color back.
fn render_and_read(
    gpu: &Gpu,
    ctx: &RenderCtx<'_>,
    layer: &mut HeatmapRenderer,
    worlds: &[World],
) -> (heatlayer_engine::render::FrameStats, Vec<u8>) {
    let mut encoder = gpu.create_encoder("heatlayer test frame");
    let out = layer
        .render(ctx, &mut encoder, &RenderProps { size: FRAME, worlds })
        .expect("render should succeed");
    gpu.submit(encoder);

    let pixels = read_rgba8(gpu.device(), gpu.queue(), out.color, FRAME).expect("readback");
    (out.stats, pixels)
}

// ── lifecycle ─────────────────────────────────────────────────────────────

#[test]
fn construct_render_destroy_releases_everything() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);

    let mut layer = renderer(&ctx, origin_point(), HeatmapConfig::default());
    let _ = render_and_read(&gpu, &ctx, &mut layer, &[World::identity()]);
    assert!(ledger.total_live() > 0);

    layer.destroy(&ctx).expect("first destroy");

    let snap = ledger.snapshot();
    assert!(snap.is_balanced(), "{snap:?}");
    assert_eq!(ledger.total_live(), 0);
    assert_eq!(snap.allocated_of(ResourceKind::Program), 2);
    assert_eq!(snap.allocated_of(ResourceKind::FrameBuffer), 2);
    // One color sampler per framebuffer; depth is never sampled.
    assert_eq!(snap.allocated_of(ResourceKind::Sampler), 2);
    assert_eq!(snap.allocated_of(ResourceKind::Shader), 4);
}

#[test]
fn use_after_destroy_is_rejected() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);

    let mut layer = renderer(&ctx, origin_point(), HeatmapConfig::default());
    layer.destroy(&ctx).expect("first destroy");
    assert!(layer.is_destroyed());

    let mut encoder = gpu.create_encoder("after destroy");
    let err = layer
        .render(&ctx, &mut encoder, &RenderProps { size: FRAME, worlds: &[World::identity()] })
        .err();
    assert!(matches!(
        err,
        Some(HeatmapError::ContractViolation(ContractViolation::RenderAfterDestroy))
    ));

    assert!(matches!(
        layer.destroy(&ctx),
        Err(HeatmapError::ContractViolation(ContractViolation::AlreadyDestroyed))
    ));
    assert!(layer.refresh_points(&ctx).is_err());
    assert!(ledger.snapshot().is_balanced());
}

#[test]
fn invalid_config_is_rejected_before_allocating() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);

    let stops = (0..12)
        .map(|i| GradientStop::new(StopColor::rgb(255.0, 0.0, 0.0), i as f32 / 11.0))
        .collect();
    let result = HeatmapRenderer::new(
        &ctx,
        Box::new(SphericalMercator),
        Box::new(Vec::new),
        HeatmapConfig::default().with_gradient(Gradient::new(stops)),
    );

    assert!(matches!(
        result.err(),
        Some(HeatmapError::ContractViolation(ContractViolation::TooManyStops { count: 12, .. }))
    ));
    assert_eq!(ledger.total_live(), 0);
}

// ── framebuffer sizing ────────────────────────────────────────────────────

#[test]
fn same_size_frames_do_not_reallocate() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);
    let mut layer = renderer(&ctx, origin_point(), HeatmapConfig::default());

    let (first, _) = render_and_read(&gpu, &ctx, &mut layer, &[World::identity()]);
    let (second, _) = render_and_read(&gpu, &ctx, &mut layer, &[World::identity()]);
    assert_eq!(first.reallocations, 2);
    assert_eq!(second.reallocations, 0);

    let mut encoder = gpu.create_encoder("resize");
    let stats = layer
        .render(
            &ctx,
            &mut encoder,
            &RenderProps { size: PixelSize::new(32, 48), worlds: &[World::identity()] },
        )
        .expect("render")
        .stats;
    gpu.submit(encoder);
    assert_eq!(stats.reallocations, 2);

    layer.destroy(&ctx).expect("destroy");
    assert!(ledger.snapshot().is_balanced());
}

#[test]
fn zero_sized_frame_is_an_allocation_error() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);
    let mut layer = renderer(&ctx, origin_point(), HeatmapConfig::default());

    let mut encoder = gpu.create_encoder("zero size");
    let err = layer
        .render(
            &ctx,
            &mut encoder,
            &RenderProps { size: PixelSize::new(0, 64), worlds: &[World::identity()] },
        )
        .err();
    assert!(matches!(err, Some(HeatmapError::ResourceAllocation { width: 0, .. })));

    layer.destroy(&ctx).expect("destroy");
}

// ── frame contents ────────────────────────────────────────────────────────

#[test]
fn zero_points_produce_a_transparent_layer() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);
    let mut layer = renderer(&ctx, Vec::new(), HeatmapConfig::default());

    let (stats, pixels) = render_and_read(&gpu, &ctx, &mut layer, &[World::identity()]);
    assert_eq!(stats.points, 0);
    assert_eq!(stats.gradient_draws, 0);
    assert_eq!(stats.colorize_draws, 1);
    assert!(pixels.chunks_exact(4).all(|p| p[3] == 0));

    layer.destroy(&ctx).expect("destroy");
}

#[test]
fn zero_worlds_clear_the_layer() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);
    let mut layer = renderer(&ctx, origin_point(), HeatmapConfig::default());

    let _ = render_and_read(&gpu, &ctx, &mut layer, &[World::identity()]);
    let (stats, pixels) = render_and_read(&gpu, &ctx, &mut layer, &[]);
    assert_eq!(stats.gradient_draws + stats.colorize_draws, 0);
    assert!(pixels.iter().all(|&b| b == 0));

    layer.destroy(&ctx).expect("destroy");
}

#[test]
fn single_point_with_red_ramp_is_red_at_center() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);
    let config = HeatmapConfig::default().with_gradient(red_ramp());
    let mut layer = renderer(&ctx, origin_point(), config);

    let (stats, pixels) = render_and_read(&gpu, &ctx, &mut layer, &[World::identity()]);
    assert_eq!(stats.gradient_draws, 1);

    let [r, g, b, a] = pixel(&pixels, FRAME, 32, 32);
    assert!(r > 230, "red {r}");
    assert!(g < 51 && b < 51, "green {g} blue {b}");
    assert!(a > 204, "alpha {a}");

    // Sprite diameter is 32 px, so the corners are far outside it.
    assert_eq!(pixel(&pixels, FRAME, 0, 0), [0, 0, 0, 0]);
    assert_eq!(pixel(&pixels, FRAME, 63, 63), [0, 0, 0, 0]);

    layer.destroy(&ctx).expect("destroy");
}

#[test]
fn duplicate_worlds_draw_each_pass_per_world_and_accumulate() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);
    let config = HeatmapConfig::default().with_gradient(red_ramp());
    let mut layer = renderer(&ctx, origin_point(), config);

    let (_, single) = render_and_read(&gpu, &ctx, &mut layer, &[World::identity()]);
    let (stats, double) =
        render_and_read(&gpu, &ctx, &mut layer, &[World::identity(), World::identity()]);

    assert_eq!(stats.worlds, 2);
    assert_eq!(stats.gradient_draws, 2);
    assert_eq!(stats.colorize_draws, 2);

    let once = pixel(&single, FRAME, 32, 32)[3];
    let twice = pixel(&double, FRAME, 32, 32)[3];
    assert!(twice > once, "{twice} <= {once}");

    layer.destroy(&ctx).expect("destroy");
    assert!(ledger.snapshot().is_balanced());
}

#[test]
fn refresh_points_replaces_point_buffers() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);

    let mut calls = 0;
    let accessor = move || {
        calls += 1;
        (0..calls).map(|i| Point::new(LngLat::new(i as f64, 0.0), 1.0)).collect()
    };
    let mut layer = HeatmapRenderer::new(
        &ctx,
        Box::new(SphericalMercator),
        Box::new(accessor),
        HeatmapConfig::default(),
    )
    .expect("renderer should build");
    assert_eq!(layer.point_count(), 1);

    let buffers_before = ledger.live(ResourceKind::Buffer);
    assert_eq!(layer.refresh_points(&ctx).expect("refresh"), 2);
    assert_eq!(layer.point_count(), 2);
    assert_eq!(ledger.live(ResourceKind::Buffer), buffers_before);

    layer.destroy(&ctx).expect("destroy");
    assert!(ledger.snapshot().is_balanced());
}

#[test]
fn one_stop_gradient_discards_density_past_the_stop() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);
    let red = StopColor::rgba(255.0, 0.0, 0.0, 1.0);
    let one_stop = Gradient::new(vec![GradientStop::new(red, 0.5)]);
    let config = HeatmapConfig::default().with_gradient(one_stop);
    let mut layer = renderer(&ctx, origin_point(), config);

    let (stats, pixels) = render_and_read(&gpu, &ctx, &mut layer, &[World::identity()]);
    assert_eq!(stats.colorize_draws, 1);

    // Density falls off linearly over the 16 px radius: near 1.0 at the
    // center, about 0.25 at 12 px out.
    assert_eq!(pixel(&pixels, FRAME, 32, 32), [0, 0, 0, 0]);
    let [r, g, b, a] = pixel(&pixels, FRAME, 44, 32);
    assert!(r > 230 && a > 230, "red {r} alpha {a}");
    assert!(g < 26 && b < 26, "green {g} blue {b}");

    layer.destroy(&ctx).expect("destroy");
}

// ── program building ──────────────────────────────────────────────────────

#[test]
fn invalid_wgsl_is_a_shader_build_error() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);

    let broken = "
        @vertex fn vs_main() -> @builtin(position) vec4<f32> {
            return undefined_value;
        }";
    let err = Program::build(&ctx, &flat_program(broken, FLAT_FS)).err();
    let Some(HeatmapError::ShaderBuild { label, message }) = err else {
        panic!("expected a shader build error");
    };
    assert_eq!(label, "flat vertex");
    assert!(!message.is_empty());
    assert_eq!(ledger.total_live(), 0);

    let program = Program::build(&ctx, &flat_program(FLAT_VS, FLAT_FS)).expect("valid program");
    program.destroy(&ledger);
    assert!(ledger.snapshot().is_balanced());
}

#[test]
fn mismatched_stage_interfaces_fail_to_link() {
    let Some(gpu) = gpu() else { return };
    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);

    let needs_varying = "
        @fragment fn fs_main(@location(0) v_missing: vec4<f32>) -> @location(0) vec4<f32> {
            return v_missing;
        }";
    let err = Program::build(&ctx, &flat_program(FLAT_VS, needs_varying)).err();
    assert!(
        matches!(&err, Some(HeatmapError::ShaderBuild { label, .. }) if label == "flat pipeline"),
        "{err:?}"
    );
    assert_eq!(ledger.total_live(), 0);
}
