//! Headless heatmap render to PNG.
//!
//! Usage: `heatlayer-demo [OUTPUT.png] [POINT_COUNT]`

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use heatlayer_engine::device::{Gpu, GpuInit, read_rgba8};
use heatlayer_engine::geo::{LngLat, PixelSize, Projection, SphericalMercator};
use heatlayer_engine::logging::{LoggingConfig, init_logging};
use heatlayer_engine::render::ResourceLedger;
use heatlayer_engine::{HeatmapConfig, HeatmapRenderer, Point, RenderCtx, RenderProps, World};

/// Saint Petersburg.
const CENTER: LngLat = LngLat::new(30.3951, 59.9393);
/// Scatter radius in degrees.
const DELTA: f64 = 1.5;
const SEED: u64 = 10_000;
const SIZE: PixelSize = PixelSize::new(512, 512);

fn sign(rng: &mut StdRng) -> f64 {
    if rng.random_bool(0.5) { 1.0 } else { -1.0 }
}

fn random_points(count: usize) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(SEED);

    (0..count)
        .map(|_| {
            let lng = CENTER.lng + rng.random::<f64>() * DELTA * sign(&mut rng);
            let lat = CENTER.lat + rng.random::<f64>() * DELTA * sign(&mut rng);
            Point::new(LngLat::new(lng, lat), rng.random::<f32>())
        })
        .collect()
}

/// A world transform that fits the scatter area into 90% of the frame.
fn framing_world(projection: &dyn Projection) -> World {
    let center = projection.to_world_coordinates(CENTER);
    let corner =
        projection.to_world_coordinates(LngLat::new(CENTER.lng + DELTA, CENTER.lat + DELTA));
    let half = corner - center;

    let scale = 0.9 / half.x.abs().max(half.y.abs());
    let aspect = SIZE.width as f64 / SIZE.height as f64;
    World::scaled(center, [(scale / aspect) as f32, scale as f32])
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let mut args = std::env::args().skip(1);
    let output = args.next().unwrap_or_else(|| "heatmap.png".to_string());
    let count: usize = match args.next() {
        Some(raw) => raw.parse().with_context(|| format!("invalid point count `{raw}`"))?,
        None => 1500,
    };

    let gpu = Gpu::new_blocking(GpuInit::default()).context("failed to create headless GPU")?;
    let info = gpu.adapter_info();
    log::info!("rendering {count} points on {} ({:?})", info.name, info.backend);

    let ledger = ResourceLedger::new();
    let ctx = RenderCtx::new(gpu.device(), gpu.queue(), &ledger);

    let world = framing_world(&SphericalMercator);
    let points = random_points(count);
    let mut layer = HeatmapRenderer::new(
        &ctx,
        Box::new(SphericalMercator),
        Box::new(move || points.clone()),
        HeatmapConfig::default(),
    )
    .context("failed to build heatmap layer")?;

    let mut encoder = gpu.create_encoder("heatlayer demo frame");
    let worlds = [world];
    let out = layer
        .render(&ctx, &mut encoder, &RenderProps { size: SIZE, worlds: &worlds })
        .context("heatmap render failed")?;
    gpu.submit(encoder);

    let stats = out.stats;
    let pixels = read_rgba8(gpu.device(), gpu.queue(), out.color, SIZE)?;
    log::info!(
        "frame done: {} gradient draws, {} colorize draws",
        stats.gradient_draws,
        stats.colorize_draws
    );

    layer.destroy(&ctx).context("failed to destroy heatmap layer")?;
    log::debug!("ledger after destroy: {:?}", ledger.snapshot());

    let image = image::RgbaImage::from_raw(SIZE.width, SIZE.height, pixels)
        .context("readback size does not match the frame")?;
    image
        .save(&output)
        .with_context(|| format!("failed to write {output}"))?;
    log::info!("wrote {output}");

    Ok(())
}
