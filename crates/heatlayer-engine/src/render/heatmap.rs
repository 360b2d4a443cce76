//! Two-pass heatmap layer.
//!
//! Per world transform:
//! 1. gradient pass: every point is splatted as a soft sprite into the
//!    gradient framebuffer; overlapping sprites accumulate alpha (density)
//! 2. colorize pass: a full-screen quad samples that alpha, remaps it through
//!    the color ramp and blends the result into the main framebuffer
//!
//! The main framebuffer is cleared once per frame, so several worlds (map
//! copies across the antimeridian) add up in the layer output.

use crate::config::HeatmapConfig;
use crate::data::{Point, VertexData};
use crate::error::{ContractViolation, HeatmapError, Result};
use crate::geo::{PixelSize, Projection, WorldCoordinates};
use crate::paint::MappedGradient;

use super::RenderCtx;
use super::draw_buffer::DrawBuffer;
use super::framebuffer::{self, COLOR_FORMAT, DEPTH_FORMAT, FrameBuffer, PassLoad};
use super::ledger::{ResourceKind, ResourceLedger};
use super::program::{AttributeDesc, DrawCall, PipelineState, Program, ProgramDesc};
use super::uniforms::{UniformBlock, UniformRing};

const GRADIENT_VS: &str = include_str!("shaders/gradient.vert.wgsl");
const GRADIENT_FS: &str = include_str!("shaders/gradient.frag.wgsl");
const COLORIZE_VS: &str = include_str!("shaders/colorize.vert.wgsl");
const COLORIZE_FS: &str = include_str!("shaders/colorize.frag.wgsl");

const SPLAT_UNIFORMS: &[&str] = &[
    "u_view_projection",
    "u_look_at",
    "u_viewport",
    "u_size",
    "u_density",
    "u_max",
    "u_blur",
];

const COLORIZE_UNIFORMS: &[&str] = &[
    "u_gradient",
    "u_gradient_sampler",
    "u_color_arr",
    "u_offset",
    "u_stop_count",
    "u_opacity",
];

/// Two triangles covering NDC.
#[rustfmt::skip]
const QUAD_VERTICES: [f32; 12] = [
    -1.0, -1.0,   1.0, -1.0,  -1.0,  1.0,
    -1.0,  1.0,   1.0, -1.0,   1.0,  1.0,
];

#[rustfmt::skip]
const QUAD_TEX_COORDS: [f32; 12] = [
    0.0, 0.0,   1.0, 0.0,   0.0, 1.0,
    0.0, 1.0,   1.0, 0.0,   1.0, 1.0,
];

/// Vertices per sprite or quad.
const QUAD_VERTEX_COUNT: u32 = 6;

/// Blocks reserved up front; one world is the common case, wrapped maps use two.
const INITIAL_WORLD_CAPACITY: usize = 2;

/// One rendered copy of the map.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct World {
    /// World-plane origin of this copy; points are shifted by `-look_at`.
    pub look_at: WorldCoordinates,
    /// Column-major view-projection matrix.
    pub view_proj: [f32; 16],
}

#[rustfmt::skip]
const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

impl World {
    #[inline]
    pub const fn new(look_at: WorldCoordinates, view_proj: [f32; 16]) -> Self {
        Self { look_at, view_proj }
    }

    /// World origin with an identity transform: world units are NDC.
    pub const fn identity() -> Self {
        Self::new(WorldCoordinates::origin(), IDENTITY)
    }

    /// Centers `look_at` and scales world units per axis into NDC.
    pub fn scaled(look_at: WorldCoordinates, scale: [f32; 2]) -> Self {
        let mut view_proj = IDENTITY;
        view_proj[0] = scale[0];
        view_proj[5] = scale[1];
        Self::new(look_at, view_proj)
    }
}

/// Per-frame input.
#[derive(Debug, Copy, Clone)]
pub struct RenderProps<'a> {
    pub size: PixelSize,
    pub worlds: &'a [World],
}

/// What one `render` call did.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameStats {
    pub worlds: usize,
    pub gradient_draws: u32,
    pub colorize_draws: u32,
    pub points: u32,
    /// Framebuffer storage reallocations caused by this frame.
    pub reallocations: u32,
}

/// The layer's color and depth attachments after a frame.
///
/// Colors use `ONE, ONE_MINUS_SRC_ALPHA` blending and are meant to be
/// composited the same way.
pub struct LayerOutput<'a> {
    pub color: &'a wgpu::Texture,
    pub depth: &'a wgpu::Texture,
    pub color_view: &'a wgpu::TextureView,
    pub depth_view: &'a wgpu::TextureView,
    pub stats: FrameStats,
}

/// Returns the current point set.
pub type PointAccessor = Box<dyn FnMut() -> Vec<Point>>;

pub struct HeatmapRenderer {
    projection: Box<dyn Projection>,
    accessor: PointAccessor,
    config: HeatmapConfig,
    gradient: MappedGradient,
    state: State,
}

enum State {
    Live(Box<Resources>),
    Destroyed,
}

/// Every GPU object the layer owns.
struct Resources {
    main: FrameBuffer,
    gradient: FrameBuffer,

    splat: Program,
    colorize: Program,

    positions: DrawBuffer,
    intensities: DrawBuffer,
    quad_vertices: DrawBuffer,
    quad_tex_coords: DrawBuffer,

    splat_uniforms: UniformRing,
    ramp_uniforms: wgpu::Buffer,
    ramp_block_size: u64,

    /// Colorize inputs; rebuilt when the gradient storage moves.
    colorize_group: Option<(u64, wgpu::BindGroup)>,
}

impl HeatmapRenderer {
    /// Builds both programs, both framebuffers and the static buffers, and
    /// uploads the current point set.
    pub fn new(
        ctx: &RenderCtx<'_>,
        projection: Box<dyn Projection>,
        mut accessor: PointAccessor,
        config: HeatmapConfig,
    ) -> Result<Self> {
        config.validate()?;
        let gradient = config.gradient.mapped();

        let splat = Program::build(ctx, &splat_desc())?;
        let colorize = match Program::build(ctx, &colorize_desc()) {
            Ok(program) => program,
            Err(err) => {
                splat.destroy(ctx.ledger);
                return Err(err);
            }
        };

        let main = FrameBuffer::create(ctx, "heatlayer main");
        let gradient_fb = FrameBuffer::create(ctx, "heatlayer gradient");

        let points = accessor();
        let data = VertexData::build(projection.as_ref(), &points);
        let (positions, intensities) = upload_points(ctx, &data);

        let quad_vertices = DrawBuffer::from_f32(ctx, "heatlayer quad vertices", &QUAD_VERTICES, 2);
        let quad_tex_coords =
            DrawBuffer::from_f32(ctx, "heatlayer quad tex coords", &QUAD_TEX_COORDS, 2);

        let splat_block_size = splat.uniform_block_size(0).unwrap_or(0);
        let splat_uniforms = UniformRing::new(
            ctx,
            "heatlayer splat uniforms",
            splat.bind_group_layout(),
            splat_block_size,
            INITIAL_WORLD_CAPACITY,
        );

        let ramp = ramp_block(&colorize, &gradient, config.opacity);
        let ramp_uniforms = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("heatlayer ramp uniforms"),
            size: ramp.size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue.write_buffer(&ramp_uniforms, 0, ramp.as_bytes());
        ctx.ledger.allocated(ResourceKind::Buffer);

        log::debug!(
            "heatmap layer ready: {} points, {} gradient stops, sprite {} px",
            positions.count(),
            gradient.len(),
            config.sprite_diameter()
        );

        Ok(Self {
            projection,
            accessor,
            config,
            gradient,
            state: State::Live(Box::new(Resources {
                main,
                gradient: gradient_fb,
                splat,
                colorize,
                positions,
                intensities,
                quad_vertices,
                quad_tex_coords,
                splat_uniforms,
                ramp_uniforms,
                ramp_block_size: ramp.size(),
                colorize_group: None,
            })),
        })
    }

    #[inline]
    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    /// The ramp as uploaded to the colorize pass.
    #[inline]
    pub fn mapped_gradient(&self) -> &MappedGradient {
        &self.gradient
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, State::Destroyed)
    }

    /// Points currently uploaded.
    pub fn point_count(&self) -> u32 {
        match &self.state {
            State::Live(res) => res.positions.count(),
            State::Destroyed => 0,
        }
    }

    /// Records both passes for every world into `encoder`.
    ///
    /// Validation happens before anything is recorded: on error the encoder is
    /// untouched and the host can skip the frame.
    ///
    /// Per-world splat uniforms go through `queue.write_buffer` into one ring
    /// owned by the renderer, and queued writes land before any later
    /// submission. Submit `encoder` before calling `render` again: two calls
    /// recorded into unsubmitted encoders both read the second call's uniforms.
    pub fn render(
        &mut self,
        ctx: &RenderCtx<'_>,
        encoder: &mut wgpu::CommandEncoder,
        props: &RenderProps<'_>,
    ) -> Result<LayerOutput<'_>> {
        let State::Live(res) = &mut self.state else {
            return Err(ContractViolation::RenderAfterDestroy.into());
        };
        framebuffer::validate_size(ctx.device, props.size)?;

        let mut stats = FrameStats {
            worlds: props.worlds.len(),
            points: res.positions.count(),
            ..FrameStats::default()
        };

        stats.reallocations += res.gradient.bind(ctx, props.size)? as u32;
        stats.reallocations += res.main.bind(ctx, props.size)? as u32;

        res.splat_uniforms
            .ensure_capacity(ctx, res.splat.bind_group_layout(), props.worlds.len());
        let blocks: Vec<UniformBlock> = props
            .worlds
            .iter()
            .map(|world| splat_block(&res.splat, &self.config, props.size, world))
            .collect();
        res.splat_uniforms.write(ctx.queue, &blocks);
        res.ensure_colorize_group(ctx);

        log::trace!(
            "heatmap frame {}x{}: {} worlds, {} points",
            props.size.width,
            props.size.height,
            props.worlds.len(),
            stats.points
        );

        let Some((_, colorize_group)) = &res.colorize_group else {
            return Err(unbound(props.size));
        };

        if props.worlds.is_empty() {
            // Nothing to draw, but the output must not show a stale frame.
            let _pass = res
                .main
                .begin_pass(encoder, PassLoad::Clear)
                .ok_or_else(|| unbound(props.size))?;
        }

        for (index, _world) in props.worlds.iter().enumerate() {
            {
                let mut pass = res
                    .gradient
                    .begin_pass(encoder, PassLoad::Clear)
                    .ok_or_else(|| unbound(props.size))?;

                if !res.positions.is_empty() {
                    res.splat.draw(
                        &mut pass,
                        &DrawCall {
                            bind_group: res.splat_uniforms.bind_group(),
                            dynamic_offsets: &[res.splat_uniforms.offset(index)],
                            buffers: &[
                                ("a_position", &res.positions),
                                ("a_intensity", &res.intensities),
                            ],
                            vertices: 0..QUAD_VERTEX_COUNT,
                            instances: 0..res.positions.count(),
                        },
                    );
                    stats.gradient_draws += 1;
                }
            }

            {
                let load = if index == 0 { PassLoad::Clear } else { PassLoad::Keep };
                let mut pass =
                    res.main.begin_pass(encoder, load).ok_or_else(|| unbound(props.size))?;

                res.colorize.draw(
                    &mut pass,
                    &DrawCall {
                        bind_group: colorize_group,
                        dynamic_offsets: &[],
                        buffers: &[
                            ("a_position", &res.quad_vertices),
                            ("a_tex_coord", &res.quad_tex_coords),
                        ],
                        vertices: 0..res.quad_vertices.count(),
                        instances: 0..1,
                    },
                );
                stats.colorize_draws += 1;
            }
        }

        let main = &res.main;
        match (main.color(), main.depth(), main.color_view(), main.depth_view()) {
            (Some(color), Some(depth), Some(color_view), Some(depth_view)) => Ok(LayerOutput {
                color,
                depth,
                color_view,
                depth_view,
                stats,
            }),
            _ => Err(unbound(props.size)),
        }
    }

    /// Re-reads the point set and replaces both point buffers.
    pub fn refresh_points(&mut self, ctx: &RenderCtx<'_>) -> Result<u32> {
        let State::Live(res) = &mut self.state else {
            return Err(ContractViolation::RenderAfterDestroy.into());
        };

        let points = (self.accessor)();
        let data = VertexData::build(self.projection.as_ref(), &points);
        let (positions, intensities) = upload_points(ctx, &data);

        std::mem::replace(&mut res.positions, positions).destroy(ctx.ledger);
        std::mem::replace(&mut res.intensities, intensities).destroy(ctx.ledger);

        log::debug!("heatmap points refreshed: {}", res.positions.count());
        Ok(res.positions.count())
    }

    /// Releases every GPU object. The renderer is unusable afterwards.
    pub fn destroy(&mut self, ctx: &RenderCtx<'_>) -> Result<()> {
        let State::Live(res) = std::mem::replace(&mut self.state, State::Destroyed) else {
            return Err(ContractViolation::AlreadyDestroyed.into());
        };
        Resources::release(*res, ctx.ledger);
        log::debug!("heatmap layer destroyed");
        Ok(())
    }
}

impl Drop for HeatmapRenderer {
    fn drop(&mut self) {
        if let State::Live(_) = self.state {
            log::warn!(
                "heatmap layer dropped without destroy(); GPU objects are released untracked"
            );
        }
    }
}

impl Resources {
    /// Keeps the colorize bind group pointed at the current gradient storage.
    fn ensure_colorize_group(&mut self, ctx: &RenderCtx<'_>) {
        let generation = self.gradient.generation();
        if matches!(&self.colorize_group, Some((g, _)) if *g == generation) {
            return;
        }
        let Some(view) = self.gradient.color_view() else { return };

        let group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("heatlayer colorize bind group"),
            layout: self.colorize.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.ramp_uniforms,
                        offset: 0,
                        size: std::num::NonZeroU64::new(self.ramp_block_size),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(self.gradient.color_sampler()),
                },
            ],
        });
        ctx.ledger.allocated(ResourceKind::BindGroup);

        if self.colorize_group.replace((generation, group)).is_some() {
            ctx.ledger.released(ResourceKind::BindGroup);
        }
    }

    fn release(self, ledger: &ResourceLedger) {
        let Resources {
            main,
            gradient,
            splat,
            colorize,
            positions,
            intensities,
            quad_vertices,
            quad_tex_coords,
            splat_uniforms,
            ramp_uniforms,
            ramp_block_size: _,
            colorize_group,
        } = self;

        if let Some((_, group)) = colorize_group {
            drop(group);
            ledger.released(ResourceKind::BindGroup);
        }
        splat_uniforms.destroy(ledger);
        ramp_uniforms.destroy();
        ledger.released(ResourceKind::Buffer);

        for buffer in [positions, intensities, quad_vertices, quad_tex_coords] {
            buffer.destroy(ledger);
        }
        for program in [splat, colorize] {
            program.destroy(ledger);
        }
        for fb in [main, gradient] {
            fb.destroy(ledger);
        }
    }
}

// ── construction helpers ──────────────────────────────────────────────────

/// `ONE, ONE_MINUS_SRC_ALPHA` on color and alpha.
const ACCUMULATE: wgpu::BlendState = wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING;

fn splat_desc() -> ProgramDesc<'static> {
    const ATTRIBUTES: &[AttributeDesc] = &[
        AttributeDesc {
            name: "a_position",
            format: wgpu::VertexFormat::Float32x2,
            step_mode: wgpu::VertexStepMode::Instance,
        },
        AttributeDesc {
            name: "a_intensity",
            format: wgpu::VertexFormat::Float32,
            step_mode: wgpu::VertexStepMode::Instance,
        },
    ];

    ProgramDesc {
        label: "heatlayer splat",
        vertex_source: GRADIENT_VS,
        fragment_source: GRADIENT_FS,
        attributes: ATTRIBUTES,
        uniforms: SPLAT_UNIFORMS,
        // Depth test off: always pass, never write.
        state: PipelineState {
            color_format: COLOR_FORMAT,
            depth_format: DEPTH_FORMAT,
            blend: Some(ACCUMULATE),
            depth_write: false,
            depth_compare: wgpu::CompareFunction::Always,
            dynamic_uniforms: true,
        },
    }
}

fn colorize_desc() -> ProgramDesc<'static> {
    const ATTRIBUTES: &[AttributeDesc] = &[
        AttributeDesc {
            name: "a_position",
            format: wgpu::VertexFormat::Float32x2,
            step_mode: wgpu::VertexStepMode::Vertex,
        },
        AttributeDesc {
            name: "a_tex_coord",
            format: wgpu::VertexFormat::Float32x2,
            step_mode: wgpu::VertexStepMode::Vertex,
        },
    ];

    ProgramDesc {
        label: "heatlayer colorize",
        vertex_source: COLORIZE_VS,
        fragment_source: COLORIZE_FS,
        attributes: ATTRIBUTES,
        uniforms: COLORIZE_UNIFORMS,
        state: PipelineState {
            color_format: COLOR_FORMAT,
            depth_format: DEPTH_FORMAT,
            blend: Some(ACCUMULATE),
            depth_write: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            dynamic_uniforms: false,
        },
    }
}

fn upload_points(ctx: &RenderCtx<'_>, data: &VertexData) -> (DrawBuffer, DrawBuffer) {
    (
        DrawBuffer::from_f32(ctx, "heatlayer point positions", &data.positions, 2),
        DrawBuffer::from_f32(ctx, "heatlayer point intensities", &data.intensities, 1),
    )
}

fn splat_block(
    program: &Program,
    config: &HeatmapConfig,
    size: PixelSize,
    world: &World,
) -> UniformBlock {
    let mut block = UniformBlock::new(0, program.uniform_block_size(0).unwrap_or(0));
    let look_at = (-world.look_at).to_f32();

    block.set(program.uniform("u_view_projection"), &world.view_proj);
    block.set(program.uniform("u_look_at"), &look_at);
    block.set(program.uniform("u_viewport"), &[size.width as f32, size.height as f32]);
    block.set(program.uniform("u_size"), &[config.size]);
    block.set(program.uniform("u_density"), &[config.density]);
    block.set(program.uniform("u_max"), &[config.max]);
    block.set(program.uniform("u_blur"), &[config.blur]);
    block
}

fn ramp_block(program: &Program, gradient: &MappedGradient, opacity: f32) -> UniformBlock {
    let mut block = UniformBlock::new(0, program.uniform_block_size(0).unwrap_or(0));

    block.set(program.uniform("u_color_arr"), &gradient.padded_colors());
    block.set(program.uniform("u_offset"), &gradient.packed_offsets());
    block.set(program.uniform("u_stop_count"), &[gradient.len() as u32]);
    block.set(program.uniform("u_opacity"), &[opacity]);
    block
}

fn unbound(size: PixelSize) -> HeatmapError {
    HeatmapError::ResourceAllocation {
        what: "framebuffer",
        width: size.width,
        height: size.height,
        reason: "no storage bound".into(),
    }
}
