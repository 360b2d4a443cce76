//! Shader program builder.
//!
//! A `Program` pairs a vertex and a fragment shader module with the pipeline
//! that captures their attribute bindings, plus two lookup tables:
//! attribute name -> vertex buffer slot, uniform name -> [`UniformHandle`].
//! Names the shaders do not declare resolve to `None` instead of failing.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::ops::Range;

use crate::error::{HeatmapError, Result};

use super::RenderCtx;
use super::draw_buffer::DrawBuffer;
use super::ledger::{ResourceKind, ResourceLedger};
use super::reflect::{self, ResourceType, ShaderInterface, Stage};
use super::uniforms::UniformHandle;

/// One per-vertex or per-instance attribute, fed from its own buffer.
#[derive(Debug, Copy, Clone)]
pub struct AttributeDesc {
    pub name: &'static str,
    pub format: wgpu::VertexFormat,
    pub step_mode: wgpu::VertexStepMode,
}

/// Fixed-function state baked into the program's pipeline.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
    /// Uniform blocks are bound with a dynamic offset.
    pub dynamic_uniforms: bool,
}

pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub attributes: &'a [AttributeDesc],
    pub uniforms: &'a [&'a str],
    pub state: PipelineState,
}

/// Everything a single draw needs, passed explicitly.
pub struct DrawCall<'a> {
    pub bind_group: &'a wgpu::BindGroup,
    pub dynamic_offsets: &'a [u32],
    pub buffers: &'a [(&'a str, &'a DrawBuffer)],
    pub vertices: Range<u32>,
    pub instances: Range<u32>,
}

pub struct Program {
    label: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    attributes: HashMap<String, Option<u32>>,
    uniforms: HashMap<String, Option<UniformHandle>>,
    uniform_blocks: BTreeMap<u32, u64>,
}

/// Reflected resource with the stages that declare it.
struct Binding {
    ty: ResourceType,
    visibility: wgpu::ShaderStages,
}

impl Program {
    /// Compiles, reflects and links a program. Nothing is bound.
    pub fn build(ctx: &RenderCtx<'_>, desc: &ProgramDesc<'_>) -> Result<Self> {
        let vs_iface = reflect::reflect(desc.vertex_source);
        let fs_iface = reflect::reflect(desc.fragment_source);
        check_layouts(desc.label, &vs_iface, "vertex")?;
        check_layouts(desc.label, &fs_iface, "fragment")?;

        let vs_entry = entry_point(desc.label, &vs_iface, Stage::Vertex)?;
        let fs_entry = entry_point(desc.label, &fs_iface, Stage::Fragment)?;

        let vertex = compile(ctx, desc.label, "vertex", desc.vertex_source)?;
        let fragment = compile(ctx, desc.label, "fragment", desc.fragment_source)?;

        let bindings = merge_bindings(desc.label, &vs_iface, &fs_iface)?;

        // ── name resolution ───────────────────────────────────────────────

        let mut resolved_attrs = Vec::new();
        let mut attributes = HashMap::new();
        for attr in desc.attributes {
            let slot = vs_iface.vertex_input(attr.name).map(|location| {
                resolved_attrs.push((*attr, location));
                resolved_attrs.len() as u32 - 1
            });
            if slot.is_none() {
                log::debug!("{}: attribute `{}` is not used by the shader", desc.label, attr.name);
            }
            attributes.insert(attr.name.to_string(), slot);
        }

        let mut uniforms = HashMap::new();
        for &name in desc.uniforms {
            let handle = resolve_uniform(name, &vs_iface, &fs_iface);
            if handle.is_none() {
                log::debug!("{}: uniform `{}` is not used by the shader", desc.label, name);
            }
            uniforms.insert(name.to_string(), handle);
        }

        let uniform_blocks = bindings
            .iter()
            .filter_map(|(&binding, b)| match &b.ty {
                ResourceType::Uniform { size, .. } => Some((binding, *size)),
                _ => None,
            })
            .collect();

        // ── layout + pipeline ─────────────────────────────────────────────

        let entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
            .iter()
            .map(|(&binding, b)| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: b.visibility,
                ty: binding_type(&b.ty, desc.state.dynamic_uniforms),
                count: None,
            })
            .collect();

        let bind_group_layout =
            ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} bgl", desc.label)),
                entries: &entries,
            });

        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} pipeline layout", desc.label)),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let attribute_arrays: Vec<[wgpu::VertexAttribute; 1]> = resolved_attrs
            .iter()
            .map(|(attr, location)| {
                [wgpu::VertexAttribute {
                    format: attr.format,
                    offset: 0,
                    shader_location: *location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = resolved_attrs
            .iter()
            .zip(&attribute_arrays)
            .map(|((attr, _), attrs)| wgpu::VertexBufferLayout {
                array_stride: attr.format.size(),
                step_mode: attr.step_mode,
                attributes: attrs,
            })
            .collect();

        let state = &desc.state;
        let (pipeline, link_error) = validated(ctx.device, || {
            ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("{} pipeline", desc.label)),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some(vs_entry),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some(fs_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: state.color_format,
                        blend: state.blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: state.depth_format,
                    depth_write_enabled: state.depth_write,
                    depth_compare: state.depth_compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        });
        if let Some(err) = link_error {
            log::error!("{}: pipeline failed to link", desc.label);
            return Err(HeatmapError::ShaderBuild {
                label: format!("{} pipeline", desc.label),
                message: err.to_string(),
            });
        }

        ctx.ledger.allocated(ResourceKind::Shader);
        ctx.ledger.allocated(ResourceKind::Shader);
        ctx.ledger.allocated(ResourceKind::Program);
        ctx.ledger.allocated(ResourceKind::VertexArray);
        log::debug!(
            "built program `{}` ({} attributes, {} uniforms)",
            desc.label,
            resolved_attrs.len(),
            desc.uniforms.len()
        );

        Ok(Self {
            label: desc.label.to_string(),
            vertex,
            fragment,
            bind_group_layout,
            pipeline,
            attributes,
            uniforms,
            uniform_blocks,
        })
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Vertex buffer slot for `name`, or `None` if the shader does not read it.
    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied().flatten()
    }

    /// Handle for `name`, or `None` if the shader does not declare it.
    pub fn uniform(&self, name: &str) -> Option<UniformHandle> {
        self.uniforms.get(name).copied().flatten()
    }

    /// Size in bytes of the uniform block at `binding`.
    pub fn uniform_block_size(&self, binding: u32) -> Option<u64> {
        self.uniform_blocks.get(&binding).copied()
    }

    #[inline]
    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Records one draw. Buffers for attributes the shader ignores are skipped.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, call: &DrawCall<'_>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, call.bind_group, call.dynamic_offsets);
        for (name, buffer) in call.buffers {
            if let Some(slot) = self.attribute(name) {
                pass.set_vertex_buffer(slot, buffer.slice());
            }
        }
        pass.draw(call.vertices.clone(), call.instances.clone());
    }

    /// Releases the program, both shaders and the pipeline.
    pub fn destroy(self, ledger: &ResourceLedger) {
        log::debug!("destroying program `{}`", self.label);
        drop(self.pipeline);
        drop(self.bind_group_layout);
        drop(self.vertex);
        drop(self.fragment);
        ledger.released(ResourceKind::VertexArray);
        ledger.released(ResourceKind::Program);
        ledger.released(ResourceKind::Shader);
        ledger.released(ResourceKind::Shader);
    }
}

// ── helpers ───────────────────────────────────────────────────────────────

fn entry_point<'i>(label: &str, iface: &'i ShaderInterface, stage: Stage) -> Result<&'i str> {
    iface.entry_point(stage).ok_or_else(|| HeatmapError::ShaderBuild {
        label: label.to_string(),
        message: format!("no {stage:?} entry point"),
    })
}

fn check_layouts(label: &str, iface: &ShaderInterface, stage: &str) -> Result<()> {
    if iface.errors.is_empty() {
        return Ok(());
    }
    Err(HeatmapError::ShaderBuild {
        label: format!("{label} {stage}"),
        message: iface.errors.join("; "),
    })
}

/// Runs `create` inside a validation error scope.
fn validated<T>(device: &wgpu::Device, create: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    (value, pollster::block_on(scope.pop()))
}

fn compile(
    ctx: &RenderCtx<'_>,
    label: &str,
    stage: &str,
    source: &str,
) -> Result<wgpu::ShaderModule> {
    let (module, scope_error) = validated(ctx.device, || {
        ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} {stage} shader")),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    });

    let info = pollster::block_on(module.get_compilation_info());
    let mut errors: Vec<String> = info
        .messages
        .iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        .map(|m| m.message.clone())
        .collect();
    if errors.is_empty()
        && let Some(err) = scope_error
    {
        errors.push(err.to_string());
    }

    if errors.is_empty() {
        Ok(module)
    } else {
        log::error!("{label}: {stage} shader failed to compile");
        Err(HeatmapError::ShaderBuild {
            label: format!("{label} {stage}"),
            message: errors.join("; "),
        })
    }
}

/// Combines both stages' resources by binding; all must live in group 0.
fn merge_bindings(
    label: &str,
    vs: &ShaderInterface,
    fs: &ShaderInterface,
) -> Result<BTreeMap<u32, Binding>> {
    let mut out: BTreeMap<u32, Binding> = BTreeMap::new();

    let stages = [(vs, wgpu::ShaderStages::VERTEX), (fs, wgpu::ShaderStages::FRAGMENT)];
    for (iface, visibility) in stages {
        for res in &iface.resources {
            if res.group != 0 {
                return Err(HeatmapError::ShaderBuild {
                    label: label.to_string(),
                    message: format!(
                        "`{}` uses group {}, only group 0 is supported",
                        res.name, res.group
                    ),
                });
            }

            match out.get_mut(&res.binding) {
                Some(existing) if existing.ty == res.ty => existing.visibility |= visibility,
                Some(_) => {
                    return Err(HeatmapError::ShaderBuild {
                        label: label.to_string(),
                        message: format!("stages disagree on binding {}", res.binding),
                    });
                }
                None => {
                    out.insert(res.binding, Binding { ty: res.ty.clone(), visibility });
                }
            }
        }
    }

    Ok(out)
}

fn resolve_uniform(
    name: &str,
    vs: &ShaderInterface,
    fs: &ShaderInterface,
) -> Option<UniformHandle> {
    vs.resources.iter().chain(&fs.resources).find_map(|res| {
        if res.name == name {
            return Some(UniformHandle::Resource { group: res.group, binding: res.binding });
        }
        let ResourceType::Uniform { fields, .. } = &res.ty else { return None };
        fields.iter().find(|f| f.name == name).map(|f| UniformHandle::Field {
            group: res.group,
            binding: res.binding,
            offset: f.offset,
            size: f.size,
        })
    })
}

fn binding_type(ty: &ResourceType, dynamic_uniforms: bool) -> wgpu::BindingType {
    match ty {
        ResourceType::Uniform { size, .. } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic_uniforms,
            min_binding_size: NonZeroU64::new(*size),
        },
        ResourceType::Texture2d => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        ResourceType::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    }
}
