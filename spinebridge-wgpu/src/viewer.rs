use crate::{PageTexture, blend_state};
use spinebridge::{BlendMode, Error, SkeletonAssets, TextureDescriptor};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    clip_from_world: [[f32; 4]; 4],
}

/// All page textures for one skeleton, built sequentially from resolved
/// assets. A failure partway through drops the textures already built,
/// so the GPU side is all-or-nothing like the asset side.
pub struct SkeletonTextures {
    pages: Vec<TexturedPage>,
}

pub struct TexturedPage {
    pub name: String,
    pub descriptor: TextureDescriptor,
    pub premultiplied_alpha: bool,
    pub texture: PageTexture,
}

impl SkeletonTextures {
    pub fn build(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        assets: &SkeletonAssets,
    ) -> Result<Self, Error> {
        let mut pages = Vec::with_capacity(assets.pages.len());
        for resolved in &assets.pages {
            // Page headers carry no blend; quads composite normally.
            let descriptor = resolved.page.descriptor(BlendMode::Normal);
            let texture =
                PageTexture::from_descriptor(device, queue, &descriptor, &resolved.asset)?;
            log::debug!("bound page '{}'", resolved.page.name);
            pages.push(TexturedPage {
                name: resolved.page.name.clone(),
                descriptor,
                premultiplied_alpha: resolved.page.pma,
                texture,
            });
        }
        Ok(Self { pages })
    }

    pub fn pages(&self) -> &[TexturedPage] {
        &self.pages
    }

    pub fn get(&self, name: &str) -> Option<&TexturedPage> {
        self.pages.iter().find(|p| p.name == name)
    }

    /// Explicit teardown; idempotent, and `Drop` covers the rest.
    pub fn dispose(&mut self) {
        for page in &mut self.pages {
            page.texture.dispose();
        }
    }
}

/// One draw of the demo scene: a textured quad with its page's blend
/// configuration.
pub struct PageQuad {
    pub bind_group: wgpu::BindGroup,
    pub blend: BlendMode,
    pub premultiplied_alpha: bool,
    first_index: u32,
    index_count: u32,
}

struct Pipelines {
    normal: wgpu::RenderPipeline,
    additive: wgpu::RenderPipeline,
    multiply: wgpu::RenderPipeline,
    screen: wgpu::RenderPipeline,
}

impl Pipelines {
    fn by_blend(&self, blend: BlendMode) -> &wgpu::RenderPipeline {
        match blend {
            BlendMode::Normal => &self.normal,
            BlendMode::Additive => &self.additive,
            BlendMode::Multiply => &self.multiply,
            BlendMode::Screen => &self.screen,
        }
    }
}

/// Renders one textured quad per atlas page inside a rotating 3D
/// viewport. This is demo glue, not a scene graph.
pub struct SceneRenderer {
    pipelines: Pipelines,
    pipelines_pma: Pipelines,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
}

impl SceneRenderer {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("spinebridge viewer shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let globals_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("globals bind group layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("page texture bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("spinebridge viewer pipeline layout"),
            bind_group_layouts: &[&globals_bind_group_layout, &texture_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = create_pipelines(device, &pipeline_layout, &shader, color_format, false);
        let pipelines_pma = create_pipelines(device, &pipeline_layout, &shader, color_format, true);

        let globals = Globals {
            clip_from_world: glam::Mat4::IDENTITY.to_cols_array_2d(),
        };
        let globals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("globals buffer"),
            contents: bytemuck::bytes_of(&globals),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals bind group"),
            layout: &globals_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        Self {
            pipelines,
            pipelines_pma,
            globals_buffer,
            globals_bind_group,
            texture_bind_group_layout,
            vertex_buffer: None,
            index_buffer: None,
        }
    }

    pub fn texture_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_bind_group_layout
    }

    pub fn set_camera(&self, queue: &wgpu::Queue, clip_from_world: glam::Mat4) {
        let globals = Globals {
            clip_from_world: clip_from_world.to_cols_array_2d(),
        };
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
    }

    /// Lays the pages out side by side, one unit-height quad each, and
    /// uploads the mesh. Returns one draw per page, material configured
    /// from the page's texture descriptor.
    pub fn build_quads(
        &mut self,
        device: &wgpu::Device,
        textures: &SkeletonTextures,
    ) -> Vec<PageQuad> {
        let mut vertices: Vec<QuadVertex> = Vec::with_capacity(textures.pages().len() * 4);
        let mut indices: Vec<u32> = Vec::with_capacity(textures.pages().len() * 6);
        let mut quads = Vec::with_capacity(textures.pages().len());

        let widths: Vec<f32> = textures
            .pages()
            .iter()
            .map(|p| {
                let h = p.texture.height().max(1) as f32;
                p.texture.width() as f32 / h
            })
            .collect();
        let gap = 0.1;
        let total: f32 = widths.iter().sum::<f32>() + gap * widths.len().saturating_sub(1) as f32;
        let mut cursor = -total / 2.0;

        for (page, width) in textures.pages().iter().zip(&widths) {
            let base = vertices.len() as u32;
            vertices.extend(quad_vertices(cursor + width / 2.0, *width, 1.0));
            indices.extend([base, base + 1, base + 2, base + 2, base + 3, base]);
            cursor += width + gap;

            quads.push(PageQuad {
                bind_group: page
                    .texture
                    .bind_group(device, &self.texture_bind_group_layout),
                blend: page.descriptor.blend,
                premultiplied_alpha: page.premultiplied_alpha,
                first_index: base / 4 * 6,
                index_count: 6,
            });
        }

        self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("viewer quad vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.index_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("viewer quad indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        }));

        quads
    }

    pub fn render<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, quads: &'a [PageQuad]) {
        let (Some(vertex_buffer), Some(index_buffer)) =
            (self.vertex_buffer.as_ref(), self.index_buffer.as_ref())
        else {
            return;
        };

        pass.set_bind_group(0, &self.globals_bind_group, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        for quad in quads {
            let pipeline = if quad.premultiplied_alpha {
                self.pipelines_pma.by_blend(quad.blend)
            } else {
                self.pipelines.by_blend(quad.blend)
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, &quad.bind_group, &[]);
            pass.draw_indexed(quad.first_index..quad.first_index + quad.index_count, 0, 0..1);
        }
    }
}

/// Camera for the demo: fixed eye, scene spun around the Y axis.
pub fn spin_camera(aspect: f32, angle: f32) -> glam::Mat4 {
    let projection = glam::Mat4::perspective_rh(45f32.to_radians(), aspect.max(1.0e-3), 0.1, 30.0);
    let view = glam::Mat4::look_at_rh(
        glam::Vec3::new(0.0, 0.3, 2.5),
        glam::Vec3::ZERO,
        glam::Vec3::Y,
    );
    projection * view * glam::Mat4::from_rotation_y(angle)
}

fn quad_vertices(center_x: f32, width: f32, height: f32) -> [QuadVertex; 4] {
    let half_w = width / 2.0;
    let half_h = height / 2.0;
    // UV origin is the top-left texel; world Y points up.
    [
        QuadVertex {
            position: [center_x - half_w, half_h, 0.0],
            uv: [0.0, 0.0],
        },
        QuadVertex {
            position: [center_x + half_w, half_h, 0.0],
            uv: [1.0, 0.0],
        },
        QuadVertex {
            position: [center_x + half_w, -half_h, 0.0],
            uv: [1.0, 1.0],
        },
        QuadVertex {
            position: [center_x - half_w, -half_h, 0.0],
            uv: [0.0, 1.0],
        },
    ]
}

fn create_pipelines(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    premultiplied_alpha: bool,
) -> Pipelines {
    let build = |blend: BlendMode, label: &str| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x3,
                        1 => Float32x2
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(blend_state(blend, premultiplied_alpha)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // The viewport spins; both faces stay visible.
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    };

    if premultiplied_alpha {
        Pipelines {
            normal: build(BlendMode::Normal, "viewer pipeline normal pma"),
            additive: build(BlendMode::Additive, "viewer pipeline additive pma"),
            multiply: build(BlendMode::Multiply, "viewer pipeline multiply pma"),
            screen: build(BlendMode::Screen, "viewer pipeline screen pma"),
        }
    } else {
        Pipelines {
            normal: build(BlendMode::Normal, "viewer pipeline normal"),
            additive: build(BlendMode::Additive, "viewer pipeline additive"),
            multiply: build(BlendMode::Multiply, "viewer pipeline multiply"),
            screen: build(BlendMode::Screen, "viewer pipeline screen"),
        }
    }
}

const SHADER: &str = r#"
struct Globals {
  clip_from_world: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

struct VsIn {
  @location(0) position: vec3<f32>,
  @location(1) uv: vec2<f32>,
};

struct VsOut {
  @builtin(position) position: vec4<f32>,
  @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VsIn) -> VsOut {
  var out: VsOut;
  out.position = globals.clip_from_world * vec4<f32>(in.position, 1.0);
  out.uv = in.uv;
  return out;
}

@group(1) @binding(0)
var tex: texture_2d<f32>;

@group(1) @binding(1)
var samp: sampler;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
  return textureSample(tex, samp, in.uv);
}
"#;
