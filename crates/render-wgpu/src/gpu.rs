use std::collections::{BTreeSet, HashMap};

use ember_assets::{MeshData, TextureImage};
use ember_render::{
    DeviceError, GraphicsDevice, ProgramId, TextureId, UniformLocation, UniformValue,
    VertexArrayId, declared_uniforms,
};
use wgpu::util::DeviceExt;

use crate::frame::{ErrorSink, FrameRecorder, grow_uniform_slots};
use crate::shaders::{self, UNIFORM_SLOT, UniformBlock};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct Program {
    name: String,
    pipeline: wgpu::RenderPipeline,
    uniforms: BTreeSet<String>,
}

struct VertexArray {
    positions: wgpu::Buffer,
    uvs: wgpu::Buffer,
    normals: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct Texture {
    // kept alive for the bind group's view
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// [`GraphicsDevice`] on a wgpu surface.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_slots: u64,
    white: Texture,
    programs: HashMap<ProgramId, Program>,
    vertex_arrays: HashMap<VertexArrayId, VertexArray>,
    textures: HashMap<TextureId, Texture>,
    next_id: u32,
    frame: FrameRecorder,
    errors: ErrorSink,
}

impl WgpuDevice {
    /// Open a device for `surface` and configure it at `width` × `height`.
    pub fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Self, DeviceError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DeviceError::Device("no compatible GPU adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("ember_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| DeviceError::Device(e.to_string()))?;

        let errors = ErrorSink::default();
        let sink = errors.clone();
        device.on_uncaptured_error(Box::new(move |err| {
            tracing::error!("wgpu error: {err}");
            sink.push(err.to_string());
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| DeviceError::Device("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<UniformBlock>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("diffuse_bind_group_layout"),
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
            label: Some("pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_slots = 16;
        let (uniform_buffer, uniform_bind_group) =
            Self::create_uniform_buffer(&device, &uniform_layout, uniform_slots);
        let white = Self::upload_texture(
            &device,
            &queue,
            &texture_layout,
            &sampler,
            &TextureImage::solid([255, 255, 255, 255]),
        );
        let depth_view = Self::create_depth_texture(&device, config.width, config.height);

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            adapter = %adapter.get_info().name,
            ?format,
            "GPU initialized"
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_view,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            uniform_buffer,
            uniform_bind_group,
            uniform_slots,
            white,
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            next_id: 0,
            frame: FrameRecorder::default(),
            errors,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth_view =
            Self::create_depth_texture(&self.device, self.config.width, self.config.height);
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn raise(&self, message: String) {
        tracing::debug!(%message, "device error");
        self.errors.push(message);
    }

    fn create_uniform_buffer(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        slots: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_buffer"),
            size: slots * UNIFORM_SLOT,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<UniformBlock>() as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn upload_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        image: &TextureImage,
    ) -> Texture {
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("diffuse_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &image.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("diffuse_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Texture {
            _texture: texture,
            bind_group,
        }
    }

    fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }

    /// Grow the uniform buffer to hold at least `draws` blocks.
    fn reserve_uniform_slots(&mut self, draws: u64) {
        let Some(slots) = grow_uniform_slots(self.uniform_slots, draws) else {
            return;
        };
        tracing::debug!(slots, "growing uniform buffer");
        let (buffer, bind_group) =
            Self::create_uniform_buffer(&self.device, &self.uniform_layout, slots);
        self.uniform_buffer = buffer;
        self.uniform_bind_group = bind_group;
        self.uniform_slots = slots;
    }

    fn build_pipeline(
        &self,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> wgpu::RenderPipeline {
        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{name}_vertex")),
            source: wgpu::ShaderSource::Wgsl(shaders::compose(vertex_source).into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{name}_fragment")),
            source: wgpu::ShaderSource::Wgsl(shaders::compose(fragment_source).into()),
        });

        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(name),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![1 => Float32x2],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![2 => Float32x3],
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        })
    }

    fn encode_frame(&mut self, view: &wgpu::TextureView) {
        let (clear_color, draws) = self.frame.finish();
        self.reserve_uniform_slots(draws.len() as u64);
        for (slot, draw) in draws.iter().enumerate() {
            self.queue.write_buffer(
                &self.uniform_buffer,
                slot as u64 * UNIFORM_SLOT,
                bytemuck::bytes_of(&draw.uniforms),
            );
        }

        let load = match clear_color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for (slot, draw) in draws.iter().enumerate() {
                // resources deleted after the draw was recorded are skipped
                let (Some(program), Some(vao)) = (
                    self.programs.get(&draw.program),
                    self.vertex_arrays.get(&draw.vertex_array),
                ) else {
                    continue;
                };
                let texture = draw
                    .texture
                    .and_then(|t| self.textures.get(&t))
                    .unwrap_or(&self.white);

                pass.set_pipeline(&program.pipeline);
                pass.set_bind_group(
                    0,
                    &self.uniform_bind_group,
                    &[(slot as u64 * UNIFORM_SLOT) as u32],
                );
                pass.set_bind_group(1, &texture.bind_group, &[]);
                pass.set_vertex_buffer(0, vao.positions.slice(..));
                pass.set_vertex_buffer(1, vao.uvs.slice(..));
                pass.set_vertex_buffer(2, vao.normals.slice(..));
                pass.set_index_buffer(vao.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_program(
        &mut self,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.build_pipeline(name, vertex_source, fragment_source);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Compile(err.to_string()));
        }

        let mut uniforms = declared_uniforms(vertex_source);
        uniforms.extend(declared_uniforms(fragment_source));
        uniforms.retain(|u| UniformBlock::field_index(u).is_some());

        let id = ProgramId(self.allocate());
        tracing::debug!(program = id.0, name, ?uniforms, "linked program");
        self.programs.insert(
            id,
            Program {
                name: name.to_owned(),
                pipeline,
                uniforms,
            },
        );
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        match self.programs.remove(&program) {
            Some(p) => tracing::debug!(program = program.0, name = %p.name, "deleted program"),
            None => self.raise(format!("delete of unknown program {}", program.0)),
        }
        self.frame.forget_program(program);
    }

    fn create_vertex_array(&mut self, mesh: &MeshData) -> Result<VertexArrayId, DeviceError> {
        // zero-size buffers cannot be sliced into a pass
        if mesh.positions.is_empty() || mesh.indices.is_empty() {
            return Err(DeviceError::Device("vertex array has no vertices or indices".into()));
        }
        let buffer = |label: &str, contents: &[u8], usage| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                })
        };
        let vertex_array = VertexArray {
            positions: buffer(
                "positions",
                bytemuck::cast_slice(&mesh.positions),
                wgpu::BufferUsages::VERTEX,
            ),
            uvs: buffer("uvs", bytemuck::cast_slice(&mesh.uvs), wgpu::BufferUsages::VERTEX),
            normals: buffer(
                "normals",
                bytemuck::cast_slice(&mesh.normals),
                wgpu::BufferUsages::VERTEX,
            ),
            indices: buffer(
                "indices",
                bytemuck::cast_slice(&mesh.indices),
                wgpu::BufferUsages::INDEX,
            ),
            index_count: mesh.indices.len() as u32,
        };
        let id = VertexArrayId(self.allocate());
        self.vertex_arrays.insert(id, vertex_array);
        Ok(id)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        match self.vertex_arrays.remove(&vertex_array) {
            Some(vao) => {
                vao.positions.destroy();
                vao.uvs.destroy();
                vao.normals.destroy();
                vao.indices.destroy();
            }
            None => self.raise(format!("delete of unknown vertex array {}", vertex_array.0)),
        }
        self.frame.forget_vertex_array(vertex_array);
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, DeviceError> {
        if image.width == 0 || image.height == 0 {
            return Err(DeviceError::Device("texture has zero size".into()));
        }
        let texture = Self::upload_texture(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.sampler,
            image,
        );
        let id = TextureId(self.allocate());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            self.raise(format!("delete of unknown texture {}", texture.0));
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.frame.clear(color);
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        if let Some(p) = program {
            if !self.programs.contains_key(&p) {
                self.raise(format!("use of unknown program {}", p.0));
            }
        }
        self.frame.use_program(program);
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get(&program)?;
        if !program.uniforms.contains(name) {
            return None;
        }
        UniformBlock::field_index(name).map(UniformLocation)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if let Err(message) = self.frame.set_uniform(location, value) {
            self.raise(message);
        }
    }

    fn active_texture(&mut self, unit: u32) {
        if let Err(message) = self.frame.active_texture(unit) {
            self.raise(message);
        }
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        if let Some(t) = texture {
            if !self.textures.contains_key(&t) {
                self.raise(format!("bind of unknown texture {}", t.0));
            }
        }
        self.frame.bind_texture(texture);
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        if let Some(v) = vertex_array {
            if !self.vertex_arrays.contains_key(&v) {
                self.raise(format!("bind of unknown vertex array {}", v.0));
            }
        }
        self.frame.bind_vertex_array(vertex_array);
    }

    fn draw_indexed_triangles(&mut self, index_count: u32) {
        let vertex_arrays = &self.vertex_arrays;
        let drawn = self.frame.draw(index_count, |vertex_array| {
            vertex_arrays
                .get(&vertex_array)
                .map(|v| v.index_count)
                .unwrap_or(0)
        });
        if let Err(message) = drawn {
            self.raise(message);
        }
    }

    fn take_error(&mut self) -> Option<DeviceError> {
        self.errors.take_first().map(DeviceError::Device)
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.frame.discard();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timeout, dropping frame");
                self.frame.discard();
                return Ok(());
            }
            Err(e) => return Err(DeviceError::Device(format!("surface error: {e}"))),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.encode_frame(&view);
        output.present();
        Ok(())
    }
}
