//! OpenGL implementation of [`GraphicsDevice`] on top of `glow`.
//!
//! GL has no image views or descriptor sets, so both are recorded here and
//! resolved at bind time: an image view is a texture plus the attachment
//! point it goes to, and descriptors become `glBindBufferRange` calls.

use std::collections::HashMap;
use std::num::NonZeroU32;

use glow::HasContext;

use grabxr_vr::graphics::{
    BufferCreateInfo, BufferId, BufferKind, CompareOp, CullMode, DescriptorInfo, GraphicsDevice,
    ImageAspect, ImageCreateInfo, ImageId, ImageSource, ImageViewCreateInfo, ImageViewId,
    PipelineCreateInfo, PipelineId, Rect2D, ShaderCreateInfo, ShaderId, ShaderStage, Viewport,
};
use grabxr_vr::render::ShaderSources;
use grabxr_vr::{GraphicsBackend, XrError, XrResult};

#[cfg(target_os = "linux")]
use crate::glx::GlxContext;

pub const VERTEX_GLSL: &str = r#"#version 450 core
layout(std140, binding = 0) uniform CameraConstants {
    mat4 viewProj;
    mat4 modelViewProj;
    mat4 model;
    vec4 colour;
    vec4 pad1;
    vec4 pad2;
    vec4 pad3;
};
layout(std140, binding = 1) uniform Normals {
    vec4 normals[6];
};
layout(location = 0) in vec4 a_Positions;
layout(location = 0) out vec3 o_Normal;
layout(location = 1) out vec3 o_Colour;
void main() {
    gl_Position = modelViewProj * a_Positions;
    int face = gl_VertexID / 6;
    o_Normal = normalize(mat3(model) * normals[face].xyz);
    o_Colour = colour.rgb;
}
"#;

pub const FRAGMENT_GLSL: &str = r#"#version 450 core
layout(location = 0) in vec3 i_Normal;
layout(location = 1) in vec3 i_Colour;
layout(location = 0) out vec4 o_Colour;
void main() {
    float light = 0.1 + 0.9 * clamp(i_Normal.g, 0.0, 1.0);
    o_Colour = vec4(light * i_Colour, 1.0);
}
"#;

pub const SHADERS: ShaderSources<'static> = ShaderSources {
    vertex: VERTEX_GLSL.as_bytes(),
    fragment: FRAGMENT_GLSL.as_bytes(),
};

/// Swapchain formats in preference order.
pub const PREFERRED_COLOR_FORMATS: [u32; 2] = [glow::RGBA8, glow::SRGB8_ALPHA8];

pub fn describe_color_format(format: u32) -> (&'static str, bool) {
    match format {
        glow::RGBA8 => ("GL_RGBA8", false),
        glow::SRGB8_ALPHA8 => ("GL_SRGB8_ALPHA8", true),
        _ => ("UNKNOWN_GL_FORMAT", false),
    }
}

/// First preferred format the runtime offers. Unknown formats are never
/// picked since the pipeline cannot be built against them.
pub fn choose_color_format(formats: &[i64]) -> Option<i64> {
    PREFERRED_COLOR_FORMATS
        .iter()
        .map(|&format| i64::from(format))
        .find(|format| formats.contains(format))
}

fn buffer_target(kind: BufferKind) -> u32 {
    match kind {
        BufferKind::Vertex => glow::ARRAY_BUFFER,
        BufferKind::Index => glow::ELEMENT_ARRAY_BUFFER,
        BufferKind::Uniform => glow::UNIFORM_BUFFER,
    }
}

fn compare_func(op: CompareOp) -> u32 {
    match op {
        CompareOp::Less => glow::LESS,
        CompareOp::LessOrEqual => glow::LEQUAL,
    }
}

fn gl_format(format: i64) -> XrResult<u32> {
    u32::try_from(format).map_err(|_| XrError::graphics(format!("format {format:#x} out of range")))
}

fn native_texture(image: u64) -> XrResult<glow::NativeTexture> {
    u32::try_from(image)
        .ok()
        .and_then(NonZeroU32::new)
        .map(glow::NativeTexture)
        .ok_or_else(|| XrError::graphics(format!("invalid GL texture name {image}")))
}

struct GlBuffer {
    buffer: glow::NativeBuffer,
    target: u32,
}

struct GlPipeline {
    program: glow::NativeProgram,
    vertex_array: glow::NativeVertexArray,
    info: PipelineCreateInfo,
}

#[derive(Clone, Copy)]
struct GlImageView {
    texture: glow::NativeTexture,
    aspect: ImageAspect,
}

pub struct GlDevice {
    gl: glow::Context,
    framebuffer: glow::NativeFramebuffer,
    next_id: u64,
    buffers: HashMap<u64, GlBuffer>,
    shaders: HashMap<u64, (glow::NativeShader, ShaderStage)>,
    pipelines: HashMap<u64, GlPipeline>,
    images: HashMap<u64, glow::NativeTexture>,
    image_views: HashMap<u64, GlImageView>,
    bound_pipeline: Option<u64>,
    pending_descriptors: Vec<DescriptorInfo>,
    // Declared last so the context outlives every GL object above.
    #[cfg(target_os = "linux")]
    _context: Option<GlxContext>,
}

impl GlDevice {
    /// Wrap a loaded GL context. The context must stay current on this
    /// thread for the lifetime of the device.
    pub fn new(gl: glow::Context) -> XrResult<Self> {
        let framebuffer = unsafe { gl.create_framebuffer() }
            .map_err(|e| XrError::graphics(format!("create framebuffer: {e}")))?;
        let version = gl.version();
        log::info!(
            "GL {}.{} {}",
            version.major,
            version.minor,
            version.vendor_info
        );
        Ok(Self {
            gl,
            framebuffer,
            next_id: 0,
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            images: HashMap::new(),
            image_views: HashMap::new(),
            bound_pipeline: None,
            pending_descriptors: Vec::new(),
            #[cfg(target_os = "linux")]
            _context: None,
        })
    }

    /// Device owning the GLX context it renders with.
    #[cfg(target_os = "linux")]
    pub fn with_glx(context: GlxContext) -> XrResult<Self> {
        let gl = unsafe { context.load_gl() };
        let mut device = Self::new(gl)?;
        device._context = Some(context);
        Ok(device)
    }

    #[cfg(target_os = "linux")]
    pub fn glx(&self) -> Option<&GlxContext> {
        self._context.as_ref()
    }

    fn mint(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn view(&self, view: ImageViewId) -> Option<GlImageView> {
        let found = self.image_views.get(&view.0).copied();
        if found.is_none() {
            log::warn!("unknown image view {}", view.0);
        }
        found
    }

    fn attach(&self, view: GlImageView) {
        let attachment = match view.aspect {
            ImageAspect::Color => glow::COLOR_ATTACHMENT0,
            ImageAspect::Depth => glow::DEPTH_ATTACHMENT,
        };
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, Some(self.framebuffer));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                attachment,
                glow::TEXTURE_2D,
                Some(view.texture),
                0,
            );
        }
    }

    fn apply_raster_state(&self, info: &PipelineCreateInfo) {
        let gl = &self.gl;
        unsafe {
            match info.cull_mode {
                CullMode::None => gl.disable(glow::CULL_FACE),
                CullMode::Back => {
                    gl.enable(glow::CULL_FACE);
                    gl.cull_face(glow::BACK);
                }
            }
            gl.front_face(if info.front_face_ccw { glow::CCW } else { glow::CW });
            if info.depth_test {
                gl.enable(glow::DEPTH_TEST);
                gl.depth_func(compare_func(info.depth_compare));
            } else {
                gl.disable(glow::DEPTH_TEST);
            }
            gl.depth_mask(info.depth_write);
            if info.alpha_blend {
                gl.enable(glow::BLEND);
                gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            } else {
                gl.disable(glow::BLEND);
            }
        }
    }
}

impl GraphicsDevice for GlDevice {
    fn backend(&self) -> GraphicsBackend {
        GraphicsBackend::OpenGl
    }

    fn create_buffer(&mut self, info: &BufferCreateInfo<'_>) -> XrResult<BufferId> {
        let target = buffer_target(info.kind);
        let buffer = unsafe {
            let buffer = self
                .gl
                .create_buffer()
                .map_err(|e| XrError::graphics(format!("create buffer: {e}")))?;
            self.gl.bind_buffer(target, Some(buffer));
            match info.data {
                Some(data) => self
                    .gl
                    .buffer_data_u8_slice(target, data, glow::STATIC_DRAW),
                None => self
                    .gl
                    .buffer_data_size(target, info.size as i32, glow::DYNAMIC_DRAW),
            }
            self.gl.bind_buffer(target, None);
            buffer
        };
        let id = self.mint();
        self.buffers.insert(id, GlBuffer { buffer, target });
        Ok(BufferId(id))
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(&buffer.0) {
            unsafe { self.gl.delete_buffer(buffer.buffer) };
        }
    }

    fn create_shader(&mut self, info: &ShaderCreateInfo<'_>) -> XrResult<ShaderId> {
        let source = std::str::from_utf8(info.source)
            .map_err(|e| XrError::graphics(format!("shader source is not UTF-8: {e}")))?;
        let kind = match info.stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let shader = unsafe {
            let shader = self
                .gl
                .create_shader(kind)
                .map_err(|e| XrError::graphics(format!("create shader: {e}")))?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(XrError::graphics(format!(
                    "{:?} shader compile failed: {log}",
                    info.stage
                )));
            }
            shader
        };
        let id = self.mint();
        self.shaders.insert(id, (shader, info.stage));
        Ok(ShaderId(id))
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        if let Some((shader, _)) = self.shaders.remove(&shader.0) {
            unsafe { self.gl.delete_shader(shader) };
        }
    }

    fn create_pipeline(&mut self, info: &PipelineCreateInfo) -> XrResult<PipelineId> {
        let shaders = info
            .shaders
            .iter()
            .map(|id| {
                self.shaders
                    .get(&id.0)
                    .map(|(shader, _)| *shader)
                    .ok_or_else(|| XrError::graphics(format!("unknown shader {}", id.0)))
            })
            .collect::<XrResult<Vec<_>>>()?;

        let (program, vertex_array) = unsafe {
            let program = self
                .gl
                .create_program()
                .map_err(|e| XrError::graphics(format!("create program: {e}")))?;
            for shader in &shaders {
                self.gl.attach_shader(program, *shader);
            }
            self.gl.link_program(program);
            for shader in &shaders {
                self.gl.detach_shader(program, *shader);
            }
            if !self.gl.get_program_link_status(program) {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(XrError::graphics(format!("program link failed: {log}")));
            }
            let vertex_array = match self.gl.create_vertex_array() {
                Ok(vertex_array) => vertex_array,
                Err(e) => {
                    self.gl.delete_program(program);
                    return Err(XrError::graphics(format!("create vertex array: {e}")));
                }
            };
            (program, vertex_array)
        };

        let id = self.mint();
        self.pipelines.insert(
            id,
            GlPipeline {
                program,
                vertex_array,
                info: info.clone(),
            },
        );
        Ok(PipelineId(id))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        if let Some(pipeline_state) = self.pipelines.remove(&pipeline.0) {
            unsafe {
                self.gl.delete_vertex_array(pipeline_state.vertex_array);
                self.gl.delete_program(pipeline_state.program);
            }
        }
        if self.bound_pipeline == Some(pipeline.0) {
            self.bound_pipeline = None;
        }
    }

    fn create_image(&mut self, info: &ImageCreateInfo) -> XrResult<ImageId> {
        let format = gl_format(info.format)?;
        if info.sample_count > 1 {
            log::warn!(
                "{} samples requested, GL images are single-sampled",
                info.sample_count
            );
        }
        let texture = unsafe {
            let texture = self
                .gl
                .create_texture()
                .map_err(|e| XrError::graphics(format!("create texture: {e}")))?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.tex_storage_2d(
                glow::TEXTURE_2D,
                1,
                format,
                info.width as i32,
                info.height as i32,
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            texture
        };
        let id = self.mint();
        self.images.insert(id, texture);
        Ok(ImageId(id))
    }

    fn destroy_image(&mut self, image: ImageId) {
        if let Some(texture) = self.images.remove(&image.0) {
            unsafe { self.gl.delete_texture(texture) };
        }
    }

    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> XrResult<ImageViewId> {
        let texture = match info.image {
            ImageSource::Owned(image) => *self
                .images
                .get(&image.0)
                .ok_or_else(|| XrError::graphics(format!("unknown image {}", image.0)))?,
            ImageSource::Swapchain(native) => native_texture(native.0)?,
        };
        let id = self.mint();
        self.image_views.insert(
            id,
            GlImageView {
                texture,
                aspect: info.aspect,
            },
        );
        Ok(ImageViewId(id))
    }

    fn destroy_image_view(&mut self, view: ImageViewId) {
        self.image_views.remove(&view.0);
    }

    fn set_buffer_data(&mut self, buffer: BufferId, offset: usize, data: &[u8]) {
        let Some(buffer) = self.buffers.get(&buffer.0) else {
            log::warn!("write to unknown buffer {}", buffer.0);
            return;
        };
        unsafe {
            self.gl.bind_buffer(buffer.target, Some(buffer.buffer));
            self.gl
                .buffer_sub_data_u8_slice(buffer.target, offset as i32, data);
        }
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) {
        let Some(state) = self.pipelines.get(&pipeline.0) else {
            log::warn!("bind of unknown pipeline {}", pipeline.0);
            return;
        };
        unsafe {
            self.gl.use_program(Some(state.program));
            self.gl.bind_vertex_array(Some(state.vertex_array));
        }
        self.apply_raster_state(&state.info);
        self.bound_pipeline = Some(pipeline.0);
    }

    fn set_vertex_buffers(&mut self, buffers: &[BufferId]) {
        let Some(state) = self.bound_pipeline.and_then(|id| self.pipelines.get(&id)) else {
            log::warn!("vertex buffers set without a pipeline");
            return;
        };
        for attribute in &state.info.attributes {
            let Some(buffer) = buffers
                .get(attribute.binding as usize)
                .and_then(|id| self.buffers.get(&id.0))
            else {
                continue;
            };
            unsafe {
                self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer.buffer));
                self.gl.enable_vertex_attrib_array(attribute.location);
                self.gl.vertex_attrib_pointer_f32(
                    attribute.location,
                    attribute.components as i32,
                    glow::FLOAT,
                    false,
                    state.info.vertex_stride as i32,
                    attribute.offset as i32,
                );
            }
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.get(&buffer.0) {
            unsafe {
                self.gl
                    .bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buffer.buffer))
            };
        }
    }

    fn set_descriptor(&mut self, descriptor: DescriptorInfo) {
        self.pending_descriptors.push(descriptor);
    }

    fn update_descriptors(&mut self) {
        for descriptor in self.pending_descriptors.drain(..) {
            let Some(buffer) = self.buffers.get(&descriptor.buffer.0) else {
                continue;
            };
            unsafe {
                self.gl.bind_buffer_range(
                    glow::UNIFORM_BUFFER,
                    descriptor.binding,
                    Some(buffer.buffer),
                    descriptor.offset as i32,
                    descriptor.size as i32,
                );
            }
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        unsafe {
            self.gl.viewport(
                viewport.x as i32,
                viewport.y as i32,
                viewport.width as i32,
                viewport.height as i32,
            );
            self.gl
                .depth_range_f32(viewport.min_depth, viewport.max_depth);
        }
    }

    fn set_scissor(&mut self, scissor: Rect2D) {
        unsafe {
            self.gl.enable(glow::SCISSOR_TEST);
            self.gl.scissor(
                scissor.x,
                scissor.y,
                scissor.width as i32,
                scissor.height as i32,
            );
        }
    }

    fn set_render_attachments(
        &mut self,
        color: ImageViewId,
        depth: ImageViewId,
        _width: u32,
        _height: u32,
        _pipeline: PipelineId,
    ) {
        if let Some(color) = self.view(color) {
            self.attach(color);
        }
        if let Some(depth) = self.view(depth) {
            self.attach(depth);
        }
    }

    fn begin_rendering(&mut self) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, Some(self.framebuffer))
        };
    }

    fn end_rendering(&mut self) {
        unsafe {
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }

    fn clear_color(&mut self, view: ImageViewId, rgba: [f32; 4]) {
        let Some(view) = self.view(view) else {
            return;
        };
        self.attach(view);
        unsafe {
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.color_mask(true, true, true, true);
            self.gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn clear_depth(&mut self, view: ImageViewId, depth: f32) {
        let Some(view) = self.view(view) else {
            return;
        };
        self.attach(view);
        unsafe {
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.depth_mask(true);
            self.gl.clear_depth_f32(depth);
            self.gl.clear(glow::DEPTH_BUFFER_BIT);
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.gl
                .draw_elements(glow::TRIANGLES, index_count as i32, glow::UNSIGNED_INT, 0)
        };
    }

    fn depth_format(&self) -> i64 {
        i64::from(glow::DEPTH_COMPONENT32F)
    }

    fn select_swapchain_format(&self, formats: &[i64]) -> Option<i64> {
        let selected = choose_color_format(formats)?;
        let (name, srgb) = describe_color_format(selected as u32);
        let gamma_mode = if srgb {
            "sRGB (runtime gamma conversion)"
        } else {
            "linear UNORM (passthrough)"
        };
        log::info!(
            "swapchain format {name} ({selected:#X}) gamma_mode={gamma_mode} available={formats:?}"
        );
        Some(selected)
    }
}

impl Drop for GlDevice {
    fn drop(&mut self) {
        unsafe {
            for (_, pipeline) in self.pipelines.drain() {
                self.gl.delete_vertex_array(pipeline.vertex_array);
                self.gl.delete_program(pipeline.program);
            }
            for (_, (shader, _)) in self.shaders.drain() {
                self.gl.delete_shader(shader);
            }
            for (_, buffer) in self.buffers.drain() {
                self.gl.delete_buffer(buffer.buffer);
            }
            for (_, texture) in self.images.drain() {
                self.gl.delete_texture(texture);
            }
            self.gl.delete_framebuffer(self.framebuffer);
        }
    }
}
