//! Contract the core renders through.
//!
//! One implementation exists per graphics API and is chosen once at startup;
//! nothing above this trait branches on the API again. Resource handles are
//! plain ids owned by the device that minted them.

use crate::types::NativeImage;
use crate::{GraphicsBackend, XrResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageViewId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferCreateInfo<'a> {
    pub kind: BufferKind,
    pub stride: usize,
    pub size: usize,
    pub data: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderCreateInfo<'a> {
    pub stage: ShaderStage,
    pub source: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    /// Number of f32 components.
    pub components: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineCreateInfo {
    pub shaders: Vec<ShaderId>,
    pub attributes: Vec<VertexAttribute>,
    pub vertex_stride: u32,
    pub cull_mode: CullMode,
    pub front_face_ccw: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    pub alpha_blend: bool,
    pub color_format: i64,
    pub depth_format: i64,
    pub layout: Vec<DescriptorBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub width: u32,
    pub height: u32,
    pub format: i64,
    pub sample_count: u32,
    pub color_attachment: bool,
    pub depth_attachment: bool,
    pub sampled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Owned(ImageId),
    Swapchain(NativeImage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAspect {
    Color,
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageViewCreateInfo {
    pub image: ImageSource,
    pub format: i64,
    pub aspect: ImageAspect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Uniform buffer range bound to a shader slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub binding: u32,
    pub buffer: BufferId,
    pub stage: ShaderStage,
    pub offset: usize,
    pub size: usize,
}

pub trait GraphicsDevice {
    fn backend(&self) -> GraphicsBackend;

    fn create_buffer(&mut self, info: &BufferCreateInfo<'_>) -> XrResult<BufferId>;
    fn destroy_buffer(&mut self, buffer: BufferId);
    fn create_shader(&mut self, info: &ShaderCreateInfo<'_>) -> XrResult<ShaderId>;
    fn destroy_shader(&mut self, shader: ShaderId);
    fn create_pipeline(&mut self, info: &PipelineCreateInfo) -> XrResult<PipelineId>;
    fn destroy_pipeline(&mut self, pipeline: PipelineId);
    fn create_image(&mut self, info: &ImageCreateInfo) -> XrResult<ImageId>;
    fn destroy_image(&mut self, image: ImageId);
    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> XrResult<ImageViewId>;
    fn destroy_image_view(&mut self, view: ImageViewId);

    fn set_buffer_data(&mut self, buffer: BufferId, offset: usize, data: &[u8]);
    fn set_pipeline(&mut self, pipeline: PipelineId);
    fn set_vertex_buffers(&mut self, buffers: &[BufferId]);
    fn set_index_buffer(&mut self, buffer: BufferId);
    fn set_descriptor(&mut self, descriptor: DescriptorInfo);
    fn update_descriptors(&mut self);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, scissor: Rect2D);
    fn set_render_attachments(
        &mut self,
        color: ImageViewId,
        depth: ImageViewId,
        width: u32,
        height: u32,
        pipeline: PipelineId,
    );

    fn begin_rendering(&mut self);
    fn end_rendering(&mut self);
    fn clear_color(&mut self, view: ImageViewId, rgba: [f32; 4]);
    fn clear_depth(&mut self, view: ImageViewId, depth: f32);
    fn draw_indexed(&mut self, index_count: u32);

    fn depth_format(&self) -> i64;
    /// Pick a colour format from the runtime's candidates, `None` if none fits.
    fn select_swapchain_format(&self, formats: &[i64]) -> Option<i64>;
}
