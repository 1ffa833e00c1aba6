//! Per-view scene drawing.
//!
//! Every object is a cuboid drawn with the single pipeline. Each draw writes
//! its own 256-byte slot of the camera uniform buffer, addressed by a draw
//! index that restarts at zero for every view.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::{debug, warn};

use crate::graphics::{
    BufferCreateInfo, BufferId, BufferKind, CompareOp, CullMode, DescriptorBinding,
    DescriptorInfo, GraphicsDevice, PipelineCreateInfo, PipelineId, Rect2D, ShaderCreateInfo,
    ShaderId, ShaderStage, VertexAttribute, Viewport,
};
use crate::hand_tracking::HandTrackingSystem;
use crate::interaction::GrabInteractionEngine;
use crate::math::{translation_rotation_scale, view_projection, ClipSpace, Pose};
use crate::scene::{self, Cuboid};
use crate::swapchain::ViewTarget;
use crate::types::{Block, Hand, HandInputState, PerHand, View};
use crate::{BlendMode, XrError, XrResult};

/// Background for opaque displays; see-through displays clear to black.
pub const OPAQUE_CLEAR: [f32; 4] = [0.17, 0.17, 0.17, 1.0];
pub const PASSTHROUGH_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

pub fn clear_colour(blend_mode: BlendMode) -> [f32; 4] {
    match blend_mode {
        BlendMode::Opaque => OPAQUE_CLEAR,
        _ => PASSTHROUGH_CLEAR,
    }
}

/// Per-draw uniform block, std140 compatible.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraConstants {
    pub view_proj: [f32; 16],
    pub model_view_proj: [f32; 16],
    pub model: [f32; 16],
    pub colour: [f32; 4],
    pub pad: [[f32; 4]; 3],
}

pub const CAMERA_CONSTANTS_SIZE: usize = std::mem::size_of::<CameraConstants>();

impl CameraConstants {
    pub fn new(view_proj: &Mat4, model: &Mat4, colour: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array(),
            model_view_proj: (*view_proj * *model).to_cols_array(),
            model: model.to_cols_array(),
            colour: colour.extend(1.0).to_array(),
            pad: [[0.0; 4]; 3],
        }
    }
}

/// Shader code for the active backend (GLSL text, SPIR-V, DXBC...).
#[derive(Debug, Clone, Copy)]
pub struct ShaderSources<'a> {
    pub vertex: &'a [u8],
    pub fragment: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub near_z: f32,
    pub far_z: f32,
    pub view_height_m: f32,
}

/// Everything a view draws, borrowed for one frame.
pub struct SceneFrame<'a> {
    pub blocks: &'a [Block],
    pub hands: &'a PerHand<HandInputState>,
    pub grab: &'a GrabInteractionEngine,
    pub hand_tracking: &'a HandTrackingSystem,
}

pub struct SceneRenderer {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    camera_buffer: BufferId,
    normals_buffer: BufferId,
    vertex_shader: ShaderId,
    fragment_shader: ShaderId,
    pipeline: PipelineId,
    capacity: usize,
    clip: ClipSpace,
    settings: RenderSettings,
}

impl SceneRenderer {
    pub fn new<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        shaders: ShaderSources<'_>,
        color_format: i64,
        block_count: usize,
        settings: RenderSettings,
    ) -> XrResult<Self> {
        let vertices = scene::cube_vertices();
        let indices = scene::cube_indices();
        let capacity = scene::draw_capacity(block_count);

        let vertex_buffer = device.create_buffer(&BufferCreateInfo {
            kind: BufferKind::Vertex,
            stride: std::mem::size_of::<[f32; 4]>(),
            size: std::mem::size_of_val(&vertices),
            data: Some(bytemuck::cast_slice(&vertices)),
        })?;
        let index_buffer = device.create_buffer(&BufferCreateInfo {
            kind: BufferKind::Index,
            stride: std::mem::size_of::<u32>(),
            size: std::mem::size_of_val(&indices),
            data: Some(bytemuck::cast_slice(&indices)),
        })?;
        let camera_buffer = device.create_buffer(&BufferCreateInfo {
            kind: BufferKind::Uniform,
            stride: 0,
            size: CAMERA_CONSTANTS_SIZE * capacity,
            data: None,
        })?;
        let normals_buffer = device.create_buffer(&BufferCreateInfo {
            kind: BufferKind::Uniform,
            stride: 0,
            size: std::mem::size_of_val(&scene::FACE_NORMALS),
            data: Some(bytemuck::cast_slice(&scene::FACE_NORMALS)),
        })?;

        let vertex_shader = device.create_shader(&ShaderCreateInfo {
            stage: ShaderStage::Vertex,
            source: shaders.vertex,
        })?;
        let fragment_shader = device.create_shader(&ShaderCreateInfo {
            stage: ShaderStage::Fragment,
            source: shaders.fragment,
        })?;

        let pipeline = device.create_pipeline(&PipelineCreateInfo {
            shaders: vec![vertex_shader, fragment_shader],
            attributes: vec![VertexAttribute {
                location: 0,
                binding: 0,
                components: 4,
                offset: 0,
            }],
            vertex_stride: std::mem::size_of::<[f32; 4]>() as u32,
            cull_mode: CullMode::Back,
            front_face_ccw: true,
            depth_test: true,
            depth_write: true,
            depth_compare: CompareOp::LessOrEqual,
            alpha_blend: true,
            color_format,
            depth_format: device.depth_format(),
            layout: vec![
                DescriptorBinding {
                    binding: 0,
                    stage: ShaderStage::Vertex,
                },
                DescriptorBinding {
                    binding: 1,
                    stage: ShaderStage::Vertex,
                },
            ],
        })?;

        debug!(capacity, "scene resources created");
        Ok(Self {
            vertex_buffer,
            index_buffer,
            camera_buffer,
            normals_buffer,
            vertex_shader,
            fragment_shader,
            pipeline,
            capacity,
            clip: ClipSpace::from(device.backend()),
            settings,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Draw the scene into one view's acquired image and return the number
    /// of draws issued.
    pub fn render_view<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        target: &ViewTarget,
        image_index: u32,
        view: &View,
        blend_mode: BlendMode,
        frame: &SceneFrame<'_>,
    ) -> XrResult<usize> {
        let color_view = target
            .color_views
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| XrError::graphics(format!("swapchain image {image_index} out of range")))?;

        device.begin_rendering();
        device.clear_color(color_view, clear_colour(blend_mode));
        device.clear_depth(target.depth_view, 1.0);
        device.set_render_attachments(
            color_view,
            target.depth_view,
            target.width,
            target.height,
            self.pipeline,
        );
        device.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: target.width as f32,
            height: target.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        device.set_scissor(Rect2D {
            x: 0,
            y: 0,
            width: target.width,
            height: target.height,
        });

        let view_proj = view_projection(
            &view.pose,
            &view.fov,
            self.settings.near_z,
            self.settings.far_z,
            self.clip,
        );
        let mut draws = DrawList {
            renderer: self,
            view_proj,
            index: 0,
        };

        draws.cuboid(device, &scene::floor(self.settings.view_height_m));
        draws.cuboid(device, &scene::table(self.settings.view_height_m));

        for (_, hand) in frame.hands.iter() {
            if hand.grip_active {
                draws.draw(
                    device,
                    &hand.grip_pose,
                    scene::HAND_INDICATOR_SCALE,
                    scene::HAND_INDICATOR_COLOUR,
                );
            }
        }

        for (index, block) in frame.blocks.iter().enumerate() {
            let scale = frame.grab.display_scale(index, block);
            draws.draw(device, &block.pose, scale, block.colour);
        }

        if frame.hand_tracking.is_active() {
            for hand in Hand::ALL {
                for joint in frame.hand_tracking.joints(hand) {
                    draws.draw(
                        device,
                        &joint.pose,
                        scene::JOINT_SCALE * joint.radius,
                        scene::JOINT_COLOUR,
                    );
                }
            }
        }

        device.end_rendering();
        Ok(draws.index)
    }

    pub fn destroy<D: GraphicsDevice + ?Sized>(self, device: &mut D) {
        device.destroy_pipeline(self.pipeline);
        device.destroy_shader(self.fragment_shader);
        device.destroy_shader(self.vertex_shader);
        device.destroy_buffer(self.camera_buffer);
        device.destroy_buffer(self.normals_buffer);
        device.destroy_buffer(self.index_buffer);
        device.destroy_buffer(self.vertex_buffer);
    }
}

struct DrawList<'r> {
    renderer: &'r SceneRenderer,
    view_proj: Mat4,
    index: usize,
}

impl DrawList<'_> {
    fn cuboid<D: GraphicsDevice + ?Sized>(&mut self, device: &mut D, cuboid: &Cuboid) {
        self.draw(device, &cuboid.pose, cuboid.scale, cuboid.colour);
    }

    fn draw<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        pose: &Pose,
        scale: Vec3,
        colour: Vec3,
    ) {
        let r = self.renderer;
        if self.index >= r.capacity {
            warn!(index = self.index, "uniform buffer full, draw skipped");
            return;
        }

        let model = translation_rotation_scale(pose, scale);
        let constants = CameraConstants::new(&self.view_proj, &model, colour);
        let offset = CAMERA_CONSTANTS_SIZE * self.index;

        device.set_pipeline(r.pipeline);
        device.set_buffer_data(r.camera_buffer, offset, bytemuck::bytes_of(&constants));
        device.set_descriptor(DescriptorInfo {
            binding: 0,
            buffer: r.camera_buffer,
            stage: ShaderStage::Vertex,
            offset,
            size: CAMERA_CONSTANTS_SIZE,
        });
        device.set_descriptor(DescriptorInfo {
            binding: 1,
            buffer: r.normals_buffer,
            stage: ShaderStage::Vertex,
            offset: 0,
            size: std::mem::size_of_val(&scene::FACE_NORMALS),
        });
        device.update_descriptors();
        device.set_vertex_buffers(&[r.vertex_buffer]);
        device.set_index_buffer(r.index_buffer);
        device.draw_indexed(scene::CUBE_INDEX_COUNT);

        self.index += 1;
    }
}
