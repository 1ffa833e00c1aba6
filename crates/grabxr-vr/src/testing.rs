//! In-memory runtime, action/joint sources and graphics device for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::graphics::*;
use crate::math::{Fov, Pose};
use crate::render::{CameraConstants, CAMERA_CONSTANTS_SIZE};
use crate::runtime::{ActionSource, JointSource, SessionControl, SystemInfo, XrRuntime};
use crate::types::*;
use crate::{BlendMode, GraphicsBackend, XrError, XrResult};

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    BeginSession,
    EndSession,
    RequestExit,
    CreateSwapchains(usize),
    DestroySwapchains,
    WaitFrame,
    BeginFrame,
    EndFrame {
        time: Time,
        blend_mode: BlendMode,
        views: usize,
    },
    LocateViews(Time),
    AcquireImage(usize),
    WaitImage(usize),
    ReleaseImage(usize),
}

/// Runtime whose events, frames and failures are set up by the test.
pub struct ScriptedRuntime {
    pub info: SystemInfo,
    pub events: VecDeque<RuntimeEvent>,
    pub profiles: PerHand<Option<String>>,
    pub formats: Vec<i64>,
    /// Returned by the next `wait_frame` instead of the generated one.
    pub next_frame: Option<FrameState>,
    pub fail_locate_views: bool,
    pub fail_wait_image: bool,
    /// Queue STOPPING, IDLE and EXITING once this many frames have ended.
    pub stop_after_frames: Option<u64>,
    /// Accept `request_exit` but never emit the state events that follow it.
    pub ignore_exit_requests: bool,
    pub fail_request_exit: bool,
    pub calls: Vec<RuntimeCall>,
    pub sessions_begun: u32,
    pub sessions_ended: u32,
    pub swapchains_destroyed: Rc<Cell<bool>>,
    frame_counter: i64,
    last_frame_time: Time,
    frames_ended: u64,
}

impl ScriptedRuntime {
    pub const IMAGES_PER_CHAIN: usize = 3;
    pub const FRAME_PERIOD_NS: i64 = 11_111_111;

    pub fn stereo() -> Self {
        let view = ViewConfig {
            recommended_width: 1024,
            recommended_height: 1024,
            recommended_sample_count: 1,
        };
        Self {
            info: SystemInfo {
                runtime_name: "scripted".to_string(),
                runtime_version: "1.0.0".to_string(),
                system_name: "test hmd".to_string(),
                hand_tracking_supported: true,
                hand_joint_count: HAND_JOINT_COUNT,
                views: vec![view, view],
                blend_modes: vec![BlendMode::Opaque, BlendMode::Additive],
            },
            events: VecDeque::new(),
            profiles: PerHand::default(),
            formats: vec![0x8C43, RecordingDevice::COLOR_FORMAT],
            next_frame: None,
            fail_locate_views: false,
            fail_wait_image: false,
            stop_after_frames: None,
            ignore_exit_requests: false,
            fail_request_exit: false,
            calls: Vec::new(),
            sessions_begun: 0,
            sessions_ended: 0,
            swapchains_destroyed: Rc::new(Cell::new(false)),
            frame_counter: 0,
            last_frame_time: Time::default(),
            frames_ended: 0,
        }
    }

    pub fn push_events(&mut self, events: impl IntoIterator<Item = RuntimeEvent>) {
        self.events.extend(events);
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn last_frame_time(&self) -> Time {
        self.last_frame_time
    }

    fn state_event(state: SessionState) -> RuntimeEvent {
        RuntimeEvent::SessionStateChanged {
            state,
            time: Time::default(),
        }
    }
}

impl SessionControl for ScriptedRuntime {
    fn begin_session(&mut self) -> XrResult<()> {
        self.calls.push(RuntimeCall::BeginSession);
        self.sessions_begun += 1;
        Ok(())
    }

    fn end_session(&mut self) -> XrResult<()> {
        self.calls.push(RuntimeCall::EndSession);
        self.sessions_ended += 1;
        Ok(())
    }
}

impl XrRuntime for ScriptedRuntime {
    fn system_info(&self) -> &SystemInfo {
        &self.info
    }

    fn request_exit(&mut self) -> XrResult<()> {
        self.calls.push(RuntimeCall::RequestExit);
        if self.fail_request_exit {
            return Err(XrError::runtime("session not running"));
        }
        if !self.ignore_exit_requests {
            self.events.extend(
                [
                    SessionState::Visible,
                    SessionState::Synchronized,
                    SessionState::Stopping,
                    SessionState::Idle,
                    SessionState::Exiting,
                ]
                .map(Self::state_event),
            );
        }
        Ok(())
    }

    fn poll_event(&mut self) -> XrResult<Option<RuntimeEvent>> {
        Ok(self.events.pop_front())
    }

    fn current_interaction_profile(&self, hand: Hand) -> XrResult<Option<String>> {
        Ok(self.profiles[hand].clone())
    }

    fn swapchain_formats(&self) -> XrResult<Vec<i64>> {
        Ok(self.formats.clone())
    }

    fn create_swapchains(
        &mut self,
        _format: i64,
        _config: &ViewConfig,
        view_count: usize,
    ) -> XrResult<Vec<Vec<NativeImage>>> {
        self.calls.push(RuntimeCall::CreateSwapchains(view_count));
        Ok((0..view_count)
            .map(|view| {
                (0..Self::IMAGES_PER_CHAIN)
                    .map(|i| NativeImage((100 * view + i) as u64))
                    .collect()
            })
            .collect())
    }

    fn destroy_swapchains(&mut self) {
        self.calls.push(RuntimeCall::DestroySwapchains);
        self.swapchains_destroyed.set(true);
    }

    fn wait_frame(&mut self) -> XrResult<FrameState> {
        self.calls.push(RuntimeCall::WaitFrame);
        self.frame_counter += 1;
        let state = self.next_frame.take().unwrap_or(FrameState {
            predicted_display_time: Time::from_nanos(self.frame_counter * Self::FRAME_PERIOD_NS),
            predicted_display_period_ns: Self::FRAME_PERIOD_NS,
            should_render: true,
        });
        self.last_frame_time = state.predicted_display_time;
        Ok(state)
    }

    fn begin_frame(&mut self) -> XrResult<()> {
        self.calls.push(RuntimeCall::BeginFrame);
        Ok(())
    }

    fn end_frame(
        &mut self,
        display_time: Time,
        blend_mode: BlendMode,
        layer: Option<&ProjectionLayer>,
    ) -> XrResult<()> {
        self.calls.push(RuntimeCall::EndFrame {
            time: display_time,
            blend_mode,
            views: layer.map_or(0, |l| l.views.len()),
        });
        self.frames_ended += 1;
        if self.stop_after_frames == Some(self.frames_ended) {
            self.events.extend([
                Self::state_event(SessionState::Stopping),
                Self::state_event(SessionState::Idle),
                Self::state_event(SessionState::Exiting),
            ]);
        }
        Ok(())
    }

    fn locate_views(&mut self, display_time: Time) -> XrResult<Vec<View>> {
        self.calls.push(RuntimeCall::LocateViews(display_time));
        if self.fail_locate_views {
            return Err(XrError::runtime("views not located"));
        }
        let fov = Fov {
            angle_left: -0.78,
            angle_right: 0.72,
            angle_up: 0.8,
            angle_down: -0.8,
        };
        Ok([-0.032, 0.032]
            .into_iter()
            .map(|x| View {
                pose: Pose::from_position(Vec3::new(x, 0.0, 0.0)),
                fov,
            })
            .collect())
    }

    fn acquire_image(&mut self, view: usize) -> XrResult<u32> {
        self.calls.push(RuntimeCall::AcquireImage(view));
        Ok((self.frame_counter as usize % Self::IMAGES_PER_CHAIN) as u32)
    }

    fn wait_image(&mut self, view: usize) -> XrResult<()> {
        self.calls.push(RuntimeCall::WaitImage(view));
        if self.fail_wait_image {
            return Err(XrError::runtime("image wait timed out"));
        }
        Ok(())
    }

    fn release_image(&mut self, view: usize) -> XrResult<()> {
        self.calls.push(RuntimeCall::ReleaseImage(view));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ActionScript {
    pub fail_sync: bool,
    pub syncs: u32,
    /// `None` means the grip pose action is inactive.
    pub grip: PerHand<Option<SpaceLocation>>,
    pub grab: PerHand<ActionState<f32>>,
    pub haptics: Vec<(Hand, f32)>,
    pub located_at: Vec<Time>,
}

pub struct FakeActions {
    script: Rc<RefCell<ActionScript>>,
}

impl FakeActions {
    pub fn new() -> (Self, Rc<RefCell<ActionScript>>) {
        let script = Rc::new(RefCell::new(ActionScript::default()));
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

impl ActionSource for FakeActions {
    fn sync(&mut self) -> XrResult<()> {
        let mut script = self.script.borrow_mut();
        if script.fail_sync {
            return Err(XrError::runtime("session not focused"));
        }
        script.syncs += 1;
        Ok(())
    }

    fn grip_active(&self, hand: Hand) -> XrResult<bool> {
        Ok(self.script.borrow().grip[hand].is_some())
    }

    fn locate_grip(&self, hand: Hand, time: Time) -> XrResult<SpaceLocation> {
        let mut script = self.script.borrow_mut();
        script.located_at.push(time);
        Ok(script.grip[hand].unwrap_or_default())
    }

    fn grab_state(&self, hand: Hand) -> XrResult<ActionState<f32>> {
        Ok(self.script.borrow().grab[hand])
    }

    fn apply_haptic(&mut self, hand: Hand, pulse: HapticPulse) -> XrResult<()> {
        self.script.borrow_mut().haptics.push((hand, pulse.amplitude));
        Ok(())
    }
}

#[derive(Debug)]
pub struct JointScript {
    pub trackers: PerHand<bool>,
    pub radius: f32,
    pub fail: bool,
    pub requested_at: Vec<(Hand, Time)>,
}

pub struct FakeJoints {
    script: Rc<RefCell<JointScript>>,
}

impl FakeJoints {
    pub fn new() -> (Self, Rc<RefCell<JointScript>>) {
        let script = Rc::new(RefCell::new(JointScript {
            trackers: PerHand::new(true, true),
            radius: 0.01,
            fail: false,
            requested_at: Vec::new(),
        }));
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

impl JointSource for FakeJoints {
    fn has_tracker(&self, hand: Hand) -> bool {
        self.script.borrow().trackers[hand]
    }

    fn locate_joints(&self, hand: Hand, time: Time) -> XrResult<HandJoints> {
        let mut script = self.script.borrow_mut();
        script.requested_at.push((hand, time));
        if script.fail {
            return Err(XrError::runtime("joints not located"));
        }
        let joint = JointLocation {
            pose: Pose::IDENTITY,
            radius: script.radius,
            position_valid: true,
            orientation_valid: true,
        };
        Ok([joint; HAND_JOINT_COUNT])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer(BufferKind),
    CreateShader(ShaderStage),
    CreatePipeline,
    CreateImage,
    CreateImageView(ImageSource),
    SetBufferData {
        buffer: BufferId,
        offset: usize,
        data: Vec<u8>,
    },
    SetPipeline(PipelineId),
    SetVertexBuffers(Vec<BufferId>),
    SetIndexBuffer(BufferId),
    SetDescriptor(DescriptorInfo),
    UpdateDescriptors,
    SetViewport(Viewport),
    SetScissor(Rect2D),
    SetRenderAttachments {
        color: ImageViewId,
        depth: ImageViewId,
    },
    BeginRendering,
    EndRendering,
    ClearColor(ImageViewId, [f32; 4]),
    ClearDepth(ImageViewId, f32),
    DrawIndexed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Buffer,
    Shader,
    Pipeline,
    Image,
    ImageView,
}

pub type LiveResources = Rc<RefCell<HashMap<u64, Resource>>>;

/// OpenGL-flavoured device that records every call.
pub struct RecordingDevice {
    pub calls: Vec<DeviceCall>,
    live: LiveResources,
    next_id: u64,
}

impl RecordingDevice {
    /// GL_RGBA8
    pub const COLOR_FORMAT: i64 = 0x8058;
    /// GL_DEPTH_COMPONENT32F
    pub const DEPTH_FORMAT: i64 = 0x8CAC;

    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            live: Rc::new(RefCell::new(HashMap::new())),
            next_id: 1,
        }
    }

    fn mint(&mut self, kind: Resource) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.borrow_mut().insert(id, kind);
        id
    }

    fn release(&mut self, id: u64) {
        self.live.borrow_mut().remove(&id);
    }

    fn count(&self, kind: Resource) -> usize {
        self.live.borrow().values().filter(|k| **k == kind).count()
    }

    pub fn live_handle(&self) -> LiveResources {
        self.live.clone()
    }

    pub fn live_buffers(&self) -> usize {
        self.count(Resource::Buffer)
    }

    pub fn live_shaders(&self) -> usize {
        self.count(Resource::Shader)
    }

    pub fn live_pipelines(&self) -> usize {
        self.count(Resource::Pipeline)
    }

    pub fn live_images(&self) -> usize {
        self.count(Resource::Image)
    }

    pub fn live_image_views(&self) -> usize {
        self.count(Resource::ImageView)
    }

    pub fn draws(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DeviceCall::DrawIndexed(_)))
            .count()
    }

    fn buffer_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.calls.iter().filter_map(|c| match c {
            DeviceCall::SetBufferData { offset, .. } => Some(*offset),
            _ => None,
        })
    }

    pub fn first_buffer_offset(&self) -> Option<usize> {
        self.buffer_offsets().next()
    }

    pub fn last_buffer_offset(&self) -> Option<usize> {
        self.buffer_offsets().last()
    }

    /// Per-draw constants uploaded since `calls` was last cleared.
    pub fn uploaded_constants(&self) -> Vec<CameraConstants> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::SetBufferData { data, .. } if data.len() == CAMERA_CONSTANTS_SIZE => {
                    Some(bytemuck::pod_read_unaligned::<CameraConstants>(data))
                }
                _ => None,
            })
            .collect()
    }

    pub fn drawn_colours(&self) -> Vec<[f32; 4]> {
        self.uploaded_constants().iter().map(|c| c.colour).collect()
    }

    pub fn drawn_models(&self) -> Vec<Mat4> {
        self.uploaded_constants()
            .iter()
            .map(|c| Mat4::from_cols_array(&c.model))
            .collect()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn backend(&self) -> GraphicsBackend {
        GraphicsBackend::OpenGl
    }

    fn create_buffer(&mut self, info: &BufferCreateInfo<'_>) -> XrResult<BufferId> {
        self.calls.push(DeviceCall::CreateBuffer(info.kind));
        Ok(BufferId(self.mint(Resource::Buffer)))
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.release(buffer.0);
    }

    fn create_shader(&mut self, info: &ShaderCreateInfo<'_>) -> XrResult<ShaderId> {
        self.calls.push(DeviceCall::CreateShader(info.stage));
        Ok(ShaderId(self.mint(Resource::Shader)))
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.release(shader.0);
    }

    fn create_pipeline(&mut self, _info: &PipelineCreateInfo) -> XrResult<PipelineId> {
        self.calls.push(DeviceCall::CreatePipeline);
        Ok(PipelineId(self.mint(Resource::Pipeline)))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.release(pipeline.0);
    }

    fn create_image(&mut self, _info: &ImageCreateInfo) -> XrResult<ImageId> {
        self.calls.push(DeviceCall::CreateImage);
        Ok(ImageId(self.mint(Resource::Image)))
    }

    fn destroy_image(&mut self, image: ImageId) {
        self.release(image.0);
    }

    fn create_image_view(&mut self, info: &ImageViewCreateInfo) -> XrResult<ImageViewId> {
        self.calls.push(DeviceCall::CreateImageView(info.image));
        Ok(ImageViewId(self.mint(Resource::ImageView)))
    }

    fn destroy_image_view(&mut self, view: ImageViewId) {
        self.release(view.0);
    }

    fn set_buffer_data(&mut self, buffer: BufferId, offset: usize, data: &[u8]) {
        self.calls.push(DeviceCall::SetBufferData {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.calls.push(DeviceCall::SetPipeline(pipeline));
    }

    fn set_vertex_buffers(&mut self, buffers: &[BufferId]) {
        self.calls.push(DeviceCall::SetVertexBuffers(buffers.to_vec()));
    }

    fn set_index_buffer(&mut self, buffer: BufferId) {
        self.calls.push(DeviceCall::SetIndexBuffer(buffer));
    }

    fn set_descriptor(&mut self, descriptor: DescriptorInfo) {
        self.calls.push(DeviceCall::SetDescriptor(descriptor));
    }

    fn update_descriptors(&mut self) {
        self.calls.push(DeviceCall::UpdateDescriptors);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.calls.push(DeviceCall::SetViewport(viewport));
    }

    fn set_scissor(&mut self, scissor: Rect2D) {
        self.calls.push(DeviceCall::SetScissor(scissor));
    }

    fn set_render_attachments(
        &mut self,
        color: ImageViewId,
        depth: ImageViewId,
        _width: u32,
        _height: u32,
        _pipeline: PipelineId,
    ) {
        self.calls
            .push(DeviceCall::SetRenderAttachments { color, depth });
    }

    fn begin_rendering(&mut self) {
        self.calls.push(DeviceCall::BeginRendering);
    }

    fn end_rendering(&mut self) {
        self.calls.push(DeviceCall::EndRendering);
    }

    fn clear_color(&mut self, view: ImageViewId, rgba: [f32; 4]) {
        self.calls.push(DeviceCall::ClearColor(view, rgba));
    }

    fn clear_depth(&mut self, view: ImageViewId, depth: f32) {
        self.calls.push(DeviceCall::ClearDepth(view, depth));
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.calls.push(DeviceCall::DrawIndexed(index_count));
    }

    fn depth_format(&self) -> i64 {
        Self::DEPTH_FORMAT
    }

    fn select_swapchain_format(&self, formats: &[i64]) -> Option<i64> {
        formats.iter().copied().find(|f| *f == Self::COLOR_FORMAT)
    }
}
