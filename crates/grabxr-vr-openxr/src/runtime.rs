use openxr as xr;

use grabxr_vr::runtime::{SessionControl, SystemInfo, XrRuntime};
use grabxr_vr::types::{
    FrameState, Hand, NativeImage, ProjectionLayer, RuntimeEvent, Time, View, ViewConfig,
    HAND_JOINT_COUNT,
};
use grabxr_vr::{BlendMode, PerHand, XrError, XrResult};

use crate::common::{
    local_space, to_fov, to_fovf, to_pose, to_posef, to_session_state, to_time,
    to_xr_blend_mode, to_xr_time,
};

const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;

/// One OpenXR session bound to an OpenGL context. Dropping it destroys
/// swapchains, spaces and the session before the instance.
pub struct OpenXrRuntime {
    swapchains: Vec<xr::Swapchain<xr::OpenGL>>,
    space: xr::Space,
    frame_stream: xr::FrameStream<xr::OpenGL>,
    frame_waiter: xr::FrameWaiter,
    session: xr::Session<xr::OpenGL>,
    instance: xr::Instance,
    hand_paths: PerHand<xr::Path>,
    event_buffer: xr::EventDataBuffer,
    info: SystemInfo,
}

impl OpenXrRuntime {
    pub fn new(
        instance: xr::Instance,
        session: xr::Session<xr::OpenGL>,
        frame_waiter: xr::FrameWaiter,
        frame_stream: xr::FrameStream<xr::OpenGL>,
        info: SystemInfo,
    ) -> XrResult<Self> {
        let path = |hand: Hand| {
            instance
                .string_to_path(hand.user_path())
                .map_err(|e| XrError::setup(format!("OpenXR path {hand:?}: {e:?}")))
        };
        let hand_paths = PerHand::new(path(Hand::Left)?, path(Hand::Right)?);
        let space = local_space(&session)?;
        Ok(Self {
            swapchains: Vec::new(),
            space,
            frame_stream,
            frame_waiter,
            session,
            instance,
            hand_paths,
            event_buffer: xr::EventDataBuffer::new(),
            info,
        })
    }

    fn swapchain(&mut self, view: usize) -> XrResult<&mut xr::Swapchain<xr::OpenGL>> {
        self.swapchains
            .get_mut(view)
            .ok_or_else(|| XrError::runtime(format!("no swapchain for view {view}")))
    }
}

impl SessionControl for OpenXrRuntime {
    fn begin_session(&mut self) -> XrResult<()> {
        self.session
            .begin(VIEW_TYPE)
            .map_err(|e| XrError::runtime(format!("OpenXR session begin: {e:?}")))?;
        Ok(())
    }

    fn end_session(&mut self) -> XrResult<()> {
        self.session
            .end()
            .map_err(|e| XrError::runtime(format!("OpenXR session end: {e:?}")))?;
        Ok(())
    }
}

impl XrRuntime for OpenXrRuntime {
    fn system_info(&self) -> &SystemInfo {
        &self.info
    }

    fn request_exit(&mut self) -> XrResult<()> {
        self.session
            .request_exit()
            .map_err(|e| XrError::runtime(format!("OpenXR request_exit: {e:?}")))
    }

    fn poll_event(&mut self) -> XrResult<Option<RuntimeEvent>> {
        let event = self
            .instance
            .poll_event(&mut self.event_buffer)
            .map_err(|e| XrError::runtime(format!("OpenXR poll_event: {e:?}")))?;
        Ok(event.map(|event| match event {
            xr::Event::EventsLost(e) => RuntimeEvent::EventsLost {
                count: e.lost_event_count(),
            },
            xr::Event::InstanceLossPending(e) => RuntimeEvent::InstanceLossPending {
                loss_time: to_time(e.loss_time()),
            },
            xr::Event::InteractionProfileChanged(_) => RuntimeEvent::InteractionProfileChanged,
            xr::Event::ReferenceSpaceChangePending(e) => RuntimeEvent::ReferenceSpaceChangePending {
                change_time: to_time(e.change_time()),
            },
            xr::Event::SessionStateChanged(e) => RuntimeEvent::SessionStateChanged {
                state: to_session_state(e.state()),
                time: to_time(e.time()),
            },
            _ => RuntimeEvent::Other,
        }))
    }

    fn current_interaction_profile(&self, hand: Hand) -> XrResult<Option<String>> {
        let profile = self
            .session
            .current_interaction_profile(self.hand_paths[hand])
            .map_err(|e| XrError::runtime(format!("OpenXR interaction profile: {e:?}")))?;
        if profile == xr::Path::NULL {
            return Ok(None);
        }
        self.instance
            .path_to_string(profile)
            .map(Some)
            .map_err(|e| XrError::runtime(format!("OpenXR path_to_string: {e:?}")))
    }

    fn swapchain_formats(&self) -> XrResult<Vec<i64>> {
        let formats = self
            .session
            .enumerate_swapchain_formats()
            .map_err(|e| XrError::setup(format!("OpenXR swapchain formats: {e:?}")))?;
        Ok(formats.into_iter().map(i64::from).collect())
    }

    fn create_swapchains(
        &mut self,
        format: i64,
        config: &ViewConfig,
        view_count: usize,
    ) -> XrResult<Vec<Vec<NativeImage>>> {
        let format = u32::try_from(format)
            .map_err(|_| XrError::setup(format!("swapchain format {format:#x} out of range")))?;
        let create_info = xr::SwapchainCreateInfo {
            create_flags: xr::SwapchainCreateFlags::EMPTY,
            usage_flags: xr::SwapchainUsageFlags::SAMPLED
                | xr::SwapchainUsageFlags::COLOR_ATTACHMENT,
            format,
            sample_count: config.recommended_sample_count,
            width: config.recommended_width,
            height: config.recommended_height,
            face_count: 1,
            array_size: 1,
            mip_count: 1,
        };

        let mut images = Vec::with_capacity(view_count);
        for view in 0..view_count {
            let swapchain = self
                .session
                .create_swapchain(&create_info)
                .map_err(|e| XrError::setup(format!("OpenXR swapchain {view}: {e:?}")))?;
            let textures = swapchain
                .enumerate_images()
                .map_err(|e| XrError::setup(format!("OpenXR swapchain images {view}: {e:?}")))?;
            log::info!(
                "swapchain {view}: {}x{} format {format:#X}, {} images",
                config.recommended_width,
                config.recommended_height,
                textures.len()
            );
            images.push(
                textures
                    .into_iter()
                    .map(|tex| NativeImage(u64::from(tex)))
                    .collect(),
            );
            self.swapchains.push(swapchain);
        }
        Ok(images)
    }

    fn destroy_swapchains(&mut self) {
        self.swapchains.clear();
    }

    fn wait_frame(&mut self) -> XrResult<FrameState> {
        let state = self
            .frame_waiter
            .wait()
            .map_err(|e| XrError::runtime(format!("OpenXR wait: {e:?}")))?;
        Ok(FrameState {
            predicted_display_time: to_time(state.predicted_display_time),
            predicted_display_period_ns: state.predicted_display_period.as_nanos(),
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self) -> XrResult<()> {
        self.frame_stream
            .begin()
            .map_err(|e| XrError::runtime(format!("OpenXR begin: {e:?}")))?;
        Ok(())
    }

    fn end_frame(
        &mut self,
        display_time: Time,
        blend_mode: BlendMode,
        layer: Option<&ProjectionLayer>,
    ) -> XrResult<()> {
        let time = to_xr_time(display_time);
        let blend_mode = to_xr_blend_mode(blend_mode);
        let Some(layer) = layer else {
            return self
                .frame_stream
                .end(time, blend_mode, &[])
                .map_err(|e| XrError::runtime(format!("OpenXR end: {e:?}")));
        };

        let mut views = Vec::with_capacity(layer.views.len());
        for view in &layer.views {
            let swapchain = self.swapchains.get(view.view_index).ok_or_else(|| {
                XrError::runtime(format!("no swapchain for view {}", view.view_index))
            })?;
            let sub_image = xr::SwapchainSubImage::new()
                .swapchain(swapchain)
                .image_array_index(0)
                .image_rect(xr::Rect2Di {
                    offset: xr::Offset2Di { x: 0, y: 0 },
                    extent: xr::Extent2Di {
                        width: view.width as i32,
                        height: view.height as i32,
                    },
                });
            views.push(
                xr::CompositionLayerProjectionView::new()
                    .pose(to_posef(view.pose))
                    .fov(to_fovf(view.fov))
                    .sub_image(sub_image),
            );
        }

        let projection = xr::CompositionLayerProjection::new()
            .layer_flags(
                xr::CompositionLayerFlags::BLEND_TEXTURE_SOURCE_ALPHA
                    | xr::CompositionLayerFlags::CORRECT_CHROMATIC_ABERRATION,
            )
            .space(&self.space)
            .views(&views);
        let layers: [&xr::CompositionLayerBase<xr::OpenGL>; 1] = [&projection];
        self.frame_stream
            .end(time, blend_mode, &layers)
            .map_err(|e| XrError::runtime(format!("OpenXR end: {e:?}")))
    }

    fn locate_views(&mut self, display_time: Time) -> XrResult<Vec<View>> {
        let (_flags, views) = self
            .session
            .locate_views(VIEW_TYPE, to_xr_time(display_time), &self.space)
            .map_err(|e| XrError::runtime(format!("OpenXR locate_views: {e:?}")))?;
        Ok(views
            .into_iter()
            .map(|view| View {
                pose: to_pose(view.pose),
                fov: to_fov(view.fov),
            })
            .collect())
    }

    fn acquire_image(&mut self, view: usize) -> XrResult<u32> {
        self.swapchain(view)?
            .acquire_image()
            .map_err(|e| XrError::runtime(format!("OpenXR acquire {view}: {e:?}")))
    }

    fn wait_image(&mut self, view: usize) -> XrResult<()> {
        self.swapchain(view)?
            .wait_image(xr::Duration::INFINITE)
            .map_err(|e| XrError::runtime(format!("OpenXR wait_image {view}: {e:?}")))
    }

    fn release_image(&mut self, view: usize) -> XrResult<()> {
        self.swapchain(view)?
            .release_image()
            .map_err(|e| XrError::runtime(format!("OpenXR release {view}: {e:?}")))
    }
}

/// Stereo view configuration and blend modes reported for `system`.
pub fn discover_system(
    instance: &xr::Instance,
    system: xr::SystemId,
    hand_tracking_enabled: bool,
) -> XrResult<SystemInfo> {
    let properties = instance
        .properties()
        .map_err(|e| XrError::setup(format!("OpenXR instance properties: {e:?}")))?;
    let system_properties = instance
        .system_properties(system)
        .map_err(|e| XrError::setup(format!("OpenXR system properties: {e:?}")))?;
    let hand_tracking_supported = hand_tracking_enabled
        && instance
            .supports_hand_tracking(system)
            .map_err(|e| XrError::setup(format!("OpenXR hand tracking query: {e:?}")))?;

    let views = instance
        .enumerate_view_configuration_views(system, VIEW_TYPE)
        .map_err(|e| XrError::setup(format!("OpenXR view configuration: {e:?}")))?
        .into_iter()
        .map(|view| ViewConfig {
            recommended_width: view.recommended_image_rect_width,
            recommended_height: view.recommended_image_rect_height,
            recommended_sample_count: view.recommended_swapchain_sample_count,
        })
        .collect();

    let blend_modes = instance
        .enumerate_environment_blend_modes(system, VIEW_TYPE)
        .map_err(|e| XrError::setup(format!("OpenXR blend modes: {e:?}")))?
        .into_iter()
        .filter_map(crate::common::to_blend_mode)
        .collect();

    Ok(SystemInfo {
        runtime_name: properties.runtime_name,
        runtime_version: version_string(properties.runtime_version),
        system_name: system_properties.system_name,
        hand_tracking_supported,
        hand_joint_count: HAND_JOINT_COUNT,
        views,
        blend_modes,
    })
}

fn version_string(version: xr::Version) -> String {
    format!("{}.{}.{}", version.major(), version.minor(), version.patch())
}
