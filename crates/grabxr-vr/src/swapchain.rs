use tracing::info;

use crate::graphics::{
    GraphicsDevice, ImageAspect, ImageCreateInfo, ImageId, ImageSource, ImageViewCreateInfo,
    ImageViewId,
};
use crate::runtime::XrRuntime;
use crate::types::{NativeImage, ViewConfig};
use crate::{XrError, XrResult};

/// All stereo views must share one recommended size; returns it.
pub fn validate_stereo_views(views: &[ViewConfig]) -> XrResult<ViewConfig> {
    let Some((first, rest)) = views.split_first() else {
        return Err(XrError::setup("runtime reported no views"));
    };
    for other in rest {
        if other.recommended_width != first.recommended_width
            || other.recommended_height != first.recommended_height
        {
            return Err(XrError::ViewSizeMismatch {
                left_width: first.recommended_width,
                left_height: first.recommended_height,
                right_width: other.recommended_width,
                right_height: other.recommended_height,
            });
        }
    }
    Ok(*first)
}

/// Render targets of one view: a colour view per swapchain image plus a
/// private depth buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewTarget {
    pub width: u32,
    pub height: u32,
    pub color_views: Vec<ImageViewId>,
    pub depth_image: ImageId,
    pub depth_view: ImageViewId,
}

#[derive(Debug, Default)]
pub struct ViewTargets {
    format: i64,
    views: Vec<ViewTarget>,
}

impl ViewTargets {
    /// Create one swapchain per view and the device views over its images.
    ///
    /// Anything created before a failure is released again.
    pub fn create<R, D>(runtime: &mut R, device: &mut D, views: &[ViewConfig]) -> XrResult<Self>
    where
        R: XrRuntime + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        let config = validate_stereo_views(views)?;
        let formats = runtime.swapchain_formats()?;
        let format = device
            .select_swapchain_format(&formats)
            .ok_or_else(|| XrError::setup("no runtime swapchain format is usable by the device"))?;

        let images = runtime.create_swapchains(format, &config, views.len())?;
        let mut targets = Self {
            format,
            views: Vec::with_capacity(images.len()),
        };
        for chain in images {
            match Self::create_view_target(device, &config, format, &chain) {
                Ok(target) => targets.views.push(target),
                Err(err) => {
                    targets.destroy(runtime, device);
                    return Err(err);
                }
            }
        }

        info!(
            views = targets.views.len(),
            width = config.recommended_width,
            height = config.recommended_height,
            format,
            "swapchains created"
        );
        Ok(targets)
    }

    fn create_view_target<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        config: &ViewConfig,
        format: i64,
        chain: &[NativeImage],
    ) -> XrResult<ViewTarget> {
        let depth_format = device.depth_format();
        let depth_image = device.create_image(&ImageCreateInfo {
            width: config.recommended_width,
            height: config.recommended_height,
            format: depth_format,
            sample_count: config.recommended_sample_count.max(1),
            color_attachment: false,
            depth_attachment: true,
            sampled: false,
        })?;
        let depth_view = match device.create_image_view(&ImageViewCreateInfo {
            image: ImageSource::Owned(depth_image),
            format: depth_format,
            aspect: ImageAspect::Depth,
        }) {
            Ok(view) => view,
            Err(err) => {
                device.destroy_image(depth_image);
                return Err(err);
            }
        };

        let mut target = ViewTarget {
            width: config.recommended_width,
            height: config.recommended_height,
            color_views: Vec::with_capacity(chain.len()),
            depth_image,
            depth_view,
        };
        for image in chain {
            let view = device.create_image_view(&ImageViewCreateInfo {
                image: ImageSource::Swapchain(*image),
                format,
                aspect: ImageAspect::Color,
            });
            match view {
                Ok(view) => target.color_views.push(view),
                Err(err) => {
                    release_target(device, &target);
                    return Err(err);
                }
            }
        }
        Ok(target)
    }

    pub fn format(&self) -> i64 {
        self.format
    }

    pub fn views(&self) -> &[ViewTarget] {
        &self.views
    }

    pub fn view(&self, index: usize) -> Option<&ViewTarget> {
        self.views.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Release device views and the runtime swapchains.
    pub fn destroy<R, D>(&mut self, runtime: &mut R, device: &mut D)
    where
        R: XrRuntime + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        for target in self.views.drain(..) {
            release_target(device, &target);
        }
        runtime.destroy_swapchains();
    }
}

fn release_target<D: GraphicsDevice + ?Sized>(device: &mut D, target: &ViewTarget) {
    for view in &target.color_views {
        device.destroy_image_view(*view);
    }
    device.destroy_image_view(target.depth_view);
    device.destroy_image(target.depth_image);
}
