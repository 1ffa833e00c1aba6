use std::ffi::{c_void, CString};
use std::ptr;

use openxr as xr;
use x11::{glx, xlib};

use grabxr_vr::{XrError, XrResult};

/// Hidden 16x16 X11 window with a current GLX context. The OpenXR session
/// renders into swapchain textures, the window only anchors the context.
pub struct GlxContext {
    display: *mut xlib::Display,
    fb_config: glx::GLXFBConfig,
    visualid: u64,
    drawable: glx::GLXDrawable,
    context: glx::GLXContext,
}

impl GlxContext {
    /// # Safety
    /// Must be called on the thread that will issue every GL call.
    pub unsafe fn new(title: &str) -> XrResult<Self> {
        let display = xlib::XOpenDisplay(ptr::null());
        if display.is_null() {
            return Err(XrError::Unavailable("XOpenDisplay failed".to_string()));
        }

        let screen = xlib::XDefaultScreen(display);
        let attrs = [
            glx::GLX_X_RENDERABLE,
            1,
            glx::GLX_DRAWABLE_TYPE,
            glx::GLX_WINDOW_BIT,
            glx::GLX_RENDER_TYPE,
            glx::GLX_RGBA_BIT,
            glx::GLX_X_VISUAL_TYPE,
            glx::GLX_TRUE_COLOR,
            glx::GLX_RED_SIZE,
            8,
            glx::GLX_GREEN_SIZE,
            8,
            glx::GLX_BLUE_SIZE,
            8,
            glx::GLX_ALPHA_SIZE,
            8,
            glx::GLX_DEPTH_SIZE,
            24,
            glx::GLX_STENCIL_SIZE,
            8,
            glx::GLX_DOUBLEBUFFER,
            1,
            0,
        ];

        let mut fbcount = 0;
        let fb_configs = glx::glXChooseFBConfig(display, screen, attrs.as_ptr(), &mut fbcount);
        if fb_configs.is_null() || fbcount == 0 {
            xlib::XCloseDisplay(display);
            return Err(XrError::graphics("glXChooseFBConfig failed"));
        }
        let fb_config = *fb_configs;

        let visual_info = glx::glXGetVisualFromFBConfig(display, fb_config);
        if visual_info.is_null() {
            xlib::XFree(fb_configs as *mut _);
            xlib::XCloseDisplay(display);
            return Err(XrError::graphics("glXGetVisualFromFBConfig failed"));
        }
        let visualid = (*visual_info).visualid;

        let root = xlib::XDefaultRootWindow(display);
        let colormap = xlib::XCreateColormap(display, root, (*visual_info).visual, xlib::AllocNone);

        let mut swa: xlib::XSetWindowAttributes = std::mem::zeroed();
        swa.colormap = colormap;
        swa.event_mask = 0;
        let window = xlib::XCreateWindow(
            display,
            root,
            0,
            0,
            16,
            16,
            0,
            (*visual_info).depth,
            xlib::InputOutput as u32,
            (*visual_info).visual,
            xlib::CWColormap,
            &mut swa,
        );
        if let Ok(title) = CString::new(title) {
            xlib::XStoreName(display, window, title.as_ptr());
        }
        xlib::XMapWindow(display, window);

        let context =
            glx::glXCreateNewContext(display, fb_config, glx::GLX_RGBA_TYPE, ptr::null_mut(), 1);
        if context.is_null() {
            xlib::XFree(visual_info as *mut _);
            xlib::XFree(fb_configs as *mut _);
            xlib::XDestroyWindow(display, window);
            xlib::XCloseDisplay(display);
            return Err(XrError::graphics("glXCreateNewContext failed"));
        }

        if glx::glXMakeCurrent(display, window, context) == 0 {
            glx::glXDestroyContext(display, context);
            xlib::XFree(visual_info as *mut _);
            xlib::XFree(fb_configs as *mut _);
            xlib::XDestroyWindow(display, window);
            xlib::XCloseDisplay(display);
            return Err(XrError::graphics("glXMakeCurrent failed"));
        }

        xlib::XFree(visual_info as *mut _);
        xlib::XFree(fb_configs as *mut _);

        Ok(Self {
            display,
            fb_config,
            visualid,
            drawable: window,
            context,
        })
    }

    /// Load GL entry points through `glXGetProcAddress`.
    ///
    /// # Safety
    /// The context must be current on the calling thread.
    pub unsafe fn load_gl(&self) -> glow::Context {
        glow::Context::from_loader_function(|name| {
            let Ok(name) = CString::new(name) else {
                return ptr::null();
            };
            match glx::glXGetProcAddress(name.as_ptr() as *const u8) {
                Some(f) => f as *const c_void,
                None => ptr::null(),
            }
        })
    }

    /// Native binding handed to `xrCreateSession`.
    pub fn session_create_info(&self) -> xr::opengl::SessionCreateInfo {
        xr::opengl::SessionCreateInfo::Xlib {
            x_display: self.display as *mut _,
            visualid: self.visualid as u32,
            glx_fb_config: self.fb_config as *mut _,
            glx_drawable: self.drawable,
            glx_context: self.context as *mut _,
        }
    }
}

impl Drop for GlxContext {
    fn drop(&mut self) {
        unsafe {
            glx::glXMakeCurrent(self.display, 0, ptr::null_mut());
            glx::glXDestroyContext(self.display, self.context);
            xlib::XDestroyWindow(self.display, self.drawable);
            xlib::XCloseDisplay(self.display);
        }
    }
}
