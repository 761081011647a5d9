// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EGL plumbing: render node, libEGL loading, GBM platform display, config
//! selection and EGL image creation with an EGL 1.5 / KHR fallback.

use crate::error::{Error, Result};
use khronos_egl::{self as egl, Attrib};
use std::{
    ffi::c_void,
    fs::{File, OpenOptions},
    io,
    os::fd::{AsFd, BorrowedFd},
    path::{Path, PathBuf},
    ptr::null_mut,
};
use tracing::{debug, trace};

pub(crate) type EglInstance = egl::Instance<egl::Dynamic<libloading::Library, egl::EGL1_4>>;

/// `glEGLImageTargetTexture2DOES`, resolved through `eglGetProcAddress`.
pub(crate) type ImageTargetTexture2DOes =
    unsafe extern "system" fn(target: u32, image: *mut c_void);

/// Default render-capable node.
pub const DEFAULT_RENDER_NODE: &str = "/dev/dri/renderD128";

const FALLBACK_NODES: [&str; 2] = ["/dev/dri/card0", "/dev/dri/card1"];

/// An open DRM device node.
#[derive(Debug)]
pub struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl Card {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path);
        match file {
            Ok(file) => Ok(Card(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("render device not found: {}", path.display()),
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Opens `path`, and when it is the default render node also tries the
    /// primary nodes before giving up.
    pub fn open_with_fallback(path: &Path) -> Result<(Self, PathBuf)> {
        let first = Self::open(path);
        if first.is_ok() || path != Path::new(DEFAULT_RENDER_NODE) {
            return first.map(|card| (card, path.to_path_buf()));
        }
        for node in FALLBACK_NODES {
            if let Ok(card) = Self::open(Path::new(node)) {
                debug!("render node {} unavailable, using {node}", path.display());
                return Ok((card, PathBuf::from(node)));
            }
        }
        first.map(|card| (card, path.to_path_buf()))
    }
}

pub(crate) fn load() -> Result<EglInstance> {
    let lib = unsafe { libloading::Library::new("libEGL.so.1") }
        .map_err(|e| Error::Context(format!("failed to load libEGL.so.1: {e}")))?;
    unsafe { egl::DynamicInstance::<egl::EGL1_4>::load_required_from(lib) }
        .map_err(|e| Error::Context(format!("failed to load EGL 1.4 entry points: {e:?}")))
}

pub(crate) fn client_extensions(egl: &EglInstance, display: Option<egl::Display>) -> String {
    match egl.query_string(display, egl::EXTENSIONS) {
        Ok(ext) => ext.to_string_lossy().into_owned(),
        Err(_) => String::new(),
    }
}

pub(crate) fn has_extension(extensions: &str, name: &str) -> bool {
    extensions.split_ascii_whitespace().any(|e| e == name)
}

/// Checks the display extensions the converter cannot work without.
pub(crate) fn check_display_extensions(egl: &EglInstance, display: egl::Display) -> Result<()> {
    let extensions = client_extensions(egl, Some(display));
    debug!("EGL display extensions: {extensions}");
    for required in [
        "EGL_EXT_image_dma_buf_import",
        "EGL_KHR_surfaceless_context",
    ] {
        if !has_extension(&extensions, required) {
            return Err(Error::Config(format!(
                "EGL display does not support {required}"
            )));
        }
    }
    if egl.upcast::<egl::EGL1_5>().is_none() && egl.get_proc_address("eglCreateImageKHR").is_none()
    {
        return Err(Error::Config(
            "EGL does not provide eglCreateImageKHR".to_string(),
        ));
    }
    Ok(())
}

/// Gets the display for a GBM device, through EGL 1.5 or
/// `eglGetPlatformDisplayEXT`.
pub(crate) fn get_gbm_display(
    egl: &EglInstance,
    gbm: *mut c_void,
) -> Result<egl::Display> {
    if let Some(egl) = egl.upcast::<egl::EGL1_5>() {
        return unsafe { egl.get_platform_display(ext::PLATFORM_GBM_KHR, gbm, &[egl::ATTRIB_NONE]) }
            .map_err(Error::from);
    }
    let Some(func) = egl.get_proc_address("eglGetPlatformDisplayEXT") else {
        return Err(Error::Context(
            "EGL provides neither 1.5 nor eglGetPlatformDisplayEXT".to_string(),
        ));
    };
    let func: unsafe extern "system" fn(
        platform: egl::Enum,
        native_display: *mut c_void,
        attrib_list: *const egl::Int,
    ) -> egl::EGLDisplay = unsafe { std::mem::transmute(func) };
    let attribs = [egl::NONE];
    let display = unsafe { func(ext::PLATFORM_GBM_KHR, gbm, attribs.as_ptr()) };
    if display == egl::NO_DISPLAY {
        return Err(egl
            .get_error()
            .map(Error::from)
            .unwrap_or_else(|| Error::Context("eglGetPlatformDisplayEXT failed".to_string())));
    }
    Ok(unsafe { egl::Display::from_ptr(display) })
}

/// Picks the first candidate whose native visual is `visual`.
pub(crate) fn find_config<C: Copy>(candidates: &[(C, egl::Int)], visual: u32) -> Option<C> {
    candidates
        .iter()
        .find(|(_, id)| *id as u32 == visual)
        .map(|(config, _)| *config)
}

/// Enumerates every config of `display` and returns one that renders GLES 3
/// into buffers of the DRM format `visual`.
pub(crate) fn select_config(
    egl: &EglInstance,
    display: egl::Display,
    visual: u32,
) -> Result<egl::Config> {
    let count = egl.get_config_count(display)?;
    let mut configs = Vec::with_capacity(count);
    egl.get_configs(display, &mut configs)?;
    debug!("display exposes {} configs", configs.len());

    let mut candidates = Vec::with_capacity(configs.len());
    for config in configs {
        let renderable = egl.get_config_attrib(display, config, egl::RENDERABLE_TYPE)?;
        if renderable & egl::OPENGL_ES3_BIT == 0 {
            continue;
        }
        let id = egl.get_config_attrib(display, config, egl::NATIVE_VISUAL_ID)?;
        trace!("config {config:?} native visual {id:#x}");
        candidates.push((config, id));
    }

    pick_config(&candidates, visual)
}

/// [`find_config`], failing with [`Error::Config`] when nothing matches.
pub(crate) fn pick_config<C: Copy>(candidates: &[(C, egl::Int)], visual: u32) -> Result<C> {
    find_config(candidates, visual).ok_or_else(|| {
        Error::Config(format!(
            "no GLES3 config with native format {:?}",
            String::from_utf8_lossy(&visual.to_le_bytes())
        ))
    })
}

pub(crate) fn create_image(
    egl: &EglInstance,
    display: egl::Display,
    attrib_list: &[Attrib],
) -> Result<egl::Image> {
    let no_context = unsafe { egl::Context::from_ptr(egl::NO_CONTEXT) };
    let no_buffer = unsafe { egl::ClientBuffer::from_ptr(null_mut()) };
    if let Some(egl) = egl.upcast::<egl::EGL1_5>() {
        return egl
            .create_image(display, no_context, ext::LINUX_DMA_BUF, no_buffer, attrib_list)
            .map_err(Error::from);
    }
    let Some(func) = egl.get_proc_address("eglCreateImageKHR") else {
        return Err(Error::Import("eglCreateImageKHR unavailable".to_string()));
    };
    let func: unsafe extern "system" fn(
        display: egl::EGLDisplay,
        ctx: egl::EGLContext,
        target: egl::Enum,
        buffer: egl::EGLClientBuffer,
        attrib_list: *const egl::Int,
    ) -> egl::EGLImage = unsafe { std::mem::transmute(func) };
    let attribs = attrib_list
        .iter()
        .map(|x| *x as egl::Int)
        .collect::<Vec<_>>();
    let image = unsafe {
        func(
            display.as_ptr(),
            no_context.as_ptr(),
            ext::LINUX_DMA_BUF,
            no_buffer.as_ptr(),
            attribs.as_ptr(),
        )
    };
    if image == egl::NO_IMAGE {
        return Err(egl
            .get_error()
            .map(Error::from)
            .unwrap_or_else(|| Error::Import("eglCreateImageKHR returned no image".to_string())));
    }
    Ok(unsafe { egl::Image::from_ptr(image) })
}

pub(crate) fn destroy_image(
    egl: &EglInstance,
    display: egl::Display,
    image: egl::Image,
) -> Result<()> {
    if let Some(egl) = egl.upcast::<egl::EGL1_5>() {
        return egl.destroy_image(display, image).map_err(Error::from);
    }
    let Some(func) = egl.get_proc_address("eglDestroyImageKHR") else {
        return Err(Error::Import("eglDestroyImageKHR unavailable".to_string()));
    };
    let func: unsafe extern "system" fn(
        display: egl::EGLDisplay,
        image: egl::EGLImage,
    ) -> egl::Boolean = unsafe { std::mem::transmute(func) };
    if unsafe { func(display.as_ptr(), image.as_ptr()) } == egl::TRUE {
        Ok(())
    } else {
        Err(egl
            .get_error()
            .map(Error::from)
            .unwrap_or_else(|| Error::Import("eglDestroyImageKHR failed".to_string())))
    }
}

pub(crate) fn image_target_texture(egl: &EglInstance) -> Result<ImageTargetTexture2DOes> {
    let func = egl
        .get_proc_address("glEGLImageTargetTexture2DOES")
        .ok_or_else(|| {
            Error::Context("GL does not provide glEGLImageTargetTexture2DOES".to_string())
        })?;
    Ok(unsafe { std::mem::transmute::<extern "system" fn(), ImageTargetTexture2DOes>(func) })
}

pub(crate) mod ext {
    pub const LINUX_DMA_BUF: u32 = 0x3270;
    pub const LINUX_DRM_FOURCC: u32 = 0x3271;
    pub const DMA_BUF_PLANE0_FD: u32 = 0x3272;
    pub const DMA_BUF_PLANE0_OFFSET: u32 = 0x3273;
    pub const DMA_BUF_PLANE0_PITCH: u32 = 0x3274;

    pub const PLATFORM_GBM_KHR: u32 = 0x31D7;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_config() {
        let abgr = u32::from_le_bytes(*b"AB24");
        let argb = u32::from_le_bytes(*b"AR24");
        let candidates = [(1u8, argb as egl::Int), (2u8, abgr as egl::Int)];
        assert_eq!(find_config(&candidates, abgr), Some(2));
        assert_eq!(find_config(&candidates, argb), Some(1));
        assert_eq!(find_config(&candidates, u32::from_le_bytes(*b"XB24")), None);
        assert_eq!(find_config::<u8>(&[], abgr), None);
    }

    #[test]
    fn test_no_matching_config() {
        let argb = u32::from_le_bytes(*b"AR24");
        let abgr = u32::from_le_bytes(*b"AB24");
        let err = pick_config(&[(1u8, argb as egl::Int)], abgr).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("AB24")));
        assert_eq!(pick_config(&[(1u8, argb as egl::Int)], argb).unwrap(), 1);
    }

    #[test]
    fn test_has_extension() {
        let ext = "EGL_KHR_image_base EGL_EXT_image_dma_buf_import_modifiers";
        assert!(has_extension(ext, "EGL_KHR_image_base"));
        assert!(!has_extension(ext, "EGL_EXT_image_dma_buf_import"));
    }

    #[test]
    fn test_missing_card() {
        let err = Card::open(Path::new("/dev/dri/does-not-exist")).unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::NotFound));
    }
}
