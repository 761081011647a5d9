// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    egl::{self, ext, EglInstance, ImageTargetTexture2DOes},
    error::{Error, Result},
    format::{FourCC, Size},
};
use glow::HasContext;
use khronos_egl::{self as khr, Attrib};
use std::os::fd::{AsRawFd, BorrowedFd};
use tracing::{debug, error};

/// A GL texture handle and the target it binds to.
#[derive(Debug)]
pub struct Texture {
    id: glow::Texture,
    target: u32,
}

impl Texture {
    pub fn new(gl: &glow::Context, target: u32) -> Result<Self> {
        let id = unsafe { gl.create_texture() }.map_err(Error::Import)?;
        Ok(Self { id, target })
    }

    /// Binds the texture to texture unit `unit`, leaving `unit` active.
    pub fn bind(&self, gl: &glow::Context, unit: u32) {
        unsafe {
            gl.active_texture(glow::TEXTURE0 + unit);
            gl.bind_texture(self.target, Some(self.id));
        }
    }

    pub fn unbind(&self, gl: &glow::Context, unit: u32) {
        unsafe {
            gl.active_texture(glow::TEXTURE0 + unit);
            gl.bind_texture(self.target, None);
        }
    }

    /// Nearest filtering and edge clamping, so samples never blend across
    /// Bayer tiles. Applies to the texture bound on the active unit.
    pub fn configure_sampling(&self, gl: &glow::Context) {
        unsafe {
            gl.tex_parameter_i32(self.target, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(self.target, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(self.target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(self.target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        }
    }

    /// Attaches the texture as color attachment 0 of the bound framebuffer.
    pub fn attach_to_framebuffer(&self, gl: &glow::Context) {
        unsafe {
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                self.target,
                Some(self.id),
                0,
            );
        }
    }

    /// Releases the GL texture. An EGL image it samples from is not affected.
    pub fn delete(self, gl: &glow::Context) {
        unsafe { gl.delete_texture(self.id) };
    }
}

/// A dma-buf imported as an EGL image and bound to a texture.
///
/// Must be released with [`DmaBufImage::release`] before the context and
/// display go away and before the memory it maps is freed.
pub struct DmaBufImage {
    texture: Texture,
    image: khr::Image,
    size: Size,
}

impl DmaBufImage {
    /// Imports `fd` as a `size` image of `format` with rows `pitch` bytes
    /// apart, starting `offset` bytes into the buffer.
    ///
    /// The GL error state is polled right after the import; a pending error
    /// fails the import instead of surfacing during a later draw.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn import(
        gl: &glow::Context,
        egl: &EglInstance,
        display: khr::Display,
        image_target: ImageTargetTexture2DOes,
        fd: BorrowedFd<'_>,
        size: Size,
        format: FourCC,
        pitch: u32,
        offset: u32,
    ) -> Result<Self> {
        let drm = format
            .drm_format()
            .ok_or_else(|| Error::Import(format!("no DRM format for {format}")))?;
        let attribs = [
            khr::WIDTH as Attrib,
            size.width as Attrib,
            khr::HEIGHT as Attrib,
            size.height as Attrib,
            ext::LINUX_DRM_FOURCC as Attrib,
            drm as u32 as Attrib,
            ext::DMA_BUF_PLANE0_FD as Attrib,
            fd.as_raw_fd() as Attrib,
            ext::DMA_BUF_PLANE0_OFFSET as Attrib,
            offset as Attrib,
            ext::DMA_BUF_PLANE0_PITCH as Attrib,
            pitch as Attrib,
            khr::NONE as Attrib,
        ];

        let image = egl::create_image(egl, display, &attribs)
            .map_err(|e| Error::Import(format!("{size} {format} fd {}: {e}", fd.as_raw_fd())))?;

        let texture = match Texture::new(gl, glow::TEXTURE_2D) {
            Ok(texture) => texture,
            Err(e) => {
                let _ = egl::destroy_image(egl, display, image);
                return Err(e);
            }
        };

        texture.bind(gl, 0);
        unsafe { image_target(glow::TEXTURE_2D, image.as_ptr()) };
        texture.configure_sampling(gl);
        texture.unbind(gl, 0);

        let img = Self {
            texture,
            image,
            size,
        };
        if let Err(e) = check_gl_error(gl, "dma-buf import") {
            img.release(gl, egl, display);
            return Err(Error::Import(e));
        }
        debug!(
            "imported fd {} as {size} {format} pitch {pitch}",
            fd.as_raw_fd()
        );
        Ok(img)
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Deletes the texture, then destroys the EGL image.
    pub(crate) fn release(self, gl: &glow::Context, egl: &EglInstance, display: khr::Display) {
        self.texture.delete(gl);
        if let Err(e) = egl::destroy_image(egl, display, self.image) {
            error!("could not destroy EGL image: {e}");
        }
    }
}

/// Drains the GL error queue, returning every pending error code.
pub(crate) fn check_gl_error(gl: &glow::Context, what: &str) -> std::result::Result<(), String> {
    let mut errors = Vec::new();
    loop {
        let err = unsafe { gl.get_error() };
        if err == glow::NO_ERROR || errors.len() >= 8 {
            break;
        }
        errors.push(format!("{err:#X}"));
    }
    if errors.is_empty() {
        return Ok(());
    }
    let msg = format!("{what}: GL error {}", errors.join(", "));
    error!("{msg}");
    Err(msg)
}
