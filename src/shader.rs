// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::error::{Error, Result};
use core::fmt;
use glow::HasContext;
use tracing::{debug, error};

/// Vertex shader drawing the full-surface quad.
pub const QUAD_VERTEX_SHADER: &str = include_str!("shaders/quad.vert");

/// Bilinear debayer of an 8-bit Bayer plane sampled as a single channel
/// texture.
pub const BAYER_8_FRAGMENT_SHADER: &str = include_str!("shaders/bayer_8.frag");

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn gl_type(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// A linked vertex + fragment program.
///
/// [`ShaderProgram::delete`] consumes the program so it cannot be released
/// twice. The owner must call it while the context is still current.
#[derive(Debug)]
pub struct ShaderProgram {
    id: glow::Program,
}

impl ShaderProgram {
    /// Compiles both stages and links them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`] with the driver log if either stage fails to
    /// compile and [`Error::Link`] if linking fails. Every shader object
    /// created on the way is released in both cases.
    pub fn new(gl: &glow::Context, vertex_src: &str, fragment_src: &str) -> Result<Self> {
        let vertex = compile(gl, ShaderStage::Vertex, vertex_src)?;
        let fragment = match compile(gl, ShaderStage::Fragment, fragment_src) {
            Ok(shader) => shader,
            Err(e) => {
                unsafe { gl.delete_shader(vertex) };
                return Err(e);
            }
        };

        let result = unsafe { link(gl, vertex, fragment) };
        unsafe {
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);
        }
        let id = result?;
        debug!("shader program {id:?} linked");
        Ok(Self { id })
    }

    /// Program handle, for binding uniforms and attributes directly.
    pub fn id(&self) -> glow::Program {
        self.id
    }

    /// Makes this the active program of the current context.
    pub fn activate(&self, gl: &glow::Context) {
        unsafe { gl.use_program(Some(self.id)) };
    }

    pub fn deactivate(&self, gl: &glow::Context) {
        unsafe { gl.use_program(None) };
    }

    /// Sets a sampler or integer uniform. Activates the program.
    pub fn set_uniform_i32(&self, gl: &glow::Context, name: &str, value: i32) {
        self.activate(gl);
        if let Some(location) = self.uniform_location(gl, name) {
            unsafe { gl.uniform_1_i32(Some(&location), value) };
        }
    }

    /// Sets an `ivec2` uniform. Activates the program.
    pub fn set_uniform_ivec2(&self, gl: &glow::Context, name: &str, x: i32, y: i32) {
        self.activate(gl);
        if let Some(location) = self.uniform_location(gl, name) {
            unsafe { gl.uniform_2_i32(Some(&location), x, y) };
        }
    }

    fn uniform_location(&self, gl: &glow::Context, name: &str) -> Option<glow::UniformLocation> {
        let location = unsafe { gl.get_uniform_location(self.id, name) };
        if location.is_none() {
            // unused uniforms are optimised away by most drivers
            debug!("uniform {name} not active in program {:?}", self.id);
        }
        location
    }

    pub fn delete(self, gl: &glow::Context) {
        unsafe { gl.delete_program(self.id) };
        debug!("shader program {:?} deleted", self.id);
    }
}

fn compile(gl: &glow::Context, stage: ShaderStage, source: &str) -> Result<glow::Shader> {
    unsafe {
        let shader = gl.create_shader(stage.gl_type()).map_err(|log| Error::Compile {
            stage,
            log,
        })?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            error!("{stage} shader failed to compile: {log}");
            gl.delete_shader(shader);
            return Err(Error::Compile { stage, log });
        }
        Ok(shader)
    }
}

unsafe fn link(
    gl: &glow::Context,
    vertex: glow::Shader,
    fragment: glow::Shader,
) -> Result<glow::Program> {
    let program = gl.create_program().map_err(|log| Error::Link { log })?;
    gl.attach_shader(program, vertex);
    gl.attach_shader(program, fragment);
    gl.link_program(program);
    gl.detach_shader(program, vertex);
    gl.detach_shader(program, fragment);
    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        error!("shader program failed to link: {log}");
        gl.delete_program(program);
        return Err(Error::Link { log });
    }
    Ok(program)
}
