// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    allocator::{BufferAllocator, GbmAllocator, RenderTarget, RenderTargets},
    buffer::{BufferId, FrameBuffer, FrameMetadata, FrameStatus, Plane, PlaneMetadata},
    egl::{self, Card, EglInstance, ImageTargetTexture2DOes, DEFAULT_RENDER_NODE},
    error::{Error, Result},
    format::{self, ConverterFormat, FourCC, Size, SizeRange, StreamConfiguration, OUTPUT_FORMATS},
    shader::{ShaderProgram, BAYER_8_FRAGMENT_SHADER, QUAD_VERTEX_SHADER},
    signal::Signal,
    texture::{check_gl_error, DmaBufImage},
};
use gbm::AsRaw;
use glow::HasContext;
use khronos_egl as khr;
use std::{
    ffi::c_void,
    os::fd::{AsFd, BorrowedFd},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`Converter`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

/// Payload of the completion signals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferEvent {
    pub buffer: BufferId,
    /// Output stream the buffer was rendered for, `None` for the input
    pub stream: Option<u32>,
    pub metadata: FrameMetadata,
}

impl BufferEvent {
    fn new(buffer: &FrameBuffer, stream: Option<u32>) -> Self {
        Self {
            buffer: buffer.id(),
            stream,
            metadata: buffer.metadata().clone(),
        }
    }
}

// Two triangles covering the surface, position then texture coordinate.
#[rustfmt::skip]
const QUAD_VERTICES: [f32; 24] = [
     1.0, -1.0,  1.0, 0.0,
    -1.0, -1.0,  0.0, 0.0,
    -1.0,  1.0,  0.0, 1.0,

     1.0,  1.0,  1.0, 1.0,
     1.0, -1.0,  1.0, 0.0,
    -1.0,  1.0,  0.0, 1.0,
];

const QUAD_STRIDE: i32 = 4 * std::mem::size_of::<f32>() as i32;

/// Static full-surface quad uploaded once per session.
struct Quad {
    vao: glow::VertexArray,
    vbo: glow::Buffer,
}

impl Quad {
    fn new(gl: &glow::Context) -> Result<Self> {
        let bytes = QUAD_VERTICES
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect::<Vec<u8>>();
        unsafe {
            let vao = gl.create_vertex_array().map_err(Error::Context)?;
            let vbo = match gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(e) => {
                    gl.delete_vertex_array(vao);
                    return Err(Error::Context(e));
                }
            };
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STATIC_DRAW);
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, QUAD_STRIDE, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, QUAD_STRIDE, 8);
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            Ok(Self { vao, vbo })
        }
    }

    fn draw(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_vertex_array(Some(self.vao));
            gl.draw_arrays(glow::TRIANGLES, 0, 6);
            gl.bind_vertex_array(None);
        }
    }

    fn delete(self, gl: &glow::Context) {
        unsafe {
            gl.delete_buffer(self.vbo);
            gl.delete_vertex_array(self.vao);
        }
    }
}

/// Everything acquired by `start`, in acquisition order.
///
/// Each field is only populated once the step that creates it succeeded, so
/// [`Session::release`] can tear down a partially opened session.
#[derive(Default)]
struct Session {
    /// GBM allocator device; owns the render node file
    device: Option<gbm::Device<Card>>,
    egl: Option<EglInstance>,
    display: Option<khr::Display>,
    context: Option<khr::Context>,
    gl: Option<glow::Context>,
    image_target: Option<ImageTargetTexture2DOes>,
    program: Option<ShaderProgram>,
    quad: Option<Quad>,
    framebuffer: Option<glow::Framebuffer>,
    /// Framebuffer object currently bound on the context
    bound_framebuffer: Option<glow::Framebuffer>,
}

impl Session {
    fn open(&mut self, path: &Path, input: &ConverterFormat, output: &ConverterFormat) -> Result<()> {
        let (card, node) = Card::open_with_fallback(path)?;
        let device = gbm::Device::new(card)
            .map_err(|e| Error::Context(format!("gbm device on {}: {e}", node.display())))?;
        let native = device.as_raw() as *mut c_void;
        self.device = Some(device);
        debug!("opened {}", node.display());

        let egl: &EglInstance = self.egl.insert(egl::load()?);
        let display = egl::get_gbm_display(egl, native)?;
        self.display = Some(display);
        let (major, minor) = egl.initialize(display)?;
        debug!("EGL {major}.{minor} initialized");
        egl::check_display_extensions(egl, display)?;
        egl.bind_api(khr::OPENGL_ES_API)?;

        let visual = output
            .pixel_format
            .drm_format()
            .ok_or_else(|| Error::Config(format!("no DRM format for {}", output.pixel_format)))?;
        let config = egl::select_config(egl, display, visual as u32)?;
        debug!("selected config {config:?}");

        let ctx = egl
            .create_context(
                display,
                config,
                None,
                &[khr::CONTEXT_CLIENT_VERSION, 3, khr::NONE],
            )
            .map_err(|e| Error::Context(format!("eglCreateContext: {e}")))?;
        self.context = Some(ctx);
        egl.make_current(display, None, None, Some(ctx))
            .map_err(|e| Error::Context(format!("surfaceless eglMakeCurrent: {e}")))?;

        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                egl.get_proc_address(name)
                    .map_or(std::ptr::null(), |p| p as *const c_void)
            })
        };
        let gl: &glow::Context = self.gl.insert(gl);
        debug!("GL {}", unsafe { gl.get_parameter_string(glow::VERSION) });
        self.image_target = Some(egl::image_target_texture(egl)?);

        let program = ShaderProgram::new(gl, QUAD_VERTEX_SHADER, BAYER_8_FRAGMENT_SHADER)?;
        let (red_x, red_y) = input.pixel_format.bayer_first_red().unwrap_or((0, 0));
        program.set_uniform_i32(gl, "tex_y", 0);
        program.set_uniform_ivec2(
            gl,
            "tex_size",
            input.size.width as i32,
            input.size.height as i32,
        );
        program.set_uniform_ivec2(gl, "tex_bayer_first_red", red_x, red_y);
        program.deactivate(gl);
        self.program = Some(program);

        self.quad = Some(Quad::new(gl)?);
        self.framebuffer = Some(unsafe { gl.create_framebuffer() }.map_err(Error::Context)?);
        check_gl_error(gl, "session setup").map_err(Error::Context)?;
        Ok(())
    }

    fn gpu(&mut self) -> Option<Gpu<'_>> {
        Some(Gpu {
            gl: self.gl.as_ref()?,
            egl: self.egl.as_ref()?,
            display: self.display?,
            image_target: self.image_target?,
            program: self.program.as_ref()?,
            quad: self.quad.as_ref()?,
            framebuffer: self.framebuffer?,
            bound_framebuffer: &mut self.bound_framebuffer,
        })
    }

    /// Releases whatever was acquired, newest first: imported images, program,
    /// framebuffer and quad, context, display, allocator device, device node.
    fn release(&mut self, targets: &mut RenderTargets) {
        if let (Some(gl), Some(egl), Some(display)) = (&self.gl, &self.egl, self.display) {
            for image in targets.take_bindings() {
                image.release(gl, egl, display);
            }
        }

        if let Some(gl) = &self.gl {
            if self.bound_framebuffer.take().is_some() {
                unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
            }
            if let Some(program) = self.program.take() {
                program.delete(gl);
            }
            if let Some(framebuffer) = self.framebuffer.take() {
                unsafe { gl.delete_framebuffer(framebuffer) };
            }
            if let Some(quad) = self.quad.take() {
                quad.delete(gl);
            }
        }
        self.bound_framebuffer = None;
        self.image_target = None;
        self.gl = None;

        if let (Some(egl), Some(display)) = (&self.egl, self.display) {
            if let Some(ctx) = self.context.take() {
                let _ = egl.make_current(display, None, None, None);
                if let Err(e) = egl.destroy_context(display, ctx) {
                    error!("eglDestroyContext: {e}");
                }
            }
            if let Err(e) = egl.terminate(display) {
                error!("eglTerminate: {e}");
            }
        }
        self.context = None;
        self.display = None;
        self.egl = None;

        // gbm_device_destroy runs before the node is closed
        if self.device.take().is_some() {
            debug!("render device closed");
        }
    }
}

/// Borrowed view of a running session.
struct Gpu<'a> {
    gl: &'a glow::Context,
    egl: &'a EglInstance,
    display: khr::Display,
    image_target: ImageTargetTexture2DOes,
    program: &'a ShaderProgram,
    quad: &'a Quad,
    framebuffer: glow::Framebuffer,
    bound_framebuffer: &'a mut Option<glow::Framebuffer>,
}

impl Gpu<'_> {
    fn import(
        &self,
        fd: BorrowedFd<'_>,
        offset: u32,
        size: Size,
        format: FourCC,
        pitch: u32,
    ) -> Result<DmaBufImage> {
        DmaBufImage::import(
            self.gl,
            self.egl,
            self.display,
            self.image_target,
            fd,
            size,
            format,
            pitch,
            offset,
        )
    }

    fn release(&self, image: DmaBufImage) {
        image.release(self.gl, self.egl, self.display);
    }

    /// Draws `source` through the debayer program into `target`.
    ///
    /// Binds the framebuffer object unless it is already bound and leaves it
    /// bound; the program and the source texture are unbound and the color
    /// attachment detached before returning.
    fn render(&mut self, source: &DmaBufImage, target: &DmaBufImage) -> Result<()> {
        let gl = self.gl;
        let size = target.size();
        if *self.bound_framebuffer != Some(self.framebuffer) {
            unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.framebuffer)) };
            *self.bound_framebuffer = Some(self.framebuffer);
        }
        target.texture().attach_to_framebuffer(gl);

        let status = unsafe { gl.check_framebuffer_status(glow::FRAMEBUFFER) };
        let result = if status != glow::FRAMEBUFFER_COMPLETE {
            Err(Error::Render(format!("framebuffer incomplete: {status:#X}")))
        } else {
            unsafe {
                gl.viewport(0, 0, size.width as i32, size.height as i32);
                gl.clear_color(0.0, 0.0, 0.0, 1.0);
                gl.clear(glow::COLOR_BUFFER_BIT);
            }
            self.program.activate(gl);
            source.texture().bind(gl, 0);
            self.quad.draw(gl);
            unsafe { gl.finish() };
            let result = check_gl_error(gl, "conversion").map_err(Error::Render);
            source.texture().unbind(gl, 0);
            self.program.deactivate(gl);
            result
        };

        unsafe {
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                None,
                0,
            );
        }
        result
    }
}

/// GPU Bayer to RGB converter working on dma-buf frames.
///
/// The converter is driven from a single thread: it owns an EGL context that
/// is current on the thread that called [`Converter::start`].
///
/// # Example
///
/// ```no_run
/// use edgefirst_converter::{
///     format::{Size, StreamConfiguration, ABGR8888, SRGGB8},
///     Converter, FrameBuffer,
/// };
///
/// fn convert(raw: &mut FrameBuffer) -> Result<(), Box<dyn std::error::Error>> {
///     let mut converter = Converter::new("/dev/dri/renderD128");
///     let input = StreamConfiguration::new(Size::new(640, 480), 640, SRGGB8);
///     let output = StreamConfiguration::new(Size::new(640, 480), 2560, ABGR8888);
///     converter.configure(&input, &[output])?;
///
///     let mut outputs = converter.export_buffers(0, 2)?;
///     let ready = converter.output_ready.connect();
///     converter.start()?;
///
///     let (a, b) = outputs.split_at_mut(1);
///     converter.queue_buffers(raw, &mut [(0, &mut a[0]), (0, &mut b[0])])?;
///     assert_eq!(ready.len(), 2);
///     converter.stop();
///     Ok(())
/// }
/// ```
pub struct Converter {
    device: PathBuf,
    state: State,
    input: Option<ConverterFormat>,
    output: Option<ConverterFormat>,
    allocator: Box<dyn BufferAllocator>,
    targets: RenderTargets,
    session: Session,
    /// Fired once per accepted [`Converter::queue_buffers`] call, after the
    /// input is no longer read by the GPU.
    pub input_consumed: Signal<BufferEvent>,
    /// Fired for every output that was rendered, or whose render failed.
    pub output_ready: Signal<BufferEvent>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_NODE)
    }
}

impl Converter {
    /// Creates a converter rendering on `device` and exporting GBM buffers
    /// from the same node.
    pub fn new(device: impl AsRef<Path>) -> Self {
        let allocator = Box::new(GbmAllocator::new(device.as_ref()));
        Self::with_allocator(device, allocator)
    }

    pub fn with_allocator(device: impl AsRef<Path>, allocator: Box<dyn BufferAllocator>) -> Self {
        Self {
            device: device.as_ref().to_path_buf(),
            state: State::Unconfigured,
            input: None,
            output: None,
            allocator,
            targets: RenderTargets::default(),
            session: Session::default(),
            input_consumed: Signal::new(),
            output_ready: Signal::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn input_format(&self) -> Option<&ConverterFormat> {
        self.input.as_ref()
    }

    pub fn output_format(&self) -> Option<&ConverterFormat> {
        self.output.as_ref()
    }

    /// Output formats reachable from `input`.
    pub fn formats(&self, input: FourCC) -> Vec<FourCC> {
        if input.is_bayer8() {
            OUTPUT_FORMATS.to_vec()
        } else {
            Vec::new()
        }
    }

    /// Output sizes supported for an `input` sized frame. The converter does
    /// not scale.
    pub fn sizes(&self, input: Size) -> SizeRange {
        SizeRange {
            min: input,
            max: input,
        }
    }

    pub fn stride_and_frame_size(&self, format: FourCC, size: Size) -> Option<(u32, usize)> {
        format::stride_and_frame_size(format, size)
    }

    pub fn render_target_count(&self) -> usize {
        self.targets.len()
    }

    /// Whether `id` belongs to a buffer exported by this converter.
    pub fn is_exported(&self, id: BufferId) -> bool {
        self.targets.contains(id)
    }

    /// Validates and stores the input and output stream formats.
    ///
    /// Nothing is retained when validation fails.
    pub fn configure(
        &mut self,
        input: &StreamConfiguration,
        outputs: &[StreamConfiguration],
    ) -> Result<()> {
        if !matches!(self.state, State::Unconfigured | State::Configured) {
            return Err(Error::InvalidState {
                operation: "configure",
                state: self.state,
            });
        }
        let [output] = outputs else {
            return Err(Error::InvalidArgument(format!(
                "exactly one output stream is supported, got {}",
                outputs.len()
            )));
        };
        if !self.targets.is_empty() {
            return Err(Error::InvalidArgument(
                "cannot reconfigure while buffers are exported".to_string(),
            ));
        }
        if !input.pixel_format.is_bayer8() {
            return Err(Error::InvalidArgument(format!(
                "unsupported input format {}",
                input.pixel_format
            )));
        }
        if !self.formats(input.pixel_format).contains(&output.pixel_format) {
            return Err(Error::InvalidArgument(format!(
                "cannot convert {} to {}",
                input.pixel_format, output.pixel_format
            )));
        }
        let input_format = ConverterFormat::from_stream(input).map_err(Error::InvalidArgument)?;
        let output_format = ConverterFormat::from_stream(output).map_err(Error::InvalidArgument)?;
        if !self.sizes(input.size).contains(output.size) {
            return Err(Error::InvalidArgument(format!(
                "output size {} not supported for input {}",
                output.size, input.size
            )));
        }

        debug!(
            "configured {} {} stride {} -> {} {} stride {}",
            input.size,
            input.pixel_format,
            input.stride,
            output.size,
            output.pixel_format,
            output.stride
        );
        self.input = Some(input_format);
        self.output = Some(output_format);
        self.state = State::Configured;
        Ok(())
    }

    /// Allocates `count` output buffers for stream `output`.
    ///
    /// Either every buffer is allocated and registered as a render target or
    /// none is. While running, the buffers are imported into the GPU right
    /// away; otherwise on their first conversion.
    pub fn export_buffers(&mut self, output: usize, count: usize) -> Result<Vec<FrameBuffer>> {
        let Some(format) = self.output.clone() else {
            return Err(Error::InvalidState {
                operation: "export_buffers",
                state: self.state,
            });
        };
        if output != 0 {
            return Err(Error::InvalidArgument(format!(
                "invalid output index {output}"
            )));
        }
        if count == 0 {
            return Err(Error::InvalidArgument(
                "buffer count must be at least 1".to_string(),
            ));
        }
        if !self.targets.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "buffers already exported for output {output}"
            )));
        }

        let mut allocations = Vec::new();
        for _ in 0..count {
            let allocation = self
                .allocator
                .allocate(format.size, format.pixel_format)
                .map_err(|e| match e {
                    Error::Allocation(_) => e,
                    e => Error::Allocation(e.to_string()),
                })?;
            if allocation.stride != format.bytes_per_line() {
                warn!(
                    "allocator stride {} differs from configured stride {}",
                    allocation.stride,
                    format.bytes_per_line()
                );
            }
            allocations.push(allocation);
        }

        let mut exported = Vec::new();
        for allocation in allocations {
            let target = RenderTarget {
                size: format.size,
                format: format.pixel_format,
                pitch: allocation.stride,
                offset: allocation.offset,
                binding: None,
            };
            let mut buffer = FrameBuffer::new(vec![Plane::new(
                allocation.fd,
                allocation.offset,
                allocation.length,
            )]);
            buffer.metadata_mut().planes[0].bytes_used = allocation.length;
            exported.push((buffer, target));
        }

        if let Some(gpu) = self.session.gpu() {
            let mut failure = None;
            for (buffer, target) in exported.iter_mut() {
                let fd = buffer.planes()[0].fd.as_fd();
                match gpu.import(fd, target.offset, target.size, target.format, target.pitch) {
                    Ok(image) => target.binding = Some(image),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                for (_, target) in exported {
                    if let Some(image) = target.binding {
                        gpu.release(image);
                    }
                }
                return Err(e);
            }
        }

        let mut buffers = Vec::new();
        for (buffer, target) in exported {
            self.targets.insert(buffer.id(), target)?;
            buffers.push(buffer);
        }
        debug!(
            "exported {count} {} {} buffers",
            format.size, format.pixel_format
        );
        Ok(buffers)
    }

    /// Opens the render device and builds the GPU session.
    ///
    /// On failure everything acquired so far is released and the state is
    /// left unchanged.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, State::Configured | State::Stopped) {
            return Err(Error::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        let (Some(input), Some(output)) = (&self.input, &self.output) else {
            return Err(Error::InvalidState {
                operation: "start",
                state: self.state,
            });
        };

        if let Err(e) = self.session.open(&self.device, input, output) {
            error!("converter start failed: {e}");
            self.session.release(&mut self.targets);
            return Err(e);
        }
        self.state = State::Running;
        info!("converter started on {}", self.device.display());
        Ok(())
    }

    /// Releases the GPU session in reverse acquisition order, then lets the
    /// allocator close its device. Safe to call in any state; exported buffers
    /// stay registered and are re-imported after the next start.
    pub fn stop(&mut self) {
        self.session.release(&mut self.targets);
        self.allocator.close();
        if self.state == State::Running {
            self.state = State::Stopped;
            info!("converter stopped");
        }
    }

    /// Converts `input` into every buffer of `outputs`, given as
    /// `(stream index, buffer)` pairs.
    ///
    /// Blocks until the GPU finished. Each successful output gets its metadata
    /// filled in and `output_ready` fired; a render error marks the output as
    /// failed, still fires `output_ready`, and skips the remaining outputs.
    /// `input_consumed` fires once for every call that passed validation.
    pub fn queue_buffers(
        &mut self,
        input: &mut FrameBuffer,
        outputs: &mut [(u32, &mut FrameBuffer)],
    ) -> Result<()> {
        if outputs.is_empty() {
            return Err(Error::InvalidArgument("no output buffers".to_string()));
        }
        if self.state != State::Running {
            return Err(Error::InvalidState {
                operation: "queue_buffers",
                state: self.state,
            });
        }
        let (Some(input_format), Some(output_format)) = (&self.input, &self.output) else {
            return Err(Error::InvalidState {
                operation: "queue_buffers",
                state: self.state,
            });
        };
        if input.planes().is_empty() {
            return Err(Error::InvalidArgument(format!("input {input} has no planes")));
        }
        for (stream, buffer) in outputs.iter() {
            if *stream != 0 {
                return Err(Error::InvalidArgument(format!(
                    "invalid output stream {stream}"
                )));
            }
            if buffer.planes().is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "output {buffer} has no planes"
                )));
            }
        }
        let Some(mut gpu) = self.session.gpu() else {
            return Err(Error::InvalidState {
                operation: "queue_buffers",
                state: self.state,
            });
        };

        let result = convert(
            &mut gpu,
            &mut self.targets,
            &mut self.output_ready,
            input,
            outputs,
            input_format,
            output_format,
        );
        self.input_consumed.emit(BufferEvent::new(input, None));
        result
    }
}

impl Drop for Converter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn convert(
    gpu: &mut Gpu<'_>,
    targets: &mut RenderTargets,
    output_ready: &mut Signal<BufferEvent>,
    input: &FrameBuffer,
    outputs: &mut [(u32, &mut FrameBuffer)],
    input_format: &ConverterFormat,
    output_format: &ConverterFormat,
) -> Result<()> {
    let plane = &input.planes()[0];
    let source = gpu.import(
        plane.fd.as_fd(),
        plane.offset,
        input_format.size,
        input_format.pixel_format,
        input_format.bytes_per_line(),
    )?;

    // configure guarantees the product fits
    let bytes_used = output_format.bytes_per_line() * output_format.size.height;
    let result = render_outputs(
        input.metadata(),
        outputs,
        bytes_used,
        output_ready,
        |output| queue_buffer_gl(gpu, targets, &source, output, output_format),
    );

    gpu.release(source);
    result
}

/// Runs `render` on each output in order and records the outcome.
///
/// Success copies sequence and timestamp from `input`, sets `bytes_used` and
/// fires `output_ready`. A render error marks the output as failed and still
/// fires `output_ready`; any other error fires nothing. Either error stops the
/// remaining outputs.
fn render_outputs(
    input: &FrameMetadata,
    outputs: &mut [(u32, &mut FrameBuffer)],
    bytes_used: u32,
    output_ready: &mut Signal<BufferEvent>,
    mut render: impl FnMut(&FrameBuffer) -> Result<()>,
) -> Result<()> {
    for (stream, output) in outputs.iter_mut() {
        match render(&**output) {
            Ok(()) => {
                let metadata = output.metadata_mut();
                metadata.status = FrameStatus::Success;
                metadata.sequence = input.sequence;
                metadata.timestamp = input.timestamp;
                metadata.planes.resize(1, PlaneMetadata::default());
                metadata.planes[0].bytes_used = bytes_used;
                output_ready.emit(BufferEvent::new(output, Some(*stream)));
            }
            Err(e @ Error::Render(_)) => {
                output.metadata_mut().status = FrameStatus::Error;
                output_ready.emit(BufferEvent::new(output, Some(*stream)));
                return Err(e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Renders into one output, importing it first when its render target has
/// no live binding. Buffers this converter did not export are imported for
/// the duration of the draw only.
fn queue_buffer_gl(
    gpu: &mut Gpu<'_>,
    targets: &mut RenderTargets,
    source: &DmaBufImage,
    output: &FrameBuffer,
    format: &ConverterFormat,
) -> Result<()> {
    let plane = &output.planes()[0];
    let mut transient = None;
    let target = match targets.get_mut(output.id()) {
        Some(target) => {
            let binding = match target.binding.take() {
                Some(binding) => binding,
                None => gpu.import(
                    plane.fd.as_fd(),
                    target.offset,
                    target.size,
                    target.format,
                    target.pitch,
                )?,
            };
            &*target.binding.insert(binding)
        }
        None => {
            debug!("{output} was not exported here, importing for this frame");
            let image = gpu.import(
                plane.fd.as_fd(),
                plane.offset,
                format.size,
                format.pixel_format,
                format.bytes_per_line(),
            )?;
            &*transient.insert(image)
        }
    };

    let result = gpu.render(source, target);
    if let Some(image) = transient {
        gpu.release(image);
    }
    result
}
