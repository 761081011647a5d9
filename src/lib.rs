// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst GPU Bayer Converter
//!
//! Converts raw 8-bit Bayer camera frames into packed 32-bit RGB frames on
//! the GPU. Frames are exchanged as dma-buf file descriptors and imported
//! into OpenGL ES as EGL images, so pixels are never copied through the CPU
//! on their way in or out.
//!
//! ## Features
//!
//! - **Zero-copy**: input and output buffers are dma-bufs imported with
//!   `EGL_EXT_image_dma_buf_import`.
//! - **Headless**: renders through a surfaceless GLES 3 context on a GBM
//!   display, no window system required.
//! - **Buffer export**: output buffers are allocated by GBM (or a DMA heap)
//!   and handed to the caller, who returns them for every frame.
//! - **Completion signals**: `input_consumed` and `output_ready` notify any
//!   number of subscribers through channels.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_converter::{
//!     format::{Size, StreamConfiguration, ABGR8888, SRGGB8},
//!     Converter,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut converter = Converter::new("/dev/dri/renderD128");
//! converter.configure(
//!     &StreamConfiguration::new(Size::new(1920, 1080), 1920, SRGGB8),
//!     &[StreamConfiguration::new(Size::new(1920, 1080), 7680, ABGR8888)],
//! )?;
//! let buffers = converter.export_buffers(0, 4)?;
//! converter.start()?;
//! # drop(buffers);
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Linux** with a DRM render node and dma-buf support
//! - **libEGL.so.1** exposing `EGL_EXT_image_dma_buf_import` and
//!   `EGL_KHR_surfaceless_context`, with OpenGL ES 3.0
//!
//! ## Safety
//!
//! EGL and GL are driven through FFI. The unsafe calls are confined to the
//! `egl`, `texture`, `shader` and `converter` modules and every handle they
//! produce is released by its owner.

pub mod allocator;
pub mod buffer;
pub mod converter;
pub mod egl;
pub mod error;
pub mod format;
pub mod shader;
pub mod signal;
pub mod texture;

pub use buffer::{BufferId, FrameBuffer, FrameMetadata, FrameStatus, Plane};
pub use converter::{BufferEvent, Converter, State};
pub use error::{Error, Result};
