// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error types for the converter.

use crate::{converter::State, shader::ShaderStage};
use std::io;
use thiserror::Error;

/// Errors reported by the converter and its GPU helpers.
///
/// None of these are retried internally, retry policy belongs to the
/// pipeline driving the converter.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad stream index, double export, empty output set and similar caller
    /// mistakes. No state was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the converter's current state.
    #[error("{operation} is not permitted in the {state:?} state")]
    InvalidState {
        operation: &'static str,
        state: State,
    },

    /// Backing memory or buffer object creation failed.
    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    /// No EGL config matches the requested output format, or the display
    /// lacks a required extension.
    #[error("EGL configuration error: {0}")]
    Config(String),

    /// The rendering context could not be created or made current.
    #[error("rendering context error: {0}")]
    Context(String),

    /// A shader stage failed to compile.
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },

    /// The shader program failed to link.
    #[error("shader program failed to link: {log}")]
    Link { log: String },

    /// Zero-copy import of a dma-buf failed or left a GL error pending.
    #[error("dma-buf import failed: {0}")]
    Import(String),

    /// A GL error was raised while rendering a conversion.
    #[error("render failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("EGL error: {0}")]
    Egl(#[from] khronos_egl::Error),
}

/// Result type for converter operations.
pub type Result<T> = std::result::Result<T, Error>;
