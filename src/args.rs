// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_converter::format::{self, FourCC, Size};
use std::path::PathBuf;

/// Bayer tile order of the raw input.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum BayerOrder {
    /// Red first (RGGB)
    Rggb,
    /// Green then red on the first row (GRBG)
    Grbg,
    /// Green then blue on the first row (GBRG)
    Gbrg,
    /// Blue first (BGGR)
    Bggr,
}

impl From<BayerOrder> for FourCC {
    fn from(order: BayerOrder) -> Self {
        match order {
            BayerOrder::Rggb => format::SRGGB8,
            BayerOrder::Grbg => format::SGRBG8,
            BayerOrder::Gbrg => format::SGBRG8,
            BayerOrder::Bggr => format::SBGGR8,
        }
    }
}

/// Packed 32-bit output layout.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum OutputFormat {
    /// R, G, B, A bytes in memory (DRM ABGR8888)
    Rgba,
    /// B, G, R, A bytes in memory (DRM ARGB8888)
    Bgra,
    /// R, G, B, X bytes in memory (DRM XBGR8888)
    Rgbx,
    /// B, G, R, X bytes in memory (DRM XRGB8888)
    Bgrx,
}

impl From<OutputFormat> for FourCC {
    fn from(fmt: OutputFormat) -> Self {
        match fmt {
            OutputFormat::Rgba => format::ABGR8888,
            OutputFormat::Bgra => format::ARGB8888,
            OutputFormat::Rgbx => format::XBGR8888,
            OutputFormat::Bgrx => format::XRGB8888,
        }
    }
}

/// Command-line arguments for the EdgeFirst Bayer converter.
///
/// Reads one raw 8-bit Bayer frame from a file, converts it on the GPU and
/// writes the packed RGB result. Every option can also be given through the
/// environment.
///
/// # Example
///
/// ```bash
/// edgefirst-converter --input frame.raw --size "1920 1080" --bayer rggb \
///     --output frame.rgba
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// DRM render node used for allocation and rendering
    #[arg(short, long, env = "DEVICE", default_value = "/dev/dri/renderD128")]
    pub device: PathBuf,

    /// Raw Bayer input frame
    #[arg(short, long, env = "INPUT")]
    pub input: PathBuf,

    /// Input resolution in pixels (width height)
    #[arg(
        short,
        long,
        env = "SIZE",
        default_value = "1920 1080",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub size: Vec<u32>,

    /// Input row stride in bytes, defaults to the width
    #[arg(long, env = "STRIDE")]
    pub stride: Option<u32>,

    /// Bayer tile order of the input
    #[arg(short, long, env = "BAYER", default_value = "rggb", value_enum)]
    pub bayer: BayerOrder,

    /// Output pixel layout
    #[arg(short, long, env = "FORMAT", default_value = "rgba", value_enum)]
    pub format: OutputFormat,

    /// Number of output buffers to export
    #[arg(long, env = "BUFFERS", default_value = "1")]
    pub buffers: usize,

    /// Number of times the input is converted, cycling through the buffers
    #[arg(long, env = "FRAMES", default_value = "1")]
    pub frames: u32,

    /// Where the converted frame is written
    #[arg(short, long, env = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Also log to the systemd journal
    #[arg(long, env = "JOURNALD")]
    pub journald: bool,

    /// Enable verbose debug logging
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,
}

impl Args {
    pub fn input_size(&self) -> Size {
        Size::new(self.size[0], self.size[1])
    }

    pub fn input_stride(&self) -> u32 {
        self.stride.unwrap_or(self.size[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["edgefirst-converter", "--input", "frame.raw"]);
        assert_eq!(args.input_size(), Size::new(1920, 1080));
        assert_eq!(args.input_stride(), 1920);
        assert_eq!(FourCC::from(args.bayer), format::SRGGB8);
        assert_eq!(FourCC::from(args.format), format::ABGR8888);
        assert_eq!(args.buffers, 1);
    }

    #[test]
    fn test_size_and_stride() {
        let args = Args::parse_from([
            "edgefirst-converter",
            "--input",
            "frame.raw",
            "--size",
            "640 480",
            "--stride",
            "704",
            "--bayer",
            "bggr",
            "--format",
            "bgrx",
        ]);
        assert_eq!(args.input_size(), Size::new(640, 480));
        assert_eq!(args.input_stride(), 704);
        assert_eq!(FourCC::from(args.bayer), format::SBGGR8);
        assert_eq!(FourCC::from(args.format), format::XRGB8888);
    }
}
