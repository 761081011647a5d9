// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use gbm::Format as DrmFormat;

/// Four character code identifying a pixel format.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

/// 8-bit Bayer, first row blue/green
pub const SBGGR8: FourCC = FourCC(*b"BA81");

/// 8-bit Bayer, first row green/blue
pub const SGBRG8: FourCC = FourCC(*b"GBRG");

/// 8-bit Bayer, first row green/red
pub const SGRBG8: FourCC = FourCC(*b"GRBG");

/// 8-bit Bayer, first row red/green
pub const SRGGB8: FourCC = FourCC(*b"RGGB");

/// 32-bit packed, memory order B G R A
pub const ARGB8888: FourCC = FourCC(*b"AR24");

/// 32-bit packed, memory order R G B A
pub const ABGR8888: FourCC = FourCC(*b"AB24");

/// 32-bit packed, memory order B G R X
pub const XRGB8888: FourCC = FourCC(*b"XR24");

/// 32-bit packed, memory order R G B X
pub const XBGR8888: FourCC = FourCC(*b"XB24");

/// Output formats the debayer shader can render into.
pub const OUTPUT_FORMATS: [FourCC; 4] = [ABGR8888, ARGB8888, XBGR8888, XRGB8888];

impl FourCC {
    /// Bytes occupied by one pixel of the single plane, `None` for formats the
    /// converter does not handle.
    pub const fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            SBGGR8 | SGBRG8 | SGRBG8 | SRGGB8 => Some(1),
            ARGB8888 | ABGR8888 | XRGB8888 | XBGR8888 => Some(4),
            _ => None,
        }
    }

    pub fn is_bayer8(self) -> bool {
        matches!(self, SBGGR8 | SGBRG8 | SGRBG8 | SRGGB8)
    }

    pub fn is_output(self) -> bool {
        OUTPUT_FORMATS.contains(&self)
    }

    /// Coordinates of the first red sample in the 2x2 Bayer tile.
    pub fn bayer_first_red(self) -> Option<(i32, i32)> {
        match self {
            SRGGB8 => Some((0, 0)),
            SGRBG8 => Some((1, 0)),
            SGBRG8 => Some((0, 1)),
            SBGGR8 => Some((1, 1)),
            _ => None,
        }
    }

    /// DRM format used when the plane is handed to GBM or imported into EGL.
    ///
    /// Bayer planes are imported as single channel `R8` images, the shader
    /// does the interpolation.
    pub fn drm_format(self) -> Option<DrmFormat> {
        match self {
            SBGGR8 | SGBRG8 | SGRBG8 | SRGGB8 => Some(DrmFormat::R8),
            ARGB8888 => Some(DrmFormat::Argb8888),
            ABGR8888 => Some(DrmFormat::Abgr8888),
            XRGB8888 => Some(DrmFormat::Xrgb8888),
            XBGR8888 => Some(DrmFormat::Xbgr8888),
            _ => None,
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

impl std::str::FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err(format!("fourcc must be 4 characters, got {s:?}"));
        }
        Ok(FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Inclusive range of sizes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SizeRange {
    pub min: Size,
    pub max: Size,
}

impl SizeRange {
    pub fn contains(&self, size: Size) -> bool {
        size.width >= self.min.width
            && size.width <= self.max.width
            && size.height >= self.min.height
            && size.height <= self.max.height
    }
}

/// Format of one stream as negotiated by the pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StreamConfiguration {
    pub size: Size,
    /// Bytes per line of the single plane
    pub stride: u32,
    pub pixel_format: FourCC,
}

impl StreamConfiguration {
    pub const fn new(size: Size, stride: u32, pixel_format: FourCC) -> Self {
        Self {
            size,
            stride,
            pixel_format,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: u32,
    pub height: u32,
    pub bytes_per_line: u32,
}

impl PlaneLayout {
    pub const fn frame_size(&self) -> usize {
        self.bytes_per_line as usize * self.height as usize
    }
}

/// Validated layout of the converter's input or output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConverterFormat {
    pub size: Size,
    pub pixel_format: FourCC,
    pub planes: Vec<PlaneLayout>,
}

impl ConverterFormat {
    /// Builds the single plane layout of `cfg`, checking that the stride can
    /// hold a full line.
    pub fn from_stream(cfg: &StreamConfiguration) -> Result<Self, String> {
        let bpp = cfg
            .pixel_format
            .bytes_per_pixel()
            .ok_or_else(|| format!("unsupported pixel format {}", cfg.pixel_format))?;
        if cfg.size.is_empty() {
            return Err(format!("invalid size {}", cfg.size));
        }
        let min_stride = cfg.size.width as u64 * bpp as u64;
        if (cfg.stride as u64) < min_stride {
            return Err(format!(
                "stride {} too small for {} {}, need at least {}",
                cfg.stride, cfg.size, cfg.pixel_format, min_stride
            ));
        }
        // plane lengths travel as u32 through dma-buf metadata
        if cfg.stride.checked_mul(cfg.size.height).is_none() {
            return Err(format!(
                "{} frame with stride {} does not fit in 4 GiB",
                cfg.size, cfg.stride
            ));
        }
        Ok(Self {
            size: cfg.size,
            pixel_format: cfg.pixel_format,
            planes: vec![PlaneLayout {
                width: cfg.size.width,
                height: cfg.size.height,
                bytes_per_line: cfg.stride,
            }],
        })
    }

    pub fn bytes_per_line(&self) -> u32 {
        self.planes[0].bytes_per_line
    }

    pub fn frame_size(&self) -> usize {
        self.planes.iter().map(PlaneLayout::frame_size).sum()
    }
}

/// Tightly packed stride and frame size for `format` at `size`.
pub fn stride_and_frame_size(format: FourCC, size: Size) -> Option<(u32, usize)> {
    let stride = size.width.checked_mul(format.bytes_per_pixel()?)?;
    Some((stride, stride as usize * size.height as usize))
}
