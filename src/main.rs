// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use dma_heap::HeapKind;
use edgefirst_converter::{
    allocator::{BufferAllocator, HeapAllocator},
    format::{FourCC, Size, StreamConfiguration},
    Converter, FrameBuffer, FrameStatus, Plane,
};
use serde_json::json;
use std::{
    error::Error,
    fs,
    time::{Instant, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

fn init_logging(args: &Args) {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let journald = if args.journald {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer.with_filter(level)),
            Err(e) => {
                eprintln!("journald unavailable: {e}");
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(level))
        .with(journald)
        .init();
}

/// Allocates a CMA buffer, or system heap memory when there is no CMA heap,
/// and fills it with the raw frame.
fn load_input(args: &Args, format: FourCC) -> Result<FrameBuffer, Box<dyn Error>> {
    let data = fs::read(&args.input)?;
    let stride = args.input_stride();
    let size = args.input_size();
    let needed = stride as usize * size.height as usize;
    if data.len() < needed {
        return Err(format!(
            "{} holds {} bytes, a {size} frame with stride {stride} needs {needed}",
            args.input.display(),
            data.len()
        )
        .into());
    }

    let mut heap = match HeapAllocator::new(HeapKind::Cma) {
        Ok(heap) => heap,
        Err(e) => {
            warn!("{e}, falling back to the system heap");
            HeapAllocator::new(HeapKind::System)?
        }
    };
    let allocation = heap.allocate(Size::new(stride, size.height), format)?;
    let buffer = FrameBuffer::new(vec![Plane::new(
        allocation.fd,
        allocation.offset,
        allocation.length,
    )]);
    buffer.write_plane(0, |dst| {
        let len = dst.len().min(needed);
        dst[..len].copy_from_slice(&data[..len]);
    })?;
    debug!("loaded {needed} bytes from {}", args.input.display());
    Ok(buffer)
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args);

    let input_format = FourCC::from(args.bayer);
    let output_format = FourCC::from(args.format);
    let size = args.input_size();
    let (output_stride, _) = edgefirst_converter::format::stride_and_frame_size(output_format, size)
        .ok_or_else(|| format!("unsupported output format {output_format}"))?;

    let mut input = load_input(&args, input_format)?;

    let mut converter = Converter::new(&args.device);
    converter.configure(
        &StreamConfiguration::new(size, args.input_stride(), input_format),
        &[StreamConfiguration::new(size, output_stride, output_format)],
    )?;
    let mut outputs = converter.export_buffers(0, args.buffers)?;
    let consumed = converter.input_consumed.connect();
    let ready = converter.output_ready.connect();
    converter.start()?;

    let start = Instant::now();
    let mut last = 0;
    for frame in 0..args.frames {
        let metadata = input.metadata_mut();
        metadata.sequence = frame;
        metadata.timestamp = timestamp();

        last = frame as usize % outputs.len();
        converter.queue_buffers(&mut input, &mut [(0, &mut outputs[last])])?;
    }
    let elapsed = start.elapsed();
    converter.stop();

    let mut failed = 0;
    while let Ok(Some(event)) = ready.try_recv() {
        if event.metadata.status != FrameStatus::Success {
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(format!("{failed} frames failed to convert").into());
    }
    let consumed = consumed.len();

    if let Some(path) = &args.output {
        outputs[last].read_plane(0, |data| fs::write(path, data))??;
        info!("wrote {} to {}", output_format, path.display());
    }

    let frames = args.frames.max(1) as f64;
    let summary = json!({
        "device": args.device,
        "input": {
            "path": args.input,
            "format": input_format.to_string(),
            "width": size.width,
            "height": size.height,
            "stride": args.input_stride(),
        },
        "output": {
            "path": args.output,
            "format": output_format.to_string(),
            "stride": output_stride,
            "buffers": outputs.len(),
            "bytes_used": outputs[last].metadata().planes[0].bytes_used,
        },
        "frames": args.frames,
        "consumed": consumed,
        "elapsed_ms": elapsed.as_secs_f64() * 1e3,
        "frame_ms": elapsed.as_secs_f64() * 1e3 / frames,
    });
    println!("{summary:#}");
    Ok(())
}
