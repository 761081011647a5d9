// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use dma_heap::HeapKind;
use edgefirst_converter::{
    allocator::{BufferAllocator, HeapAllocator},
    egl::DEFAULT_RENDER_NODE,
    format::{Size, StreamConfiguration, ABGR8888, SRGGB8},
    Converter, FrameBuffer, FrameStatus, Plane, State,
};
use serial_test::serial;
use std::{error::Error, time::Instant};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const OUTPUT_STRIDE: u32 = WIDTH * 4;

fn configured() -> Result<Converter, Box<dyn Error>> {
    let mut converter = Converter::new(DEFAULT_RENDER_NODE);
    converter.configure(
        &StreamConfiguration::new(Size::new(WIDTH, HEIGHT), WIDTH, SRGGB8),
        &[StreamConfiguration::new(
            Size::new(WIDTH, HEIGHT),
            OUTPUT_STRIDE,
            ABGR8888,
        )],
    )?;
    Ok(converter)
}

/// An RGGB frame lit only on its red sites.
fn red_frame() -> Result<FrameBuffer, Box<dyn Error>> {
    let mut heap = HeapAllocator::new(HeapKind::Cma)
        .or_else(|_| HeapAllocator::new(HeapKind::System))?;
    let allocation = heap.allocate(Size::new(WIDTH, HEIGHT), SRGGB8)?;
    let buffer = FrameBuffer::new(vec![Plane::new(
        allocation.fd,
        allocation.offset,
        allocation.length,
    )]);
    buffer.write_plane(0, |data| {
        for (i, px) in data.iter_mut().enumerate() {
            let (x, y) = (i as u32 % WIDTH, i as u32 / WIDTH);
            *px = if x % 2 == 0 && y % 2 == 0 { 255 } else { 0 };
        }
    })?;
    Ok(buffer)
}

#[test]
#[serial]
#[ignore = "requires a DRM render node"]
fn test_convert_into_two_outputs() -> Result<(), Box<dyn Error>> {
    let mut converter = configured()?;
    let mut outputs = converter.export_buffers(0, 2)?;
    assert_eq!(converter.render_target_count(), 2);

    let consumed = converter.input_consumed.connect();
    let ready = converter.output_ready.connect();
    converter.start()?;
    assert_eq!(converter.state(), State::Running);

    let mut input = red_frame()?;
    input.metadata_mut().sequence = 42;
    input.metadata_mut().timestamp = 1_000_000;

    let now = Instant::now();
    let (a, b) = outputs.split_at_mut(1);
    converter.queue_buffers(&mut input, &mut [(0, &mut a[0]), (0, &mut b[0])])?;
    println!("converted {WIDTH}x{HEIGHT} into two buffers in {:?}", now.elapsed());

    assert_eq!(consumed.len(), 1);
    assert_eq!(consumed.try_recv()?.map(|e| e.buffer), Some(input.id()));

    let mut events = Vec::new();
    while let Some(event) = ready.try_recv()? {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].buffer, outputs[0].id());
    assert_eq!(events[1].buffer, outputs[1].id());
    for event in &events {
        assert_eq!(event.stream, Some(0));
        assert_eq!(event.metadata.status, FrameStatus::Success);
        assert_eq!(event.metadata.sequence, 42);
        assert_eq!(event.metadata.timestamp, 1_000_000);
        assert_eq!(event.metadata.planes[0].bytes_used, OUTPUT_STRIDE * HEIGHT);
    }

    // away from the borders every pixel interpolates to pure red
    let center = (HEIGHT / 2 * OUTPUT_STRIDE + WIDTH / 2 * 4) as usize;
    let pixel = outputs[0].read_plane(0, |data| data[center..center + 4].to_vec())?;
    assert!(pixel[0] >= 254, "red {pixel:?}");
    assert!(pixel[1] <= 1, "green {pixel:?}");
    assert!(pixel[2] <= 1, "blue {pixel:?}");
    assert_eq!(pixel[3], 255);

    converter.stop();
    assert_eq!(converter.state(), State::Stopped);
    assert_eq!(converter.render_target_count(), 2);
    Ok(())
}

#[test]
#[serial]
#[ignore = "requires a DRM render node"]
fn test_start_stop_start() -> Result<(), Box<dyn Error>> {
    let mut first = configured()?;
    first.start()?;
    first.stop();
    assert_eq!(first.state(), State::Stopped);
    drop(first);

    let mut second = configured()?;
    second.start()?;
    assert_eq!(second.state(), State::Running);
    second.stop();

    // a stopped converter can be restarted too
    second.start()?;
    assert_eq!(second.state(), State::Running);
    Ok(())
}

#[test]
#[serial]
#[ignore = "requires a DRM render node"]
fn test_restart_reimports_exported_buffers() -> Result<(), Box<dyn Error>> {
    let mut converter = configured()?;
    let mut outputs = converter.export_buffers(0, 1)?;
    let ready = converter.output_ready.connect();
    let mut input = red_frame()?;

    for _ in 0..2 {
        converter.start()?;
        converter.queue_buffers(&mut input, &mut [(0, &mut outputs[0])])?;
        converter.stop();
    }

    assert_eq!(ready.len(), 2);
    assert!(converter.is_exported(outputs[0].id()));
    Ok(())
}

#[test]
#[serial]
#[ignore = "requires a DRM render node"]
fn test_export_while_running() -> Result<(), Box<dyn Error>> {
    let mut converter = configured()?;
    converter.start()?;
    let mut outputs = converter.export_buffers(0, 3)?;
    assert_eq!(outputs.len(), 3);

    let ready = converter.output_ready.connect();
    let mut input = red_frame()?;
    converter.queue_buffers(&mut input, &mut [(0, &mut outputs[2])])?;
    assert_eq!(ready.try_recv()?.map(|e| e.buffer), Some(outputs[2].id()));
    Ok(())
}

#[test]
#[serial]
#[ignore = "requires a DRM render node"]
fn test_foreign_output_buffer() -> Result<(), Box<dyn Error>> {
    let mut converter = configured()?;
    converter.start()?;

    let mut heap = HeapAllocator::new(HeapKind::Cma)
        .or_else(|_| HeapAllocator::new(HeapKind::System))?;
    let allocation = heap.allocate(Size::new(WIDTH, HEIGHT), ABGR8888)?;
    let mut output = FrameBuffer::new(vec![Plane::new(
        allocation.fd,
        allocation.offset,
        allocation.length,
    )]);
    assert!(!converter.is_exported(output.id()));

    let ready = converter.output_ready.connect();
    let mut input = red_frame()?;
    converter.queue_buffers(&mut input, &mut [(0, &mut output)])?;
    assert_eq!(ready.len(), 1);
    assert_eq!(output.metadata().status, FrameStatus::Success);
    assert_eq!(converter.render_target_count(), 0);
    Ok(())
}

#[test]
#[serial]
#[ignore = "requires a DRM render node"]
fn test_drop_while_running() -> Result<(), Box<dyn Error>> {
    let mut converter = configured()?;
    let outputs = converter.export_buffers(0, 2)?;
    converter.start()?;
    drop(converter);
    // the exported memory outlives the converter
    assert_eq!(outputs[0].planes()[0].length, OUTPUT_STRIDE * HEIGHT);
    Ok(())
}
