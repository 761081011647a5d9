// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use dma_heap::HeapKind;
use edgefirst_converter::{
    allocator::{BufferAllocator, HeapAllocator},
    egl::DEFAULT_RENDER_NODE,
    format::{self, Size, StreamConfiguration},
    Converter, FrameBuffer, Plane,
};

pub fn benchmark_debayer(c: &mut Criterion) {
    let bayer = [format::SRGGB8, format::SBGGR8];
    let dims = [(640, 480), (1920, 1080), (3840, 2160)];
    let mut heap = HeapAllocator::new(HeapKind::Cma).unwrap();

    for input_fmt in bayer.iter() {
        let mut group = c.benchmark_group(format!("debayer/{}", input_fmt));
        for dim in dims.iter() {
            let size = Size::new(dim.0, dim.1);
            let mut converter = Converter::new(DEFAULT_RENDER_NODE);
            converter
                .configure(
                    &StreamConfiguration::new(size, dim.0, *input_fmt),
                    &[StreamConfiguration::new(size, dim.0 * 4, format::ABGR8888)],
                )
                .unwrap();
            let mut outputs = converter.export_buffers(0, 1).unwrap();
            converter.start().unwrap();

            let allocation = heap.allocate(size, *input_fmt).unwrap();
            let mut input = FrameBuffer::new(vec![Plane::new(
                allocation.fd,
                allocation.offset,
                allocation.length,
            )]);

            group.bench_function(format!("{}x{}", dim.0, dim.1), |b| {
                b.iter(|| {
                    converter
                        .queue_buffers(&mut input, &mut [(0, &mut outputs[0])])
                        .unwrap()
                })
            });
        }
    }
}

criterion_group!(benches, benchmark_debayer);
criterion_main!(benches);
