// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for weight quantization and the full conversion path.

use std::collections::BTreeMap;

use converter::{convert, ConversionConfig, FailurePolicy, OptimizationKind};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use model_ir::{ModelLoader, ModelManifest, SourceModel, Validated};
use tensor_core::{quantize_i8, Shape, Tensor};

fn values(n: usize) -> Vec<f32> {
    (0..n).map(|i| ((i as f32) * 0.013).sin()).collect()
}

fn mlp() -> SourceModel<Validated> {
    let manifest = ModelManifest::from_json(
        r#"{
            "name": "bench_mlp", "format_version": 1,
            "inputs": [{ "name": "x", "shape": [1, 784] }],
            "outputs": ["logits"],
            "layers": [
                { "name": "fc1", "type": "dense", "config": { "units": 256, "activation": "relu" },
                  "weights": { "kernel": "fc1/kernel", "bias": "fc1/bias" } },
                { "name": "logits", "type": "dense", "config": { "units": 10 },
                  "weights": { "kernel": "logits/kernel", "bias": "logits/bias" } }
            ]
        }"#,
    )
    .expect("bench manifest parses");
    let tensor = |shape: Shape| {
        let n = shape.num_elements();
        Tensor::from_f32(shape, &values(n)).expect("bench tensor")
    };
    let weights = BTreeMap::from([
        ("fc1/kernel".to_string(), tensor(Shape::matrix(784, 256))),
        ("fc1/bias".to_string(), tensor(Shape::vector(256))),
        ("logits/kernel".to_string(), tensor(Shape::matrix(256, 10))),
        ("logits/bias".to_string(), tensor(Shape::vector(10))),
    ]);
    ModelLoader::from_parts(&manifest, weights).expect("bench model loads")
}

fn bench_quantize_kernel(c: &mut Criterion) {
    let kernel = values(784 * 256);
    c.bench_function("quantize_i8_784x256", |b| {
        b.iter(|| quantize_i8(black_box(&kernel)))
    });
}

fn bench_convert(c: &mut Criterion) {
    let source = mlp();
    let plain = ConversionConfig::new(FailurePolicy::Strict);
    let optimized = ConversionConfig::new(FailurePolicy::Strict)
        .with_optimization(OptimizationKind::FuseActivations)
        .with_optimization(OptimizationKind::Default)
        .with_optimization(OptimizationKind::Float16);

    c.bench_function("convert_mlp_plain", |b| {
        b.iter(|| convert(black_box(&source), &plain))
    });
    c.bench_function("convert_mlp_optimized", |b| {
        b.iter(|| convert(black_box(&source), &optimized))
    });
}

criterion_group!(benches, bench_quantize_kernel, bench_convert);
criterion_main!(benches);
