// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model loading from single-file or directory artifacts.
//!
//! Two layouts of the same container are accepted:
//! - **Single file**: a SafeTensors file whose `__metadata__` carries the
//!   architecture manifest under `architecture`.
//! - **Directory**: `model.json` next to `model.safetensors`.
//!
//! Every weight is copied into memory during loading, and shape inference
//! assigns every layer a concrete output shape.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tensor_core::{DType, Shape, Tensor};

use crate::container::{read_container, ARCHITECTURE_KEY, MANIFEST_FILE, WEIGHTS_FILE};
use crate::graph::{Signature, TensorSpec, Validated};
use crate::{LayerConfig, LayerDef, LayerType, ModelError, ModelManifest, SourceModel, WeightRole};

/// Loads a source model from disk into a validated [`SourceModel`].
///
/// # Example
/// ```no_run
/// use model_ir::ModelLoader;
/// use std::path::Path;
///
/// let model = ModelLoader::load(Path::new("./models/mri_classifier.safetensors")).unwrap();
/// println!("{}", model.summary());
/// ```
pub struct ModelLoader;

impl ModelLoader {
    /// Loads and validates a model from a single file or a directory.
    ///
    /// Steps:
    /// 1. Read the manifest and the weight container.
    /// 2. Validate the manifest.
    /// 3. Build [`LayerDef`]s, inferring output shapes and checking weights.
    /// 4. Construct and validate the [`SourceModel`].
    pub fn load(path: &Path) -> Result<SourceModel<Validated>, ModelError> {
        let (manifest, weights) = if path.is_dir() {
            Self::read_directory(path)?
        } else if path.exists() {
            Self::read_single_file(path)?
        } else {
            return Err(ModelError::NotFound {
                path: path.to_path_buf(),
            });
        };

        let model = Self::from_parts(&manifest, weights)?;
        tracing::info!("loaded {} from {}", model.summary(), path.display());
        Ok(model)
    }

    /// Builds a validated model from an in-memory manifest and weight map.
    ///
    /// Weights not referenced by any layer are dropped with a warning.
    pub fn from_parts(
        manifest: &ModelManifest,
        mut weights: BTreeMap<String, Tensor>,
    ) -> Result<SourceModel<Validated>, ModelError> {
        manifest.validate()?;
        let (layers, signature) = Self::build_layers(manifest, &weights)?;

        let referenced: Vec<&str> = manifest.weight_names();
        let unused: Vec<String> = weights
            .keys()
            .filter(|k| referenced.binary_search(&k.as_str()).is_err())
            .cloned()
            .collect();
        for name in unused {
            tracing::warn!("dropping weight tensor '{name}': not referenced by any layer");
            weights.remove(&name);
        }

        SourceModel::new(manifest.name.clone(), layers, weights, signature).validate()
    }

    fn read_single_file(path: &Path) -> Result<(ModelManifest, BTreeMap<String, Tensor>), ModelError> {
        let container = read_container(path)?;
        let architecture = container
            .metadata
            .get(ARCHITECTURE_KEY)
            .ok_or(ModelError::MissingArchitecture {
                key: ARCHITECTURE_KEY,
            })?;
        let manifest = ModelManifest::from_json(architecture)?;
        Ok((manifest, container.tensors))
    }

    fn read_directory(dir: &Path) -> Result<(ModelManifest, BTreeMap<String, Tensor>), ModelError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let weights_path = dir.join(WEIGHTS_FILE);
        for path in [&manifest_path, &weights_path] {
            if !path.is_file() {
                return Err(ModelError::NotFound { path: path.clone() });
            }
        }
        let manifest = ModelManifest::from_file(&manifest_path)?;
        let container = read_container(&weights_path)?;
        Ok((manifest, container.tensors))
    }

    /// Converts manifest entries into layer definitions and derives the
    /// model signature from the inferred shapes.
    fn build_layers(
        manifest: &ModelManifest,
        weights: &BTreeMap<String, Tensor>,
    ) -> Result<(Vec<LayerDef>, Signature), ModelError> {
        let mut shapes: HashMap<&str, Shape> = HashMap::new();
        let mut inputs = Vec::with_capacity(manifest.inputs.len());
        for input in &manifest.inputs {
            let shape = Shape::new(input.shape.clone());
            shapes.insert(&input.name, shape.clone());
            inputs.push(TensorSpec {
                name: input.name.clone(),
                shape,
                dtype: DType::F32,
            });
        }

        let mut previous = manifest.inputs[0].name.as_str();
        let mut layers = Vec::with_capacity(manifest.layers.len());

        for (i, ml) in manifest.layers.iter().enumerate() {
            let layer_type = LayerType::from_str_loose(&ml.layer_type).ok_or_else(|| {
                ModelError::UnknownLayerType {
                    layer: ml.name.clone(),
                    type_name: ml.layer_type.clone(),
                }
            })?;
            let config = LayerConfig::from_json(&ml.name, layer_type, &ml.config)?;

            let edges: Vec<String> = if ml.inputs.is_empty() {
                vec![previous.to_string()]
            } else {
                ml.inputs.clone()
            };
            let input_shapes = edges
                .iter()
                .map(|t| {
                    shapes.get(t.as_str()).ok_or_else(|| ModelError::UnknownTensor {
                        layer: ml.name.clone(),
                        tensor: t.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let bound = bind_weights(&ml.name, &config, &ml.weights, weights)?;
            let output_shape = infer_output_shape(&ml.name, &config, &input_shapes, &bound, weights)?;
            tracing::debug!(
                "layer '{}' ({layer_type}): {:?} -> {output_shape}",
                ml.name,
                input_shapes.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            );

            shapes.insert(&ml.name, output_shape.clone());
            previous = ml.name.as_str();
            layers.push(LayerDef {
                name: ml.name.clone(),
                layer_type,
                config,
                index: i,
                inputs: edges,
                weights: bound,
                output_shape,
            });
        }

        let mut outputs = Vec::with_capacity(manifest.outputs.len());
        for name in &manifest.outputs {
            let layer = layers.iter().find(|l| &l.name == name).ok_or_else(|| {
                ModelError::InvalidSignature(format!("output '{name}' is not produced by any layer"))
            })?;
            outputs.push(TensorSpec {
                name: name.clone(),
                shape: layer.output_shape.clone(),
                dtype: DType::F32,
            });
        }

        Ok((layers, Signature { inputs, outputs }))
    }
}

/// Resolves a layer's manifest weight map into roles, checking that every
/// required role is present and every named tensor exists.
fn bind_weights(
    layer: &str,
    config: &LayerConfig,
    declared: &BTreeMap<String, String>,
    weights: &BTreeMap<String, Tensor>,
) -> Result<BTreeMap<WeightRole, String>, ModelError> {
    let (required, allowed) = config.weight_roles();
    let mut bound = BTreeMap::new();
    for (key, tensor_name) in declared {
        let role = WeightRole::parse(key)
            .ok_or_else(|| ModelError::layer(layer, format!("unknown weight role '{key}'")))?;
        if !allowed.contains(&role) {
            return Err(ModelError::layer(
                layer,
                format!("weight role '{role}' is not valid for this configuration"),
            ));
        }
        if !weights.contains_key(tensor_name) {
            return Err(ModelError::WeightNotFound {
                layer: layer.to_string(),
                name: tensor_name.clone(),
            });
        }
        bound.insert(role, tensor_name.clone());
    }
    if let Some(missing) = required.iter().find(|r| !bound.contains_key(r)) {
        return Err(ModelError::layer(layer, format!("missing '{missing}' weight")));
    }
    Ok(bound)
}

fn check_weight_shape(
    bound: &BTreeMap<WeightRole, String>,
    role: WeightRole,
    weights: &BTreeMap<String, Tensor>,
    expected: Shape,
) -> Result<(), ModelError> {
    let Some(name) = bound.get(&role) else {
        return Ok(());
    };
    let Some(tensor) = weights.get(name) else {
        return Ok(());
    };
    if tensor.shape() != &expected {
        return Err(ModelError::WeightShapeMismatch {
            name: name.clone(),
            expected,
            actual: tensor.shape().clone(),
        });
    }
    Ok(())
}

fn expect_arity(layer: &str, inputs: &[&Shape], min: usize, max: usize) -> Result<(), ModelError> {
    if inputs.len() < min || inputs.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("at least {min}")
        };
        return Err(ModelError::layer(
            layer,
            format!("expected {expected} input(s), got {}", inputs.len()),
        ));
    }
    Ok(())
}

/// Infers the output shape of a layer and checks its weight shapes.
///
/// Activations are NHWC; dense kernels are `[in, units]` and conv kernels
/// `[kh, kw, cin, cout]`.
fn infer_output_shape(
    layer: &str,
    config: &LayerConfig,
    inputs: &[&Shape],
    bound: &BTreeMap<WeightRole, String>,
    weights: &BTreeMap<String, Tensor>,
) -> Result<Shape, ModelError> {
    let shape = match config {
        LayerConfig::Add => {
            expect_arity(layer, inputs, 2, usize::MAX)?;
            let first = inputs[0];
            if let Some(other) = inputs.iter().find(|s| **s != first) {
                return Err(ModelError::layer(
                    layer,
                    format!("add operands have different shapes {first} and {other}"),
                ));
            }
            first.clone()
        }
        LayerConfig::Opaque { output_shape } => {
            expect_arity(layer, inputs, 1, usize::MAX)?;
            if output_shape.is_empty() || output_shape.contains(&0) {
                return Err(ModelError::layer(layer, "declared output_shape is empty"));
            }
            Shape::new(output_shape.clone())
        }
        _ => {
            expect_arity(layer, inputs, 1, 1)?;
            infer_unary(layer, config, inputs[0], bound, weights)?
        }
    };
    Ok(shape)
}

fn infer_unary(
    layer: &str,
    config: &LayerConfig,
    input: &Shape,
    bound: &BTreeMap<WeightRole, String>,
    weights: &BTreeMap<String, Tensor>,
) -> Result<Shape, ModelError> {
    let shape = match config {
        LayerConfig::Dense { units, .. } => {
            let in_features = input
                .last_dim()
                .filter(|_| input.rank() >= 2)
                .ok_or_else(|| ModelError::layer(layer, format!("dense input {input} must have rank >= 2")))?;
            check_weight_shape(bound, WeightRole::Kernel, weights, Shape::matrix(in_features, *units))?;
            check_weight_shape(bound, WeightRole::Bias, weights, Shape::vector(*units))?;
            input.with_last_dim(*units)
        }
        LayerConfig::Conv2D {
            filters,
            kernel_size,
            strides,
            padding,
            ..
        } => {
            let &[n, h, w, cin] = input.dims() else {
                return Err(ModelError::layer(layer, format!("conv2d input {input} must be NHWC")));
            };
            check_weight_shape(
                bound,
                WeightRole::Kernel,
                weights,
                Shape::new(vec![kernel_size[0], kernel_size[1], cin, *filters]),
            )?;
            check_weight_shape(bound, WeightRole::Bias, weights, Shape::vector(*filters))?;
            let oh = padding.output_size(h, kernel_size[0], strides[0]);
            let ow = padding.output_size(w, kernel_size[1], strides[1]);
            Shape::new(vec![n, oh, ow, *filters])
        }
        LayerConfig::Pool2D {
            pool_size,
            strides,
            padding,
        } => {
            let &[n, h, w, c] = input.dims() else {
                return Err(ModelError::layer(layer, format!("pooling input {input} must be NHWC")));
            };
            let oh = padding.output_size(h, pool_size[0], strides[0]);
            let ow = padding.output_size(w, pool_size[1], strides[1]);
            Shape::new(vec![n, oh, ow, c])
        }
        LayerConfig::Flatten => input.flatten_batch(),
        LayerConfig::Reshape { target_shape } => {
            let batch = input.dim(0).unwrap_or(1) as i64;
            let mut target = Vec::with_capacity(target_shape.len() + 1);
            target.push(batch);
            target.extend_from_slice(target_shape);
            input
                .resolve_reshape(&target)
                .map_err(|e| ModelError::layer(layer, e.to_string()))?
        }
        LayerConfig::Dropout { .. } | LayerConfig::Activation { .. } | LayerConfig::Softmax => {
            input.clone()
        }
        LayerConfig::BatchNorm { .. } => {
            let channels = input
                .last_dim()
                .ok_or_else(|| ModelError::layer(layer, "batch normalization input is a scalar"))?;
            for role in [
                WeightRole::Gamma,
                WeightRole::Beta,
                WeightRole::MovingMean,
                WeightRole::MovingVariance,
            ] {
                check_weight_shape(bound, role, weights, Shape::vector(channels))?;
            }
            input.clone()
        }
        LayerConfig::Add | LayerConfig::Opaque { .. } => {
            return Err(ModelError::layer(layer, "not a single-input layer"))
        }
    };
    if shape.num_elements() == 0 {
        return Err(ModelError::layer(
            layer,
            format!("output shape {shape} has zero elements"),
        ));
    }
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{write_single_file, Activation};

    fn weight(shape: Shape) -> Tensor {
        let values: Vec<f32> = (0..shape.num_elements()).map(|i| i as f32 * 0.1 - 0.5).collect();
        Tensor::from_f32(shape, &values).unwrap()
    }

    fn cnn_manifest() -> ModelManifest {
        ModelManifest::from_json(
            r#"{
                "name": "cnn",
                "format_version": 1,
                "inputs": [{ "name": "image", "shape": [1, 8, 8, 1] }],
                "outputs": ["probs"],
                "layers": [
                    { "name": "conv", "type": "Conv2D",
                      "config": { "filters": 2, "kernel_size": 3, "padding": "same", "activation": "relu" },
                      "weights": { "kernel": "conv/kernel", "bias": "conv/bias" } },
                    { "name": "bn", "type": "batch_normalization",
                      "weights": { "gamma": "bn/gamma", "beta": "bn/beta",
                                   "moving_mean": "bn/mean", "moving_variance": "bn/var" } },
                    { "name": "pool", "type": "max_pooling2d" },
                    { "name": "drop", "type": "dropout", "config": { "rate": 0.25 } },
                    { "name": "flat", "type": "flatten" },
                    { "name": "probs", "type": "dense",
                      "config": { "units": 3, "activation": "softmax" },
                      "weights": { "kernel": "probs/kernel", "bias": "probs/bias" } }
                ]
            }"#,
        )
        .unwrap()
    }

    fn cnn_weights() -> BTreeMap<String, Tensor> {
        BTreeMap::from([
            ("conv/kernel".into(), weight(Shape::new(vec![3, 3, 1, 2]))),
            ("conv/bias".into(), weight(Shape::vector(2))),
            ("bn/gamma".into(), weight(Shape::vector(2))),
            ("bn/beta".into(), weight(Shape::vector(2))),
            ("bn/mean".into(), weight(Shape::vector(2))),
            ("bn/var".into(), weight(Shape::vector(2))),
            ("probs/kernel".into(), weight(Shape::matrix(32, 3))),
            ("probs/bias".into(), weight(Shape::vector(3))),
        ])
    }

    #[test]
    fn test_from_parts_infers_shapes() {
        let model = ModelLoader::from_parts(&cnn_manifest(), cnn_weights()).unwrap();
        let shapes: Vec<_> = model.iter_layers().map(|l| l.output_shape.clone()).collect();
        assert_eq!(
            shapes,
            vec![
                Shape::new(vec![1, 8, 8, 2]),
                Shape::new(vec![1, 8, 8, 2]),
                Shape::new(vec![1, 4, 4, 2]),
                Shape::new(vec![1, 4, 4, 2]),
                Shape::matrix(1, 32),
                Shape::matrix(1, 3),
            ]
        );
        assert_eq!(model.signature().outputs[0].shape, Shape::matrix(1, 3));
        assert_eq!(model.layer(1).unwrap().inputs, vec!["conv".to_string()]);
        assert_eq!(model.layer(0).unwrap().inputs, vec!["image".to_string()]);
    }

    #[test]
    fn test_kernel_shape_mismatch() {
        let mut weights = cnn_weights();
        weights.insert("probs/kernel".into(), weight(Shape::matrix(3, 32)));
        assert!(matches!(
            ModelLoader::from_parts(&cnn_manifest(), weights),
            Err(ModelError::WeightShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_weight_tensor() {
        let mut weights = cnn_weights();
        weights.remove("bn/var");
        assert!(matches!(
            ModelLoader::from_parts(&cnn_manifest(), weights),
            Err(ModelError::WeightNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_weight_role() {
        let mut manifest = cnn_manifest();
        manifest.layers[5].weights.remove("bias");
        assert!(matches!(
            ModelLoader::from_parts(&manifest, cnn_weights()),
            Err(ModelError::InvalidLayer { .. })
        ));
    }

    #[test]
    fn test_unreferenced_weights_dropped() {
        let mut weights = cnn_weights();
        weights.insert("extra".into(), weight(Shape::vector(4)));
        let model = ModelLoader::from_parts(&cnn_manifest(), weights).unwrap();
        assert!(model.weight("extra").is_none());
        assert_eq!(model.weights().len(), 8);
    }

    #[test]
    fn test_unknown_edge() {
        let mut manifest = cnn_manifest();
        manifest.layers[2].inputs = vec!["ghost".into()];
        assert!(matches!(
            ModelLoader::from_parts(&manifest, cnn_weights()),
            Err(ModelError::UnknownTensor { .. })
        ));
    }

    #[test]
    fn test_unknown_output() {
        let mut manifest = cnn_manifest();
        manifest.outputs = vec!["logits".into()];
        assert!(matches!(
            ModelLoader::from_parts(&manifest, cnn_weights()),
            Err(ModelError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_add_requires_equal_shapes() {
        let manifest = ModelManifest::from_json(
            r#"{
                "name": "residual", "format_version": 1,
                "inputs": [{ "name": "x", "shape": [1, 4] }],
                "outputs": ["sum"],
                "layers": [
                    { "name": "proj", "type": "dense", "config": { "units": 2, "use_bias": false },
                      "weights": { "kernel": "proj/kernel" } },
                    { "name": "sum", "type": "add", "inputs": ["x", "proj"] }
                ]
            }"#,
        )
        .unwrap();
        let weights = BTreeMap::from([("proj/kernel".into(), weight(Shape::matrix(4, 2)))]);
        assert!(matches!(
            ModelLoader::from_parts(&manifest, weights),
            Err(ModelError::InvalidLayer { .. })
        ));
    }

    #[test]
    fn test_reshape_keeps_batch() {
        let manifest = ModelManifest::from_json(
            r#"{
                "name": "reshape", "format_version": 1,
                "inputs": [{ "name": "x", "shape": [2, 6] }],
                "outputs": ["r"],
                "layers": [{ "name": "r", "type": "reshape", "config": { "target_shape": [3, -1] } }]
            }"#,
        )
        .unwrap();
        let model = ModelLoader::from_parts(&manifest, BTreeMap::new()).unwrap();
        assert_eq!(model.layer(0).unwrap().output_shape, Shape::new(vec![2, 3, 2]));
    }

    #[test]
    fn test_lstm_uses_declared_shape() {
        let manifest = ModelManifest::from_json(
            r#"{
                "name": "rnn", "format_version": 1,
                "inputs": [{ "name": "seq", "shape": [1, 5, 3] }],
                "outputs": ["rnn"],
                "layers": [{ "name": "rnn", "type": "lstm", "config": { "output_shape": [1, 8] } }]
            }"#,
        )
        .unwrap();
        let model = ModelLoader::from_parts(&manifest, BTreeMap::new()).unwrap();
        assert_eq!(model.layer(0).unwrap().layer_type, LayerType::Lstm);
        assert_eq!(model.signature().outputs[0].shape, Shape::matrix(1, 8));
    }

    #[test]
    fn test_load_single_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cnn.safetensors");
        write_single_file(&cnn_manifest(), &cnn_weights(), &file).unwrap();
        let single = ModelLoader::load(&file).unwrap();

        let model_dir = dir.path().join("cnn");
        std::fs::create_dir(&model_dir).unwrap();
        std::fs::write(model_dir.join(MANIFEST_FILE), cnn_manifest().to_json().unwrap()).unwrap();
        let bytes = crate::encode_container(&BTreeMap::new(), &cnn_weights()).unwrap();
        std::fs::write(model_dir.join(WEIGHTS_FILE), bytes).unwrap();
        let from_dir = ModelLoader::load(&model_dir).unwrap();

        assert_eq!(single.signature(), from_dir.signature());
        assert_eq!(single.weights(), from_dir.weights());
        assert_eq!(
            single.layer(5).unwrap().config.activation(),
            Some(Activation::Softmax)
        );
    }

    #[test]
    fn test_pack_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("cnn");
        std::fs::create_dir(&model_dir).unwrap();
        std::fs::write(model_dir.join(MANIFEST_FILE), cnn_manifest().to_json().unwrap()).unwrap();
        let bytes = crate::encode_container(&BTreeMap::new(), &cnn_weights()).unwrap();
        std::fs::write(model_dir.join(WEIGHTS_FILE), bytes).unwrap();

        let packed = dir.path().join("packed.safetensors");
        crate::pack_single_file(&model_dir, &packed).unwrap();
        let model = ModelLoader::load(&packed).unwrap();
        assert_eq!(model.num_layers(), 6);
    }

    #[test]
    fn test_load_missing_path() {
        assert!(matches!(
            ModelLoader::load(Path::new("/definitely/not/here.safetensors")),
            Err(ModelError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_without_architecture_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bare.safetensors");
        let bytes = crate::encode_container(&BTreeMap::new(), &cnn_weights()).unwrap();
        std::fs::write(&file, bytes).unwrap();
        assert!(matches!(
            ModelLoader::load(&file),
            Err(ModelError::MissingArchitecture { .. })
        ));
    }

    #[test]
    fn test_load_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("garbage.bin");
        std::fs::write(&file, b"this is not a safetensors file at all").unwrap();
        assert!(matches!(
            ModelLoader::load(&file),
            Err(ModelError::Container(_))
        ));
    }
}
