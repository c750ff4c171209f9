// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! The source side of the conversion pipeline: an intermediate
//! representation of a trained model and the loader that builds it.
//!
//! - [`LayerType`] / [`LayerConfig`]: the kind of computation each layer
//!   performs and its typed, validated parameters.
//! - [`LayerDef`]: a single layer's edges, weight references and inferred
//!   output shape.
//! - [`SourceModel`]: the full model (layers, materialized weights and
//!   [`Signature`]) with a **type-state pattern** (`Unchecked` → `Validated`).
//! - [`ModelLoader`]: loads models from a single SafeTensors file or from a
//!   `model.json` + `model.safetensors` directory.
//! - [`ModelManifest`]: the JSON architecture descriptor.
//!
//! # Example
//! ```no_run
//! use model_ir::ModelLoader;
//! use std::path::Path;
//!
//! let model = ModelLoader::load(Path::new("./models/mri_classifier")).unwrap();
//! println!("{}", model.summary());
//! for layer in model.iter_layers() {
//!     println!("  {}", layer.summary());
//! }
//! ```

mod container;
mod error;
pub mod graph;
mod layer;
mod loader;
mod manifest;

pub use container::{
    encode_container, pack_single_file, write_single_file, ARCHITECTURE_KEY, MANIFEST_FILE,
    WEIGHTS_FILE,
};
pub use error::ModelError;
pub use graph::{Signature, SourceModel, TensorSpec, Unchecked, Validated};
pub use layer::{Activation, LayerConfig, LayerDef, LayerType, WeightRole};
pub use loader::ModelLoader;
pub use manifest::{InputSpec, ManifestLayer, ModelManifest, FORMAT_VERSION};
