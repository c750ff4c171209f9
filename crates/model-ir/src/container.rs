// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! SafeTensors container I/O.
//!
//! A SafeTensors file is an 8-byte little-endian header length, a JSON
//! header mapping tensor names to `{dtype, shape, data_offsets}` plus an
//! optional string map under `__metadata__`, and the raw tensor bytes.
//! Single-file models keep their architecture manifest in that metadata map.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use tensor_core::{DType, Shape, Tensor};

use crate::{ModelError, ModelManifest};

/// Metadata key holding the architecture manifest in single-file models.
pub const ARCHITECTURE_KEY: &str = "architecture";

/// Manifest filename in the directory layout.
pub const MANIFEST_FILE: &str = "model.json";

/// Weights filename in the directory layout.
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Decoded contents of a SafeTensors file, fully copied into memory.
#[derive(Debug, Default)]
pub(crate) struct Container {
    pub metadata: BTreeMap<String, String>,
    pub tensors: BTreeMap<String, Tensor>,
}

#[derive(serde::Deserialize)]
struct HeaderMetadata {
    #[serde(rename = "__metadata__", default)]
    metadata: Option<BTreeMap<String, String>>,
}

/// Memory-maps `path` and copies every tensor out of it.
pub(crate) fn read_container(path: &Path) -> Result<Container, ModelError> {
    let io_err = |source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    if len < 8 {
        return Err(ModelError::Container(format!(
            "'{}' is too small to hold a header ({len} bytes)",
            path.display()
        )));
    }

    // SAFETY: the mapping is read-only and dropped before this function
    // returns; every tensor is copied into an owned buffer first.
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(io_err)?;
    parse_container(&mmap)
}

/// Parses a SafeTensors buffer.
pub(crate) fn parse_container(bytes: &[u8]) -> Result<Container, ModelError> {
    let metadata = read_header_metadata(bytes)?;

    let tensors = safetensors::SafeTensors::deserialize(bytes)
        .map_err(|e| ModelError::Container(format!("SafeTensors parse error: {e}")))?;

    let mut out = BTreeMap::new();
    for (name, view) in tensors.tensors() {
        let dtype = convert_safetensor_dtype(&name, view.dtype())?;
        let shape = Shape::new(view.shape().to_vec());
        let tensor = Tensor::from_bytes(shape, dtype, view.data().to_vec())?;
        out.insert(name, tensor);
    }

    Ok(Container {
        metadata,
        tensors: out,
    })
}

/// Extracts the `__metadata__` string map from the JSON header.
fn read_header_metadata(bytes: &[u8]) -> Result<BTreeMap<String, String>, ModelError> {
    let len_bytes: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| ModelError::Container("truncated header length".into()))?;
    let header_len = u64::from_le_bytes(len_bytes);
    let header = usize::try_from(header_len)
        .ok()
        .and_then(|n| n.checked_add(8))
        .and_then(|end| bytes.get(8..end))
        .ok_or_else(|| {
            ModelError::Container(format!("header length {header_len} exceeds file size"))
        })?;
    let parsed: HeaderMetadata = serde_json::from_slice(header)
        .map_err(|e| ModelError::Container(format!("invalid header JSON: {e}")))?;
    Ok(parsed.metadata.unwrap_or_default())
}

/// Converts a SafeTensors `Dtype` to our [`DType`].
///
/// Quantized (`I8`) source weights are rejected: a source model carries
/// float weights only.
fn convert_safetensor_dtype(name: &str, st_dtype: safetensors::Dtype) -> Result<DType, ModelError> {
    match st_dtype {
        safetensors::Dtype::F32 => Ok(DType::F32),
        safetensors::Dtype::F16 => Ok(DType::F16),
        safetensors::Dtype::BF16 => Ok(DType::BF16),
        other => Err(ModelError::UnsupportedDType {
            name: name.to_string(),
            dtype: format!("{other:?}"),
        }),
    }
}

fn safetensor_label(dtype: DType) -> &'static str {
    match dtype {
        DType::F32 => "F32",
        DType::F16 => "F16",
        DType::BF16 => "BF16",
        DType::I8 => "I8",
    }
}

/// Encodes tensors and a metadata map as a SafeTensors buffer.
///
/// Tensors are laid out in name order; the header is space-padded to a
/// multiple of 8 bytes.
pub fn encode_container(
    metadata: &BTreeMap<String, String>,
    tensors: &BTreeMap<String, Tensor>,
) -> Result<Vec<u8>, ModelError> {
    let mut header = serde_json::Map::new();
    if !metadata.is_empty() {
        header.insert("__metadata__".into(), serde_json::to_value(metadata)?);
    }
    let mut offset = 0usize;
    for (name, tensor) in tensors {
        let end = offset + tensor.size_bytes();
        header.insert(
            name.clone(),
            serde_json::json!({
                "dtype": safetensor_label(tensor.dtype()),
                "shape": tensor.shape().dims(),
                "data_offsets": [offset, end],
            }),
        );
        offset = end;
    }

    let mut header_bytes = serde_json::to_vec(&serde_json::Value::Object(header))?;
    while header_bytes.len() % 8 != 0 {
        header_bytes.push(b' ');
    }

    let mut out = Vec::with_capacity(8 + header_bytes.len() + offset);
    out.extend_from_slice(&(header_bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(&header_bytes);
    for tensor in tensors.values() {
        out.extend_from_slice(tensor.as_bytes());
    }
    Ok(out)
}

/// Writes a single-file model: `weights` as SafeTensors with `manifest`
/// embedded under the `architecture` metadata key.
pub fn write_single_file(
    manifest: &ModelManifest,
    weights: &BTreeMap<String, Tensor>,
    dest: &Path,
) -> Result<(), ModelError> {
    let metadata = BTreeMap::from([(
        ARCHITECTURE_KEY.to_string(),
        serde_json::to_string(manifest)?,
    )]);
    let bytes = encode_container(&metadata, weights)?;
    std::fs::write(dest, bytes).map_err(|source| ModelError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    tracing::debug!(
        "wrote single-file model '{}' ({} tensors) to {}",
        manifest.name,
        weights.len(),
        dest.display()
    );
    Ok(())
}

/// Converts a directory-layout model (`model.json` + `model.safetensors`)
/// into the single-file layout at `dest`.
pub fn pack_single_file(dir: &Path, dest: &Path) -> Result<(), ModelError> {
    let manifest = ModelManifest::from_file(&dir.join(MANIFEST_FILE))?;
    let container = read_container(&dir.join(WEIGHTS_FILE))?;
    write_single_file(&manifest, &container.tensors, dest)
}
