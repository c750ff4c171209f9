// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # flat-model
//!
//! The EdgeFlat destination format: a compact, self-describing binary
//! layout for edge inference runtimes.
//!
//! - [`FlatModel`]: tensor table, flat operator list and I/O indices.
//! - [`encode`] / [`decode`]: the binary codec. Decoding verifies the
//!   SHA-256 content digest and every structural invariant.
//! - [`ModelWriter`]: atomic write-to-temp-then-rename persistence.
//!
//! # Example
//! ```no_run
//! use flat_model::{read_file, ModelWriter};
//! use std::path::Path;
//!
//! let model = read_file(Path::new("classifier.eflt")).unwrap();
//! let bytes = flat_model::encode(&model).unwrap();
//! ModelWriter::save(&bytes, Path::new("copy.eflt")).unwrap();
//! ```

pub mod codec;
mod error;
mod model;
mod writer;

pub use codec::{
    content_digest, decode, encode, Header, ALIGNMENT, HEADER_LEN, MAGIC, VERSION_MAJOR,
    VERSION_MINOR,
};
pub use error::{FormatError, WriteError};
pub use model::{
    FlatModel, FlatTensor, FusedActivation, Op, Operator, FLAG_HAS_F16, FLAG_HAS_INT8,
};
pub use writer::{read_file, ModelWriter};

/// Identifier written into the producer field of generated files.
pub const PRODUCER: &str = concat!("edge-convert ", env!("CARGO_PKG_VERSION"));
