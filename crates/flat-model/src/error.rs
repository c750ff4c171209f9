// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the EdgeFlat codec and serializer.

use std::path::PathBuf;

/// Errors raised while encoding or decoding EdgeFlat bytes.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The buffer ended before a complete value could be read.
    #[error("truncated EdgeFlat data while reading {what}")]
    Truncated { what: &'static str },

    /// The file does not start with the EdgeFlat magic.
    #[error("bad magic {0:?}, not an EdgeFlat file")]
    BadMagic([u8; 4]),

    /// The file was written by an incompatible format revision.
    #[error("unsupported EdgeFlat version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// The stored digest does not match the section contents.
    #[error("content digest mismatch (stored {stored}, computed {computed})")]
    DigestMismatch { stored: String, computed: String },

    /// A section, buffer or index points outside its container.
    #[error("{what} out of bounds: {detail}")]
    OutOfBounds { what: &'static str, detail: String },

    /// An operator opcode is not known to this reader.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// A tensor dtype code is not known to this reader.
    #[error("unknown dtype code {0}")]
    UnknownDType(u8),

    /// A string in the graph section is not valid UTF-8.
    #[error("invalid UTF-8 in {what}")]
    InvalidUtf8 { what: &'static str },

    /// The model violates a structural rule of the format.
    #[error("malformed model: {0}")]
    Malformed(String),

    /// Reading an EdgeFlat file from disk failed.
    #[error("failed to read EdgeFlat file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while persisting encoded bytes.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The destination's parent directory does not exist.
    #[error("destination directory does not exist: {}", path.display())]
    MissingParent { path: PathBuf },

    /// A filesystem operation failed (permissions, disk full, ...).
    #[error("failed to {action} '{}': {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
