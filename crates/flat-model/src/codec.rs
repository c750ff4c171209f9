// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! EdgeFlat binary codec.
//!
//! # Layout (little-endian)
//! ```text
//! offset  size  field
//!      0     4  magic "EFLT"
//!      4     2  major version (1)
//!      6     2  minor version (0)
//!      8     4  flags (bit 0: int8 tensors, bit 1: f16 tensors)
//!     12     8  graph section offset
//!     20     8  graph section length
//!     28     8  data section offset (16-byte aligned)
//!     36     8  data section length
//!     44    32  SHA-256 of graph bytes followed by data bytes
//!     76     4  reserved (zero)
//!     80        graph section, zero padding, data section
//! ```
//!
//! The graph section holds the model name, the producer string, the tensor
//! table, the operator table and the input/output index lists. Strings are
//! `u32` length-prefixed UTF-8; dimensions are `u64`; tensor indices are
//! `u32`. Constant buffers live in the data section, each starting on a
//! 16-byte boundary relative to the section start.

use sha2::{Digest, Sha256};
use tensor_core::{DType, Padding, QuantParams, Shape};

use crate::model::{FlatModel, FlatTensor, FusedActivation, Op, Operator};
use crate::FormatError;

/// File magic.
pub const MAGIC: [u8; 4] = *b"EFLT";
/// Major format version written and accepted by this crate.
pub const VERSION_MAJOR: u16 = 1;
/// Minor format version written by this crate.
pub const VERSION_MINOR: u16 = 0;
/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 80;
/// Alignment of the data section and of every constant buffer.
pub const ALIGNMENT: usize = 16;

const MAX_RANK: u32 = 16;

/// Parsed fixed-size header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub major: u16,
    pub minor: u16,
    pub flags: u32,
    pub graph_offset: u64,
    pub graph_len: u64,
    pub data_offset: u64,
    pub data_len: u64,
    pub digest: [u8; 32],
}

impl Header {
    /// Reads the header from the start of `bytes`, checking magic and version.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = ByteReader::new(bytes);
        let magic: [u8; 4] = r.array("magic")?;
        if magic != MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        let major = r.u16("major version")?;
        let minor = r.u16("minor version")?;
        if major != VERSION_MAJOR || minor > VERSION_MINOR {
            return Err(FormatError::UnsupportedVersion { major, minor });
        }
        Ok(Self {
            major,
            minor,
            flags: r.u32("flags")?,
            graph_offset: r.u64("graph offset")?,
            graph_len: r.u64("graph length")?,
            data_offset: r.u64("data offset")?,
            data_len: r.u64("data length")?,
            digest: r.array("digest")?,
        })
    }

    /// Hex rendering of the content digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// SHA-256 over the graph section followed by the data section.
pub fn content_digest(graph: &[u8], data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(graph);
    hasher.update(data);
    hasher.finalize().into()
}

/// Encodes `model` into EdgeFlat bytes.
///
/// The model is validated first. Encoding is deterministic: the same model
/// always yields the same bytes.
pub fn encode(model: &FlatModel) -> Result<Vec<u8>, FormatError> {
    model.validate()?;

    let mut data = Vec::new();
    let mut slices = Vec::with_capacity(model.tensors.len());
    for tensor in &model.tensors {
        slices.push(tensor.data.as_ref().map(|buf| {
            let offset = data.len();
            data.extend_from_slice(buf);
            data.resize(align_up(data.len()), 0);
            (offset as u64, buf.len() as u64)
        }));
    }

    let mut g = ByteWriter::default();
    g.string(&model.name)?;
    g.string(&model.producer)?;

    g.count(model.tensors.len())?;
    for (tensor, slice) in model.tensors.iter().zip(&slices) {
        g.string(&tensor.name)?;
        g.u8(dtype_code(tensor.dtype));
        g.count(tensor.shape.rank())?;
        for &d in tensor.shape.dims() {
            g.u64(d as u64);
        }
        let flags = u8::from(slice.is_some()) | (u8::from(tensor.quantization.is_some()) << 1);
        g.u8(flags);
        if let Some((offset, len)) = slice {
            g.u64(*offset);
            g.u64(*len);
        }
        if let Some(q) = tensor.quantization {
            g.f32(q.scale);
            g.i32(q.zero_point);
        }
    }

    g.count(model.operators.len())?;
    for operator in &model.operators {
        g.u8(operator.op.opcode());
        write_options(&mut g, &operator.op)?;
        g.indices(&operator.inputs)?;
        g.indices(&operator.outputs)?;
    }
    g.indices(&model.inputs)?;
    g.indices(&model.outputs)?;
    let graph = g.into_inner();

    let digest = content_digest(&graph, &data);
    let graph_offset = HEADER_LEN;
    let data_offset = align_up(graph_offset + graph.len());

    let mut out = Vec::with_capacity(data_offset + data.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
    out.extend_from_slice(&VERSION_MINOR.to_le_bytes());
    out.extend_from_slice(&model.flags().to_le_bytes());
    out.extend_from_slice(&(graph_offset as u64).to_le_bytes());
    out.extend_from_slice(&(graph.len() as u64).to_le_bytes());
    out.extend_from_slice(&(data_offset as u64).to_le_bytes());
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    out.extend_from_slice(&digest);
    out.extend_from_slice(&[0u8; 4]);
    debug_assert_eq!(out.len(), HEADER_LEN);
    out.extend_from_slice(&graph);
    out.resize(data_offset, 0);
    out.extend_from_slice(&data);

    tracing::debug!(
        "encoded EdgeFlat model '{}': {} tensors, {} operators, {} bytes",
        model.name,
        model.tensors.len(),
        model.operators.len(),
        out.len()
    );
    Ok(out)
}

/// Decodes and fully validates EdgeFlat bytes.
///
/// Checks magic, version, section bounds, the content digest, every buffer
/// slice and every tensor index.
pub fn decode(bytes: &[u8]) -> Result<FlatModel, FormatError> {
    let header = Header::parse(bytes)?;
    let graph = section(bytes, "graph section", header.graph_offset, header.graph_len)?;
    let data = section(bytes, "data section", header.data_offset, header.data_len)?;
    if header.graph_offset < HEADER_LEN as u64
        || header.data_offset < header.graph_offset + header.graph_len
        || header.data_offset % ALIGNMENT as u64 != 0
    {
        return Err(FormatError::Malformed("overlapping or misaligned sections".into()));
    }

    let computed = content_digest(graph, data);
    if computed != header.digest {
        return Err(FormatError::DigestMismatch {
            stored: header.digest_hex(),
            computed: hex::encode(computed),
        });
    }

    let mut r = ByteReader::new(graph);
    let name = r.string("model name")?;
    let producer = r.string("producer")?;

    let tensor_count = r.count("tensor count")?;
    let mut tensors = Vec::with_capacity(tensor_count.min(r.remaining()));
    for _ in 0..tensor_count {
        tensors.push(read_tensor(&mut r, data)?);
    }

    let op_count = r.count("operator count")?;
    let mut operators = Vec::with_capacity(op_count.min(r.remaining()));
    for _ in 0..op_count {
        let opcode = r.u8("opcode")?;
        let op = read_options(&mut r, opcode)?;
        let inputs = r.indices("operator inputs")?;
        let outputs = r.indices("operator outputs")?;
        operators.push(Operator {
            op,
            inputs,
            outputs,
        });
    }
    let inputs = r.indices("model inputs")?;
    let outputs = r.indices("model outputs")?;
    if r.remaining() != 0 {
        return Err(FormatError::Malformed(format!(
            "{} trailing bytes in graph section",
            r.remaining()
        )));
    }

    let model = FlatModel {
        name,
        producer,
        tensors,
        operators,
        inputs,
        outputs,
    };
    model.validate()?;
    if model.flags() != header.flags {
        return Err(FormatError::Malformed(format!(
            "header flags {:#x} disagree with tensor dtypes ({:#x})",
            header.flags,
            model.flags()
        )));
    }
    Ok(model)
}

fn section<'a>(bytes: &'a [u8], what: &'static str, offset: u64, len: u64) -> Result<&'a [u8], FormatError> {
    let out_of_bounds = || FormatError::OutOfBounds {
        what,
        detail: format!("{offset}+{len} exceeds {} bytes", bytes.len()),
    };
    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let len = usize::try_from(len).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    bytes.get(start..end).ok_or_else(out_of_bounds)
}

fn read_tensor(r: &mut ByteReader<'_>, data: &[u8]) -> Result<FlatTensor, FormatError> {
    let name = r.string("tensor name")?;
    let dtype = dtype_from_code(r.u8("tensor dtype")?)?;
    let rank = r.u32("tensor rank")?;
    if rank > MAX_RANK {
        return Err(FormatError::Malformed(format!(
            "tensor '{name}' has rank {rank}"
        )));
    }
    let mut dims = Vec::with_capacity(rank as usize);
    for _ in 0..rank {
        let d = r.u64("tensor dim")?;
        dims.push(usize::try_from(d).map_err(|_| {
            FormatError::Malformed(format!("tensor '{name}' dimension {d} is too large"))
        })?);
    }
    dims.iter()
        .try_fold(dtype.size_bytes(), |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| FormatError::Malformed(format!("tensor '{name}' size overflows")))?;
    let shape = Shape::new(dims);

    let flags = r.u8("tensor flags")?;
    if flags & !0b11 != 0 {
        return Err(FormatError::Malformed(format!(
            "tensor '{name}' has unknown flags {flags:#x}"
        )));
    }
    let buffer = if flags & 0b01 != 0 {
        let offset = r.u64("buffer offset")?;
        let len = r.u64("buffer length")?;
        if offset % ALIGNMENT as u64 != 0 {
            return Err(FormatError::Malformed(format!(
                "buffer of '{name}' is not {ALIGNMENT}-byte aligned"
            )));
        }
        Some(section(data, "constant buffer", offset, len)?.to_vec())
    } else {
        None
    };
    let quantization = if flags & 0b10 != 0 {
        Some(QuantParams {
            scale: r.f32("quantization scale")?,
            zero_point: r.i32("quantization zero point")?,
        })
    } else {
        None
    };

    Ok(FlatTensor {
        name,
        shape,
        dtype,
        data: buffer,
        quantization,
    })
}

fn write_options(g: &mut ByteWriter, op: &Op) -> Result<(), FormatError> {
    match op {
        Op::FullyConnected { fused_activation } => g.u8(fused_activation.code()),
        Op::Conv2D {
            strides,
            padding,
            fused_activation,
        } => {
            g.pair(*strides)?;
            g.u8(padding_code(*padding));
            g.u8(fused_activation.code());
        }
        Op::MaxPool2D {
            pool,
            strides,
            padding,
        }
        | Op::AveragePool2D {
            pool,
            strides,
            padding,
        } => {
            g.pair(*pool)?;
            g.pair(*strides)?;
            g.u8(padding_code(*padding));
        }
        Op::Reshape { new_shape } => {
            g.count(new_shape.len())?;
            for &d in new_shape {
                g.u64(d as u64);
            }
        }
        Op::Softmax { beta } => g.f32(*beta),
        Op::Relu
        | Op::Relu6
        | Op::Logistic
        | Op::Tanh
        | Op::Gelu
        | Op::Add
        | Op::Sub
        | Op::Mul
        | Op::Rsqrt => {}
    }
    Ok(())
}

fn read_options(r: &mut ByteReader<'_>, opcode: u8) -> Result<Op, FormatError> {
    let op = match opcode {
        1 => Op::FullyConnected {
            fused_activation: FusedActivation::from_code(r.u8("fused activation")?)?,
        },
        2 => Op::Conv2D {
            strides: r.pair("conv strides")?,
            padding: padding_from_code(r.u8("conv padding")?)?,
            fused_activation: FusedActivation::from_code(r.u8("fused activation")?)?,
        },
        3 | 4 => {
            let pool = r.pair("pool size")?;
            let strides = r.pair("pool strides")?;
            let padding = padding_from_code(r.u8("pool padding")?)?;
            if opcode == 3 {
                Op::MaxPool2D {
                    pool,
                    strides,
                    padding,
                }
            } else {
                Op::AveragePool2D {
                    pool,
                    strides,
                    padding,
                }
            }
        }
        5 => {
            let rank = r.u32("reshape rank")?;
            if rank > MAX_RANK {
                return Err(FormatError::Malformed(format!("reshape to rank {rank}")));
            }
            let mut new_shape = Vec::with_capacity(rank as usize);
            for _ in 0..rank {
                let d = r.u64("reshape dim")?;
                new_shape.push(usize::try_from(d).map_err(|_| {
                    FormatError::Malformed(format!("reshape dimension {d} is too large"))
                })?);
            }
            Op::Reshape { new_shape }
        }
        6 => Op::Relu,
        7 => Op::Relu6,
        8 => Op::Logistic,
        9 => Op::Tanh,
        10 => Op::Gelu,
        11 => Op::Softmax {
            beta: r.f32("softmax beta")?,
        },
        12 => Op::Add,
        13 => Op::Sub,
        14 => Op::Mul,
        15 => Op::Rsqrt,
        other => return Err(FormatError::UnknownOpcode(other)),
    };
    Ok(op)
}

fn align_up(n: usize) -> usize {
    n.div_ceil(ALIGNMENT) * ALIGNMENT
}

fn dtype_code(dtype: DType) -> u8 {
    match dtype {
        DType::F32 => 0,
        DType::F16 => 1,
        DType::BF16 => 2,
        DType::I8 => 3,
    }
}

fn dtype_from_code(code: u8) -> Result<DType, FormatError> {
    match code {
        0 => Ok(DType::F32),
        1 => Ok(DType::F16),
        2 => Ok(DType::BF16),
        3 => Ok(DType::I8),
        other => Err(FormatError::UnknownDType(other)),
    }
}

fn padding_code(padding: Padding) -> u8 {
    match padding {
        Padding::Valid => 0,
        Padding::Same => 1,
    }
}

fn padding_from_code(code: u8) -> Result<Padding, FormatError> {
    match code {
        0 => Ok(Padding::Valid),
        1 => Ok(Padding::Same),
        other => Err(FormatError::Malformed(format!("unknown padding code {other}"))),
    }
}

// ── Byte-level helpers ─────────────────────────────────────────────

#[derive(Default)]
struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn count(&mut self, n: usize) -> Result<(), FormatError> {
        let n = u32::try_from(n)
            .map_err(|_| FormatError::Malformed(format!("count {n} exceeds u32")))?;
        self.u32(n);
        Ok(())
    }

    fn pair(&mut self, p: [usize; 2]) -> Result<(), FormatError> {
        self.count(p[0])?;
        self.count(p[1])
    }

    fn string(&mut self, s: &str) -> Result<(), FormatError> {
        self.count(s.len())?;
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn indices(&mut self, indices: &[usize]) -> Result<(), FormatError> {
        self.count(indices.len())?;
        for &i in indices {
            self.count(i)?;
        }
        Ok(())
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], FormatError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(FormatError::Truncated { what })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], FormatError> {
        self.take(N, what)?
            .try_into()
            .map_err(|_| FormatError::Truncated { what })
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, FormatError> {
        Ok(self.array::<1>(what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, FormatError> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    fn i32(&mut self, what: &'static str) -> Result<i32, FormatError> {
        Ok(i32::from_le_bytes(self.array(what)?))
    }

    fn f32(&mut self, what: &'static str) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.array(what)?))
    }

    fn count(&mut self, what: &'static str) -> Result<usize, FormatError> {
        Ok(self.u32(what)? as usize)
    }

    fn pair(&mut self, what: &'static str) -> Result<[usize; 2], FormatError> {
        Ok([self.count(what)?, self.count(what)?])
    }

    fn string(&mut self, what: &'static str) -> Result<String, FormatError> {
        let len = self.count(what)?;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::InvalidUtf8 { what })
    }

    fn indices(&mut self, what: &'static str) -> Result<Vec<usize>, FormatError> {
        let n = self.count(what)?;
        let mut out = Vec::with_capacity(n.min(self.remaining() / 4));
        for _ in 0..n {
            out.push(self.count(what)?);
        }
        Ok(out)
    }
}
