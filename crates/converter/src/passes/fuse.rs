// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Activation fusion.
//!
//! A `RELU`, `RELU6`, `TANH` or `LOGISTIC` whose only input is produced by a
//! `FULLY_CONNECTED` or `CONV_2D` without a fused activation, and which is the
//! sole reader of that tensor, is folded into the producer. The intermediate
//! tensor is removed. A tensor that is a model output is never fused away.

use flat_model::{FlatModel, FusedActivation, Op};
use tracing::debug;

use super::{OptimizationPass, PassReport};
use crate::{ConvertError, FailurePolicy, OptimizationKind};

#[derive(Debug, Clone, Default)]
pub struct FuseActivations;

fn fusable(op: &Op) -> Option<FusedActivation> {
    match op {
        Op::Relu => Some(FusedActivation::Relu),
        Op::Relu6 => Some(FusedActivation::Relu6),
        Op::Tanh => Some(FusedActivation::Tanh),
        Op::Logistic => Some(FusedActivation::Logistic),
        _ => None,
    }
}

fn fused_activation(op: &Op) -> Option<FusedActivation> {
    match op {
        Op::FullyConnected { fused_activation } | Op::Conv2D { fused_activation, .. } => {
            Some(*fused_activation)
        }
        _ => None,
    }
}

fn fused_slot(op: &mut Op) -> Option<&mut FusedActivation> {
    match op {
        Op::FullyConnected { fused_activation } | Op::Conv2D { fused_activation, .. } => {
            Some(fused_activation)
        }
        _ => None,
    }
}

impl OptimizationPass for FuseActivations {
    fn kind(&self) -> OptimizationKind {
        OptimizationKind::FuseActivations
    }

    fn run(
        &self,
        model: &mut FlatModel,
        _policy: FailurePolicy,
        report: &mut PassReport,
    ) -> Result<(), ConvertError> {
        let mut i = 0;
        while i < model.operators.len() {
            if let Some(j) = fusion_partner(model, i) {
                let activation = fusable(&model.operators[j].op).unwrap_or_default();
                let absorbed = model.operators.remove(j);
                let producer = &mut model.operators[i];
                if let Some(slot) = fused_slot(&mut producer.op) {
                    *slot = activation;
                }
                producer.outputs = absorbed.outputs;
                let name = model.tensors[producer.outputs[0]].name.clone();
                debug!("fused {activation:?} into {} producing '{name}'", producer.op);
                report.fused.push(name);
            }
            i += 1;
        }
        drop_orphaned_activations(model);
        Ok(())
    }
}

/// Index of the activation operator that can be folded into operator `i`.
fn fusion_partner(model: &FlatModel, i: usize) -> Option<usize> {
    let producer = &model.operators[i];
    if fused_activation(&producer.op) != Some(FusedActivation::None) {
        return None;
    }
    let [out] = producer.outputs[..] else {
        return None;
    };
    if model.outputs.contains(&out) {
        return None;
    }
    let mut readers = model
        .operators
        .iter()
        .enumerate()
        .filter(|(_, o)| o.inputs.contains(&out));
    let (j, reader) = readers.next()?;
    if readers.next().is_some() || reader.inputs.len() != 1 || reader.outputs.len() != 1 {
        return None;
    }
    fusable(&reader.op).map(|_| j)
}

/// Removes activation tensors that no operator or model I/O references,
/// remapping every index. Constants are always kept.
pub(crate) fn drop_orphaned_activations(model: &mut FlatModel) {
    let n = model.tensors.len();
    let mut used = vec![false; n];
    for &i in model.inputs.iter().chain(&model.outputs) {
        used[i] = true;
    }
    for operator in &model.operators {
        for &i in operator.inputs.iter().chain(&operator.outputs) {
            used[i] = true;
        }
    }
    for (i, t) in model.tensors.iter().enumerate() {
        used[i] |= t.is_constant();
    }
    if used.iter().all(|&u| u) {
        return;
    }

    let mut remap = vec![usize::MAX; n];
    let mut next = 0;
    for (i, &keep) in used.iter().enumerate() {
        if keep {
            remap[i] = next;
            next += 1;
        }
    }
    let mut index = 0;
    model.tensors.retain(|_| {
        let keep = used[index];
        index += 1;
        keep
    });
    let apply = |indices: &mut Vec<usize>| indices.iter_mut().for_each(|i| *i = remap[*i]);
    apply(&mut model.inputs);
    apply(&mut model.outputs);
    for operator in &mut model.operators {
        apply(&mut operator.inputs);
        apply(&mut operator.outputs);
    }
}
