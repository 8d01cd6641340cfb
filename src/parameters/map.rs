//! Local-to-global parameter maps.
//!
//! Every curve evaluates its equation from a short list of local parameter
//! slots. A [`ParameterMap`] records, for each curve, which entry of the
//! global parameter vector backs each slot. Curves that share a physical
//! quantity (an exchange rate common to a residue group, an R2 common to all
//! fields) point the corresponding slot at the same global index.
//!
//! Sharing is derived from state descriptors by mixed-radix encoding over a
//! subset of the state axes; see [`map_index`] and [`ParameterMapBuilder`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{RelaxError, Result};

/// Mixed-radix position of `state` over the axes listed in `mask`.
///
/// ```text
/// index = Σ_i state[mask[i]] · Π_{k<i} state_count[mask[k]]
/// ```
///
/// Axes not named in `mask` do not contribute, so states differing only on
/// those axes share an index.
pub fn map_index(state: &[usize], state_count: &[usize], mask: &[usize]) -> usize {
    let mut index = 0;
    let mut mult = 1;
    for &axis in mask {
        index += mult * state[axis];
        mult *= state_count[axis];
    }
    index
}

/// Global index of every local slot of every curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMap {
    slots: Vec<Vec<usize>>,
}

impl ParameterMap {
    /// Wrap per-curve slot lists. All curves must have the same slot count.
    pub fn new(slots: Vec<Vec<usize>>) -> Result<Self> {
        if slots.is_empty() {
            return Err(RelaxError::InvalidInput("parameter map has no curves".to_string()));
        }
        let width = slots[0].len();
        if width == 0 || slots.iter().any(|s| s.len() != width) {
            return Err(RelaxError::DimensionMismatch(
                "every curve needs the same non-zero number of slots".to_string(),
            ));
        }
        Ok(Self { slots })
    }

    /// Number of curves.
    pub fn n_curves(&self) -> usize {
        self.slots.len()
    }

    /// Number of local slots per curve.
    pub fn n_slots(&self) -> usize {
        self.slots[0].len()
    }

    /// Length of the global parameter vector: one past the largest index.
    pub fn n_pars(&self) -> usize {
        self.slots
            .iter()
            .flat_map(|s| s.iter())
            .max()
            .map_or(0, |m| m + 1)
    }

    /// Slot list of curve `id`.
    pub fn curve(&self, id: usize) -> &[usize] {
        &self.slots[id]
    }

    /// Iterate over the slot lists in curve order.
    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.slots.iter().map(Vec::as_slice)
    }

    /// The local slot that global index `global` backs, if any curve uses it.
    pub fn slot_of(&self, global: usize) -> Option<usize> {
        self.slots
            .iter()
            .find_map(|s| s.iter().position(|&g| g == global))
    }

    /// Renumber indices so the used ones are exactly `0..k`, preserving order.
    fn compacted(self) -> Self {
        let used: BTreeSet<usize> = self.slots.iter().flatten().copied().collect();
        let lookup: Vec<usize> = used.into_iter().collect();
        let slots = self
            .slots
            .into_iter()
            .map(|s| {
                s.into_iter()
                    .map(|g| lookup.binary_search(&g).unwrap_or(g))
                    .collect()
            })
            .collect();
        Self { slots }
    }
}

/// Map with no sharing: slot `j` of curve `i` is `m·i + j`.
pub fn make_map(n_curves: usize, m: usize) -> ParameterMap {
    ParameterMap {
        slots: (0..n_curves)
            .map(|i| (0..m).map(|j| m * i + j).collect())
            .collect(),
    }
}

/// Map where the first `n_group` slots are shared by all curves and the rest
/// are per curve.
pub fn make_group_map(n_curves: usize, n_slots: usize, n_group: usize) -> ParameterMap {
    let per_curve = n_slots - n_group;
    ParameterMap {
        slots: (0..n_curves)
            .map(|i| {
                (0..n_slots)
                    .map(|j| {
                        if j < n_group {
                            j
                        } else {
                            n_group + per_curve * i + (j - n_group)
                        }
                    })
                    .collect()
            })
            .collect(),
    }
}

/// How a local slot is shared between curves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSharing {
    /// One global value for every curve.
    Shared,
    /// One global value per distinct combination of the listed state axes.
    Masked(Vec<usize>),
}

/// Builds grouping-aware maps from state descriptors.
#[derive(Debug, Clone)]
pub struct ParameterMapBuilder<'a> {
    state_count: &'a [usize],
    states: &'a [Vec<usize>],
}

impl<'a> ParameterMapBuilder<'a> {
    /// Validate the grouping input.
    ///
    /// # Errors
    ///
    /// `MalformedGrouping` when there are no curves, a state descriptor's
    /// width differs from the state-count width, an axis has zero cardinality,
    /// or a state value is not below its axis cardinality.
    pub fn new(state_count: &'a [usize], states: &'a [Vec<usize>]) -> Result<Self> {
        if states.is_empty() {
            return Err(RelaxError::MalformedGrouping("no curves to map".to_string()));
        }
        if let Some(axis) = state_count.iter().position(|&c| c == 0) {
            return Err(RelaxError::MalformedGrouping(format!(
                "axis {} has zero states",
                axis
            )));
        }
        for (curve, state) in states.iter().enumerate() {
            if state.len() != state_count.len() {
                return Err(RelaxError::MalformedGrouping(format!(
                    "curve {} has {} state axes, expected {}",
                    curve,
                    state.len(),
                    state_count.len()
                )));
            }
            if let Some(axis) = (0..state.len()).find(|&a| state[a] >= state_count[a]) {
                return Err(RelaxError::MalformedGrouping(format!(
                    "curve {} state {} on axis {} exceeds count {}",
                    curve, state[axis], axis, state_count[axis]
                )));
            }
        }
        Ok(Self { state_count, states })
    }

    /// Lay out the slots in order, each one after the indices of the previous
    /// slots, then renumber so no global index is left unused.
    pub fn build(&self, sharing: &[SlotSharing]) -> Result<ParameterMap> {
        if sharing.is_empty() {
            return Err(RelaxError::MalformedGrouping("no slots to map".to_string()));
        }
        let mut slots = vec![Vec::with_capacity(sharing.len()); self.states.len()];
        let mut offset = 0;
        for rule in sharing {
            let mut last = offset;
            for (curve, state) in self.states.iter().enumerate() {
                let index = match rule {
                    SlotSharing::Shared => offset,
                    SlotSharing::Masked(mask) => {
                        if let Some(&axis) = mask.iter().find(|&&a| a >= self.state_count.len()) {
                            return Err(RelaxError::MalformedGrouping(format!(
                                "mask axis {} out of range",
                                axis
                            )));
                        }
                        offset + map_index(state, self.state_count, mask)
                    }
                };
                last = last.max(index);
                slots[curve].push(index);
            }
            offset = last + 1;
        }
        Ok(ParameterMap { slots }.compacted())
    }

    /// Number of curves being mapped.
    pub fn n_curves(&self) -> usize {
        self.states.len()
    }
}
