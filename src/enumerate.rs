// src/enumerate.rs
//
// =============================================================================
// SDFORGE: ENUMERATOR
// =============================================================================
//
// Axis extraction, ordering, and combinatorial/random iteration over the
// Cartesian product of loop axes. Grounded on `workflow::add_smart_node`'s
// deterministic-ordering discipline -- sort for order-independence only
// where explicitly required, otherwise preserve declaration order. The
// PRNG itself is enriched from the sibling `Rejean-McCormick-VotingMachine`
// example's `rand_core`/`rand_chacha` stack.

use crate::document::{Mode, VariationEntry};
use crate::error::EngineError;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// One loop axis: a placeholder whose selected variation set has more
/// than one entry. `variations` is already selector-narrowed and ordered.
#[derive(Debug, Clone)]
pub struct Axis {
    pub name: String,
    pub variations: Vec<VariationEntry>,
    pub weight: Option<u32>,
    pub declaration_index: usize,
    /// `Some(field)` for a `with`-bound chunk field axis drawing from a
    /// `multi_field` source; `None` for a plain placeholder axis, which
    /// contributes an entry's whole text.
    pub field: Option<String>,
}

impl Axis {
    pub fn len(&self) -> usize {
        self.variations.len().max(1)
    }
}

/// Sorts axes by `(weight.unwrap_or(u32::MAX), declaration_index)` --
/// ascending weight outer-loops (varies slowest), declared order breaks
/// ties.
pub fn order_axes(mut axes: Vec<Axis>) -> Vec<Axis> {
    axes.sort_by_key(|a| (a.weight.unwrap_or(u32::MAX), a.declaration_index));
    axes
}

/// Product of every axis's selected-set size. A zero-axis prompt (empty
/// `axes`) yields exactly 1.
pub fn total_combinations(axes: &[Axis]) -> Result<u64, EngineError> {
    let mut total: u64 = 1;
    for axis in axes {
        total = total
            .checked_mul(axis.len() as u64)
            .ok_or_else(|| EngineError::validation("total combination count overflows u64"))?;
    }
    Ok(total)
}

/// Decodes a 0-based combinatorial index into per-axis selected-list
/// indices. The *last* axis in `axes` (as ordered by [`order_axes`])
/// varies fastest -- the declared-order-outer-to-inner "nested for loop"
/// reading of the Cartesian product.
pub fn decode_mixed_radix(mut remaining: u64, axes: &[Axis]) -> Vec<usize> {
    let mut digits = vec![0usize; axes.len()];
    for i in (0..axes.len()).rev() {
        let size = axes[i].len() as u64;
        digits[i] = (remaining % size) as usize;
        remaining /= size;
    }
    digits
}

/// How many variants a run will actually emit, and in what combinatorial
/// order, once mode/seed/max_images are applied.
#[derive(Debug, Clone)]
pub enum EnumerationPlan {
    /// Cartesian product in index order, truncated at `limit`.
    Combinatorial { limit: u64 },
    /// Pre-shuffled combination indices (a permutation prefix): when
    /// `max_images >= total`, the result is a permutation of the whole
    /// space, not a subset.
    Random { combo_indices: Vec<u64> },
}

/// Builds the enumeration plan for `mode`, drawing from `rng` only for
/// `Mode::Random` -- the same RNG stream used by `Selector::Random`
/// selectors during axis construction -- one PRNG stream for `random:N`
/// selectors *and* `mode=random` sampling, never crossed with the
/// per-image SD seed stream.
pub fn plan_for(
    mode: Mode,
    axes: &[Axis],
    rng: &mut ChaCha8Rng,
    max_images: u32,
) -> Result<EnumerationPlan, EngineError> {
    let total = total_combinations(axes)?;
    match mode {
        Mode::Combinatorial => {
            let limit = if max_images == 0 { total } else { (max_images as u64).min(total) };
            Ok(EnumerationPlan::Combinatorial { limit })
        }
        Mode::Random => {
            let combo_indices = build_random_indices(total, rng, max_images)?;
            Ok(EnumerationPlan::Random { combo_indices })
        }
    }
}

/// Without-replacement sample of combination indices from `0..total`,
/// shuffled deterministically from `rng`. Materializes the full index
/// space -- a `u64`-indexed Cartesian space must be enumerable for
/// permutation correctness when `max_images` is large relative to the
/// total; an explicit guard rejects totals beyond `usize::MAX` rather
/// than silently truncating.
fn build_random_indices(
    total: u64,
    rng: &mut ChaCha8Rng,
    max_images: u32,
) -> Result<Vec<u64>, EngineError> {
    if total == 0 {
        return Ok(Vec::new());
    }
    if total > usize::MAX as u64 {
        return Err(EngineError::validation(
            "combination space too large to enumerate for random-mode sampling",
        ));
    }
    let mut indices: Vec<u64> = (0..total).collect();
    indices.shuffle(rng);
    let limit = if max_images == 0 {
        total as usize
    } else {
        (max_images as usize).min(total as usize)
    };
    indices.truncate(limit);
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Variation;
    use rand::SeedableRng;

    fn axis(name: &str, keys: &[&str], weight: Option<u32>, decl: usize) -> Axis {
        Axis {
            name: name.to_string(),
            variations: keys
                .iter()
                .map(|k| VariationEntry::Simple(Variation { key: k.to_string(), text: k.to_string() }))
                .collect(),
            weight,
            declaration_index: decl,
            field: None,
        }
    }

    #[test]
    fn zero_axis_yields_one_combination() {
        let axes: Vec<Axis> = Vec::new();
        assert_eq!(total_combinations(&axes).unwrap(), 1);
    }

    #[test]
    fn combinatorial_order_matches_spec_scenario_two() {
        // Two axes: A (2 entries), B (3 entries), max_images=4.
        let axes = order_axes(vec![
            axis("A", &["a1", "a2"], None, 0),
            axis("B", &["b1", "b2", "b3"], None, 1),
        ]);
        let total = total_combinations(&axes).unwrap();
        assert_eq!(total, 6);
        let combos: Vec<Vec<usize>> = (0..4).map(|i| decode_mixed_radix(i, &axes)).collect();
        assert_eq!(
            combos,
            vec![vec![0, 0], vec![0, 1], vec![0, 2], vec![1, 0]]
        );
    }

    #[test]
    fn weight_overrides_declaration_order() {
        // Declared B first but weight makes A the outer (slower) axis.
        let axes = order_axes(vec![
            axis("B", &["b1", "b2"], Some(5), 0),
            axis("A", &["a1", "a2"], Some(1), 1),
        ]);
        assert_eq!(axes[0].name, "A");
        assert_eq!(axes[1].name, "B");
    }

    #[test]
    fn random_mode_same_seed_reproduces_same_selection() {
        let axes = order_axes(vec![axis("A", &["a", "b", "c", "d", "e"], None, 0)]);
        let mut rng1 = ChaCha8Rng::seed_from_u64(7);
        let plan1 = plan_for(Mode::Random, &axes, &mut rng1, 3).unwrap();
        let mut rng2 = ChaCha8Rng::seed_from_u64(7);
        let plan2 = plan_for(Mode::Random, &axes, &mut rng2, 3).unwrap();
        match (plan1, plan2) {
            (EnumerationPlan::Random { combo_indices: a }, EnumerationPlan::Random { combo_indices: b }) => {
                assert_eq!(a, b);
                assert_eq!(a.len(), 3);
            }
            _ => panic!("expected random plans"),
        }
    }

    #[test]
    fn random_mode_n_beyond_total_is_a_permutation() {
        let axes = order_axes(vec![axis("A", &["a", "b", "c"], None, 0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let plan = plan_for(Mode::Random, &axes, &mut rng, 100).unwrap();
        match plan {
            EnumerationPlan::Random { combo_indices } => {
                let mut sorted = combo_indices.clone();
                sorted.sort();
                assert_eq!(sorted, vec![0, 1, 2]);
            }
            _ => panic!("expected random plan"),
        }
    }
}
