// ============================================================
// Layer 4 — Stratified Train/Validation Splitter
// ============================================================
// Splits samples into training and validation sets so that
// each class keeps (approximately) the same share in both.
//
// Allocation:
//   n_val          = ceil(val_fraction * n)
//   quota(class)   = floor(n_val * count(class) / n)
//   leftover slots → classes with the largest fractional part
//                    of their exact share (ties: smaller key)
//
// Each class is shuffled with a seeded RNG before its quota is
// taken, and both outputs are shuffled again so classes are
// interleaved. The same seed always gives the same split.
//
// Reference: rand crate documentation (SeedableRng, SliceRandom)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::BTreeMap;

/// Split `samples` into (train, validation), stratified by `key`.
///
/// # Arguments
/// * `samples`      - All available samples (consumed)
/// * `key`          - Class of a sample
/// * `val_fraction` - Proportion for validation, e.g. 0.2 = 20%
/// * `seed`         - RNG seed for reproducible shuffling
pub fn stratified_split<T, K, F>(
    samples:      Vec<T>,
    key:          F,
    val_fraction: f64,
    seed:         u64,
) -> (Vec<T>, Vec<T>)
where
    K: Ord + Copy,
    F: Fn(&T) -> K,
{
    let total = samples.len();
    let mut rng = StdRng::seed_from_u64(seed);

    let fraction = val_fraction.clamp(0.0, 1.0);
    let n_val    = ((total as f64) * fraction).ceil() as usize;
    let n_val    = n_val.min(total);

    // Group by class; BTreeMap keeps class order deterministic
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for sample in samples {
        groups.entry(key(&sample)).or_default().push(sample);
    }

    let quotas = allocate_quotas(
        &groups.values().map(Vec::len).collect::<Vec<_>>(),
        n_val,
    );

    let mut train = Vec::with_capacity(total - n_val);
    let mut val   = Vec::with_capacity(n_val);

    for (mut group, quota) in groups.into_values().zip(quotas) {
        group.shuffle(&mut rng);
        let rest = group.split_off(quota);
        val.extend(group);
        train.extend(rest);
    }

    train.shuffle(&mut rng);
    val.shuffle(&mut rng);

    tracing::debug!(
        "Stratified split: {} training, {} validation",
        train.len(),
        val.len(),
    );

    (train, val)
}

/// Distribute `n_val` slots over classes proportionally to `counts`.
fn allocate_quotas(counts: &[usize], n_val: usize) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0; counts.len()];
    }

    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| n_val as f64 * c as f64 / total as f64)
        .collect();
    let mut quotas: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();

    let mut remaining = n_val - quotas.iter().sum::<usize>();
    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });

    for idx in order.into_iter().cycle() {
        if remaining == 0 {
            break;
        }
        if quotas[idx] < counts[idx] {
            quotas[idx] += 1;
            remaining -= 1;
        }
    }
    quotas
}
