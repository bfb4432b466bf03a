//! # Selection Engine
//!
//! Turns ranked scores into a sampled batch. Sampling goes through a
//! temperature softmax so the best candidates are likely but not certain,
//! and every random draw comes from a caller-supplied [`Rng`] so a seeded
//! generator reproduces the same batch.

use rand::Rng;
use std::collections::HashMap;
use std::hash::Hash;

/// Lowest temperature accepted by [`softmax`].
pub const MIN_TEMPERATURE: f64 = 1e-6;

/// Numerically stable softmax.
///
/// Non-finite scores count as 0 and a temperature at or below zero is
/// floored at [`MIN_TEMPERATURE`]. The result sums to 1 unless `scores` is
/// empty.
#[must_use]
pub fn softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let t = if temperature.is_finite() && temperature > MIN_TEMPERATURE {
        temperature
    } else if temperature.is_finite() {
        MIN_TEMPERATURE
    } else {
        1.0
    };

    let clean: Vec<f64> = scores
        .iter()
        .map(|s| if s.is_finite() { *s } else { 0.0 })
        .collect();
    let max = clean.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let exps: Vec<f64> = clean.iter().map(|s| ((s - max) / t).exp()).collect();
    let denom: f64 = exps.iter().sum();
    if denom <= 0.0 || !denom.is_finite() {
        let n = scores.len() as f64;
        return vec![1.0 / n; scores.len()];
    }
    exps.into_iter().map(|e| e / denom).collect()
}

/// Sample `count` items without replacement, weighted by `softmax(scores)`.
///
/// When `items` holds no more than `count` elements they are returned
/// unchanged. Otherwise each draw renormalizes over the items still left,
/// walks a uniform `r` down the distribution and takes the item where it
/// reaches zero; rounding leftovers pick the last remaining item. Missing
/// scores count as 0.
pub fn weighted_random_select<T, R>(
    items: &[T],
    scores: &[f64],
    count: usize,
    temperature: f64,
    rng: &mut R,
) -> Vec<T>
where
    T: Clone,
    R: Rng,
{
    if items.len() <= count {
        return items.to_vec();
    }

    let mut remaining: Vec<usize> = (0..items.len()).collect();
    let mut selected = Vec::with_capacity(count);

    while selected.len() < count && !remaining.is_empty() {
        let pool_scores: Vec<f64> = remaining
            .iter()
            .map(|&i| scores.get(i).copied().unwrap_or(0.0))
            .collect();
        let probabilities = softmax(&pool_scores, temperature);

        let mut r: f64 = rng.gen();
        let mut picked = remaining.len() - 1;
        for (slot, p) in probabilities.iter().enumerate() {
            r -= p;
            if r <= 0.0 {
                picked = slot;
                break;
            }
        }

        let index = remaining.remove(picked);
        selected.push(items[index].clone());
    }

    selected
}

/// Cap items per key and spread equal keys apart.
///
/// Keeps at most `max_per_key` items of `batch` for any key, refills the
/// batch from `reserve` (in order) up to its original size, then reorders
/// greedily so that no two neighbours share a key unless nothing else is
/// left. Items without a key are never constrained.
pub fn enforce_variety<T, K, F>(batch: Vec<T>, reserve: Vec<T>, max_per_key: usize, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let target = batch.len();
    let max_per_key = max_per_key.max(1);
    let mut counts: HashMap<K, usize> = HashMap::new();
    let mut kept = Vec::with_capacity(target);

    for item in batch.into_iter().chain(reserve) {
        if kept.len() == target {
            break;
        }
        match key(&item) {
            Some(k) => {
                let count = counts.entry(k).or_insert(0);
                if *count < max_per_key {
                    *count += 1;
                    kept.push(item);
                }
            }
            None => kept.push(item),
        }
    }

    separate_neighbours(kept, key)
}

/// Reorder greedily so that no two neighbours share a key when avoidable.
///
/// Each slot takes the earliest remaining item whose key differs from the
/// previous one, so an already ranked input keeps its order as far as the
/// constraint allows. A key holding more than half of what is left goes
/// first, otherwise it could not be spread out any more.
pub fn separate_neighbours<T, K, F>(mut pending: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let mut remaining: HashMap<K, usize> = HashMap::new();
    for item in &pending {
        if let Some(k) = key(item) {
            *remaining.entry(k).or_insert(0) += 1;
        }
    }

    let mut ordered: Vec<T> = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let last_key = ordered.last().and_then(&key);
        let left = pending.len();
        let crowded = remaining
            .iter()
            .find(|(k, count)| **count * 2 > left && last_key.as_ref() != Some(*k))
            .map(|(k, _)| k);
        let next = match crowded {
            Some(crowded) => pending.iter().position(|item| key(item).as_ref() == Some(crowded)),
            None => pending.iter().position(|item| match (&last_key, key(item)) {
                (Some(last), Some(k)) => *last != k,
                _ => true,
            }),
        }
        .unwrap_or(0);

        let item = pending.remove(next);
        if let Some(count) = key(&item).and_then(|k| remaining.get_mut(&k)) {
            *count -= 1;
        }
        ordered.push(item);
    }
    ordered
}
