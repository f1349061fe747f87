//! Turning classifier logits into probabilities and predictions.

use crate::error::{Error, Result};

/// A class index paired with its probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub probability: f32,
}

/// Numerically stable softmax.
///
/// Subtracts the maximum logit before exponentiating, so the result does not
/// change when a constant is added to every logit.
///
/// # Errors
///
/// Returns [`Error::EmptyInput`] for an empty slice and
/// [`Error::NumericInstability`] for the first NaN or infinite logit.
pub fn softmax(logits: &[f32]) -> Result<Vec<f32>> {
    if logits.is_empty() {
        return Err(Error::EmptyInput {
            what: "logits".to_string(),
        });
    }

    if let Some((index, &value)) = logits.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(Error::NumericInstability { index, value });
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut probs: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    // The max term contributes exp(0) = 1, so the sum is at least 1
    let sum: f32 = probs.iter().sum();
    for p in &mut probs {
        *p /= sum;
    }

    Ok(probs)
}

/// Index and value of the largest probability.
///
/// Uses a strict `>` scan, so on exact ties the lowest index wins.
///
/// # Errors
///
/// Returns [`Error::EmptyInput`] for an empty slice.
pub fn argmax(probs: &[f32]) -> Result<Prediction> {
    let (first, rest) = probs.split_first().ok_or_else(|| Error::EmptyInput {
        what: "probabilities".to_string(),
    })?;

    let mut best = Prediction {
        index: 0,
        probability: *first,
    };
    for (offset, &p) in rest.iter().enumerate() {
        if p > best.probability {
            best = Prediction {
                index: offset + 1,
                probability: p,
            };
        }
    }

    Ok(best)
}

/// Softmax followed by [`argmax`].
///
/// # Errors
///
/// Propagates the errors of [`softmax`].
pub fn classify_logits(logits: &[f32]) -> Result<(Vec<f32>, Prediction)> {
    let probs = softmax(logits)?;
    let top = argmax(&probs)?;
    Ok((probs, top))
}

/// The `k` most probable classes, best first.
///
/// Ties are ordered by ascending class index and NaN entries rank last.
/// Asking for more classes than exist returns all of them.
#[must_use]
pub fn top_k(probs: &[f32], k: usize) -> Vec<Prediction> {
    let mut ranked: Vec<Prediction> = probs
        .iter()
        .enumerate()
        .map(|(index, &probability)| Prediction { index, probability })
        .collect();

    // Stable sort keeps ascending index order among equal probabilities
    ranked.sort_by(|a, b| rank_key(b.probability).total_cmp(&rank_key(a.probability)));
    ranked.truncate(k);
    ranked
}

/// Sort key placing NaN below every number.
#[inline]
fn rank_key(p: f32) -> f32 {
    if p.is_nan() {
        f32::NEG_INFINITY
    } else {
        p
    }
}
