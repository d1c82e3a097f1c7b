//! Attention-mask-weighted mean pooling

use super::EmbeddingError;

/// Lower bound for the mask sum so an all-padding input never divides by zero
pub const MASK_FLOOR: f32 = 1e-9;

/// Mean pooling: `sum(token * mask) / max(sum(mask), MASK_FLOOR)`
///
/// `hidden` is the encoder's last hidden state, one row per token position.
pub fn mean_pool(hidden: &[Vec<f32>], attention_mask: &[u32]) -> Result<Vec<f32>, EmbeddingError> {
    if hidden.len() != attention_mask.len() {
        return Err(EmbeddingError::Shape(format!(
            "{} token rows for {} mask positions",
            hidden.len(),
            attention_mask.len()
        )));
    }

    let hidden_size = match hidden.first() {
        Some(row) if !row.is_empty() => row.len(),
        _ => return Err(EmbeddingError::Shape("encoder returned no hidden states".into())),
    };

    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for (row, &m) in hidden.iter().zip(attention_mask) {
        if row.len() != hidden_size {
            return Err(EmbeddingError::Shape(format!(
                "ragged hidden state: row of {} in width {}",
                row.len(),
                hidden_size
            )));
        }
        if m > 0 {
            let weight = m as f32;
            for (acc, val) in sum.iter_mut().zip(row) {
                *acc += val * weight;
            }
            count += weight;
        }
    }

    let denom = count.max(MASK_FLOOR);
    sum.iter_mut().for_each(|v| *v /= denom);

    Ok(sum)
}
