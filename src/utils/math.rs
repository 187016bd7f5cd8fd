/// Converts a Phred-scaled value into an error probability.
#[inline]
pub fn phred_to_error(q: f64) -> f64 {
    10f64.powf(-q / 10.0)
}

/// Numerically stable `ln(sum(exp(x)))` over natural-log values.
///
/// Returns negative infinity for an empty slice or when every term is negative infinity.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Turns natural-log weights into probabilities that sum to one.
///
/// All-zero input (every weight negative infinity) yields all zeros.
pub fn normalize_log_probs(log_weights: &[f64]) -> Vec<f64> {
    let total = log_sum_exp(log_weights);
    if total == f64::NEG_INFINITY {
        return vec![0.0; log_weights.len()];
    }
    log_weights.iter().map(|w| (w - total).exp()).collect()
}
