/// In-place L2 normalization helper to keep allocations down during hot paths.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}

/// Average the token states of one sequence, counting only positions whose mask is set.
///
/// `states` is the flattened `[seq_len, hidden]` slice for a single row of the batch.
pub(crate) fn masked_mean_pool(states: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden];
    let mut count = 0.0f32;
    for (row, &m) in states.chunks_exact(hidden).zip(mask) {
        if m == 0 {
            continue;
        }
        count += 1.0;
        for (acc, &val) in pooled.iter_mut().zip(row) {
            *acc += val;
        }
    }
    // Sentence-transformers clamps the token count to avoid dividing by zero.
    let inv = count.max(1e-9).recip();
    for val in &mut pooled {
        *val *= inv;
    }
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_simple_vector() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_maintains_unit_length() {
        let mut v = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        l2_normalize_in_place(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        let mut v = vec![0.0f32; 4];
        l2_normalize_in_place(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn mean_pool_ignores_padding() {
        // Two real tokens and one padded position.
        let states = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let pooled = masked_mean_pool(&states, &[1, 1, 0], 2);
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn mean_pool_all_masked_is_zero() {
        let states = [5.0, 5.0];
        let pooled = masked_mean_pool(&states, &[0], 2);
        assert_eq!(pooled, vec![0.0, 0.0]);
    }
}
