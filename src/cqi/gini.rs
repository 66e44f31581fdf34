//! Gini coefficient over a non-negative vector.

/// `Σᵢⱼ|vᵢ − vⱼ| / (2n·Σv)`; a zero-sum vector returns 1 (maximal
/// inequality, by convention — there is no work to distribute fairly).
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 {
        return 1.0;
    }

    let mut numerator = 0.0;
    for i in 0..n {
        for j in 0..n {
            numerator += (values[i] - values[j]).abs();
        }
    }
    (numerator / (2.0 * n as f64 * sum)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gini_of_equal_values_is_zero() {
        assert_eq!(gini(&[5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn gini_is_bounded() {
        for values in [
            vec![1.0, 0.0, 0.0],
            vec![100.0, 1.0, 1.0, 1.0],
            vec![0.0, 0.0],
        ] {
            let g = gini(&values);
            assert!((0.0..=1.0).contains(&g), "gini({:?}) = {}", values, g);
        }
    }

    #[test]
    fn gini_of_zero_sum_is_one() {
        assert_eq!(gini(&[0.0, 0.0, 0.0]), 1.0);
    }

    #[test]
    fn gini_of_empty_is_zero() {
        assert_eq!(gini(&[]), 0.0);
    }

    #[test]
    fn gini_increases_with_imbalance() {
        let balanced = gini(&[10.0, 10.0]);
        let imbalanced = gini(&[19.0, 1.0]);
        assert!(imbalanced > balanced);
    }
}
