pub mod tensor;
pub mod param;

pub use tensor::Tensor3;
pub use param::Param;

/// Index of the maximum element in a slice.
pub fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::argmax;

    #[test]
    fn argmax_picks_largest_probability() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
    }

    #[test]
    fn argmax_handles_first_and_last_positions() {
        assert_eq!(argmax(&[0.9, 0.05, 0.05]), 0);
        assert_eq!(argmax(&[0.05, 0.05, 0.9]), 2);
    }
}
