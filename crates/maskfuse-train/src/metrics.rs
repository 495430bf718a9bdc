use ndarray::{ArrayView4, Zip};

/// Keeps `ln` finite for saturated predictions.
pub const PROBABILITY_EPSILON: f32 = 1e-7;

pub const DECISION_THRESHOLD: f32 = 0.5;

/// Mean binary cross-entropy between predicted probabilities and 0/1 targets.
pub fn binary_cross_entropy(predicted: ArrayView4<'_, f32>, target: ArrayView4<'_, f32>) -> f32 {
    let count = predicted.len();
    if count == 0 {
        return 0.0;
    }
    let mut total = 0.0f64;
    Zip::from(predicted).and(target).for_each(|&p, &y| {
        let p = p.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
        total -= f64::from(y * p.ln() + (1.0 - y) * (1.0 - p).ln());
    });
    (total / count as f64) as f32
}

/// Fraction of pixels where the thresholded prediction matches the target.
pub fn binary_accuracy(predicted: ArrayView4<'_, f32>, target: ArrayView4<'_, f32>) -> f32 {
    let count = predicted.len();
    if count == 0 {
        return 0.0;
    }
    let mut hits = 0usize;
    Zip::from(predicted).and(target).for_each(|&p, &y| {
        if (p >= DECISION_THRESHOLD) == (y >= DECISION_THRESHOLD) {
            hits += 1;
        }
    });
    hits as f32 / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn perfect_predictions_have_near_zero_loss() {
        let target = Array4::from_shape_vec((1, 1, 2, 1), vec![0.0, 1.0]).unwrap();
        let loss = binary_cross_entropy(target.view(), target.view());
        assert!(loss < 1e-5);
        assert_eq!(binary_accuracy(target.view(), target.view()), 1.0);
    }

    #[test]
    fn uniform_guess_costs_ln_two() {
        let target = Array4::from_shape_vec((1, 1, 2, 1), vec![0.0, 1.0]).unwrap();
        let guess = Array4::from_elem((1, 1, 2, 1), 0.5f32);
        let loss = binary_cross_entropy(guess.view(), target.view());
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn accuracy_counts_thresholded_hits() {
        let target = Array4::from_shape_vec((1, 1, 4, 1), vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let predicted = Array4::from_shape_vec((1, 1, 4, 1), vec![0.2, 0.9, 0.1, 0.7]).unwrap();
        assert_eq!(binary_accuracy(predicted.view(), target.view()), 0.5);
    }
}
