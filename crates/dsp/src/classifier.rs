//! Classifier (C6): maps a feature vector to a scalar in [0,1] (spec §4.6),
//! grounded on `Classifier.h`'s capability-trait shape.

use elemem_types::ElememError;

/// A classification capability: `classify(feature_vector) -> [0,1]`, where
/// a value below 0.5 indicates a "poor memory state" (stim warranted).
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &[f64]) -> Result<f64, ElememError>;
}

/// Logistic regression over a fixed weight vector plus bias, the concrete
/// variant named in spec §4.6.
pub struct LogisticRegressionClassifier {
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegressionClassifier {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }
}

impl Classifier for LogisticRegressionClassifier {
    fn classify(&self, features: &[f64]) -> Result<f64, ElememError> {
        if features.len() != self.weights.len() {
            return Err(ElememError::protocol(format!(
                "classifier expected {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }
        let z: f64 = features
            .iter()
            .zip(&self.weights)
            .map(|(f, w)| f * w)
            .sum::<f64>()
            + self.bias;
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_weights_and_bias_yield_half() {
        let clf = LogisticRegressionClassifier::new(vec![0.0, 0.0], 0.0);
        let result = clf.classify(&[1.0, 2.0]).unwrap();
        assert!((result - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mismatched_feature_length_is_protocol_error() {
        let clf = LogisticRegressionClassifier::new(vec![1.0], 0.0);
        assert!(matches!(clf.classify(&[1.0, 2.0]), Err(ElememError::Protocol(_))));
    }
}
