//! Learned index models: a piecewise-linear function from key to a predicted
//! global entry position, plus a bounded error the caller must search around
//! to recover the exact position.
//!
//! There is no trainer in this crate — building the segments from a sorted
//! key set is a batch, write-path concern, out of scope per spec non-goals.
//! What the read path needs is the [`LearnedModel`] trait: given a key,
//! produce a predicted position and a guaranteed error bound, or report that
//! the model is untrained.
use crate::error::{Error, Result};

/// A predicted position for a key, with the maximum number of entries the
/// true position could be away from the prediction in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub position: u64,
    pub error_bound: u64,
}

impl Prediction {
    /// The inclusive `[lo, hi]` window the caller must search, clamped to
    /// `[0, max_position]`.
    #[must_use]
    pub fn search_window(self, max_position: u64) -> (u64, u64) {
        let lo = self.position.saturating_sub(self.error_bound);
        let hi = self.position.saturating_add(self.error_bound).min(max_position);
        (lo, hi)
    }
}

pub trait LearnedModel {
    /// Predicts the global entry position of `key`, or `Err(Error::Invalid)`
    /// if this model has no trained segments to consult.
    fn predict(&self, key: &[u8]) -> Result<Prediction>;

    /// Whether this model has completed training and can be consulted at
    /// all. Callers check this before attempting the learned path so that
    /// an untrained model degrades to the baseline path instead of
    /// surfacing `Error::Invalid` from deep inside a read.
    #[must_use]
    fn learned(&self) -> bool;
}

/// One linear segment: for numeric keys in `[key_floor, next segment's
/// key_floor)`, `position ≈ slope * key + intercept`.
#[derive(Debug, Clone, Copy)]
struct Segment {
    key_floor: u64,
    slope: f64,
    intercept: f64,
}

/// A piecewise-linear learned index over keys interpreted as big-endian
/// numeric values.
///
/// `max_error` is the error bound promised for every segment: the trainer
/// that produced these segments (out of scope here) is responsible for
/// ensuring no training-set key predicts further than `max_error` entries
/// from its true position.
#[derive(Debug, Clone, Default)]
pub struct PiecewiseLinearModel {
    segments: Vec<Segment>,
    max_error: u64,
    num_entries: u64,
}

impl PiecewiseLinearModel {
    /// `segments` must be sorted ascending by `key_floor` and is assumed to
    /// already satisfy `max_error` for every key in its training set;
    /// this constructor does not re-validate that guarantee.
    #[must_use]
    pub fn new(segments: Vec<(u64, f64, f64)>, max_error: u64, num_entries: u64) -> Self {
        Self {
            segments: segments
                .into_iter()
                .map(|(key_floor, slope, intercept)| Segment { key_floor, slope, intercept })
                .collect(),
            max_error,
            num_entries,
        }
    }

    #[must_use]
    pub fn is_trained(&self) -> bool {
        !self.segments.is_empty()
    }

    fn segment_for(&self, numeric_key: u64) -> &Segment {
        match self.segments.binary_search_by_key(&numeric_key, |s| s.key_floor) {
            Ok(i) => &self.segments[i],
            Err(0) => &self.segments[0],
            Err(i) => &self.segments[i - 1],
        }
    }
}

impl LearnedModel for PiecewiseLinearModel {
    fn predict(&self, key: &[u8]) -> Result<Prediction> {
        if !self.is_trained() {
            return Err(Error::Invalid("model has no trained segments".to_string()));
        }

        let numeric_key = numeric_key_prefix(key);
        let segment = self.segment_for(numeric_key);
        let raw = segment.slope.mul_add(numeric_key as f64, segment.intercept);
        let position = raw.max(0.0).round() as u64;
        let position = position.min(self.num_entries.saturating_sub(1));

        Ok(Prediction { position, error_bound: self.max_error })
    }

    fn learned(&self) -> bool {
        self.is_trained()
    }
}

/// Interprets the first 8 bytes of `key` (zero-padded if shorter) as a
/// big-endian integer, the numeric representation the model was trained
/// against.
#[must_use]
pub fn numeric_key_prefix(key: &[u8]) -> u64 {
    let mut buf = [0_u8; 8];
    let n = key.len().min(8);
    buf[..n].copy_from_slice(&key[..n]);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
pub mod test_doubles {
    //! Deliberately-mistrained models for exercising the local error
    //! correction and underflow-flag paths (scenario coverage, §8).
    use super::{Error, LearnedModel, Prediction, Result};

    /// A model that always predicts `position` with a zero error bound,
    /// for exercising the "prediction is exactly right" fast path.
    #[derive(Debug, Clone, Copy)]
    pub struct ExactModel {
        pub position: u64,
    }

    impl LearnedModel for ExactModel {
        fn predict(&self, _key: &[u8]) -> Result<Prediction> {
            Ok(Prediction { position: self.position, error_bound: 0 })
        }

        fn learned(&self) -> bool {
            true
        }
    }

    /// Wraps another model and shifts every prediction right by `drift`
    /// entries without widening the error bound, simulating an undertrained
    /// segment whose promised bound doesn't actually hold.
    #[derive(Debug, Clone, Copy)]
    pub struct DriftingModel<M> {
        pub inner: M,
        pub drift: i64,
    }

    impl<M: LearnedModel> LearnedModel for DriftingModel<M> {
        fn predict(&self, key: &[u8]) -> Result<Prediction> {
            let mut prediction = self.inner.predict(key)?;
            prediction.position = prediction.position.saturating_add_signed(self.drift);
            Ok(prediction)
        }

        fn learned(&self) -> bool {
            self.inner.learned()
        }
    }

    /// A model reporting itself untrained, for the `Error::Invalid` path.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UntrainedModel;

    impl LearnedModel for UntrainedModel {
        fn predict(&self, _key: &[u8]) -> Result<Prediction> {
            Err(Error::Invalid("model has no trained segments".to_string()))
        }

        fn learned(&self) -> bool {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment_predicts_linear_position() {
        let model = PiecewiseLinearModel::new(vec![(0, 0.1, 0.0)], 2, 1000);
        let key = 100_u64.to_be_bytes();
        let prediction = model.predict(&key).unwrap();
        assert_eq!(prediction.position, 10);
        assert_eq!(prediction.error_bound, 2);
    }

    #[test]
    fn untrained_model_is_invalid() {
        let model = PiecewiseLinearModel::default();
        assert!(matches!(model.predict(b"anything"), Err(Error::Invalid(_))));
    }

    #[test]
    fn prediction_clamps_to_last_entry() {
        let model = PiecewiseLinearModel::new(vec![(0, 10.0, 0.0)], 0, 5);
        let key = 100_u64.to_be_bytes();
        let prediction = model.predict(&key).unwrap();
        assert_eq!(prediction.position, 4);
    }

    #[test]
    fn search_window_clamps_at_zero_and_max() {
        let prediction = Prediction { position: 1, error_bound: 5 };
        assert_eq!(prediction.search_window(100), (0, 6));
    }
}
