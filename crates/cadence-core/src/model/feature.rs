use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::FeatureError;
use crate::model::ids::TrackId;

/// Version of the feature schema below. Bump when the field list changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Smallest L2 norm a vector may have and still define a direction.
pub const MIN_MAGNITUDE: f64 = 1e-12;

/// L2 norm, accumulated in `f64` so neither tiny nor huge components
/// underflow or overflow.
#[must_use]
pub fn magnitude(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}

/// Number of dimensions in a schema-conforming feature vector.
pub const FEATURE_DIMENSION: usize = FEATURE_FIELDS.len();

/// Acoustic descriptor names in vector order.
///
/// Summary statistics over the whole track: spectral shape, loudness,
/// tempo, timbre (20 MFCC bands as mean/variance pairs).
pub const FEATURE_FIELDS: [&str; 60] = [
    "chroma_mean",
    "chroma_var",
    "rms_mean",
    "rms_var",
    "spectral_centroids_mean",
    "spectral_centroids_var",
    "spectral_bandwidth_mean",
    "spectral_bandwidth_var",
    "spectral_rolloff_mean",
    "spectral_rolloff_var",
    "spectral_contrast_mean",
    "spectral_contrast_var",
    "zero_crossing_rate_mean",
    "zero_crossing_rate_var",
    "tempo",
    "spectral_flatness_mean",
    "spectral_flatness_var",
    "harmonic_percussive_ratio",
    "mel_entropy_mean",
    "mel_entropy_var",
    "mfcc_1_mean",
    "mfcc_1_var",
    "mfcc_2_mean",
    "mfcc_2_var",
    "mfcc_3_mean",
    "mfcc_3_var",
    "mfcc_4_mean",
    "mfcc_4_var",
    "mfcc_5_mean",
    "mfcc_5_var",
    "mfcc_6_mean",
    "mfcc_6_var",
    "mfcc_7_mean",
    "mfcc_7_var",
    "mfcc_8_mean",
    "mfcc_8_var",
    "mfcc_9_mean",
    "mfcc_9_var",
    "mfcc_10_mean",
    "mfcc_10_var",
    "mfcc_11_mean",
    "mfcc_11_var",
    "mfcc_12_mean",
    "mfcc_12_var",
    "mfcc_13_mean",
    "mfcc_13_var",
    "mfcc_14_mean",
    "mfcc_14_var",
    "mfcc_15_mean",
    "mfcc_15_var",
    "mfcc_16_mean",
    "mfcc_16_var",
    "mfcc_17_mean",
    "mfcc_17_var",
    "mfcc_18_mean",
    "mfcc_18_var",
    "mfcc_19_mean",
    "mfcc_19_var",
    "mfcc_20_mean",
    "mfcc_20_var",
];

/// A track's acoustic descriptor.
///
/// Values are stored raw; normalization happens when the vector enters an
/// index or a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub track_id: TrackId,
    pub values: Vec<f32>,
}

impl FeatureVector {
    #[must_use]
    pub fn new(track_id: impl Into<TrackId>, values: Vec<f32>) -> Self {
        Self {
            track_id: track_id.into(),
            values,
        }
    }

    /// Build a schema-ordered vector from named descriptors.
    ///
    /// Every name in [`FEATURE_FIELDS`] must be present. Extra names are
    /// ignored.
    pub fn from_named(
        track_id: impl Into<TrackId>,
        fields: &BTreeMap<String, f64>,
    ) -> Result<Self, FeatureError> {
        let track_id = track_id.into();
        let mut values = Vec::with_capacity(FEATURE_DIMENSION);
        for field in FEATURE_FIELDS {
            let value = fields.get(field).ok_or_else(|| FeatureError::MissingField {
                track_id: track_id.to_string(),
                field,
            })?;
            values.push(*value as f32);
        }

        for name in fields.keys() {
            if !FEATURE_FIELDS.contains(&name.as_str()) {
                log::debug!("Ignoring unknown feature field {} for {}", name, track_id);
            }
        }

        Ok(Self { track_id, values })
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Check length, finiteness and magnitude against an expected dimension.
    ///
    /// A vector below [`MIN_MAGNITUDE`] has no usable direction and is
    /// rejected as `ZeroMagnitude`.
    pub fn validate(&self, expected: usize) -> Result<(), FeatureError> {
        if self.values.len() != expected {
            return Err(FeatureError::DimensionMismatch {
                track_id: self.track_id.to_string(),
                expected,
                found: self.values.len(),
            });
        }

        if let Some(index) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(FeatureError::NonFinite {
                track_id: self.track_id.to_string(),
                index,
            });
        }

        if magnitude(&self.values) < MIN_MAGNITUDE {
            return Err(FeatureError::ZeroMagnitude {
                track_id: self.track_id.to_string(),
            });
        }

        Ok(())
    }

    /// Validate against the pinned schema dimension.
    pub fn validate_schema(&self) -> Result<(), FeatureError> {
        self.validate(FEATURE_DIMENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_fields() -> BTreeMap<String, f64> {
        FEATURE_FIELDS
            .iter()
            .enumerate()
            .map(|(i, name)| ((*name).to_string(), i as f64 + 1.0))
            .collect()
    }

    #[test]
    fn test_schema_dimension_is_pinned() {
        assert_eq!(FEATURE_DIMENSION, 60);
        assert_eq!(FEATURE_FIELDS[14], "tempo");
        assert_eq!(FEATURE_FIELDS[59], "mfcc_20_var");
    }

    #[test]
    fn test_from_named_uses_schema_order() {
        let vector = FeatureVector::from_named("abc", &named_fields()).unwrap();
        assert_eq!(vector.dimension(), FEATURE_DIMENSION);
        assert_eq!(vector.values[0], 1.0);
        assert_eq!(vector.values[59], 60.0);
        assert!(vector.validate_schema().is_ok());
    }

    #[test]
    fn test_from_named_missing_field() {
        let mut fields = named_fields();
        fields.remove("tempo");
        fields.insert("loudness".to_string(), 3.0);

        let err = FeatureVector::from_named("abc", &fields).unwrap_err();
        assert_eq!(
            err,
            FeatureError::MissingField {
                track_id: "abc".to_string(),
                field: "tempo"
            }
        );
    }

    #[test]
    fn test_validate_rejects_wrong_dimension() {
        let vector = FeatureVector::new("short", vec![1.0; 55]);
        let err = vector.validate_schema().unwrap_err();
        assert!(matches!(
            err,
            FeatureError::DimensionMismatch { expected: 60, found: 55, .. }
        ));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let mut values = vec![0.5; 4];
        values[2] = f32::NAN;
        let err = FeatureVector::new("nan", values).validate(4).unwrap_err();
        assert!(matches!(err, FeatureError::NonFinite { index: 2, .. }));

        let inf = FeatureVector::new("inf", vec![f32::INFINITY, 1.0]);
        assert!(inf.validate(2).is_err());
    }

    #[test]
    fn test_validate_rejects_vanishing_magnitude() {
        let tiny = FeatureVector::new("whisper", vec![1e-14; FEATURE_DIMENSION]);
        assert!(matches!(
            tiny.validate_schema(),
            Err(FeatureError::ZeroMagnitude { .. })
        ));

        let faint = FeatureVector::new("faint", vec![1e-6; FEATURE_DIMENSION]);
        assert!(faint.validate_schema().is_ok());
    }

    #[test]
    fn test_magnitude_survives_extreme_components() {
        assert!((magnitude(&[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert!(magnitude(&[f32::MAX, f32::MAX]).is_finite());
        assert!(magnitude(&[1e-30, 0.0]) > 0.0);
    }

    #[test]
    fn test_validate_rejects_zero_vector() {
        let err = FeatureVector::new("silent", vec![0.0; 3]).validate(3).unwrap_err();
        assert_eq!(err.track_id(), "silent");
        assert!(matches!(err, FeatureError::ZeroMagnitude { .. }));
    }
}
