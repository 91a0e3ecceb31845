use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PalateError;

/// Number of axes in the fingerprint vector. Positions are fixed:
/// [north_indian, south_indian, street_food, italian, chinese,
/// spice_tolerance, price_sensitivity, adventure], each in [0, 1].
pub const VECTOR_DIMENSIONS: usize = 8;

/// Cuisine affinities at or below this are dropped at construction time,
/// keeping the persisted map sparse and consistent with what the oracle is
/// instructed to emit.
pub const AFFINITY_FLOOR: f32 = 0.2;

/// A user's validated numeric taste profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasteFingerprint {
  pub cuisine_affinity: HashMap<String, f32>,
  pub spice_comfort: f32,
  pub price_comfort: f32,
  pub adventure_score: f32,
  pub ambiance_scores: HashMap<String, f32>,
  pub key_signals: Vec<String>,
  #[serde(rename = "fingerprintVector")]
  pub vector: Vec<f32>,
}

/// Unvalidated fingerprint shape as the scoring oracle emits it. Nothing in
/// here is trusted until `validate` has run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFingerprint {
  #[serde(default)]
  pub cuisine_affinity: HashMap<String, f32>,
  #[serde(default)]
  pub spice_comfort: f32,
  #[serde(default)]
  pub price_comfort: f32,
  #[serde(default)]
  pub adventure_score: f32,
  #[serde(default)]
  pub ambiance_scores: HashMap<String, f32>,
  #[serde(default)]
  pub key_signals: Vec<String>,
  pub fingerprint_vector: Option<Vec<f32>>,
}

impl RawFingerprint {
  /// Validate the raw shape into a usable fingerprint.
  ///
  /// The vector must be present, exactly `VECTOR_DIMENSIONS` long, and hold
  /// finite values in [0, 1]. Downstream similarity math assumes a
  /// well-formed unit-interval vector space, so nothing is clamped or
  /// coerced here; invalid input is a hard failure.
  pub fn validate(self) -> Result<TasteFingerprint, PalateError> {
    let vector = self
      .fingerprint_vector
      .ok_or_else(|| PalateError::validation("fingerprint vector is missing"))?;

    if vector.len() != VECTOR_DIMENSIONS {
      return Err(PalateError::validation(format!(
        "fingerprint vector must have exactly {VECTOR_DIMENSIONS} elements, got {}",
        vector.len()
      )));
    }

    if let Some(value) = vector.iter().find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0) {
      return Err(PalateError::validation(format!(
        "fingerprint vector element {value} is outside [0, 1]"
      )));
    }

    let cuisine_affinity = self
      .cuisine_affinity
      .into_iter()
      .filter(|(_, affinity)| *affinity > AFFINITY_FLOOR)
      .collect();

    Ok(TasteFingerprint {
      cuisine_affinity,
      spice_comfort: self.spice_comfort,
      price_comfort: self.price_comfort,
      adventure_score: self.adventure_score,
      ambiance_scores: self.ambiance_scores,
      key_signals: self.key_signals,
      vector,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raw_with_vector(vector: Vec<f32>) -> RawFingerprint {
    RawFingerprint { fingerprint_vector: Some(vector), ..RawFingerprint::default() }
  }

  #[test]
  fn valid_vector_passes() {
    let raw = raw_with_vector(vec![0.85, 0.1, 0.7, 0.0, 0.0, 0.8, 0.7, 0.3]);
    let fingerprint = raw.validate().expect("valid fingerprint");
    assert_eq!(fingerprint.vector.len(), VECTOR_DIMENSIONS);
  }

  #[test]
  fn missing_vector_is_rejected() {
    let raw = RawFingerprint::default();
    let err = raw.validate().unwrap_err();
    assert!(matches!(err, PalateError::Validation { .. }));
  }

  #[test]
  fn wrong_length_is_rejected() {
    let err = raw_with_vector(vec![0.5; 6]).validate().unwrap_err();
    assert!(err.to_string().contains("exactly 8"));

    let err = raw_with_vector(vec![0.5; 9]).validate().unwrap_err();
    assert!(matches!(err, PalateError::Validation { .. }));
  }

  #[test]
  fn out_of_range_element_is_rejected() {
    assert!(raw_with_vector(vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 1.2]).validate().is_err());
    assert!(raw_with_vector(vec![-0.1, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]).validate().is_err());
    assert!(
      raw_with_vector(vec![f32::NAN, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]).validate().is_err()
    );
  }

  #[test]
  fn boundary_elements_are_accepted() {
    let raw = raw_with_vector(vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    assert!(raw.validate().is_ok());
  }

  #[test]
  fn weak_affinities_are_dropped_at_construction() {
    let mut raw = raw_with_vector(vec![0.5; 8]);
    raw.cuisine_affinity.insert("North Indian".to_string(), 0.85);
    raw.cuisine_affinity.insert("Chinese".to_string(), 0.2);
    raw.cuisine_affinity.insert("Thai".to_string(), 0.05);

    let fingerprint = raw.validate().expect("valid fingerprint");
    assert_eq!(fingerprint.cuisine_affinity.len(), 1);
    assert!(fingerprint.cuisine_affinity.values().all(|affinity| *affinity > AFFINITY_FLOOR));
  }
}
