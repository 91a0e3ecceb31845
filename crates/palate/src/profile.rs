use serde::{Deserialize, Serialize};

use crate::fingerprint::TasteFingerprint;

/// Price band a user is comfortable with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRange {
  Budget,
  #[default]
  Mid,
  Upscale,
}

/// Explicit dining preferences. Owned by the user and mutated only through
/// the preference operations on the engine, never inferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
  pub cuisines: Vec<String>,
  pub spice_level: u8,
  pub price_range: PriceRange,
  pub diet_restrictions: Vec<String>,
  pub ambiance: Vec<String>,
  pub meal_occasion: String,
}

impl Default for Preferences {
  fn default() -> Self {
    Self {
      cuisines: Vec::new(),
      spice_level: 3,
      price_range: PriceRange::Mid,
      diet_restrictions: Vec::new(),
      ambiance: Vec::new(),
      meal_occasion: "lunch".to_string(),
    }
  }
}

/// Read-only projection of an enjoyed venue handed to the fingerprint
/// builder. Never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnjoyedVenueSummary {
  pub name: String,
  pub cuisines: Vec<String>,
  pub price_level: u8,
  pub rating: f32,
  pub review_snippets: Vec<String>,
}

/// Lifecycle of a user's fingerprint.
///
/// `Absent` and `Stale` become `Fresh` only through a successful build; any
/// preference or enjoyed-venue mutation drops `Fresh` back to `Stale`. A
/// stale fingerprint keeps its last vector, which leaves it usable as peer
/// evidence while a rebuild is pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "fingerprint", rename_all = "lowercase")]
pub enum FingerprintState {
  #[default]
  Absent,
  Stale(TasteFingerprint),
  Fresh(TasteFingerprint),
}

impl FingerprintState {
  /// The vector-bearing fingerprint regardless of freshness.
  pub fn current(&self) -> Option<&TasteFingerprint> {
    match self {
      Self::Absent => None,
      Self::Stale(fingerprint) | Self::Fresh(fingerprint) => Some(fingerprint),
    }
  }

  /// True when the next scoring operation must rebuild first.
  pub fn needs_rebuild(&self) -> bool {
    !matches!(self, Self::Fresh(_))
  }

  /// Drop a fresh fingerprint back to stale. Absent stays absent.
  pub fn invalidate(&mut self) {
    let prior = std::mem::take(self);
    *self = match prior {
      Self::Fresh(fingerprint) => Self::Stale(fingerprint),
      other => other,
    };
  }
}

/// Per-user record threaded through the pipeline. Saved as a whole-record
/// swap, never merged field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub user_id: String,
  pub preferences: Preferences,
  pub enjoyed: Vec<String>,
  pub fingerprint: FingerprintState,
}

impl UserProfile {
  pub fn new(user_id: impl Into<String>) -> Self {
    Self {
      user_id: user_id.into(),
      preferences: Preferences::default(),
      enjoyed: Vec::new(),
      fingerprint: FingerprintState::Absent,
    }
  }
}

/// Projection of another user's fingerprint, used only for similarity
/// comparison.
#[derive(Debug, Clone)]
pub struct PeerFingerprint {
  pub user_id: String,
  pub vector: Vec<f32>,
}
