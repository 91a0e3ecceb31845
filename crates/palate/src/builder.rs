use tracing::debug;

use crate::catalog::CandidateVenue;
use crate::error::PalateError;
use crate::fingerprint::TasteFingerprint;
use crate::oracle::ScoringOracle;
use crate::profile::{EnjoyedVenueSummary, Preferences};

/// Cap on review snippets per enjoyed venue in the builder payload.
pub const MAX_BUILDER_SNIPPETS: usize = 2;

/// Project an enjoyed catalog venue into the builder's input shape.
pub fn summarize_enjoyed(venue: &CandidateVenue) -> EnjoyedVenueSummary {
  EnjoyedVenueSummary {
    name: venue.name.clone(),
    cuisines: venue.cuisines.clone(),
    price_level: venue.price_level,
    rating: venue.rating,
    review_snippets: venue.review_snippets.iter().take(MAX_BUILDER_SNIPPETS).cloned().collect(),
  }
}

/// Build a fingerprint from stated preferences and enjoyed-venue history.
///
/// The semantic judgment is delegated to the oracle; its response is run
/// through fingerprint validation before acceptance, so an invalid response
/// never replaces a prior fingerprint. Preferences alone suffice as input;
/// an empty enjoyed list is passed through as-is.
pub async fn build_fingerprint(
  oracle: &dyn ScoringOracle,
  preferences: &Preferences,
  enjoyed: &[EnjoyedVenueSummary],
) -> Result<TasteFingerprint, PalateError> {
  if preferences.cuisines.is_empty() && enjoyed.is_empty() {
    return Err(PalateError::InsufficientData);
  }

  let raw = oracle
    .judge_fingerprint(preferences, enjoyed)
    .await
    .map_err(|e| PalateError::oracle(e.to_string()))?;

  let fingerprint = raw.validate()?;
  debug!(signals = fingerprint.key_signals.len(), "fingerprint built");

  Ok(fingerprint)
}
