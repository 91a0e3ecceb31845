use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::profile::PeerFingerprint;
use crate::store::RatingsStore;

/// Peers below this similarity are not persuasive evidence.
pub const SIMILARITY_THRESHOLD: f32 = 0.6;

/// Bound on the peer set consulted for ratings.
pub const MAX_SIMILAR_PEERS: usize = 30;

/// Peer-rating evidence attached to borderline recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialProof {
  pub similar_users_who_tried: usize,
  pub average_rating: f32,
}

/// Calculate cosine similarity between two taste vectors.
///
/// Returns exactly 0.0 on length mismatch or when either norm is zero;
/// similarity against an unset vector is "no similarity", not an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    return 0.0;
  }

  let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
  let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if magnitude_a == 0.0 || magnitude_b == 0.0 {
    0.0
  } else {
    dot_product / (magnitude_a * magnitude_b)
  }
}

/// Similarity-gated peer rating evidence for one venue.
///
/// Returns `Ok(None)` when the target has no vector, no peer clears the
/// similarity threshold, or no consulted peer has rated the venue. Absence
/// of evidence is a valid outcome, not a fault.
pub async fn social_proof(
  target_vector: Option<&[f32]>,
  venue_id: &str,
  peers: &[PeerFingerprint],
  ratings: &dyn RatingsStore,
) -> Result<Option<SocialProof>> {
  let Some(target) = target_vector else {
    return Ok(None);
  };

  let mut scored: Vec<(&PeerFingerprint, f32)> = peers
    .iter()
    .map(|peer| (peer, cosine_similarity(target, &peer.vector)))
    .filter(|(_, similarity)| *similarity > SIMILARITY_THRESHOLD)
    .collect();

  scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
  scored.truncate(MAX_SIMILAR_PEERS);

  if scored.is_empty() {
    return Ok(None);
  }

  let peer_ids: Vec<String> = scored.iter().map(|(peer, _)| peer.user_id.clone()).collect();
  let venue_ratings = ratings.find_ratings(&[venue_id.to_string()], &peer_ids).await?;

  if venue_ratings.is_empty() {
    return Ok(None);
  }

  let total: u32 = venue_ratings.iter().map(|rating| u32::from(rating.score)).sum();
  let average = total as f32 / venue_ratings.len() as f32;

  Ok(Some(SocialProof {
    similar_users_who_tried: venue_ratings.len(),
    average_rating: (average * 10.0).round() / 10.0,
  }))
}
