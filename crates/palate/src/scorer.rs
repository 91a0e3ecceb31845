use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CandidateVenue;
use crate::error::PalateError;
use crate::fingerprint::TasteFingerprint;
use crate::oracle::{CandidateSummary, ScoringOracle};
use crate::profile::{PeerFingerprint, Preferences};
use crate::similarity::{self, SocialProof};
use crate::store::RatingsStore;

/// Pool bound submitted to the oracle regardless of catalog size.
pub const MAX_CANDIDATE_POOL: usize = 40;

/// Verdicts below this are not worth showing.
pub const SCORE_FLOOR: u8 = 30;

/// Matches at or above this stand on their own; only candidates below it
/// get peer evidence and nudges.
pub const SOCIAL_PROOF_CEILING: u8 = 55;

/// Cap on items in one recommendation set.
pub const MAX_RECOMMENDATIONS: usize = 10;

/// Minimum similar peers who tried a venue before a nudge is synthesized.
pub const MIN_PEERS_FOR_NUDGE: usize = 2;

/// A candidate venue with its oracle verdict and any peer evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
  pub venue: CandidateVenue,
  pub match_score: u8,
  pub reasons: Vec<String>,
  pub warnings: Vec<String>,
  pub suggested_dish: Option<String>,
  pub social_proof: Option<SocialProof>,
  pub adventure_nudge: Option<String>,
}

/// Collaborators threaded through one scoring pass.
pub struct ScoringContext<'a> {
  pub oracle: &'a dyn ScoringOracle,
  pub fingerprint: &'a TasteFingerprint,
  pub preferences: &'a Preferences,
  pub peers: &'a [PeerFingerprint],
  pub ratings: &'a dyn RatingsStore,
}

/// Score a candidate pool in one oracle round trip.
///
/// Already-enjoyed venues are excluded and the pool is bounded before the
/// oracle is invoked. Verdicts below the floor are discarded, oracle
/// ordering is preserved, and the result is capped. Survivors below the
/// social-proof ceiling get peer evidence attached.
pub async fn score_candidate_pool(
  ctx: &ScoringContext<'_>,
  candidates: &[CandidateVenue],
  exclude: &HashSet<String>,
) -> Result<Vec<ScoredCandidate>, PalateError> {
  let pool: Vec<&CandidateVenue> = candidates
    .iter()
    .filter(|venue| !exclude.contains(&venue.id))
    .take(MAX_CANDIDATE_POOL)
    .collect();

  let summaries: Vec<CandidateSummary> =
    pool.iter().map(|venue| CandidateSummary::from_venue(venue)).collect();

  let verdicts = ctx
    .oracle
    .judge_pool(ctx.fingerprint, ctx.preferences, &summaries)
    .await
    .map_err(|e| PalateError::oracle(e.to_string()))?;

  let mut results = Vec::new();
  for verdict in verdicts {
    check_score(verdict.match_score)?;

    if verdict.match_score < SCORE_FLOOR {
      continue;
    }

    // Verdicts for ids the oracle invented are dropped rather than trusted.
    let Some(venue) = pool.iter().find(|venue| venue.id == verdict.id) else {
      debug!(id = %verdict.id, "discarding verdict for unknown candidate");
      continue;
    };

    if results.len() == MAX_RECOMMENDATIONS {
      break;
    }

    let scored = attach_evidence(
      ctx,
      (*venue).clone(),
      verdict.match_score,
      verdict.reasons,
      verdict.warnings,
      verdict.suggested_dish,
    )
    .await?;
    results.push(scored);
  }

  Ok(results)
}

/// Score one venue, used by the photo-identified path. No pool exclusion
/// or cap applies; the social-proof rule is the same as for pool items.
pub async fn score_single_candidate(
  ctx: &ScoringContext<'_>,
  venue: CandidateVenue,
) -> Result<ScoredCandidate, PalateError> {
  let summary = CandidateSummary::from_venue(&venue);

  let verdict = ctx
    .oracle
    .judge_single(ctx.fingerprint, &summary)
    .await
    .map_err(|e| PalateError::oracle(e.to_string()))?;

  check_score(verdict.match_score)?;

  attach_evidence(
    ctx,
    venue,
    verdict.match_score,
    verdict.reasons,
    verdict.warnings,
    verdict.suggested_dish,
  )
  .await
}

fn check_score(score: u8) -> Result<(), PalateError> {
  if score > 100 {
    return Err(PalateError::oracle(format!("match score {score} is outside 0-100")));
  }
  Ok(())
}

async fn attach_evidence(
  ctx: &ScoringContext<'_>,
  venue: CandidateVenue,
  match_score: u8,
  reasons: Vec<String>,
  warnings: Vec<String>,
  suggested_dish: Option<String>,
) -> Result<ScoredCandidate, PalateError> {
  let mut social_proof = None;
  let mut adventure_nudge = None;

  if match_score < SOCIAL_PROOF_CEILING {
    social_proof =
      similarity::social_proof(Some(&ctx.fingerprint.vector), &venue.id, ctx.peers, ctx.ratings)
        .await?;

    if let Some(proof) = &social_proof {
      if proof.similar_users_who_tried >= MIN_PEERS_FOR_NUDGE {
        adventure_nudge = Some(nudge_message(proof, &venue.name));
      }
    }
  }

  Ok(ScoredCandidate {
    venue,
    match_score,
    reasons,
    warnings,
    suggested_dish,
    social_proof,
    adventure_nudge,
  })
}

/// Persuasive peer-evidence message for borderline matches.
fn nudge_message(proof: &SocialProof, venue_name: &str) -> String {
  format!(
    "{} people with a taste like yours loved {} and gave it {:.1}/5 — might be worth a try!",
    proof.similar_users_who_tried, venue_name, proof.average_rating
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fingerprint::RawFingerprint;
  use crate::oracle::{FixtureOracle, PoolVerdict, SingleVerdict};
  use crate::store::MemoryRatings;

  fn fingerprint() -> TasteFingerprint {
    RawFingerprint {
      fingerprint_vector: Some(vec![0.85, 0.1, 0.7, 0.0, 0.0, 0.8, 0.7, 0.3]),
      ..RawFingerprint::default()
    }
    .validate()
    .unwrap()
  }

  fn venue(id: &str, name: &str) -> CandidateVenue {
    CandidateVenue {
      id: id.to_string(),
      name: name.to_string(),
      cuisines: vec!["North Indian".to_string()],
      price_level: 2,
      rating: 4.1,
      total_ratings: 87,
      review_snippets: Vec::new(),
      address: "12 Fork Street".to_string(),
      photo_url: None,
      maps_url: None,
    }
  }

  fn verdict(id: &str, score: u8) -> PoolVerdict {
    PoolVerdict {
      id: id.to_string(),
      match_score: score,
      reasons: vec!["Matches cuisine preference".to_string()],
      warnings: Vec::new(),
      suggested_dish: None,
    }
  }

  fn matching_peers(count: usize) -> Vec<PeerFingerprint> {
    (0..count)
      .map(|i| PeerFingerprint {
        user_id: format!("peer-{i}"),
        vector: vec![0.85, 0.1, 0.7, 0.0, 0.0, 0.8, 0.7, 0.3],
      })
      .collect()
  }

  #[tokio::test]
  async fn pool_results_respect_floor_cap_and_order() {
    let candidates: Vec<CandidateVenue> =
      (0..15).map(|i| venue(&format!("v{i}"), &format!("Venue {i}"))).collect();
    let verdicts: Vec<PoolVerdict> =
      (0..15).map(|i| verdict(&format!("v{i}"), 95_u8.saturating_sub((i * 6) as u8))).collect();

    let oracle = FixtureOracle::new().with_pool_verdicts(verdicts);
    let ratings = MemoryRatings::new();
    let fingerprint = fingerprint();
    let preferences = Preferences::default();
    let ctx = ScoringContext {
      oracle: &oracle,
      fingerprint: &fingerprint,
      preferences: &preferences,
      peers: &[],
      ratings: &ratings,
    };

    let results = score_candidate_pool(&ctx, &candidates, &HashSet::new()).await.unwrap();

    assert!(results.len() <= MAX_RECOMMENDATIONS);
    assert!(results.iter().all(|item| item.match_score >= SCORE_FLOOR));
    // oracle ordering preserved, no re-sort
    let scores: Vec<u8> = results.iter().map(|item| item.match_score).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);
  }

  #[tokio::test]
  async fn strong_matches_never_carry_peer_evidence() {
    let candidates = vec![venue("v1", "Spice Villa")];
    let oracle = FixtureOracle::new().with_pool_verdicts(vec![verdict("v1", 55)]);

    let ratings = MemoryRatings::new();
    ratings.upsert_rating("peer-0", "v1", 5).await.unwrap();
    ratings.upsert_rating("peer-1", "v1", 5).await.unwrap();

    let fingerprint = fingerprint();
    let preferences = Preferences::default();
    let peers = matching_peers(5);
    let ctx = ScoringContext {
      oracle: &oracle,
      fingerprint: &fingerprint,
      preferences: &preferences,
      peers: &peers,
      ratings: &ratings,
    };

    let results = score_candidate_pool(&ctx, &candidates, &HashSet::new()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].social_proof.is_none());
    assert!(results[0].adventure_nudge.is_none());
  }

  #[tokio::test]
  async fn borderline_match_with_peer_evidence_gets_a_nudge() {
    let candidates = vec![venue("v1", "Dosa Den")];
    let oracle = FixtureOracle::new().with_pool_verdicts(vec![verdict("v1", 40)]);

    let ratings = MemoryRatings::new();
    for (i, score) in [4u8, 4, 4, 4, 5].iter().enumerate() {
      ratings.upsert_rating(&format!("peer-{i}"), "v1", *score).await.unwrap();
    }

    let fingerprint = fingerprint();
    let preferences = Preferences::default();
    let peers = matching_peers(5);
    let ctx = ScoringContext {
      oracle: &oracle,
      fingerprint: &fingerprint,
      preferences: &preferences,
      peers: &peers,
      ratings: &ratings,
    };

    let results = score_candidate_pool(&ctx, &candidates, &HashSet::new()).await.unwrap();
    let item = &results[0];

    let proof = item.social_proof.as_ref().expect("borderline match carries proof");
    assert_eq!(proof.similar_users_who_tried, 5);
    assert_eq!(proof.average_rating, 4.2);

    let nudge = item.adventure_nudge.as_ref().expect("nudge");
    assert!(nudge.contains("5 people"));
    assert!(nudge.contains("Dosa Den"));
    assert!(nudge.contains("4.2/5"));
  }

  #[tokio::test]
  async fn one_peer_rating_is_not_enough_for_a_nudge() {
    let candidates = vec![venue("v1", "Dosa Den")];
    let oracle = FixtureOracle::new().with_pool_verdicts(vec![verdict("v1", 40)]);

    let ratings = MemoryRatings::new();
    ratings.upsert_rating("peer-0", "v1", 5).await.unwrap();

    let fingerprint = fingerprint();
    let preferences = Preferences::default();
    let peers = matching_peers(3);
    let ctx = ScoringContext {
      oracle: &oracle,
      fingerprint: &fingerprint,
      preferences: &preferences,
      peers: &peers,
      ratings: &ratings,
    };

    let results = score_candidate_pool(&ctx, &candidates, &HashSet::new()).await.unwrap();
    assert!(results[0].social_proof.is_some());
    assert!(results[0].adventure_nudge.is_none());
  }

  #[tokio::test]
  async fn enjoyed_and_unknown_ids_are_dropped() {
    let candidates = vec![venue("v1", "Spice Villa"), venue("v2", "Dosa Den")];
    let oracle = FixtureOracle::new().with_pool_verdicts(vec![
      verdict("v1", 90),
      verdict("v2", 80),
      verdict("v-made-up", 70),
    ]);

    let ratings = MemoryRatings::new();
    let fingerprint = fingerprint();
    let preferences = Preferences::default();
    let ctx = ScoringContext {
      oracle: &oracle,
      fingerprint: &fingerprint,
      preferences: &preferences,
      peers: &[],
      ratings: &ratings,
    };

    let exclude: HashSet<String> = ["v1".to_string()].into_iter().collect();
    let results = score_candidate_pool(&ctx, &candidates, &exclude).await.unwrap();

    let ids: Vec<&str> = results.iter().map(|item| item.venue.id.as_str()).collect();
    assert_eq!(ids, vec!["v2"]);
  }

  #[tokio::test]
  async fn out_of_contract_score_aborts_the_whole_pool() {
    let candidates = vec![venue("v1", "Spice Villa"), venue("v2", "Dosa Den")];
    let oracle =
      FixtureOracle::new().with_pool_verdicts(vec![verdict("v1", 150), verdict("v2", 80)]);

    let ratings = MemoryRatings::new();
    let fingerprint = fingerprint();
    let preferences = Preferences::default();
    let ctx = ScoringContext {
      oracle: &oracle,
      fingerprint: &fingerprint,
      preferences: &preferences,
      peers: &[],
      ratings: &ratings,
    };

    let err = score_candidate_pool(&ctx, &candidates, &HashSet::new()).await.unwrap_err();
    assert!(matches!(err, PalateError::ScoringOracle { .. }));
  }

  #[tokio::test]
  async fn pool_is_bounded_before_the_oracle_sees_it() {
    use async_trait::async_trait;

    struct CountingOracle {
      seen: std::sync::Mutex<usize>,
    }

    #[async_trait]
    impl ScoringOracle for CountingOracle {
      async fn judge_fingerprint(
        &self,
        _preferences: &Preferences,
        _enjoyed: &[crate::profile::EnjoyedVenueSummary],
      ) -> anyhow::Result<RawFingerprint> {
        unreachable!("not used in this test")
      }

      async fn judge_pool(
        &self,
        _fingerprint: &TasteFingerprint,
        _preferences: &Preferences,
        candidates: &[CandidateSummary],
      ) -> anyhow::Result<Vec<PoolVerdict>> {
        *self.seen.lock().unwrap() = candidates.len();
        Ok(Vec::new())
      }

      async fn judge_single(
        &self,
        _fingerprint: &TasteFingerprint,
        _candidate: &CandidateSummary,
      ) -> anyhow::Result<SingleVerdict> {
        unreachable!("not used in this test")
      }
    }

    let candidates: Vec<CandidateVenue> =
      (0..60).map(|i| venue(&format!("v{i}"), &format!("Venue {i}"))).collect();

    let oracle = CountingOracle { seen: std::sync::Mutex::new(0) };
    let ratings = MemoryRatings::new();
    let fingerprint = fingerprint();
    let preferences = Preferences::default();
    let ctx = ScoringContext {
      oracle: &oracle,
      fingerprint: &fingerprint,
      preferences: &preferences,
      peers: &[],
      ratings: &ratings,
    };

    score_candidate_pool(&ctx, &candidates, &HashSet::new()).await.unwrap();
    assert_eq!(*oracle.seen.lock().unwrap(), MAX_CANDIDATE_POOL);
  }

  #[tokio::test]
  async fn single_candidate_follows_the_same_nudge_rule() {
    let oracle = FixtureOracle::new().with_single_verdict(SingleVerdict {
      match_score: 42,
      reasons: vec!["Close to your comfort zone".to_string()],
      warnings: Vec::new(),
      suggested_dish: Some("Masala dosa".to_string()),
    });

    let ratings = MemoryRatings::new();
    ratings.upsert_rating("peer-0", "v9", 4).await.unwrap();
    ratings.upsert_rating("peer-1", "v9", 5).await.unwrap();

    let fingerprint = fingerprint();
    let preferences = Preferences::default();
    let peers = matching_peers(4);
    let ctx = ScoringContext {
      oracle: &oracle,
      fingerprint: &fingerprint,
      preferences: &preferences,
      peers: &peers,
      ratings: &ratings,
    };

    let scored = score_single_candidate(&ctx, venue("v9", "Chaat Corner")).await.unwrap();
    assert_eq!(scored.match_score, 42);
    assert_eq!(scored.suggested_dish.as_deref(), Some("Masala dosa"));
    assert!(scored.adventure_nudge.as_ref().is_some_and(|nudge| nudge.contains("Chaat Corner")));
  }
}
