use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::builder;
use crate::catalog::VenueCatalog;
use crate::error::{PalateError, Result};
use crate::fingerprint::TasteFingerprint;
use crate::oracle::ScoringOracle;
use crate::profile::{EnjoyedVenueSummary, FingerprintState, Preferences, UserProfile};
use crate::scorer::{self, ScoredCandidate, ScoringContext, MAX_CANDIDATE_POOL};
use crate::store::{ProfileStore, RatingsStore, RecommendationLog};

/// One persisted generation run. Sets are appended, never overwritten, so
/// past generations stay queryable as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSet {
  pub id: String,
  pub user_id: String,
  pub generated_at: DateTime<Utc>,
  pub items: Vec<ScoredCandidate>,
}

/// Facade over the fingerprint, scoring, and assembly pipeline.
///
/// Within one call the stages run strictly in order: fingerprint build (if
/// needed), then candidate scoring, then persistence. Two users' pipelines
/// share no mutable state; the per-user fingerprint is the only contended
/// record and is always replaced wholesale.
pub struct RecommendationEngine {
  oracle: Arc<dyn ScoringOracle>,
  catalog: Arc<dyn VenueCatalog>,
  profiles: Arc<dyn ProfileStore>,
  ratings: Arc<dyn RatingsStore>,
  recommendations: Arc<dyn RecommendationLog>,
}

impl RecommendationEngine {
  pub fn new(
    oracle: Arc<dyn ScoringOracle>,
    catalog: Arc<dyn VenueCatalog>,
    profiles: Arc<dyn ProfileStore>,
    ratings: Arc<dyn RatingsStore>,
    recommendations: Arc<dyn RecommendationLog>,
  ) -> Self {
    Self { oracle, catalog, profiles, ratings, recommendations }
  }

  /// Rebuild the user's fingerprint unconditionally and persist it.
  pub async fn build_or_refresh_fingerprint(&self, user_id: &str) -> Result<TasteFingerprint> {
    let mut profile = self.load_profile(user_id).await?;
    self.rebuild_fingerprint(&mut profile).await
  }

  /// Generate, persist, and return a fresh recommendation set.
  pub async fn generate_recommendations(&self, user_id: &str) -> Result<RecommendationSet> {
    let mut profile = self.load_profile(user_id).await?;
    let fingerprint = self.ensure_fresh_fingerprint(&mut profile).await?;

    let exclude: HashSet<String> = profile.enjoyed.iter().cloned().collect();
    let candidates = self.catalog.find_candidates(&exclude, MAX_CANDIDATE_POOL).await?;

    // One peer-population fetch serves every borderline candidate below.
    let peers = self.profiles.peer_fingerprints(user_id).await?;

    let ctx = ScoringContext {
      oracle: self.oracle.as_ref(),
      fingerprint: &fingerprint,
      preferences: &profile.preferences,
      peers: &peers,
      ratings: self.ratings.as_ref(),
    };

    let items = scorer::score_candidate_pool(&ctx, &candidates, &exclude).await?;

    let set = RecommendationSet {
      id: Uuid::new_v4().to_string(),
      user_id: user_id.to_string(),
      generated_at: Utc::now(),
      items,
    };

    self.recommendations.append(set.clone()).await?;
    info!(user = user_id, items = set.items.len(), "recommendation set persisted");

    Ok(set)
  }

  /// Score one catalog venue identified by name, the photo-extraction path.
  pub async fn score_venue_from_photo_extraction(
    &self,
    user_id: &str,
    extracted_name: &str,
  ) -> Result<ScoredCandidate> {
    let venue = self
      .catalog
      .search(extracted_name)
      .await?
      .ok_or_else(|| PalateError::not_found(format!("venue matching \"{extracted_name}\"")))?;

    let mut profile = self.load_profile(user_id).await?;
    let fingerprint = self.ensure_fresh_fingerprint(&mut profile).await?;
    let peers = self.profiles.peer_fingerprints(user_id).await?;

    let ctx = ScoringContext {
      oracle: self.oracle.as_ref(),
      fingerprint: &fingerprint,
      preferences: &profile.preferences,
      peers: &peers,
      ratings: self.ratings.as_ref(),
    };

    scorer::score_single_candidate(&ctx, venue).await
  }

  /// Mark the fingerprint stale without rebuilding. Called whenever the
  /// enjoyed-venue set changes out of band; the rebuild is deferred to the
  /// next scoring operation.
  pub async fn invalidate_fingerprint(&self, user_id: &str) -> Result<()> {
    let mut profile = self.load_profile(user_id).await?;
    profile.fingerprint.invalidate();
    self.profiles.save(profile).await?;
    Ok(())
  }

  /// Replace the user's preferences, creating the profile on first save.
  /// The fingerprint goes stale synchronously; rebuilding waits for use.
  pub async fn save_preferences(&self, user_id: &str, preferences: Preferences) -> Result<()> {
    if preferences.cuisines.is_empty() || preferences.meal_occasion.is_empty() {
      return Err(PalateError::validation("cuisines and meal occasion are required"));
    }
    if !(1..=5).contains(&preferences.spice_level) {
      return Err(PalateError::validation("spice level must be between 1 and 5"));
    }

    let mut profile = match self.profiles.fetch(user_id).await? {
      Some(profile) => profile,
      None => UserProfile::new(user_id),
    };

    profile.preferences = preferences;
    profile.fingerprint.invalidate();
    self.profiles.save(profile).await?;
    Ok(())
  }

  /// Add venues to the enjoyed set, skipping duplicates. Returns how many
  /// were actually added.
  pub async fn add_enjoyed_venues(&self, user_id: &str, venue_ids: &[String]) -> Result<usize> {
    if venue_ids.is_empty() {
      return Err(PalateError::validation("at least one venue is required"));
    }

    let mut profile = self.load_profile(user_id).await?;
    let mut added = 0;
    for venue_id in venue_ids {
      if !profile.enjoyed.contains(venue_id) {
        profile.enjoyed.push(venue_id.clone());
        added += 1;
      }
    }

    profile.fingerprint.invalidate();
    self.profiles.save(profile).await?;
    Ok(added)
  }

  /// Remove venues from the enjoyed set.
  pub async fn remove_enjoyed_venues(&self, user_id: &str, venue_ids: &[String]) -> Result<()> {
    if venue_ids.is_empty() {
      return Err(PalateError::validation("at least one venue is required"));
    }

    let mut profile = self.load_profile(user_id).await?;
    profile.enjoyed.retain(|venue_id| !venue_ids.contains(venue_id));
    profile.fingerprint.invalidate();
    self.profiles.save(profile).await?;
    Ok(())
  }

  /// Upsert the user's rating for a venue. Latest score wins.
  pub async fn rate_venue(&self, user_id: &str, venue_id: &str, score: u8) -> Result<()> {
    if !(1..=5).contains(&score) {
      return Err(PalateError::validation("score must be between 1 and 5"));
    }
    if self.catalog.find_by_id(venue_id).await?.is_none() {
      return Err(PalateError::not_found(format!("venue {venue_id}")));
    }

    self.ratings.upsert_rating(user_id, venue_id, score).await?;
    Ok(())
  }

  /// All recommendation sets ever generated for the user.
  pub async fn recommendation_history(&self, user_id: &str) -> Result<Vec<RecommendationSet>> {
    Ok(self.recommendations.history(user_id).await?)
  }

  async fn load_profile(&self, user_id: &str) -> Result<UserProfile> {
    let profile = self.profiles.fetch(user_id).await?;
    profile.ok_or_else(|| PalateError::not_found(format!("user {user_id}")))
  }

  /// Rebuild unconditionally, then swap the whole fingerprint state in one
  /// profile save. A failed build leaves the prior record untouched.
  async fn rebuild_fingerprint(&self, profile: &mut UserProfile) -> Result<TasteFingerprint> {
    let summaries = self.enjoyed_summaries(profile).await?;
    let fingerprint =
      builder::build_fingerprint(self.oracle.as_ref(), &profile.preferences, &summaries).await?;

    profile.fingerprint = FingerprintState::Fresh(fingerprint.clone());
    self.profiles.save(profile.clone()).await?;
    info!(user = %profile.user_id, "fingerprint rebuilt");

    Ok(fingerprint)
  }

  /// Lazy-rebuild trigger: reuse a fresh fingerprint, rebuild when absent
  /// or stale.
  async fn ensure_fresh_fingerprint(&self, profile: &mut UserProfile) -> Result<TasteFingerprint> {
    if !profile.fingerprint.needs_rebuild() {
      if let Some(fingerprint) = profile.fingerprint.current() {
        return Ok(fingerprint.clone());
      }
    }

    self.rebuild_fingerprint(profile).await
  }

  async fn enjoyed_summaries(&self, profile: &UserProfile) -> Result<Vec<EnjoyedVenueSummary>> {
    let mut summaries = Vec::new();
    for venue_id in &profile.enjoyed {
      match self.catalog.find_by_id(venue_id).await? {
        Some(venue) => summaries.push(builder::summarize_enjoyed(&venue)),
        None => warn!(venue = venue_id.as_str(), "enjoyed venue missing from catalog"),
      }
    }
    Ok(summaries)
  }
}
