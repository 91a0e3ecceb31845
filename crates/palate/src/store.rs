use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::engine::RecommendationSet;
use crate::profile::{PeerFingerprint, UserProfile};

/// One user's score for one venue. One row per (user, venue) pair; the
/// latest score wins and no history is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
  pub user_id: String,
  pub venue_id: String,
  pub score: u8,
}

/// Ratings collaborator boundary.
#[async_trait]
pub trait RatingsStore: Send + Sync {
  async fn upsert_rating(&self, user_id: &str, venue_id: &str, score: u8) -> Result<()>;

  /// Ratings restricted to the given venue and user sets.
  async fn find_ratings(&self, venue_ids: &[String], user_ids: &[String]) -> Result<Vec<Rating>>;
}

/// User-profile collaborator boundary.
#[async_trait]
pub trait ProfileStore: Send + Sync {
  async fn fetch(&self, user_id: &str) -> Result<Option<UserProfile>>;

  /// Replace the whole record. Callers never merge field-by-field, so a
  /// save is always an atomic snapshot swap.
  async fn save(&self, profile: UserProfile) -> Result<()>;

  /// Projection of every other user whose profile currently holds a
  /// fingerprint vector, fresh or stale.
  async fn peer_fingerprints(&self, exclude_user: &str) -> Result<Vec<PeerFingerprint>>;
}

/// Append-only log of generated recommendation sets.
#[async_trait]
pub trait RecommendationLog: Send + Sync {
  async fn append(&self, set: RecommendationSet) -> Result<()>;

  async fn history(&self, user_id: &str) -> Result<Vec<RecommendationSet>>;
}

/// In-process ratings store.
#[derive(Default)]
pub struct MemoryRatings {
  ratings: RwLock<HashMap<(String, String), u8>>,
}

impl MemoryRatings {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RatingsStore for MemoryRatings {
  async fn upsert_rating(&self, user_id: &str, venue_id: &str, score: u8) -> Result<()> {
    let mut ratings = self.ratings.write().await;
    ratings.insert((user_id.to_string(), venue_id.to_string()), score);
    Ok(())
  }

  async fn find_ratings(&self, venue_ids: &[String], user_ids: &[String]) -> Result<Vec<Rating>> {
    let ratings = self.ratings.read().await;
    Ok(
      ratings
        .iter()
        .filter(|((user_id, venue_id), _)| {
          user_ids.contains(user_id) && venue_ids.contains(venue_id)
        })
        .map(|((user_id, venue_id), score)| Rating {
          user_id: user_id.clone(),
          venue_id: venue_id.clone(),
          score: *score,
        })
        .collect(),
    )
  }
}

/// In-process profile store.
#[derive(Default)]
pub struct MemoryProfiles {
  profiles: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryProfiles {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
  async fn fetch(&self, user_id: &str) -> Result<Option<UserProfile>> {
    let profiles = self.profiles.read().await;
    Ok(profiles.get(user_id).cloned())
  }

  async fn save(&self, profile: UserProfile) -> Result<()> {
    let mut profiles = self.profiles.write().await;
    profiles.insert(profile.user_id.clone(), profile);
    Ok(())
  }

  async fn peer_fingerprints(&self, exclude_user: &str) -> Result<Vec<PeerFingerprint>> {
    let profiles = self.profiles.read().await;
    Ok(
      profiles
        .values()
        .filter(|profile| profile.user_id != exclude_user)
        .filter_map(|profile| {
          profile.fingerprint.current().map(|fingerprint| PeerFingerprint {
            user_id: profile.user_id.clone(),
            vector: fingerprint.vector.clone(),
          })
        })
        .collect(),
    )
  }
}

/// In-process recommendation history.
#[derive(Default)]
pub struct MemoryRecommendationLog {
  sets: RwLock<Vec<RecommendationSet>>,
}

impl MemoryRecommendationLog {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RecommendationLog for MemoryRecommendationLog {
  async fn append(&self, set: RecommendationSet) -> Result<()> {
    self.sets.write().await.push(set);
    Ok(())
  }

  async fn history(&self, user_id: &str) -> Result<Vec<RecommendationSet>> {
    let sets = self.sets.read().await;
    Ok(sets.iter().filter(|set| set.user_id == user_id).cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fingerprint::RawFingerprint;
  use crate::profile::FingerprintState;

  #[tokio::test]
  async fn latest_rating_wins() {
    let ratings = MemoryRatings::new();
    ratings.upsert_rating("user-1", "venue-1", 2).await.unwrap();
    ratings.upsert_rating("user-1", "venue-1", 5).await.unwrap();

    let found = ratings
      .find_ratings(&["venue-1".to_string()], &["user-1".to_string()])
      .await
      .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].score, 5);
  }

  #[tokio::test]
  async fn find_ratings_is_restricted_to_both_sets() {
    let ratings = MemoryRatings::new();
    ratings.upsert_rating("user-1", "venue-1", 4).await.unwrap();
    ratings.upsert_rating("user-2", "venue-1", 3).await.unwrap();
    ratings.upsert_rating("user-1", "venue-2", 5).await.unwrap();

    let found = ratings
      .find_ratings(&["venue-1".to_string()], &["user-1".to_string()])
      .await
      .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].venue_id, "venue-1");
    assert_eq!(found[0].user_id, "user-1");
  }

  #[tokio::test]
  async fn peer_projection_skips_target_and_vectorless_profiles() {
    let profiles = MemoryProfiles::new();

    let fingerprint = RawFingerprint {
      fingerprint_vector: Some(vec![0.5; 8]),
      ..RawFingerprint::default()
    }
    .validate()
    .unwrap();

    let mut target = UserProfile::new("target");
    target.fingerprint = FingerprintState::Fresh(fingerprint.clone());
    profiles.save(target).await.unwrap();

    let mut fresh_peer = UserProfile::new("fresh-peer");
    fresh_peer.fingerprint = FingerprintState::Fresh(fingerprint.clone());
    profiles.save(fresh_peer).await.unwrap();

    let mut stale_peer = UserProfile::new("stale-peer");
    stale_peer.fingerprint = FingerprintState::Stale(fingerprint);
    profiles.save(stale_peer).await.unwrap();

    profiles.save(UserProfile::new("absent-peer")).await.unwrap();

    let mut peers = profiles.peer_fingerprints("target").await.unwrap();
    peers.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    let ids: Vec<&str> = peers.iter().map(|peer| peer.user_id.as_str()).collect();
    assert_eq!(ids, vec!["fresh-peer", "stale-peer"]);
  }

  #[tokio::test]
  async fn save_replaces_the_whole_record() {
    let profiles = MemoryProfiles::new();

    let mut profile = UserProfile::new("user-1");
    profile.enjoyed.push("venue-1".to_string());
    profiles.save(profile.clone()).await.unwrap();

    profile.enjoyed.clear();
    profiles.save(profile).await.unwrap();

    let loaded = profiles.fetch("user-1").await.unwrap().expect("profile");
    assert!(loaded.enjoyed.is_empty());
  }
}
