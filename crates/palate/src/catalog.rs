use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Catalog venue. Read-only from the engine's perspective; the catalog
/// refresh job owns mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateVenue {
  pub id: String,
  pub name: String,
  pub cuisines: Vec<String>,
  pub price_level: u8,
  pub rating: f32,
  pub total_ratings: u32,
  pub review_snippets: Vec<String>,
  pub address: String,
  pub photo_url: Option<String>,
  pub maps_url: Option<String>,
}

/// Place-catalog collaborator boundary.
#[async_trait]
pub trait VenueCatalog: Send + Sync {
  /// Candidate pool for recommendation generation, bounded by `limit`.
  async fn find_candidates(
    &self,
    exclude: &HashSet<String>,
    limit: usize,
  ) -> Result<Vec<CandidateVenue>>;

  async fn find_by_id(&self, id: &str) -> Result<Option<CandidateVenue>>;

  /// Best textual match for a venue name.
  async fn search(&self, name_query: &str) -> Result<Option<CandidateVenue>>;
}

/// In-process catalog used by tests and fixture deployments.
#[derive(Default)]
pub struct MemoryCatalog {
  venues: RwLock<Vec<CandidateVenue>>,
}

impl MemoryCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn insert(&self, venue: CandidateVenue) {
    self.venues.write().await.push(venue);
  }
}

#[async_trait]
impl VenueCatalog for MemoryCatalog {
  async fn find_candidates(
    &self,
    exclude: &HashSet<String>,
    limit: usize,
  ) -> Result<Vec<CandidateVenue>> {
    let venues = self.venues.read().await;
    Ok(venues.iter().filter(|venue| !exclude.contains(&venue.id)).take(limit).cloned().collect())
  }

  async fn find_by_id(&self, id: &str) -> Result<Option<CandidateVenue>> {
    let venues = self.venues.read().await;
    Ok(venues.iter().find(|venue| venue.id == id).cloned())
  }

  async fn search(&self, name_query: &str) -> Result<Option<CandidateVenue>> {
    let query = name_query.to_lowercase();
    let terms: Vec<&str> = query.split_whitespace().collect();
    let venues = self.venues.read().await;

    let mut best: Option<(&CandidateVenue, usize)> = None;
    for venue in venues.iter() {
      let name = venue.name.to_lowercase();
      let matched = terms.iter().filter(|term| name.contains(*term)).count();
      if matched == 0 {
        continue;
      }
      if best.map_or(true, |(_, score)| matched > score) {
        best = Some((venue, matched));
      }
    }

    Ok(best.map(|(venue, _)| venue.clone()))
  }
}
