use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::catalog::CandidateVenue;
use crate::fingerprint::{RawFingerprint, TasteFingerprint};
use crate::profile::{EnjoyedVenueSummary, Preferences};

/// Cap on review snippets included per candidate in scoring payloads.
pub const MAX_SCORING_SNIPPETS: usize = 3;

const MAX_COMPLETION_TOKENS: u32 = 1500;

/// Trimmed venue payload submitted to the oracle for scoring.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
  pub id: String,
  pub name: String,
  pub cuisines: Vec<String>,
  pub price_level: u8,
  pub rating: f32,
  pub total_ratings: u32,
  pub review_snippets: Vec<String>,
}

impl CandidateSummary {
  pub fn from_venue(venue: &CandidateVenue) -> Self {
    Self {
      id: venue.id.clone(),
      name: venue.name.clone(),
      cuisines: venue.cuisines.clone(),
      price_level: venue.price_level,
      rating: venue.rating,
      total_ratings: venue.total_ratings,
      review_snippets: venue
        .review_snippets
        .iter()
        .take(MAX_SCORING_SNIPPETS)
        .cloned()
        .collect(),
    }
  }
}

/// Per-candidate verdict from a pool scoring round-trip.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolVerdict {
  pub id: String,
  pub match_score: u8,
  #[serde(default)]
  pub reasons: Vec<String>,
  #[serde(default)]
  pub warnings: Vec<String>,
  #[serde(default)]
  pub suggested_dish: Option<String>,
}

/// Verdict for a single candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleVerdict {
  pub match_score: u8,
  #[serde(default)]
  pub reasons: Vec<String>,
  #[serde(default)]
  pub warnings: Vec<String>,
  #[serde(default)]
  pub suggested_dish: Option<String>,
}

/// Semantic-judgment capability boundary.
///
/// Implementations must hand back well-formed structured data; anything
/// unparseable is an error, never a best-effort default.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
  async fn judge_fingerprint(
    &self,
    preferences: &Preferences,
    enjoyed: &[EnjoyedVenueSummary],
  ) -> Result<RawFingerprint>;

  /// Score the whole pool in one round trip, descending by match score.
  /// Entries below the display floor may already be omitted.
  async fn judge_pool(
    &self,
    fingerprint: &TasteFingerprint,
    preferences: &Preferences,
    candidates: &[CandidateSummary],
  ) -> Result<Vec<PoolVerdict>>;

  async fn judge_single(
    &self,
    fingerprint: &TasteFingerprint,
    candidate: &CandidateSummary,
  ) -> Result<SingleVerdict>;
}

/// Parse an oracle reply as strict JSON, tolerating markdown code fences.
pub fn parse_oracle_json<T: DeserializeOwned>(text: &str) -> Result<T> {
  let cleaned = text.replace("```json", "").replace("```", "");
  serde_json::from_str(cleaned.trim()).map_err(|e| anyhow!("Oracle returned malformed JSON: {e}"))
}

/// Configuration for the HTTP-backed oracle client.
#[derive(Debug, Clone)]
pub struct OracleConfig {
  pub base_url: String,
  pub api_key: String,
  pub model: String,
  /// Request timeout in seconds
  pub timeout_secs: u64,
}

impl Default for OracleConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.openai.com".to_string(),
      api_key: String::new(),
      model: "gpt-4o-mini".to_string(),
      timeout_secs: 30,
    }
  }
}

impl OracleConfig {
  /// Read overrides from the environment.
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      base_url: std::env::var("PALATE_ORACLE_URL").unwrap_or(defaults.base_url),
      api_key: std::env::var("PALATE_ORACLE_API_KEY").unwrap_or(defaults.api_key),
      model: std::env::var("PALATE_ORACLE_MODEL").unwrap_or(defaults.model),
      timeout_secs: defaults.timeout_secs,
    }
  }
}

// Chat-completions wire shapes
#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  max_completion_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
  content: String,
}

/// HTTP-backed oracle speaking the chat-completions protocol.
pub struct LlmOracle {
  client: Client,
  config: OracleConfig,
}

impl Default for LlmOracle {
  fn default() -> Self {
    Self::new()
  }
}

impl LlmOracle {
  /// Create a client configured from the environment.
  pub fn new() -> Self {
    Self::with_config(OracleConfig::from_env())
  }

  pub fn with_config(config: OracleConfig) -> Self {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .expect("Failed to create HTTP client");

    Self { client, config }
  }

  async fn complete(&self, prompt: String) -> Result<String> {
    let request = ChatRequest {
      model: &self.config.model,
      messages: vec![ChatMessage { role: "user", content: prompt }],
      max_completion_tokens: MAX_COMPLETION_TOKENS,
    };

    let url = format!("{}/v1/chat/completions", self.config.base_url);
    let response =
      self.client.post(&url).bearer_auth(&self.config.api_key).json(&request).send().await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(anyhow!("Oracle request failed with {status}: {body}"));
    }

    let completion: ChatResponse = response.json().await?;
    let choice =
      completion.choices.into_iter().next().ok_or_else(|| anyhow!("Oracle returned no choices"))?;
    Ok(choice.message.content)
  }
}

fn fingerprint_prompt(
  preferences: &Preferences,
  enjoyed: &[EnjoyedVenueSummary],
) -> Result<String> {
  let preferences_json = serde_json::to_string_pretty(preferences)?;
  let enjoyed_json = serde_json::to_string_pretty(enjoyed)?;

  Ok(format!(
    "You are a food preference analyst.\n\n\
     USER'S EXPLICIT PREFERENCES:\n{preferences_json}\n\n\
     VENUES USER ENJOYS:\n{enjoyed_json}\n\n\
     Analyze these and build a taste fingerprint.\n\
     Return ONLY valid JSON (no markdown):\n\
     {{\n\
       \"cuisineAffinity\": {{ \"North Indian\": 0.85 }},\n\
       \"spiceComfort\": 4,\n\
       \"priceComfort\": 1.5,\n\
       \"ambianceScores\": {{ \"casual\": 0.9 }},\n\
       \"adventureScore\": 0.3,\n\
       \"keySignals\": [\"values speed\", \"comfort food\"],\n\
       \"fingerprintVector\": [0.85, 0.1, 0.7, 0.0, 0.0, 0.8, 0.7, 0.3]\n\
     }}\n\n\
     Rules:\n\
     - cuisineAffinity: only cuisines > 0.2\n\
     - fingerprintVector: EXACTLY 8 numbers (0-1) for [north_indian, south_indian, \
     street_food, italian, chinese, spice, price_sensitivity, adventure]"
  ))
}

fn pool_prompt(
  fingerprint: &TasteFingerprint,
  preferences: &Preferences,
  candidates: &[CandidateSummary],
) -> Result<String> {
  let fingerprint_json = serde_json::to_string_pretty(fingerprint)?;
  let preferences_json = serde_json::to_string_pretty(preferences)?;
  let candidates_json = serde_json::to_string_pretty(candidates)?;

  Ok(format!(
    "You are a venue recommendation engine.\n\n\
     USER TASTE FINGERPRINT:\n{fingerprint_json}\n\n\
     USER PREFERENCES:\n{preferences_json}\n\n\
     CANDIDATE VENUES:\n{candidates_json}\n\n\
     Score each venue 0-100 against the user's taste.\n\
     Return ONLY valid JSON array (no markdown), sorted by matchScore descending:\n\
     [\n\
       {{\n\
         \"id\": \"exact_id_from_input\",\n\
         \"matchScore\": 78,\n\
         \"reasons\": [\"Matches North Indian preference\"],\n\
         \"warnings\": [\"Spicier than usual\"],\n\
         \"suggestedDish\": \"Paneer tikka\"\n\
       }}\n\
     ]\n\n\
     Only include venues with matchScore >= 30."
  ))
}

fn single_prompt(fingerprint: &TasteFingerprint, candidate: &CandidateSummary) -> Result<String> {
  let fingerprint_json = serde_json::to_string_pretty(fingerprint)?;
  let candidate_json = serde_json::to_string_pretty(candidate)?;

  Ok(format!(
    "You are scoring a single venue for a user.\n\n\
     USER TASTE FINGERPRINT:\n{fingerprint_json}\n\n\
     VENUE:\n{candidate_json}\n\n\
     Score 0-100. Return ONLY valid JSON:\n\
     {{\n\
       \"matchScore\": 72,\n\
       \"reasons\": [\"reason 1\"],\n\
       \"warnings\": [\"warning if any\"],\n\
       \"suggestedDish\": \"one dish\"\n\
     }}"
  ))
}

#[async_trait]
impl ScoringOracle for LlmOracle {
  async fn judge_fingerprint(
    &self,
    preferences: &Preferences,
    enjoyed: &[EnjoyedVenueSummary],
  ) -> Result<RawFingerprint> {
    let reply = self.complete(fingerprint_prompt(preferences, enjoyed)?).await?;
    parse_oracle_json(&reply)
  }

  async fn judge_pool(
    &self,
    fingerprint: &TasteFingerprint,
    preferences: &Preferences,
    candidates: &[CandidateSummary],
  ) -> Result<Vec<PoolVerdict>> {
    let reply = self.complete(pool_prompt(fingerprint, preferences, candidates)?).await?;
    parse_oracle_json(&reply)
  }

  async fn judge_single(
    &self,
    fingerprint: &TasteFingerprint,
    candidate: &CandidateSummary,
  ) -> Result<SingleVerdict> {
    let reply = self.complete(single_prompt(fingerprint, candidate)?).await?;
    parse_oracle_json(&reply)
  }
}

/// Deterministic oracle for tests and offline runs.
#[derive(Default)]
pub struct FixtureOracle {
  fingerprint: Option<RawFingerprint>,
  pool_verdicts: Vec<PoolVerdict>,
  single_verdict: Option<SingleVerdict>,
  fail_with: Option<String>,
  fingerprint_calls: AtomicUsize,
}

impl FixtureOracle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_fingerprint(mut self, fingerprint: RawFingerprint) -> Self {
    self.fingerprint = Some(fingerprint);
    self
  }

  pub fn with_pool_verdicts(mut self, verdicts: Vec<PoolVerdict>) -> Self {
    self.pool_verdicts = verdicts;
    self
  }

  pub fn with_single_verdict(mut self, verdict: SingleVerdict) -> Self {
    self.single_verdict = Some(verdict);
    self
  }

  pub fn with_failure(mut self, message: impl Into<String>) -> Self {
    self.fail_with = Some(message.into());
    self
  }

  /// Number of fingerprint judgments served so far.
  pub fn fingerprint_calls(&self) -> usize {
    self.fingerprint_calls.load(Ordering::SeqCst)
  }

  fn check_failure(&self) -> Result<()> {
    match &self.fail_with {
      Some(message) => Err(anyhow!("Fixture failure: {message}")),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl ScoringOracle for FixtureOracle {
  async fn judge_fingerprint(
    &self,
    _preferences: &Preferences,
    _enjoyed: &[EnjoyedVenueSummary],
  ) -> Result<RawFingerprint> {
    self.check_failure()?;
    self.fingerprint_calls.fetch_add(1, Ordering::SeqCst);
    self.fingerprint.clone().ok_or_else(|| anyhow!("Fixture has no fingerprint response"))
  }

  async fn judge_pool(
    &self,
    _fingerprint: &TasteFingerprint,
    _preferences: &Preferences,
    _candidates: &[CandidateSummary],
  ) -> Result<Vec<PoolVerdict>> {
    self.check_failure()?;
    Ok(self.pool_verdicts.clone())
  }

  async fn judge_single(
    &self,
    _fingerprint: &TasteFingerprint,
    _candidate: &CandidateSummary,
  ) -> Result<SingleVerdict> {
    self.check_failure()?;
    self.single_verdict.clone().ok_or_else(|| anyhow!("Fixture has no single verdict"))
  }
}
