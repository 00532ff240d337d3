// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_text: String,
    pub option_order: i32,
    pub vote_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub voter_id: Option<Uuid>,
    pub voter_ip: Option<String>,
    pub voter_session: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollWithOptions {
    #[serde(flatten)]
    pub poll: Poll,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteResult {
    pub option_id: Uuid,
    pub option_text: String,
    pub vote_count: i64,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResults {
    pub poll: Poll,
    pub results: Vec<VoteResult>,
    pub total_votes: i64,
    pub unique_voters: i64,
}

#[derive(Debug, Serialize)]
pub struct VoteStatus {
    pub has_voted: bool,
    pub option_ids: Vec<Uuid>,
}

// Request bodies

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple_votes: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePollRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub allow_multiple_votes: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    #[serde(rename = "optionId", alias = "option_id")]
    pub option_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollFilter {
    pub creator_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// Store inputs

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub title: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub allow_multiple_votes: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PollChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub allow_multiple_votes: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewVote {
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub voter_id: Option<Uuid>,
    pub voter_ip: Option<String>,
    pub voter_session: Option<String>,
    /// Votes sharing a poll and a key conflict. `None` never conflicts.
    pub dedupe_key: Option<String>,
}
