// src/store.rs
//! Persistence seam for polls, options, votes and profiles.
//!
//! Handlers never talk to a database directly; they go through [`PollStore`].
//! [`PgStore`] is the production backend, [`MemoryStore`] backs tests and
//! database-less local runs.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    NewPoll, NewProfile, NewVote, Poll, PollChanges, PollFilter, PollOption, PollWithOptions,
    Profile, Vote,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A vote with the same poll and dedupe key already exists.
    #[error("duplicate vote")]
    Duplicate,

    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return StoreError::Duplicate;
            }
        }
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait PollStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn upsert_profile(&self, profile: &NewProfile) -> StoreResult<Profile>;

    async fn list_polls(&self, filter: &PollFilter) -> StoreResult<Vec<Poll>>;

    async fn get_poll(&self, id: Uuid) -> StoreResult<Option<Poll>>;

    /// Options of a poll in display order.
    async fn poll_options(&self, poll_id: Uuid) -> StoreResult<Vec<PollOption>>;

    async fn create_poll(&self, poll: NewPoll) -> StoreResult<PollWithOptions>;

    async fn update_poll(&self, id: Uuid, changes: &PollChanges) -> StoreResult<Option<Poll>>;

    /// Removes the poll with its options and votes. Returns false if it did not exist.
    async fn delete_poll(&self, id: Uuid) -> StoreResult<bool>;

    /// Inserts the vote and bumps the option's counter atomically.
    /// Fails with [`StoreError::Duplicate`] on a dedupe key conflict.
    async fn record_vote(&self, vote: NewVote) -> StoreResult<Vote>;

    async fn votes_by_voter(&self, poll_id: Uuid, voter_id: Uuid) -> StoreResult<Vec<Vote>>;

    /// Distinct voters of a poll: voter id, else session, else IP.
    async fn unique_voters(&self, poll_id: Uuid) -> StoreResult<i64>;
}

pub(crate) fn page_bounds(filter: &PollFilter) -> (i64, i64) {
    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = filter.offset.unwrap_or(0).max(0);
    (limit, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_are_clamped() {
        let filter = PollFilter {
            limit: Some(1_000),
            offset: Some(-5),
            ..Default::default()
        };
        assert_eq!(page_bounds(&filter), (MAX_PAGE_SIZE, 0));
        assert_eq!(page_bounds(&PollFilter::default()), (DEFAULT_PAGE_SIZE, 0));
    }
}
