// src/store/postgres.rs
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{page_bounds, PollStore, StoreError, StoreResult};
use crate::models::{
    NewPoll, NewProfile, NewVote, Poll, PollChanges, PollFilter, PollOption, PollWithOptions,
    Profile, Vote,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PollStore for PgStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> StoreResult<Profile> {
        let row = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, email)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET email = COALESCE(NULLIF(EXCLUDED.email, ''), profiles.email),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(profile.id)
        .bind(&profile.email)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_polls(&self, filter: &PollFilter) -> StoreResult<Vec<Poll>> {
        let (limit, offset) = page_bounds(filter);
        let polls = sqlx::query_as::<_, Poll>(
            r#"
            SELECT * FROM polls
            WHERE ($1::uuid IS NULL OR creator_id = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR title ILIKE '%' || $3 || '%')
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.creator_id)
        .bind(filter.is_active)
        .bind(filter.search.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(polls)
    }

    async fn get_poll(&self, id: Uuid) -> StoreResult<Option<Poll>> {
        let poll = sqlx::query_as::<_, Poll>("SELECT * FROM polls WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(poll)
    }

    async fn poll_options(&self, poll_id: Uuid) -> StoreResult<Vec<PollOption>> {
        let options = sqlx::query_as::<_, PollOption>(
            "SELECT * FROM poll_options WHERE poll_id = $1 ORDER BY option_order",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(options)
    }

    async fn create_poll(&self, poll: NewPoll) -> StoreResult<PollWithOptions> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Poll>(
            r#"
            INSERT INTO polls (id, title, description, creator_id, allow_multiple_votes, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&poll.title)
        .bind(poll.description.as_deref())
        .bind(poll.creator_id)
        .bind(poll.allow_multiple_votes)
        .bind(poll.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        let mut options = Vec::with_capacity(poll.options.len());
        for (order, text) in poll.options.iter().enumerate() {
            let option = sqlx::query_as::<_, PollOption>(
                r#"
                INSERT INTO poll_options (id, poll_id, option_text, option_order)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(created.id)
            .bind(text)
            .bind(order as i32)
            .fetch_one(&mut *tx)
            .await?;
            options.push(option);
        }

        tx.commit().await?;

        Ok(PollWithOptions {
            poll: created,
            options,
        })
    }

    async fn update_poll(&self, id: Uuid, changes: &PollChanges) -> StoreResult<Option<Poll>> {
        let poll = sqlx::query_as::<_, Poll>(
            r#"
            UPDATE polls
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active),
                allow_multiple_votes = COALESCE($5, allow_multiple_votes),
                expires_at = COALESCE($6, expires_at),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.title.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.is_active)
        .bind(changes.allow_multiple_votes)
        .bind(changes.expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(poll)
    }

    async fn delete_poll(&self, id: Uuid) -> StoreResult<bool> {
        // options and votes go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_vote(&self, vote: NewVote) -> StoreResult<Vote> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query_as::<_, Vote>(
            r#"
            INSERT INTO votes (id, poll_id, option_id, voter_id, voter_ip, voter_session, dedupe_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, poll_id, option_id, voter_id, voter_ip, voter_session, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(vote.poll_id)
        .bind(vote.option_id)
        .bind(vote.voter_id)
        .bind(vote.voter_ip.as_deref())
        .bind(vote.voter_session.as_deref())
        .bind(vote.dedupe_key.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        let incremented: Option<bool> = sqlx::query_scalar("SELECT increment_vote($1)")
            .bind(vote.option_id)
            .fetch_one(&mut *tx)
            .await?;

        if incremented != Some(true) {
            return Err(StoreError::Backend(format!(
                "option {} vanished while recording vote",
                vote.option_id
            )));
        }

        tx.commit().await?;
        Ok(recorded)
    }

    async fn votes_by_voter(&self, poll_id: Uuid, voter_id: Uuid) -> StoreResult<Vec<Vote>> {
        let votes = sqlx::query_as::<_, Vote>(
            r#"
            SELECT id, poll_id, option_id, voter_id, voter_ip, voter_session, created_at
            FROM votes
            WHERE poll_id = $1 AND voter_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(poll_id)
        .bind(voter_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(votes)
    }

    async fn unique_voters(&self, poll_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT COALESCE(voter_id::text, voter_session, voter_ip))
            FROM votes
            WHERE poll_id = $1
            "#,
        )
        .bind(poll_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
