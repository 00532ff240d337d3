// services.rs
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{AuthUser, Voter};
use crate::error::{AppError, AppResult};
use crate::models::{
    CreatePollRequest, NewPoll, NewProfile, NewVote, Poll, PollChanges, PollFilter, PollResults,
    PollWithOptions, Profile, UpdatePollRequest, Vote, VoteStatus,
};
use crate::poll;
use crate::store::{PollStore, StoreError};

pub fn parse_id(raw: &str, what: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid {what} id")))
}

async fn load_poll(store: &dyn PollStore, poll_id: Uuid) -> AppResult<Poll> {
    store
        .get_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Poll not found".to_string()))
}

pub async fn ensure_profile(store: &dyn PollStore, user: &AuthUser) -> AppResult<Profile> {
    let profile = store
        .upsert_profile(&NewProfile {
            id: user.id,
            email: user.email.clone(),
        })
        .await?;
    Ok(profile)
}

pub async fn list_polls(store: &dyn PollStore, filter: &PollFilter) -> AppResult<Vec<Poll>> {
    Ok(store.list_polls(filter).await?)
}

pub async fn get_poll(store: &dyn PollStore, poll_id: Uuid) -> AppResult<PollWithOptions> {
    let poll = load_poll(store, poll_id).await?;
    let options = store.poll_options(poll_id).await?;
    Ok(PollWithOptions { poll, options })
}

pub async fn create_poll(
    store: &dyn PollStore,
    user: &AuthUser,
    request: CreatePollRequest,
) -> AppResult<PollWithOptions> {
    let (title, options) =
        poll::validate_new_poll(&request.title, &request.options, request.expires_at, Utc::now())
            .inspect_err(|e| debug!(error = %e, "rejected new poll"))?;

    ensure_profile(store, user).await?;

    let created = store
        .create_poll(NewPoll {
            title,
            description: request
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            creator_id: user.id,
            allow_multiple_votes: request.allow_multiple_votes,
            expires_at: request.expires_at,
            options,
        })
        .await?;

    info!(poll_id = %created.poll.id, creator = %user.id, options = created.options.len(), "poll created");
    Ok(created)
}

/// Ownership gate shared by update and delete.
async fn owned_poll(
    store: &dyn PollStore,
    user: &AuthUser,
    poll_id: Uuid,
    action: &str,
) -> AppResult<Poll> {
    let poll = load_poll(store, poll_id).await?;
    if poll.creator_id != user.id {
        debug!(poll_id = %poll_id, user = %user.id, action, "ownership check failed");
        return Err(AppError::Forbidden(format!(
            "You do not have permission to {action} this poll"
        )));
    }
    Ok(poll)
}

pub async fn update_poll(
    store: &dyn PollStore,
    user: &AuthUser,
    poll_id: Uuid,
    request: UpdatePollRequest,
) -> AppResult<Poll> {
    let current = owned_poll(store, user, poll_id, "update").await?;

    // Vote dedupe keys are derived from this flag, so it is frozen once votes exist.
    if request
        .allow_multiple_votes
        .is_some_and(|allow| allow != current.allow_multiple_votes)
    {
        let cast: i64 = store
            .poll_options(poll_id)
            .await?
            .iter()
            .map(|o| o.vote_count)
            .sum();
        if cast > 0 {
            debug!(poll_id = %poll_id, cast, "refused multi-vote toggle on voted poll");
            return Err(AppError::Validation(
                "Cannot change the multiple-vote setting after votes have been cast".to_string(),
            ));
        }
    }

    let changes = PollChanges {
        title: poll::validate_title_change(request.title.as_deref())?,
        description: request.description.map(|d| d.trim().to_string()),
        is_active: request.is_active,
        allow_multiple_votes: request.allow_multiple_votes,
        expires_at: request.expires_at,
    };

    let updated = store
        .update_poll(poll_id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Poll not found".to_string()))?;

    info!(poll_id = %poll_id, "poll updated");
    Ok(updated)
}

pub async fn delete_poll(store: &dyn PollStore, user: &AuthUser, poll_id: Uuid) -> AppResult<()> {
    owned_poll(store, user, poll_id, "delete").await?;

    if !store.delete_poll(poll_id).await? {
        return Err(AppError::NotFound("Poll not found".to_string()));
    }

    info!(poll_id = %poll_id, "poll deleted");
    Ok(())
}

/// Records one vote.
///
/// Authenticated votes carry a dedupe key so the store turns a repeat into
/// [`StoreError::Duplicate`]; anonymous votes are never deduplicated.
pub async fn cast_vote(
    store: &dyn PollStore,
    voter: Voter,
    poll_id: Uuid,
    option_id: Uuid,
) -> AppResult<Vote> {
    let poll = load_poll(store, poll_id).await?;

    if !poll.is_active {
        return Err(AppError::Validation(
            "This poll is closed and no longer accepts votes".to_string(),
        ));
    }
    if poll.is_expired(Utc::now()) {
        return Err(AppError::Validation("This poll has expired".to_string()));
    }

    let options = store.poll_options(poll_id).await?;
    if !options.iter().any(|o| o.id == option_id) {
        return Err(AppError::Validation(
            "Option does not belong to this poll".to_string(),
        ));
    }

    let vote = match voter {
        Voter::User(user) => {
            ensure_profile(store, &user).await?;
            NewVote {
                poll_id,
                option_id,
                voter_id: Some(user.id),
                voter_ip: None,
                voter_session: None,
                dedupe_key: Some(poll::dedupe_key(user.id, option_id, poll.allow_multiple_votes)),
            }
        }
        Voter::Anonymous { session, ip } => NewVote {
            poll_id,
            option_id,
            voter_id: None,
            voter_ip: ip,
            voter_session: session,
            dedupe_key: None,
        },
    };

    let recorded = store.record_vote(vote).await.map_err(|e| match e {
        StoreError::Duplicate => {
            debug!(poll_id = %poll_id, "duplicate vote rejected");
            AppError::Conflict("Duplicate vote".to_string())
        }
        other => AppError::Failed {
            message: "Failed to cast vote",
            source: other,
        },
    })?;

    info!(
        poll_id = %poll_id,
        option_id = %option_id,
        anonymous = recorded.voter_id.is_none(),
        "vote recorded"
    );
    Ok(recorded)
}

pub async fn vote_status(
    store: &dyn PollStore,
    user: &AuthUser,
    poll_id: Uuid,
) -> AppResult<VoteStatus> {
    load_poll(store, poll_id).await?;
    let votes = store.votes_by_voter(poll_id, user.id).await?;
    Ok(VoteStatus {
        has_voted: !votes.is_empty(),
        option_ids: votes.into_iter().map(|v| v.option_id).collect(),
    })
}

pub async fn poll_results(store: &dyn PollStore, poll_id: Uuid) -> AppResult<PollResults> {
    let poll = load_poll(store, poll_id).await?;
    let options = store.poll_options(poll_id).await?;
    let (results, total_votes) = poll::tally(&options);
    let unique_voters = store.unique_voters(poll_id).await?;

    Ok(PollResults {
        poll,
        results,
        total_votes,
        unique_voters,
    })
}
