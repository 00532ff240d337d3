// src/store/memory.rs
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{page_bounds, PollStore, StoreError, StoreResult};
use crate::models::{
    NewPoll, NewProfile, NewVote, Poll, PollChanges, PollFilter, PollOption, PollWithOptions,
    Profile, Vote,
};

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    polls: HashMap<Uuid, Poll>,
    options: Vec<PollOption>,
    votes: Vec<(Vote, Option<String>)>,
}

/// In-process store. All tables sit behind one lock, so a dedupe check and the
/// insert that follows it cannot interleave with another vote.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> StoreResult<Profile> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let row = tables
            .profiles
            .entry(profile.id)
            .and_modify(|existing| {
                // tokens without an email claim keep what we already have
                if !profile.email.is_empty() {
                    existing.email = profile.email.clone();
                }
                existing.updated_at = now;
            })
            .or_insert_with(|| Profile {
                id: profile.id,
                email: profile.email.clone(),
                full_name: None,
                avatar_url: None,
                created_at: now,
                updated_at: now,
            });
        Ok(row.clone())
    }

    async fn list_polls(&self, filter: &PollFilter) -> StoreResult<Vec<Poll>> {
        let tables = self.tables.lock().await;
        let (limit, offset) = page_bounds(filter);
        let needle = filter.search.as_deref().map(str::to_lowercase);

        let mut polls: Vec<Poll> = tables
            .polls
            .values()
            .filter(|p| filter.creator_id.map_or(true, |id| p.creator_id == id))
            .filter(|p| filter.is_active.map_or(true, |active| p.is_active == active))
            .filter(|p| {
                needle
                    .as_deref()
                    .map_or(true, |n| p.title.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(polls
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_poll(&self, id: Uuid) -> StoreResult<Option<Poll>> {
        Ok(self.tables.lock().await.polls.get(&id).cloned())
    }

    async fn poll_options(&self, poll_id: Uuid) -> StoreResult<Vec<PollOption>> {
        let tables = self.tables.lock().await;
        let mut options: Vec<PollOption> = tables
            .options
            .iter()
            .filter(|o| o.poll_id == poll_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.option_order);
        Ok(options)
    }

    async fn create_poll(&self, poll: NewPoll) -> StoreResult<PollWithOptions> {
        let mut tables = self.tables.lock().await;
        if !tables.profiles.contains_key(&poll.creator_id) {
            return Err(StoreError::Backend(format!(
                "creator profile {} does not exist",
                poll.creator_id
            )));
        }

        let now = Utc::now();
        let created = Poll {
            id: Uuid::new_v4(),
            title: poll.title,
            description: poll.description,
            creator_id: poll.creator_id,
            is_active: true,
            allow_multiple_votes: poll.allow_multiple_votes,
            expires_at: poll.expires_at,
            created_at: now,
            updated_at: now,
        };
        let options: Vec<PollOption> = poll
            .options
            .into_iter()
            .enumerate()
            .map(|(order, option_text)| PollOption {
                id: Uuid::new_v4(),
                poll_id: created.id,
                option_text,
                option_order: order as i32,
                vote_count: 0,
                created_at: now,
            })
            .collect();

        tables.polls.insert(created.id, created.clone());
        tables.options.extend(options.iter().cloned());

        Ok(PollWithOptions {
            poll: created,
            options,
        })
    }

    async fn update_poll(&self, id: Uuid, changes: &PollChanges) -> StoreResult<Option<Poll>> {
        let mut tables = self.tables.lock().await;
        let Some(poll) = tables.polls.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = &changes.title {
            poll.title = title.clone();
        }
        if let Some(description) = &changes.description {
            poll.description = Some(description.clone());
        }
        if let Some(is_active) = changes.is_active {
            poll.is_active = is_active;
        }
        if let Some(allow) = changes.allow_multiple_votes {
            poll.allow_multiple_votes = allow;
        }
        if let Some(expires_at) = changes.expires_at {
            poll.expires_at = Some(expires_at);
        }
        poll.updated_at = Utc::now();

        Ok(Some(poll.clone()))
    }

    async fn delete_poll(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.polls.remove(&id).is_none() {
            return Ok(false);
        }
        tables.options.retain(|o| o.poll_id != id);
        tables.votes.retain(|(v, _)| v.poll_id != id);
        Ok(true)
    }

    async fn record_vote(&self, vote: NewVote) -> StoreResult<Vote> {
        let mut tables = self.tables.lock().await;

        if !tables.polls.contains_key(&vote.poll_id) {
            return Err(StoreError::Backend(format!("poll {} does not exist", vote.poll_id)));
        }
        if let Some(key) = &vote.dedupe_key {
            let taken = tables
                .votes
                .iter()
                .any(|(v, k)| v.poll_id == vote.poll_id && k.as_ref() == Some(key));
            if taken {
                return Err(StoreError::Duplicate);
            }
        }

        let Some(option) = tables
            .options
            .iter_mut()
            .find(|o| o.id == vote.option_id && o.poll_id == vote.poll_id)
        else {
            return Err(StoreError::Backend(format!(
                "option {} does not exist",
                vote.option_id
            )));
        };
        option.vote_count += 1;

        let recorded = Vote {
            id: Uuid::new_v4(),
            poll_id: vote.poll_id,
            option_id: vote.option_id,
            voter_id: vote.voter_id,
            voter_ip: vote.voter_ip,
            voter_session: vote.voter_session,
            created_at: Utc::now(),
        };
        tables.votes.push((recorded.clone(), vote.dedupe_key));
        Ok(recorded)
    }

    async fn votes_by_voter(&self, poll_id: Uuid, voter_id: Uuid) -> StoreResult<Vec<Vote>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .iter()
            .map(|(v, _)| v)
            .filter(|v| v.poll_id == poll_id && v.voter_id == Some(voter_id))
            .cloned()
            .collect())
    }

    async fn unique_voters(&self, poll_id: Uuid) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        let voters: HashSet<String> = tables
            .votes
            .iter()
            .map(|(v, _)| v)
            .filter(|v| v.poll_id == poll_id)
            .filter_map(|v| {
                v.voter_id
                    .map(|id| id.to_string())
                    .or_else(|| v.voter_session.clone())
                    .or_else(|| v.voter_ip.clone())
            })
            .collect();
        Ok(voters.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStore, PollWithOptions) {
        let store = MemoryStore::new();
        let creator = Uuid::new_v4();
        store
            .upsert_profile(&NewProfile {
                id: creator,
                email: "owner@example.com".into(),
            })
            .await
            .expect("profile");
        let poll = store
            .create_poll(NewPoll {
                title: "Tabs or spaces?".into(),
                description: None,
                creator_id: creator,
                allow_multiple_votes: false,
                expires_at: None,
                options: vec!["Tabs".into(), "Spaces".into()],
            })
            .await
            .expect("poll");
        (store, poll)
    }

    fn vote(poll: &PollWithOptions, option: usize, key: Option<&str>) -> NewVote {
        NewVote {
            poll_id: poll.poll.id,
            option_id: poll.options[option].id,
            voter_id: None,
            voter_ip: None,
            voter_session: key.map(str::to_string),
            dedupe_key: key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn second_vote_with_same_key_is_duplicate() {
        let (store, poll) = seeded().await;
        store.record_vote(vote(&poll, 0, Some("alice"))).await.expect("first vote");

        let err = store
            .record_vote(vote(&poll, 1, Some("alice")))
            .await
            .expect_err("second vote must conflict");
        assert!(matches!(err, StoreError::Duplicate));

        let options = store.poll_options(poll.poll.id).await.expect("options");
        assert_eq!(options[0].vote_count, 1);
        assert_eq!(options[1].vote_count, 0);
    }

    #[tokio::test]
    async fn keyless_votes_never_conflict() {
        let (store, poll) = seeded().await;
        for _ in 0..3 {
            store.record_vote(vote(&poll, 1, None)).await.expect("anonymous vote");
        }
        let options = store.poll_options(poll.poll.id).await.expect("options");
        assert_eq!(options[1].vote_count, 3);
    }

    #[tokio::test]
    async fn delete_cascades_to_options_and_votes() {
        let (store, poll) = seeded().await;
        store.record_vote(vote(&poll, 0, Some("bob"))).await.expect("vote");

        assert!(store.delete_poll(poll.poll.id).await.expect("delete"));
        assert!(store.get_poll(poll.poll.id).await.expect("get").is_none());
        assert!(store.poll_options(poll.poll.id).await.expect("options").is_empty());
        assert_eq!(store.unique_voters(poll.poll.id).await.expect("voters"), 0);
        assert!(!store.delete_poll(poll.poll.id).await.expect("second delete"));
    }

    #[tokio::test]
    async fn empty_email_does_not_overwrite_profile() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let upsert = |email: &str| NewProfile {
            id,
            email: email.to_string(),
        };

        store.upsert_profile(&upsert("first@example.com")).await.expect("insert");
        let kept = store.upsert_profile(&upsert("")).await.expect("blank upsert");
        assert_eq!(kept.email, "first@example.com");

        let changed = store.upsert_profile(&upsert("second@example.com")).await.expect("update");
        assert_eq!(changed.email, "second@example.com");
    }

    #[tokio::test]
    async fn options_come_back_in_display_order() {
        let (store, poll) = seeded().await;
        let texts: Vec<String> = store
            .poll_options(poll.poll.id)
            .await
            .expect("options")
            .into_iter()
            .map(|o| o.option_text)
            .collect();
        assert_eq!(texts, vec!["Tabs", "Spaces"]);
    }
}
