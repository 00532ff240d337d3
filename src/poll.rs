// src/poll.rs
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{PollOption, VoteResult};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;

/// Trims the title and every option, dropping blank options, and checks the
/// option count bounds.
pub fn validate_new_poll(
    title: &str,
    options: &[String],
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AppResult<(String, Vec<String>)> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Poll title is required".to_string()));
    }

    let options: Vec<String> = options
        .iter()
        .map(|option| option.trim())
        .filter(|option| !option.is_empty())
        .map(str::to_string)
        .collect();

    if options.len() < MIN_OPTIONS {
        return Err(AppError::BadRequest(
            "At least 2 options are required".to_string(),
        ));
    }
    if options.len() > MAX_OPTIONS {
        return Err(AppError::BadRequest("Maximum 10 options allowed".to_string()));
    }

    if expires_at.is_some_and(|at| at <= now) {
        return Err(AppError::BadRequest(
            "Expiry date must be in the future".to_string(),
        ));
    }

    Ok((title.to_string(), options))
}

/// A present title must still be non-empty once trimmed.
pub fn validate_title_change(title: Option<&str>) -> AppResult<Option<String>> {
    match title.map(str::trim) {
        Some("") => Err(AppError::BadRequest(
            "Poll title cannot be empty".to_string(),
        )),
        Some(title) => Ok(Some(title.to_string())),
        None => Ok(None),
    }
}

/// Share of `votes` in `total` as a whole percent, half rounding up.
/// Zero when nobody has voted yet.
pub fn percentage(votes: i64, total: i64) -> u32 {
    if total <= 0 || votes <= 0 {
        return 0;
    }
    ((votes as f64 / total as f64) * 100.0).round() as u32
}

/// Per-option results in display order plus the total vote count.
///
/// Each percentage is rounded independently, so the sum can drift from 100 by
/// a point or two.
pub fn tally(options: &[PollOption]) -> (Vec<VoteResult>, i64) {
    let total: i64 = options.iter().map(|o| o.vote_count).sum();
    let results = options
        .iter()
        .map(|o| VoteResult {
            option_id: o.id,
            option_text: o.option_text.clone(),
            vote_count: o.vote_count,
            percentage: percentage(o.vote_count, total),
        })
        .collect();
    (results, total)
}

/// Key under which an authenticated vote must be unique within its poll.
pub fn dedupe_key(voter_id: Uuid, option_id: Uuid, allow_multiple_votes: bool) -> String {
    if allow_multiple_votes {
        format!("{voter_id}:{option_id}")
    } else {
        voter_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn option(order: i32, votes: i64) -> PollOption {
        PollOption {
            id: Uuid::new_v4(),
            poll_id: Uuid::nil(),
            option_text: format!("option {order}"),
            option_order: order,
            vote_count: votes,
            created_at: Utc::now(),
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tally_rounds_each_option() {
        let options: Vec<PollOption> = [42, 35, 28, 19, 15]
            .iter()
            .enumerate()
            .map(|(i, v)| option(i as i32, *v))
            .collect();

        let (results, total) = tally(&options);
        let percentages: Vec<u32> = results.iter().map(|r| r.percentage).collect();

        assert_eq!(total, 139);
        assert_eq!(percentages, vec![30, 25, 20, 14, 11]);
        assert_eq!(percentages.iter().sum::<u32>(), 100);
    }

    #[test]
    fn rounding_may_not_sum_to_hundred() {
        let options = vec![option(0, 1), option(1, 1), option(2, 1)];
        let (results, _) = tally(&options);
        let sum: u32 = results.iter().map(|r| r.percentage).sum();
        assert_eq!(sum, 99);
    }

    #[test]
    fn percentage_of_nothing_is_zero() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 0), 0);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(1, 8), 13);
    }

    #[test]
    fn new_poll_trims_and_drops_blank_options() {
        let now = Utc::now();
        let (title, options) =
            validate_new_poll("  Lunch?  ", &strings(&[" Pizza ", "", "   ", "Sushi"]), None, now)
                .expect("valid poll");
        assert_eq!(title, "Lunch?");
        assert_eq!(options, vec!["Pizza", "Sushi"]);
    }

    #[test]
    fn new_poll_rejects_bad_input() {
        let now = Utc::now();
        let two = strings(&["a", "b"]);

        let err = validate_new_poll("   ", &two, None, now).unwrap_err();
        assert_eq!(err.to_string(), "Poll title is required");

        let err = validate_new_poll("t", &strings(&["a", " "]), None, now).unwrap_err();
        assert_eq!(err.to_string(), "At least 2 options are required");

        let eleven: Vec<String> = (0..11).map(|i| format!("o{i}")).collect();
        let err = validate_new_poll("t", &eleven, None, now).unwrap_err();
        assert_eq!(err.to_string(), "Maximum 10 options allowed");

        let ten: Vec<String> = (0..10).map(|i| format!("o{i}")).collect();
        assert!(validate_new_poll("t", &ten, None, now).is_ok());

        let past = now - Duration::minutes(1);
        assert!(validate_new_poll("t", &two, Some(past), now).is_err());
        assert!(validate_new_poll("t", &two, Some(now + Duration::days(1)), now).is_ok());
    }

    #[test]
    fn title_change_must_not_be_blank() {
        assert!(validate_title_change(Some("  ")).is_err());
        assert_eq!(validate_title_change(Some(" New ")).unwrap(), Some("New".to_string()));
        assert_eq!(validate_title_change(None).unwrap(), None);
    }

    #[test]
    fn dedupe_key_depends_on_multi_vote() {
        let voter = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(dedupe_key(voter, a, false), dedupe_key(voter, b, false));
        assert_ne!(dedupe_key(voter, a, true), dedupe_key(voter, b, true));
    }
}
