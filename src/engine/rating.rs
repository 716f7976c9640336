//! Rating verdicts and the static policy table mapping each verdict to its
//! queue and stats effects.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The user's self-assessment of a card.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
    Skip,
}

/// What the server is told about a grade.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    Failure,
    Skipped,
}

/// Where a graded card goes next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequeuePolicy {
    /// The card leaves the session.
    Graduate,
    /// Re-inserted at this index of the remaining queue (clamped to its length).
    InsertAfter(usize),
    /// Re-inserted behind every remaining card.
    InsertAtEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RatingPolicy {
    pub result: ResultKind,
    pub requeue: RequeuePolicy,
    pub counts_as_attempt: bool,
    pub counts_as_success: bool,
}

const AGAIN: RatingPolicy = RatingPolicy {
    result: ResultKind::Failure,
    requeue: RequeuePolicy::InsertAfter(1),
    counts_as_attempt: true,
    counts_as_success: false,
};

const HARD: RatingPolicy = RatingPolicy {
    result: ResultKind::Failure,
    requeue: RequeuePolicy::InsertAfter(3),
    counts_as_attempt: true,
    counts_as_success: false,
};

const GOOD: RatingPolicy = RatingPolicy {
    result: ResultKind::Success,
    requeue: RequeuePolicy::Graduate,
    counts_as_attempt: true,
    counts_as_success: true,
};

const EASY: RatingPolicy = GOOD;

const SKIP: RatingPolicy = RatingPolicy {
    result: ResultKind::Skipped,
    requeue: RequeuePolicy::InsertAtEnd,
    counts_as_attempt: false,
    counts_as_success: false,
};

impl Rating {
    #[cfg(test)]
    pub const ALL: [Rating; 5] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy, Rating::Skip];

    pub fn policy(self) -> RatingPolicy {
        match self {
            Rating::Again => AGAIN,
            Rating::Hard => HARD,
            Rating::Good => GOOD,
            Rating::Easy => EASY,
            Rating::Skip => SKIP,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
            Rating::Skip => "skip",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
