//! Session counters and the pure reducer that updates them from a verdict.

use serde::Serialize;

use super::rating::Rating;

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// High-water mark of `reviewed + remaining`.
    pub total: u32,
    pub reviewed: u32,
    pub correct: u32,
    pub streak: u32,
    pub lapses: u32,
    pub skipped: u32,
}

impl StatsSnapshot {
    /// Fresh counters for a newly loaded session of `card_count` cards.
    pub fn fresh(card_count: usize) -> Self {
        Self {
            total: to_u32(card_count),
            ..Self::default()
        }
    }

    /// Raise `total` so it covers everything reviewed plus what is still queued.
    pub fn cover(&mut self, queue_len: usize) {
        self.total = self.total.max(self.reviewed.saturating_add(to_u32(queue_len)));
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Apply one verdict. `queue_len_after` is the queue length after the card was
/// popped and (if applicable) re-inserted.
pub fn apply_rating(stats: &StatsSnapshot, rating: Rating, queue_len_after: usize) -> StatsSnapshot {
    let policy = rating.policy();
    let attempted = policy.counts_as_attempt;
    let success = attempted && policy.counts_as_success;
    let failure = attempted && !policy.counts_as_success && rating != Rating::Skip;

    let mut next = *stats;
    if attempted {
        next.reviewed += 1;
    }
    if success {
        next.correct += 1;
        next.streak += 1;
    }
    if failure {
        next.lapses += 1;
    }
    if attempted && !success {
        next.streak = 0;
    }
    if rating == Rating::Skip {
        next.skipped += 1;
    }
    next.cover(queue_len_after);
    next
}

/// Undo `apply_rating` for the same verdict. Counters are floored at zero.
/// `streak` cannot be reconstructed from the counters alone and drops to zero;
/// `total` is a high-water mark and is left as is.
pub fn revert_rating(stats: &StatsSnapshot, rating: Rating) -> StatsSnapshot {
    let policy = rating.policy();
    let attempted = policy.counts_as_attempt;
    let success = attempted && policy.counts_as_success;
    let failure = attempted && !policy.counts_as_success && rating != Rating::Skip;

    let mut prev = *stats;
    if attempted {
        prev.reviewed = prev.reviewed.saturating_sub(1);
        prev.streak = 0;
    }
    if success {
        prev.correct = prev.correct.saturating_sub(1);
    }
    if failure {
        prev.lapses = prev.lapses.saturating_sub(1);
    }
    if rating == Rating::Skip {
        prev.skipped = prev.skipped.saturating_sub(1);
        prev.streak = 0;
    }
    prev
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ratings: &[Rating]) -> StatsSnapshot {
        let mut s = StatsSnapshot::fresh(ratings.len());
        for (i, r) in ratings.iter().enumerate() {
            s = apply_rating(&s, *r, ratings.len() - i - 1);
        }
        s
    }

    #[test]
    fn reviewed_counts_attempts_only() {
        let seq = [
            Rating::Again,
            Rating::Skip,
            Rating::Good,
            Rating::Skip,
            Rating::Hard,
            Rating::Easy,
            Rating::Good,
        ];
        for n in 0..=seq.len() {
            let s = run(&seq[..n]);
            let attempts = seq[..n].iter().filter(|r| r.policy().counts_as_attempt).count() as u32;
            assert_eq!(s.reviewed, attempts);
            assert_eq!(s.reviewed, s.correct + s.lapses);
        }
    }

    #[test]
    fn streak_rules() {
        let s = run(&[Rating::Good, Rating::Easy]);
        assert_eq!(s.streak, 2);
        let s = apply_rating(&s, Rating::Skip, 3);
        assert_eq!(s.streak, 2);
        assert_eq!(s.skipped, 1);
        let s = apply_rating(&s, Rating::Hard, 3);
        assert_eq!(s.streak, 0);
        assert_eq!(s.lapses, 1);
    }

    #[test]
    fn skip_is_neutral_for_attempt_counters() {
        let before = StatsSnapshot { total: 5, reviewed: 2, correct: 1, streak: 1, lapses: 1, skipped: 0 };
        let after = apply_rating(&before, Rating::Skip, 3);
        assert_eq!(after.reviewed, 2);
        assert_eq!(after.correct, 1);
        assert_eq!(after.lapses, 1);
        assert_eq!(after.streak, 1);
        assert_eq!(after.skipped, 1);
    }

    #[test]
    fn total_is_a_high_water_mark() {
        let s = StatsSnapshot::fresh(3);
        let s = apply_rating(&s, Rating::Hard, 3);
        assert_eq!(s.total, 4);
        let s = apply_rating(&s, Rating::Good, 1);
        assert_eq!(s.total, 4);
    }

    #[test]
    fn revert_undoes_counters() {
        let base = StatsSnapshot { total: 10, reviewed: 4, correct: 2, streak: 2, lapses: 2, skipped: 1 };
        for r in Rating::ALL {
            let applied = apply_rating(&base, r, 5);
            let back = revert_rating(&applied, r);
            assert_eq!(back.reviewed, base.reviewed, "{r}");
            assert_eq!(back.correct, base.correct, "{r}");
            assert_eq!(back.lapses, base.lapses, "{r}");
            assert_eq!(back.skipped, base.skipped, "{r}");
            assert_eq!(back.streak, 0, "{r}");
        }
    }

    #[test]
    fn revert_floors_at_zero() {
        let s = revert_rating(&StatsSnapshot::default(), Rating::Again);
        assert_eq!(s, StatsSnapshot::default());
    }
}
