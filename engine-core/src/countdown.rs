use crate::model::{remaining_secs, AuctionId, TimestampSecs};
use crate::reconcile::CountdownDisplay;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct Entry {
    end_time: TimestampSecs,
    /// Seen open (remaining > 0, not ended) and expiry not yet reported.
    armed: bool,
    /// Expiry already reported once; never reported again for this id.
    fired: bool,
}

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub displays: Vec<(AuctionId, CountdownDisplay)>,
    /// Auctions whose remaining time reached zero on this tick.
    pub expired: Vec<AuctionId>,
}

/// Per-auction remaining time, computed only from cached end times.
#[derive(Debug, Default)]
pub struct Countdown {
    entries: BTreeMap<AuctionId, Entry>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the tracked set with the currently rendered auctions.
    ///
    /// Ids that stay tracked keep their fired state, so a fresh snapshot of an
    /// auction that already expired locally does not report it again.
    pub fn track<I>(&mut self, items: I, now: TimestampSecs)
    where
        I: IntoIterator<Item = (AuctionId, TimestampSecs, bool)>,
    {
        let mut next = BTreeMap::new();
        for (id, end_time, ended) in items {
            let prev = self.entries.get(&id);
            let fired = prev.map(|e| e.fired).unwrap_or(false);
            let was_armed = prev.map(|e| e.armed).unwrap_or(false);
            let open_now = !ended && remaining_secs(end_time, now) > 0;
            next.insert(
                id,
                Entry {
                    end_time,
                    armed: !ended && !fired && (open_now || was_armed),
                    fired,
                },
            );
        }
        self.entries = next;
    }

    pub fn tick(&mut self, now: TimestampSecs) -> TickOutcome {
        let mut out = TickOutcome::default();
        for (id, entry) in self.entries.iter_mut() {
            let remaining = remaining_secs(entry.end_time, now);
            out.displays
                .push((*id, CountdownDisplay::from_remaining(remaining)));
            if entry.armed && remaining <= 0 {
                entry.armed = false;
                entry.fired = true;
                out.expired.push(*id);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: TimestampSecs = 1_000;

    #[test]
    fn five_second_auction_expires_once() {
        let mut c = Countdown::new();
        c.track([(1, NOW + 5, false)], NOW);

        let mut fired = 0;
        let mut last = None;
        for step in 1..=5 {
            let out = c.tick(NOW + step);
            fired += out.expired.len();
            last = out.displays.first().map(|(_, d)| *d);
        }
        assert_eq!(last, Some(CountdownDisplay::Ended));
        assert_eq!(fired, 1);

        for step in 6..=10 {
            assert!(c.tick(NOW + step).expired.is_empty());
        }
    }

    #[test]
    fn counts_down_before_expiry() {
        let mut c = Countdown::new();
        c.track([(4, NOW + 3, false)], NOW);
        let out = c.tick(NOW + 1);
        assert_eq!(out.displays, vec![(4, CountdownDisplay::Remaining(2))]);
        assert!(out.expired.is_empty());
    }

    #[test]
    fn skipped_ticks_still_fire() {
        let mut c = Countdown::new();
        c.track([(1, NOW + 2, false)], NOW);
        assert_eq!(c.tick(NOW + 9).expired, vec![1]);
    }

    #[test]
    fn already_expired_or_ended_never_fires() {
        let mut c = Countdown::new();
        c.track([(1, NOW - 10, false), (2, NOW + 10, true)], NOW);
        for step in 0..20 {
            assert!(c.tick(NOW + step).expired.is_empty());
        }
    }

    #[test]
    fn retrack_keeps_fired_state() {
        let mut c = Countdown::new();
        c.track([(1, NOW + 1, false)], NOW);
        assert_eq!(c.tick(NOW + 1).expired, vec![1]);

        c.track([(1, NOW + 1, false), (2, NOW + 5, false)], NOW + 1);
        assert!(c.tick(NOW + 2).expired.is_empty());
        assert_eq!(c.len(), 2);
        assert_eq!(c.tick(NOW + 5).expired, vec![2]);
    }

    #[test]
    fn retrack_after_deadline_keeps_armed_entry() {
        let mut c = Countdown::new();
        c.track([(1, NOW + 2, false)], NOW);
        // snapshot replaced after the deadline passed but before the next tick
        c.track([(1, NOW + 2, false)], NOW + 3);
        assert_eq!(c.tick(NOW + 3).expired, vec![1]);
    }

    #[test]
    fn far_future_end_time_never_expires() {
        let mut c = Countdown::new();
        c.track([(1, 1 << 63, false), (2, u64::MAX, false)], NOW);
        let out = c.tick(NOW + 5);
        assert!(out.expired.is_empty());
        assert!(out
            .displays
            .iter()
            .all(|(_, d)| *d == CountdownDisplay::Remaining(i64::MAX as u64)));
    }

    #[test]
    fn dropped_auctions_stop_being_tracked() {
        let mut c = Countdown::new();
        c.track([(1, NOW + 2, false)], NOW);
        c.track(std::iter::empty(), NOW);
        assert!(c.is_empty());
        assert!(c.tick(NOW + 3).displays.is_empty());
    }
}
