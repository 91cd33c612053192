use tokio::time::{Duration, Instant};

/// Debounce state for the local save.
///
/// Every mutation cancels the pending deadline and reschedules it one quiet
/// period later, so a burst of edits collapses into a single write. The
/// caller supplies `now`, which keeps the timing testable.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    quiet: Duration,
    due: Option<Instant>,
    dirty: bool,
    burst: u32,
    generation: u64,
}

impl PendingWrite {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            due: None,
            dirty: false,
            burst: 0,
            generation: 0,
        }
    }

    /// Cancel-and-reschedule. Returns the new deadline.
    pub fn schedule(&mut self, now: Instant) -> Instant {
        let due = now + self.quiet;
        self.due = Some(due);
        self.dirty = true;
        self.burst += 1;
        self.generation += 1;
        due
    }

    /// Bumped by every `schedule`. A write records the generation it
    /// snapshotted and hands it back to `mark_saved` or `mark_failed`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due
    }

    /// True when there are edits not yet written, whether or not a deadline
    /// is armed (a failed save leaves the data dirty but unarmed).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.due, Some(due) if due <= now)
    }

    /// Disarms the deadline if it has passed. The caller must then write and
    /// report the result through `mark_saved` or `mark_failed`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.due = None;
            true
        } else {
            false
        }
    }

    /// Disarms regardless of the deadline, for an explicit flush.
    pub fn take_dirty(&mut self) -> bool {
        if self.dirty {
            self.due = None;
            true
        } else {
            false
        }
    }

    /// Number of edits collapsed into the write that is about to happen.
    pub fn burst_len(&self) -> u32 {
        self.burst
    }

    /// Clean only if no edit arrived after the snapshot was taken; a newer
    /// edit has already armed its own deadline.
    pub fn mark_saved(&mut self, written: u64) {
        if written == self.generation {
            self.dirty = false;
            self.burst = 0;
        }
    }

    /// Stays dirty; the next mutation or flush retries.
    pub fn mark_failed(&mut self, attempted: u64) {
        if attempted == self.generation {
            self.due = None;
        }
    }

    pub fn cancel(&mut self) {
        self.due = None;
        self.dirty = false;
        self.burst = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(1000);

    #[test]
    fn rescheduling_pushes_the_deadline_out() {
        let t0 = Instant::now();
        let mut pending = PendingWrite::new(QUIET);
        pending.schedule(t0);
        pending.schedule(t0 + Duration::from_millis(600));

        assert!(!pending.take_due(t0 + Duration::from_millis(1000)));
        assert!(pending.take_due(t0 + Duration::from_millis(1600)));
        assert!(!pending.take_due(t0 + Duration::from_millis(5000)));
    }

    #[test]
    fn a_burst_is_one_write() {
        let t0 = Instant::now();
        let mut pending = PendingWrite::new(QUIET);
        for i in 0..10 {
            pending.schedule(t0 + Duration::from_millis(i * 50));
        }
        assert_eq!(pending.burst_len(), 10);
        let mut writes = 0;
        for ms in (0..3000).step_by(100) {
            if pending.take_due(t0 + Duration::from_millis(ms)) {
                writes += 1;
                pending.mark_saved(pending.generation());
            }
        }
        assert_eq!(writes, 1);
        assert!(!pending.is_dirty());
    }

    #[test]
    fn failed_write_waits_for_the_next_trigger() {
        let t0 = Instant::now();
        let mut pending = PendingWrite::new(QUIET);
        pending.schedule(t0);
        assert!(pending.take_due(t0 + QUIET));
        pending.mark_failed(pending.generation());

        assert!(pending.is_dirty());
        assert!(pending.deadline().is_none());
        assert!(!pending.take_due(t0 + QUIET * 10));
        assert!(pending.take_dirty());
    }

    #[test]
    fn edit_during_a_write_stays_dirty() {
        let t0 = Instant::now();
        let mut pending = PendingWrite::new(QUIET);
        pending.schedule(t0);
        assert!(pending.take_dirty());
        let written = pending.generation();

        let rearmed = pending.schedule(t0 + Duration::from_millis(10));
        pending.mark_saved(written);
        assert!(pending.is_dirty());
        assert_eq!(pending.deadline(), Some(rearmed));

        pending.mark_failed(written);
        assert_eq!(pending.deadline(), Some(rearmed));

        assert!(pending.take_due(rearmed));
        pending.mark_saved(pending.generation());
        assert!(!pending.is_dirty());
    }

    #[test]
    fn cancel_forgets_everything() {
        let mut pending = PendingWrite::new(QUIET);
        pending.schedule(Instant::now());
        pending.cancel();
        assert!(!pending.is_dirty());
        assert!(!pending.take_dirty());
    }
}
