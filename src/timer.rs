//! Timer wheel (design §4.9): a min-heap of `(deadline, id)` with
//! one-shot/repeating semantics and O(1) cancellation via dead-marking.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

/// Stable handle returned by [`TimerWheel::set_timer`], usable with
/// [`TimerWheel::clear_timer`].
pub type TimerId = u64;

struct Record {
    interval: Duration,
    repeating: bool,
    callback: Box<dyn FnMut()>,
}

struct Entry {
    deadline: Duration,
    id: TimerId,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline.
        other.deadline.cmp(&self.deadline)
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Holds every live and recently-cancelled timer for one reactor.
#[derive(Default)]
pub struct TimerWheel {
    heap: BinaryHeap<Entry>,
    records: std::collections::HashMap<TimerId, Record>,
    next_id: TimerId,
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel::default()
    }

    /// Schedules `callback` to run after `interval` has elapsed from `now`,
    /// repeating every `interval` thereafter if `repeating` is set.
    pub fn set_timer(
        &mut self,
        now: Duration,
        interval: Duration,
        repeating: bool,
        callback: Box<dyn FnMut()>,
    ) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(
            id,
            Record {
                interval,
                repeating,
                callback,
            },
        );
        self.heap.push(Entry {
            deadline: now + interval,
            id,
        });
        id
    }

    /// Drops the id→record entry; the heap entry is left in place and
    /// skipped at pop time once its lookup misses (design §4.9 "Cancel is
    /// O(1)").
    pub fn clear_timer(&mut self, id: TimerId) {
        self.records.remove(&id);
    }

    /// Pops and invokes every timer whose deadline is `<= now`, re-inserting
    /// repeating ones at `now + interval`.
    pub fn fire_due(&mut self, now: Duration) {
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry");
            let repeat_interval = match self.records.get_mut(&entry.id) {
                None => continue,
                Some(record) => {
                    (record.callback)();
                    if record.repeating {
                        Some(record.interval)
                    } else {
                        None
                    }
                }
            };
            match repeat_interval {
                Some(interval) => self.heap.push(Entry {
                    deadline: now + interval,
                    id: entry.id,
                }),
                None => {
                    self.records.remove(&entry.id);
                }
            }
        }
    }

    /// Time until the nearest live deadline, for the reactor's readiness
    /// wait timeout; `None` if no timers are pending.
    pub fn next_deadline(&self, now: Duration) -> Option<Duration> {
        self.heap
            .peek()
            .map(|entry| entry.deadline.saturating_sub(now))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for TimerWheel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerWheel")
            .field("pending", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fires_due_timer_exactly_once() {
        let mut wheel = TimerWheel::new();
        let fired = Rc::new(RefCell::new(0));
        let fired_cb = fired.clone();
        wheel.set_timer(
            Duration::from_secs(0),
            Duration::from_secs(1),
            false,
            Box::new(move || *fired_cb.borrow_mut() += 1),
        );
        wheel.fire_due(Duration::from_secs(2));
        assert_eq!(*fired.borrow(), 1);
        wheel.fire_due(Duration::from_secs(3));
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn repeating_timer_reinserts() {
        let mut wheel = TimerWheel::new();
        let fired = Rc::new(RefCell::new(0));
        let fired_cb = fired.clone();
        wheel.set_timer(
            Duration::from_secs(0),
            Duration::from_secs(1),
            true,
            Box::new(move || *fired_cb.borrow_mut() += 1),
        );
        wheel.fire_due(Duration::from_secs(1));
        wheel.fire_due(Duration::from_secs(2));
        wheel.fire_due(Duration::from_secs(3));
        assert_eq!(*fired.borrow(), 3);
    }

    #[test]
    fn cleared_timer_never_fires() {
        let mut wheel = TimerWheel::new();
        let fired = Rc::new(RefCell::new(0));
        let fired_cb = fired.clone();
        let id = wheel.set_timer(
            Duration::from_secs(0),
            Duration::from_secs(1),
            false,
            Box::new(move || *fired_cb.borrow_mut() += 1),
        );
        wheel.clear_timer(id);
        wheel.fire_due(Duration::from_secs(5));
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn next_deadline_reflects_earliest_pending() {
        let mut wheel = TimerWheel::new();
        wheel.set_timer(Duration::from_secs(0), Duration::from_secs(5), false, Box::new(|| {}));
        wheel.set_timer(Duration::from_secs(0), Duration::from_secs(2), false, Box::new(|| {}));
        assert_eq!(wheel.next_deadline(Duration::from_secs(0)), Some(Duration::from_secs(2)));
    }
}
