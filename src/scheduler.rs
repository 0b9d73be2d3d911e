//! Cooperative frame-budget scheduler
//!
//! A single-threaded task runner with a soft deadline per time slice. Long
//! synchronous work (layout traversal, text tokenization) is expressed as a
//! [`FrameTask`] whose `step` performs one bounded unit and then yields; the
//! scheduler checks the clock between units and parks the remaining work at
//! the front of the queue when the budget runs out, so across slices the
//! tasks still complete strictly in enqueue order. There is no preemption
//! mid-unit and no second thread; state mutation happens only inside a unit,
//! which either completes or is never observed.

use log::warn;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Monotonic time source, injectable so slice behavior is testable
pub trait Clock {
    /// Time elapsed since the clock's epoch
    fn now(&self) -> Duration;
}

/// Real clock backed by `Instant`
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Result of one task unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More units remain; the scheduler may suspend here
    Yield,
    /// The task finished (or cancelled itself); drop it
    Done,
}

/// A resumable unit of frame work operating on the shared context `C`
pub trait FrameTask<C> {
    /// Run one bounded synchronous unit
    fn step(&mut self, cx: &mut C) -> Step;

    /// Short label for overrun diagnostics
    fn label(&self) -> &'static str {
        "task"
    }
}

/// FIFO queue of suspended continuations plus the per-slice deadline
pub struct FrameScheduler<C> {
    budget: Duration,
    clock: Box<dyn Clock>,
    queue: VecDeque<Box<dyn FrameTask<C>>>,
}

impl<C> FrameScheduler<C> {
    pub fn new(budget: Duration, clock: Box<dyn Clock>) -> Self {
        Self {
            budget,
            clock,
            queue: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, task: Box<dyn FrameTask<C>>) {
        self.queue.push_back(task);
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drop all queued work; used when the whole session is torn down
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Run one time slice: resume suspended continuations in enqueue order
    /// until the queue drains or the soft deadline passes. The interrupted
    /// task goes back to the front so enqueue order is preserved.
    pub fn run_slice(&mut self, cx: &mut C) {
        let start = self.clock.now();
        let deadline = start + self.budget;
        loop {
            // admit the next task only while the deadline has not passed; a
            // zero budget still runs exactly one unit per slice
            if self.clock.now() > deadline {
                return;
            }
            let Some(mut task) = self.queue.pop_front() else {
                return;
            };
            loop {
                let unit_start = self.clock.now();
                match task.step(cx) {
                    Step::Done => break,
                    Step::Yield => {
                        let now = self.clock.now();
                        let unit = now.saturating_sub(unit_start);
                        if unit > self.budget {
                            // a single unit blew the whole slice; degrades
                            // pacing but cannot corrupt state
                            warn!(
                                "scheduler: '{}' unit ran {}ms, over the {}ms slice",
                                task.label(),
                                unit.as_millis(),
                                self.budget.as_millis()
                            );
                        }
                        if now >= deadline {
                            self.queue.push_front(task);
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::Clock;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    /// Manually advanced clock shared between a test and the scheduler
    #[derive(Clone)]
    pub struct FakeClock {
        now: Rc<Cell<Duration>>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self {
                now: Rc::new(Cell::new(Duration::ZERO)),
            }
        }

        pub fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Duration {
            self.now.get()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::FakeClock;
    use super::*;

    /// Task that appends its tag once per unit and advances the fake clock
    /// to simulate work
    struct Recorder {
        tag: u32,
        units: u32,
        cost: Duration,
        clock: FakeClock,
    }

    impl FrameTask<Vec<u32>> for Recorder {
        fn step(&mut self, log: &mut Vec<u32>) -> Step {
            self.clock.advance(self.cost);
            log.push(self.tag);
            self.units -= 1;
            if self.units == 0 {
                Step::Done
            } else {
                Step::Yield
            }
        }
    }

    fn scheduler(budget_ms: u64, clock: &FakeClock) -> FrameScheduler<Vec<u32>> {
        FrameScheduler::new(Duration::from_millis(budget_ms), Box::new(clock.clone()))
    }

    #[test]
    fn tasks_complete_in_enqueue_order() {
        let clock = FakeClock::new();
        let mut sched = scheduler(100, &clock);
        for tag in [1, 2, 3] {
            sched.enqueue(Box::new(Recorder {
                tag,
                units: 2,
                cost: Duration::from_millis(1),
                clock: clock.clone(),
            }));
        }
        let mut log = Vec::new();
        sched.run_slice(&mut log);
        assert!(sched.is_idle());
        assert_eq!(log, [1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn deadline_suspends_and_resumes_front_task() {
        let clock = FakeClock::new();
        let mut sched = scheduler(10, &clock);
        sched.enqueue(Box::new(Recorder {
            tag: 1,
            units: 4,
            cost: Duration::from_millis(6),
            clock: clock.clone(),
        }));
        sched.enqueue(Box::new(Recorder {
            tag: 2,
            units: 1,
            cost: Duration::from_millis(1),
            clock: clock.clone(),
        }));

        let mut log = Vec::new();
        // first slice: two 6ms units of task 1 pass the 10ms deadline
        sched.run_slice(&mut log);
        assert_eq!(log, [1, 1]);
        assert_eq!(sched.pending(), 2);

        // task 1 resumes before task 2 is admitted; its completion lands
        // past the deadline, so task 2 waits for the next slice
        sched.run_slice(&mut log);
        assert_eq!(log, [1, 1, 1, 1]);
        assert_eq!(sched.pending(), 1);

        sched.run_slice(&mut log);
        assert_eq!(log, [1, 1, 1, 1, 2]);
        assert!(sched.is_idle());
    }

    #[test]
    fn single_overrunning_unit_is_tolerated() {
        let clock = FakeClock::new();
        let mut sched = scheduler(10, &clock);
        sched.enqueue(Box::new(Recorder {
            tag: 7,
            units: 2,
            cost: Duration::from_millis(50),
            clock: clock.clone(),
        }));
        let mut log = Vec::new();
        sched.run_slice(&mut log);
        // the unit completed despite the overrun; the rest of the task waits
        assert_eq!(log, [7]);
        assert_eq!(sched.pending(), 1);
        sched.run_slice(&mut log);
        assert_eq!(log, [7, 7]);
        assert!(sched.is_idle());
    }
}
