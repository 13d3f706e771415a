use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// 時間來源。 / Source of the current instant.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// 系統時鐘。 / Wall clock backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 手動推進的時鐘，複本共享同一時間。 / Manually advanced clock; clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    /// 設定自建立後經過的時間。 / Jumps to an absolute offset from creation.
    pub fn set_elapsed(&self, elapsed: Duration) {
        self.elapsed.set(elapsed);
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.elapsed.get())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }
}

/// 單一可取消計時器：重新排程即取代先前的期限。 / Single-slot cancellable timer.
///
/// `schedule` overwrites the pending deadline, so at most one fire is ever
/// outstanding and a superseded deadline can never fire.
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
    generation: u64,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            generation: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 重新開始計時並回傳新的世代編號。 / Restarts the countdown, returning the new generation.
    pub fn schedule(&mut self, now: Instant) -> u64 {
        self.generation += 1;
        self.deadline = Some(now + self.delay);
        self.generation
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// 到期時消耗計時器並回傳世代。 / Consumes the pending deadline once it is due.
    pub fn fire_if_due(&mut self, now: Instant) -> Option<u64> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(self.generation)
            }
            _ => None,
        }
    }
}
