//! Millisecond timer table.
//!
//! The engine's cadence is three timers: the asset tick, the sensor
//! tick, and a one-shot restart. The scheduler owns their due times and
//! reports which ones fired; the engine decides what a firing means.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Scheduler                           │
//! │                                                          │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────────┐    │
//! │  │ AssetTick  │   │ SensorTick │   │ Restart        │    │
//! │  │ periodic   │   │ periodic   │   │ one-shot       │    │
//! │  └─────┬──────┘   └─────┬──────┘   └───────┬────────┘    │
//! │        └────────────────┼──────────────────┘             │
//! │                         ▼                                │
//! │                  poll(now) → fired ids                   │
//! │                         │                                │
//! │                         ▼                                │
//! │                  Engine::poll dispatch                   │
//! └──────────────────────────────────────────────────────────┘
//! ```

use log::{debug, info};

// ═══════════════════════════════════════════════════════════════
//  Timer types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    AssetTick,
    SensorTick,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Fire every `interval_ms`.
    Periodic { interval_ms: u32 },
    /// Fire once after `delay_ms`, then disarm.
    OneShot { delay_ms: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: TimerId,
    kind: ScheduleKind,
    due_ms: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// Maximum number of armed timers.
pub const MAX_TIMERS: usize = 4;

/// Ids fired by one [`Scheduler::poll`] call.
pub type Fired = heapless::Vec<TimerId, MAX_TIMERS>;

#[derive(Debug, Default)]
pub struct Scheduler {
    entries: heapless::Vec<Entry, MAX_TIMERS>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `id`, replacing any previous schedule for it. The first firing
    /// is one period (or the delay) after `now_ms`.
    pub fn arm(&mut self, id: TimerId, kind: ScheduleKind, now_ms: u64) {
        let first = match kind {
            ScheduleKind::Periodic { interval_ms } => interval_ms,
            ScheduleKind::OneShot { delay_ms } => delay_ms,
        };
        self.arm_at(id, kind, now_ms + u64::from(first));
    }

    /// Arm `id` with an explicit first due time.
    pub fn arm_at(&mut self, id: TimerId, kind: ScheduleKind, due_ms: u64) {
        self.cancel(id);
        info!("Scheduler: armed {:?} {:?}, first at {} ms", id, kind, due_ms);
        // Capacity equals the number of distinct ids.
        let _ = self.entries.push(Entry { id, kind, due_ms });
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.entries.retain(|e| e.id != id);
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Period of a periodic timer, if armed as one.
    pub fn interval(&self, id: TimerId) -> Option<u32> {
        self.entries.iter().find(|e| e.id == id).and_then(|e| match e.kind {
            ScheduleKind::Periodic { interval_ms } => Some(interval_ms),
            ScheduleKind::OneShot { .. } => None,
        })
    }

    /// Collect every timer due at `now_ms`, in arming order.
    ///
    /// Periodic timers re-arm one period later; a timer that fell more
    /// than a period behind skips the missed firings instead of bursting.
    /// One-shot timers are removed.
    pub fn poll(&mut self, now_ms: u64) -> Fired {
        let mut fired = Fired::new();
        for entry in &mut self.entries {
            if entry.due_ms > now_ms {
                continue;
            }
            let _ = fired.push(entry.id);
            if let ScheduleKind::Periodic { interval_ms } = entry.kind {
                let interval = u64::from(interval_ms.max(1));
                entry.due_ms += interval;
                if entry.due_ms <= now_ms {
                    debug!("Scheduler: {:?} behind schedule, skipping missed ticks", entry.id);
                    entry.due_ms = now_ms + interval;
                }
            }
        }
        self.entries
            .retain(|e| !(matches!(e.kind, ScheduleKind::OneShot { .. }) && fired.contains(&e.id)));
        fired
    }

    /// Earliest due time across armed timers.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.due_ms).min()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
