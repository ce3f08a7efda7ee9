//! Alarm latching and batch assembly.
//!
//! The processor remembers the last status of every alarm it has seen and
//! turns one cycle's raises into the minimal batch of changes:
//!
//! 1. An alarm raised with its latched status is dropped, unless it is On
//!    and its description changed.
//! 2. A mergeable alarm raised Off after being raised earlier in the same
//!    cycle keeps its earlier status; later raises replace pending entries.
//! 3. At the end of the cycle, latches not raised this cycle are removed
//!    and, if On, remitted.
//! 4. The batch is sorted by kind order; mergeable entries that net to the
//!    status held at cycle start are dropped.

use super::types::{Alarm, AlarmAction, AlarmKey, Notification};
use std::collections::{BTreeMap, HashSet};
use std::ops::{Deref, DerefMut};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatchStatus {
    On,
    Off,
}

impl LatchStatus {
    pub fn from_on(on: bool) -> Self {
        if on {
            LatchStatus::On
        } else {
            LatchStatus::Off
        }
    }

    pub fn action(self) -> AlarmAction {
        match self {
            LatchStatus::On => AlarmAction::AlarmOn,
            LatchStatus::Off => AlarmAction::AlarmOff,
        }
    }
}

/// Last known status and payload of one alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmLatch {
    pub status: LatchStatus,
    pub alarm: Alarm,
}

/// Process-wide alarm memory.
#[derive(Debug, Default)]
pub struct AlarmProcessor {
    latches: BTreeMap<AlarmKey, AlarmLatch>,
    at_start: BTreeMap<AlarmKey, LatchStatus>,
    seen: HashSet<AlarmKey>,
    plan: Vec<Notification>,
    /// Output of a cycle closed without being finished.
    unflushed: Vec<Notification>,
}

impl AlarmProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latch(&self, key: &AlarmKey) -> Option<&AlarmLatch> {
        self.latches.get(key)
    }

    /// Number of alarms currently latched On.
    pub fn active_count(&self) -> usize {
        self.latches
            .values()
            .filter(|l| l.status == LatchStatus::On)
            .count()
    }

    /// Takes the batch of a cycle that was closed without being finished.
    pub fn take_unflushed(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.unflushed)
    }

    /// Opens a cycle. The cycle is closed when the returned guard is
    /// finished or dropped.
    pub fn cycle(&mut self) -> AlarmCycle<'_> {
        self.process_start();
        AlarmCycle {
            processor: self,
            finished: false,
        }
    }

    fn process_start(&mut self) {
        self.seen.clear();
        self.plan.clear();
        self.at_start = self
            .latches
            .iter()
            .map(|(key, latch)| (key.clone(), latch.status))
            .collect();
    }

    fn add_plan(&mut self, action: AlarmAction, alarm: Alarm) {
        if alarm.descriptor().merge {
            let key = alarm.key();
            self.plan.retain(|n| n.alarm.key() != key);
        }
        self.plan.push(Notification::new(action, alarm));
    }

    /// Raises `alarm` with the given status.
    pub fn alarm(&mut self, alarm: Alarm, on: bool) {
        let key = alarm.key();
        let status = LatchStatus::from_on(on);
        let merge = alarm.descriptor().merge;

        let (is_new, mut do_update) = match self.latches.get(&key) {
            None => (true, true),
            Some(latch) => {
                let unchanged = latch.status == status;
                let merged_off = !unchanged && merge && !on && self.seen.contains(&key);
                let mut do_update = !(unchanged || merged_off);
                if !do_update && on && latch.alarm.description() != alarm.description() {
                    do_update = true;
                }
                (false, do_update)
            }
        };
        if is_new {
            do_update = true;
        }

        self.seen.insert(key.clone());

        if do_update {
            self.latches.insert(
                key,
                AlarmLatch {
                    status,
                    alarm: alarm.clone(),
                },
            );
            // A brand new alarm that starts Off has nothing to clear.
            if !(is_new && !on) {
                self.add_plan(status.action(), alarm);
            }
        }
    }

    /// Raises a one-shot event.
    pub fn event(&mut self, alarm: Alarm) {
        self.add_plan(AlarmAction::Event, alarm);
    }

    fn process_end(&mut self) -> Vec<Notification> {
        let orphans: Vec<AlarmKey> = self
            .latches
            .keys()
            .filter(|key| !self.seen.contains(*key))
            .cloned()
            .collect();

        for key in orphans {
            if let Some(latch) = self.latches.remove(&key) {
                if latch.status == LatchStatus::On {
                    info!(alarm = %key, "Remitting orphaned alarm");
                    self.add_plan(AlarmAction::AlarmOff, latch.alarm);
                } else {
                    debug!(alarm = %key, "Forgetting orphaned alarm");
                }
            }
        }

        self.plan.sort_by_key(|n| n.alarm.descriptor().order);

        let plan = std::mem::take(&mut self.plan);
        let at_start = &self.at_start;
        let batch: Vec<Notification> = plan
            .into_iter()
            .filter(|n| {
                if !n.alarm.descriptor().merge {
                    return true;
                }
                let unchanged = at_start
                    .get(&n.alarm.key())
                    .is_some_and(|status| status.action() == n.action);
                if unchanged {
                    debug!(alarm = %n.alarm.key(), "Dropping merged no-op");
                }
                !unchanged
            })
            .collect();

        self.seen.clear();
        batch
    }
}

/// An open alarm cycle.
///
/// Dropping the guard without [`AlarmCycle::finish`] still closes the
/// cycle; its batch is held back and prepended to the next finished one.
#[derive(Debug)]
pub struct AlarmCycle<'a> {
    processor: &'a mut AlarmProcessor,
    finished: bool,
}

impl AlarmCycle<'_> {
    /// Closes the cycle and returns the batch to deliver.
    pub fn finish(mut self) -> Vec<Notification> {
        self.finished = true;
        let mut batch = std::mem::take(&mut self.processor.unflushed);
        batch.extend(self.processor.process_end());
        batch
    }
}

impl Deref for AlarmCycle<'_> {
    type Target = AlarmProcessor;

    fn deref(&self) -> &Self::Target {
        &*self.processor
    }
}

impl DerefMut for AlarmCycle<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.processor
    }
}

impl Drop for AlarmCycle<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Alarm cycle closed before completion");
            let batch = self.processor.process_end();
            self.processor.unflushed.extend(batch);
        }
    }
}
