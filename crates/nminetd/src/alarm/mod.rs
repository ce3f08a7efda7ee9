//! Alarm correlation engine.
//!
//! Each cycle the engine evaluates every redundancy group with the
//! strategy matching its shape, feeds the result through the
//! [`AlarmProcessor`] and hands back the batch of changes to publish.

pub mod processor;
pub mod strategy;
pub mod types;

pub use processor::{AlarmCycle, AlarmLatch, AlarmProcessor, LatchStatus};
pub use strategy::{AlarmContext, AlarmStrategy, GroupShape, PortFacts, Raise};
pub use types::{
    Alarm, AlarmAction, AlarmDescriptor, AlarmKey, AlarmKind, AlarmLevel, AlarmObject,
    Notification,
};

use crate::config::PlatformConfig;
use nminet_types::{PortId, RedundancyGroup};
use std::collections::HashMap;
use tracing::{debug, error, instrument};

/// Object of daemon-internal events.
pub const INTERNAL_OBJECT: &str = "NMI";

/// Stateful alarm engine owned by the worker.
#[derive(Debug)]
pub struct AlarmEngine {
    processor: AlarmProcessor,
    platform: PlatformConfig,
    previous: HashMap<PortId, PortFacts>,
}

impl AlarmEngine {
    pub fn new(platform: PlatformConfig) -> Self {
        Self {
            processor: AlarmProcessor::new(),
            platform,
            previous: HashMap::new(),
        }
    }

    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    pub fn processor(&self) -> &AlarmProcessor {
        &self.processor
    }

    /// Runs one alarm cycle over `groups`.
    #[instrument(skip_all, fields(groups = groups.len()))]
    pub fn process(&mut self, groups: &[RedundancyGroup<'_>]) -> Vec<Notification> {
        let ctx = AlarmContext {
            platform: &self.platform,
            previous: &self.previous,
        };

        let mut cycle = self.processor.cycle();
        for group in groups {
            let Some(shape) = GroupShape::of(group) else {
                error!(
                    primary = group.primary().id,
                    redundancy_type = %group.redundancy_type(),
                    mode = %group.redundancy_mode(),
                    "Unsupported redundancy configuration, group skipped"
                );
                continue;
            };

            for raise in shape.evaluate(group, &ctx) {
                match raise {
                    Raise::Alarm(alarm, on) => cycle.alarm(alarm, on),
                    Raise::Event(alarm) => cycle.event(alarm),
                }
            }
        }
        let batch = cycle.finish();

        self.previous = groups
            .iter()
            .flat_map(|g| g.members().iter().map(|p| (p.id, PortFacts::from(*p))))
            .collect();

        debug!(
            notifications = batch.len(),
            active = self.processor.active_count(),
            "Alarm cycle complete"
        );
        batch
    }

    /// Takes the batch of a cycle cut short by a fault.
    pub fn take_unflushed(&mut self) -> Vec<Notification> {
        self.processor.take_unflushed()
    }

    /// Event published when addressing configuration was changed.
    pub fn ip_configuration_changed() -> Notification {
        Notification::new(
            AlarmAction::Event,
            Alarm::new(
                AlarmKind::IpConfigurationChanged,
                Some(AlarmObject::Named(INTERNAL_OBJECT)),
            ),
        )
    }
}
