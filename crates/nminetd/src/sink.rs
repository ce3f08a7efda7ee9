//! Notification delivery.
//!
//! The worker hands every non-empty alarm batch to a [`NotificationSink`].
//! A batch is delivered as a whole, in order, followed by a commit.

use crate::alarm::{AlarmAction, Notification};
use crate::error::{NetMgrError, Result};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Receiver of alarm batches.
pub trait NotificationSink: Send {
    fn deliver(&mut self, batch: &[Notification]) -> Result<()>;
}

/// Writes each notification to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&mut self, batch: &[Notification]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        for notification in batch {
            info!(
                action = %notification.action,
                alarm = %notification.alarm.key(),
                "{}",
                notification.alarm.render()
            );
        }
        debug!(count = batch.len(), "Batch committed");
        Ok(())
    }
}

/// Writes one JSON object per line, closing each batch with a commit
/// record.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn record(notification: &Notification) -> Value {
        let alarm = &notification.alarm;
        let descriptor = alarm.descriptor();
        let params: Map<String, Value> = alarm
            .params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "action": notification.action,
            "name": descriptor.name,
            "title": descriptor.title,
            "level": descriptor.level,
            "source": descriptor.source,
            "object": alarm.object,
            "description": alarm.render(),
            "params": params,
        })
    }

    fn write_line(&mut self, value: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value)
            .map_err(|e| NetMgrError::Delivery(e.to_string()))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write + Send> NotificationSink for JsonLinesSink<W> {
    fn deliver(&mut self, batch: &[Notification]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        for notification in batch {
            let record = Self::record(notification);
            self.write_line(&record)?;
        }
        self.write_line(&json!({ "action": "COMMIT" }))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every delivered batch; the handle stays readable after the sink
/// has moved into the worker.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<Notification>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches delivered so far.
    pub fn batches(&self) -> Vec<Vec<Notification>> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// Every delivered notification rendered as `ACTION key`.
    pub fn lines(&self) -> Vec<String> {
        self.batches()
            .iter()
            .flatten()
            .map(|n| format!("{} {}", n.action, n.alarm.key()))
            .collect()
    }

    /// Number of notifications with the given action.
    pub fn count(&self, action: AlarmAction) -> usize {
        self.batches()
            .iter()
            .flatten()
            .filter(|n| n.action == action)
            .count()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&mut self, batch: &[Notification]) -> Result<()> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| NetMgrError::Delivery("recording sink poisoned".to_string()))?;
        batches.push(batch.to_vec());
        Ok(())
    }
}
