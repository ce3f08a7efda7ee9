//! Single worker driving the redundancy core.
//!
//! Producers submit [`Request`]s through a [`WorkerHandle`]; the worker
//! processes them one at a time in arrival order. Each interface update
//! runs a full cycle:
//!
//! 1. Fill missing platform object ids.
//! 2. Annotate every port with its redundancy status.
//! 3. Partition ports into redundancy groups.
//! 4. Run the automatic revert state machines.
//! 5. Run the alarm engine and deliver the batch.
//! 6. Keep the facts the next revert command needs.
//! 7. Post revert requests back onto the queue.
//!
//! All cross-cycle state lives in [`NetMgrWorker`]; nothing here is shared.

use crate::alarm::{AlarmEngine, Notification};
use crate::config::{NetMgrConfig, PlatformConfig};
use crate::driver::PortSelectionDriver;
use crate::error::{NetMgrError, Result};
use crate::revert::{RevertMonitor, RevertRequest};
use crate::selector::ActivePortSelector;
use crate::sink::NotificationSink;
use nminet_types::{
    group_by_redundancy, NetSnapshot, PortId, PortSnapshot, RedundancyMode, RedundancyStatus,
    RedundancyType,
};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

/// Work accepted by the worker.
#[derive(Debug, Clone)]
pub enum Request {
    /// New interface snapshot from the collector.
    UpdateInterfaces(NetSnapshot),
    /// Operator selection of the active port of an ActiveActive group.
    SelectActive(PortId),
    /// Team settings of the port's group changed; recompute on next query.
    GroupTouched(PortId),
    /// Operator revert; `None` means every eligible primary.
    RevertToPrimary(Option<Vec<PortId>>),
    /// Revert requested by the revert state machines.
    RevertInterface(Vec<PortId>),
    /// Team configuration was rewritten.
    Reconfigured,
    Stop,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::UpdateInterfaces(_) => "update_interfaces",
            Request::SelectActive(_) => "select_active",
            Request::GroupTouched(_) => "group_touched",
            Request::RevertToPrimary(_) => "revert_to_primary",
            Request::RevertInterface(_) => "revert_interface",
            Request::Reconfigured => "reconfigured",
            Request::Stop => "stop",
        }
    }
}

/// Outcome of one interface update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub notifications: Vec<Notification>,
    pub reverts: Vec<RevertRequest>,
    pub statuses: BTreeMap<PortId, RedundancyStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Cycle(CycleReport),
    Selected(bool),
    Reverted(Vec<PortId>),
    Done,
}

pub type Reply = oneshot::Receiver<Result<Response>>;

#[derive(Debug)]
struct Message {
    request: Request,
    reply: Option<oneshot::Sender<Result<Response>>>,
}

/// Cloneable submission side of the worker queue.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Message>,
}

impl WorkerHandle {
    /// Queues `request` and returns the receiver of its reply.
    pub async fn submit(&self, request: Request) -> Result<Reply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message {
                request,
                reply: Some(reply),
            })
            .await
            .map_err(|_| NetMgrError::QueueClosed)?;
        Ok(rx)
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let rx = self.submit(request).await?;
        rx.await.map_err(|_| NetMgrError::QueueClosed)?
    }

    pub async fn update_interfaces(&self, snapshot: NetSnapshot) -> Result<CycleReport> {
        match self.call(Request::UpdateInterfaces(snapshot)).await? {
            Response::Cycle(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    /// Queues a snapshot without waiting for the cycle.
    pub async fn post_interfaces(&self, snapshot: NetSnapshot) -> Result<()> {
        self.tx
            .send(Message {
                request: Request::UpdateInterfaces(snapshot),
                reply: None,
            })
            .await
            .map_err(|_| NetMgrError::QueueClosed)
    }

    pub async fn select_active(&self, port: PortId) -> Result<bool> {
        match self.call(Request::SelectActive(port)).await? {
            Response::Selected(selected) => Ok(selected),
            other => Err(unexpected(other)),
        }
    }

    pub async fn group_touched(&self, port: PortId) -> Result<()> {
        self.call(Request::GroupTouched(port)).await.map(|_| ())
    }

    /// Returns the primaries that were reverted.
    pub async fn revert_to_primary(&self, ports: Option<Vec<PortId>>) -> Result<Vec<PortId>> {
        match self.call(Request::RevertToPrimary(ports)).await? {
            Response::Reverted(ports) => Ok(ports),
            other => Err(unexpected(other)),
        }
    }

    pub async fn reconfigured(&self) -> Result<()> {
        self.call(Request::Reconfigured).await.map(|_| ())
    }

    /// Stops the worker; requests still queued behind it fail.
    pub async fn stop(&self) -> Result<()> {
        self.call(Request::Stop).await.map(|_| ())
    }
}

/// Decodes one snapshot as sent by the collector.
pub fn decode_snapshot(line: &str) -> Result<NetSnapshot> {
    Ok(serde_json::from_str(line)?)
}

fn fault_reason(fault: &(dyn Any + Send)) -> String {
    if let Some(s) = fault.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = fault.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown fault".to_string()
    }
}

fn unexpected(response: Response) -> NetMgrError {
    NetMgrError::internal(format!("unexpected response {:?}", response))
}

/// Per-port facts the revert command needs between cycles.
#[derive(Debug, Clone, Copy)]
struct RevertFacts {
    enabled: bool,
    has_followers: bool,
    redundancy_type: RedundancyType,
    redundancy_mode: RedundancyMode,
    redundancy_status: RedundancyStatus,
}

impl From<&PortSnapshot> for RevertFacts {
    fn from(port: &PortSnapshot) -> Self {
        Self {
            enabled: port.enabled,
            has_followers: port.has_followers(),
            redundancy_type: port.redundancy_type,
            redundancy_mode: port.redundancy_mode,
            redundancy_status: port.redundancy_status,
        }
    }
}

impl RevertFacts {
    fn eligible(&self) -> bool {
        self.enabled
            && self.has_followers
            && self.redundancy_status == RedundancyStatus::Inactive
            && self.redundancy_mode == RedundancyMode::Automatic
    }
}

/// Owner of the selector, revert monitor and alarm engine.
pub struct NetMgrWorker {
    rx: mpsc::Receiver<Message>,
    requeue: mpsc::WeakSender<Message>,
    platform: PlatformConfig,
    selector: ActivePortSelector,
    revert: RevertMonitor,
    alarms: AlarmEngine,
    sink: Box<dyn NotificationSink>,
    driver: Box<dyn PortSelectionDriver>,
    ports: HashMap<PortId, RevertFacts>,
}

impl NetMgrWorker {
    pub fn new(
        config: &NetMgrConfig,
        sink: Box<dyn NotificationSink>,
        driver: Box<dyn PortSelectionDriver>,
    ) -> (Self, WorkerHandle) {
        let (tx, rx) = mpsc::channel(config.worker.queue_depth.max(1));
        let worker = Self {
            rx,
            requeue: tx.downgrade(),
            platform: config.platform.clone(),
            selector: ActivePortSelector::new(),
            revert: RevertMonitor::new(
                config.revert_timeout(),
                config.redundancy.revert_step_limit,
            ),
            alarms: AlarmEngine::new(config.platform.clone()),
            sink,
            driver,
            ports: HashMap::new(),
        };
        (worker, WorkerHandle { tx })
    }

    pub fn selector(&self) -> &ActivePortSelector {
        &self.selector
    }

    pub fn revert_monitor(&self) -> &RevertMonitor {
        &self.revert
    }

    /// Processes requests until stopped or every handle is dropped.
    pub async fn run(mut self) {
        info!("Worker started");

        while let Some(message) = self.rx.recv().await {
            if let Request::Stop = message.request {
                info!("Stop requested");
                if let Some(reply) = message.reply {
                    let _ = reply.send(Ok(Response::Done));
                }
                self.drain().await;
                break;
            }

            let kind = message.request.kind();
            let request = message.request;
            let result = match panic::catch_unwind(AssertUnwindSafe(|| self.handle(request))) {
                Ok(result) => result,
                Err(fault) => {
                    let reason = fault_reason(fault.as_ref());
                    error!(request = kind, %reason, "Request aborted by fault");
                    self.flush_interrupted();
                    Err(NetMgrError::request_failed(kind, reason))
                }
            };
            match message.reply {
                Some(reply) => {
                    if reply.send(result).is_err() {
                        debug!(request = kind, "Requester went away");
                    }
                }
                None => {
                    if let Err(e) = result {
                        warn!(request = kind, error = %e, "Request failed");
                    }
                }
            }
        }

        info!("Worker stopped");
    }

    async fn drain(&mut self) {
        self.rx.close();
        let mut failed = 0;
        while let Some(message) = self.rx.recv().await {
            failed += 1;
            if let Some(reply) = message.reply {
                let _ = reply.send(Err(NetMgrError::request_failed(
                    message.request.kind(),
                    "worker stopped",
                )));
            }
        }
        if failed > 0 {
            warn!(failed, "Failed queued requests on stop");
        }
    }

    /// Delivers what an interrupted alarm cycle had already decided.
    fn flush_interrupted(&mut self) {
        let batch = self.alarms.take_unflushed();
        if !batch.is_empty() {
            warn!(count = batch.len(), "Delivering batch of interrupted cycle");
            self.deliver(&batch);
        }
    }

    fn handle(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::UpdateInterfaces(snapshot) => {
                Ok(Response::Cycle(self.process_cycle(snapshot, Instant::now())))
            }
            Request::SelectActive(port) => Ok(Response::Selected(self.selector.set_active(port))),
            Request::GroupTouched(port) => {
                self.selector.group_touched(port);
                Ok(Response::Done)
            }
            Request::RevertToPrimary(ports) => {
                Ok(Response::Reverted(self.revert_to_primary(ports.as_deref())))
            }
            Request::RevertInterface(ports) => {
                Ok(Response::Reverted(self.revert_to_primary(Some(ports.as_slice()))))
            }
            Request::Reconfigured => {
                self.reconfigured();
                Ok(Response::Done)
            }
            Request::Stop => Err(NetMgrError::internal("stop handled outside the queue")),
        }
    }

    /// Runs one full cycle over `snapshot`, observed at `now`.
    #[instrument(skip_all, fields(ports = snapshot.len()))]
    pub fn process_cycle(&mut self, mut snapshot: NetSnapshot, now: Instant) -> CycleReport {
        for port in snapshot.values_mut() {
            if port.platform_object_id.is_empty() {
                port.platform_object_id = self.platform.platform_object_id(port.id);
            }
        }

        self.selector.annotate(&mut snapshot);

        let groups = group_by_redundancy(&snapshot);
        let reverts = self.revert.interfaces_updated(&groups, now);
        let notifications = self.alarms.process(&groups);
        self.deliver(&notifications);

        self.ports = snapshot
            .values()
            .map(|p| (p.id, RevertFacts::from(p)))
            .collect();
        let statuses = snapshot
            .values()
            .map(|p| (p.id, p.redundancy_status))
            .collect();

        if !reverts.is_empty() {
            self.post_revert(reverts.iter().map(|r| r.primary).collect());
        }

        CycleReport {
            notifications,
            reverts,
            statuses,
        }
    }

    fn deliver(&mut self, batch: &[Notification]) {
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.sink.deliver(batch) {
            error!(error = %e, count = batch.len(), "Failed to deliver notifications");
        }
    }

    fn post_revert(&mut self, ports: Vec<PortId>) {
        let Some(tx) = self.requeue.upgrade() else {
            debug!(?ports, "Queue closed, reverting inline");
            self.revert_to_primary(Some(ports.as_slice()));
            return;
        };

        let message = Message {
            request: Request::RevertInterface(ports),
            reply: None,
        };
        match tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) | Err(TrySendError::Closed(message)) => {
                warn!("Queue unavailable, reverting inline");
                if let Request::RevertInterface(ports) = message.request {
                    self.revert_to_primary(Some(ports.as_slice()));
                }
            }
        }
    }

    /// Makes each eligible primary active again. `None` considers every
    /// port seen in the last cycle.
    #[instrument(skip(self))]
    pub fn revert_to_primary(&mut self, ports: Option<&[PortId]>) -> Vec<PortId> {
        let candidates: Vec<PortId> = match ports {
            Some(ports) => ports.to_vec(),
            None => {
                let mut all: Vec<PortId> = self.ports.keys().copied().collect();
                all.sort_unstable();
                all
            }
        };

        let mut reverted = Vec::new();
        for id in candidates {
            let Some(facts) = self.ports.get(&id).copied() else {
                if ports.is_some() {
                    warn!(port = id, "Cannot revert unknown port");
                }
                continue;
            };
            if !facts.eligible() {
                debug!(port = id, status = %facts.redundancy_status, "Port not eligible for revert");
                continue;
            }

            match facts.redundancy_type {
                RedundancyType::ActiveActive => {
                    if self.selector.set_active(id) {
                        reverted.push(id);
                    }
                }
                RedundancyType::ActiveStandby => match self.driver.select_team_port(id) {
                    Ok(()) => reverted.push(id),
                    Err(e) => error!(port = id, error = %e, "Team port selection failed"),
                },
                RedundancyType::None => {}
            }
        }

        if !reverted.is_empty() {
            info!(?reverted, "Reverted to primary");
        }
        reverted
    }

    /// Keeps current selections for the rebuilt teams and announces the
    /// change.
    pub fn reconfigured(&mut self) {
        self.selector.remember_selections();
        self.deliver(&[AlarmEngine::ip_configuration_changed()]);
    }
}
