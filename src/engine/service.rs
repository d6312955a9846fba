// Engine Service - drives one MarketEngine on a tokio task
// Inputs arrive over mpsc, whole snapshots leave over watch, and the debounce
// timer posts its recompute back through the same input channel

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::EngineConfig;
use crate::core::events::EventBus;
use crate::engine::market_engine::{EngineCommand, EngineError, EngineInput, MarketEngine};
use crate::engine::scheduler::DebounceTimer;
use crate::engine::snapshot::{EngineSnapshot, SnapshotDelta};

type CommandReply = oneshot::Sender<Result<SnapshotDelta, EngineError>>;

enum ServiceMessage {
    Input(EngineInput),
    Command(EngineCommand, CommandReply),
}

pub struct EngineService {
    tx: mpsc::Sender<ServiceMessage>,
    snapshot_rx: watch::Receiver<Arc<EngineSnapshot>>,
    event_bus: Arc<EventBus>,
    task: JoinHandle<()>,
}

impl EngineService {
    /// Start the engine task. Must be called from inside a tokio runtime.
    pub fn spawn(config: EngineConfig) -> Self {
        let mut engine = MarketEngine::new(config);
        let event_bus = engine.event_bus();
        let capacity = engine.config().scheduler.channel_capacity.max(1);
        let debounce = Duration::from_millis(engine.config().scheduler.debounce_ms);

        let (tx, rx) = mpsc::channel(capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(engine.snapshot()));

        info!(
            symbol = %engine.symbol(),
            debounce_ms = debounce.as_millis() as u64,
            "Engine service starting"
        );
        let task = tokio::spawn(run(engine, rx, tx.downgrade(), snapshot_tx, debounce));

        Self {
            tx,
            snapshot_rx,
            event_bus,
            task,
        }
    }

    pub async fn send(&self, input: EngineInput) -> Result<(), EngineError> {
        self.tx
            .send(ServiceMessage::Input(input))
            .await
            .map_err(|_| EngineError::ServiceClosed)
    }

    /// Non-blocking send for feed callbacks; fails when the queue is full
    pub fn try_send(&self, input: EngineInput) -> Result<(), EngineError> {
        self.tx
            .try_send(ServiceMessage::Input(input))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EngineError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => EngineError::ServiceClosed,
            })
    }

    pub async fn send_raw(&self, raw_json: impl Into<String>) -> Result<(), EngineError> {
        self.send(EngineInput::Raw(raw_json.into())).await
    }

    /// Run a command and wait for its outcome
    pub async fn command(&self, command: EngineCommand) -> Result<SnapshotDelta, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ServiceMessage::Command(command, reply_tx))
            .await
            .map_err(|_| EngineError::ServiceClosed)?;
        reply_rx.await.map_err(|_| EngineError::ServiceClosed)?
    }

    /// Latest whole snapshot
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineSnapshot>> {
        self.snapshot_rx.clone()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Close the input side and wait for queued inputs to drain
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Engine task ended abnormally");
        }
    }
}

async fn run(
    mut engine: MarketEngine,
    mut rx: mpsc::Receiver<ServiceMessage>,
    weak_tx: mpsc::WeakSender<ServiceMessage>,
    snapshot_tx: watch::Sender<Arc<EngineSnapshot>>,
    debounce: Duration,
) {
    let mut timer = DebounceTimer::new();

    while let Some(message) = rx.recv().await {
        let delta = match message {
            ServiceMessage::Input(input) => match engine.ingest(input) {
                Ok(delta) => Some(delta),
                Err(e) => {
                    debug!(error = %e, "Input rejected");
                    None
                }
            },
            ServiceMessage::Command(command, reply) => {
                let result = engine.ingest(EngineInput::Command(command));
                let delta = result.as_ref().ok().cloned();
                if reply.send(result).is_err() {
                    debug!("Command caller went away before the reply");
                }
                delta
            }
        };

        if let Some(delta) = delta {
            if delta.reset {
                timer.cancel();
            }
            if delta.recompute_armed && engine.scheduler().is_pending() {
                let weak = weak_tx.clone();
                timer.arm(debounce, move || {
                    let Some(tx) = weak.upgrade() else {
                        return;
                    };
                    if tx.try_send(ServiceMessage::Input(EngineInput::Recompute)).is_err() {
                        warn!("Input queue full, debounced recompute dropped");
                    }
                });
            }
        }

        // Publish once the queue drains; readers always get a whole snapshot
        if rx.is_empty() {
            snapshot_tx.send_replace(Arc::new(engine.snapshot()));
        }
    }

    timer.cancel();
    info!(symbol = %engine.symbol(), "Engine service stopped");
}
