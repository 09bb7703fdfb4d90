//! First-party ingest destination.
//!
//! Every event handed to this destination is pushed onto a delivery queue
//! (persisted unless disabled) and sent by a [`DeliveryWorker`]. Events the
//! worker gives up on are re-emitted as `delivery_failure`.

use crate::emitter::{Emission, EVENT_DELIVERY_FAILURE};
use crate::{Analytics, Capabilities, Plugin, PluginResult, PluginType, SdkConfig};
use async_trait::async_trait;
use delivery_queue::{
    persisted_queue_key, ConnectivityProbe, ContextQueue, DeliveryHandle, DeliveryOutcome,
    DeliveryWorker, KeyValueStore, PersistedPriorityQueue, PriorityQueue, Transport,
};
use events_core::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Destination name of the ingest API.
pub const EVENTS_API: &str = "Events API";

/// Destination plugin feeding the delivery queue.
pub struct EventsApiDestination {
    worker: DeliveryWorker,
    handle: DeliveryHandle,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl EventsApiDestination {
    pub fn new(worker: DeliveryWorker) -> Self {
        let handle = worker.handle();
        Self {
            worker,
            handle,
            forwarder: Mutex::new(None),
        }
    }

    /// Build the queue and worker described by `config`.
    ///
    /// The queue is persisted under the write key when a store is given and
    /// client persistence is enabled.
    pub fn from_config(
        write_key: &str,
        config: &SdkConfig,
        store: Option<Arc<dyn KeyValueStore>>,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let max_attempts = config.effective_max_attempts();
        let queue: Box<dyn ContextQueue> = match store {
            Some(store) if !config.disable_client_persistence => Box::new(PersistedPriorityQueue::new(
                max_attempts,
                persisted_queue_key(write_key, EVENTS_API),
                store,
            )),
            _ => Box::new(PriorityQueue::new(max_attempts)),
        };

        Self::new(DeliveryWorker::new(
            config.worker_config(EVENTS_API),
            queue,
            transport,
            probe,
        ))
    }

    pub fn worker(&self) -> &DeliveryWorker {
        &self.worker
    }

    fn enqueue(&self, ctx: &Context) -> PluginResult<()> {
        self.handle.push(ctx.for_destination(ctx.event().clone()))?;
        debug!(message_id = %ctx.event().message_id, queued = self.handle.len(), "Queued event for ingest");
        Ok(())
    }
}

#[async_trait]
impl Plugin for EventsApiDestination {
    fn name(&self) -> &str {
        EVENTS_API
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Destination
    }

    fn is_loaded(&self) -> bool {
        self.worker.is_running()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn load(&self, _ctx: &mut Context, analytics: &Analytics) -> PluginResult<()> {
        self.worker.start();

        let mut reports = self.worker.subscribe();
        let emitter = analytics.emitter().clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match reports.recv().await {
                    Ok(report) => {
                        if let DeliveryOutcome::Failed { reason } = report.outcome {
                            emitter.emit(
                                EVENT_DELIVERY_FAILURE,
                                &Emission::DeliveryFailure {
                                    event: report.event,
                                    reason,
                                },
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Delivery report listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.forwarder.lock().replace(forwarder) {
            previous.abort();
        }
        info!(queued = self.handle.len(), "Events API destination loaded");
        Ok(())
    }

    async fn unload(&self, _ctx: &mut Context, _analytics: &Analytics) -> PluginResult<()> {
        self.worker.stop().await;
        if let Some(forwarder) = self.forwarder.lock().take() {
            forwarder.abort();
        }
        Ok(())
    }

    async fn track(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enqueue(ctx)
    }

    async fn identify(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enqueue(ctx)
    }

    async fn page(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enqueue(ctx)
    }

    async fn screen(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enqueue(ctx)
    }

    async fn group(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enqueue(ctx)
    }

    async fn alias(&self, ctx: &mut Context) -> PluginResult<()> {
        self.enqueue(ctx)
    }
}
