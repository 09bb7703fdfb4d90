//! Pre-init buffer.
//!
//! Calls made before the instance is ready are held here in arrival order.
//! Load drains the buffer in batches until it is empty and only then flips
//! the state to ready, so late arrivals queue up behind earlier calls
//! instead of overtaking them.

use crate::emitter::Listener;
use crate::middleware::DestinationMiddleware;
use crate::{Plugin, SdkResult};
use events_core::{Context, Event, EventFactory};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Builds the event for a tracking call once identity is settled.
pub(crate) type EventBuilder = Box<dyn FnOnce(&EventFactory) -> Event + Send>;

/// Lifecycle of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Created; calls are buffered.
    Pending,
    /// `load` is running; calls are still buffered.
    Loading,
    Ready,
    Closed,
}

/// A call captured before the instance was ready.
pub(crate) enum BufferedCall {
    SetAnonymousId(Option<String>),
    On {
        event_name: String,
        listener: Listener,
    },
    Register {
        plugins: Vec<Arc<dyn Plugin>>,
        reply: oneshot::Sender<SdkResult<()>>,
    },
    DestinationMiddleware {
        destination: String,
        middleware: Arc<dyn DestinationMiddleware>,
    },
    Dispatch {
        build: EventBuilder,
        reply: oneshot::Sender<SdkResult<Context>>,
    },
}

/// Buffered calls regrouped into flush order.
#[derive(Default)]
pub(crate) struct FlushBatch {
    pub anonymous_ids: Vec<Option<String>>,
    pub listeners: Vec<(String, Listener)>,
    pub registrations: Vec<(Vec<Arc<dyn Plugin>>, oneshot::Sender<SdkResult<()>>)>,
    pub middleware: Vec<(String, Arc<dyn DestinationMiddleware>)>,
    pub dispatches: Vec<(EventBuilder, oneshot::Sender<SdkResult<Context>>)>,
}

impl FlushBatch {
    fn from_calls(calls: Vec<BufferedCall>) -> Self {
        let mut batch = Self::default();
        for call in calls {
            match call {
                BufferedCall::SetAnonymousId(id) => batch.anonymous_ids.push(id),
                BufferedCall::On {
                    event_name,
                    listener,
                } => batch.listeners.push((event_name, listener)),
                BufferedCall::Register { plugins, reply } => batch.registrations.push((plugins, reply)),
                BufferedCall::DestinationMiddleware {
                    destination,
                    middleware,
                } => batch.middleware.push((destination, middleware)),
                BufferedCall::Dispatch { build, reply } => batch.dispatches.push((build, reply)),
            }
        }
        batch
    }
}

/// Ordered buffer plus the load state it is tied to.
pub(crate) struct PreInitBuffer {
    state: LoadState,
    calls: Vec<BufferedCall>,
}

impl PreInitBuffer {
    pub fn new() -> Self {
        Self {
            state: LoadState::Pending,
            calls: Vec::new(),
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Buffer `call` unless the instance is ready or closed, in which case
    /// the call is handed back.
    pub fn offer(&mut self, call: BufferedCall) -> Option<BufferedCall> {
        match self.state {
            LoadState::Pending | LoadState::Loading => {
                self.calls.push(call);
                None
            }
            LoadState::Ready | LoadState::Closed => Some(call),
        }
    }

    /// Move from pending to loading. False if load already started.
    pub fn begin_load(&mut self) -> bool {
        if self.state != LoadState::Pending {
            return false;
        }
        self.state = LoadState::Loading;
        true
    }

    /// Take everything buffered so far, leaving the state untouched.
    pub fn drain(&mut self) -> FlushBatch {
        FlushBatch::from_calls(std::mem::take(&mut self.calls))
    }

    /// Take the next batch, or mark the instance ready when nothing is left.
    pub fn next_batch_or_ready(&mut self) -> Option<FlushBatch> {
        if self.calls.is_empty() {
            if self.state == LoadState::Loading {
                self.state = LoadState::Ready;
            }
            return None;
        }
        Some(self.drain())
    }

    /// Close the buffer, dropping anything still queued.
    pub fn close(&mut self) -> usize {
        self.state = LoadState::Closed;
        let dropped = self.calls.len();
        self.calls.clear();
        dropped
    }
}
