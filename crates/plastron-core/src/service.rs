use crate::machine::{entry_effect, transition, Event};
use plastron_remote::{ControlBackend, ControlRequest};
use plastron_schema::{ContainerContext, ContainerState, NextAction};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

struct ServiceInner {
    context: ContainerContext,
    closed: bool,
}

/// Runtime handle binding one container context to its machine.
///
/// All mutable state sits behind one async mutex that is held across the
/// awaited side effect: a container never has two effects in flight, and
/// the next event waits for the current transition to resolve.
pub struct ContainerService {
    control: Arc<dyn ControlBackend>,
    inner: Mutex<ServiceInner>,
}

impl ContainerService {
    /// Wrap a context. Fresh containers arrive in `Uninitialized`; restored
    /// ones carry their persisted state and stay inert until the next tick.
    pub fn attach(context: ContainerContext, control: Arc<dyn ControlBackend>) -> Self {
        Self {
            control,
            inner: Mutex::new(ServiceInner {
                context,
                closed: false,
            }),
        }
    }

    pub async fn context(&self) -> ContainerContext {
        self.inner.lock().await.context.clone()
    }

    pub async fn state(&self) -> ContainerState {
        self.inner.lock().await.context.state
    }

    /// Suppress all further transitions (shutdown path).
    pub async fn close(&self) {
        self.inner.lock().await.closed = true;
    }

    /// Record or clear the deferred cascade step. Reports a snapshot only
    /// when the value actually changed.
    pub async fn queue_action(&self, action: Option<NextAction>) -> Option<ContainerContext> {
        let mut inner = self.inner.lock().await;
        if inner.closed || inner.context.next_action == action {
            return None;
        }
        inner.context.next_action = action;
        inner.context.touch();
        Some(inner.context.clone())
    }

    /// Dispatch one event against the machine.
    ///
    /// Returns the updated context snapshot when state or context changed,
    /// `None` for no-ops. When the target state carries an entry effect the
    /// control call is awaited here and its result folded back before the
    /// snapshot is taken.
    pub async fn send(&self, event: Event) -> Option<ContainerContext> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return None;
        }

        let next = transition(inner.context.state, &event)?;
        debug!(
            "{}: {} -> {next} ({event:?})",
            inner.context.id, inner.context.state
        );
        inner.context.state = next;
        match &event {
            Event::RemoteStarted { url } => {
                if url.is_some() {
                    inner.context.url = url.clone();
                }
                inner.context.error = None;
            }
            Event::RemoteStopped { error } => {
                inner.context.error = error.clone();
            }
            _ => {}
        }

        if let Some(effect) = entry_effect(next) {
            let request = ControlRequest::for_container(&inner.context);
            match self.control.invoke(&request, effect.action).await {
                Ok(outcome) => {
                    debug!(
                        "{}: {} ok (remote reports {})",
                        inner.context.id, effect.action, outcome.state
                    );
                    inner.context.state = effect.on_success;
                    if outcome.url.is_some() {
                        inner.context.url = outcome.url;
                    }
                    inner.context.error = outcome.error;
                }
                Err(e) => {
                    debug!("{}: {} failed: {e}", inner.context.id, effect.action);
                    inner.context.state = effect.on_error;
                    inner.context.error = Some(e.to_container_error());
                }
            }
            // The queued action is consumed the moment a Destroy dispatch
            // actually lands; the terminal container is about to be removed.
            if inner.context.state == ContainerState::Destroyed {
                inner.context.next_action = None;
            }
        }

        inner.context.touch();
        Some(inner.context.clone())
    }
}
