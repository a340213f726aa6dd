//! Handle given to component callbacks for scheduling internal messages.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::component::AnyInfo;
use crate::manager::TopicManager;

/// Sends internal messages back to the component that owns it.
///
/// Messages are delivered to [`Component::handle_info`](crate::Component::handle_info)
/// and their render is pushed to the client. Messages still pending when
/// the session shuts down are dropped.
pub struct Socket<I> {
    scheduler: Scheduler,
    _info: PhantomData<fn(I)>,
}

impl<I: Send + 'static> Socket<I> {
    pub(crate) fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            _info: PhantomData,
        }
    }

    /// Topic of the session.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.scheduler.topic
    }

    /// Deliver `info` as soon as the current callback returns.
    pub fn send_info(&self, info: I) {
        self.send_info_after(Duration::ZERO, info);
    }

    /// Deliver `info` after `delay`.
    pub fn send_info_after(&self, delay: Duration, info: I) {
        self.scheduler.schedule(delay, Box::new(info));
    }
}

impl<I> std::fmt::Debug for Socket<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("topic", &self.scheduler.topic)
            .finish_non_exhaustive()
    }
}

/// Spawns deferred deliveries tied to one manager's lifetime.
#[derive(Clone)]
pub(crate) struct Scheduler {
    manager: Weak<TopicManager>,
    cancel: CancellationToken,
    topic: Arc<str>,
}

impl Scheduler {
    pub(crate) fn new(manager: Weak<TopicManager>, cancel: CancellationToken, topic: Arc<str>) -> Self {
        Self {
            manager,
            cancel,
            topic,
        }
    }

    pub(crate) fn schedule(&self, delay: Duration, info: AnyInfo) {
        if self.cancel.is_cancelled() {
            trace!(topic = %self.topic, "Session shut down, dropping info");
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!(topic = %self.topic, "No async runtime, dropping info");
            return;
        };

        let manager = self.manager.clone();
        let cancel = self.cancel.clone();
        let topic = Arc::clone(&self.topic);
        runtime.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    trace!(topic = %topic, "Deferred info cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    if let Some(manager) = manager.upgrade() {
                        manager.deliver_info(info);
                    }
                }
            }
        });
    }
}
