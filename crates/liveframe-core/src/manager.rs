//! Per-topic session manager.
//!
//! A [`TopicManager`] owns one mounted component, its current context and
//! the last tree rendered from it. Every dispatch renders the new context,
//! diffs it against the stored tree and replies with the update. Context
//! and tree are replaced together, under the same lock the reply is sent
//! with.

use liveframe_protocol::{Message, Reply};
use liveframe_transport::{ConnectionId, Transport};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock, Weak};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::component::{
    AnyContext, AnyInfo, Capabilities, ComponentError, ComponentResult, ErasedComponent,
    MountParams, Params,
};
use crate::router::{send_message, Topics};
use crate::routes::Route;
use crate::session::SessionData;
use crate::socket::Scheduler;
use crate::template::{diff, Diff, Parts, TemplateError, Update};

/// Manager errors. Each one ends the session.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A component callback failed.
    #[error("{0}")]
    Component(#[from] ComponentError),

    /// The render did not produce a valid tree.
    #[error("Render failed: {0}")]
    Template(#[from] TemplateError),

    /// A tree or diff could not be encoded.
    #[error("Failed to encode render: {0}")]
    Encode(#[from] serde_json::Error),

    /// `mount` was called on a session that already mounted.
    #[error("Session already mounted")]
    AlreadyMounted,
}

enum State {
    Pending(Arc<dyn ErasedComponent>),
    Healthy(Live),
    Shutdown,
}

struct Live {
    component: Arc<dyn ErasedComponent>,
    context: AnyContext,
    rendered: Parts,
}

/// The session of one topic on one connection.
pub struct TopicManager {
    topic: Arc<str>,
    join_ref: Option<String>,
    connection_id: ConnectionId,
    transport: Arc<dyn Transport>,
    capabilities: Capabilities,
    cancel: CancellationToken,
    scheduler: Scheduler,
    registry: OnceLock<Weak<Topics>>,
    state: Mutex<State>,
}

impl TopicManager {
    /// Create an unmounted session for `route`.
    #[must_use]
    pub fn new(
        topic: &str,
        join_ref: Option<String>,
        connection_id: ConnectionId,
        transport: Arc<dyn Transport>,
        route: &Route,
    ) -> Arc<Self> {
        let topic: Arc<str> = Arc::from(topic);
        let cancel = CancellationToken::new();

        Arc::new_cyclic(|manager| Self {
            scheduler: Scheduler::new(manager.clone(), cancel.clone(), Arc::clone(&topic)),
            topic,
            join_ref,
            connection_id,
            transport,
            capabilities: route.capabilities(),
            cancel,
            registry: OnceLock::new(),
            state: Mutex::new(State::Pending(Arc::clone(&route.component))),
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn join_ref(&self) -> Option<&str> {
        self.join_ref.as_deref()
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Tie the session to the topic map it is registered in. Shutting down
    /// removes it from that map.
    pub(crate) fn attach(&self, registry: Weak<Topics>) {
        if self.registry.set(registry).is_err() {
            warn!(topic = %self.topic, "Session already attached");
        }
    }

    /// Check if the session is mounted and not shut down.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(*self.state.lock(), State::Healthy(_))
    }

    /// The last tree sent to the client.
    #[must_use]
    pub fn rendered(&self) -> Option<Parts> {
        match &*self.state.lock() {
            State::Healthy(live) => Some(live.rendered.clone()),
            _ => None,
        }
    }

    /// Mount the component and reply to `origin` with the full tree.
    ///
    /// # Errors
    ///
    /// On failure an error reply is sent, the session shuts down and the
    /// error is returned.
    pub fn mount(
        &self,
        origin: &Message,
        params: &MountParams,
        session: &SessionData,
    ) -> Result<Parts, ManagerError> {
        let mut state = self.state.lock();
        let State::Pending(component) = &*state else {
            return Err(ManagerError::AlreadyMounted);
        };
        let component = Arc::clone(component);

        let mounted = component
            .mount(params, session, &self.scheduler)
            .map_err(ManagerError::from)
            .and_then(|context| {
                let rendered = render(component.as_ref(), &context)?;
                let response = serde_json::to_value(&rendered)?;
                Ok((context, rendered, response))
            });

        match mounted {
            Ok((context, rendered, response)) => {
                debug!(topic = %self.topic, connection = %self.connection_id, "Mounted");
                self.send(Reply::ok(origin, response).into());
                *state = State::Healthy(Live {
                    component,
                    context,
                    rendered: rendered.clone(),
                });
                Ok(rendered)
            }
            Err(error) => {
                self.fail(&mut state, Some(origin), &error);
                Err(error)
            }
        }
    }

    /// Dispatch a client event and reply to `origin` with the update.
    ///
    /// Returns `None` if the session is shut down.
    ///
    /// # Errors
    ///
    /// On failure an error reply is sent, the session shuts down and the
    /// error is returned.
    pub fn handle_event(
        &self,
        origin: &Message,
        event: &str,
        params: &Params,
    ) -> Result<Option<Update>, ManagerError> {
        trace!(topic = %self.topic, event, "Handling event");
        self.reply_with(origin, self.capabilities.events, |component, context, scheduler| {
            component.handle_event(event, params, context, scheduler)
        })
    }

    /// Dispatch a navigation patch and reply to `origin` with the update.
    ///
    /// The query string of `url` becomes the params.
    ///
    /// # Errors
    ///
    /// On failure an error reply is sent, the session shuts down and the
    /// error is returned.
    pub fn handle_live_patch(
        &self,
        origin: &Message,
        url: &Url,
    ) -> Result<Option<Update>, ManagerError> {
        trace!(topic = %self.topic, url = %url, "Handling live patch");
        let params: Params = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
            .collect();
        self.reply_with(origin, self.capabilities.live_patch, |component, context, scheduler| {
            component.handle_live_patch(&params, url, context, scheduler)
        })
    }

    /// Deliver an internal message and push the update as a `diff`.
    ///
    /// Empty updates are not pushed. Returns `None` if the session is shut
    /// down.
    ///
    /// # Errors
    ///
    /// Fails if `info` is not the component's info type or the component
    /// fails; the session shuts down.
    pub fn handle_info<I: Send + 'static>(&self, info: I) -> Result<Option<Update>, ManagerError> {
        self.push_info(Box::new(info))
    }

    pub(crate) fn deliver_info(&self, info: AnyInfo) {
        if let Err(error) = self.push_info(info) {
            warn!(topic = %self.topic, error = %error, "Deferred info failed");
        }
    }

    fn push_info(&self, info: AnyInfo) -> Result<Option<Update>, ManagerError> {
        let mut state = self.state.lock();
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        if !self.capabilities.info {
            debug!(topic = %self.topic, "Component does not handle info, dropping");
            return Ok(None);
        }

        let pushed = self
            .dispatch(&mut state, |component, context, scheduler| {
                component.handle_info(info, context, scheduler)
            })
            .and_then(|update| match update {
                Some(update) if !update.is_empty() => {
                    let payload = serde_json::to_value(&update)?;
                    let push = Message::push(self.join_ref.clone(), &*self.topic, payload);
                    self.send(push);
                    Ok(Some(update))
                }
                other => Ok(other),
            });

        if let Err(error) = &pushed {
            self.fail(&mut state, None, error);
        }
        pushed
    }

    /// Shut the session down.
    ///
    /// Cancels pending deferred messages and releases the component and its
    /// context. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        self.cancel.cancel();
        if !matches!(*state, State::Shutdown) {
            debug!(topic = %self.topic, connection = %self.connection_id, "Session shut down");
        }
        *state = State::Shutdown;
        self.detach();
    }

    fn reply_with<F>(
        &self,
        origin: &Message,
        enabled: bool,
        call: F,
    ) -> Result<Option<Update>, ManagerError>
    where
        F: FnOnce(&dyn ErasedComponent, AnyContext, &Scheduler) -> ComponentResult<AnyContext>,
    {
        let mut state = self.state.lock();

        let replied = if enabled {
            self.dispatch(&mut state, call)
        } else {
            Ok(matches!(*state, State::Healthy(_)).then(|| Update::Diff(Diff::default())))
        }
        .and_then(|update| match update {
            Some(update) => {
                let response = serde_json::to_value(&update)?;
                self.send(Reply::ok(origin, response).into());
                Ok(Some(update))
            }
            None => Ok(None),
        });

        if let Err(error) = &replied {
            self.fail(&mut state, Some(origin), error);
        }
        replied
    }

    /// Run `call`, render its context and diff against the stored tree.
    ///
    /// The state is `Shutdown` while the call runs; it is restored only if
    /// every step succeeds.
    fn dispatch<F>(&self, state: &mut State, call: F) -> Result<Option<Update>, ManagerError>
    where
        F: FnOnce(&dyn ErasedComponent, AnyContext, &Scheduler) -> ComponentResult<AnyContext>,
    {
        if !matches!(state, State::Healthy(_)) {
            return Ok(None);
        }
        let State::Healthy(live) = std::mem::replace(state, State::Shutdown) else {
            return Ok(None);
        };
        let Live {
            component,
            context,
            rendered,
        } = live;

        let context = call(component.as_ref(), context, &self.scheduler)?;
        let next = render(component.as_ref(), &context)?;
        let update = diff(&rendered, &next);

        *state = State::Healthy(Live {
            component,
            context,
            rendered: next,
        });
        Ok(Some(update))
    }

    fn fail(&self, state: &mut State, origin: Option<&Message>, error: &ManagerError) {
        warn!(topic = %self.topic, connection = %self.connection_id, error = %error, "Session failed");
        if let Some(origin) = origin {
            self.send(Reply::error(origin, json!({ "reason": error.to_string() })).into());
        }
        self.cancel.cancel();
        *state = State::Shutdown;
        self.detach();
    }

    /// Remove this session from its topic map, leaving a replacement alone.
    fn detach(&self) {
        let Some(topics) = self.registry.get().and_then(Weak::upgrade) else {
            return;
        };
        let this: *const Self = self;
        topics.remove_if(&*self.topic, |_, current| std::ptr::eq(Arc::as_ptr(current), this));
    }

    fn send(&self, message: Message) {
        send_message(self.transport.as_ref(), &self.connection_id, &message);
    }
}

impl Drop for TopicManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn render(component: &dyn ErasedComponent, context: &AnyContext) -> Result<Parts, ManagerError> {
    Ok(component.render(context)?.parts()?)
}
