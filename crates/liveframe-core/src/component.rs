//! Components: the application code mounted at a route.
//!
//! A component owns no state of its own. [`Component::mount`] produces a
//! context, every handler maps the current context to the next one, and
//! [`Component::render`] turns a context into markup. The manager stores
//! the context between calls.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::any::Any;
use thiserror::Error;
use url::Url;

use crate::session::SessionData;
use crate::socket::{Scheduler, Socket};
use crate::template::Html;

/// Event and patch parameters.
pub type Params = Map<String, Value>;

/// Result of a component callback.
pub type ComponentResult<T> = Result<T, ComponentError>;

/// A failure raised by component code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ComponentError(String);

impl ComponentError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// Which optional handlers a component implements.
///
/// Read once when the component is registered at a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub events: bool,
    pub info: bool,
    pub live_patch: bool,
}

impl Capabilities {
    /// Mount and render only.
    pub const NONE: Self = Self {
        events: false,
        info: false,
        live_patch: false,
    };

    #[must_use]
    pub const fn with_events(mut self) -> Self {
        self.events = true;
        self
    }

    #[must_use]
    pub const fn with_info(mut self) -> Self {
        self.info = true;
        self
    }

    #[must_use]
    pub const fn with_live_patch(mut self) -> Self {
        self.live_patch = true;
        self
    }
}

/// Parameters sent by the client when joining.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MountParams {
    #[serde(rename = "_csrf_token", default)]
    pub csrf_token: Option<String>,
    /// How many times the client has mounted this view.
    #[serde(rename = "_mounts", default)]
    pub mounts: Option<i64>,
    /// Any other parameters, including the query string of the join URL.
    #[serde(flatten)]
    pub extra: Params,
}

impl MountParams {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Application code mounted at a route.
///
/// Only `mount` and `render` are required. The other handlers are called
/// only if [`capabilities`](Component::capabilities) declares them; the
/// defaults return the context unchanged.
pub trait Component: Send + Sync + 'static {
    /// Per-session state.
    type Context: Send + 'static;
    /// Internal message delivered through [`Socket::send_info`].
    type Info: Send + 'static;

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Build the initial context.
    ///
    /// # Errors
    ///
    /// An error rejects the join with an error reply.
    fn mount(
        &self,
        params: &MountParams,
        session: &SessionData,
        socket: &Socket<Self::Info>,
    ) -> ComponentResult<Self::Context>;

    fn render(&self, context: &Self::Context) -> Html;

    /// Handle a client event.
    ///
    /// # Errors
    ///
    /// An error ends the session.
    fn handle_event(
        &self,
        event: &str,
        params: &Params,
        context: Self::Context,
        socket: &Socket<Self::Info>,
    ) -> ComponentResult<Self::Context> {
        let _ = (event, params, socket);
        Ok(context)
    }

    /// Handle an internal message.
    ///
    /// # Errors
    ///
    /// An error ends the session.
    fn handle_info(
        &self,
        info: Self::Info,
        context: Self::Context,
        socket: &Socket<Self::Info>,
    ) -> ComponentResult<Self::Context> {
        let _ = (info, socket);
        Ok(context)
    }

    /// Handle navigation to `url` without a remount.
    ///
    /// # Errors
    ///
    /// An error ends the session.
    fn handle_live_patch(
        &self,
        params: &Params,
        url: &Url,
        context: Self::Context,
        socket: &Socket<Self::Info>,
    ) -> ComponentResult<Self::Context> {
        let _ = (params, url, socket);
        Ok(context)
    }
}

pub(crate) type AnyContext = Box<dyn Any + Send>;
pub(crate) type AnyInfo = Box<dyn Any + Send>;

/// Object-safe view of a [`Component`] with its context and info erased.
pub(crate) trait ErasedComponent: Send + Sync {
    fn mount(
        &self,
        params: &MountParams,
        session: &SessionData,
        scheduler: &Scheduler,
    ) -> ComponentResult<AnyContext>;

    fn render(&self, context: &AnyContext) -> ComponentResult<Html>;

    fn handle_event(
        &self,
        event: &str,
        params: &Params,
        context: AnyContext,
        scheduler: &Scheduler,
    ) -> ComponentResult<AnyContext>;

    fn handle_info(
        &self,
        info: AnyInfo,
        context: AnyContext,
        scheduler: &Scheduler,
    ) -> ComponentResult<AnyContext>;

    fn handle_live_patch(
        &self,
        params: &Params,
        url: &Url,
        context: AnyContext,
        scheduler: &Scheduler,
    ) -> ComponentResult<AnyContext>;
}

fn downcast<T: 'static>(value: Box<dyn Any + Send>, what: &str) -> ComponentResult<T> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| ComponentError::new(format!("{what} does not belong to this component")))
}

impl<C: Component> ErasedComponent for C {
    fn mount(
        &self,
        params: &MountParams,
        session: &SessionData,
        scheduler: &Scheduler,
    ) -> ComponentResult<AnyContext> {
        let context = Component::mount(self, params, session, &Socket::new(scheduler.clone()))?;
        Ok(Box::new(context))
    }

    fn render(&self, context: &AnyContext) -> ComponentResult<Html> {
        let context = context
            .downcast_ref::<C::Context>()
            .ok_or_else(|| ComponentError::new("context does not belong to this component"))?;
        Ok(Component::render(self, context))
    }

    fn handle_event(
        &self,
        event: &str,
        params: &Params,
        context: AnyContext,
        scheduler: &Scheduler,
    ) -> ComponentResult<AnyContext> {
        let context = downcast::<C::Context>(context, "context")?;
        let next = Component::handle_event(
            self,
            event,
            params,
            context,
            &Socket::new(scheduler.clone()),
        )?;
        Ok(Box::new(next))
    }

    fn handle_info(
        &self,
        info: AnyInfo,
        context: AnyContext,
        scheduler: &Scheduler,
    ) -> ComponentResult<AnyContext> {
        let info = downcast::<C::Info>(info, "info message")?;
        let context = downcast::<C::Context>(context, "context")?;
        let next = Component::handle_info(self, info, context, &Socket::new(scheduler.clone()))?;
        Ok(Box::new(next))
    }

    fn handle_live_patch(
        &self,
        params: &Params,
        url: &Url,
        context: AnyContext,
        scheduler: &Scheduler,
    ) -> ComponentResult<AnyContext> {
        let context = downcast::<C::Context>(context, "context")?;
        let next = Component::handle_live_patch(
            self,
            params,
            url,
            context,
            &Socket::new(scheduler.clone()),
        )?;
        Ok(Box::new(next))
    }
}
