//! Route table: URL path to component.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::{ParseError, Url};

use crate::component::{Capabilities, Component, ErasedComponent};

/// A component registered at a path.
#[derive(Clone)]
pub struct Route {
    pub(crate) component: Arc<dyn ErasedComponent>,
    capabilities: Capabilities,
}

impl Route {
    /// Capabilities read when the route was registered.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Exact-match table from URL path to component.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` at `path`, replacing any previous route.
    #[must_use]
    pub fn route<C: Component>(mut self, path: impl Into<String>, component: C) -> Self {
        self.insert(path, component);
        self
    }

    /// Register `component` at `path`, replacing any previous route.
    pub fn insert<C: Component>(&mut self, path: impl Into<String>, component: C) {
        let capabilities = Component::capabilities(&component);
        self.routes.insert(
            path.into(),
            Route {
                component: Arc::new(component),
                capabilities,
            },
        );
    }

    /// Look up the route for an exact path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Route> {
        self.routes.get(path)
    }

    /// Registered paths, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Base that relative client URLs are resolved against.
const BASE_URL: &str = "http://localhost";

/// Parse a client URL, absolute or relative.
///
/// Only the path is used for routing; scheme, host, query and fragment are
/// ignored.
///
/// # Errors
///
/// Returns an error if `raw` is not a valid URL or path.
pub fn resolve_url(raw: &str) -> Result<Url, ParseError> {
    match Url::parse(raw) {
        Err(ParseError::RelativeUrlWithoutBase) => Url::parse(BASE_URL)?.join(raw),
        parsed => parsed,
    }
}
