//! # Resource Module
//!
//! Resources are the addressable units of the server. Each one is a value
//! implementing [`ResourceHandler`], registered under an exact URI path in a
//! [`ResourceTable`] before serving starts.
//!
//! ## Registration
//!
//! ```rust
//! use minicoap::resource::{FixedReading, ResourceTable, TemperatureResource};
//!
//! let mut table = ResourceTable::new();
//! table
//!     .register("/temp", TemperatureResource::new(FixedReading(21.5)))
//!     .unwrap();
//! assert!(table.get("/temp").is_some());
//! ```
//!
//! Once the table is handed to a [`crate::dispatcher::Dispatcher`] it is sealed
//! and further registration fails with [`RegistrationError::Sealed`].
//!
//! ## Outcomes
//!
//! A handler returns a [`ResourceValue`] or a [`HandlerError`]. The dispatcher
//! renders values as text/plain and maps errors to 5.xx codes.

mod temperature;

pub use temperature::{
    FixedReading, SensorSource, SensorUnavailable, TemperatureResource, ThermalZoneSource,
    DEFAULT_THERMAL_ZONE,
};

use crate::message::{Method, Request};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Value produced by a successful handler call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    /// Free text
    Text(String),
    /// Floating-point reading, rendered in shortest decimal form
    Number(f64),
    /// Integer reading
    Integer(i64),
}

impl ResourceValue {
    /// Plain-text rendering used for the response payload.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceValue::Text(s) => f.write_str(s),
            ResourceValue::Number(n) => write!(f, "{n}"),
            ResourceValue::Integer(i) => write!(f, "{i}"),
        }
    }
}

/// Handler failures, all answered with a 5.xx response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The data behind the resource is temporarily missing (5.03).
    #[error("resource unavailable: {0}")]
    Unavailable(String),
    /// Anything else that went wrong (5.00).
    #[error("handler failed: {0}")]
    Failed(String),
}

impl From<SensorUnavailable> for HandlerError {
    fn from(err: SensorUnavailable) -> Self {
        HandlerError::Unavailable(err.to_string())
    }
}

/// The capability a registered resource exposes.
pub trait ResourceHandler: Send + Sync + 'static {
    /// Methods this resource answers. Anything else gets 4.05.
    fn methods(&self) -> &[Method] {
        &[Method::Get]
    }

    /// Produce the value for one request.
    fn handle(&self, request: &Request) -> Result<ResourceValue, HandlerError>;
}

/// Plain functions and closures act as GET-only resources.
impl<F> ResourceHandler for F
where
    F: Fn(&Request) -> Result<ResourceValue, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, request: &Request) -> Result<ResourceValue, HandlerError> {
        self(request)
    }
}

/// Wiring errors raised while building the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// The table already belongs to a running dispatcher.
    #[error("cannot register {path}: resource table is sealed once serving starts")]
    Sealed {
        /// Path the caller tried to add
        path: String,
    },
    /// Path registered twice.
    #[error("resource {0} is already registered")]
    DuplicatePath(String),
    /// Path does not start with `/`.
    #[error("resource path {0:?} must start with '/'")]
    InvalidPath(String),
}

/// Exact-match map from URI path to resource handler.
#[derive(Default, Clone)]
pub struct ResourceTable {
    entries: HashMap<String, Arc<dyn ResourceHandler>>,
    sealed: bool,
}

impl ResourceTable {
    /// An empty, unsealed table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `path`.
    pub fn register<H: ResourceHandler>(
        &mut self,
        path: &str,
        handler: H,
    ) -> Result<(), RegistrationError> {
        self.register_arc(path, Arc::new(handler))
    }

    /// Register an already shared handler.
    pub fn register_arc(
        &mut self,
        path: &str,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<(), RegistrationError> {
        if self.sealed {
            return Err(RegistrationError::Sealed {
                path: path.to_string(),
            });
        }
        if !path.starts_with('/') {
            return Err(RegistrationError::InvalidPath(path.to_string()));
        }
        if self.entries.contains_key(path) {
            return Err(RegistrationError::DuplicatePath(path.to_string()));
        }

        info!(
            path = %path,
            methods = ?handler.methods(),
            total_resources = self.entries.len() + 1,
            "Resource registered"
        );
        self.entries.insert(path.to_string(), handler);
        Ok(())
    }

    /// Forbid further registration.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether [`seal`](Self::seal) has been called.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Exact lookup.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Arc<dyn ResourceHandler>> {
        self.entries.get(path)
    }

    /// Registered paths in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Iterate over `(path, handler)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ResourceHandler>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTable")
            .field("paths", &self.paths())
            .field("sealed", &self.sealed)
            .finish()
    }
}
