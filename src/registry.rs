//! Endpoint registry: exact-match URI to per-method handler tables.
//!
//! The registry is read on every request and written only on (de)register,
//! so it sits behind a read-write lock. Lookups scan the endpoint list; the
//! registry is expected to stay small (hundreds at most).

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{EngineError, Result};
use crate::exchange::Exchange;
use crate::limits::MAX_URI_LEN;
use crate::parser::Method;

/// Handler invoked for one request. Runs synchronously on the worker thread
/// owning the connection and may block on engine I/O callbacks.
pub type HandlerFn = Arc<dyn Fn(&mut Exchange<'_>) -> Result<()> + Send + Sync>;

/// Per-method handler table for one endpoint.
#[derive(Default, Clone)]
pub struct MethodHandlers {
    get: Option<HandlerFn>,
    put: Option<HandlerFn>,
    post: Option<HandlerFn>,
    delete: Option<HandlerFn>,
    patch: Option<HandlerFn>,
    head: Option<HandlerFn>,
}

impl MethodHandlers {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the GET handler.
    pub fn on_get<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Exchange<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.get = Some(Arc::new(handler));
        self
    }

    /// Sets the PUT handler.
    pub fn on_put<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Exchange<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.put = Some(Arc::new(handler));
        self
    }

    /// Sets the POST handler.
    pub fn on_post<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Exchange<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(handler));
        self
    }

    /// Sets the DELETE handler.
    pub fn on_delete<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Exchange<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.delete = Some(Arc::new(handler));
        self
    }

    /// Sets the PATCH handler.
    pub fn on_patch<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Exchange<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.patch = Some(Arc::new(handler));
        self
    }

    /// Sets the HEAD handler.
    pub fn on_head<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Exchange<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.head = Some(Arc::new(handler));
        self
    }

    fn for_method(&self, method: Method) -> Option<HandlerFn> {
        match method {
            Method::Get => self.get.clone(),
            Method::Put => self.put.clone(),
            Method::Post => self.post.clone(),
            Method::Delete => self.delete.clone(),
            Method::Patch => self.patch.clone(),
            Method::Head => self.head.clone(),
        }
    }
}

impl fmt::Debug for MethodHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandlers")
            .field("get", &self.get.is_some())
            .field("put", &self.put.is_some())
            .field("post", &self.post.is_some())
            .field("delete", &self.delete.is_some())
            .field("patch", &self.patch.is_some())
            .field("head", &self.head.is_some())
            .finish()
    }
}

/// Outcome of a dispatcher lookup.
pub(crate) enum Lookup {
    /// No endpoint for the URI.
    NotRegistered,
    /// Endpoint exists but has no handler for the request method.
    MethodNotAllowed,
    /// Matching handler.
    Found(HandlerFn),
}

struct Endpoint {
    uri: String,
    handlers: MethodHandlers,
}

/// URI-to-handler registry guarded by a read-write lock.
#[derive(Default)]
pub(crate) struct EndpointRegistry {
    endpoints: RwLock<Vec<Endpoint>>,
}

impl EndpointRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `handlers` for `uri`. Fails when the URI is already taken.
    pub(crate) fn register(&self, uri: &str, handlers: MethodHandlers) -> Result<()> {
        if uri.is_empty() || !uri.starts_with('/') {
            return Err(EngineError::InvalidParams("endpoint URI must start with '/'"));
        }
        if uri.len() > MAX_URI_LEN {
            return Err(EngineError::InvalidParams("endpoint URI exceeds length limit"));
        }

        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        if endpoints.iter().any(|e| e.uri == uri) {
            return Err(EngineError::AlreadyRegistered);
        }
        endpoints.push(Endpoint {
            uri: uri.to_owned(),
            handlers,
        });
        Ok(())
    }

    /// Removes the endpoint for `uri`. Succeeds even when absent.
    pub(crate) fn unregister(&self, uri: &str) -> Result<()> {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        endpoints.retain(|e| e.uri != uri);
        Ok(())
    }

    /// Resolves the handler for an exact URI and method.
    pub(crate) fn lookup(&self, uri: &str, method: Method) -> Lookup {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        match endpoints.iter().find(|e| e.uri == uri) {
            None => Lookup::NotRegistered,
            Some(endpoint) => match endpoint.handlers.for_method(method) {
                Some(handler) => Lookup::Found(handler),
                None => Lookup::MethodNotAllowed,
            },
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.endpoints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{EndpointRegistry, Lookup, MethodHandlers};
    use crate::error::EngineError;
    use crate::parser::Method;

    fn get_only() -> MethodHandlers {
        MethodHandlers::new().on_get(|_| Ok(()))
    }

    #[test]
    fn register_lookup_unregister_roundtrip() {
        let registry = EndpointRegistry::new();
        registry.register("/v1/pkg", get_only()).expect("register");

        assert!(matches!(
            registry.lookup("/v1/pkg", Method::Get),
            Lookup::Found(_)
        ));

        registry.unregister("/v1/pkg").expect("unregister");
        assert!(matches!(
            registry.lookup("/v1/pkg", Method::Get),
            Lookup::NotRegistered
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = EndpointRegistry::new();
        registry.register("/v1/pkg", get_only()).expect("register");
        let err = registry
            .register("/v1/pkg", get_only())
            .expect_err("duplicate");
        assert!(matches!(err, EngineError::AlreadyRegistered));
        assert_eq!(1, registry.len());
    }

    #[test]
    fn unregister_absent_uri_succeeds_without_changes() {
        let registry = EndpointRegistry::new();
        registry.register("/v1/pkg", get_only()).expect("register");
        registry.unregister("/nope").expect("absent is fine");
        assert_eq!(1, registry.len());
    }

    #[test]
    fn lookup_distinguishes_missing_method_from_missing_uri() {
        let registry = EndpointRegistry::new();
        registry.register("/v1/pkg", get_only()).expect("register");

        assert!(matches!(
            registry.lookup("/v1/pkg", Method::Delete),
            Lookup::MethodNotAllowed
        ));
        assert!(matches!(
            registry.lookup("/other", Method::Get),
            Lookup::NotRegistered
        ));
    }

    #[test]
    fn invalid_uris_are_rejected() {
        let registry = EndpointRegistry::new();
        assert!(registry.register("", get_only()).is_err());
        assert!(registry.register("no-slash", get_only()).is_err());
    }

    #[test]
    fn exact_match_only() {
        let registry = EndpointRegistry::new();
        registry.register("/v1/pkg", get_only()).expect("register");
        assert!(matches!(
            registry.lookup("/v1/pkg/", Method::Get),
            Lookup::NotRegistered
        ));
        assert!(matches!(
            registry.lookup("/v1", Method::Get),
            Lookup::NotRegistered
        ));
    }
}
