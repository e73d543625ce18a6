//! Per-request context: the request itself, matched path parameters, and a
//! type-keyed map of request-scoped values.
//!
//! Middleware that runs early in a [`Pipeline`](crate::middleware::Pipeline)
//! can stash values (an authenticated principal, a tenant id) in
//! [`Context::extensions_mut`]; later middleware and handlers read them back
//! through [`Context::extensions`].

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased request extensions map: used to inject per-request state
/// into handlers without requiring handlers to know about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Path parameters extracted from the matched route.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request context handed through the middleware chain to the handler.
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
}

impl Context {
    /// Creates a context with no path parameters and no extensions.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// Creates a context carrying the parameters captured by a route match.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self {
            request,
            params,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Replaces the path parameters; used by the router once a route matches.
    pub fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    fn request() -> Request {
        Request::parse(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap()
            .0
    }

    #[test]
    fn extensions_are_keyed_by_type() {
        let mut ctx = Context::new(request());
        assert!(ctx.extensions().get::<Tenant>().is_none());

        ctx.extensions_mut().insert(Tenant("acme"));
        ctx.extensions_mut().insert(42u32);
        assert_eq!(ctx.extensions().get::<Tenant>(), Some(&Tenant("acme")));
        assert_eq!(ctx.extensions().get::<u32>(), Some(&42));

        assert_eq!(ctx.extensions_mut().remove::<Tenant>(), Some(Tenant("acme")));
        assert!(ctx.extensions().get::<Tenant>().is_none());
    }

    #[test]
    fn params_can_be_replaced() {
        let mut ctx = Context::new(request());
        assert!(ctx.params().is_empty());

        let mut params = PathParams::new();
        params.insert("id".into(), "7".into());
        ctx.set_params(params);
        assert_eq!(ctx.params().get("id"), Some("7"));
    }
}
