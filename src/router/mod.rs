//! Method and path routing.
//!
//! | Pattern       | Matches                   | Params                          |
//! |---------------|---------------------------|---------------------------------|
//! | `/time`       | `/time`                   | none                            |
//! | `/users/:id`  | `/users/42`               | `id = "42"`                     |
//! | `/files/*`    | `/files/docs/readme.txt`  | `wildcard = "/docs/readme.txt"` |
//!
//! A trailing slash is ignored on patterns and request paths alike. Routes are
//! tried in registration order and the first match wins.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// A boxed async handler as stored by the router.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Anything callable as `async fn(Context) -> Response`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(self(ctx))
    }
}

/// Drops one trailing slash, leaving the root path alone.
pub(crate) fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    Segments(Vec<Segment>),
    Prefix(String),
}

impl Pattern {
    fn compile(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);
        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Self::Prefix(prefix.to_owned());
        }
        if !pattern.contains(':') {
            return Self::Exact(pattern.to_owned());
        }
        Self::Segments(
            pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Capture(name.to_owned()),
                    None => Segment::Literal(s.to_owned()),
                })
                .collect(),
        )
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);
        let mut params = PathParams::new();
        match self {
            Self::Exact(p) => (p == path).then_some(params),
            Self::Prefix(prefix) => {
                let rest = path.strip_prefix(prefix.as_str())?;
                params.insert("wildcard".to_owned(), rest.to_owned());
                Some(params)
            }
            Self::Segments(segments) => {
                let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if parts.len() != segments.len() {
                    return None;
                }
                for (segment, part) in segments.iter().zip(parts) {
                    match segment {
                        Segment::Literal(literal) if literal != part => return None,
                        Segment::Literal(_) => {}
                        Segment::Capture(name) => params.insert(name.clone(), part.to_owned()),
                    }
                }
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// Dispatches requests to handlers by method and path. Unmatched requests
/// get an empty `404 Not Found`.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_cache::{Router, Response, StatusCode, context::Context};
///
/// let mut router = Router::new();
/// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok) });
/// router.get("/users/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.on(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.on(Method::Post, path, handler);
    }

    /// Registers `handler` for `method` requests matching `path`.
    pub fn on(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.routes.push(Route {
            method,
            pattern: Pattern::compile(path),
            handler: Arc::new(move |ctx| handler.call(ctx)),
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches a bare request.
    pub async fn route(&self, request: Request) -> Response {
        self.handle(Context::new(request)).await
    }

    /// Dispatches a [`Context`], keeping extensions set by earlier middleware.
    /// Path parameters from the matching route replace any already present.
    pub async fn handle(&self, mut ctx: Context) -> Response {
        let matched = self.routes.iter().find_map(|route| {
            if &route.method != ctx.request().method() {
                return None;
            }
            route
                .pattern
                .matches(ctx.request().path())
                .map(|params| (route, params))
        });

        let Some((route, params)) = matched else {
            return Response::new(StatusCode::NotFound);
        };
        ctx.set_params(params);
        (route.handler)(ctx).await
    }
}
