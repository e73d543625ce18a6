//! Cache key derivation.
//!
//! A [`KeyExtractor`] looks at a request and decides which key its response
//! is cached under and for how long. It must only read the request. Any
//! `Fn(&Context) -> Result<(String, Duration), ExtractError>` closure is an
//! extractor; [`by_path`] and [`by_client`] cover the common cases.

use std::time::Duration;

use super::ExtractError;
use crate::context::Context;
use crate::router::trim_trailing_slash;

/// Derives a cache key and time-to-live from an inbound request.
pub trait KeyExtractor: Send + Sync {
    /// Returns `(key, ttl)` for the request in `ctx`.
    fn extract(&self, ctx: &Context) -> Result<(String, Duration), ExtractError>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&Context) -> Result<(String, Duration), ExtractError> + Send + Sync,
{
    fn extract(&self, ctx: &Context) -> Result<(String, Duration), ExtractError> {
        self(ctx)
    }
}

/// The authenticated caller, placed in the request extensions by an
/// authentication middleware that runs before the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

/// Caches by request path with a fixed `ttl`.
///
/// The query string is not part of the key. A trailing slash is dropped so
/// `/time/` and `/time` share an entry, matching how routes are matched.
pub fn by_path(ttl: Duration) -> impl KeyExtractor {
    move |ctx: &Context| -> Result<(String, Duration), ExtractError> {
        let path = trim_trailing_slash(ctx.request().path());
        Ok((path.to_owned(), ttl))
    }
}

/// Caches per caller.
///
/// Authenticated requests (a [`Principal`] in the extensions) are keyed by
/// the principal and kept for `authenticated_ttl`; anonymous ones are keyed
/// by the peer IP address and kept for `anonymous_ttl`. A request with
/// neither cannot be attributed to a caller and fails extraction.
pub fn by_client(anonymous_ttl: Duration, authenticated_ttl: Duration) -> impl KeyExtractor {
    move |ctx: &Context| -> Result<(String, Duration), ExtractError> {
        if let Some(Principal(user)) = ctx.extensions().get::<Principal>() {
            return Ok((user.clone(), authenticated_ttl));
        }
        ctx.request()
            .peer_addr()
            .map(|addr| (addr.ip().to_string(), anonymous_ttl))
            .ok_or_else(|| ExtractError::new("request has no peer address to key the cache by"))
    }
}
