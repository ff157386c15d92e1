use std::sync::Arc;

use activity_feed_client::Request;
use http::HeaderValue;
use http::header::AUTHORIZATION;

/// Supplies credentials for outgoing requests. Implementations must be cheap
/// to call; the token is read once per request.
pub trait AuthProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

impl<A: AuthProvider + ?Sized> AuthProvider for Arc<A> {
    fn bearer_token(&self) -> Option<String> {
        (**self).bearer_token()
    }
}

pub(crate) fn add_auth_headers<A: AuthProvider>(auth: &A, mut req: Request) -> Request {
    if let Some(token) = auth.bearer_token()
        && let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}"))
    {
        req.headers.insert(AUTHORIZATION, value);
    }
    req
}
