use crate::error::TransportError;
use crate::scrapers::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;

/// Request/response transport every scrape step goes through.
/// Redirects are never followed, so `Set-Cookie` of a redirect stays visible.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request against the target host
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Host name sent with every request
    fn host(&self) -> &str;
}
