//! In-memory transport for tests.

use crate::error::TransportError;
use crate::scrapers::pattern::markers::v1 as markers;
use crate::scrapers::traits::Transport;
use crate::scrapers::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

pub struct FakeTransport {
    handler: Handler,
    delay: Duration,
    requests: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every request open for `delay` so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

pub fn ok(body: impl Into<String>) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: 200,
        set_cookie: None,
        body: body.into(),
    })
}

pub fn redirect_with_cookie(cookie: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: 302,
        set_cookie: Some(cookie.to_string()),
        body: String::new(),
    })
}

/// A result page carrying the three rent-index rows
pub fn result_page(quality: &str, points: &str, rent: &str) -> String {
    format!(
        "<table>{}{quality}{end}{}{points}{end}{}{rent}{}</table>",
        markers::LOCATION_QUALITY_START,
        markers::QUALITY_POINTS_START,
        markers::RENT_RANGE_START,
        markers::RENT_RANGE_END,
        end = markers::ROW_END,
    )
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    fn host(&self) -> &str {
        "mietspiegel.test"
    }
}
