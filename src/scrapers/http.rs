use crate::config::Config;
use crate::error::TransportError;
use crate::scrapers::traits::Transport;
use crate::scrapers::types::{HttpRequest, HttpResponse, Method};
use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Resolve `host` to its first IPv4 address
pub async fn resolve_ipv4(host: &str, port: u16) -> Result<Ipv4Addr, TransportError> {
    let dns_error = || TransportError::Dns {
        host: host.to_string(),
    };

    tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| dns_error())?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(dns_error)
}

/// reqwest-backed transport pinned to one pre-resolved IPv4 address
pub struct ReqwestTransport {
    client: Client,
    host: String,
    base_url: String,
    cancel: CancellationToken,
}

impl ReqwestTransport {
    /// Resolve the configured host once, then build the client
    pub async fn connect(cfg: &Config, cancel: CancellationToken) -> Result<Self, TransportError> {
        let ip = resolve_ipv4(&cfg.host, cfg.port).await?;
        info!(host = %cfg.host, %ip, "Resolved target host");
        Self::with_address(cfg, ip, cancel)
    }

    pub fn with_address(
        cfg: &Config,
        ip: Ipv4Addr,
        cancel: CancellationToken,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .redirect(Policy::none())
            .danger_accept_invalid_certs(cfg.accept_invalid_certs)
            .resolve(&cfg.host, SocketAddr::new(IpAddr::V4(ip), cfg.port))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            host: cfg.host.clone(),
            base_url: cfg.base_url(),
            cancel,
        })
    }

    async fn send(&self, request: HttpRequest, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url).form(&request.form),
        };
        if let Some(cookie) = &request.cookie {
            builder = builder.header(COOKIE, cookie);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        debug!(url, status, bytes = body.len(), "Received response");

        Ok(HttpResponse {
            status,
            set_cookie,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled(url.clone())),
            result = self.send(request, &url) => result.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(url.clone())
                } else if e.is_connect() {
                    TransportError::Connect(url.clone())
                } else {
                    TransportError::Http(e)
                }
            }),
        }
    }

    fn host(&self) -> &str {
        &self.host
    }
}
