//! HTTP transport used by a session.
//!
//! The session engine only needs "send this request, give me status and
//! body", so the wire is hidden behind the [`Transport`] trait. The
//! production implementation wraps a blocking `reqwest` client.

use std::fmt;
use std::time::Duration;

use reqwest::{blocking::Client, header, redirect, Method};
use tracing::{debug, info};

use super::error::DynError;
use crate::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }

    fn method(&self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully prepared request: normalized path, headers and encoded body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub verb: Verb,
    pub path: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status line, `Location` header and body of a response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            location: None,
            body: body.into(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 307,
            location: Some(location.into()),
            body: String::new(),
        }
    }
}

pub trait Transport: Send + Sync {
    /// Send one request. Transport-level failures map to `DynError::Connect`;
    /// any response with a body, whatever its status code, is returned as-is.
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, DynError>;
}

/// Transport over HTTPS (or plain HTTP when `ssl` is off) to a fixed host.
/// Clone is cheap - the client is reference counted internally.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &SessionConfig) -> Result<Self, DynError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            // 307 responses carry a job location the session polls itself
            .redirect(redirect::Policy::none());

        if let Some(ref proxy) = config.proxy {
            let proxy_url = format!("http://{}:{}", proxy.host, proxy.port);
            let mut reqwest_proxy = reqwest::Proxy::all(&proxy_url)?;
            if let (Some(user), Some(pass)) = (&proxy.user, &proxy.password) {
                reqwest_proxy = reqwest_proxy.basic_auth(user, pass);
            }
            info!(host = %config.host, port = config.port, proxy = %proxy_url, "Using proxy");
            builder = builder.proxy(reqwest_proxy);
        }

        let client = builder.build()?;
        let base_url = config.base_url();
        info!(url = %base_url, ssl = config.ssl, "Prepared API connection");

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, DynError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.request(request.verb.method(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.body(request.body.clone()).send()?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text()?;
        debug!(status, bytes = body.len(), "Response received");

        Ok(RawResponse {
            status,
            location,
            body,
        })
    }
}
