use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Request};

use crate::args::HttpMethod;
use crate::error::HttpError;

use super::template::{RequestSpec, RequestTemplate};

/// What happened to one attempt on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Response { status: u16 },
    TimedOut,
    Failed { message: String },
}

/// Sends one request. Implementations must never panic on network errors;
/// every failure is reported through [`SendOutcome`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, template: &RequestTemplate, timeout: Duration) -> SendOutcome;
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    pub insecure: bool,
    pub pool_max_idle_per_host: Option<usize>,
    pub user_agent: Option<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            insecure: false,
            pool_max_idle_per_host: None,
            user_agent: Some(crate::args::DEFAULT_USER_AGENT.to_owned()),
        }
    }
}

/// reqwest-backed transport with a single pooled client for all workers.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds the pooled client.
    ///
    /// # Errors
    ///
    /// Returns an error when reqwest rejects the client configuration.
    pub fn new(options: &TransportOptions) -> Result<Self, HttpError> {
        let mut builder = Client::builder().connect_timeout(options.connect_timeout);
        if let Some(agent) = options.user_agent.as_deref() {
            builder = builder.user_agent(agent);
        }
        if options.insecure {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        if let Some(max_idle) = options.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(max_idle);
        }
        let client = builder
            .build()
            .map_err(|source| HttpError::BuildClientFailed { source })?;
        Ok(Self { client })
    }

    /// Rejects header names or values reqwest would refuse at send time.
    ///
    /// # Errors
    ///
    /// Returns the first header that cannot be encoded.
    pub fn validate_headers(headers: &[(String, String)]) -> Result<(), HttpError> {
        for (name, value) in headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|source| {
                HttpError::InvalidHeaderName {
                    header: name.clone(),
                    source,
                }
            })?;
            HeaderValue::from_str(value).map_err(|source| HttpError::InvalidHeaderValue {
                header: name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn build_request(&self, spec: &RequestSpec, timeout: Duration) -> Result<Request, reqwest::Error> {
        let url = spec.url.clone();
        let mut request_builder = match spec.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Patch => self.client.patch(url),
            HttpMethod::Delete => self.client.delete(url),
            HttpMethod::Head => self.client.head(url),
        };
        for (name, value) in &spec.headers {
            request_builder = request_builder.header(name, value);
        }
        if let Some(body) = spec.body.as_ref() {
            request_builder = request_builder.body(body.clone());
        }
        request_builder.timeout(timeout).build()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, template: &RequestTemplate, timeout: Duration) -> SendOutcome {
        let request = match self.build_request(template.spec(), timeout) {
            Ok(request) => request,
            Err(err) => return classify(&err),
        };
        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status().as_u16();
                match drain_response_body(response).await {
                    Ok(_bytes) => SendOutcome::Response { status },
                    Err(err) => classify(&err),
                }
            }
            Err(err) => classify(&err),
        }
    }
}

fn classify(err: &reqwest::Error) -> SendOutcome {
    if err.is_timeout() {
        SendOutcome::TimedOut
    } else {
        SendOutcome::Failed {
            message: err.to_string(),
        }
    }
}

async fn drain_response_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        total_bytes = total_bytes.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
    }
    Ok(total_bytes)
}
