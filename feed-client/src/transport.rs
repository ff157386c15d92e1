use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::trace;

use crate::error::TransportError;
use crate::request::Request;
use crate::request::Response;
use crate::request::StreamResponse;

/// Minimal HTTP seam so endpoint code can be exercised without a network.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `req` and buffer the whole body. Non-2xx answers become
    /// [`TransportError::Http`] with the body text attached.
    async fn execute(&self, req: Request) -> Result<Response, TransportError>;

    /// Send `req` and hand back the body as a byte stream once the headers
    /// arrive. Non-2xx answers are buffered and reported like `execute`.
    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with a connect timeout only; total request deadlines
    /// are applied per request so streaming bodies are not cut off.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, TransportError> {
        let version = env!("CARGO_PKG_VERSION");
        let client = reqwest::Client::builder()
            .user_agent(format!("activity-feed/{version}"))
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::new(client))
    }

    fn build(&self, req: Request) -> reqwest::RequestBuilder {
        let Request {
            method,
            url,
            headers,
            timeout,
        } = req;
        trace!(%method, %url, "sending request");
        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        let resp = self.build(req).send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;

        if !status.is_success() {
            return Err(TransportError::Http {
                status,
                headers: Some(headers),
                body: String::from_utf8(body.to_vec()).ok(),
            });
        }

        Ok(Response {
            status,
            headers,
            body,
        })
    }

    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError> {
        let resp = self.build(req).send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();

        if !status.is_success() {
            let body = resp.text().await.ok();
            return Err(TransportError::Http {
                status,
                headers: Some(headers),
                body,
            });
        }

        let bytes = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(StreamResponse {
            status,
            headers,
            bytes,
        })
    }
}
