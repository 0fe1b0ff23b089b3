use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Result, ZeppelinError};

use super::{
    RemoteBuildRequest, RemoteBuildResponse, RemoteBuildStatusRequest, RemoteBuildStatusResponse,
    RemoteIndexClient,
};

const BUILD_PATH: &str = "_build";
const STATUS_PATH: &str = "_status";

/// Talks to the build service over HTTP and polls job status until the job
/// finishes or the timeout passes.
pub struct HttpRemoteIndexClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Option<(String, Option<String>)>,
    initial_delay: Duration,
    poll_interval: Duration,
    timeout: Duration,
}

impl HttpRemoteIndexClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ZeppelinError::Config(format!("invalid build service endpoint {}: {e}", config.endpoint))
        })?;
        // Url::join replaces the last segment unless the path ends in '/'.
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint,
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            initial_delay: config.initial_delay(),
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .map_err(|e| ZeppelinError::Config(format!("invalid build service path {path}: {e}")))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }

    /// Status URL with `job_id` percent-encoded as a single path segment.
    fn status_url(&self, job_id: &str) -> Result<Url> {
        let mut url = self.url(STATUS_PATH)?;
        url.path_segments_mut()
            .map_err(|_| {
                ZeppelinError::Config(format!("build service endpoint {} cannot take a path", self.endpoint))
            })?
            .push(job_id);
        Ok(url)
    }

    async fn status(&self, job_id: &str) -> Result<RemoteBuildStatusResponse> {
        let url = self.status_url(job_id)?;
        let response = self.authorize(self.http.get(url)).send().await?;
        parse_response(response, "status").await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ZeppelinError::RemoteBuild(format!(
            "{what} request returned {status}: {body}"
        )));
    }
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl RemoteIndexClient for HttpRemoteIndexClient {
    #[instrument(skip(self, request), fields(tenant = %request.tenant_id, vector_path = %request.vector_path))]
    async fn submit_vector_build(&self, request: &RemoteBuildRequest) -> Result<RemoteBuildResponse> {
        let url = self.url(BUILD_PATH)?;
        let response = self
            .authorize(self.http.post(url).json(request))
            .send()
            .await?;
        let submitted: RemoteBuildResponse = parse_response(response, "build").await?;
        if submitted.job_id.is_empty() {
            return Err(ZeppelinError::RemoteBuild(
                "build service returned an empty job id".to_string(),
            ));
        }
        info!(job_id = %submitted.job_id, "submitted remote build");
        Ok(submitted)
    }

    #[instrument(skip(self), fields(job_id = %request.job_id))]
    async fn await_vector_build(
        &self,
        request: &RemoteBuildStatusRequest,
    ) -> Result<RemoteBuildStatusResponse> {
        let started = Instant::now();
        tokio::time::sleep(self.initial_delay).await;

        loop {
            let status = self.status(&request.job_id).await?;
            if status.is_terminal() {
                info!(
                    status = %status.task_status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "remote build reached terminal state"
                );
                return Ok(status);
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Err(ZeppelinError::RemoteBuildTimeout {
                    job_id: request.job_id.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
            debug!(status = %status.task_status, "remote build still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_path_is_preserved() {
        let config = ClientConfig {
            endpoint: "http://builder:8080/api".to_string(),
            ..Default::default()
        };
        let client = HttpRemoteIndexClient::new(&config).unwrap();
        assert_eq!(
            client.url("_status/abc").unwrap().as_str(),
            "http://builder:8080/api/_status/abc"
        );
    }

    #[test]
    fn job_id_is_a_single_path_segment() {
        let config = ClientConfig {
            endpoint: "http://builder:8080/api".to_string(),
            ..Default::default()
        };
        let client = HttpRemoteIndexClient::new(&config).unwrap();
        assert_eq!(
            client.status_url("abc").unwrap().as_str(),
            "http://builder:8080/api/_status/abc"
        );
        assert_eq!(
            client.status_url("a/b?c#d").unwrap().as_str(),
            "http://builder:8080/api/_status/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn invalid_endpoint_is_config_error() {
        let config = ClientConfig {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpRemoteIndexClient::new(&config),
            Err(ZeppelinError::Config(_))
        ));
    }
}
