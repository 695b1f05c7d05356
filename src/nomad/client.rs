//! HTTP client for the Nomad API.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::ndjson::decode_event_batches;
use super::{
    Job, JobListStub, JobRegisterResponse, NodeListStub, NomadError, QueryMeta, Result, Topic,
    INDEX_HEADER, TOKEN_HEADER,
};
use crate::backup::{DeregisterOutcome, JobActions, JobSpecParser};
use crate::config::NomadConfig;
use crate::stream::{EventBatchStream, EventSource};

#[derive(Serialize)]
struct ParseJobRequest<'a> {
    #[serde(rename = "JobHCL")]
    job_hcl: &'a str,
    #[serde(rename = "Canonicalize")]
    canonicalize: bool,
}

#[derive(Serialize)]
struct RegisterJobRequest<'a> {
    #[serde(rename = "Job")]
    job: &'a Job,
}

/// Async client bound to one Nomad address and namespace.
///
/// Cheap to share behind an `Arc`; the job and node pipelines use the same
/// instance concurrently.
#[derive(Debug, Clone)]
pub struct NomadClient {
    http: reqwest::Client,
    address: Url,
    namespace: String,
    region: Option<String>,
}

impl NomadClient {
    /// Build a client from configuration.
    ///
    /// No request is made here; an unreachable agent surfaces on first use.
    pub fn new(config: &NomadConfig) -> Result<Self> {
        let address = Url::parse(&config.address).map_err(|e| NomadError::InvalidAddress {
            address: config.address.clone(),
            message: e.to_string(),
        })?;
        if address.cannot_be_a_base() {
            return Err(NomadError::InvalidAddress {
                address: config.address.clone(),
                message: "address cannot carry a path".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(token).map_err(|_| NomadError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(TOKEN_HEADER, value);
        }

        // No overall timeout: the event stream is a long-lived response.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            address,
            namespace: config.namespace.clone(),
            region: config.region.clone().filter(|r| !r.is_empty()),
        })
    }

    /// Agent address this client talks to.
    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Raft peers of the cluster, used for the startup banner.
    pub async fn peers(&self) -> Result<Vec<String>> {
        let response = self.send(self.request(Method::GET, &["v1", "status", "peers"])?).await?;
        Ok(response.json().await?)
    }

    /// List all jobs in the namespace.
    pub async fn list_jobs(&self) -> Result<(Vec<JobListStub>, QueryMeta)> {
        self.list(&["v1", "jobs"]).await
    }

    /// List all client nodes.
    pub async fn list_nodes(&self) -> Result<(Vec<NodeListStub>, QueryMeta)> {
        self.list(&["v1", "nodes"]).await
    }

    /// Open the event stream for every key on `topic`, starting at `index`.
    pub async fn stream(&self, topic: Topic, index: u64) -> Result<EventBatchStream> {
        let request = self
            .request(Method::GET, &["v1", "event", "stream"])?
            .query(&[("topic", topic.all_keys()), ("index", index.to_string())]);
        let response = self.send(request).await?;

        debug!(topic = %topic, index, "Event stream response received");

        Ok(decode_event_batches(Box::pin(response.bytes_stream())).boxed())
    }

    /// Convert HCL job text into the structured job form.
    pub async fn parse_job(&self, hcl: &str) -> Result<Job> {
        let body = ParseJobRequest {
            job_hcl: hcl,
            canonicalize: true,
        };
        let request = self
            .request(Method::POST, &["v1", "jobs", "parse"])?
            .json(&body);
        self.json(request).await
    }

    /// Register a job, replacing any job with the same ID.
    pub async fn register_job(&self, job: &Job) -> Result<JobRegisterResponse> {
        let request = self
            .request(Method::POST, &["v1", "jobs"])?
            .json(&RegisterJobRequest { job });
        self.json(request).await
    }

    /// Deregister a job.
    ///
    /// Returns `Ok(None)` when the job does not exist.
    pub async fn deregister_job(
        &self,
        job_id: &str,
        purge: bool,
    ) -> Result<Option<JobRegisterResponse>> {
        let request = self
            .request(Method::DELETE, &["v1", "job", job_id])?
            .query(&[("purge", purge.to_string())]);
        match self.json(request).await {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<(Vec<T>, QueryMeta)> {
        let response = self.send(self.request(Method::GET, segments)?).await?;
        let meta = query_meta(&response);
        let items = response.json().await?;
        Ok((items, meta))
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut url = self.address.clone();
        url.path_segments_mut()
            .map_err(|_| NomadError::InvalidAddress {
                address: self.address.to_string(),
                message: "address cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);

        let mut builder = self
            .http
            .request(method, url)
            .query(&[("namespace", self.namespace.as_str())]);
        if let Some(region) = &self.region {
            builder = builder.query(&[("region", region.as_str())]);
        }
        Ok(builder)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(NomadError::Api {
            status: status.as_u16(),
            message: if message.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string()
            } else {
                message.trim().to_string()
            },
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn query_meta(response: &Response) -> QueryMeta {
    let last_index = response
        .headers()
        .get(INDEX_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    QueryMeta { last_index }
}

#[async_trait]
impl EventSource for NomadClient {
    async fn last_index(&self, topic: Topic) -> Result<u64> {
        let meta = match topic {
            Topic::Job => self.list_jobs().await?.1,
            Topic::Node => self.list_nodes().await?.1,
        };
        Ok(meta.last_index)
    }

    async fn subscribe(&self, topic: Topic, index: u64) -> Result<EventBatchStream> {
        self.stream(topic, index).await
    }
}

#[async_trait]
impl JobSpecParser for NomadClient {
    async fn parse(&self, spec: &str) -> Result<Job> {
        self.parse_job(spec).await
    }
}

#[async_trait]
impl JobActions for NomadClient {
    async fn register(&self, job: &Job) -> Result<JobRegisterResponse> {
        self.register_job(job).await
    }

    async fn deregister(&self, job_id: &str, purge: bool) -> Result<DeregisterOutcome> {
        Ok(match self.deregister_job(job_id, purge).await? {
            Some(response) => DeregisterOutcome::Removed {
                eval_id: response.eval_id,
            },
            None => DeregisterOutcome::NotFound,
        })
    }
}
