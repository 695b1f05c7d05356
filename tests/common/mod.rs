//! Shared utilities for integration tests.
//!
//! Provides a wiremock-backed Nomad agent and helpers for building
//! event stream bodies.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::{Request, Respond, ResponseTemplate};

use nomad_backup_operator::config::NomadConfig;
use nomad_backup_operator::nomad::NomadClient;

/// Client config pointing at a mock server.
pub fn nomad_config(uri: &str) -> NomadConfig {
    NomadConfig {
        address: uri.to_string(),
        ..NomadConfig::default()
    }
}

/// Client pointing at a mock server.
pub fn nomad_client(uri: &str) -> NomadClient {
    NomadClient::new(&nomad_config(uri)).expect("Failed to build Nomad client")
}

/// One event stream batch carrying a single job event.
pub fn job_batch(index: u64, event_type: &str, job_id: &str, meta: Value) -> Value {
    json!({
        "Index": index,
        "Events": [{
            "Topic": "Job",
            "Type": event_type,
            "Key": job_id,
            "Namespace": "default",
            "Index": index,
            "Payload": {
                "Job": {"ID": job_id, "Name": job_id, "Status": "running", "Meta": meta}
            }
        }]
    })
}

/// Heartbeat frame sent on idle streams.
pub fn heartbeat() -> Value {
    json!({})
}

/// Newline-delimited body from `frames`.
pub fn ndjson(frames: &[Value]) -> String {
    frames
        .iter()
        .map(|frame| format!("{frame}\n"))
        .collect()
}

/// Answers `/v1/jobs/parse` with a job named after the HCL `job` stanza.
pub struct ParseEcho;

impl Respond for ParseEcho {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match request.body_json() {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400).set_body_string("bad request body"),
        };
        let hcl = body["JobHCL"].as_str().unwrap_or_default();
        let id = hcl
            .split("job \"")
            .nth(1)
            .and_then(|rest| rest.split('"').next());

        match id {
            Some(id) => ResponseTemplate::new(200).set_body_json(json!({
                "ID": id,
                "Name": id,
                "Type": "batch",
                "Periodic": {"Enabled": true, "SpecType": "cron"}
            })),
            None => ResponseTemplate::new(400).set_body_string("1:1: no job stanza"),
        }
    }
}

/// Requests other than GETs, as `(method, path)`.
pub fn mutations(requests: &[Request]) -> Vec<(String, String)> {
    requests
        .iter()
        .filter(|r| r.method.as_str() != "GET")
        .map(|r| (r.method.as_str().to_string(), r.url.path().to_string()))
        .collect()
}

/// Value of query parameter `name` on `request`.
pub fn query(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
