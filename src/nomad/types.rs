//! Wire types for the subset of the Nomad API the operator touches.
//!
//! Job and node bodies keep every field they were sent with in `extra`, so a
//! job returned by `/v1/jobs/parse` can be registered back without loss.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::NomadError;

/// Event stream topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Job,
    Node,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Job => "Job",
            Topic::Node => "Node",
        }
    }

    /// Subscription filter matching every key on this topic.
    pub fn all_keys(&self) -> String {
        format!("{}:*", self.as_str())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle classification of a raw event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Registered,
    Deregistered,
    Other(String),
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "JobRegistered" | "NodeRegistration" => EventKind::Registered,
            "JobDeregistered" | "NodeDeregistration" => EventKind::Deregistered,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Registered => f.write_str("Registered"),
            EventKind::Deregistered => f.write_str("Deregistered"),
            EventKind::Other(raw) => f.write_str(raw),
        }
    }
}

/// Metadata returned alongside blocking-query responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryMeta {
    /// Raft index the response reflects.
    pub last_index: u64,
}

/// A Nomad job. Only the fields the operator reads are typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        rename = "Meta",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub meta: HashMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or_default()
    }
}

/// A Nomad client node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Datacenter", default)]
    pub datacenter: String,
    #[serde(rename = "NodeClass", default)]
    pub node_class: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `GET /v1/jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListStub {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Type", default)]
    pub job_type: String,
}

/// Entry of `GET /v1/nodes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeListStub {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

/// Response to job register and deregister calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobRegisterResponse {
    #[serde(rename = "EvalID", default)]
    pub eval_id: String,
    #[serde(rename = "JobModifyIndex", default)]
    pub job_modify_index: u64,
}

/// One batch read from the event stream.
///
/// The server sends an empty object on idle connections; that decodes to
/// index 0 with no events and is reported by [`Events::is_heartbeat`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Events {
    #[serde(rename = "Index", default)]
    pub index: u64,
    #[serde(rename = "Events", default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
}

impl Events {
    pub fn is_heartbeat(&self) -> bool {
        self.index == 0 && self.events.is_empty()
    }
}

/// A single event within a batch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Event {
    #[serde(rename = "Topic", default)]
    pub topic: String,
    #[serde(rename = "Type", default)]
    pub event_type: String,
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "Namespace", default)]
    pub namespace: String,
    #[serde(rename = "Index", default)]
    pub index: u64,
    #[serde(rename = "Payload", default)]
    pub payload: Option<Value>,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        EventKind::from_type(&self.event_type)
    }

    /// Job carried by the payload, `None` when the payload has no job.
    pub fn job(&self) -> Result<Option<Job>, NomadError> {
        self.payload_field("Job")
    }

    /// Node carried by the payload, `None` when the payload has no node.
    pub fn node(&self) -> Result<Option<Node>, NomadError> {
        self.payload_field("Node")
    }

    fn payload_field<T>(&self, key: &str) -> Result<Option<T>, NomadError>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.payload.as_ref().and_then(|p| p.get(key)) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
