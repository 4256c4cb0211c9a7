//! Queue message carrying one image job.
//!
//! Messages are written as a versioned JSON envelope:
//!
//! ```text
//! {"v":1,"command":"PROCESS","source_key":"originals/img_1.png","options":{...},"job_id":"...","owner_id":"..."}
//! ```
//!
//! The older colon form `process:<sourceKey>:{json}:<ownerID>` is still
//! accepted on read. Its JSON object is located by the first `{` and the
//! last `}` so colons inside the JSON do not matter, and it must carry the
//! job id.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::processing::TransformOptions;

pub const DESCRIPTOR_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("message has no JSON object")]
    MissingPayload,

    #[error("malformed header: {0}")]
    Header(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("message carries no job id")]
    MissingJobId,

    #[error("message carries no owner id")]
    MissingOwner,

    #[error("unsupported descriptor version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    #[serde(rename = "PROCESS")]
    Process,
}

impl FromStr for Command {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("process") {
            Ok(Command::Process)
        } else {
            Err(DescriptorError::UnknownCommand(s.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub command: Command,
    pub source_key: String,
    #[serde(default)]
    pub options: TransformOptions,
    pub job_id: Uuid,
    pub owner_id: String,
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    v: u32,
    #[serde(flatten)]
    descriptor: &'a JobDescriptor,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    v: u32,
    #[serde(flatten)]
    descriptor: JobDescriptor,
}

#[derive(Deserialize)]
struct LegacyPayload {
    #[serde(flatten)]
    options: TransformOptions,
    #[serde(default, rename = "jobID", alias = "job_id", alias = "imageID")]
    job_id: Option<Uuid>,
}

const LEGACY_JOB_ID_KEYS: [&str; 3] = ["jobID", "job_id", "imageID"];

/// Locates the JSON object of a legacy message.
fn legacy_payload_bounds(raw: &str) -> Result<(usize, usize), DescriptorError> {
    let start = raw.find('{').ok_or(DescriptorError::MissingPayload)?;
    let end = raw.rfind('}').ok_or(DescriptorError::MissingPayload)?;
    if end < start {
        return Err(DescriptorError::MissingPayload);
    }
    Ok((start, end))
}

impl JobDescriptor {
    pub fn process(source_key: impl Into<String>, options: TransformOptions, job_id: Uuid, owner_id: impl Into<String>) -> Self {
        Self {
            command: Command::Process,
            source_key: source_key.into(),
            options,
            job_id,
            owner_id: owner_id.into(),
        }
    }

    pub fn encode(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string(&EnvelopeOut {
            v: DESCRIPTOR_VERSION,
            descriptor: self,
        })?)
    }

    pub fn decode(raw: &str) -> Result<Self, DescriptorError> {
        let raw = raw.trim();
        let descriptor = if raw.starts_with('{') {
            Self::decode_envelope(raw)?
        } else {
            Self::decode_legacy(raw)?
        };

        if descriptor.source_key.is_empty() {
            return Err(DescriptorError::Header("empty source key".to_string()));
        }
        if descriptor.owner_id.is_empty() {
            return Err(DescriptorError::MissingOwner);
        }
        Ok(descriptor)
    }

    fn decode_envelope(raw: &str) -> Result<Self, DescriptorError> {
        let envelope: EnvelopeIn = serde_json::from_str(raw)?;
        if envelope.v != DESCRIPTOR_VERSION {
            return Err(DescriptorError::UnsupportedVersion(envelope.v));
        }
        Ok(envelope.descriptor)
    }

    /// Best-effort job id from a message that failed to decode, so the
    /// worker can still fail the record it names. Returns `None` when the
    /// message has no parseable JSON object or no id in it.
    pub fn recover_job_id(raw: &str) -> Option<Uuid> {
        let raw = raw.trim();
        let (value, keys) = if raw.starts_with('{') {
            (serde_json::from_str::<serde_json::Value>(raw).ok()?, &["job_id"][..])
        } else {
            let (start, end) = legacy_payload_bounds(raw).ok()?;
            (serde_json::from_str(&raw[start..=end]).ok()?, &LEGACY_JOB_ID_KEYS[..])
        };

        keys.iter()
            .filter_map(|key| value.get(*key)?.as_str())
            .find_map(|id| Uuid::parse_str(id).ok())
    }

    fn decode_legacy(raw: &str) -> Result<Self, DescriptorError> {
        let (start, end) = legacy_payload_bounds(raw)?;

        let header = raw[..start]
            .strip_suffix(':')
            .ok_or_else(|| DescriptorError::Header(raw[..start].to_string()))?;
        let (command, source_key) = header
            .split_once(':')
            .ok_or_else(|| DescriptorError::Header(header.to_string()))?;
        let command: Command = command.parse()?;

        let payload: LegacyPayload = serde_json::from_str(&raw[start..=end])?;
        let job_id = payload.job_id.ok_or(DescriptorError::MissingJobId)?;

        let owner_id = raw[end + 1..]
            .strip_prefix(':')
            .ok_or(DescriptorError::MissingOwner)?;

        Ok(Self {
            command,
            source_key: source_key.to_string(),
            options: payload.options,
            job_id,
            owner_id: owner_id.to_string(),
        })
    }
}
