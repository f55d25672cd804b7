//! Record types persisted by the store and the codec glue around them.
//!
//! Record bodies encode as JSON and tolerate unknown fields on decode, so a
//! newer controller's blobs load on an older one. Two spots keep a raw
//! binary shape instead: the delegation-token sequence number (a big-endian
//! `i32` blob) and the credentials bundle inside an attempt (a
//! length-prefixed token-storage stream).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use thiserror::Error;

pub const APPLICATION_ID_PREFIX: &str = "application_";
pub const APPLICATION_ATTEMPT_ID_PREFIX: &str = "appattempt_";
pub const CONTAINER_ID_PREFIX: &str = "container_";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token storage stream error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid identifier {0:?}")]
    InvalidId(String),
    #[error("sequence-number blob must be 4 bytes, got {0}")]
    BadSequenceBlob(usize),
}

/// Encodes a record body to its znode blob.
pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(record)?)
}

/// Decodes a znode blob; unknown fields are ignored.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_sequence_number(sequence_number: i32) -> Vec<u8> {
    sequence_number.to_be_bytes().to_vec()
}

pub fn decode_sequence_number(bytes: &[u8]) -> Result<i32, CodecError> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| CodecError::BadSequenceBlob(bytes.len()))?;
    Ok(i32::from_be_bytes(raw))
}

/// `application_<cluster timestamp>_<sequence>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplicationId {
    pub cluster_timestamp: u64,
    pub id: u32,
}

impl ApplicationId {
    pub fn new(cluster_timestamp: u64, id: u32) -> Self {
        Self {
            cluster_timestamp,
            id,
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{APPLICATION_ID_PREFIX}{}_{:04}",
            self.cluster_timestamp, self.id
        )
    }
}

impl FromStr for ApplicationId {
    type Err = CodecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let rest = raw
            .strip_prefix(APPLICATION_ID_PREFIX)
            .ok_or_else(|| CodecError::InvalidId(raw.to_string()))?;
        let (timestamp, id) = rest
            .split_once('_')
            .ok_or_else(|| CodecError::InvalidId(raw.to_string()))?;
        Ok(Self {
            cluster_timestamp: timestamp
                .parse()
                .map_err(|_| CodecError::InvalidId(raw.to_string()))?,
            id: id.parse().map_err(|_| CodecError::InvalidId(raw.to_string()))?,
        })
    }
}

/// `appattempt_<cluster timestamp>_<application sequence>_<attempt>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplicationAttemptId {
    pub application_id: ApplicationId,
    pub attempt_id: u32,
}

impl ApplicationAttemptId {
    pub fn new(application_id: ApplicationId, attempt_id: u32) -> Self {
        Self {
            application_id,
            attempt_id,
        }
    }
}

impl fmt::Display for ApplicationAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{APPLICATION_ATTEMPT_ID_PREFIX}{}_{:04}_{:06}",
            self.application_id.cluster_timestamp, self.application_id.id, self.attempt_id
        )
    }
}

impl FromStr for ApplicationAttemptId {
    type Err = CodecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::InvalidId(raw.to_string());
        let rest = raw
            .strip_prefix(APPLICATION_ATTEMPT_ID_PREFIX)
            .ok_or_else(invalid)?;
        let mut parts = rest.split('_');
        let timestamp = parts.next().ok_or_else(invalid)?;
        let app = parts.next().ok_or_else(invalid)?;
        let attempt = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            application_id: ApplicationId {
                cluster_timestamp: timestamp.parse().map_err(|_| invalid())?,
                id: app.parse().map_err(|_| invalid())?,
            },
            attempt_id: attempt.parse().map_err(|_| invalid())?,
        })
    }
}

/// `container_<cluster timestamp>_<application sequence>_<attempt>_<container>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId {
    pub attempt_id: ApplicationAttemptId,
    pub container_id: u64,
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CONTAINER_ID_PREFIX}{}_{:04}_{:02}_{:06}",
            self.attempt_id.application_id.cluster_timestamp,
            self.attempt_id.application_id.id,
            self.attempt_id.attempt_id,
            self.container_id
        )
    }
}

impl FromStr for ContainerId {
    type Err = CodecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::InvalidId(raw.to_string());
        let rest = raw.strip_prefix(CONTAINER_ID_PREFIX).ok_or_else(invalid)?;
        let mut parts = rest.split('_');
        let timestamp = parts.next().ok_or_else(invalid)?;
        let app = parts.next().ok_or_else(invalid)?;
        let attempt = parts.next().ok_or_else(invalid)?;
        let container = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            attempt_id: ApplicationAttemptId {
                application_id: ApplicationId {
                    cluster_timestamp: timestamp.parse().map_err(|_| invalid())?,
                    id: app.parse().map_err(|_| invalid())?,
                },
                attempt_id: attempt.parse().map_err(|_| invalid())?,
            },
            container_id: container.parse().map_err(|_| invalid())?,
        })
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(ApplicationId);
string_serde!(ApplicationAttemptId);
string_serde!(ContainerId);

/// Layout version of the persisted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
}

impl Version {
    pub fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }

    /// Same major version: the layouts are mutually readable.
    pub fn is_compatible_to(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Blob stored under the epoch znode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub memory_mb: i64,
    pub virtual_cores: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSubmissionContext {
    pub application_id: ApplicationId,
    pub application_name: String,
    pub queue: String,
    #[serde(default)]
    pub unmanaged_am: bool,
    #[serde(default)]
    pub max_app_attempts: i32,
    pub resource: Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RmAppState {
    New,
    NewSaving,
    Submitted,
    Accepted,
    Running,
    Finishing,
    Finished,
    Failed,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RmAppAttemptState {
    New,
    Submitted,
    Scheduled,
    Allocated,
    Launched,
    Running,
    Finishing,
    Finished,
    Failed,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FinalApplicationStatus {
    #[default]
    Undefined,
    Succeeded,
    Failed,
    Killed,
}

fn default_exit_status() -> i32 {
    // The exit status recorded before the AM container has reported one.
    -1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationState {
    pub submit_time: u64,
    #[serde(default)]
    pub start_time: u64,
    pub submission_context: ApplicationSubmissionContext,
    pub user: String,
    pub state: RmAppState,
    #[serde(default)]
    pub diagnostics: String,
    #[serde(default)]
    pub finish_time: u64,
    /// Populated from the attempt child znodes at load; never serialized
    /// into the application blob.
    #[serde(skip)]
    pub attempts: BTreeMap<ApplicationAttemptId, ApplicationAttemptState>,
}

impl ApplicationState {
    pub fn application_id(&self) -> ApplicationId {
        self.submission_context.application_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationAttemptState {
    pub attempt_id: ApplicationAttemptId,
    #[serde(default)]
    pub master_container: Option<ContainerId>,
    /// Serialized credentials bundle, produced by
    /// [`Credentials::write_token_storage`].
    #[serde(default)]
    pub app_attempt_tokens: Option<Vec<u8>>,
    #[serde(default)]
    pub start_time: u64,
    #[serde(default)]
    pub finish_time: u64,
    pub state: RmAppAttemptState,
    #[serde(default)]
    pub final_tracking_url: String,
    #[serde(default)]
    pub diagnostics: String,
    #[serde(default)]
    pub final_application_status: FinalApplicationStatus,
    #[serde(default = "default_exit_status")]
    pub am_container_exit_status: i32,
    #[serde(default)]
    pub memory_seconds: i64,
    #[serde(default)]
    pub vcore_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationKey {
    pub key_id: i32,
    pub expiry_date: u64,
    #[serde(default)]
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationTokenIdentifier {
    pub owner: String,
    pub renewer: String,
    #[serde(default)]
    pub real_user: String,
    pub issue_date: u64,
    pub max_date: u64,
    pub sequence_number: i32,
    pub master_key_id: i32,
}

/// Blob stored under a delegation-token znode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationTokenRecord {
    pub identifier: DelegationTokenIdentifier,
    pub renew_date: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKey {
    pub key_id: i32,
    #[serde(default)]
    pub key_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmrmTokenSecretManagerState {
    #[serde(default)]
    pub current_master_key: Option<MasterKey>,
    #[serde(default)]
    pub next_master_key: Option<MasterKey>,
}

/// Delegation-token secret-manager portion of the recovered state.
#[derive(Debug, Default)]
pub struct RmDtSecretManagerState {
    pub master_key_state: HashSet<DelegationKey>,
    pub dt_sequence_number: i32,
    pub delegation_token_state: HashMap<DelegationTokenIdentifier, u64>,
}

/// Everything the resource manager needs to resume after a failover.
#[derive(Debug, Default)]
pub struct RmState {
    pub app_state: BTreeMap<ApplicationId, ApplicationState>,
    pub rm_secret_manager_state: RmDtSecretManagerState,
    pub amrm_token_secret_manager_state: Option<AmrmTokenSecretManagerState>,
}

/// Token bundle attached to an application attempt, persisted through a
/// length-prefixed stream rather than the JSON codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub tokens: BTreeMap<String, Vec<u8>>,
    pub secret_keys: BTreeMap<String, Vec<u8>>,
}

fn write_chunk<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_be_bytes())?;
    writer.write_all(bytes)
}

fn read_chunk<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let mut bytes = vec![0u8; u32::from_be_bytes(len) as usize];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_string_chunk<R: Read>(reader: &mut R) -> io::Result<String> {
    String::from_utf8(read_chunk(reader)?)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

impl Credentials {
    pub fn write_token_storage<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&(self.tokens.len() as u32).to_be_bytes())?;
        for (alias, token) in &self.tokens {
            write_chunk(writer, alias.as_bytes())?;
            write_chunk(writer, token)?;
        }
        writer.write_all(&(self.secret_keys.len() as u32).to_be_bytes())?;
        for (alias, secret) in &self.secret_keys {
            write_chunk(writer, alias.as_bytes())?;
            write_chunk(writer, secret)?;
        }
        Ok(())
    }

    pub fn read_token_storage<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut credentials = Credentials::default();
        let mut count = [0u8; 4];
        reader.read_exact(&mut count)?;
        for _ in 0..u32::from_be_bytes(count) {
            let alias = read_string_chunk(reader)?;
            credentials.tokens.insert(alias, read_chunk(reader)?);
        }
        reader.read_exact(&mut count)?;
        for _ in 0..u32::from_be_bytes(count) {
            let alias = read_string_chunk(reader)?;
            credentials.secret_keys.insert(alias, read_chunk(reader)?);
        }
        Ok(credentials)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::new();
        self.write_token_storage(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Self::read_token_storage(&mut &bytes[..])?)
    }
}
