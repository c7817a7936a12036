//! Document model for tagged acquisition streams.
//!
//! Implements the Bluesky-style document model that translation nodes consume
//! and produce:
//!
//! - **StartDoc**: Session identity, metadata and provenance
//! - **DescriptorDoc**: Schema for one named data stream
//! - **EventDoc**: One measurement, keyed by data key
//! - **StopDoc**: Completion status and per-stream event counts
//!
//! # Document Flow
//!
//! ```text
//! StartDoc (1)
//!    │
//!    ├── DescriptorDoc (0+, one per data stream)
//!    │       │
//!    │       └── EventDoc (N, measurements)
//!    │
//! StopDoc (1)
//! ```
//!
//! Well-known fields are typed. Everything else a producer puts in a body is
//! kept in the flattened `extra`/`metadata` map, so addresses and merges can
//! reach arbitrary fields through [`Document::body_value`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::TranslateResult;

/// Stream name assumed for descriptors that do not declare one.
pub const DEFAULT_STREAM_NAME: &str = "primary";

/// Generate a new unique document ID
pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Current timestamp in nanoseconds since Unix epoch
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

fn default_stream_name() -> String {
    DEFAULT_STREAM_NAME.to_string()
}

/// The four document types, without their bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Start,
    Descriptor,
    Event,
    Stop,
}

impl DocKind {
    /// All document types in session order.
    pub const ALL: [DocKind; 4] = [
        DocKind::Start,
        DocKind::Descriptor,
        DocKind::Event,
        DocKind::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Start => "start",
            DocKind::Descriptor => "descriptor",
            DocKind::Event => "event",
            DocKind::Stop => "stop",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document types for experiment data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    Start(StartDoc),
    Descriptor(DescriptorDoc),
    Event(EventDoc),
    Stop(StopDoc),
}

impl Document {
    /// The document type tag
    pub fn kind(&self) -> DocKind {
        match self {
            Document::Start(_) => DocKind::Start,
            Document::Descriptor(_) => DocKind::Descriptor,
            Document::Event(_) => DocKind::Event,
            Document::Stop(_) => DocKind::Stop,
        }
    }

    /// Get the document UID
    pub fn uid(&self) -> &str {
        match self {
            Document::Start(d) => &d.uid,
            Document::Descriptor(d) => &d.uid,
            Document::Event(d) => &d.uid,
            Document::Stop(d) => &d.uid,
        }
    }

    /// Get the timestamp in nanoseconds
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Document::Start(d) => d.time_ns,
            Document::Descriptor(d) => d.time_ns,
            Document::Event(d) => d.time_ns,
            Document::Stop(d) => d.time_ns,
        }
    }

    /// The body as a plain JSON mapping, without the type tag.
    pub fn body_value(&self) -> TranslateResult<Value> {
        let body = match self {
            Document::Start(d) => serde_json::to_value(d)?,
            Document::Descriptor(d) => serde_json::to_value(d)?,
            Document::Event(d) => serde_json::to_value(d)?,
            Document::Stop(d) => serde_json::to_value(d)?,
        };
        Ok(body)
    }

    /// Rebuild a typed document from a type tag and a JSON body.
    pub fn from_body(kind: DocKind, body: Value) -> TranslateResult<Self> {
        let doc = match kind {
            DocKind::Start => Document::Start(serde_json::from_value(body)?),
            DocKind::Descriptor => Document::Descriptor(serde_json::from_value(body)?),
            DocKind::Event => Document::Event(serde_json::from_value(body)?),
            DocKind::Stop => Document::Stop(serde_json::from_value(body)?),
        };
        Ok(doc)
    }

    pub fn as_start(&self) -> Option<&StartDoc> {
        match self {
            Document::Start(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_descriptor(&self) -> Option<&DescriptorDoc> {
        match self {
            Document::Descriptor(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventDoc> {
        match self {
            Document::Event(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stop(&self) -> Option<&StopDoc> {
        match self {
            Document::Stop(d) => Some(d),
            _ => None,
        }
    }
}

impl From<StartDoc> for Document {
    fn from(doc: StartDoc) -> Self {
        Document::Start(doc)
    }
}

impl From<DescriptorDoc> for Document {
    fn from(doc: DescriptorDoc) -> Self {
        Document::Descriptor(doc)
    }
}

impl From<EventDoc> for Document {
    fn from(doc: EventDoc) -> Self {
        Document::Event(doc)
    }
}

impl From<StopDoc> for Document {
    fn from(doc: StopDoc) -> Self {
        Document::Stop(doc)
    }
}

/// Start document - emitted at the beginning of a session
///
/// The `uid` of a start document is the session id every other document of
/// the session refers back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartDoc {
    /// Unique session identifier
    pub uid: String,
    /// Timestamp when the session started
    #[serde(default)]
    pub time_ns: u64,
    /// Start uids of the sessions this one was derived from
    #[serde(default)]
    pub parent_uids: Vec<String>,
    /// Translation node uid -> start uid it was following
    #[serde(default)]
    pub parent_node_map: BTreeMap<String, String>,
    /// User-provided metadata and any other top-level fields
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl StartDoc {
    pub fn new() -> Self {
        Self {
            uid: new_uid(),
            time_ns: now_ns(),
            parent_uids: Vec::new(),
            parent_node_map: BTreeMap::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

impl Default for StartDoc {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor document - defines schema for event data
///
/// Each descriptor defines a "data stream" with named fields, their types,
/// shapes, and units. A session can have multiple descriptors (e.g. "primary"
/// for main data, "baseline" for background readings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorDoc {
    /// Unique descriptor ID
    pub uid: String,
    /// Links to StartDoc
    #[serde(default)]
    pub run_uid: String,
    /// Stream name (e.g., "primary", "baseline", "monitor")
    #[serde(default = "default_stream_name")]
    pub name: String,
    /// Schema for data fields
    #[serde(default)]
    pub data_keys: BTreeMap<String, DataKey>,
    /// Device configuration at descriptor creation time
    #[serde(default)]
    pub configuration: Map<String, Value>,
    /// Timestamp
    #[serde(default)]
    pub time_ns: u64,
    /// Any other top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DescriptorDoc {
    pub fn new(run_uid: &str, name: &str) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            name: name.to_string(),
            data_keys: BTreeMap::new(),
            configuration: Map::new(),
            time_ns: now_ns(),
            extra: Map::new(),
        }
    }

    pub fn with_data_key(mut self, name: &str, key: DataKey) -> Self {
        self.data_keys.insert(name.to_string(), key);
        self
    }

}

/// Schema for a data field within events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataKey {
    /// Data type: "number", "string", "boolean", "array", "object"
    #[serde(default)]
    pub dtype: String,
    /// Shape for arrays (empty for scalars)
    #[serde(default)]
    pub shape: Vec<usize>,
    /// Source device or processing node
    #[serde(default)]
    pub source: String,
    /// Physical units
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub units: String,
    /// Measurement precision (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    /// Lower limit (for validation/plotting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_limit: Option<f64>,
    /// Upper limit (for validation/plotting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_limit: Option<f64>,
}

impl DataKey {
    /// Create a scalar number data key
    pub fn scalar(source: &str, units: &str) -> Self {
        Self {
            dtype: "number".to_string(),
            source: source.to_string(),
            units: units.to_string(),
            ..Self::default()
        }
    }

    /// Create an array data key
    pub fn array(source: &str, shape: Vec<usize>) -> Self {
        Self {
            dtype: "array".to_string(),
            shape,
            source: source.to_string(),
            ..Self::default()
        }
    }

    /// Create a data key with an arbitrary dtype and no shape
    pub fn typed(dtype: &str, source: &str) -> Self {
        Self {
            dtype: dtype.to_string(),
            source: source.to_string(),
            ..Self::default()
        }
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

}

/// Event document - one measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDoc {
    /// Unique event ID
    pub uid: String,
    /// Links to DescriptorDoc that defines schema
    #[serde(alias = "descriptor")]
    pub descriptor_uid: String,
    /// Event sequence number within this descriptor stream (starts at 1)
    #[serde(default)]
    pub seq_num: u64,
    /// Timestamp
    #[serde(default)]
    pub time_ns: u64,
    /// Data values (field name -> value)
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Per-field timestamps (field name -> timestamp_ns)
    #[serde(default)]
    pub timestamps: BTreeMap<String, u64>,
    /// Any other top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventDoc {
    pub fn new(descriptor_uid: &str, seq_num: u64) -> Self {
        Self {
            uid: new_uid(),
            descriptor_uid: descriptor_uid.to_string(),
            seq_num,
            time_ns: now_ns(),
            data: Map::new(),
            timestamps: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn with_datum(mut self, field: &str, value: impl Into<Value>) -> Self {
        let ts = now_ns();
        self.data.insert(field.to_string(), value.into());
        self.timestamps.insert(field.to_string(), ts);
        self
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    #[default]
    Success,
    Abort,
    Fail,
}

/// Stop document - emitted at the end of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDoc {
    /// Unique stop doc ID
    pub uid: String,
    /// Links to StartDoc
    #[serde(default)]
    pub run_uid: String,
    /// Exit status
    #[serde(default)]
    pub exit_status: ExitStatus,
    /// Reason for abort/failure
    #[serde(default)]
    pub reason: String,
    /// Timestamp when session ended
    #[serde(default)]
    pub time_ns: u64,
    /// Events emitted, per stream name
    #[serde(default)]
    pub num_events: BTreeMap<String, u64>,
    /// Any other top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StopDoc {
    fn with_status(run_uid: &str, exit_status: ExitStatus, reason: &str) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            exit_status,
            reason: reason.to_string(),
            time_ns: now_ns(),
            num_events: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn success(run_uid: &str) -> Self {
        Self::with_status(run_uid, ExitStatus::Success, "")
    }

    pub fn with_event_count(mut self, stream: &str, count: u64) -> Self {
        self.num_events.insert(stream.to_string(), count);
        self
    }
}
