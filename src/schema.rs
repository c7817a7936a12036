//! Document generation for reconstructed sessions.
//!
//! [`DocFactory`] turns payloads back into documents: it decides the data
//! keys, infers a schema from a sample payload and keeps the per-session
//! bookkeeping (start uid, descriptor uid, sequence numbers) needed to link
//! the documents of one session together.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::document::{
    now_ns, DataKey, DescriptorDoc, EventDoc, StartDoc, StopDoc, DEFAULT_STREAM_NAME,
};
use crate::error::{TranslateError, TranslateResult};

/// Data key used when neither explicit keys nor a mapping payload name the data.
pub const FALLBACK_DATA_KEY: &str = "data";

/// Provenance fields stamped onto a reconstructed start document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    pub parent_uids: Vec<String>,
    pub parent_node_map: BTreeMap<String, String>,
}

impl Provenance {
    pub fn record(&mut self, node_uid: &str, start_uid: &str) {
        self.parent_uids.push(start_uid.to_string());
        self.parent_node_map
            .insert(node_uid.to_string(), start_uid.to_string());
    }
}

/// Infer the schema of a single value.
pub fn infer_data_key(value: &Value, source: &str) -> DataKey {
    match value {
        Value::Array(_) => DataKey::array(source, shape_of(value)),
        Value::Number(_) => DataKey::scalar(source, ""),
        Value::String(_) => DataKey::typed("string", source),
        Value::Bool(_) => DataKey::typed("boolean", source),
        Value::Object(_) => DataKey::typed("object", source),
        Value::Null => DataKey::typed("", source),
    }
}

/// Shape of a (possibly nested) array, following the first element at each level.
pub fn shape_of(value: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut current = value;
    while let Value::Array(items) = current {
        shape.push(items.len());
        match items.first() {
            Some(first) => current = first,
            None => break,
        }
    }
    shape
}

/// Builds start/descriptor/event/stop documents for one reconstruction node.
#[derive(Debug, Clone)]
pub struct DocFactory {
    data_keys: Option<Vec<String>>,
    output_info: BTreeMap<String, DataKey>,
    stream_name: String,
    source: String,
    metadata: Map<String, Value>,
    start_uid: Option<String>,
    descriptor_uid: Option<String>,
    seq_num: u64,
}

impl DocFactory {
    pub fn new(data_keys: Option<Vec<String>>) -> Self {
        Self {
            data_keys,
            output_info: BTreeMap::new(),
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            source: String::new(),
            metadata: Map::new(),
            start_uid: None,
            descriptor_uid: None,
            seq_num: 0,
        }
    }

    /// Explicit schema for a data key, overriding inference.
    pub fn with_output_info(mut self, key: &str, info: DataKey) -> Self {
        self.output_info.insert(key.to_string(), info);
        self
    }

    pub fn with_stream_name(mut self, name: &str) -> Self {
        self.stream_name = name.to_string();
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    /// Metadata copied into every start document.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Uid of the session currently being produced.
    pub fn start_uid(&self) -> Option<&str> {
        self.start_uid.as_deref()
    }

    /// Begin a new session.
    pub fn start_doc(&mut self, provenance: Provenance) -> StartDoc {
        let mut start = StartDoc::new();
        start.metadata = self.metadata.clone();
        start.parent_uids = provenance.parent_uids;
        start.parent_node_map = provenance.parent_node_map;

        self.start_uid = Some(start.uid.clone());
        self.descriptor_uid = None;
        self.seq_num = 0;
        start
    }

    /// Describe the stream using `sample` as the template payload.
    pub fn descriptor_doc(&mut self, sample: &Value) -> TranslateResult<DescriptorDoc> {
        let packed = self.pack(sample)?;
        let run_uid = self.start_uid.clone().unwrap_or_default();
        let mut descriptor = DescriptorDoc::new(&run_uid, &self.stream_name);
        for (key, value) in &packed {
            let data_key = match self.output_info.get(key) {
                Some(info) => self.hinted(info, value),
                None => infer_data_key(value, &self.source),
            };
            descriptor.data_keys.insert(key.clone(), data_key);
        }
        self.descriptor_uid = Some(descriptor.uid.clone());
        Ok(descriptor)
    }

    /// Wrap one payload into an event of the current descriptor.
    pub fn event_doc(&mut self, payload: &Value) -> TranslateResult<EventDoc> {
        let descriptor_uid = self.descriptor_uid.clone().ok_or_else(|| {
            TranslateError::Payload("no descriptor issued for this session".to_string())
        })?;
        let data = self.pack(payload)?;
        self.seq_num += 1;

        let ts = now_ns();
        let mut event = EventDoc::new(&descriptor_uid, self.seq_num);
        event.timestamps = data.keys().map(|k| (k.clone(), ts)).collect();
        event.data = data;
        Ok(event)
    }

    /// Close the current session.
    pub fn stop_doc(&mut self) -> StopDoc {
        let run_uid = self.start_uid.clone().unwrap_or_default();
        let stop = StopDoc::success(&run_uid).with_event_count(&self.stream_name, self.seq_num);
        self.descriptor_uid = None;
        stop
    }

    fn hinted(&self, info: &DataKey, value: &Value) -> DataKey {
        let mut key = info.clone();
        if key.source.is_empty() {
            key.source = self.source.clone();
        }
        if key.dtype.is_empty() {
            key.dtype = infer_data_key(value, &self.source).dtype;
        }
        if key.shape.is_empty() && value.is_array() {
            key.shape = shape_of(value);
        }
        key
    }

    /// Place a payload under the data keys.
    ///
    /// Without explicit keys a mapping payload supplies its own keys. A single
    /// key takes the payload whole; several keys take a tuple (array) of the
    /// same length, or the matching fields of a mapping.
    fn pack(&self, payload: &Value) -> TranslateResult<Map<String, Value>> {
        let keys = match &self.data_keys {
            Some(keys) => keys,
            None => {
                return Ok(match payload {
                    Value::Object(map) => map.clone(),
                    other => {
                        let mut map = Map::new();
                        map.insert(FALLBACK_DATA_KEY.to_string(), other.clone());
                        map
                    }
                })
            }
        };

        if let [key] = keys.as_slice() {
            let mut map = Map::new();
            map.insert(key.clone(), payload.clone());
            return Ok(map);
        }

        match payload {
            Value::Array(items) if items.len() == keys.len() => {
                Ok(keys.iter().cloned().zip(items.iter().cloned()).collect())
            }
            Value::Object(fields) => keys
                .iter()
                .map(|k| {
                    fields.get(k).map(|v| (k.clone(), v.clone())).ok_or_else(|| {
                        TranslateError::Payload(format!("mapping payload is missing key '{k}'"))
                    })
                })
                .collect(),
            other => Err(TranslateError::Payload(format!(
                "expected {} values for keys {:?}, got {}",
                keys.len(),
                keys,
                other
            ))),
        }
    }
}
