//! Extraction node: documents in, payloads out.
//!
//! An [`ExtractNode`] watches a document stream and emits only the value found
//! at its [`Address`] inside documents of one type. It also tracks the session
//! it is part of and forwards start/stop to its lifecycle subscribers, so
//! reconstruction nodes further down can follow the session even though they
//! only ever see raw payloads.

use serde_json::Value;
use std::any::Any;
use tracing::{debug, trace, warn};

use crate::config::ExtractionConfig;
use crate::document::{new_uid, DocKind, Document};
use crate::error::TranslateResult;
use crate::stream::{Context, Graph, Item, Node, NodeId, NodeRole, Outbox};

/// Which descriptor streams an extraction node listens to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StreamFilter {
    /// Every stream
    #[default]
    All,
    /// Only descriptors with this name
    Named(String),
}

impl StreamFilter {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            StreamFilter::All => true,
            StreamFilter::Named(wanted) => wanted == name,
        }
    }
}

impl From<Option<String>> for StreamFilter {
    fn from(name: Option<String>) -> Self {
        name.map_or(StreamFilter::All, StreamFilter::Named)
    }
}

/// One step of an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressPart {
    /// Walk into this key
    Key(String),
    /// Take these keys at this level, as a tuple
    Tuple(Vec<String>),
}

/// Path into a document body. Empty means the whole body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address(Vec<AddressPart>);

impl Address {
    /// Address of the whole body.
    pub fn whole() -> Self {
        Self::default()
    }

    /// Successive keys, e.g. `Address::path(["data", "img"])`.
    pub fn path<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| AddressPart::Key(k.into())).collect())
    }

    pub fn tuple<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .push(AddressPart::Tuple(keys.into_iter().map(Into::into).collect()));
        self
    }

    pub fn parts(&self) -> &[AddressPart] {
        &self.0
    }

    /// Resolve against a body. `None` when any key is missing.
    pub fn resolve(&self, body: &Value) -> Option<Value> {
        let mut inner = body.clone();
        for part in &self.0 {
            inner = match part {
                AddressPart::Key(key) => inner.as_object()?.get(key)?.clone(),
                AddressPart::Tuple(keys) => {
                    let fields = inner.as_object()?;
                    let values = keys
                        .iter()
                        .map(|k| fields.get(k).cloned())
                        .collect::<Option<Vec<_>>>()?;
                    Value::Array(values)
                }
            };
        }
        Some(inner)
    }
}

/// Construction options for an [`ExtractNode`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub doc_type: DocKind,
    pub address: Address,
    pub stream: StreamFilter,
    pub principal: bool,
    pub name: Option<String>,
}

impl ExtractOptions {
    pub fn new(doc_type: DocKind, address: Address) -> Self {
        Self {
            doc_type,
            address,
            stream: StreamFilter::All,
            principal: false,
            name: None,
        }
    }

    /// Options with the configured stream filter applied.
    pub fn from_config(config: &ExtractionConfig, doc_type: DocKind, address: Address) -> Self {
        let mut options = Self::new(doc_type, address);
        options.stream = config.stream_name.clone().into();
        options.principal = config.principal;
        options
    }

    /// Mark the node as a principal session source.
    pub fn principal(mut self) -> Self {
        self.principal = true;
        self
    }

    pub fn stream(mut self, name: impl Into<String>) -> Self {
        self.stream = StreamFilter::Named(name.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Pulls payloads out of a tagged document stream.
#[derive(Debug)]
pub struct ExtractNode {
    name: String,
    uid: String,
    doc_type: DocKind,
    address: Address,
    stream: StreamFilter,
    principal: bool,
    start_uid: Option<String>,
    descriptor_uids: Vec<String>,
}

impl ExtractNode {
    pub fn new(options: ExtractOptions) -> Self {
        let name = options.name.unwrap_or_else(|| {
            format!("extract:{}:{:?}", options.doc_type, options.address.parts())
        });
        Self {
            name,
            uid: new_uid(),
            doc_type: options.doc_type,
            address: options.address,
            stream: options.stream,
            principal: options.principal,
            start_uid: None,
            descriptor_uids: Vec::new(),
        }
    }

    /// Descriptor uids of the current session that pass the stream filter.
    pub fn active_descriptors(&self) -> &[String] {
        &self.descriptor_uids
    }

    fn selects(&self, doc: &Document) -> bool {
        if doc.kind() != self.doc_type {
            return false;
        }
        match doc {
            Document::Descriptor(d) => self.stream.matches(&d.name),
            Document::Event(e) => self.descriptor_uids.contains(&e.descriptor_uid),
            Document::Start(_) | Document::Stop(_) => true,
        }
    }

    fn track(&mut self, doc: &Document, out: &mut Outbox) {
        match doc {
            Document::Start(start) => {
                debug!(node = %self.name, start_uid = %start.uid, "session started");
                self.start_uid = Some(start.uid.clone());
                out.notify_start(doc.clone());
            }
            Document::Descriptor(descriptor) if self.stream.matches(&descriptor.name) => {
                self.descriptor_uids.push(descriptor.uid.clone());
            }
            Document::Stop(_) => {
                debug!(node = %self.name, "session stopped");
                self.descriptor_uids.clear();
                out.notify_stop(doc.clone());
            }
            _ => {}
        }
    }
}

impl Node for ExtractNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> NodeRole {
        NodeRole::Extraction {
            principal: self.principal,
        }
    }

    fn uid(&self) -> Option<&str> {
        Some(&self.uid)
    }

    fn start_uid(&self) -> Option<&str> {
        self.start_uid.as_deref()
    }

    fn update(&mut self, item: Item, _who: NodeId, _ctx: &Context<'_>, out: &mut Outbox) {
        let Item::Doc(doc) = item else {
            trace!(node = %self.name, "payload reached an extraction node, ignored");
            return;
        };
        self.track(&doc, out);
        if !self.selects(&doc) {
            return;
        }

        let body = match doc.body_value() {
            Ok(body) => body,
            Err(e) => {
                warn!(node = %self.name, error = %e, "could not read document body");
                return;
            }
        };
        match self.address.resolve(&body) {
            Some(value) => out.emit(value),
            None => trace!(node = %self.name, kind = %doc.kind(), "address not found, dropped"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Graph {
    /// Add an extraction node fed by `upstream`.
    pub fn add_extraction(
        &mut self,
        upstream: NodeId,
        options: ExtractOptions,
    ) -> TranslateResult<NodeId> {
        self.add_node(ExtractNode::new(options), &[upstream])
    }
}
