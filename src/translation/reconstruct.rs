//! Reconstruction node: payloads in, a new document session out.
//!
//! A [`ReconstructNode`] is a state machine over [`SessionState`]:
//!
//! ```text
//!            start                payload              stop
//! Stopped ─────────▶ Started ─────────────▶ Described ─────────▶ Stopped
//!                       │  (descriptor + event)  │ payload (event)
//!                       └──────── stop ──────────┘
//! ```
//!
//! Start and stop come from the principal translation nodes found by the
//! graph walk, over lifecycle edges. The descriptor is written lazily from the
//! first payload of a session, so its schema matches what actually flows.
//! A start that arrives while a session is still open closes that session
//! with a synthesized stop before opening the next one.

use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::walk::{boundary_nodes, principal_nodes, walk_to_translation};
use crate::config::ReconstructionConfig;
use crate::document::{new_uid, DataKey, Document, StartDoc};
use crate::error::{TranslateError, TranslateResult};
use crate::schema::{DocFactory, Provenance};
use crate::stream::{Context, Graph, Item, Node, NodeId, NodeRole, Outbox};

/// Lifecycle state of a reconstruction node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session open (initial and terminal)
    Stopped,
    /// Start emitted, waiting for the first payload
    Started,
    /// Descriptor emitted, events flowing
    Described,
}

/// Construction options for a [`ReconstructNode`].
#[derive(Debug, Clone)]
pub struct ReconstructOptions {
    /// Data keys; `None` takes them from mapping payloads
    pub data_keys: Option<Vec<String>>,
    /// Explicit schema per data key
    pub output_info: BTreeMap<String, DataKey>,
    pub stream_name: String,
    pub source: String,
    /// Extra fields for every start document
    pub metadata: Map<String, Value>,
    pub name: Option<String>,
}

impl ReconstructOptions {
    pub fn new(data_keys: Option<Vec<String>>) -> Self {
        Self::from_config(&ReconstructionConfig::default(), data_keys)
    }

    pub fn from_config(config: &ReconstructionConfig, data_keys: Option<Vec<String>>) -> Self {
        Self {
            data_keys,
            output_info: BTreeMap::new(),
            stream_name: config.stream_name.clone(),
            source: config.source.clone(),
            metadata: Map::new(),
            name: None,
        }
    }

    /// Options with explicit data keys.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(keys.into_iter().map(Into::into).collect()))
    }

    pub fn with_output_info(mut self, key: &str, info: DataKey) -> Self {
        self.output_info.insert(key.to_string(), info);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Wraps processed payloads into a new, provenance-tagged session.
#[derive(Debug)]
pub struct ReconstructNode {
    name: String,
    uid: String,
    state: SessionState,
    factory: DocFactory,
    boundaries: Vec<NodeId>,
    principals: Vec<NodeId>,
    provenance: BTreeMap<String, String>,
    pending_start: Option<StartDoc>,
}

impl ReconstructNode {
    pub fn new(options: ReconstructOptions) -> Self {
        let name = options
            .name
            .unwrap_or_else(|| format!("reconstruct:{:?}", options.data_keys));
        let mut factory = DocFactory::new(options.data_keys)
            .with_stream_name(&options.stream_name)
            .with_source(&options.source)
            .with_metadata(options.metadata);
        for (key, info) in options.output_info {
            factory = factory.with_output_info(&key, info);
        }
        Self {
            name,
            uid: new_uid(),
            state: SessionState::Stopped,
            factory,
            boundaries: Vec::new(),
            principals: Vec::new(),
            provenance: BTreeMap::new(),
            pending_start: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Translation nodes whose sessions feed this node.
    pub fn boundaries(&self) -> &[NodeId] {
        &self.boundaries
    }

    /// Boundary nodes driving this node's lifecycle.
    pub fn principals(&self) -> &[NodeId] {
        &self.principals
    }

    /// Boundary uid -> start uid, as stamped on the last start document.
    pub fn provenance(&self) -> &BTreeMap<String, String> {
        &self.provenance
    }

    /// Start document of the open session, until its descriptor is out.
    pub fn pending_start(&self) -> Option<&StartDoc> {
        self.pending_start.as_ref()
    }

    fn install(&mut self, boundaries: Vec<NodeId>, principals: Vec<NodeId>) {
        self.boundaries = boundaries;
        self.principals = principals;
    }

    fn emit_start(&mut self, ctx: &Context<'_>, out: &mut Outbox) {
        if self.state != SessionState::Stopped {
            warn!(
                node = %self.name,
                state = ?self.state,
                "start seen without preceding stop, closing session"
            );
            self.emit_stop(out);
        }

        let mut provenance = Provenance::default();
        for boundary in &self.boundaries {
            if let (Some(uid), Some(start_uid)) =
                (ctx.uid_of(*boundary), ctx.start_uid_of(*boundary))
            {
                provenance.record(uid, start_uid);
            }
        }
        self.provenance = provenance.parent_node_map.clone();

        let start = self.factory.start_doc(provenance);
        debug!(
            node = %self.name,
            start_uid = %start.uid,
            parents = ?start.parent_uids,
            "session started"
        );
        let doc = Document::from(start.clone());
        out.emit(doc.clone());
        out.notify_start(doc);
        self.pending_start = Some(start);
        self.state = SessionState::Started;
    }

    fn emit_stop(&mut self, out: &mut Outbox) {
        let doc = Document::from(self.factory.stop_doc());
        debug!(node = %self.name, "session stopped");
        out.emit(doc.clone());
        out.notify_stop(doc);
        self.pending_start = None;
        self.state = SessionState::Stopped;
    }

    fn on_payload(&mut self, payload: Value, out: &mut Outbox) {
        if self.state == SessionState::Stopped {
            warn!(node = %self.name, "payload outside of a session, dropped");
            return;
        }

        if self.state == SessionState::Started {
            match self.factory.descriptor_doc(&payload) {
                Ok(descriptor) => {
                    out.emit(Document::from(descriptor));
                    self.pending_start = None;
                    self.state = SessionState::Described;
                }
                Err(e) => {
                    warn!(node = %self.name, error = %e, "cannot describe payload, dropped");
                    return;
                }
            }
        }

        match self.factory.event_doc(&payload) {
            Ok(event) => out.emit(Document::from(event)),
            Err(e) => warn!(node = %self.name, error = %e, "cannot pack payload, dropped"),
        }
    }
}

impl Node for ReconstructNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> NodeRole {
        NodeRole::Reconstruction
    }

    fn uid(&self) -> Option<&str> {
        Some(&self.uid)
    }

    fn start_uid(&self) -> Option<&str> {
        self.factory.start_uid()
    }

    fn update(&mut self, item: Item, _who: NodeId, _ctx: &Context<'_>, out: &mut Outbox) {
        match item {
            Item::Value(payload) => self.on_payload(payload, out),
            Item::Doc(doc) => warn!(
                node = %self.name,
                kind = %doc.kind(),
                "document reached a reconstruction node, ignored"
            ),
        }
    }

    fn on_start(&mut self, _doc: &Document, ctx: &Context<'_>, out: &mut Outbox) {
        self.emit_start(ctx, out);
    }

    fn on_stop(&mut self, _doc: &Document, _ctx: &Context<'_>, out: &mut Outbox) {
        if self.state == SessionState::Stopped {
            debug!(node = %self.name, "stop while already stopped, ignored");
            return;
        }
        self.emit_stop(out);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Graph {
    /// Add a reconstruction node fed by `upstream`.
    ///
    /// Walks the graph to find the translation nodes feeding it and subscribes
    /// to the lifecycle of the principal ones.
    ///
    /// # Errors
    ///
    /// [`TranslateError::NoPrincipalSource`] when no principal extraction node
    /// and no other reconstruction node is reachable; the graph is left as it
    /// was.
    pub fn add_reconstruction(
        &mut self,
        upstream: NodeId,
        options: ReconstructOptions,
    ) -> TranslateResult<NodeId> {
        let node = ReconstructNode::new(options);
        let name = node.name.clone();
        let id = self.add_node(node, &[upstream])?;
        self.move_to_first(id)?;

        let dependencies = walk_to_translation(self, id);
        let boundaries = boundary_nodes(self, &dependencies, id);
        let principals = principal_nodes(self, &boundaries);
        if principals.is_empty() {
            self.rollback(id);
            return Err(TranslateError::NoPrincipalSource { node: name });
        }

        for principal in &principals {
            self.subscribe_lifecycle(*principal, id)?;
        }
        info!(
            node = %name,
            boundaries = boundaries.len(),
            principals = principals.len(),
            "reconstruction node wired"
        );
        if let Some(node) = self.node_as_mut::<ReconstructNode>(id) {
            node.install(boundaries, principals);
        }
        Ok(id)
    }
}
