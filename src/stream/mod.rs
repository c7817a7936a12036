//! Push-based dataflow substrate.
//!
//! Nodes live in an arena owned by [`Graph`] and are addressed by stable
//! [`NodeId`] handles. Two independent edge sets connect them:
//!
//! - **payload edges** (upstream/downstream): every item a node emits is
//!   delivered synchronously, depth-first, to each downstream in order.
//! - **lifecycle edges**: session start/stop notifications sent from
//!   translation nodes to the reconstruction nodes that follow them, even when
//!   they are not on each other's payload path.
//!
//! Node callbacks never touch the graph directly. They push [`Effect`]s into an
//! [`Outbox`], and the graph executes those effects in order once the callback
//! returns. Everything runs on the caller's thread.

pub mod combinators;
pub mod graph;

use serde_json::Value;
use std::any::Any;

use crate::document::Document;

pub use combinators::{Filter, Map, Sink, SinkHandle, Source, Zip};
pub use graph::Graph;

/// Handle of a node inside one [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// What flows along payload edges.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// A tagged document
    Doc(Document),
    /// A plain payload value
    Value(Value),
}

impl Item {
    pub fn as_doc(&self) -> Option<&Document> {
        match self {
            Item::Doc(doc) => Some(doc),
            Item::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Item::Value(value) => Some(value),
            Item::Doc(_) => None,
        }
    }
}

impl From<Document> for Item {
    fn from(doc: Document) -> Self {
        Item::Doc(doc)
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Item::Value(value)
    }
}

/// How the translation walk classifies a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Ordinary processing node
    Plain,
    /// Pulls payloads out of documents
    Extraction { principal: bool },
    /// Wraps payloads back into documents
    Reconstruction,
}

/// A side effect requested by a node callback.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Deliver an item to every downstream
    Emit(Item),
    /// Tell lifecycle subscribers a session started
    Start(Document),
    /// Tell lifecycle subscribers a session stopped
    Stop(Document),
}

/// Ordered effects collected during one callback.
#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    pub fn emit(&mut self, item: impl Into<Item>) {
        self.effects.push(Effect::Emit(item.into()));
    }

    pub fn notify_start(&mut self, doc: Document) {
        self.effects.push(Effect::Start(doc));
    }

    pub fn notify_stop(&mut self, doc: Document) {
        self.effects.push(Effect::Stop(doc));
    }

    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

/// Read-only view of the graph handed to node callbacks.
pub struct Context<'a> {
    graph: &'a Graph,
}

impl<'a> Context<'a> {
    pub(crate) fn new(graph: &'a Graph) -> Self {
        Self { graph }
    }

    /// Uid of another node, if it has one.
    pub fn uid_of(&self, id: NodeId) -> Option<&'a str> {
        self.graph.node(id).and_then(|n| n.uid())
    }

    /// Session another node is currently following.
    pub fn start_uid_of(&self, id: NodeId) -> Option<&'a str> {
        self.graph.node(id).and_then(|n| n.start_uid())
    }
}

/// A node of the dataflow graph.
pub trait Node: Any {
    /// Display name, used in logs.
    fn name(&self) -> &str;

    fn role(&self) -> NodeRole {
        NodeRole::Plain
    }

    /// Stable unique id, for nodes that take part in provenance.
    fn uid(&self) -> Option<&str> {
        None
    }

    /// Start uid of the session this node is currently part of.
    fn start_uid(&self) -> Option<&str> {
        None
    }

    /// Called for every item emitted by an upstream `who`.
    fn update(&mut self, item: Item, who: NodeId, ctx: &Context<'_>, out: &mut Outbox);

    /// Lifecycle notification: an upstream session started.
    fn on_start(&mut self, _doc: &Document, _ctx: &Context<'_>, _out: &mut Outbox) {}

    /// Lifecycle notification: an upstream session stopped.
    fn on_stop(&mut self, _doc: &Document, _ctx: &Context<'_>, _out: &mut Outbox) {}

    /// Get a reference to this node as `&dyn Any` for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutable counterpart of [`Node::as_any`]
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
