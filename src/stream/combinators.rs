//! Minimal node combinators for building processing graphs around the
//! translation nodes.

use serde_json::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::trace;

use super::{Context, Item, Node, NodeId, Outbox};
use crate::document::Document;

/// Entry point of a graph. Forwards everything it receives.
#[derive(Debug)]
pub struct Source {
    name: String,
}

impl Source {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Node for Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, item: Item, _who: NodeId, _ctx: &Context<'_>, out: &mut Outbox) {
        out.emit(item);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Applies a function to every payload. Documents are not payloads and are dropped.
pub struct Map<F> {
    name: String,
    func: F,
}

impl<F> Map<F>
where
    F: FnMut(Value) -> Value + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Node for Map<F>
where
    F: FnMut(Value) -> Value + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, item: Item, _who: NodeId, _ctx: &Context<'_>, out: &mut Outbox) {
        match item {
            Item::Value(value) => out.emit((self.func)(value)),
            Item::Doc(doc) => trace!(node = %self.name, kind = %doc.kind(), "map skips document"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Forwards payloads for which the predicate holds.
pub struct Filter<P> {
    name: String,
    predicate: P,
}

impl<P> Filter<P>
where
    P: FnMut(&Value) -> bool + 'static,
{
    pub fn new(name: impl Into<String>, predicate: P) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<P> Node for Filter<P>
where
    P: FnMut(&Value) -> bool + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, item: Item, _who: NodeId, _ctx: &Context<'_>, out: &mut Outbox) {
        if let Item::Value(value) = item {
            if (self.predicate)(&value) {
                out.emit(value);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Combines one payload from each upstream into a tuple (JSON array), in
/// upstream order, once every upstream has one buffered.
#[derive(Debug)]
pub struct Zip {
    name: String,
    upstreams: Vec<NodeId>,
    buffers: Vec<VecDeque<Value>>,
}

impl Zip {
    pub fn new(name: impl Into<String>, upstreams: &[NodeId]) -> Self {
        Self {
            name: name.into(),
            upstreams: upstreams.to_vec(),
            buffers: vec![VecDeque::new(); upstreams.len()],
        }
    }
}

impl Node for Zip {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, item: Item, who: NodeId, _ctx: &Context<'_>, out: &mut Outbox) {
        let Item::Value(value) = item else {
            return;
        };
        for (up, buffer) in self.upstreams.iter().zip(self.buffers.iter_mut()) {
            if *up == who {
                buffer.push_back(value.clone());
            }
        }
        if self.buffers.iter().all(|b| !b.is_empty()) {
            let tuple: Vec<Value> = self.buffers.iter_mut().filter_map(|b| b.pop_front()).collect();
            out.emit(Value::Array(tuple));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Shared view of what a [`Sink`] collected.
#[derive(Debug, Clone, Default)]
pub struct SinkHandle {
    items: Rc<RefCell<Vec<Item>>>,
}

impl SinkHandle {
    pub fn items(&self) -> Vec<Item> {
        self.items.borrow().clone()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.items
            .borrow()
            .iter()
            .filter_map(|i| i.as_doc().cloned())
            .collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.items
            .borrow()
            .iter()
            .filter_map(|i| i.as_value().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.items.borrow_mut().clear();
    }
}

/// Terminal node collecting every item into a list.
#[derive(Debug)]
pub struct Sink {
    name: String,
    handle: SinkHandle,
}

impl Sink {
    pub fn new(name: impl Into<String>) -> (Self, SinkHandle) {
        let handle = SinkHandle::default();
        let sink = Self {
            name: name.into(),
            handle: handle.clone(),
        };
        (sink, handle)
    }
}

impl Node for Sink {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, item: Item, _who: NodeId, _ctx: &Context<'_>, _out: &mut Outbox) {
        self.handle.items.borrow_mut().push(item);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
