//! Arena that owns the nodes and runs emissions.

use tracing::{trace, warn};

use super::{Context, Effect, Item, Node, NodeId, NodeRole, Outbox};
use crate::document::Document;
use crate::error::{TranslateError, TranslateResult};

struct Slot {
    /// `None` while the node is inside one of its own callbacks.
    node: Option<Box<dyn Node>>,
    upstreams: Vec<NodeId>,
    downstreams: Vec<NodeId>,
    lifecycle: Vec<NodeId>,
}

#[derive(Clone, Copy)]
enum Signal {
    Start,
    Stop,
}

/// A single-threaded push graph.
#[derive(Default)]
pub struct Graph {
    slots: Vec<Slot>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .slots
            .iter()
            .map(|s| s.node.as_ref().map(|n| n.name()).unwrap_or("<busy>"))
            .collect();
        f.debug_struct("Graph").field("nodes", &names).finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.as_usize() < self.slots.len()
    }

    fn check(&self, id: NodeId) -> TranslateResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(TranslateError::UnknownNode(id))
        }
    }

    /// Add a node fed by `upstreams`, in order.
    pub fn add_node<N: Node>(&mut self, node: N, upstreams: &[NodeId]) -> TranslateResult<NodeId> {
        for up in upstreams {
            self.check(*up)?;
        }
        let id = NodeId::new(self.slots.len());
        self.slots.push(Slot {
            node: Some(Box::new(node)),
            upstreams: Vec::new(),
            downstreams: Vec::new(),
            lifecycle: Vec::new(),
        });
        for up in upstreams {
            self.connect(*up, id)?;
        }
        Ok(id)
    }

    /// Add a payload edge `from -> to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> TranslateResult<()> {
        self.check(from)?;
        self.check(to)?;
        self.slots[from.as_usize()].downstreams.push(to);
        self.slots[to.as_usize()].upstreams.push(from);
        Ok(())
    }

    /// Make `id` the first downstream of each of its upstreams.
    pub fn move_to_first(&mut self, id: NodeId) -> TranslateResult<()> {
        self.check(id)?;
        let upstreams = self.slots[id.as_usize()].upstreams.clone();
        for up in upstreams {
            let downstreams = &mut self.slots[up.as_usize()].downstreams;
            if let Some(pos) = downstreams.iter().position(|d| *d == id) {
                let moved = downstreams.remove(pos);
                downstreams.insert(0, moved);
            }
        }
        Ok(())
    }

    /// Add a lifecycle edge: `subscriber` hears about sessions of `source`.
    pub fn subscribe_lifecycle(
        &mut self,
        source: NodeId,
        subscriber: NodeId,
    ) -> TranslateResult<()> {
        self.check(source)?;
        self.check(subscriber)?;
        let subs = &mut self.slots[source.as_usize()].lifecycle;
        if !subs.contains(&subscriber) {
            subs.push(subscriber);
        }
        Ok(())
    }

    /// Drop the most recently added node and every edge touching it.
    pub(crate) fn rollback(&mut self, id: NodeId) {
        if id.as_usize() + 1 != self.slots.len() {
            warn!(node = id.as_usize(), "rollback of a node that is not the newest, ignored");
            return;
        }
        self.slots.pop();
        for slot in &mut self.slots {
            slot.upstreams.retain(|n| *n != id);
            slot.downstreams.retain(|n| *n != id);
            slot.lifecycle.retain(|n| *n != id);
        }
    }

    pub fn upstreams(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.as_usize())
            .map(|s| s.upstreams.as_slice())
            .unwrap_or(&[])
    }

    pub fn downstreams(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.as_usize())
            .map(|s| s.downstreams.as_slice())
            .unwrap_or(&[])
    }

    pub fn lifecycle_subscribers(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.as_usize())
            .map(|s| s.lifecycle.as_slice())
            .unwrap_or(&[])
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.slots.get(id.as_usize()).and_then(|s| s.node.as_deref())
    }

    pub fn role(&self, id: NodeId) -> Option<NodeRole> {
        self.node(id).map(|n| n.role())
    }

    /// Downcast a node to its concrete type.
    pub fn node_as<T: Node>(&self, id: NodeId) -> Option<&T> {
        self.node(id).and_then(|n| n.as_any().downcast_ref::<T>())
    }

    pub fn node_as_mut<T: Node>(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.as_usize())
            .and_then(|s| s.node.as_deref_mut())
            .and_then(|n| n.as_any_mut().downcast_mut::<T>())
    }

    /// Push `item` out of `from`, as if `from` had emitted it.
    pub fn emit(&mut self, from: NodeId, item: impl Into<Item>) -> TranslateResult<()> {
        self.check(from)?;
        self.broadcast(from, item.into());
        Ok(())
    }

    fn broadcast(&mut self, from: NodeId, item: Item) {
        let downstreams = self.downstreams(from).to_vec();
        for to in downstreams {
            self.deliver(to, item.clone(), from);
        }
    }

    fn deliver(&mut self, to: NodeId, item: Item, who: NodeId) {
        let Some(mut node) = self.take(to) else {
            return;
        };
        let mut out = Outbox::default();
        node.update(item, who, &Context::new(self), &mut out);
        self.put_back(to, node);
        self.run(to, out);
    }

    fn signal(&mut self, to: NodeId, signal: Signal, doc: &Document) {
        let Some(mut node) = self.take(to) else {
            return;
        };
        let mut out = Outbox::default();
        let ctx = Context::new(self);
        match signal {
            Signal::Start => node.on_start(doc, &ctx, &mut out),
            Signal::Stop => node.on_stop(doc, &ctx, &mut out),
        }
        self.put_back(to, node);
        self.run(to, out);
    }

    fn take(&mut self, id: NodeId) -> Option<Box<dyn Node>> {
        let node = self.slots.get_mut(id.as_usize()).and_then(|s| s.node.take());
        if node.is_none() {
            warn!(node = id.as_usize(), "re-entrant delivery dropped");
        }
        node
    }

    fn put_back(&mut self, id: NodeId, node: Box<dyn Node>) {
        if let Some(slot) = self.slots.get_mut(id.as_usize()) {
            slot.node = Some(node);
        }
    }

    fn run(&mut self, origin: NodeId, out: Outbox) {
        for effect in out.into_effects() {
            match effect {
                Effect::Emit(item) => self.broadcast(origin, item),
                Effect::Start(doc) => self.notify(origin, Signal::Start, &doc),
                Effect::Stop(doc) => self.notify(origin, Signal::Stop, &doc),
            }
        }
    }

    fn notify(&mut self, origin: NodeId, signal: Signal, doc: &Document) {
        let subscribers = self.lifecycle_subscribers(origin).to_vec();
        trace!(
            origin = origin.as_usize(),
            subscribers = subscribers.len(),
            kind = %doc.kind(),
            "lifecycle notification"
        );
        for sub in subscribers {
            self.signal(sub, signal, doc);
        }
    }
}
