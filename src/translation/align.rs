//! Alignment node: zip several document streams into one.
//!
//! Documents are matched by type in strict lock-step: the n-th `event` of
//! every live source is combined with the n-th `event` of every other, and so
//! on for each type. Bodies are deep-merged left to right in source order, so
//! the last source wins on conflicting fields. Literal sources contribute the
//! same body to every combined document.
//!
//! Every buffered document remembers its arrival position within its source.
//! Once a `stop` has been aligned, that position splits each source into the
//! finished session and whatever it already sent of the next one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use tracing::{error, trace, warn};

use crate::document::{DocKind, Document};
use crate::error::{TranslateError, TranslateResult};
use crate::merge::deep_merge;
use crate::stream::{Context, Graph, Item, Node, NodeId, Outbox};

/// One input of an [`AlignNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum AlignSource {
    /// A live document stream
    Node(NodeId),
    /// A fixed body merged into every combined document
    Literal(Map<String, Value>),
}

impl From<NodeId> for AlignSource {
    fn from(id: NodeId) -> Self {
        AlignSource::Node(id)
    }
}

/// What to do when sources do not deliver the same number of documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignPolicy {
    /// Keep leftovers buffered; later sessions pair with stale documents
    #[default]
    BestEffort,
    /// Report and discard unmatched documents of a session once its stop
    /// has been aligned
    Strict,
}

#[derive(Debug)]
struct Queued {
    /// Arrival position within the source
    seq: u64,
    doc: Document,
}

#[derive(Debug)]
enum Slot {
    Live(usize),
    Literal(Value),
}

/// Combines N document streams field by field.
#[derive(Debug)]
pub struct AlignNode {
    name: String,
    policy: AlignPolicy,
    slots: Vec<Slot>,
    /// Live source index -> node feeding it
    live: Vec<NodeId>,
    /// Documents received so far, per live source
    received: Vec<u64>,
    buffers: BTreeMap<DocKind, Vec<VecDeque<Queued>>>,
    desync_count: usize,
}

impl AlignNode {
    pub fn new(name: impl Into<String>, sources: Vec<AlignSource>, policy: AlignPolicy) -> Self {
        let mut slots = Vec::with_capacity(sources.len());
        let mut live = Vec::new();
        for source in sources {
            match source {
                AlignSource::Node(id) => {
                    slots.push(Slot::Live(live.len()));
                    live.push(id);
                }
                AlignSource::Literal(body) => slots.push(Slot::Literal(Value::Object(body))),
            }
        }
        let buffers: BTreeMap<DocKind, Vec<VecDeque<Queued>>> = DocKind::ALL
            .iter()
            .map(|kind| (*kind, (0..live.len()).map(|_| VecDeque::new()).collect()))
            .collect();
        Self {
            name: name.into(),
            policy,
            slots,
            received: vec![0; live.len()],
            live,
            buffers,
            desync_count: 0,
        }
    }

    pub fn policy(&self) -> AlignPolicy {
        self.policy
    }

    /// Documents of `kind` waiting for their partners, per live source.
    pub fn buffered(&self, kind: DocKind) -> Vec<usize> {
        self.buffers
            .get(&kind)
            .map(|b| b.iter().map(VecDeque::len).collect())
            .unwrap_or_default()
    }

    /// Number of aligned stops that left unmatched documents behind (strict policy).
    pub fn desync_count(&self) -> usize {
        self.desync_count
    }

    fn ready(&self, kind: DocKind) -> bool {
        self.buffers
            .get(&kind)
            .is_some_and(|b| b.iter().all(|q| !q.is_empty()))
    }

    /// Front document of every live queue for `kind`, in source order.
    fn pop_heads(&mut self, kind: DocKind) -> Option<Vec<Queued>> {
        let queues = self.buffers.get_mut(&kind)?;
        queues.iter_mut().map(VecDeque::pop_front).collect()
    }

    fn combine(&self, kind: DocKind, heads: &[Queued]) -> Option<Document> {
        let mut bodies = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            match slot {
                Slot::Live(i) => match heads.get(*i).map(|head| head.doc.body_value()) {
                    Some(Ok(body)) => bodies.push(body),
                    Some(Err(e)) => {
                        warn!(node = %self.name, error = %e, "unreadable document body, skipped");
                    }
                    None => {}
                },
                Slot::Literal(body) => bodies.push(body.clone()),
            }
        }

        match Document::from_body(kind, deep_merge(&bodies)) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(
                    node = %self.name,
                    kind = %kind,
                    error = %e,
                    "merged body is not a valid document, dropped"
                );
                None
            }
        }
    }

    /// Drop what each source sent before its aligned stop and is still unmatched.
    fn discard_unmatched(&mut self, stops: &[Queued]) {
        let mut leftover = 0;
        for queues in self.buffers.values_mut() {
            for (queue, stop) in queues.iter_mut().zip(stops) {
                let before = queue.len();
                queue.retain(|queued| queued.seq > stop.seq);
                leftover += before - queue.len();
            }
        }
        if leftover == 0 {
            return;
        }
        self.desync_count += 1;
        error!(
            node = %self.name,
            leftover,
            "aligned sources have unequal lengths, discarding unmatched documents"
        );
    }
}

impl Node for AlignNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, item: Item, who: NodeId, _ctx: &Context<'_>, out: &mut Outbox) {
        let Item::Doc(doc) = item else {
            trace!(node = %self.name, "payload reached an alignment node, ignored");
            return;
        };
        let kind = doc.kind();

        let Some(queues) = self.buffers.get_mut(&kind) else {
            return;
        };
        let mut matched = false;
        for (i, source) in self.live.iter().enumerate() {
            if *source != who {
                continue;
            }
            let seq = self.received[i];
            self.received[i] += 1;
            queues[i].push_back(Queued {
                seq,
                doc: doc.clone(),
            });
            matched = true;
        }
        if !matched {
            warn!(
                node = %self.name,
                who = who.as_usize(),
                "document from an unknown source, ignored"
            );
            return;
        }

        if !self.ready(kind) {
            return;
        }
        let Some(heads) = self.pop_heads(kind) else {
            return;
        };
        if let Some(combined) = self.combine(kind, &heads) {
            out.emit(combined);
        }
        if kind == DocKind::Stop && self.policy == AlignPolicy::Strict {
            self.discard_unmatched(&heads);
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
    /// Add an alignment node over `sources`.
    ///
    /// # Errors
    ///
    /// A configuration error when no source is a live node.
    pub fn add_alignment(
        &mut self,
        sources: Vec<AlignSource>,
        policy: AlignPolicy,
    ) -> TranslateResult<NodeId> {
        let mut upstreams: Vec<NodeId> = Vec::new();
        for source in &sources {
            if let AlignSource::Node(id) = source {
                if !upstreams.contains(id) {
                    upstreams.push(*id);
                }
            }
        }
        if upstreams.is_empty() {
            return Err(TranslateError::Configuration(
                "alignment needs at least one live source".to_string(),
            ));
        }
        let name = format!("align:{}", upstreams.len());
        self.add_node(AlignNode::new(name, sources, policy), &upstreams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{EventDoc, StartDoc, StopDoc};
    use crate::stream::{Sink, SinkHandle, Source};
    use serde_json::json;

    fn event(data: Value) -> Document {
        let mut event = EventDoc::new("desc", 1);
        event.data = data.as_object().cloned().unwrap_or_default();
        event.into()
    }

    fn two_sources(policy: AlignPolicy) -> (Graph, NodeId, NodeId, NodeId, SinkHandle) {
        let mut graph = Graph::new();
        let a = graph.add_node(Source::new("a"), &[]).unwrap();
        let b = graph.add_node(Source::new("b"), &[]).unwrap();
        let align = graph.add_alignment(vec![a.into(), b.into()], policy).unwrap();
        let (sink, out) = Sink::new("out");
        graph.add_node(sink, &[align]).unwrap();
        (graph, a, b, align, out)
    }

    #[test]
    fn later_source_overrides() {
        let (mut graph, a, b, _, out) = two_sources(AlignPolicy::BestEffort);
        graph.emit(a, event(json!({"x": 1, "y": 2}))).unwrap();
        assert!(out.is_empty());
        graph.emit(b, event(json!({"y": 3, "z": 4}))).unwrap();

        let docs = out.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].kind(), DocKind::Event);
        assert_eq!(
            Value::Object(docs[0].as_event().unwrap().data.clone()),
            json!({"x": 1, "y": 3, "z": 4})
        );
    }

    #[test]
    fn types_are_buffered_separately() {
        let (mut graph, a, b, align, out) = two_sources(AlignPolicy::BestEffort);
        graph.emit(a, Document::from(StartDoc::new())).unwrap();
        graph.emit(a, event(json!({"x": 1}))).unwrap();
        graph.emit(b, event(json!({"x": 2}))).unwrap();

        let docs = out.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].as_event().unwrap().data["x"], json!(2));

        let node = graph.node_as::<AlignNode>(align).unwrap();
        assert_eq!(node.buffered(DocKind::Start), vec![1, 0]);
        assert_eq!(node.buffered(DocKind::Event), vec![0, 0]);
    }

    #[test]
    fn literals_keep_their_position() {
        let mut graph = Graph::new();
        let a = graph.add_node(Source::new("a"), &[]).unwrap();
        let literal = json!({"uid": "fixed", "sample": "Ni", "data": {"x": 0, "t": 9}});
        let align = graph
            .add_alignment(
                vec![AlignSource::Literal(literal.as_object().cloned().unwrap()), a.into()],
                AlignPolicy::BestEffort,
            )
            .unwrap();
        let (sink, out) = Sink::new("out");
        graph.add_node(sink, &[align]).unwrap();

        graph.emit(a, event(json!({"x": 5}))).unwrap();
        let docs = out.documents();
        let combined = docs[0].as_event().unwrap();
        assert_eq!(combined.data["x"], json!(5));
        assert_eq!(combined.data["t"], json!(9));
        assert_eq!(combined.extra["sample"], json!("Ni"));
        assert_ne!(combined.uid, "fixed");
    }

    #[test]
    fn best_effort_keeps_leftovers() {
        let (mut graph, a, b, align, _) = two_sources(AlignPolicy::BestEffort);
        graph.emit(a, event(json!({"x": 1}))).unwrap();
        graph.emit(a, event(json!({"x": 2}))).unwrap();
        graph.emit(b, event(json!({"x": 3}))).unwrap();
        graph.emit(a, Document::from(StopDoc::success("r"))).unwrap();
        graph.emit(b, Document::from(StopDoc::success("r"))).unwrap();

        let node = graph.node_as::<AlignNode>(align).unwrap();
        assert_eq!(node.buffered(DocKind::Event), vec![1, 0]);
        assert_eq!(node.desync_count(), 0);
    }

    #[test]
    fn strict_discards_leftovers_at_stop() {
        let (mut graph, a, b, align, out) = two_sources(AlignPolicy::Strict);
        graph.emit(a, event(json!({"x": 1}))).unwrap();
        graph.emit(a, event(json!({"x": 2}))).unwrap();
        graph.emit(b, event(json!({"x": 3}))).unwrap();
        graph.emit(a, Document::from(StopDoc::success("r"))).unwrap();
        graph.emit(b, Document::from(StopDoc::success("r"))).unwrap();

        let node = graph.node_as::<AlignNode>(align).unwrap();
        assert_eq!(node.buffered(DocKind::Event), vec![0, 0]);
        assert_eq!(node.desync_count(), 1);
        assert_eq!(out.documents().last().map(Document::kind), Some(DocKind::Stop));
    }

    #[test]
    fn strict_keeps_documents_sent_after_a_stop() {
        let (mut graph, a, b, align, out) = two_sources(AlignPolicy::Strict);
        graph.emit(a, event(json!({"x": 1}))).unwrap();
        graph.emit(a, event(json!({"x": 2}))).unwrap();
        graph.emit(a, Document::from(StopDoc::success("r1"))).unwrap();
        graph.emit(a, Document::from(StartDoc::new())).unwrap();
        graph.emit(a, event(json!({"x": 9}))).unwrap();
        graph.emit(b, event(json!({"x": 3}))).unwrap();
        graph.emit(b, Document::from(StopDoc::success("r1"))).unwrap();

        let node = graph.node_as::<AlignNode>(align).unwrap();
        assert_eq!(node.desync_count(), 1);
        assert_eq!(node.buffered(DocKind::Start), vec![1, 0]);
        assert_eq!(node.buffered(DocKind::Event), vec![1, 0]);

        graph.emit(b, Document::from(StartDoc::new())).unwrap();
        graph.emit(b, event(json!({"y": 4}))).unwrap();
        let docs = out.documents();
        let kinds: Vec<DocKind> = docs.iter().map(Document::kind).collect();
        assert_eq!(
            kinds,
            vec![
                DocKind::Event,
                DocKind::Stop,
                DocKind::Start,
                DocKind::Event
            ]
        );
        assert_eq!(
            Value::Object(docs[3].as_event().unwrap().data.clone()),
            json!({"x": 9, "y": 4})
        );
    }

    #[test]
    fn requires_a_live_source() {
        let mut graph = Graph::new();
        let err = graph
            .add_alignment(vec![AlignSource::Literal(Map::new())], AlignPolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, TranslateError::Configuration(_)));
    }
}
