use anyhow::Result;
use serde_json::json;

use daq_translation::document::{DescriptorDoc, DocKind, Document, EventDoc, StartDoc, StopDoc};
use daq_translation::stream::{Graph, NodeId, Sink, Source};
use daq_translation::translation::{
    Address, AlignNode, AlignPolicy, AlignSource, ExtractOptions, ReconstructOptions,
};

fn session(field: &str, values: &[i64]) -> Vec<Document> {
    let start = StartDoc::new().with_metadata("detector", field);
    let desc = DescriptorDoc::new(&start.uid, "primary");
    let mut docs = vec![Document::from(start.clone()), Document::from(desc.clone())];
    for (i, v) in values.iter().enumerate() {
        docs.push(EventDoc::new(&desc.uid, i as u64 + 1).with_datum(field, *v).into());
    }
    docs.push(StopDoc::success(&start.uid).into());
    docs
}

fn interleave(
    graph: &mut Graph,
    a: NodeId,
    b: NodeId,
    da: &[Document],
    db: &[Document],
) -> Result<()> {
    for (x, y) in da.iter().zip(db) {
        graph.emit(a, x.clone())?;
        graph.emit(b, y.clone())?;
    }
    Ok(())
}

#[test]
fn test_merge_override_law() -> Result<()> {
    let mut graph = Graph::new();
    let a = graph.add_node(Source::new("a"), &[])?;
    let b = graph.add_node(Source::new("b"), &[])?;
    let align = graph.add_alignment(vec![a.into(), b.into()], AlignPolicy::BestEffort)?;
    let (sink, out) = Sink::new("out");
    graph.add_node(sink, &[align])?;

    let body_a = json!({"uid": "s-a", "x": 1, "y": 2});
    let body_b = json!({"uid": "s-b", "y": 3, "z": 4});
    graph.emit(a, Document::from_body(DocKind::Start, body_a)?)?;
    graph.emit(b, Document::from_body(DocKind::Start, body_b)?)?;

    let docs = out.documents();
    assert_eq!(docs.len(), 1);
    let start = docs[0].as_start().expect("start");
    assert_eq!(start.uid, "s-b");
    assert_eq!(start.metadata["x"], json!(1));
    assert_eq!(start.metadata["y"], json!(3));
    assert_eq!(start.metadata["z"], json!(4));
    Ok(())
}

#[test]
fn test_aligned_stream_feeds_extraction() -> Result<()> {
    let mut graph = Graph::new();
    let a = graph.add_node(Source::new("a"), &[])?;
    let b = graph.add_node(Source::new("b"), &[])?;
    let align = graph.add_alignment(vec![a.into(), b.into()], AlignPolicy::Strict)?;
    let pair = graph.add_extraction(
        align,
        ExtractOptions::new(DocKind::Event, Address::path(["data"]).tuple(["x", "y"])).principal(),
    )?;
    let recon = graph.add_reconstruction(pair, ReconstructOptions::keys(["x", "y"]))?;
    let (sink, out) = Sink::new("out");
    graph.add_node(sink, &[recon])?;

    let da = session("x", &[1, 2, 3]);
    let db = session("y", &[10, 20, 30]);
    interleave(&mut graph, a, b, &da, &db)?;

    let docs = out.documents();
    let kinds: Vec<DocKind> = docs.iter().map(Document::kind).collect();
    assert_eq!(
        kinds,
        vec![
            DocKind::Start,
            DocKind::Descriptor,
            DocKind::Event,
            DocKind::Event,
            DocKind::Event,
            DocKind::Stop
        ]
    );
    let pairs: Vec<(i64, i64)> = docs
        .iter()
        .filter_map(Document::as_event)
        .map(|e| {
            (
                e.data["x"].as_i64().unwrap_or_default(),
                e.data["y"].as_i64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(pairs, vec![(1, 10), (2, 20), (3, 30)]);

    // the merged start belongs to the second source, and provenance follows it
    let start = docs[0].as_start().expect("start");
    assert_eq!(start.parent_uids, vec![db[0].uid().to_string()]);

    let node = graph.node_as::<AlignNode>(align).expect("align node");
    assert_eq!(node.desync_count(), 0);
    Ok(())
}

#[test]
fn test_unequal_sources_with_strict_policy() -> Result<()> {
    let mut graph = Graph::new();
    let a = graph.add_node(Source::new("a"), &[])?;
    let b = graph.add_node(Source::new("b"), &[])?;
    let align = graph.add_alignment(vec![a.into(), b.into()], AlignPolicy::Strict)?;
    let (sink, out) = Sink::new("out");
    graph.add_node(sink, &[align])?;

    for doc in session("x", &[1, 2, 3]) {
        graph.emit(a, doc)?;
    }
    for doc in session("y", &[10]) {
        graph.emit(b, doc)?;
    }

    let events = out.documents().iter().filter(|d| d.kind() == DocKind::Event).count();
    assert_eq!(events, 1);

    let node = graph.node_as::<AlignNode>(align).expect("align node");
    assert_eq!(node.desync_count(), 1);
    assert_eq!(node.buffered(DocKind::Event), vec![0, 0]);

    // the next pair of sessions lines up again
    out.clear();
    interleave(&mut graph, a, b, &session("x", &[4]), &session("y", &[40]))?;
    let docs = out.documents();
    let event = docs.iter().find_map(Document::as_event).expect("event");
    assert_eq!(event.data["x"], json!(4));
    assert_eq!(event.data["y"], json!(40));
    Ok(())
}

#[test]
fn test_strict_policy_with_one_source_running_ahead() -> Result<()> {
    let mut graph = Graph::new();
    let a = graph.add_node(Source::new("a"), &[])?;
    let b = graph.add_node(Source::new("b"), &[])?;
    let align = graph.add_alignment(vec![a.into(), b.into()], AlignPolicy::Strict)?;
    let (sink, out) = Sink::new("out");
    graph.add_node(sink, &[align])?;

    let da: Vec<Document> = session("x", &[1])
        .into_iter()
        .chain(session("x", &[2]))
        .collect();
    let db: Vec<Document> = session("y", &[10])
        .into_iter()
        .chain(session("y", &[20]))
        .collect();

    // a reaches its second start before b has stopped
    for doc in &da[..5] {
        graph.emit(a, doc.clone())?;
    }
    for doc in &db[..4] {
        graph.emit(b, doc.clone())?;
    }
    for doc in &da[5..] {
        graph.emit(a, doc.clone())?;
    }
    for doc in &db[4..] {
        graph.emit(b, doc.clone())?;
    }

    let docs = out.documents();
    let kinds: Vec<DocKind> = docs.iter().map(Document::kind).collect();
    let session_kinds = [
        DocKind::Start,
        DocKind::Descriptor,
        DocKind::Event,
        DocKind::Stop,
    ];
    assert_eq!(kinds, [session_kinds, session_kinds].concat());

    let pairs: Vec<(i64, i64)> = docs
        .iter()
        .filter_map(Document::as_event)
        .map(|e| {
            (
                e.data["x"].as_i64().unwrap_or_default(),
                e.data["y"].as_i64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(pairs, vec![(1, 10), (2, 20)]);

    let node = graph.node_as::<AlignNode>(align).expect("align node");
    assert_eq!(node.desync_count(), 0);
    Ok(())
}

#[test]
fn test_literal_source_is_merged_into_every_document() -> Result<()> {
    let mut graph = Graph::new();
    let a = graph.add_node(Source::new("a"), &[])?;
    let calibration = json!({"calibration": {"wavelength": 0.1832}});
    let align = graph.add_alignment(
        vec![
            a.into(),
            AlignSource::Literal(calibration.as_object().cloned().unwrap_or_default()),
        ],
        AlignPolicy::BestEffort,
    )?;
    let (sink, out) = Sink::new("out");
    graph.add_node(sink, &[align])?;

    for doc in session("x", &[1]) {
        graph.emit(a, doc)?;
    }

    let docs = out.documents();
    assert_eq!(docs.len(), 4);
    let bodies = docs
        .iter()
        .map(Document::body_value)
        .collect::<Result<Vec<_>, _>>()?;
    for body in bodies {
        assert_eq!(body["calibration"]["wavelength"], json!(0.1832));
    }
    Ok(())
}
