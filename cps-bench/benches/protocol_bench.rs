//! Protocol encoding/decoding benchmarks.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cps_protocol::field::{decode_varint, encode_varint};
use cps_protocol::frame::Frame;
use cps_protocol::{
    dispatch, Command, CommandParams, Content, Decoder, DocumentLayout, DocumentSource, Documents,
    Encoder, Envelope, IdPath, ListMode, ModifyParams, SearchParams,
};
use serde_json::json;

fn create_documents(count: usize) -> Documents {
    Documents::WithIds(
        (0..count)
            .map(|i| {
                let doc = json!({
                    "document": {
                        "title": format!("Title {i}"),
                        "body": "x".repeat(200),
                        "tags": [{"tag": "a"}, {"tag": "b"}],
                    }
                });
                (i.to_string(), Some(DocumentSource::Tree(doc)))
            })
            .collect(),
    )
}

fn create_search_reply(count: usize) -> String {
    let mut results = String::new();
    for i in 0..count {
        results.push_str(&format!(
            "<document><id>{i}</id><title>Title {i}</title><body>{}</body></document>",
            "x".repeat(200)
        ));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <cps:reply xmlns:cps=\"www.clusterpoint.com\">\
         <cps:storage>books</cps:storage><cps:command>search</cps:command>\
         <cps:seconds>0.01</cps:seconds><cps:content>\
         <hits>{count}</hits><found>{count}</found><from>0</from><to>{count}</to>\
         <results>{results}</results>\
         <facet path=\"document/tags/tag\"><term hits=\"3\">a</term><term hits=\"1\">b</term></facet>\
         </cps:content></cps:reply>"
    )
}

fn bench_varint(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint");

    for value in [1u64, 300, 1 << 35, u64::MAX] {
        let mut encoded = BytesMut::new();
        encode_varint(value, &mut encoded);

        group.bench_with_input(BenchmarkId::new("encode", value), &value, |b, &value| {
            b.iter(|| {
                let mut buf = BytesMut::with_capacity(10);
                encode_varint(black_box(value), &mut buf);
                black_box(buf)
            });
        });
        group.bench_with_input(BenchmarkId::new("decode", value), &encoded, |b, encoded| {
            b.iter(|| black_box(decode_varint(encoded, 0).unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let payload = Bytes::from("x".repeat(size));
        let frame = Frame::new(payload.clone());

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode().unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    for size in [100, 1000, 10000] {
        let payload = Bytes::from("x".repeat(size));
        let frame = Frame::new(payload);
        let encoded = frame.encode().unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = encoded.clone();
                black_box(Frame::decode(&mut buf).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_request_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_frame");

    for size in [100, 1000, 10000] {
        let envelope = format!("<cps:request>{}</cps:request>", "x".repeat(size));
        let encoded = Encoder::encode_request(&envelope, Some("books")).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &envelope, |b, envelope| {
            b.iter(|| black_box(Encoder::encode_request(envelope, Some("books")).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.extend(encoded);
                black_box(decoder.decode_request().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_envelope_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_build");
    let layout = DocumentLayout::default();

    for count in [1, 10, 100] {
        let params = ModifyParams::insert(create_documents(count));

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("insert", count), &params, |b, params| {
            b.iter(|| {
                let mut content = Content::new();
                params.build(&mut content, &layout).unwrap();
                black_box(
                    Envelope::new("books", params.command().as_str())
                        .with_credentials("admin", "secret")
                        .with_content(content)
                        .to_xml(),
                )
            });
        });
    }

    let search = SearchParams::new("<title>dune</title>")
        .with_docs(20)
        .with_list("document/title", ListMode::Yes)
        .with_facet("document/tags/tag");
    group.bench_function("search", |b| {
        b.iter(|| {
            let mut content = Content::new();
            search.build(&mut content, &layout).unwrap();
            black_box(Envelope::new("books", "search").with_content(content).to_xml())
        });
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_dispatch");
    let id_path = IdPath::default();

    for count in [1, 10, 100] {
        let raw = create_search_reply(count);

        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &raw, |b, raw| {
            b.iter(|| {
                let reply = dispatch(raw.as_bytes(), &Command::Search, &id_path)
                    .unwrap()
                    .into_search()
                    .unwrap();
                black_box((reply.document_ids(), reply.facets().unwrap()))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_varint,
    bench_frame_encode,
    bench_frame_decode,
    bench_request_round_trip,
    bench_envelope_build,
    bench_dispatch,
);

criterion_main!(benches);
