#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write;

use flatpath::{compile, Document};

// ---------------------------------------------------------------------------
// Document generators
// ---------------------------------------------------------------------------

/// Generates a catalog document with `n` book records.
fn make_catalog(n: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<catalog>\n");
    for i in 0..n {
        let _ = writeln!(
            xml,
            "  <book id=\"bk{i}\" lang=\"en\"><title>Title {i}</title>\
             <author>Author {}</author>\
             <price>{}.99</price></book>",
            i % 17,
            10 + i
        );
    }
    xml.push_str("</catalog>\n");
    xml
}

/// Generates a deeply nested document with the given depth.
fn make_nested(depth: usize) -> String {
    let mut xml = String::new();
    for i in 0..depth {
        let _ = write!(xml, "<level{i}>");
    }
    xml.push_str("leaf");
    for i in (0..depth).rev() {
        let _ = write!(xml, "</level{i}>");
    }
    xml
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    group.bench_function("child_chain", |b| {
        b.iter(|| compile(black_box("/catalog/book/title")).unwrap());
    });
    group.bench_function("predicates", |b| {
        b.iter(|| {
            compile(black_box(
                "/catalog/book[@lang=\"en\" and price]/title[1]",
            ))
            .unwrap()
        });
    });
    group.bench_function("axes", |b| {
        b.iter(|| {
            compile(black_box(
                "//book/ancestor-or-self::*/following-sibling::book",
            ))
            .unwrap()
        });
    });
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let small = make_catalog(10);
    let large = make_catalog(1000);

    let mut group = c.benchmark_group("parse");
    group.bench_function("catalog_10", |b| {
        b.iter(|| Document::parse_str(black_box(&small)).unwrap());
    });
    group.bench_function("catalog_1000", |b| {
        b.iter(|| Document::parse_str(black_box(&large)).unwrap());
    });
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let doc = Document::parse_str(&make_catalog(1000)).unwrap();
    let nested = Document::parse_str(&make_nested(200)).unwrap();

    let mut group = c.benchmark_group("query");

    let child_chain = compile("/catalog/book/title").unwrap();
    group.bench_function("child_chain_1000", |b| {
        b.iter(|| black_box(child_chain.iter(doc.root()).count()));
    });

    let by_attr = compile("/catalog/book[@id=\"bk500\"]/price").unwrap();
    group.bench_function("attr_equality_probe", |b| {
        b.iter(|| black_box(by_attr.string_value(doc.root())));
    });

    let descendant = compile("//title").unwrap();
    group.bench_function("descendant_scan", |b| {
        b.iter(|| black_box(descendant.iter(doc.root()).count()));
    });

    let position = compile("/catalog/book[500]").unwrap();
    group.bench_function("position_predicate", |b| {
        b.iter(|| black_box(position.exists(doc.root())));
    });

    let deep = compile("//level199/ancestor::*").unwrap();
    group.bench_function("deep_ancestor_walk", |b| {
        b.iter(|| black_box(deep.iter(nested.root()).count()));
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_parse, bench_query);
criterion_main!(benches);
