//! Performance benchmarks for PDF Filler MCP Server
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lopdf::{dictionary, Document, Object};
use pdf_filler_mcp::pdf::{FieldValue, FieldValueMap, FormDocument};
use pdf_filler_mcp::tabular;

/// One-page form with `count` text fields named `Field1..`
fn form_with_fields(count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();

    let fields: Vec<Object> = (1..=count)
        .map(|i| {
            doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "FT" => "Tx",
                "T" => Object::string_literal(format!("Field{}", i)),
                "P" => page_id,
                "Rect" => vec![0.into(), 0.into(), 100.into(), 20.into()],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Annots" => fields.clone(),
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let acroform_id = doc.add_object(dictionary! { "Fields" => fields });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("Failed to build form");
    buffer
}

/// Benchmark load + fill + save for growing forms
fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill");

    for count in [10, 100, 500] {
        let data = form_with_fields(count);
        let values: FieldValueMap = (1..=count)
            .map(|i| (format!("Field{}", i), FieldValue::from(format!("value {}", i))))
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("fields", count), &count, |b, _| {
            b.iter(|| {
                let mut doc = FormDocument::load(black_box(&data), None).unwrap();
                let report = doc.fill(black_box(&values));
                assert!(report.errors.is_empty());
                let _ = doc.save().unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark field listing (read-only path used by validate/extract)
fn bench_list_fields(c: &mut Criterion) {
    let data = form_with_fields(200);

    c.bench_function("list_fields_200", |b| {
        b.iter(|| {
            let doc = FormDocument::load(black_box(&data), None).unwrap();
            let _ = doc.fields();
        });
    });
}

/// Benchmark CSV decoding of bulk-fill input
fn bench_csv_decode(c: &mut Criterion) {
    let mut text = String::from("Name,City,Email,Notes\n");
    for i in 0..1000 {
        text.push_str(&format!(
            "Person {i},\"City, {i}\",p{i}@example.com,\"said \"\"hi\"\"\"\n"
        ));
    }

    let mut group = c.benchmark_group("csv");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("decode_1000_rows", |b| {
        b.iter(|| {
            let records = tabular::decode(black_box(&text)).unwrap();
            assert_eq!(records.len(), 1000);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_fill, bench_list_fields, bench_csv_decode);

criterion_main!(benches);
