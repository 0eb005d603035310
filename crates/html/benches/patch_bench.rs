use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use html::{Document, DomPatcher, NoScripts, ScanMode, parse_xml, tokenize};

const SMALL_ROWS: usize = 64;
const LARGE_ROWS: usize = 5_000;

fn make_rows(rows: usize) -> String {
    let mut out = String::with_capacity(rows * 48);
    for i in 0..rows {
        out.push_str(&format!("<tr id=r{i}><td class=c>{i}</td><td>&amp;</td></tr>"));
    }
    out
}

fn make_page(rows: usize) -> String {
    format!(
        "<html><head></head><body><form id=f><table><tbody id=tb>{}</tbody></table></form></body></html>",
        make_rows(rows)
    )
}

fn make_response(rows: usize) -> String {
    format!(
        "<?xml version=\"1.0\"?><partial-response><changes><update id=\"tb\"><![CDATA[<tbody id=tb>{}</tbody>]]></update></changes></partial-response>",
        make_rows(rows)
    )
}

fn bench_tokenize_small(c: &mut Criterion) {
    let input = make_page(SMALL_ROWS);
    c.bench_function("bench_tokenize_small", |b| {
        b.iter(|| {
            let tokens = tokenize(black_box(&input), ScanMode::Html);
            black_box(tokens.len());
        });
    });
}

fn bench_parse_response_large(c: &mut Criterion) {
    let input = make_response(LARGE_ROWS);
    c.bench_function("bench_parse_response_large", |b| {
        b.iter(|| {
            let tree = parse_xml(black_box(&input));
            black_box(tree.is_ok());
        });
    });
}

fn bench_replace_row(c: &mut Criterion) {
    let page = make_page(LARGE_ROWS);
    c.bench_function("bench_replace_row", |b| {
        b.iter_batched(
            || (Document::parse(&page), DomPatcher::new("jsf.js")),
            |(mut doc, mut patcher)| {
                let Some(row) = doc.element_by_id("r42") else {
                    return;
                };
                let keys = patcher
                    .replace_subtree(&mut doc, row, "<tr id=r42><td>new</td></tr>", &mut NoScripts)
                    .map(|k| k.len());
                black_box(keys.ok());
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_tokenize_small,
    bench_parse_response_large,
    bench_replace_row
);
criterion_main!(benches);
