use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use futures::executor::block_on;
use md_surface::format::{ContentFormat, converter_for};
use md_surface::{Document, EditorConfig, Session, Shape, TextFormat};

fn sample_blocks(sections: usize) -> Vec<Shape> {
    let mut blocks = Vec::new();
    for index in 0..sections {
        blocks.push(Shape::heading(2, vec![Shape::text(format!("Section {index}"))]));
        blocks.push(Shape::paragraph(vec![
            Shape::text("Some "),
            Shape::formatted("bold", TextFormat::BOLD),
            Shape::text(" and "),
            Shape::formatted("code", TextFormat::CODE),
            Shape::text(" in a sentence."),
        ]));
        blocks.push(Shape::list(
            false,
            vec![
                Shape::list_item(vec![Shape::text("first")]),
                Shape::list_item(vec![Shape::text("second")]),
            ],
        ));
        blocks.push(Shape::table(&[&["a", "b"], &["1", "2"]]));
    }
    blocks
}

fn bench_export(c: &mut Criterion) {
    let doc = Document::from_blocks(&sample_blocks(50));
    let mut group = c.benchmark_group("export");
    for format in ContentFormat::ALL {
        let converter = converter_for(format);
        group.bench_with_input(BenchmarkId::from_parameter(format), &doc, |b, doc| {
            b.iter(|| black_box(converter.export(doc)))
        });
    }
    group.finish();
}

fn bench_import(c: &mut Criterion) {
    let doc = Document::from_blocks(&sample_blocks(50));
    let mut group = c.benchmark_group("import");
    for format in ContentFormat::ALL {
        let converter = converter_for(format);
        let value = converter.export(&doc);
        group.bench_with_input(BenchmarkId::from_parameter(format), &value, |b, value| {
            b.iter(|| black_box(converter.import(value)))
        });
    }
    group.finish();
}

fn bench_keystroke_outbound(c: &mut Criterion) {
    let source = converter_for(ContentFormat::Markdown).export(&Document::from_blocks(&sample_blocks(20)));
    let session = block_on(Session::mount(EditorConfig::default().with_initial_content(source)))
        .expect("mount");
    session.focus();
    c.bench_function("keystroke_outbound", |b| {
        b.iter(|| black_box(session.insert_text("x")))
    });
}

fn bench_watch_echo(c: &mut Criterion) {
    let session = block_on(Session::mount(EditorConfig::default().with_initial_content("start")))
        .expect("mount");
    session.focus();
    session.insert_text("!");
    let echoed = block_on(session.get_content()).expect("export");
    c.bench_function("watch_echo_skip", |b| {
        b.iter(|| black_box(block_on(session.watch_external_value(echoed.clone()))))
    });
}

criterion_group!(
    benches,
    bench_export,
    bench_import,
    bench_keystroke_outbound,
    bench_watch_echo
);
criterion_main!(benches);
