use criterion::{criterion_group, criterion_main, Criterion};
use rowstream::dtype::{Primitive, Type};
use rowstream::schema::Schema;
use rowstream::stream::{Stream, StreamOptions};
use std::io::Cursor;

fn schema() -> Schema {
    Schema::new(
        vec!["x".into(), "y".into(), "z".into()],
        vec![
            Type::Scalar(Primitive::F8),
            Type::Scalar(Primitive::F8),
            Type::Scalar(Primitive::F8),
        ],
    )
    .unwrap()
}

fn bench_ascii_read(c: &mut Criterion) {
    let mut input = String::new();
    for i in 0..10_000 {
        input.push_str(&format!("{i}.0,{i}.1,{i}.2\n"));
    }
    c.bench_function("ascii_read_10k_rows", |b| {
        b.iter(|| {
            let source: Box<dyn std::io::BufRead> = Box::new(Cursor::new(input.clone().into_bytes()));
            let mut stream =
                Stream::new(schema(), Some(source), None, StreamOptions::default(), None).unwrap();
            let mut total = 0usize;
            for batch in stream.iter() {
                total += batch.unwrap().len;
            }
            criterion::black_box(total);
        })
    });
}

criterion_group!(benches, bench_ascii_read);
criterion_main!(benches);
