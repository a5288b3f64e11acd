//! Integration tests covering the evaluator's update/append pipeline,
//! `--select`-style filtering, and `--exit-if`-style early termination,
//! driven end-to-end through ascii `Stream`s.

use std::io::Cursor;

use rowstream::dtype::{Primitive, Type};
use rowstream::schema::Schema;
use rowstream::stream::{Stream, StreamOptions};

use rowstream_eval::pipeline::{self, field_lookup, EvalOptions, EvalPipeline};
use rowstream_eval::shutdown::Shutdown;

fn xy_schema() -> Schema {
    Schema::new(
        vec!["x".into(), "y".into()],
        vec![Type::Scalar(Primitive::F8), Type::Scalar(Primitive::F8)],
    )
    .unwrap()
}

#[test]
fn update_in_place_rewrites_retained_ascii_lines() {
    let schema = xy_schema();
    let opts = StreamOptions::default();
    let source: Box<dyn std::io::BufRead> = Box::new(Cursor::new(b"1,2\n".to_vec()));
    let mut sink = Vec::new();
    {
        let target: Box<dyn std::io::Write> = Box::new(&mut sink);
        let mut input = Stream::new(schema, Some(source), Some(target), opts, None).unwrap();
        let batch = input.read(None).unwrap().unwrap();

        let eval_opts = EvalOptions {
            expression: "x = x + y; y = y - 1".to_string(),
            output_fields: None,
            output_format: None,
            permissive: false,
        };
        let eval_pipeline = EvalPipeline::new(eval_opts, input.schema()).unwrap();
        assert!(eval_pipeline.output_fields.is_empty());

        let lookup = field_lookup(&input);
        let (update, output) = eval_pipeline.evaluate_batch(&batch, &lookup).unwrap();
        assert!(output.is_none());
        let update = update.unwrap();
        input.apply_update_overlay(&eval_pipeline.update_fields, &update).unwrap();
        input.dump(None).unwrap();
    }
    let line = String::from_utf8(sink).unwrap();
    assert_eq!(line.trim_end(), "3,1");
}

#[test]
fn append_expression_produces_tied_output() {
    let schema = xy_schema();
    let opts = StreamOptions::default();
    let source: Box<dyn std::io::BufRead> = Box::new(Cursor::new(b"1,2\n3,4\n".to_vec()));
    let mut input = Stream::new(schema, Some(source), None, opts, None).unwrap();

    let eval_opts = EvalOptions {
        expression: "a=2.0/(x+y);b=x-sin(y)*a**2.0".to_string(),
        output_fields: None,
        output_format: None,
        permissive: false,
    };
    let eval_pipeline = EvalPipeline::new(eval_opts, input.schema()).unwrap();
    assert_eq!(eval_pipeline.output_fields, vec!["a".to_string(), "b".to_string()]);

    let mut sink = Vec::new();
    {
        let out_target: Box<dyn std::io::Write> = Box::new(&mut sink);
        let output_schema = eval_pipeline.output_schema.clone().unwrap();
        let mut output = Stream::new(output_schema, None, Some(out_target), StreamOptions::default(), None).unwrap();
        output.tie(&input).unwrap();

        let shutdown = Shutdown::install().unwrap();
        pipeline::run_evaluate(&eval_pipeline, &mut input, Some(&mut output), &shutdown).unwrap();
    }
    let text = String::from_utf8(sink).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let expected = |x: f64, y: f64| {
        let a = 2.0 / (x + y);
        let b = x - y.sin() * a.powi(2);
        (a, b)
    };
    for (line, (x, y)) in lines.iter().zip([(1.0_f64, 2.0_f64), (3.0, 4.0)]) {
        let fields: Vec<f64> = line.split(',').map(|t| t.parse().unwrap()).collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], x);
        assert_eq!(fields[1], y);
        let (expected_a, expected_b) = expected(x, y);
        assert!((fields[2] - expected_a).abs() < 1e-9);
        assert!((fields[3] - expected_b).abs() < 1e-9);
    }
}

#[test]
fn select_mode_filters_rows() {
    // Fields a,b declared as the int32 layout `format=2i` implies; the
    // select expression combines its two row predicates with the
    // bitwise `&` (not `&&`), matching the original array library's
    // vectorized-filter convention.
    let schema = Schema::new(
        vec!["a".into(), "b".into()],
        vec![Type::Scalar(Primitive::I4), Type::Scalar(Primitive::I4)],
    )
    .unwrap();
    let opts = StreamOptions::default();
    let source: Box<dyn std::io::BufRead> = Box::new(Cursor::new(b"1,2\n1,3\n1,4\n".to_vec()));
    let mut sink = Vec::new();
    {
        let target: Box<dyn std::io::Write> = Box::new(&mut sink);
        let mut input = Stream::new(schema, Some(source), Some(target), opts, None).unwrap();
        let engine = rowstream_eval::engine::build_engine(false);
        let expr = "(a < b - 1.0) & (b < 4.0)";
        let ast = rowstream_eval::engine::compile(&engine, expr).unwrap();
        let shutdown = Shutdown::install().unwrap();
        pipeline::run_select(&engine, &ast, expr, &mut input, &shutdown).unwrap();
    }
    let text = String::from_utf8(sink).unwrap();
    assert_eq!(text.trim_end(), "1,3");
}

#[test]
fn exit_if_mode_stops_before_matching_record() {
    let schema = xy_schema();
    let opts = StreamOptions::default();
    let source: Box<dyn std::io::BufRead> = Box::new(Cursor::new(b"1,2\n3,4\n5,6\n".to_vec()));
    let mut sink = Vec::new();
    {
        let target: Box<dyn std::io::Write> = Box::new(&mut sink);
        let mut input = Stream::new(schema, Some(source), Some(target), opts, None).unwrap();
        let engine = rowstream_eval::engine::build_engine(false);
        let expr = "x > 2.0";
        let ast = rowstream_eval::engine::compile(&engine, expr).unwrap();
        let shutdown = Shutdown::install().unwrap();
        pipeline::run_exit_if(&engine, &ast, expr, &mut input, &shutdown).unwrap();
    }
    let text = String::from_utf8(sink).unwrap();
    // Row one (x=1) fails the condition and is dumped; row two (x=3)
    // matches and ends the stream before it or row three are dumped.
    assert_eq!(text.trim_end(), "1,2");
}
