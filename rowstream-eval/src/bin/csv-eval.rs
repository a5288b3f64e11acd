//! `csv-eval` — the command-line front end over [`rowstream_eval`]:
//! update/append expression evaluation, `--select`, and `--exit-if`
//! filtering, reading from stdin and writing to stdout.

use std::collections::HashMap;
use std::io::{stdin, stdout, BufReader};

use anyhow::{bail, Context, Result};
use clap::Parser;

use rowstream::dtype::{Primitive, Type};
use rowstream::schema::Schema;
use rowstream::stream::{BinarySpec, Stream, StreamOptions};

use rowstream_eval::pipeline::{self, EvalOptions, EvalPipeline};
use rowstream_eval::shutdown::Shutdown;

/// Evaluate a sandboxed numerical expression over a stream of typed
/// records, or filter records by a boolean condition.
#[derive(Parser, Debug)]
#[command(name = "csv-eval", about = "Evaluate expressions over rowstream records")]
struct Args {
    /// Comma-joined input schema field names, declared in schema order.
    #[arg(long, value_delimiter = ',')]
    schema_fields: Vec<String>,

    /// Compact-alphabet format string for `schema-fields` (one scalar
    /// token per field; nested/array schemas are not expressible from
    /// the command line).
    #[arg(long)]
    schema_format: String,

    /// Effective wire field list/order; defaults to schema order.
    #[arg(long)]
    fields: Option<String>,

    /// Binary mode on/off (`--binary`), or the wire format string directly
    /// (`--binary=<format>`). Mutually exclusive with `--format`.
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    binary: Option<String>,

    /// Explicit wire format string; implies binary mode. Mutually
    /// exclusive with `--binary`.
    #[arg(long)]
    format: Option<String>,

    /// Ascii field delimiter.
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Floating-point formatting precision (significant digits).
    #[arg(long, default_value_t = 12)]
    precision: usize,

    /// Force single-record batches and aggressive flushing.
    #[arg(long)]
    flush: bool,

    /// Resolve `--fields` tokens as full xpaths rather than unambiguous
    /// leaf names.
    #[arg(long)]
    full_xpath: bool,

    /// `name=value` comma-joined default values for fields missing from
    /// the effective field list.
    #[arg(long, value_delimiter = ',')]
    default_values: Vec<String>,

    /// Comma-joined output field names; inferred from the expression's
    /// assignment targets when omitted.
    #[arg(long, value_delimiter = ',')]
    output_fields: Option<Vec<String>>,

    /// Compact-alphabet format string for `--output-fields`; defaults
    /// every output field to `d` (f8).
    #[arg(long)]
    output_format: Option<String>,

    /// Use the unrestricted `rhai` standard library instead of the fixed
    /// numeric namespace.
    #[arg(long)]
    permissive: bool,

    /// Emit diagnostics to stderr via `log`.
    #[arg(long)]
    verbose: bool,

    /// Evaluate a boolean condition and dump only matching records.
    #[arg(long, conflicts_with = "exit_if")]
    select: Option<String>,

    /// Evaluate a boolean condition; stop at (and exclude) the first
    /// record where it holds, passing preceding records through.
    #[arg(long, conflicts_with = "select")]
    exit_if: Option<String>,

    /// The update/append assignment expression (ignored with
    /// `--select`/`--exit-if`).
    expression: Option<String>,
}

fn parse_schema(fields: &[String], format: &str) -> Result<Schema> {
    let tokens = rowstream::format::expand(format);
    if tokens.len() != fields.len() {
        bail!(
            "schema-format declares {} type(s) but schema-fields has {} name(s)",
            tokens.len(),
            fields.len()
        );
    }
    let types: Result<Vec<Type>> = tokens
        .iter()
        .map(|t| {
            let wire = rowstream::format::token_to_wire(t)?;
            Ok(Type::Scalar(Primitive::from_wire_token(&wire)?))
        })
        .collect();
    Ok(Schema::new(fields.to_vec(), types?)?)
}

fn parse_default_values(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once('=')
            .with_context(|| format!("default value {entry:?} is not of the form name=value"))?;
        out.insert(name.to_string(), value.to_string());
    }
    Ok(out)
}

fn stream_options(args: &Args) -> Result<StreamOptions> {
    if args.binary.is_some() && args.format.is_some() {
        bail!("--binary and --format are mutually exclusive");
    }
    let binary = match &args.binary {
        Some(fmt) if !fmt.is_empty() => Some(BinarySpec::Format(fmt.clone())),
        Some(_) => Some(BinarySpec::Flag(true)),
        None => args.format.as_ref().map(|_| BinarySpec::Flag(true)),
    };
    Ok(StreamOptions {
        fields: args.fields.clone(),
        binary,
        format: args.format.clone(),
        delimiter: args.delimiter,
        precision: args.precision,
        flush: args.flush,
        full_xpath: args.full_xpath,
        verbose: args.verbose,
        default_values: parse_default_values(&args.default_values)?,
        source_is_stdin: true,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let shutdown = Shutdown::install().context("installing signal handlers")?;

    let schema = parse_schema(&args.schema_fields, &args.schema_format)?;
    let opts = stream_options(&args)?;

    let source = Box::new(BufReader::new(stdin()));
    let target: Box<dyn std::io::Write> = Box::new(stdout());
    let mut input = Stream::new(schema, Some(source), Some(target), opts, None)?;

    if args.verbose {
        log::info!(
            "binary={} format={:?} fields={:?} delimiter={:?} precision={} size={}",
            input.binary,
            input.format,
            input.fields,
            input.delimiter,
            input.precision,
            input.size,
        );
    }

    if let Some(expr) = &args.select {
        let engine = rowstream_eval::engine::build_engine(args.permissive);
        let ast = rowstream_eval::engine::compile(&engine, expr)?;
        pipeline::run_select(&engine, &ast, expr, &mut input, &shutdown)?;
        return Ok(());
    }
    if let Some(expr) = &args.exit_if {
        let engine = rowstream_eval::engine::build_engine(args.permissive);
        let ast = rowstream_eval::engine::compile(&engine, expr)?;
        pipeline::run_exit_if(&engine, &ast, expr, &mut input, &shutdown)?;
        return Ok(());
    }

    let expression = args
        .expression
        .clone()
        .context("an update/append expression is required unless --select or --exit-if is given")?;

    let eval_opts = EvalOptions {
        expression,
        output_fields: args.output_fields.clone(),
        output_format: args.output_format.clone(),
        permissive: args.permissive,
    };
    let pipeline = EvalPipeline::new(eval_opts, input.schema())?;

    let mut output_stream = if pipeline.output_fields.is_empty() {
        None
    } else {
        let output_schema = pipeline.output_schema.clone().expect("non-empty output_fields implies a schema");
        let out_target: Box<dyn std::io::Write> = Box::new(stdout());
        let out_opts = StreamOptions {
            delimiter: args.delimiter,
            precision: args.precision,
            ..StreamOptions::default()
        };
        let mut stream = Stream::new(output_schema, None, Some(out_target), out_opts, None)?;
        stream.tie(&input)?;
        Some(stream)
    };

    pipeline::run_evaluate(&pipeline, &mut input, output_stream.as_mut(), &shutdown)?;
    Ok(())
}
