//! Orchestrates one expression against a bound input [`Stream`]: classifies
//! assignment targets into update fields (already in the input schema,
//! rewritten in place) and output fields (new, appended as a tied batch),
//! builds the small schemas each needs, and evaluates a compiled `rhai`
//! AST row by row over every batch. Also implements the boolean-condition
//! `select`/`exit-if` variants, which share the row-scalar evaluation core
//! but skip field classification entirely.

use std::collections::HashMap;

use rhai::{Engine, AST};

use rowstream::dtype::{Dtype, Primitive, Type};
use rowstream::record::RecordBuffer;
use rowstream::schema::Schema;
use rowstream::stream::Stream;

use crate::engine::{self as eval_engine, FieldValue};
use crate::error::{EvalError, Result};
use crate::infer;

/// Construction parameters for an [`EvalPipeline`].
pub struct EvalOptions {
    /// The `;`/newline separated assignment expression.
    pub expression: String,
    /// User-declared output field names; `None` infers them as the
    /// assignment targets not already present in the input schema.
    pub output_fields: Option<Vec<String>>,
    /// Compact-alphabet format string for `output_fields`, aligned 1:1;
    /// `None` defaults every output field to `d` (f8).
    pub output_format: Option<String>,
    /// Use the unrestricted `rhai` engine (full standard library) instead
    /// of the fixed numeric namespace.
    pub permissive: bool,
}

/// A compiled expression bound to an input stream's field list, ready to
/// evaluate batch by batch.
pub struct EvalPipeline {
    engine: Engine,
    ast: AST,
    expression: String,
    /// Assignment targets that are also input fields; rewritten in place.
    pub update_fields: Vec<String>,
    /// Assignment targets that are new; appended as a tied output batch.
    pub output_fields: Vec<String>,
    /// Schema of `output_fields`, `None` if there are none.
    pub output_schema: Option<Schema>,
    /// Layout of the update overlay batch, one column per `update_fields`
    /// in the input schema's own primitive type — never hardcoded to
    /// `f8`, so [`Stream::apply_update_overlay`]'s binary-mode raw byte
    /// copy never reinterprets an evaluated `f64` as a narrower integer.
    update_dtype: Dtype,
}

fn output_types_from_format(
    output_fields: &[String],
    output_format: Option<&str>,
) -> Result<Vec<Type>> {
    match output_format {
        None => Ok(output_fields.iter().map(|_| Type::Scalar(Primitive::F8)).collect()),
        Some(spec) => {
            let tokens: Vec<String> = rowstream::format::expand(spec);
            if tokens.len() != output_fields.len() {
                return Err(EvalError::FieldNameError(format!(
                    "output-format declares {} type(s) but there are {} output field(s)",
                    tokens.len(),
                    output_fields.len()
                )));
            }
            tokens
                .iter()
                .map(|t| {
                    let wire = rowstream::format::token_to_wire(t)?;
                    Ok(Type::Scalar(Primitive::from_wire_token(&wire)?))
                })
                .collect::<std::result::Result<Vec<_>, rowstream::Error>>()
                .map_err(EvalError::from)
        }
    }
}

impl EvalPipeline {
    /// Builds a pipeline against `input_schema` (the bound stream's own
    /// schema): classifies assignment targets, validates every field
    /// name, and compiles the expression once.
    pub fn new(opts: EvalOptions, input_schema: &Schema) -> Result<EvalPipeline> {
        let input_fields = &input_schema.fields;
        let inferred = infer::output_fields_from_expressions(&opts.expression);
        for name in &inferred {
            infer::validate_field_name(name)?;
        }

        let update_fields: Vec<String> = inferred
            .iter()
            .filter(|f| input_fields.contains(f))
            .cloned()
            .collect();

        let output_fields: Vec<String> = match opts.output_fields {
            Some(explicit) => {
                for name in &explicit {
                    infer::validate_field_name(name)?;
                    if input_fields.contains(name) {
                        return Err(EvalError::FieldNameError(format!(
                            "output field {name:?} collides with an input field; use an update expression instead"
                        )));
                    }
                }
                explicit
            }
            None => inferred
                .iter()
                .filter(|f| !input_fields.contains(f))
                .cloned()
                .collect(),
        };

        let output_schema = if output_fields.is_empty() {
            None
        } else {
            let types = output_types_from_format(&output_fields, opts.output_format.as_deref())?;
            Some(Schema::new(output_fields.clone(), types)?)
        };

        let mut update_columns = Vec::with_capacity(update_fields.len());
        for f in &update_fields {
            match input_schema.type_of_field.get(f) {
                Some(Type::Scalar(p)) => update_columns.push((f.clone(), *p, 1)),
                Some(Type::Array { .. }) | Some(Type::Nested(_)) => {
                    return Err(EvalError::FieldNameError(format!(
                        "{f:?} is an array/nested field; the evaluator only rewrites scalar fields in place"
                    )));
                }
                None => unreachable!("update_fields is filtered to input_schema.fields"),
            }
        }
        let update_dtype = Dtype::from_columns(update_columns);

        let engine = eval_engine::build_engine(opts.permissive);
        let ast = eval_engine::compile(&engine, &opts.expression)?;

        Ok(EvalPipeline {
            engine,
            ast,
            expression: opts.expression,
            update_fields,
            output_fields,
            output_schema,
            update_dtype,
        })
    }

    /// Evaluates every row of `input_batch` (shaped to the bound stream's
    /// schema dtype), returning an optional update overlay batch (shaped
    /// to `update_dtype`, each column in the input schema's own
    /// primitive type) and an optional output batch (shaped to
    /// `output_schema`).
    ///
    /// `input_batch`'s columns are located by name via `field_lookup`, the
    /// bound stream's schema `dtype`, so this works regardless of binary
    /// or ascii mode.
    pub fn evaluate_batch(
        &self,
        input_batch: &RecordBuffer,
        field_lookup: &HashMap<String, usize>,
    ) -> Result<(Option<RecordBuffer>, Option<RecordBuffer>)> {
        let mut update_batch = if self.update_fields.is_empty() {
            None
        } else {
            Some(RecordBuffer::zeroed(self.update_dtype.clone(), input_batch.len))
        };
        let mut output_batch = self
            .output_schema
            .as_ref()
            .map(|s| RecordBuffer::zeroed(s.dtype.clone(), input_batch.len));

        for row in 0..input_batch.len {
            let mut inputs = Vec::with_capacity(field_lookup.len());
            for (name, col_idx) in field_lookup {
                let col = &input_batch.dtype.columns[*col_idx];
                inputs.push((name.clone(), read_field_value(input_batch, row, col)));
            }

            let mut targets = self.update_fields.clone();
            targets.extend(self.output_fields.iter().cloned());

            let scope = eval_engine::eval_row(
                &self.engine,
                &self.ast,
                &self.expression,
                row,
                &inputs,
                &targets,
            )?;

            if let Some(batch) = update_batch.as_mut() {
                for col in &batch.dtype.columns.clone() {
                    write_scope_value(batch, row, col, &scope);
                }
            }
            if let Some(batch) = output_batch.as_mut() {
                for col in &batch.dtype.columns.clone() {
                    write_scope_value(batch, row, col, &scope);
                }
            }
        }

        Ok((update_batch, output_batch))
    }
}

/// Reads `col` into a [`FieldValue`]: string columns bind as `rhai`
/// strings (the `count`/`replace` operand type), everything else widens
/// to `f64` — floats read directly, timestamps/timedeltas/integers
/// through `i64`.
fn read_field_value(
    batch: &RecordBuffer,
    row: usize,
    col: &rowstream::dtype::DtypeField,
) -> FieldValue {
    match col.prim {
        Primitive::F4 | Primitive::F8 => FieldValue::Num(batch.read_f64(row, col)),
        Primitive::Str(_) => FieldValue::Str(batch.read_str(row, col)),
        _ => FieldValue::Num(batch.read_i64(row, col) as f64),
    }
}

/// Writes `col`'s post-execution scope value back into `batch`: string
/// columns read back as a `rhai` string, floats as `f64`, everything
/// else (ints, timestamps, timedeltas) as `i64`.
fn write_scope_value(
    batch: &mut RecordBuffer,
    row: usize,
    col: &rowstream::dtype::DtypeField,
    scope: &rhai::Scope,
) {
    match col.prim {
        Primitive::F4 | Primitive::F8 => {
            batch.write_f64(row, col, eval_engine::scope_value(scope, &col.name))
        }
        Primitive::Str(_) => {
            batch.write_str(row, col, &eval_engine::scope_string(scope, &col.name))
        }
        _ => batch.write_i64(row, col, eval_engine::scope_value(scope, &col.name) as i64),
    }
}

/// Builds the `field name -> column index` lookup used by
/// [`EvalPipeline::evaluate_batch`]: every batch `Stream::read` returns is
/// laid out under the bound schema's own `dtype`, i.e. in `schema.fields`
/// order, regardless of the stream's effective wire field order.
pub fn field_lookup(input: &Stream) -> HashMap<String, usize> {
    input
        .schema()
        .fields
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

/// Runs the evaluate loop: reads batches from `input` until end of
/// stream, evaluates each, writes the update overlay in place and the
/// output batch (tied to `input`) to `output` if there is one, otherwise
/// dumps `input` unchanged. Stops early if `shutdown` reports a pending
/// signal.
pub fn run_evaluate(
    pipeline: &EvalPipeline,
    input: &mut Stream,
    mut output: Option<&mut Stream>,
    shutdown: &crate::shutdown::Shutdown,
) -> Result<()> {
    let lookup = field_lookup(input);
    loop {
        if shutdown.requested() {
            break;
        }
        let Some(batch) = input.iter().next().transpose()? else {
            break;
        };
        let (update_batch, output_batch) = pipeline.evaluate_batch(&batch, &lookup)?;

        if let Some(update) = &update_batch {
            input.apply_update_overlay(&pipeline.update_fields, update)?;
        }

        match (&mut output, &output_batch) {
            (Some(out), Some(ob)) => out.write(ob)?,
            _ => input.dump(None)?,
        }
    }
    Ok(())
}

/// Runs select mode: reads batches from `input`, evaluates the boolean
/// `expression` per row, and dumps the rows where it is true (non-zero).
pub fn run_select(
    engine: &Engine,
    ast: &AST,
    expression: &str,
    input: &mut Stream,
    shutdown: &crate::shutdown::Shutdown,
) -> Result<()> {
    let lookup = field_lookup(input);
    loop {
        if shutdown.requested() {
            break;
        }
        let Some(batch) = input.iter().next().transpose()? else {
            break;
        };
        let mut mask = Vec::with_capacity(batch.len);
        for row in 0..batch.len {
            let inputs: Vec<(String, FieldValue)> = lookup
                .iter()
                .map(|(name, idx)| {
                    let col = &batch.dtype.columns[*idx];
                    (name.clone(), read_field_value(&batch, row, col))
                })
                .collect();
            mask.push(eval_engine::eval_bool_row(engine, ast, expression, row, &inputs)?);
        }
        input.dump(Some(&mask))?;
    }
    Ok(())
}

/// Runs exit-if mode: reads one record at a time, dumping it and
/// continuing until the boolean condition evaluates true, at which point
/// the loop stops without dumping the matching record.
pub fn run_exit_if(
    engine: &Engine,
    ast: &AST,
    expression: &str,
    input: &mut Stream,
    shutdown: &crate::shutdown::Shutdown,
) -> Result<()> {
    let lookup = field_lookup(input);
    loop {
        if shutdown.requested() {
            break;
        }
        let Some(batch) = input.read(Some(1))? else {
            break;
        };
        let inputs: Vec<(String, FieldValue)> = lookup
            .iter()
            .map(|(name, idx)| {
                let col = &batch.dtype.columns[*idx];
                (name.clone(), read_field_value(&batch, 0, col))
            })
            .collect();
        if eval_engine::eval_bool_row(engine, ast, expression, 0, &inputs)? {
            break;
        }
        input.dump(None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn schema_of(fields: &[&str]) -> Schema {
        Schema::new(
            fields.iter().map(|f| f.to_string()).collect(),
            fields.iter().map(|_| Type::Scalar(Primitive::F8)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn classifies_update_and_output_fields() {
        let opts = EvalOptions {
            expression: "x = x + y; z = x - sin(y) * pow(a, 2.0)".to_string(),
            output_fields: None,
            output_format: None,
            permissive: false,
        };
        let schema = schema_of(&["x", "y", "a"]);
        let pipeline = EvalPipeline::new(opts, &schema).unwrap();
        assert_eq!(pipeline.update_fields, vec!["x".to_string()]);
        assert_eq!(pipeline.output_fields, vec!["z".to_string()]);
        assert!(pipeline.output_schema.is_some());
    }

    #[test]
    fn evaluate_batch_updates_and_appends() {
        let opts = EvalOptions {
            expression: "x = x + y; z = x * 2.0".to_string(),
            output_fields: None,
            output_format: None,
            permissive: false,
        };
        let schema = schema_of(&["x", "y"]);
        let pipeline = EvalPipeline::new(opts, &schema).unwrap();

        let dtype = rowstream::dtype::Dtype::from_fields(vec![
            ("x".to_string(), Primitive::F8),
            ("y".to_string(), Primitive::F8),
        ]);
        let mut batch = RecordBuffer::zeroed(dtype.clone(), 1);
        batch.write_f64(0, &dtype.columns[0], 1.0);
        batch.write_f64(0, &dtype.columns[1], 2.0);

        let mut lookup = HashMap::new();
        lookup.insert("x".to_string(), 0);
        lookup.insert("y".to_string(), 1);

        let (update, output) = pipeline.evaluate_batch(&batch, &lookup).unwrap();
        let update = update.unwrap();
        assert_eq!(update.read_f64(0, &update.dtype.columns[0]), 3.0);
        let output = output.unwrap();
        assert_eq!(output.read_f64(0, &output.dtype.columns[0]), 6.0);
    }

    #[test]
    fn evaluate_batch_handles_string_fields() {
        let schema = Schema::new(
            vec!["name".to_string()],
            vec![Type::Scalar(Primitive::Str(16))],
        )
        .unwrap();
        let opts = EvalOptions {
            expression: "n = count(name, \"a\"); name = replace(name, \"a\", \"o\")".to_string(),
            output_fields: Some(vec!["n".to_string()]),
            output_format: None,
            permissive: false,
        };
        let pipeline = EvalPipeline::new(opts, &schema).unwrap();

        let dtype = rowstream::dtype::Dtype::from_fields(vec![("name".to_string(), Primitive::Str(16))]);
        let mut batch = RecordBuffer::zeroed(dtype.clone(), 1);
        batch.write_str(0, &dtype.columns[0], "banana");

        let mut lookup = HashMap::new();
        lookup.insert("name".to_string(), 0);

        let (update, output) = pipeline.evaluate_batch(&batch, &lookup).unwrap();
        let update = update.unwrap();
        assert_eq!(update.read_str(0, &update.dtype.columns[0]), "bonono");
        let output = output.unwrap();
        assert_eq!(output.read_f64(0, &output.dtype.columns[0]), 3.0);
    }
}
