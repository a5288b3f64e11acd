//! The sandboxed expression evaluator, embedded with `rhai`. Each batch
//! is evaluated one row at a time: input columns are bound as scoped
//! variables, the pre-compiled AST runs, and the resulting update/output
//! field values are read back out of the scope.
//!
//! `permissive` builds a full-standard-library `rhai::Engine`; the
//! default (restricted) engine is built from `Engine::new_raw` with only
//! the fixed numeric/string namespace named in the component design
//! registered (arithmetic, `sin`/`cos`/`clip`/`where_`, `count`/`replace`,
//! bitwise `&`/`|`/`^` on bool for combining row predicates) — no array,
//! print, or debug capability, and nothing that reaches the file system
//! or process.

use rhai::{Engine, Scope, AST};

use crate::error::{EvalError, Result};

fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

fn where_(cond: bool, a: f64, b: f64) -> f64 {
    if cond {
        a
    } else {
        b
    }
}

/// Number of non-overlapping occurrences of `pat` in `s`, as `f64` so it
/// reads back through the same `scope_value` path as every other numeric
/// result; `count(_, "")` is `0` rather than looping forever on an empty
/// pattern.
fn count(s: &str, pat: &str) -> f64 {
    if pat.is_empty() {
        return 0.0;
    }
    s.matches(pat).count() as f64
}

fn replace(s: &str, from: &str, to: &str) -> String {
    s.replace(from, to)
}

/// Bitwise boolean combinators (`&`, `|`, `^`), distinct from `rhai`'s
/// native short-circuiting `&&`/`||`: the vectorized-filter expressions
/// this engine evaluates combine row predicates with `&`/`|`, mirroring
/// the bitwise-on-bool convention of the array library the design notes
/// replace.
fn register_bitwise_bool(engine: &mut Engine) {
    engine
        .register_fn("&", |a: bool, b: bool| a & b)
        .register_fn("|", |a: bool, b: bool| a | b)
        .register_fn("^", |a: bool, b: bool| a ^ b);
}

fn register_numeric_namespace(engine: &mut Engine) {
    engine
        .register_fn("sin", f64::sin)
        .register_fn("cos", f64::cos)
        .register_fn("sqrt", f64::sqrt)
        .register_fn("abs", f64::abs)
        .register_fn("pow", f64::powf)
        .register_fn("min", f64::min)
        .register_fn("max", f64::max)
        .register_fn("clip", clip)
        .register_fn("where_", where_)
        .register_fn("count", count)
        .register_fn("replace", replace);
    register_bitwise_bool(engine);
}

/// `pi`/`e` are plain scope constants, not zero-arg functions: the
/// reserved namespace (see `infer::RESERVED_NAMESPACE`) lets expressions
/// reference them bare (`a = pi`), which a registered function couldn't
/// satisfy without call syntax.
fn push_constants(scope: &mut Scope) {
    scope.push_constant("pi", std::f64::consts::PI);
    scope.push_constant("e", std::f64::consts::E);
}

/// Builds the evaluation engine: `permissive` gets the full `rhai`
/// standard library in addition to the numeric namespace; the default
/// restricted engine gets only the numeric namespace.
pub fn build_engine(permissive: bool) -> Engine {
    let mut engine = if permissive {
        Engine::new()
    } else {
        Engine::new_raw()
    };
    register_numeric_namespace(&mut engine);
    engine
}

/// Compiles `expression` once against `engine`.
pub fn compile(engine: &Engine, expression: &str) -> Result<AST> {
    engine
        .compile(expression)
        .map_err(|e| EvalError::UserExpressionError {
            expression: expression.to_string(),
            row: None,
            message: e.to_string(),
        })
}

/// A row's input/target binding: numeric fields bind as `f64`, text
/// fields (the `count`/`replace` operand type) bind as a `rhai` string.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Num(f64),
    Str(String),
}

/// Evaluates `ast` for one row: `inputs` are bound as scope variables
/// (numeric or string per [`FieldValue`]), `targets` (update + output
/// field names not already in `inputs`) are pre-declared at `0.0`.
/// Returns the post-execution scope, read back via [`scope_value`] /
/// [`scope_string`].
pub fn eval_row(
    engine: &Engine,
    ast: &AST,
    expression: &str,
    row: usize,
    inputs: &[(String, FieldValue)],
    targets: &[String],
) -> Result<Scope<'static>> {
    let mut scope = Scope::new();
    push_constants(&mut scope);
    for (name, value) in inputs {
        match value {
            FieldValue::Num(v) => scope.push(name.clone(), *v),
            FieldValue::Str(s) => scope.push(name.clone(), s.clone()),
        };
    }
    for name in targets {
        if !scope.contains(name) {
            scope.push(name.clone(), 0.0f64);
        }
    }
    engine
        .run_ast_with_scope(&mut scope, ast)
        .map_err(|e| EvalError::UserExpressionError {
            expression: expression.to_string(),
            row: Some(row),
            message: e.to_string(),
        })?;
    Ok(scope)
}

/// Reads back the f64 value of `name` from a post-execution scope.
pub fn scope_value(scope: &Scope, name: &str) -> f64 {
    scope.get_value::<f64>(name).unwrap_or_default()
}

/// Reads back the string value of `name` from a post-execution scope.
pub fn scope_string(scope: &Scope, name: &str) -> String {
    scope.get_value::<String>(name).unwrap_or_default()
}

/// Evaluates `ast` as a boolean condition for one row (select/exit-if
/// mode): `inputs` are bound as scope variables and the AST's final
/// expression value is read back as a `bool`, rather than read out of a
/// named target the way an assignment expression is.
pub fn eval_bool_row(
    engine: &Engine,
    ast: &AST,
    expression: &str,
    row: usize,
    inputs: &[(String, FieldValue)],
) -> Result<bool> {
    let mut scope = Scope::new();
    push_constants(&mut scope);
    for (name, value) in inputs {
        match value {
            FieldValue::Num(v) => scope.push(name.clone(), *v),
            FieldValue::Str(s) => scope.push(name.clone(), s.clone()),
        };
    }
    engine
        .eval_ast_with_scope::<bool>(&mut scope, ast)
        .map_err(|e| EvalError::UserExpressionError {
            expression: expression.to_string(),
            row: Some(row),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_engine_runs_numeric_expression() {
        let engine = build_engine(false);
        let expr = "a = 2.0 / (x + y); b = x - sin(y) * pow(a, 2.0)";
        let ast = compile(&engine, expr).unwrap();
        let scope = eval_row(
            &engine,
            &ast,
            expr,
            0,
            &[
                ("x".into(), FieldValue::Num(1.0)),
                ("y".into(), FieldValue::Num(2.0)),
            ],
            &["a".into(), "b".into()],
        )
        .unwrap();
        let a = scope_value(&scope, "a");
        assert!((a - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn update_in_place() {
        let engine = build_engine(false);
        let ast = compile(&engine, "x = x + y; y = y - 1.0").unwrap();
        let scope = eval_row(
            &engine,
            &ast,
            "x = x + y; y = y - 1.0",
            0,
            &[
                ("x".into(), FieldValue::Num(1.0)),
                ("y".into(), FieldValue::Num(2.0)),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(scope_value(&scope, "x"), 3.0);
        assert_eq!(scope_value(&scope, "y"), 1.0);
    }

    #[test]
    fn bool_condition_reads_back_final_expression() {
        let engine = build_engine(false);
        let ast = compile(&engine, "(a < b - 1.0) && (b < 4.0)").unwrap();
        let result = eval_bool_row(
            &engine,
            &ast,
            "(a < b - 1.0) && (b < 4.0)",
            0,
            &[
                ("a".into(), FieldValue::Num(1.0)),
                ("b".into(), FieldValue::Num(3.0)),
            ],
        )
        .unwrap();
        assert!(result);
    }

    #[test]
    fn bitwise_bool_combinator_matches_select_condition() {
        let engine = build_engine(false);
        let ast = compile(&engine, "(a < b - 1.0) & (b < 4.0)").unwrap();
        let result = eval_bool_row(
            &engine,
            &ast,
            "(a < b - 1.0) & (b < 4.0)",
            0,
            &[
                ("a".into(), FieldValue::Num(1.0)),
                ("b".into(), FieldValue::Num(3.0)),
            ],
        )
        .unwrap();
        assert!(result);

        let result = eval_bool_row(
            &engine,
            &ast,
            "(a < b - 1.0) & (b < 4.0)",
            0,
            &[
                ("a".into(), FieldValue::Num(1.0)),
                ("b".into(), FieldValue::Num(4.0)),
            ],
        )
        .unwrap();
        assert!(!result);
    }

    #[test]
    fn string_count_and_replace() {
        let engine = build_engine(false);
        let expr = "n = count(s, \"a\"); t = replace(s, \"a\", \"o\")";
        let ast = compile(&engine, expr).unwrap();
        let scope = eval_row(
            &engine,
            &ast,
            expr,
            0,
            &[("s".into(), FieldValue::Str("banana".into()))],
            &["n".into(), "t".into()],
        )
        .unwrap();
        assert_eq!(scope_value(&scope, "n"), 3.0);
        assert_eq!(scope_string(&scope, "t"), "bonono");
    }
}
