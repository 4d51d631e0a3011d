//! CLI: schema document → (defaults | form | check)
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::engine::{FormEngine, FormOptions};
use crate::form_tree;
use crate::introspect::default_object;
use crate::reactive::LocalHost;
use crate::schema::Schema;

// ------------------------------- Types ------------------------------------ //

/// build, fill and validate forms described by a JSON schema document
#[derive(Parser, Debug)]
#[command(name = "schema-form", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the default value tree derived from the schema
    Defaults(DefaultsCmd),
    /// build a form, apply assignments and print the resulting form state
    Form(FormCmd),
    /// validate one or more data files against the schema
    Check(CheckCmd),
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// schema document (.json)
    #[arg(long, short)]
    schema: PathBuf,

    /// separator for textual field paths
    #[arg(long, default_value_t = '.')]
    separator: char,
}

#[derive(clap::Parser, Debug)]
struct DefaultsCmd {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct FormCmd {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// initial data (.json object); schema defaults when omitted
    #[arg(long, short)]
    data: Option<PathBuf>,

    /// `path=json` assignment, applied in order; a value that is not valid
    /// JSON is taken as a string
    #[arg(long = "set", value_name = "PATH=VALUE")]
    assignments: Vec<String>,

    /// run a validation pass after the assignments
    #[arg(long, default_value_t = false)]
    validate: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct CheckCmd {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// One or more inputs. May be literal paths or quoted glob patterns.
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

/// Outcome of validating one data file.
#[derive(Debug)]
struct Verdict {
    valid: bool,
    field_errors: Vec<(String, String)>,
    form_errors: Vec<String>,
}

// ---------------------------- Implementation ------------------------------ //

impl SchemaSettings {
    fn load_schema(&self) -> anyhow::Result<Arc<Schema>> {
        let schema = crate::document::load(&self.schema)?;
        debug!(schema = %self.schema.display(), kind = schema.kind(), "loaded schema document");
        Ok(Arc::new(schema))
    }

    fn options(&self, validate_on_init: bool) -> FormOptions {
        FormOptions { path_separator: self.separator, validate_on_init }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// `Ok(false)` when a `check` found invalid files.
    pub fn run(&self) -> anyhow::Result<bool> {
        match &self.cmd {
            Command::Defaults(target) => {
                let schema = target.schema_settings.load_schema()?;
                let defaults = default_object(&schema).context("failed to derive schema defaults")?;
                emit(&Value::Object(defaults), target.out.as_deref())?;
                Ok(true)
            }
            Command::Form(target) => {
                let schema = target.schema_settings.load_schema()?;
                let data = target.data.as_deref().map(read_object).transpose()?;
                let engine = FormEngine::with_options(LocalHost, schema, data, target.schema_settings.options(true))?;
                for raw in &target.assignments {
                    let (path, value) = parse_assignment(raw)?;
                    engine.assign(path, value).with_context(|| format!("--set {raw}"))?;
                }
                if target.validate {
                    engine.validate()?;
                }
                let state = json!({
                    "form": engine.fields(),
                    "valid": engine.is_valid(),
                    "formErrors": engine.errors(),
                });
                emit(&state, target.out.as_deref())?;
                Ok(true)
            }
            Command::Check(target) => {
                let settings = &target.schema_settings;
                let schema = settings.load_schema()?;
                let paths = resolve_file_path_patterns(&target.input)?;
                info!(files = paths.len(), "checking data files");
                let verdicts = paths
                    .par_iter()
                    .map(|path| (path, check_file(&schema, path, settings)))
                    .collect::<Vec<_>>();
                let mut all_valid = true;
                for (path, verdict) in verdicts {
                    all_valid &= report(path, &verdict);
                }
                Ok(all_valid)
            }
        }
    }
}

// --------------------------- Internal Helpers ----------------------------- //

fn check_file(schema: &Arc<Schema>, path: &Path, settings: &SchemaSettings) -> anyhow::Result<Verdict> {
    let data = read_object(path)?;
    let engine = FormEngine::with_options(LocalHost, Arc::clone(schema), Some(data), settings.options(false))?;
    let valid = engine.validate()?;
    let fields = engine.fields();
    let separator = settings.separator.to_string();
    let field_errors = form_tree::leaves(&fields)
        .into_iter()
        .filter(|(_, leaf)| !leaf.error.is_empty())
        .map(|(keys, leaf)| (keys.join(&separator), leaf.error.clone()))
        .collect();
    Ok(Verdict { valid, field_errors, form_errors: engine.errors() })
}

fn report(path: &Path, verdict: &anyhow::Result<Verdict>) -> bool {
    let shown = path.display();
    match verdict {
        Ok(v) if v.valid => {
            println!("{} {shown}", "ok".green().bold());
            true
        }
        Ok(v) => {
            println!("{} {shown}", "invalid".red().bold());
            for (field, message) in &v.field_errors {
                println!("    {}: {message}", field.yellow());
            }
            for message in &v.form_errors {
                println!("    {}: {message}", "(form)".yellow());
            }
            false
        }
        Err(error) => {
            println!("{} {shown}: {error:#}", "error".red().bold());
            false
        }
    }
}

fn read_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let src = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_str::<Value>(&src).with_context(|| format!("failed to parse JSON ({})", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("{}: expected a JSON object, found {}", path.display(), json_kind(&other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `user.age=42` → (`"user.age"`, `42`); `name=Ann` → (`"name"`, `"Ann"`).
fn parse_assignment(raw: &str) -> anyhow::Result<(String, Value)> {
    let Some((path, value)) = raw.split_once('=') else {
        bail!("expected PATH=VALUE, got {raw:?}");
    };
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((path.to_string(), value))
}

fn emit(value: &Value, out: Option<&Path>) -> anyhow::Result<()> {
    let src = serde_json::to_string_pretty(value)?;
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, &src).with_context(|| format!("failed to write {}", out.display()))?;
        }
        None => println!("{src}"),
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }
    Ok(out)
}
