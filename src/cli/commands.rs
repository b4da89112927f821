//! CLI command implementations
//!
//! Every command loads configuration (file, then `QUERYTOKEN_*` overrides),
//! replays the token description through the validator and returns the JSON
//! payload that `run_command` prints inside the success envelope.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::compiler::{params_json, Compiler};
use crate::config::QueryConfig;
use crate::executor::{ComplexityAnalyzer, ExecOptions, Executor};
use crate::memory::MemoryDriver;
use crate::observability::{log_event_with_fields, Event};
use crate::token::{Token, TokenSpec};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_file, read_json, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command and print its result
pub fn run_command(cmd: Command) -> CliResult<()> {
    let data = match cmd {
        Command::Compile { token, config } => compile(&token, config.as_deref())?,
        Command::Explain { token, config } => explain(&token, config.as_deref())?,
        Command::Run {
            token,
            data,
            config,
            unbounded,
            total,
        } => {
            let mut opts = ExecOptions::new();
            opts.unbounded = unbounded;
            opts.include_total = total;
            execute(&token, &data, config.as_deref(), opts)?
        }
    };
    write_response(data)
}

/// Resolve configuration: defaults or file, then environment overrides
pub fn load_config(path: Option<&Path>) -> CliResult<QueryConfig> {
    let config = match path {
        Some(p) => QueryConfig::load(p)?.with_overrides(std::env::vars())?,
        None => QueryConfig::from_env()?,
    };
    let source = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    log_event_with_fields(Event::ConfigLoaded, &[("source", source.as_str())]);
    Ok(config)
}

fn load_token(path: &Path, config: &QueryConfig) -> CliResult<Token> {
    let spec = TokenSpec::from_json(&read_file(path)?)?;
    Ok(spec.to_token(config)?)
}

/// Compile a token description to SQL plus parameters
pub fn compile(token_path: &Path, config_path: Option<&Path>) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let token = load_token(token_path, &config)?;
    let query = Compiler::new(config).compile(&token)?;
    let sql = query.to_sql();
    Ok(json!({
        "sql": sql.sql,
        "params": params_json(&sql.params),
        "notes": query.notes,
    }))
}

/// Summarize a token: operations, counts, complexity warnings and SQL
pub fn explain(token_path: &Path, config_path: Option<&Path>) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let token = load_token(token_path, &config)?;
    let report = ComplexityAnalyzer::new(&config).analyze(&token);
    let query = Compiler::new(config).compile(&token)?;
    let sql = query.to_sql();
    Ok(json!({
        "source": token.source().describe(),
        "operations": token.describe(),
        "counts": {
            "operations": report.counts.operations,
            "joins": report.counts.joins,
            "filters": report.counts.filters,
        },
        "filters": token.filter_summary(),
        "warnings": report.warnings,
        "sql": sql.sql,
        "params": params_json(&sql.params),
    }))
}

/// Execute a token against fixture tables with the in-memory driver
pub fn execute(
    token_path: &Path,
    data_path: &Path,
    config_path: Option<&Path>,
    opts: ExecOptions,
) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let token = load_token(token_path, &config)?;
    let driver = MemoryDriver::from_json(&read_json(data_path)?)?;
    let executor = Executor::new(config, Arc::new(driver));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error(format!("failed to start runtime: {}", e)))?;
    let result = runtime.block_on(executor.execute(&token, opts))?;
    Ok(result.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, value: Value) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn people_token(dir: &TempDir) -> std::path::PathBuf {
        write(
            dir,
            "token.json",
            json!({
                "table": "people",
                "operations": [
                    {"op": "filter", "field": "name", "operator": "eq", "value": "John", "case_insensitive": true},
                    {"op": "limit", "value": 5}
                ]
            }),
        )
    }

    #[test]
    fn test_compile_prints_sql_and_params() {
        let dir = TempDir::new().unwrap();
        let out = compile(&people_token(&dir), None).unwrap();
        let sql = out["sql"].as_str().unwrap();
        assert!(sql.contains("FROM \"people\" AS \"root\""));
        assert!(sql.contains("LIMIT 5"));
        assert_eq!(out["params"], json!(["john"]));
    }

    #[test]
    fn test_explain_reports_counts() {
        let dir = TempDir::new().unwrap();
        let out = explain(&people_token(&dir), None).unwrap();
        assert_eq!(out["counts"]["filters"], 1);
        assert_eq!(out["operations"], json!(["filter", "limit"]));
        assert_eq!(out["filters"], json!(["root.name eq"]));
    }

    #[test]
    fn test_run_against_fixture() {
        let dir = TempDir::new().unwrap();
        let data = write(
            &dir,
            "data.json",
            json!({"people": [{"id": 1, "name": "john"}, {"id": 2, "name": "Jane"}]}),
        );
        let out = execute(&people_token(&dir), &data, None, ExecOptions::new()).unwrap();
        assert_eq!(out["data"], json!([{"id": 1, "name": "john"}]));
    }

    #[test]
    fn test_invalid_operator_keeps_code() {
        let dir = TempDir::new().unwrap();
        let token = write(
            &dir,
            "bad.json",
            json!({"table": "t", "operations": [{"op": "filter", "field": "a", "operator": "approx", "value": 1}]}),
        );
        let err = compile(&token, None).unwrap_err();
        assert_eq!(err.code_str(), "QT_UNKNOWN_OPERATOR");
    }

    #[test]
    fn test_config_file_applies() {
        let dir = TempDir::new().unwrap();
        let config = write(&dir, "config.json", json!({"max_page_size": 3, "default_page_size": 2}));
        let err = compile(&people_token(&dir), Some(&config)).unwrap_err();
        assert_eq!(err.code_str(), "QT_LIMIT_EXCEEDED");
    }
}
