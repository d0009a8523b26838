use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use hogql_compiler::catalog::{Database, MaterializationCatalog};
use hogql_compiler::config::CompilerConfig;
use hogql_compiler::query_ast::SelectQuery;
use hogql_compiler::{compile, CompileContext, Dialect};

/// hogqlc - compile a HogQL query AST to SQL
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Query AST as JSON; `-` reads standard input
    ast: PathBuf,

    /// Target dialect: clickhouse, postgres or hogql
    #[arg(long, default_value = "clickhouse")]
    dialect: Dialect,

    /// Property materialization catalog (YAML)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Modifiers and settings (YAML); environment variables otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Restrict every table read to this team
    #[arg(long)]
    team_id: Option<i64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn read_ast(path: &Path) -> Result<SelectQuery> {
    let text = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading AST from stdin")?
    } else {
        fs::read_to_string(path).with_context(|| format!("reading AST from {}", path.display()))?
    };
    serde_json::from_str(&text).context("parsing query AST")
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Defaults to WARN, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CompilerConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CompilerConfig::from_env().context("loading config from environment")?,
    };
    let catalog = match &cli.catalog {
        Some(path) => MaterializationCatalog::from_yaml_file(path)
            .with_context(|| format!("loading catalog from {}", path.display()))?,
        None => MaterializationCatalog::default(),
    };
    let database = Database::standard();
    let select = read_ast(&cli.ast)?;

    let ctx = CompileContext {
        database: &database,
        catalog: &catalog,
        modifiers: &config.modifiers,
        settings: &config.settings,
        team_id: cli.team_id,
    };
    log::info!("Compiling for {}", cli.dialect);
    let printed = compile(&select, cli.dialect, &ctx)?;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&printed)?
    } else {
        serde_json::to_string(&printed)?
    };
    println!("{}", output);
    Ok(())
}
