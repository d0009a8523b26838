use hogql_compiler::catalog::{Database, MaterializationCatalog};
use hogql_compiler::config::{CompileSettings, Modifiers};
use hogql_compiler::query_ast::SelectQuery;
use hogql_compiler::{compile, CompileContext, CompileResult, Dialect, PrintedQuery};

pub const SETTINGS: &str = " SETTINGS readonly=2, max_execution_time=60, join_use_nulls=1";

pub struct Harness {
    pub database: Database,
    pub catalog: MaterializationCatalog,
    pub modifiers: Modifiers,
    pub settings: CompileSettings,
    pub team_id: Option<i64>,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            database: Database::standard(),
            catalog: MaterializationCatalog::default(),
            modifiers: Modifiers::default(),
            settings: CompileSettings::default(),
            team_id: Some(1),
        }
    }

    pub fn with_catalog(yaml: &str) -> Self {
        Harness {
            catalog: MaterializationCatalog::from_yaml_str(yaml).expect("catalog should parse"),
            ..Harness::new()
        }
    }

    pub fn compile(&self, select: &SelectQuery, dialect: Dialect) -> CompileResult<PrintedQuery> {
        let ctx = CompileContext {
            database: &self.database,
            catalog: &self.catalog,
            modifiers: &self.modifiers,
            settings: &self.settings,
            team_id: self.team_id,
        };
        compile(select, dialect, &ctx)
    }

    pub fn sql(&self, select: &SelectQuery, dialect: Dialect) -> String {
        let printed = self.compile(select, dialect).expect("query should compile");
        println!("{}:\n{}", dialect, printed.sql);
        printed.sql
    }
}

/// How many bound parameters carry `value`.
pub fn param_count(printed: &PrintedQuery, value: &serde_json::Value) -> usize {
    printed.params.values().filter(|v| *v == value).count()
}
