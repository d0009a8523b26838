//! `person_distinct_ids` and `person_distinct_id_overrides`: the latest
//! person id for each distinct id.
//!
//! ```sql
//! SELECT t.distinct_id AS distinct_id, argMax(t.person_id, t.version) AS person_id
//! FROM <table> AS t
//! WHERE equals(t.team_id, <team>) AND <pushed>
//! GROUP BY t.distinct_id
//! HAVING equals(argMax(t.is_deleted, t.version), 0)
//! ```
//!
//! Only `distinct_id` can take pushed predicates; `person_id` is an aggregate.

use std::collections::BTreeSet;

use crate::catalog::database::physical::{PERSON_DISTINCT_ID, PERSON_DISTINCT_ID_OVERRIDES};
use crate::catalog::LazyTable;
use crate::compiler::CompileContext;
use crate::errors::{CompileError, CompileResult, Pass};
use crate::optimizer::{FieldRewrite, PushdownTarget};
use crate::query_ast::builders::{alias, column};
use crate::query_ast::combinators;
use crate::query_ast::{Binding, DataType, Expr, Field, JoinExpr, SelectQuery, TableSource};

use super::{binding_on, latest, not_deleted, team_guard, LazyTableBuilder};

const KEY: &str = "distinct_id";

pub(super) struct DistinctIds<'c> {
    ctx: &'c CompileContext<'c>,
    table: LazyTable,
}

impl<'c> DistinctIds<'c> {
    pub(super) fn new(ctx: &'c CompileContext<'c>, table: LazyTable) -> Self {
        DistinctIds { ctx, table }
    }

    fn physical(&self) -> &'static str {
        match self.table {
            LazyTable::PersonDistinctIdOverrides => PERSON_DISTINCT_ID_OVERRIDES,
            _ => PERSON_DISTINCT_ID,
        }
    }

    fn raw(&self, name: &str, ty: DataType) -> Expr {
        column(self.physical(), Some(self.physical()), name, ty)
    }
}

impl LazyTableBuilder for DistinctIds<'_> {
    fn identity(&self) -> String {
        self.table.name().to_string()
    }

    fn key(&self) -> (&'static str, DataType) {
        (KEY, DataType::string())
    }

    fn build(&self, requested: &BTreeSet<String>, pushed: Option<Expr>) -> CompileResult<SelectQuery> {
        let table = self.physical();
        let mut select = vec![alias(KEY, self.raw(KEY, DataType::string()))];
        for name in requested.iter().filter(|n| n.as_str() != KEY) {
            match name.as_str() {
                "person_id" => select.push(alias(
                    name,
                    latest(table, self.raw(name, DataType::uuid()), DataType::uuid()),
                )),
                other => {
                    return Err(CompileError::contract(
                        Pass::JoinMaterializer,
                        format!("unknown {} field `{}`", self.table.name(), other),
                    ))
                }
            }
        }

        let mut conditions = Vec::new();
        if let Some(team) = self.ctx.team_id {
            conditions.push(team_guard(table, table, team));
        }
        conditions.extend(pushed);

        Ok(SelectQuery {
            select,
            select_from: Some(JoinExpr::table(table)),
            where_clause: combinators::and(conditions),
            group_by: vec![self.raw(KEY, DataType::string())],
            having: Some(not_deleted(table)),
            ..Default::default()
        })
    }

    fn pushdown_target(&self, source: TableSource, null_padded: bool) -> Box<dyn PushdownTarget + '_> {
        Box::new(DistinctIdTarget {
            builder: self,
            source,
            null_padded,
        })
    }
}

struct DistinctIdTarget<'b> {
    builder: &'b DistinctIds<'b>,
    source: TableSource,
    null_padded: bool,
}

impl PushdownTarget for DistinctIdTarget<'_> {
    fn name(&self) -> &str {
        self.builder.table.name()
    }

    fn rewrite_field(&self, field: &Field) -> FieldRewrite {
        match binding_on(field, &self.source) {
            Some(Binding::Column { column, ty, .. }) if column == KEY => {
                FieldRewrite::Local(self.builder.raw(KEY, ty.clone()))
            }
            _ => FieldRewrite::Unreachable,
        }
    }

    fn is_null_padded(&self) -> bool {
        self.null_padded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Database, MaterializationCatalog};
    use crate::config::{CompileSettings, Modifiers};
    use crate::optimizer::pushdown_where;
    use crate::query_ast::builders::{and, bound_field, constant, eq};

    fn lazy_column(name: &str) -> Expr {
        bound_field(
            vec!["pdi".to_string(), name.to_string()],
            Binding::Column {
                source: TableSource::Lazy {
                    from_alias: "events".to_string(),
                    path: vec!["pdi".to_string()],
                },
                column: name.to_string(),
                ty: DataType::string(),
            },
        )
    }

    #[test]
    fn test_only_distinct_id_is_pushed() {
        let database = Database::standard();
        let catalog = MaterializationCatalog::default();
        let modifiers = Modifiers::default();
        let settings = CompileSettings::default();
        let ctx = CompileContext {
            database: &database,
            catalog: &catalog,
            modifiers: &modifiers,
            settings: &settings,
            team_id: None,
        };
        let pdi = DistinctIds::new(&ctx, LazyTable::PersonDistinctIds);
        let target = pdi.pushdown_target(
            TableSource::Lazy {
                from_alias: "events".to_string(),
                path: vec!["pdi".to_string()],
            },
            false,
        );
        let where_clause = and(vec![
            eq(lazy_column("distinct_id"), constant("d1")),
            eq(lazy_column("person_id"), constant("p1")),
        ]);
        let pushed = pushdown_where(&where_clause, target.as_ref(), &[]).unwrap();
        let expected = eq(
            column(PERSON_DISTINCT_ID, Some(PERSON_DISTINCT_ID), KEY, DataType::string()),
            constant("d1"),
        );
        assert_eq!(pushed, Some(expected));
    }

    #[test]
    fn test_overrides_read_their_own_table() {
        let database = Database::standard();
        let catalog = MaterializationCatalog::default();
        let modifiers = Modifiers::default();
        let settings = CompileSettings::default();
        let ctx = CompileContext {
            database: &database,
            catalog: &catalog,
            modifiers: &modifiers,
            settings: &settings,
            team_id: Some(1),
        };
        let overrides = DistinctIds::new(&ctx, LazyTable::PersonDistinctIdOverrides);
        let requested: BTreeSet<String> = ["person_id".to_string()].into();
        let q = overrides.build(&requested, None).unwrap();
        assert_eq!(q.select_from, Some(JoinExpr::table(PERSON_DISTINCT_ID_OVERRIDES)));
        assert_eq!(q.select.len(), 2);
        assert!(q.where_clause.is_some());
    }
}
