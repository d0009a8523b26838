//! The `persons` virtual table.
//!
//! ```sql
//! SELECT person.id AS id, argMax(<field>, person.version) AS <field>, ...
//! FROM person
//! WHERE equals(person.team_id, <team>)
//!   AND person.id IN (SELECT where_optimization.id FROM person AS where_optimization WHERE <pushed>)
//! GROUP BY person.id
//! HAVING equals(argMax(person.is_deleted, person.version), 0)
//! ```
//!
//! A person row is versioned; every field is read from the latest version.
//! Pushed predicates can only narrow the set of candidate ids: applied to the
//! aggregate directly they would pick fields from stale versions.

use std::collections::BTreeSet;

use crate::catalog::database::physical::PERSON;
use crate::catalog::{FieldDef, LazyTable};
use crate::compiler::CompileContext;
use crate::errors::{CompileError, CompileResult, Pass};
use crate::optimizer::{FieldRewrite, PushdownTarget};
use crate::property_access::property_type;
use crate::query_ast::builders::{alias, bound_field, column, compare};
use crate::query_ast::combinators;
use crate::query_ast::{
    Binding, CompareOperator, DataType, Expr, Field, JoinExpr, SelectQuery, TableSource,
};

use super::{binding_on, latest, not_deleted, property_keys, team_guard, LazyTableBuilder};

const KEY: &str = "id";
const WHERE_OPTIMIZATION: &str = "where_optimization";

fn raw(name: &str, ty: DataType) -> Expr {
    column(PERSON, Some(PERSON), name, ty)
}

pub(super) struct Persons<'c> {
    ctx: &'c CompileContext<'c>,
}

impl<'c> Persons<'c> {
    pub(super) fn new(ctx: &'c CompileContext<'c>) -> Self {
        Persons { ctx }
    }

    fn property(&self, source: TableSource, keys: Vec<String>) -> Expr {
        let ty = property_type(
            self.ctx.catalog,
            self.ctx.modifiers.property_groups_mode,
            Some(PERSON),
            "properties",
            &keys,
        );
        let mut chain = vec!["properties".to_string()];
        chain.extend(keys.iter().cloned());
        bound_field(
            chain,
            Binding::Property {
                source,
                column: "properties".to_string(),
                keys,
                ty,
            },
        )
    }

    fn output(&self, name: &str) -> CompileResult<Expr> {
        if let Some(keys) = property_keys("properties", name) {
            let value = self.property(TableSource::table(PERSON, PERSON), keys);
            let ty = crate::query_ast::infer_type(&value);
            return Ok(alias(name, latest(PERSON, value, ty)));
        }
        let def = self
            .ctx
            .database
            .table(LazyTable::Persons.name())
            .and_then(|t| t.field(name));
        match def {
            Some(FieldDef::Column { column, ty }) => Ok(alias(
                name,
                latest(PERSON, raw(column, ty.clone()), ty.clone()),
            )),
            Some(FieldDef::Properties { column }) => Ok(alias(
                name,
                latest(PERSON, raw(column, DataType::string()), DataType::string()),
            )),
            _ => {
                log::warn!("JoinMaterializer: persons has no field `{}`", name);
                Err(CompileError::contract(
                    Pass::JoinMaterializer,
                    format!("unknown persons field `{}`", name),
                ))
            }
        }
    }

    /// `SELECT where_optimization.id FROM person AS where_optimization WHERE ...`
    fn candidates(&self, pushed: Expr) -> SelectQuery {
        let mut conditions = Vec::new();
        if let Some(team) = self.ctx.team_id {
            conditions.push(team_guard(WHERE_OPTIMIZATION, PERSON, team));
        }
        conditions.push(pushed);
        SelectQuery {
            select: vec![column(WHERE_OPTIMIZATION, Some(PERSON), KEY, DataType::uuid())],
            select_from: Some(JoinExpr {
                alias: Some(WHERE_OPTIMIZATION.to_string()),
                ..JoinExpr::table(PERSON)
            }),
            where_clause: combinators::and(conditions),
            ..Default::default()
        }
    }
}

impl LazyTableBuilder for Persons<'_> {
    fn identity(&self) -> String {
        LazyTable::Persons.name().to_string()
    }

    fn key(&self) -> (&'static str, DataType) {
        (KEY, DataType::uuid())
    }

    fn build(&self, requested: &BTreeSet<String>, pushed: Option<Expr>) -> CompileResult<SelectQuery> {
        let mut select = vec![alias(KEY, raw(KEY, DataType::uuid()))];
        for name in requested.iter().filter(|n| n.as_str() != KEY) {
            select.push(self.output(name)?);
        }

        let mut conditions = Vec::new();
        if let Some(team) = self.ctx.team_id {
            conditions.push(team_guard(PERSON, PERSON, team));
        }
        if let Some(pushed) = pushed {
            conditions.push(compare(
                CompareOperator::In,
                raw(KEY, DataType::uuid()),
                Expr::Select(Box::new(self.candidates(pushed))),
            ));
        }

        Ok(SelectQuery {
            select,
            select_from: Some(JoinExpr::table(PERSON)),
            where_clause: combinators::and(conditions),
            group_by: vec![raw(KEY, DataType::uuid())],
            having: Some(not_deleted(PERSON)),
            ..Default::default()
        })
    }

    fn pushdown_target(&self, source: TableSource, null_padded: bool) -> Box<dyn PushdownTarget + '_> {
        Box::new(PersonsTarget {
            source,
            null_padded,
        })
    }
}

struct PersonsTarget {
    source: TableSource,
    null_padded: bool,
}

impl PushdownTarget for PersonsTarget {
    fn name(&self) -> &str {
        LazyTable::Persons.name()
    }

    fn rewrite_field(&self, field: &Field) -> FieldRewrite {
        match binding_on(field, &self.source) {
            Some(Binding::Column { column: name, ty, .. }) => {
                FieldRewrite::Local(column(WHERE_OPTIMIZATION, Some(PERSON), name, ty.clone()))
            }
            Some(Binding::Property {
                column: name,
                keys,
                ty,
                ..
            }) => FieldRewrite::Local(bound_field(
                field.chain.clone(),
                Binding::Property {
                    source: TableSource::table(WHERE_OPTIMIZATION, PERSON),
                    column: name.clone(),
                    keys: keys.clone(),
                    ty: ty.clone(),
                },
            )),
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
    use crate::query_ast::builders::{constant, eq};

    #[test]
    fn test_build_reads_latest_version_and_filters_candidates() {
        let database = Database::standard();
        let catalog = MaterializationCatalog::default();
        let modifiers = Modifiers::default();
        let settings = CompileSettings::default();
        let ctx = CompileContext {
            database: &database,
            catalog: &catalog,
            modifiers: &modifiers,
            settings: &settings,
            team_id: Some(2),
        };
        let persons = Persons::new(&ctx);
        let requested: BTreeSet<String> =
            ["properties___email".to_string(), "created_at".to_string()].into();
        let pushed = eq(
            column(WHERE_OPTIMIZATION, Some(PERSON), "id", DataType::uuid()),
            constant("x"),
        );
        let q = persons.build(&requested, Some(pushed)).unwrap();

        let names: Vec<_> = q
            .select
            .iter()
            .map(|e| match e {
                Expr::Alias(a) => a.alias.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, vec!["id", "created_at", "properties___email"]);
        assert!(q.having.is_some());
        match &q.where_clause {
            Some(Expr::And(items)) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[1], Expr::Compare(c) if c.op == CompareOperator::In));
            }
            other => panic!("unexpected where {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_is_rejected() {
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
        let requested: BTreeSet<String> = ["nope".to_string()].into();
        assert!(Persons::new(&ctx).build(&requested, None).is_err());
    }
}
