//! The `sessions` virtual table: one row per session, aggregated from the
//! pre-aggregated session tables.
//!
//! | version | table             | key             | partition key                         |
//! |---------|-------------------|-----------------|---------------------------------------|
//! | v1      | `sessions`        | `session_id`    | `min_timestamp`                       |
//! | v2      | `raw_sessions`    | `session_id_v7` | timestamp bits of the UUIDv7 key      |
//! | v3      | `raw_sessions_v3` | `session_id_v7` | `session_timestamp`                   |
//!
//! v2 and v3 key on the UUIDv7 as an integer, joined from
//! `events.$session_id_uuid`. Bounds on `$start_timestamp` are pushed onto
//! the partition key, widened by the session lookback.

use std::collections::BTreeSet;

use crate::catalog::LazyTable;
use crate::compiler::CompileContext;
use crate::config::SessionTableVersion;
use crate::errors::{CompileError, CompileResult, Pass};
use crate::optimizer::{FieldRewrite, PushdownTarget};
use crate::query_ast::builders::{alias, column, inline_constant, typed_call};
use crate::query_ast::combinators;
use crate::query_ast::{Binding, DataType, Expr, Field, JoinExpr, SelectQuery, TableSource};

use super::{binding_on, team_guard, LazyTableBuilder};

struct Layout {
    table: &'static str,
    key: &'static str,
    key_ty: DataType,
}

fn layout(version: SessionTableVersion) -> Layout {
    match version {
        SessionTableVersion::V1 => Layout {
            table: "sessions",
            key: "session_id",
            key_ty: DataType::string(),
        },
        SessionTableVersion::V2 => Layout {
            table: "raw_sessions",
            key: "session_id_v7",
            key_ty: DataType::integer(),
        },
        SessionTableVersion::V3 => Layout {
            table: "raw_sessions_v3",
            key: "session_id_v7",
            key_ty: DataType::integer(),
        },
    }
}

pub(super) struct Sessions<'c> {
    ctx: &'c CompileContext<'c>,
    version: SessionTableVersion,
    layout: Layout,
}

impl<'c> Sessions<'c> {
    pub(super) fn new(ctx: &'c CompileContext<'c>) -> Self {
        let version = ctx.modifiers.session_table_version;
        Sessions {
            ctx,
            version,
            layout: layout(version),
        }
    }

    fn raw(&self, name: &str, ty: DataType) -> Expr {
        column(self.layout.table, Some(self.layout.table), name, ty)
    }

    fn key_column(&self) -> Expr {
        self.raw(self.layout.key, self.layout.key_ty.clone())
    }

    /// The session id as a string, computable on raw rows.
    fn session_id(&self) -> Expr {
        match self.version {
            SessionTableVersion::V1 => self.key_column(),
            SessionTableVersion::V2 | SessionTableVersion::V3 => typed_call(
                "toString",
                vec![typed_call(
                    "reinterpretAsUUID",
                    vec![self.key_column()],
                    DataType::uuid(),
                )],
                DataType::string(),
            ),
        }
    }

    fn partition_key(&self) -> Expr {
        match self.version {
            SessionTableVersion::V1 => self.raw("min_timestamp", DataType::datetime()),
            // The top 48 bits of a UUIDv7 are its unix timestamp in milliseconds.
            SessionTableVersion::V2 => {
                let millis = typed_call(
                    "toUInt64",
                    vec![typed_call(
                        "bitShiftRight",
                        vec![self.key_column(), inline_constant(80_i64)],
                        DataType::integer(),
                    )],
                    DataType::integer(),
                );
                typed_call(
                    "fromUnixTimestamp",
                    vec![typed_call(
                        "intDiv",
                        vec![millis, inline_constant(1000_i64)],
                        DataType::integer(),
                    )],
                    DataType::datetime(),
                )
            }
            SessionTableVersion::V3 => self.raw("session_timestamp", DataType::datetime()),
        }
    }

    fn min_timestamp(&self) -> Expr {
        self.raw("min_timestamp", DataType::datetime())
    }

    fn aggregate(&self, name: &str) -> CompileResult<Expr> {
        let ts = || self.min_timestamp();
        let max_ts = || self.raw("max_timestamp", DataType::datetime());
        let expr = match name {
            "session_id" => self.session_id(),
            "distinct_id" => typed_call(
                "argMin",
                vec![self.raw("distinct_id", DataType::string()), ts()],
                DataType::string(),
            ),
            "$start_timestamp" => typed_call("min", vec![ts()], DataType::datetime()),
            "$end_timestamp" => typed_call("max", vec![max_ts()], DataType::datetime()),
            "$session_duration" => typed_call(
                "dateDiff",
                vec![
                    inline_constant("second"),
                    typed_call("min", vec![ts()], DataType::datetime()),
                    typed_call("max", vec![max_ts()], DataType::datetime()),
                ],
                DataType::integer(),
            ),
            "$entry_current_url" => typed_call(
                "argMin",
                vec![self.raw("entry_url", DataType::string().nullable()), ts()],
                DataType::string().nullable(),
            ),
            "$pageview_count" => typed_call(
                "sum",
                vec![self.raw("pageview_count", DataType::integer())],
                DataType::integer(),
            ),
            other => {
                return Err(CompileError::contract(
                    Pass::JoinMaterializer,
                    format!("unknown sessions field `{}`", other),
                ))
            }
        };
        Ok(alias(name, expr))
    }
}

impl LazyTableBuilder for Sessions<'_> {
    fn identity(&self) -> String {
        format!("{}:{}", LazyTable::Sessions.name(), self.layout.table)
    }

    fn key(&self) -> (&'static str, DataType) {
        (self.layout.key, self.layout.key_ty.clone())
    }

    fn parent_key_column(&self) -> Option<(&'static str, DataType)> {
        match self.version {
            SessionTableVersion::V1 => None,
            SessionTableVersion::V2 | SessionTableVersion::V3 => {
                Some(("$session_id_uuid", DataType::integer().nullable()))
            }
        }
    }

    fn build(&self, requested: &BTreeSet<String>, pushed: Option<Expr>) -> CompileResult<SelectQuery> {
        let mut select = vec![alias(self.layout.key, self.key_column())];
        for name in requested.iter().filter(|n| n.as_str() != self.layout.key) {
            select.push(self.aggregate(name)?);
        }

        let mut conditions = Vec::new();
        if let Some(team) = self.ctx.team_id {
            conditions.push(team_guard(self.layout.table, self.layout.table, team));
        }
        conditions.extend(pushed);

        Ok(SelectQuery {
            select,
            select_from: Some(JoinExpr::table(self.layout.table)),
            where_clause: combinators::and(conditions),
            group_by: vec![self.key_column()],
            ..Default::default()
        })
    }

    fn pushdown_target(&self, source: TableSource, null_padded: bool) -> Box<dyn PushdownTarget + '_> {
        Box::new(SessionsTarget {
            sessions: self,
            source,
            null_padded,
        })
    }
}

struct SessionsTarget<'s> {
    sessions: &'s Sessions<'s>,
    source: TableSource,
    null_padded: bool,
}

impl PushdownTarget for SessionsTarget<'_> {
    fn name(&self) -> &str {
        self.sessions.layout.table
    }

    fn rewrite_field(&self, field: &Field) -> FieldRewrite {
        let Some(Binding::Column { column, .. }) = binding_on(field, &self.source) else {
            return FieldRewrite::Unreachable;
        };
        match column.as_str() {
            "session_id" => FieldRewrite::Local(self.sessions.session_id()),
            "$start_timestamp" => FieldRewrite::WidenedTimestamp {
                partition_key: self.sessions.partition_key(),
                lookback_days: self.sessions.ctx.modifiers.session_lookback_days,
            },
            _ => FieldRewrite::Unreachable,
        }
    }

    fn is_null_padded(&self) -> bool {
        self.null_padded
    }
}
