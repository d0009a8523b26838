//! Join Registry
//!
//! Collects the joins a pass wants to add to one SELECT, deduplicating them by
//! `(table identity, join key, join type)` and keeping their aliases unique
//! within the SELECT's FROM chain. Joins are spliced in once the SELECT has
//! been fully processed: anchored joins right after the table they hang off
//! (in registration order), the rest at the end of the chain.

use std::collections::{HashMap, HashSet};

use crate::errors::{CompileError, CompileResult, Pass};
use crate::query_ast::{JoinExpr, JoinType, SelectQuery};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    /// Table (or virtual table) being joined.
    pub table: String,
    /// Canonical text of what the join is keyed on, e.g. `events.distinct_id`.
    pub key: String,
    pub join_type: JoinType,
}

impl JoinKey {
    pub fn new(table: impl Into<String>, key: impl Into<String>, join_type: JoinType) -> Self {
        JoinKey {
            table: table.into(),
            key: key.into(),
            join_type,
        }
    }
}

#[derive(Debug)]
struct Registered {
    /// Alias of the FROM link the join must follow.
    anchor: Option<String>,
    join: JoinExpr,
}

#[derive(Debug, Default)]
pub struct JoinRegistry {
    used_aliases: HashSet<String>,
    aliases: HashMap<JoinKey, String>,
    joins: Vec<Registered>,
}

impl JoinRegistry {
    /// A registry for `select`, aware of the aliases already in its FROM chain.
    pub fn for_select(select: &SelectQuery) -> Self {
        JoinRegistry {
            used_aliases: select
                .joins()
                .filter_map(|j| j.effective_alias().map(str::to_string))
                .collect(),
            ..Default::default()
        }
    }

    pub fn alias_for(&self, key: &JoinKey) -> Option<&str> {
        self.aliases.get(key).map(String::as_str)
    }

    /// Returns the alias of the join for `key`, building it with `build` the
    /// first time the key is seen. `build` receives the alias to use.
    pub fn register<F>(&mut self, key: JoinKey, preferred_alias: &str, build: F) -> CompileResult<String>
    where
        F: FnOnce(&str) -> CompileResult<JoinExpr>,
    {
        self.insert(None, key, preferred_alias, build)
    }

    /// Like [`JoinRegistry::register`], but the join is placed right after
    /// the FROM link aliased `anchor`, so joins written after that link can
    /// refer to it.
    pub fn register_after<F>(
        &mut self,
        anchor: &str,
        key: JoinKey,
        preferred_alias: &str,
        build: F,
    ) -> CompileResult<String>
    where
        F: FnOnce(&str) -> CompileResult<JoinExpr>,
    {
        self.insert(Some(anchor.to_string()), key, preferred_alias, build)
    }

    fn insert<F>(
        &mut self,
        anchor: Option<String>,
        key: JoinKey,
        preferred_alias: &str,
        build: F,
    ) -> CompileResult<String>
    where
        F: FnOnce(&str) -> CompileResult<JoinExpr>,
    {
        if let Some(alias) = self.aliases.get(&key) {
            log::trace!("JoinRegistry: reusing `{}` for {:?}", alias, key);
            return Ok(alias.clone());
        }

        let alias = self.unique_alias(preferred_alias);
        let mut join = build(&alias)?;
        if join.join_type.is_none() {
            return Err(CompileError::contract(
                Pass::JoinMaterializer,
                format!("join `{}` has no join type", alias),
            ));
        }
        join.alias = Some(alias.clone());
        join.next_join = None;

        log::debug!("JoinRegistry: registered {:?} as `{}`", key, alias);
        self.aliases.insert(key, alias.clone());
        self.joins.push(Registered { anchor, join });
        Ok(alias)
    }

    fn unique_alias(&mut self, preferred: &str) -> String {
        if self.used_aliases.insert(preferred.to_string()) {
            return preferred.to_string();
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{}_{}", preferred, counter);
            if self.used_aliases.insert(candidate.clone()) {
                log::warn!("Alias collision: renaming '{}' → '{}'", preferred, candidate);
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    /// Adds every registered join to the SELECT's FROM chain.
    pub fn splice_into(self, select: &mut SelectQuery) -> CompileResult<()> {
        if self.joins.is_empty() {
            return Ok(());
        }
        let Some(from) = select.select_from.take() else {
            return Err(CompileError::contract(
                Pass::JoinMaterializer,
                "joins registered for a SELECT without FROM",
            ));
        };

        // (link, spliced by this registry)
        let mut links: Vec<(JoinExpr, bool)> =
            from.into_links().into_iter().map(|l| (l, false)).collect();
        for Registered { anchor, join } in self.joins {
            let position = match &anchor {
                Some(anchor) => {
                    let found = links
                        .iter()
                        .position(|(l, _)| l.effective_alias() == Some(anchor.as_str()));
                    let Some(mut at) = found else {
                        return Err(CompileError::contract(
                            Pass::JoinMaterializer,
                            format!("join anchor `{}` is not in the FROM chain", anchor),
                        ));
                    };
                    at += 1;
                    while links.get(at).is_some_and(|(_, spliced)| *spliced) {
                        at += 1;
                    }
                    at
                }
                None => links.len(),
            };
            links.insert(position, (join, true));
        }

        select.select_from = JoinExpr::from_links(links.into_iter().map(|(l, _)| l).collect());
        Ok(())
    }
}
