//! Lexical scope for name resolution.
//!
//! One [`SelectFrame`] per SELECT being resolved, with lambda frames pushed on
//! top while a lambda body is resolved. Lookups walk the stack from the top:
//! lambda arguments first, then the innermost SELECT. Outer SELECTs are only
//! reachable through a table alias (see [`Scope::find_outer_table`]).

use crate::catalog::TableDef;
use crate::query_ast::{DataType, TableSource};

/// A table visible in a SELECT's FROM chain.
#[derive(Debug, Clone)]
pub enum FrameTable<'a> {
    Catalog {
        alias: String,
        table: &'a TableDef,
    },
    Subquery {
        alias: String,
        columns: Vec<(String, DataType)>,
    },
}

impl FrameTable<'_> {
    pub fn alias(&self) -> &str {
        match self {
            FrameTable::Catalog { alias, .. } | FrameTable::Subquery { alias, .. } => alias,
        }
    }

    pub fn source(&self) -> TableSource {
        match self {
            FrameTable::Catalog { alias, table } => TableSource::table(alias.clone(), &table.name),
            FrameTable::Subquery { alias, .. } => TableSource::Table {
                alias: alias.clone(),
                table: None,
            },
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        match self {
            FrameTable::Catalog { table, .. } => table.field(name).is_some(),
            FrameTable::Subquery { columns, .. } => columns.iter().any(|(c, _)| c == name),
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        match self {
            FrameTable::Catalog { table, .. } => table.field_names().collect(),
            FrameTable::Subquery { columns, .. } => columns.iter().map(|(c, _)| c.as_str()).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SelectFrame<'a> {
    pub tables: Vec<FrameTable<'a>>,
    /// User-written select aliases, in definition order.
    pub aliases: Vec<(String, DataType)>,
}

impl<'a> SelectFrame<'a> {
    pub fn table(&self, alias: &str) -> Option<&FrameTable<'a>> {
        self.tables.iter().find(|t| t.alias() == alias)
    }

    pub fn alias_type(&self, name: &str) -> Option<&DataType> {
        self.aliases.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Tables defining an unqualified field `name`.
    pub fn tables_with_field(&self, name: &str) -> Vec<&FrameTable<'a>> {
        self.tables.iter().filter(|t| t.has_field(name)).collect()
    }

    /// Every name an unqualified reference could have meant.
    pub fn visible_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.iter().map(FrameTable::alias).collect();
        names.extend(self.aliases.iter().map(|(n, _)| n.as_str()));
        for table in &self.tables {
            names.extend(table.field_names());
        }
        names
    }
}

#[derive(Debug)]
enum Frame<'a> {
    Select(SelectFrame<'a>),
    Lambda(Vec<String>),
}

#[derive(Debug, Default)]
pub struct Scope<'a> {
    frames: Vec<Frame<'a>>,
}

impl<'a> Scope<'a> {
    pub fn push_select(&mut self, frame: SelectFrame<'a>) {
        self.frames.push(Frame::Select(frame));
    }

    pub fn pop_select(&mut self) -> Option<SelectFrame<'a>> {
        match self.frames.pop() {
            Some(Frame::Select(frame)) => Some(frame),
            Some(other) => {
                self.frames.push(other);
                None
            }
            None => None,
        }
    }

    pub fn push_lambda(&mut self, args: Vec<String>) {
        self.frames.push(Frame::Lambda(args));
    }

    pub fn pop_lambda(&mut self) {
        if let Some(Frame::Lambda(_)) = self.frames.last() {
            self.frames.pop();
        }
    }

    /// Number of SELECT frames on the stack.
    pub fn select_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| matches!(f, Frame::Select(_)))
            .count()
    }

    /// Lambda arguments shadow everything, but only above the innermost SELECT.
    pub fn is_lambda_argument(&self, name: &str) -> bool {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Lambda(args) if args.iter().any(|a| a == name) => return true,
                Frame::Lambda(_) => continue,
                Frame::Select(_) => return false,
            }
        }
        false
    }

    pub fn lambda_arguments(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Lambda(args) => out.extend(args.iter().map(String::as_str)),
                Frame::Select(_) => break,
            }
        }
        out
    }

    pub fn innermost(&self) -> Option<&SelectFrame<'a>> {
        self.frames.iter().rev().find_map(|f| match f {
            Frame::Select(s) => Some(s),
            Frame::Lambda(_) => None,
        })
    }

    pub fn innermost_mut(&mut self) -> Option<&mut SelectFrame<'a>> {
        self.frames.iter_mut().rev().find_map(|f| match f {
            Frame::Select(s) => Some(s),
            Frame::Lambda(_) => None,
        })
    }

    /// Looks `alias` up in the enclosing SELECTs, skipping the innermost.
    /// Returns the table and how many SELECT levels up it lives.
    pub fn find_outer_table(&self, alias: &str) -> Option<(&FrameTable<'a>, usize)> {
        self.frames
            .iter()
            .rev()
            .filter_map(|f| match f {
                Frame::Select(s) => Some(s),
                Frame::Lambda(_) => None,
            })
            .enumerate()
            .skip(1)
            .find_map(|(levels, frame)| frame.table(alias).map(|t| (t, levels)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Database;

    #[test]
    fn test_outer_lookup_counts_levels() {
        let db = Database::standard();
        let events = db.table("events").unwrap();
        let mut scope = Scope::default();
        scope.push_select(SelectFrame {
            tables: vec![FrameTable::Catalog {
                alias: "e".into(),
                table: events,
            }],
            ..Default::default()
        });
        scope.push_select(SelectFrame::default());
        scope.push_lambda(vec!["x".into()]);
        scope.push_select(SelectFrame::default());

        let (table, levels) = scope.find_outer_table("e").unwrap();
        assert_eq!(table.alias(), "e");
        assert_eq!(levels, 2);
        assert!(!scope.is_lambda_argument("x"));
        assert_eq!(scope.select_depth(), 3);
    }

    #[test]
    fn test_lambda_arguments_visible_above_select() {
        let mut scope = Scope::default();
        scope.push_select(SelectFrame::default());
        scope.push_lambda(vec!["x".into()]);
        scope.push_lambda(vec!["y".into()]);
        assert!(scope.is_lambda_argument("x"));
        assert!(scope.is_lambda_argument("y"));
        scope.pop_lambda();
        assert!(!scope.is_lambda_argument("y"));
    }
}
