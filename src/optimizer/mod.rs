//! Query optimizations that run between resolution and printing.
//!
//! The only pass so far is WHERE pushdown into lazy-join subqueries; the join
//! materializer drives it once per join it builds.

pub mod where_pushdown;

pub use where_pushdown::{pushdown_where, FieldRewrite, Pushed, PushdownTarget};
