//! Read-only metadata consumed by the compiler: the logical [`Database`]
//! schema and the [`MaterializationCatalog`] describing property storage.

pub mod database;
pub mod errors;
pub mod materialization;

pub use database::{Database, FieldDef, LazyJoinDef, LazyTable, TableDef, TableKind};
pub use errors::CatalogError;
pub use materialization::{
    DedicatedColumn, KeyRule, MaterializationCatalog, PropertyGroup, PropertyType, SideTableSlot,
};
