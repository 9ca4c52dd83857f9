/// Data layer: core types, loading, spec parsing and filtering.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet / .xlsx
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → ProductTable (cached by TableCache)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ProductTable  │  Vec<Product>, column names, classified spec columns
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐     spec / domain / predicate
///   │  filter   │  ◄── per-column parsing, domains and matching
///   └──────────┘
///        │
///        ▼
///   FilterOutcome ──► view (grouping), export (CSV)
/// ```

pub mod domain;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod predicate;
pub mod spec;
pub mod view;
