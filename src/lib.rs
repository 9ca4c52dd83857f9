//! Product catalog filtering: load a catalog, offer filters derived from its
//! typed spec columns, and merge PIM exports into it.

pub mod config;
pub mod data;
pub mod error;
pub mod normalize;
pub mod state;
