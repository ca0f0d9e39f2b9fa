//! Query translation and lazy evaluation
//!
//! A [`Queryset`] accumulates a free-text query, filter predicates, ordering,
//! a pagination window and facet, suggestion or more-like-this requests, and
//! turns them into one search request the first time results are read.

pub mod body;
pub mod lookup;
pub mod params;
pub mod queryset;
pub mod response;

pub use body::{FacetSpec, SuggestSpec};
pub use lookup::{parse_lookup, FilterValue, LookupOp, Predicate};
pub use params::params;
pub use queryset::{Deserialized, Queryset, Raw};
pub use response::SearchOutcome;
