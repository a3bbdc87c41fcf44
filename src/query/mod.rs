//! Druid Query DSL
//!
//! Typed groupBy queries in Druid's JSON wire format:
//!
//! - **GroupBy**: the query itself, its builder and result rows
//! - **Aggregations / Post-aggregations**: what is computed per group
//! - **Filters**: row filters, translatable into flat [`Condition`] lists
//! - **Conditions**: relational predicates used for cache lookups
//!
//! # Example
//!
//! ```rust,ignore
//! use druidkit::query::{Aggregation, Filter, GroupByQuery, PostAggregation};
//!
//! let query = GroupByQuery::builder("events")
//!     .dimension("os")
//!     .filter(Filter::selector("country", "NZ"))
//!     .aggregation(Aggregation::long_sum("sum", "value"))
//!     .aggregation(Aggregation::count("count"))
//!     .post_aggregation(PostAggregation::arithmetic(
//!         "avg",
//!         "/",
//!         vec![PostAggregation::field("sum"), PostAggregation::field("count")],
//!     ))
//!     .interval("2024-01-01T00:00:00Z/2024-01-08T00:00:00Z")
//!     .build();
//! ```

mod aggregation;
mod condition;
mod dimension;
mod error;
mod filter;
mod granularity;
mod groupby;
mod post_aggregation;

pub use aggregation::{merge_kind_for, Aggregation};
pub use condition::{matches_all, Condition, ConditionOp};
pub use dimension::{DimensionObject, DimensionSpec};
pub use error::{ConditionError, ConditionResult};
pub use filter::Filter;
pub use granularity::{Granularity, GranularitySpec, SimpleGranularity};
pub use groupby::{
    GroupByQuery, GroupByQueryBuilder, Having, LimitSpec, OrderByColumn, QueryType, ResultRow,
    VirtualColumn,
};
pub use post_aggregation::PostAggregation;
