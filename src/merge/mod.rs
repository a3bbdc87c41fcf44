//! Result merging
//!
//! Everything needed to stitch per-bucket groupBy results back together:
//!
//! - **Value**: closed set of runtime value kinds found in result rows
//! - **Algebra**: same-kind arithmetic and the sum/min/max merge dispatch
//! - **Compare**: typed ordering of values and dimension tuples
//! - **Expression**: post-aggregation trees as prefix token lists
//! - **Join**: the ordered merge-join over two sorted results

pub mod algebra;
pub mod compare;
mod error;
pub mod expression;
pub mod join;
mod value;

pub use algebra::{merge_values, MergeKind};
pub use compare::{compare, compare_events};
pub use expression::{Operator, Token};
pub use error::{MergeError, MergeResult};
pub use join::{can_merge, compare_rows, merge_rows, sort_by_dimensions, MergeSchema};
pub use value::{Event, Value, ValueKind};
