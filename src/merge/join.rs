//! Ordered merge-join of groupBy results
//!
//! Two granularity-`all` results over disjoint intervals are combined by
//! walking both dimension-sorted row lists once:
//!
//! - equal dimension tuples fold their aggregates through the merge algebra
//! - the smaller tuple is emitted as is
//! - leftover rows of either side are appended
//!
//! Post-aggregations are then recomputed from the merged aggregates, since a
//! ratio of sums is not the sum of ratios.

use crate::merge::algebra::{merge_values, MergeKind};
use crate::merge::compare::compare_events;
use crate::merge::error::{MergeError, MergeResult};
use crate::merge::expression::{self, Token};
use crate::merge::value::{Event, Value};
use crate::query::{GroupByQuery, ResultRow};
use std::cmp::Ordering;

/// Column layout needed to merge rows without the query at hand
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSchema {
    /// Dimension output names, in sort order
    pub dimensions: Vec<String>,
    /// Aggregation output name and how its partials combine
    pub aggregations: Vec<(String, MergeKind)>,
    /// Post-aggregation output name and its prefix token list
    pub post_aggregations: Vec<(String, Vec<Token>)>,
}

impl MergeSchema {
    /// Derive the schema of `query`.
    ///
    /// Fails for aggregations that cannot be merged.
    pub fn from_query(query: &GroupByQuery) -> MergeResult<Self> {
        let aggregations = query
            .aggregations
            .iter()
            .map(|a| Ok((a.name().to_string(), a.merge_kind()?)))
            .collect::<MergeResult<Vec<_>>>()?;

        let post_aggregations = query
            .post_aggregation_names()
            .into_iter()
            .zip(query.post_aggregation_expressions()?)
            .collect();

        Ok(Self {
            dimensions: query.dimension_names(),
            aggregations,
            post_aggregations,
        })
    }
}

/// Check that results of `a` and `b` may be merged.
///
/// Both must use granularity `all` and agree on everything that shapes a
/// row: data source, context, virtual columns, dimensions, aggregations,
/// post-aggregations, limit spec, having and filter.
pub fn can_merge(a: &GroupByQuery, b: &GroupByQuery) -> MergeResult<()> {
    if !a.granularity.is_all() || !b.granularity.is_all() {
        return Err(MergeError::GranularityNotAll);
    }
    if a.intervals == b.intervals && !a.result.is_empty() {
        return Err(MergeError::Incompatible(
            "intervals (identical intervals already merged)".to_string(),
        ));
    }

    let checks: [(&str, bool); 9] = [
        ("data source", a.data_source == b.data_source),
        ("context", a.context == b.context),
        ("virtual columns", a.virtual_columns == b.virtual_columns),
        ("dimensions", a.dimensions == b.dimensions),
        ("aggregations", a.aggregations == b.aggregations),
        ("post-aggregations", a.post_aggregations == b.post_aggregations),
        ("limit spec", a.limit_spec == b.limit_spec),
        ("having", a.having == b.having),
        ("filter", a.filter == b.filter),
    ];

    match checks.iter().find(|(_, same)| !same) {
        Some((field, _)) => Err(MergeError::Incompatible(field.to_string())),
        None => Ok(()),
    }
}

/// Order two rows by their dimension tuple
pub fn compare_rows(a: &ResultRow, b: &ResultRow, dimensions: &[String]) -> MergeResult<Ordering> {
    compare_events(dimensions, &a.event, &b.event)
}

/// Sort rows by dimension tuple; the first incomparable pair aborts the sort
pub fn sort_by_dimensions(rows: &mut [ResultRow], dimensions: &[String]) -> MergeResult<()> {
    let mut failure = None;
    rows.sort_by(|a, b| match compare_rows(a, b, dimensions) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Merge-join two dimension-sorted row lists and recompute post-aggregations.
///
/// The output is sorted when both inputs are.
pub fn merge_rows(
    a: Vec<ResultRow>,
    b: Vec<ResultRow>,
    schema: &MergeSchema,
) -> MergeResult<Vec<ResultRow>> {
    let mut merged = Vec::with_capacity(a.len().max(b.len()));
    let mut left = a.into_iter().peekable();
    let mut right = b.into_iter().peekable();

    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        match compare_rows(l, r, &schema.dimensions)? {
            Ordering::Less => merged.extend(left.next()),
            Ordering::Greater => merged.extend(right.next()),
            Ordering::Equal => {
                if let (Some(l), Some(r)) = (left.next(), right.next()) {
                    merged.push(merge_pair(l, r, schema)?);
                }
            }
        }
    }
    merged.extend(left);
    merged.extend(right);

    for row in &mut merged {
        recompute_post_aggregations(&mut row.event, &schema.post_aggregations)?;
    }
    Ok(merged)
}

fn merge_pair(mut a: ResultRow, b: ResultRow, schema: &MergeSchema) -> MergeResult<ResultRow> {
    if a.event.is_empty() {
        return Ok(b);
    }
    if b.event.is_empty() {
        return Ok(a);
    }

    for dimension in &schema.dimensions {
        let present = |event: &Event| event.contains_key(dimension);
        if !present(&a.event) || !present(&b.event) {
            return Err(MergeError::MissingDimension(dimension.clone()));
        }
    }

    for (name, kind) in &schema.aggregations {
        let left = a.event.get(name).cloned().unwrap_or(Value::Null);
        let right = b.event.get(name).cloned().unwrap_or(Value::Null);
        let value = merge_values(*kind, &left, &right)?;
        if value.is_null() {
            a.event.remove(name);
        } else {
            a.event.insert(name.clone(), value);
        }
    }

    Ok(a)
}

/// Recompute every post-aggregation of `event` in order.
///
/// A post-aggregation whose inputs are missing is removed rather than left
/// holding a value computed from unmerged inputs.
pub fn recompute_post_aggregations(
    event: &mut Event,
    post_aggregations: &[(String, Vec<Token>)],
) -> MergeResult<()> {
    for (name, tokens) in post_aggregations {
        match expression::evaluate(tokens, event)? {
            Some(value) => {
                event.insert(name.clone(), value);
            }
            None => {
                event.remove(name);
            }
        }
    }
    Ok(())
}

impl GroupByQuery {
    /// Fold `other`'s result into this query's result.
    ///
    /// Both results must already be sorted by dimension tuple.
    pub fn merge(&mut self, other: GroupByQuery) -> MergeResult<()> {
        can_merge(self, &other)?;
        let schema = MergeSchema::from_query(self)?;

        let rows = std::mem::take(&mut self.result);
        self.result = merge_rows(rows, other.result, &schema)?;
        for interval in other.intervals {
            if !self.intervals.contains(&interval) {
                self.intervals.push(interval);
            }
        }
        Ok(())
    }
}
