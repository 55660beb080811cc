//! Merging successive reader outputs into the run's accumulator table.

use std::collections::HashSet;

use crate::logging::{Diagnostics, Stage};
use crate::table::Table;

/// How a new table was combined with the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// The accumulator was empty.
    Replace,
    /// Same variables, more time periods.
    Concat,
    /// New variables.
    OuterJoin,
}

/// Decide how `incoming` combines with `acc`.
///
/// Concatenation applies when every incoming column already exists in the
/// accumulator (exact set-intersection equality); any other shape,
/// including partial overlap, is joined.
pub fn strategy(acc: &Table, incoming: &Table) -> MergeStrategy {
    if acc.is_empty() {
        return MergeStrategy::Replace;
    }
    let acc_cols: HashSet<String> = acc.column_names().into_iter().collect();
    let new_cols: HashSet<String> = incoming.column_names().into_iter().collect();
    let shared: HashSet<String> = acc_cols.intersection(&new_cols).cloned().collect();
    if new_cols == shared {
        MergeStrategy::Concat
    } else {
        MergeStrategy::OuterJoin
    }
}

/// Combine the accumulator with a freshly read table.
pub fn merge(acc: &Table, incoming: Table, diag: &mut Diagnostics) -> Table {
    let strategy = strategy(acc, &incoming);
    diag.debug(
        Stage::Merge,
        format!(
            "{:?}: {} + {} rows, columns {:?}",
            strategy,
            acc.len(),
            incoming.len(),
            incoming.column_names()
        ),
    );
    match strategy {
        MergeStrategy::Replace => incoming,
        MergeStrategy::Concat => acc.concat(&incoming),
        MergeStrategy::OuterJoin => acc.outer_join(&incoming),
    }
}
