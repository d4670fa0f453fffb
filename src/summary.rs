use thiserror::Error;

use crate::types::{NodeOrder, NodeResult, Summary, throughput};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("no node results to summarize")]
    Empty,
    #[error("operation total overflows when adding the result of node {0}")]
    OpsOverflow(NodeOrder),
}

/// Aggregate a complete set of node results.
///
/// The duration is the wall-clock span of the overlapping run, from the
/// earliest start to the latest end, so concurrent nodes are not summed.
pub fn summarize<'a, I>(results: I) -> Result<Summary, SummaryError>
where
    I: IntoIterator<Item = &'a NodeResult>,
{
    let mut iter = results.into_iter();
    let first = iter.next().ok_or(SummaryError::Empty)?;

    let mut nodes = 1;
    let mut total_ops = first.total_ops;
    let mut ts_begin = first.ts_begin;
    let mut ts_end = first.ts_end;
    for result in iter {
        nodes += 1;
        total_ops = total_ops
            .checked_add(result.total_ops)
            .ok_or(SummaryError::OpsOverflow(result.order))?;
        ts_begin = ts_begin.min(result.ts_begin);
        ts_end = ts_end.max(result.ts_end);
    }

    let total_dur = ts_end.saturating_sub(ts_begin).max(1);
    Ok(Summary {
        nodes,
        total_ops,
        total_dur,
        throughput: throughput(total_ops, total_dur),
    })
}
