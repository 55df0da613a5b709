//! Work-split policies: how one contiguous index range is spread over workers.
//!
//! The policy is a value owned by the aggregator; the distributed protocol
//! only consumes the resulting partition. Every policy yields, per worker, a
//! list of disjoint half-open ranges; the union over all workers is exactly
//! the input range.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Partitioning policy.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum WorkSplit {
    /// One contiguous chunk per worker; sizes differ by at most one and the
    /// larger chunks go to the lower worker ids.
    #[default]
    Contiguous,
    /// Fixed-size blocks dealt round-robin (block `k` goes to worker
    /// `k % workers`).
    Interleaved {
        /// Block length in rows (treated as 1 if 0).
        block: usize,
    },
}

impl WorkSplit {
    /// Partition `range` over `workers` workers (at least one).
    ///
    /// Workers that receive nothing get an empty list.
    #[must_use]
    pub fn partition(&self, range: Range<usize>, workers: usize) -> Vec<Vec<Range<usize>>> {
        let workers = workers.max(1);
        let mut out = vec![Vec::new(); workers];
        if range.is_empty() {
            return out;
        }
        match *self {
            Self::Contiguous => {
                let len = range.len();
                let base = len / workers;
                let extra = len % workers;
                let mut lo = range.start;
                for (w, parts) in out.iter_mut().enumerate() {
                    let n = base + usize::from(w < extra);
                    if n > 0 {
                        parts.push(lo..lo + n);
                    }
                    lo += n;
                }
            }
            Self::Interleaved { block } => {
                let block = block.max(1);
                let mut lo = range.start;
                let mut k = 0usize;
                while lo < range.end {
                    let hi = (lo + block).min(range.end);
                    out[k % workers].push(lo..hi);
                    lo = hi;
                    k += 1;
                }
            }
        }
        out
    }
}
