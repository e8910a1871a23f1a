use crate::dataset::Representation;
use crate::error::{Error, Result};

/// A clustering primitive: split `data` into at most `k` groups.
///
/// Returns one label per item, each in `0..k`. Labels need not cover every
/// value in `0..k`; empty groups are allowed.
pub trait Partitioner<R: Representation> {
    fn partition(&self, data: &R, k: usize) -> Result<Vec<usize>>;
}

impl<R, F> Partitioner<R> for F
where
    R: Representation,
    F: Fn(&R, usize) -> Result<Vec<usize>>,
{
    fn partition(&self, data: &R, k: usize) -> Result<Vec<usize>> {
        self(data, k)
    }
}

/// Check the partitioner contract and group item positions by label.
///
/// Group `i` holds the positions labelled `i`, in input order.
pub fn group_by_label(labels: &[usize], n: usize, k: usize) -> Result<Vec<Vec<usize>>> {
    if labels.len() != n {
        return Err(Error::LabelCount {
            expected: n,
            found: labels.len(),
        });
    }
    let mut groups = vec![Vec::new(); k];
    for (pos, &label) in labels.iter().enumerate() {
        if label >= k {
            return Err(Error::LabelOutOfRange { label, k });
        }
        groups[label].push(pos);
    }
    Ok(groups)
}
