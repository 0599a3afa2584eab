use std::fmt::Debug;

use ndarray::Array1;

use crate::identifier::Uid;

/// Make sure an interval is ordered correctly, eg upper is not below lower.
///
pub fn rearrange<N>(lower: N, upper: N) -> (N, N)
where
    N: Debug + PartialOrd,
{
    if lower > upper {
        (upper, lower)
    } else {
        (lower, upper)
    }
}

/// Dense surrogate ids `1..=n`.
///
pub(crate) fn uid_range(n: usize) -> Array1<Uid> {
    Array1::from_iter((1..=n).map(|i| i as Uid))
}

/// Indices of the `true` entries of a selection mask.
///
pub(crate) fn mask_indices<'a, I>(mask: I) -> Vec<usize>
where
    I: IntoIterator<Item = &'a bool>,
{
    mask.into_iter()
        .enumerate()
        .filter_map(|(i, &selected)| if selected { Some(i) } else { None })
        .collect()
}
