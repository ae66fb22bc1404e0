use std::cmp::Ordering;

use super::metrics::usable_capacity;
use crate::error::ReportError;
use crate::model::Channel;

/// Order channels by outbound ratio, most depleted first.
///
/// Ratios are compared exactly by cross-multiplication. The sort is stable, so
/// channels with equal ratios keep their input order.
pub fn sort_channels<'a, I>(channels: I) -> Result<Vec<&'a Channel>, ReportError>
where
    I: IntoIterator<Item = &'a Channel>,
{
    let mut keyed = channels
        .into_iter()
        .map(|c| Ok((usable_capacity(c)?, c)))
        .collect::<Result<Vec<_>, ReportError>>()?;

    keyed.sort_by(|(usable_a, a), (usable_b, b)| {
        compare_ratio(a.local_balance, *usable_a, b.local_balance, *usable_b)
    });

    Ok(keyed.into_iter().map(|(_, c)| c).collect())
}

fn compare_ratio(num_a: u64, den_a: u64, num_b: u64, den_b: u64) -> Ordering {
    (num_a as u128 * den_b as u128).cmp(&(num_b as u128 * den_a as u128))
}
