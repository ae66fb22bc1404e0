use super::format::{msat_to_sat, nullable, thousands, Cell};
use super::schema::{Aggregate, ColumnKey, Schema};
use crate::model::Channel;

/// The two footer rows appended under the channel rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub separator: Vec<Cell>,
    pub totals: Vec<Cell>,
}

/// Floor average of the non-null values, `None` when there are none.
pub fn null_safe_average<I>(values: I) -> Option<u64>
where
    I: IntoIterator<Item = Option<u64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0u128, 0u128), |(sum, count), v| (sum + v as u128, count + 1));
    (count > 0).then(|| (sum / count) as u64)
}

pub fn compute(schema: &Schema, channels: &[&Channel]) -> Footer {
    let mut separator = Vec::with_capacity(schema.columns().len());
    let mut totals = Vec::with_capacity(schema.columns().len());

    for column in schema.columns() {
        match column.aggregate {
            Aggregate::Sum => {
                separator.push(Cell::plain("─".repeat(6)));
                totals.push(Cell::plain(sum_column(column.key, channels)));
            }
            Aggregate::Average => {
                separator.push(Cell::plain("─".repeat(4)));
                let avg = null_safe_average(channels.iter().map(|c| average_input(column.key, c)));
                totals.push(Cell::plain(nullable(avg)));
            }
            Aggregate::None => {
                separator.push(Cell::empty());
                totals.push(Cell::empty());
            }
        }
    }

    Footer { separator, totals }
}

fn sum_column(key: ColumnKey, channels: &[&Channel]) -> String {
    let sum = |f: fn(&Channel) -> u64| channels.iter().map(|c| f(c)).sum::<u64>();
    match key {
        ColumnKey::Inbound => thousands(sum(|c| c.remote_balance)),
        ColumnKey::Outbound => thousands(sum(|c| c.local_balance)),
        ColumnKey::LocalFees => thousands(msat_to_sat(sum(|c| c.local_fees_msat.unwrap_or(0)))),
        ColumnKey::RemoteFees => thousands(sum(|c| c.remote_fees.unwrap_or(0))),
        _ => String::new(),
    }
}

fn average_input(key: ColumnKey, channel: &Channel) -> Option<u64> {
    match key {
        ColumnKey::LocalBaseFee => channel.local_base_fee,
        ColumnKey::LocalFeeRate => channel.local_fee_rate,
        ColumnKey::RemoteBaseFee => channel.remote_base_fee,
        ColumnKey::RemoteFeeRate => channel.remote_fee_rate,
        _ => None,
    }
}
