//! Column layout of the channel table.
//!
//! Columns come in groups. The layout lists every group once, in display
//! order; a group whose toggle is off is skipped. Toggles therefore never
//! affect the relative order of the columns they do not control.

use super::format::{
    msat_to_sat, nullable, nullable_thousands, thousands, thousands_signed, Cell, Style,
    PLACEHOLDER,
};
use super::metrics::{disabled_flag, format_days, resolve_htlc, DerivedMetrics};
use crate::model::{Channel, Opener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left,
    Center,
    Right,
}

/// How a column contributes to the footer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    /// Floor average over the non-null values only.
    Average,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKey {
    Inbound,
    Ratio,
    Outbound,
    Disabled,
    LocalMinHtlc,
    LocalMaxHtlc,
    RemoteMinHtlc,
    RemoteMaxHtlc,
    LocalBaseFee,
    LocalFeeRate,
    RemoteBaseFee,
    RemoteFeeRate,
    Uptime,
    LastForward,
    LocalFees,
    FwdIn,
    InPercent,
    FwdOut,
    OutPercent,
    RemoteFees,
    Score,
    GoodPeer,
    Alias,
    ChanId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub key: ColumnKey,
    pub header: &'static [&'static str],
    pub justify: Justify,
    pub style: Option<Style>,
    pub aggregate: Aggregate,
    pub max_width: Option<usize>,
}

/// Optional column groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggles {
    pub show_disabled: bool,
    pub show_minmax_htlc: bool,
    pub show_forwarding_stats: bool,
    pub show_remote_fees: bool,
    pub show_scores: bool,
    pub show_good_peers: bool,
    pub show_chan_ids: bool,
}

/// Everything a column formatter can look at.
pub struct Row<'a> {
    pub channel: &'a Channel,
    pub metrics: &'a DerivedMetrics,
    pub score: Option<i64>,
    pub good_inbound: bool,
    pub good_outbound: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Balance,
    Disabled,
    MinMaxHtlc,
    Fees,
    Activity,
    ForwardingStats,
    RemoteFees,
    Score,
    GoodPeers,
    Alias,
    ChanId,
}

const LAYOUT: [Group; 11] = [
    Group::Balance,
    Group::Disabled,
    Group::MinMaxHtlc,
    Group::Fees,
    Group::Activity,
    Group::ForwardingStats,
    Group::RemoteFees,
    Group::Score,
    Group::GoodPeers,
    Group::Alias,
    Group::ChanId,
];

impl Group {
    fn enabled(self, toggles: &Toggles) -> bool {
        match self {
            Group::Balance | Group::Fees | Group::Activity | Group::Alias => true,
            Group::Disabled => toggles.show_disabled,
            Group::MinMaxHtlc => toggles.show_minmax_htlc,
            Group::ForwardingStats => toggles.show_forwarding_stats,
            Group::RemoteFees => toggles.show_remote_fees,
            Group::Score => toggles.show_scores,
            Group::GoodPeers => toggles.show_good_peers,
            Group::ChanId => toggles.show_chan_ids,
        }
    }

    fn keys(self) -> &'static [ColumnKey] {
        use ColumnKey::*;
        match self {
            Group::Balance => &[Inbound, Ratio, Outbound],
            Group::Disabled => &[Disabled],
            Group::MinMaxHtlc => &[LocalMinHtlc, LocalMaxHtlc, RemoteMinHtlc, RemoteMaxHtlc],
            Group::Fees => &[LocalBaseFee, LocalFeeRate, RemoteBaseFee, RemoteFeeRate],
            Group::Activity => &[Uptime, LastForward, LocalFees],
            Group::ForwardingStats => &[FwdIn, InPercent, FwdOut, OutPercent],
            Group::RemoteFees => &[RemoteFees],
            Group::Score => &[Score],
            Group::GoodPeers => &[GoodPeer],
            Group::Alias => &[Alias],
            Group::ChanId => &[ChanId],
        }
    }
}

impl ColumnKey {
    pub fn column(self) -> Column {
        use ColumnKey::*;
        let (header, justify, style, aggregate) = match self {
            Inbound => layout(&["", "inbound"], Justify::Right, Some(Style::BrightRed), Aggregate::Sum),
            Ratio => layout(&["", "ratio"], Justify::Center, None, Aggregate::None),
            Outbound => layout(&["", "outbound"], Justify::Right, Some(Style::Green), Aggregate::Sum),
            Disabled => layout(&["is", "disabled"], Justify::Right, None, Aggregate::None),
            LocalMinHtlc => layout(
                &["local", "min_htlc", "(sat)"],
                Justify::Right,
                Some(Style::BrightBlue),
                Aggregate::None,
            ),
            LocalMaxHtlc => layout(
                &["local", "max_htlc", "(sat)"],
                Justify::Right,
                Some(Style::BrightBlue),
                Aggregate::None,
            ),
            RemoteMinHtlc => layout(
                &["remote", "min_htlc", "(sat)"],
                Justify::Right,
                Some(Style::BrightYellow),
                Aggregate::None,
            ),
            RemoteMaxHtlc => layout(
                &["remote", "max_htlc", "(sat)"],
                Justify::Right,
                Some(Style::BrightYellow),
                Aggregate::None,
            ),
            LocalBaseFee => layout(
                &["local", "base_fee", "(msat)"],
                Justify::Right,
                Some(Style::BrightBlue),
                Aggregate::Average,
            ),
            LocalFeeRate => layout(
                &["local", "fee_rate", "(ppm)"],
                Justify::Right,
                Some(Style::BrightBlue),
                Aggregate::Average,
            ),
            RemoteBaseFee => layout(
                &["remote", "base_fee", "(msat)"],
                Justify::Right,
                Some(Style::BrightYellow),
                Aggregate::Average,
            ),
            RemoteFeeRate => layout(
                &["remote", "fee_rate", "(ppm)"],
                Justify::Right,
                Some(Style::BrightYellow),
                Aggregate::Average,
            ),
            Uptime => layout(&["", "uptime", "(%)"], Justify::Right, None, Aggregate::None),
            LastForward => layout(&["last", "forward", "(days)"], Justify::Right, None, Aggregate::None),
            LocalFees => layout(
                &["local", "fees", "(sat)"],
                Justify::Right,
                Some(Style::BrightCyan),
                Aggregate::Sum,
            ),
            FwdIn => layout(&["", "fwd in"], Justify::Right, None, Aggregate::None),
            InPercent => layout(&["", "in %"], Justify::Right, None, Aggregate::None),
            FwdOut => layout(&["", "fwd out"], Justify::Right, None, Aggregate::None),
            OutPercent => layout(&["", "out %"], Justify::Right, None, Aggregate::None),
            RemoteFees => layout(
                &["remote", "fees", "(sat)"],
                Justify::Right,
                Some(Style::BrightCyan),
                Aggregate::Sum,
            ),
            Score => layout(&["", "score"], Justify::Right, None, Aggregate::None),
            GoodPeer => layout(&["good", "peer"], Justify::Center, None, Aggregate::None),
            Alias => layout(&["", "alias"], Justify::Left, None, Aggregate::None),
            ChanId => layout(&["", "chan_id"], Justify::Left, None, Aggregate::None),
        };
        Column {
            key: self,
            header,
            justify,
            style,
            aggregate,
            max_width: (self == Alias).then_some(25),
        }
    }

    /// Render this column's value for one channel.
    pub fn cell(self, row: &Row) -> Cell {
        use ColumnKey::*;
        let c = row.channel;
        let m = row.metrics;
        match self {
            Inbound => Cell::plain(thousands(c.remote_balance)),
            Ratio => Cell::styled("·".repeat(m.recv_units as usize), Style::BrightRed)
                .push("|", None)
                .push("·".repeat(m.send_units as usize), Some(Style::Green)),
            Outbound => Cell::plain(thousands(c.local_balance)),
            Disabled => Cell::styled(disabled_flag(c.local_disabled), Style::BrightBlue)
                .push("|", None)
                .push(disabled_flag(c.remote_disabled), Some(Style::BrightYellow)),
            LocalMinHtlc => Cell::plain(resolve_htlc(c.local_min_htlc)),
            LocalMaxHtlc => Cell::plain(resolve_htlc(c.local_max_htlc)),
            RemoteMinHtlc => Cell::plain(resolve_htlc(c.remote_min_htlc)),
            RemoteMaxHtlc => Cell::plain(resolve_htlc(c.remote_max_htlc)),
            LocalBaseFee => Cell::plain(nullable(c.local_base_fee)),
            LocalFeeRate => Cell::plain(nullable(c.local_fee_rate)),
            RemoteBaseFee => Cell::plain(nullable(c.remote_base_fee)),
            RemoteFeeRate => Cell::plain(nullable(c.remote_fee_rate)),
            Uptime => {
                let text = m
                    .uptime_percent
                    .map_or_else(|| "n/a".to_string(), |p| p.to_string());
                let style = if c.active { Style::Green } else { Style::BrightRed };
                Cell::styled(text, style)
            }
            LastForward => Cell::plain(format_days(m.days_since_forward)),
            LocalFees => Cell::plain(nonzero_thousands(c.local_fees_msat.map(msat_to_sat))),
            FwdIn => Cell::plain(nullable(c.ins)),
            InPercent => Cell::plain(percent(c.ins_percent)),
            FwdOut => Cell::plain(nullable(c.outs)),
            OutPercent => Cell::plain(percent(c.outs_percent)),
            RemoteFees => Cell::plain(nonzero_thousands(c.remote_fees)),
            Score => Cell::plain(
                row.score
                    .map_or_else(|| PLACEHOLDER.to_string(), thousands_signed),
            ),
            GoodPeer => Cell::styled(good_flag(row.good_inbound, "in"), Style::BrightRed)
                .push("|", None)
                .push(good_flag(row.good_outbound, "out"), Some(Style::Green)),
            Alias => {
                let style = match c.opener {
                    Opener::Local => Style::BrightBlue,
                    Opener::Remote => Style::BrightYellow,
                };
                Cell::styled(c.display_name(), style)
            }
            ChanId => Cell::plain(c.chan_id.clone()),
        }
    }
}

type Layout = (&'static [&'static str], Justify, Option<Style>, Aggregate);

fn layout(
    header: &'static [&'static str],
    justify: Justify,
    style: Option<Style>,
    aggregate: Aggregate,
) -> Layout {
    (header, justify, style, aggregate)
}

fn good_flag(good: bool, label: &str) -> &str {
    if good {
        label
    } else {
        PLACEHOLDER
    }
}

fn nonzero_thousands(value: Option<u64>) -> String {
    nullable_thousands(value.filter(|v| *v > 0))
}

fn percent(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| PLACEHOLDER.to_string(), |r| format!("{:.0}%", r * 100.0))
}

/// Ordered column set for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn build(toggles: &Toggles) -> Self {
        let columns = LAYOUT
            .iter()
            .filter(|group| group.enabled(toggles))
            .flat_map(|group| group.keys().iter().map(|key| key.column()))
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[cfg(test)]
    pub fn keys(&self) -> Vec<ColumnKey> {
        self.columns.iter().map(|c| c.key).collect()
    }

    pub fn cells(&self, row: &Row) -> Vec<Cell> {
        self.columns.iter().map(|c| c.key.cell(row)).collect()
    }
}
