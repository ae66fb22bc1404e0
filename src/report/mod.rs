pub mod aggregate;
pub mod format;
pub mod metrics;
pub mod render;
pub mod schema;
pub mod sort;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Write;

use crate::error::ReportError;
use crate::model::{Channel, Node};
use crate::score::{GoodPeers, ScoreTable};
use format::{thousands_signed, Painter, PLACEHOLDER};
use render::{grid, Table};
use schema::{Row, Schema, Toggles};

/// Which channels to show, and whether to split them into two tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFilter {
    #[default]
    All,
    Public,
    Private,
    Split,
}

/// A group of channels rendered as one table. `label` is set when the table
/// is followed by a channel count line.
pub struct Partition<'a> {
    pub label: Option<&'static str>,
    pub channels: Vec<&'a Channel>,
}

pub fn partition(node: &Node, filter: ChannelFilter) -> Vec<Partition<'_>> {
    match filter {
        ChannelFilter::All => vec![Partition {
            label: None,
            channels: node.channels.iter().collect(),
        }],
        ChannelFilter::Public => vec![Partition {
            label: None,
            channels: node.public_channels(),
        }],
        ChannelFilter::Private => vec![Partition {
            label: None,
            channels: node.private_channels(),
        }],
        ChannelFilter::Split => vec![
            Partition {
                label: Some("public"),
                channels: node.public_channels(),
            },
            Partition {
                label: Some("private"),
                channels: node.private_channels(),
            },
        ],
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    pub toggles: Toggles,
    pub filter: ChannelFilter,
}

/// Third-party ratings for the report. A `None` part was either not
/// requested or failed to load, and its columns are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ratings<'a> {
    pub scores: Option<&'a ScoreTable>,
    pub good_peers: Option<&'a GoodPeers>,
}

/// Node summary block.
pub fn info_box(node: &Node, scores: Option<&ScoreTable>, painter: &Painter) -> String {
    let mut rows = vec![
        ("pubkey    : ".to_string(), node.local_pubkey.clone()),
        ("alias     : ".to_string(), node.local_alias.clone()),
        ("channels  : ".to_string(), node.channels.len().to_string()),
    ];
    if let Some(scores) = scores {
        let score = scores
            .get(&node.local_pubkey)
            .map_or_else(|| PLACEHOLDER.to_string(), thousands_signed);
        rows.push(("score     : ".to_string(), score));
    }
    grid(&rows, painter)
}

pub fn channel_count_box(count: usize, label: &str, painter: &Painter) -> String {
    grid(&[(format!("{} channels : ", label), count.to_string())], painter)
}

/// Build the channel table: sorted rows followed by the footer.
pub fn channel_table(
    channels: &[&Channel],
    ratings: &Ratings,
    toggles: &Toggles,
    now: DateTime<Utc>,
) -> Result<Table, ReportError> {
    let toggles = Toggles {
        show_scores: ratings.scores.is_some(),
        show_good_peers: ratings.good_peers.is_some(),
        ..*toggles
    };
    let schema = Schema::build(&toggles);
    let mut table = Table::new(schema.columns());

    let sorted = sort::sort_channels(channels.iter().copied())?;
    for channel in &sorted {
        let metrics = metrics::derive(channel, now)?;
        let row = Row {
            channel,
            metrics: &metrics,
            score: ratings.scores.and_then(|s| s.get(&channel.remote_node_id)),
            good_inbound: ratings
                .good_peers
                .is_some_and(|p| p.is_good_inbound(&channel.remote_node_id)),
            good_outbound: ratings
                .good_peers
                .is_some_and(|p| p.is_good_outbound(&channel.remote_node_id)),
        };
        table.add_row(schema.cells(&row));
    }

    let footer = aggregate::compute(&schema, &sorted);
    table.add_row(footer.separator);
    table.add_row(footer.totals);
    Ok(table)
}

/// Write the full report.
///
/// The summary block is written first. Tables are built completely before any
/// of them is written, so a failing channel leaves no partial table behind.
pub fn write_report(
    out: &mut dyn Write,
    node: &Node,
    ratings: &Ratings,
    options: &ReportOptions,
    now: DateTime<Utc>,
    painter: &Painter,
) -> Result<(), ReportError> {
    writeln!(out)?;
    write!(out, "{}", info_box(node, ratings.scores, painter))?;

    let mut sections = Vec::new();
    for part in partition(node, options.filter) {
        if part.channels.is_empty() {
            continue;
        }
        let table = channel_table(&part.channels, ratings, &options.toggles, now)?;
        let mut section = table.render(painter);
        if let Some(label) = part.label {
            section.push_str(&channel_count_box(part.channels.len(), label, painter));
        }
        sections.push(section);
    }

    for section in sections {
        write!(out, "{}", section)?;
    }
    if options.filter == ChannelFilter::Split {
        writeln!(out)?;
    }
    Ok(())
}
