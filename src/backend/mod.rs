pub mod cln;
pub mod lnd;
pub mod lnd_cli;
pub mod lnd_rest;

use anyhow::Context;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::Config;
use crate::fees::FeePolicy;
use crate::model::{Channel, Node};
use crate::report::format::msat_to_sat;

/// Trait abstracting the node implementation a report is read from.
///
/// This enables mock-based testing without a live node.
#[async_trait::async_trait]
pub trait NodeBackend: Send + Sync {
    /// Local identity and every open channel.
    async fn fetch(&self) -> anyhow::Result<Node>;
    /// Push fees derived from `policy` to every channel.
    async fn apply_fee_policy(&self, policy: &FeePolicy) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Lnd,
    CLightning,
    LndRest,
}

/// Construct the backend selected in the config.
pub fn build(config: &Config) -> anyhow::Result<Box<dyn NodeBackend>> {
    let backend = &config.backend;
    debug!(
        "Using {:?} backend with client args {:?}",
        backend.client, backend.client_args
    );
    Ok(match backend.client {
        BackendKind::Lnd => Box::new(lnd::LndBackend::new(lnd_cli::LncliTransport::new(
            &backend.lncli_path,
            &backend.client_args,
        ))),
        BackendKind::LndRest => {
            let rest = config.lnd_rest.with_client_args(&backend.client_args)?;
            Box::new(lnd::LndBackend::new(lnd_rest::RestTransport::new(&rest)?))
        }
        BackendKind::CLightning => Box::new(cln::ClnBackend::new(
            &backend.lightning_cli_path,
            &backend.client_args,
        )),
    })
}

/// Run a node CLI and parse its JSON output.
pub(crate) async fn run_json<T: DeserializeOwned>(
    program: &str,
    base_args: &[String],
    args: &[&str],
) -> anyhow::Result<T> {
    debug!("{} {}", program, args.join(" "));
    let output = tokio::process::Command::new(program)
        .args(base_args)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} {} exited with {}: {}",
            program,
            args.first().unwrap_or(&""),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    serde_json::from_slice(&output.stdout)
        .with_context(|| format!("Malformed JSON from {} {}", program, args.join(" ")))
}

/// One forwarding attempt as reported by a backend.
pub(crate) struct ForwardEvent<'a> {
    pub in_channel: &'a str,
    pub out_channel: Option<&'a str>,
    pub settled: bool,
    pub fee_msat: u64,
    pub in_msat: u64,
    pub time: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct ForwardStats {
    fees_msat: u64,
    last_forward: Option<i64>,
    ins_settled: u64,
    ins_total: u64,
    outs_settled: u64,
    outs_total: u64,
    settled_in_count: u64,
    settled_in_msat: u64,
}

/// Per-channel forwarding totals.
#[derive(Debug, Default)]
pub(crate) struct ForwardLedger {
    by_channel: HashMap<String, ForwardStats>,
    /// Whether failed forwards are reported, making success ratios meaningful.
    tracks_failures: bool,
}

impl ForwardLedger {
    pub fn new(tracks_failures: bool) -> Self {
        Self {
            by_channel: HashMap::new(),
            tracks_failures,
        }
    }

    pub fn record(&mut self, event: ForwardEvent) {
        let inbound = self.by_channel.entry(event.in_channel.to_string()).or_default();
        inbound.ins_total += 1;
        if event.settled {
            inbound.ins_settled += 1;
            inbound.settled_in_count += 1;
            inbound.settled_in_msat += event.in_msat;
            inbound.last_forward = inbound.last_forward.max(event.time);
        }

        if let Some(out_channel) = event.out_channel {
            let outbound = self.by_channel.entry(out_channel.to_string()).or_default();
            outbound.outs_total += 1;
            if event.settled {
                outbound.outs_settled += 1;
                outbound.fees_msat += event.fee_msat;
                outbound.last_forward = outbound.last_forward.max(event.time);
            }
        }
    }

    /// Fill the forwarding-derived fields of `channel`.
    pub fn annotate(&self, channel: &mut Channel) {
        let stats = self.by_channel.get(&channel.chan_id).cloned().unwrap_or_default();

        channel.local_fees_msat = Some(stats.fees_msat);
        channel.last_forward = stats.last_forward;
        channel.ins = Some(stats.ins_settled);
        channel.outs = Some(stats.outs_settled);
        if self.tracks_failures {
            channel.ins_percent = ratio(stats.ins_settled, stats.ins_total);
            channel.outs_percent = ratio(stats.outs_settled, stats.outs_total);
        }
        channel.remote_fees = match (channel.remote_base_fee, channel.remote_fee_rate) {
            (Some(base), Some(rate)) => {
                let msat = stats.settled_in_count as u128 * base as u128
                    + stats.settled_in_msat as u128 * rate as u128 / 1_000_000;
                Some(msat_to_sat(u64::try_from(msat).unwrap_or(u64::MAX)))
            }
            _ => None,
        };
    }
}

fn ratio(part: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64)
}

// ---------------------------------------------------------------------------
// Mock backend for testing
// ---------------------------------------------------------------------------
