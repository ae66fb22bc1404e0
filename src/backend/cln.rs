//! Core Lightning through `lightning-cli`.
//!
//! CLN has no per-channel uptime, so `uptime` and `lifetime` stay unknown.
//! `listforwards` includes failed attempts, which makes forward success
//! ratios available on this backend only.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

use super::{run_json, ForwardEvent, ForwardLedger, NodeBackend};
use crate::fees::FeePolicy;
use crate::model::{Channel, Node, Opener};

const NORMAL_STATE: &str = "CHANNELD_NORMAL";

#[derive(Debug, Deserialize)]
struct GetInfo {
    id: String,
    #[serde(default)]
    alias: String,
}

#[derive(Debug, Default, Deserialize)]
struct PeerChannels {
    #[serde(default)]
    channels: Vec<PeerChannel>,
}

#[derive(Debug, Deserialize)]
struct PeerChannel {
    peer_id: String,
    #[serde(default)]
    peer_connected: bool,
    state: String,
    #[serde(default)]
    short_channel_id: Option<String>,
    #[serde(deserialize_with = "msat")]
    total_msat: u64,
    #[serde(deserialize_with = "msat")]
    to_us_msat: u64,
    #[serde(default, deserialize_with = "opt_msat")]
    last_tx_fee_msat: Option<u64>,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    opener: String,
}

#[derive(Debug, Default, Deserialize)]
struct GossipChannels {
    #[serde(default)]
    channels: Vec<GossipChannel>,
}

#[derive(Debug, Deserialize)]
struct GossipChannel {
    short_channel_id: String,
    #[serde(default)]
    active: bool,
    base_fee_millisatoshi: u64,
    fee_per_millionth: u64,
    #[serde(default, deserialize_with = "opt_msat")]
    htlc_minimum_msat: Option<u64>,
    #[serde(default, deserialize_with = "opt_msat")]
    htlc_maximum_msat: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ListNodes {
    #[serde(default)]
    nodes: Vec<GossipNode>,
}

#[derive(Debug, Deserialize)]
struct GossipNode {
    nodeid: String,
    #[serde(default)]
    alias: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListForwards {
    #[serde(default)]
    forwards: Vec<Forward>,
}

#[derive(Debug, Deserialize)]
struct Forward {
    in_channel: String,
    #[serde(default)]
    out_channel: Option<String>,
    status: String,
    #[serde(default, deserialize_with = "opt_msat")]
    in_msat: Option<u64>,
    #[serde(default, deserialize_with = "opt_msat")]
    fee_msat: Option<u64>,
    #[serde(default)]
    resolved_time: Option<f64>,
    #[serde(default)]
    received_time: Option<f64>,
}

pub struct ClnBackend {
    program: String,
    args: Vec<String>,
}

impl ClnBackend {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, args: &[&str]) -> anyhow::Result<T> {
        run_json(&self.program, &self.args, args).await
    }
}

/// Everything `fetch` reads, gathered before assembly.
struct Snapshot {
    info: GetInfo,
    peers: PeerChannels,
    outgoing: GossipChannels,
    incoming: GossipChannels,
    nodes: ListNodes,
    forwards: ListForwards,
}

fn base_channel(ch: &PeerChannel, scid: &str) -> Channel {
    let capacity = ch.total_msat / 1_000;
    let local_balance = ch.to_us_msat / 1_000;
    let commit_fee = ch.last_tx_fee_msat.map(|f| f / 1_000).unwrap_or(0);
    Channel {
        chan_id: scid.to_string(),
        remote_node_id: ch.peer_id.clone(),
        capacity,
        local_balance,
        remote_balance: capacity
            .saturating_sub(local_balance)
            .saturating_sub(commit_fee),
        commit_fee,
        active: ch.peer_connected,
        private: ch.private,
        opener: if ch.opener == "remote" {
            Opener::Remote
        } else {
            Opener::Local
        },
        ..Default::default()
    }
}

fn open_channels(peers: &PeerChannels) -> impl Iterator<Item = (&PeerChannel, &str)> {
    peers
        .channels
        .iter()
        .filter(|ch| ch.state == NORMAL_STATE)
        .filter_map(|ch| ch.short_channel_id.as_deref().map(|scid| (ch, scid)))
}

fn ledger(forwards: &ListForwards) -> ForwardLedger {
    let mut ledger = ForwardLedger::new(true);
    for fw in &forwards.forwards {
        let time = fw.resolved_time.or(fw.received_time).map(|t| t as i64);
        ledger.record(ForwardEvent {
            in_channel: &fw.in_channel,
            out_channel: fw.out_channel.as_deref(),
            settled: fw.status == "settled",
            fee_msat: fw.fee_msat.unwrap_or(0),
            in_msat: fw.in_msat.unwrap_or(0),
            time,
        });
    }
    ledger
}

fn by_scid(edges: &GossipChannels) -> HashMap<&str, &GossipChannel> {
    edges
        .channels
        .iter()
        .map(|e| (e.short_channel_id.as_str(), e))
        .collect()
}

fn assemble(snapshot: Snapshot) -> Node {
    let outgoing = by_scid(&snapshot.outgoing);
    let incoming = by_scid(&snapshot.incoming);
    let aliases: HashMap<&str, &str> = snapshot
        .nodes
        .nodes
        .iter()
        .filter_map(|n| n.alias.as_deref().map(|a| (n.nodeid.as_str(), a)))
        .collect();
    let forwards = ledger(&snapshot.forwards);

    let channels = open_channels(&snapshot.peers)
        .map(|(ch, scid)| {
            let mut channel = base_channel(ch, scid);
            if let Some(local) = outgoing.get(scid) {
                channel.local_base_fee = Some(local.base_fee_millisatoshi);
                channel.local_fee_rate = Some(local.fee_per_millionth);
                channel.local_min_htlc = local.htlc_minimum_msat;
                channel.local_max_htlc = local.htlc_maximum_msat;
                channel.local_disabled = Some(!local.active);
            }
            if let Some(remote) = incoming.get(scid) {
                channel.remote_base_fee = Some(remote.base_fee_millisatoshi);
                channel.remote_fee_rate = Some(remote.fee_per_millionth);
                channel.remote_min_htlc = remote.htlc_minimum_msat;
                channel.remote_max_htlc = remote.htlc_maximum_msat;
                channel.remote_disabled = Some(!remote.active);
            }
            channel.remote_alias = aliases
                .get(ch.peer_id.as_str())
                .filter(|a| !a.is_empty())
                .map(|a| a.to_string());
            forwards.annotate(&mut channel);
            channel
        })
        .collect();

    Node {
        local_pubkey: snapshot.info.id,
        local_alias: snapshot.info.alias,
        channels,
    }
}

#[async_trait]
impl NodeBackend for ClnBackend {
    async fn fetch(&self) -> anyhow::Result<Node> {
        let info: GetInfo = self.call(&["getinfo"]).await?;
        let source = format!("source={}", info.id);
        let destination = format!("destination={}", info.id);
        let snapshot = Snapshot {
            peers: self.call(&["listpeerchannels"]).await?,
            outgoing: self.call(&["-k", "listchannels", source.as_str()]).await?,
            incoming: self.call(&["-k", "listchannels", destination.as_str()]).await?,
            nodes: self.call(&["listnodes"]).await?,
            forwards: self.call(&["listforwards"]).await?,
            info,
        };
        debug!(
            "lightning-cli returned {} peer channels, {} forwards",
            snapshot.peers.channels.len(),
            snapshot.forwards.forwards.len()
        );
        Ok(assemble(snapshot))
    }

    async fn apply_fee_policy(&self, policy: &FeePolicy) -> anyhow::Result<()> {
        let peers: PeerChannels = self.call(&["listpeerchannels"]).await?;
        // CLN sets the CLTV delta node-wide, so only fees are per channel
        debug!(
            "Ignoring time_lock_delta={} on Core Lightning",
            policy.time_lock_delta
        );
        for (ch, scid) in open_channels(&peers) {
            let fee = policy.calculate(&base_channel(ch, scid));
            info!(
                "Channel {}: base={}msat, rate={}ppm",
                scid, fee.base_fee_msat, fee.fee_rate_ppm
            );
            let id = format!("id={}", scid);
            let base = format!("feebase={}", fee.base_fee_msat);
            let ppm = format!("feeppm={}", fee.fee_rate_ppm);
            let _: serde_json::Value = self
                .call(&["-k", "setchannel", id.as_str(), base.as_str(), ppm.as_str()])
                .await?;
        }
        Ok(())
    }
}

/// Amounts are plain integers on current CLN and `"<n>msat"` strings on
/// older releases.
#[derive(Deserialize)]
#[serde(untagged)]
enum Msat {
    Num(u64),
    Str(String),
}

fn parse_msat<E: serde::de::Error>(v: Msat) -> Result<u64, E> {
    match v {
        Msat::Num(n) => Ok(n),
        Msat::Str(s) => s.trim_end_matches("msat").parse().map_err(E::custom),
    }
}

fn msat<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    parse_msat(Msat::deserialize(d)?)
}

fn opt_msat<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Option::<Msat>::deserialize(d)?.map(parse_msat).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: &str = "03local";

    fn snapshot() -> Snapshot {
        Snapshot {
            info: serde_json::from_str(r#"{"id": "03local", "alias": "cln-node"}"#).unwrap(),
            peers: serde_json::from_str(
                r#"{"channels": [
                    {
                        "peer_id": "02peer",
                        "peer_connected": true,
                        "state": "CHANNELD_NORMAL",
                        "short_channel_id": "100x1x0",
                        "total_msat": 1000000000,
                        "to_us_msat": 400000000,
                        "last_tx_fee_msat": "3470000msat",
                        "private": false,
                        "opener": "remote"
                    },
                    {
                        "peer_id": "02gone",
                        "peer_connected": false,
                        "state": "ONCHAIN",
                        "short_channel_id": "90x1x0",
                        "total_msat": 500000000,
                        "to_us_msat": 0
                    },
                    {
                        "peer_id": "02pending",
                        "state": "CHANNELD_AWAITING_LOCKIN",
                        "total_msat": 500000000,
                        "to_us_msat": 500000000
                    }
                ]}"#,
            )
            .unwrap(),
            outgoing: serde_json::from_str(
                r#"{"channels": [{
                    "source": "03local",
                    "destination": "02peer",
                    "short_channel_id": "100x1x0",
                    "active": true,
                    "base_fee_millisatoshi": 1000,
                    "fee_per_millionth": 50,
                    "htlc_minimum_msat": 1000,
                    "htlc_maximum_msat": 990000000
                }]}"#,
            )
            .unwrap(),
            incoming: serde_json::from_str(
                r#"{"channels": [{
                    "source": "02peer",
                    "destination": "03local",
                    "short_channel_id": "100x1x0",
                    "active": false,
                    "base_fee_millisatoshi": 0,
                    "fee_per_millionth": 200,
                    "htlc_minimum_msat": "1msat"
                }]}"#,
            )
            .unwrap(),
            nodes: serde_json::from_str(
                r#"{"nodes": [{"nodeid": "02peer", "alias": "PEER"}, {"nodeid": "03local"}]}"#,
            )
            .unwrap(),
            forwards: serde_json::from_str(
                r#"{"forwards": [
                    {"in_channel": "100x1x0", "out_channel": "200x1x0", "status": "settled",
                     "in_msat": 10000000, "fee_msat": 1000,
                     "received_time": 1700000000.5, "resolved_time": 1700000001.25},
                    {"in_channel": "100x1x0", "out_channel": "200x1x0", "status": "failed",
                     "in_msat": 10000000, "received_time": 1700000100.0},
                    {"in_channel": "200x1x0", "out_channel": "100x1x0", "status": "settled",
                     "in_msat": 5000000, "fee_msat": 500, "resolved_time": 1700000200.0},
                    {"in_channel": "100x1x0", "status": "local_failed",
                     "in_msat": 10000000, "received_time": 1700000300.0}
                ]}"#,
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_assemble_only_normal_channels() {
        let node = assemble(snapshot());
        assert_eq!(node.local_pubkey, LOCAL);
        assert_eq!(node.local_alias, "cln-node");
        assert_eq!(node.channels.len(), 1);
    }

    #[test]
    fn test_assemble_balances_and_policies() {
        let node = assemble(snapshot());
        let ch = &node.channels[0];
        assert_eq!(ch.chan_id, "100x1x0");
        assert_eq!(ch.capacity, 1_000_000);
        assert_eq!(ch.local_balance, 400_000);
        assert_eq!(ch.commit_fee, 3_470);
        assert_eq!(ch.remote_balance, 596_530);
        assert_eq!(ch.opener, Opener::Remote);
        assert!(ch.active);
        assert_eq!(ch.uptime, None);
        assert_eq!(ch.lifetime, None);
        assert_eq!(ch.remote_alias.as_deref(), Some("PEER"));

        assert_eq!(ch.local_base_fee, Some(1_000));
        assert_eq!(ch.local_fee_rate, Some(50));
        assert_eq!(ch.local_disabled, Some(false));
        assert_eq!(ch.remote_fee_rate, Some(200));
        assert_eq!(ch.remote_min_htlc, Some(1));
        assert_eq!(ch.remote_max_htlc, None);
        assert_eq!(ch.remote_disabled, Some(true));
    }

    #[test]
    fn test_assemble_forwarding_stats() {
        let node = assemble(snapshot());
        let ch = &node.channels[0];
        // 1 of 3 inbound attempts settled, 1 of 1 outbound
        assert_eq!(ch.ins, Some(1));
        assert_eq!(ch.outs, Some(1));
        assert!((ch.ins_percent.unwrap() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(ch.outs_percent, Some(1.0));
        assert_eq!(ch.local_fees_msat, Some(500));
        assert_eq!(ch.last_forward, Some(1_700_000_200));
        // one settled inbound: 0 base + 10_000_000msat * 200ppm = 2_000msat
        assert_eq!(ch.remote_fees, Some(2));
    }

    #[test]
    fn test_msat_formats() {
        let fw: Forward = serde_json::from_str(
            r#"{"in_channel": "1x1x1", "status": "offered", "in_msat": "42msat"}"#,
        )
        .unwrap();
        assert_eq!(fw.in_msat, Some(42));
        assert_eq!(fw.fee_msat, None);

        assert!(serde_json::from_str::<Forward>(
            r#"{"in_channel": "1x1x1", "status": "offered", "in_msat": "lots"}"#
        )
        .is_err());
    }
}
