//! LND channel assembly, shared by the `lncli` and REST transports.
//!
//! Both transports return the JSON mapping of LND's protobuf messages, where
//! 64-bit integers are encoded as strings.

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer};

use super::{ForwardEvent, ForwardLedger, NodeBackend};
use crate::fees::FeePolicy;
use crate::model::{Channel, Node, Opener};

/// Events requested per forwarding history call.
const FORWARD_PAGE_SIZE: u32 = 50_000;

#[derive(Debug, Clone, Deserialize)]
pub struct GetInfo {
    pub identity_pubkey: String,
    #[serde(default)]
    pub alias: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListChannels {
    #[serde(default)]
    pub channels: Vec<LndChannel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LndChannel {
    #[serde(default)]
    pub active: bool,
    pub remote_pubkey: String,
    pub channel_point: String,
    pub chan_id: String,
    #[serde(deserialize_with = "u64_str")]
    pub capacity: u64,
    #[serde(default, deserialize_with = "u64_str")]
    pub local_balance: u64,
    #[serde(default, deserialize_with = "u64_str")]
    pub remote_balance: u64,
    #[serde(default, deserialize_with = "u64_str")]
    pub commit_fee: u64,
    #[serde(default, deserialize_with = "opt_u64_str")]
    pub uptime: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64_str")]
    pub lifetime: Option<u64>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub initiator: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelEdge {
    pub node1_pub: String,
    #[serde(default)]
    pub node1_policy: Option<RoutingPolicy>,
    #[serde(default)]
    pub node2_policy: Option<RoutingPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingPolicy {
    #[serde(default, deserialize_with = "opt_u64_str")]
    pub min_htlc: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64_str")]
    pub max_htlc_msat: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64_str")]
    pub fee_base_msat: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64_str")]
    pub fee_rate_milli_msat: Option<u64>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub node: Option<LightningNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LightningNode {
    #[serde(default)]
    pub alias: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardingHistory {
    #[serde(default)]
    pub forwarding_events: Vec<ForwardingEvent>,
    /// Offset to pass as `index_offset` for the next page.
    #[serde(default)]
    pub last_offset_index: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardingEvent {
    #[serde(default, deserialize_with = "u64_str")]
    pub timestamp: u64,
    pub chan_id_in: String,
    pub chan_id_out: String,
    #[serde(default, deserialize_with = "u64_str")]
    pub fee_msat: u64,
    #[serde(default, deserialize_with = "u64_str")]
    pub amt_in_msat: u64,
}

/// Fee update for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyUpdate {
    pub chan_point: String,
    pub base_fee_msat: u64,
    pub fee_rate_ppm: u64,
    pub time_lock_delta: u32,
}

/// The LND calls a report needs.
#[async_trait::async_trait]
pub trait LndTransport: Send + Sync {
    async fn get_info(&self) -> anyhow::Result<GetInfo>;
    async fn list_channels(&self) -> anyhow::Result<ListChannels>;
    async fn chan_info(&self, chan_id: &str) -> anyhow::Result<ChannelEdge>;
    async fn node_info(&self, pub_key: &str) -> anyhow::Result<NodeInfo>;
    /// Up to `max_events` forwards, starting after `index_offset`.
    async fn forwarding_history(
        &self,
        index_offset: u32,
        max_events: u32,
    ) -> anyhow::Result<ForwardingHistory>;
    async fn update_chan_policy(&self, update: &PolicyUpdate) -> anyhow::Result<()>;
}

pub struct LndBackend<T> {
    transport: T,
    page_size: u32,
}

impl<T: LndTransport> LndBackend<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            page_size: FORWARD_PAGE_SIZE,
        }
    }

    /// Read the whole forwarding history, one page at a time, until LND
    /// returns a short page.
    async fn forwards(&self) -> anyhow::Result<ForwardLedger> {
        // LND only reports settled forwards
        let mut ledger = ForwardLedger::new(false);
        let mut offset = 0;
        let mut total = 0;
        loop {
            let page = self
                .transport
                .forwarding_history(offset, self.page_size)
                .await?;
            let count = page.forwarding_events.len();
            record(&mut ledger, &page);
            total += count;
            if count < self.page_size as usize {
                break;
            }
            if page.last_offset_index <= offset {
                anyhow::bail!("Forwarding history did not advance past offset {}", offset);
            }
            offset = page.last_offset_index;
        }
        debug!("Read {} forwarding events", total);
        Ok(ledger)
    }

    async fn alias(&self, pub_key: &str) -> Option<String> {
        match self.transport.node_info(pub_key).await {
            Ok(info) => info.node.map(|n| n.alias).filter(|a| !a.is_empty()),
            Err(e) => {
                debug!("No node info for {}: {:#}", pub_key, e);
                None
            }
        }
    }
}

/// Balance and liveness fields, known without any graph lookups.
fn base_channel(ch: &LndChannel) -> Channel {
    Channel {
        chan_id: ch.chan_id.clone(),
        remote_node_id: ch.remote_pubkey.clone(),
        capacity: ch.capacity,
        local_balance: ch.local_balance,
        remote_balance: ch.remote_balance,
        commit_fee: ch.commit_fee,
        active: ch.active,
        uptime: ch.uptime,
        lifetime: ch.lifetime,
        private: ch.private,
        opener: if ch.initiator {
            Opener::Local
        } else {
            Opener::Remote
        },
        ..Default::default()
    }
}

/// Split an edge into (local, remote) policies.
fn policies<'e>(
    edge: &'e ChannelEdge,
    local_pubkey: &str,
) -> (Option<&'e RoutingPolicy>, Option<&'e RoutingPolicy>) {
    if edge.node1_pub == local_pubkey {
        (edge.node1_policy.as_ref(), edge.node2_policy.as_ref())
    } else {
        (edge.node2_policy.as_ref(), edge.node1_policy.as_ref())
    }
}

fn apply_policies(channel: &mut Channel, local: Option<&RoutingPolicy>, remote: Option<&RoutingPolicy>) {
    channel.local_base_fee = local.and_then(|p| p.fee_base_msat);
    channel.local_fee_rate = local.and_then(|p| p.fee_rate_milli_msat);
    channel.local_min_htlc = local.and_then(|p| p.min_htlc);
    channel.local_max_htlc = local.and_then(|p| p.max_htlc_msat);
    channel.local_disabled = local.map(|p| p.disabled);
    channel.remote_base_fee = remote.and_then(|p| p.fee_base_msat);
    channel.remote_fee_rate = remote.and_then(|p| p.fee_rate_milli_msat);
    channel.remote_min_htlc = remote.and_then(|p| p.min_htlc);
    channel.remote_max_htlc = remote.and_then(|p| p.max_htlc_msat);
    channel.remote_disabled = remote.map(|p| p.disabled);
}

fn record(ledger: &mut ForwardLedger, history: &ForwardingHistory) {
    for ev in &history.forwarding_events {
        ledger.record(ForwardEvent {
            in_channel: &ev.chan_id_in,
            out_channel: Some(&ev.chan_id_out),
            settled: true,
            fee_msat: ev.fee_msat,
            in_msat: ev.amt_in_msat,
            time: i64::try_from(ev.timestamp).ok(),
        });
    }
}

#[async_trait::async_trait]
impl<T: LndTransport> NodeBackend for LndBackend<T> {
    async fn fetch(&self) -> anyhow::Result<Node> {
        let info = self.transport.get_info().await?;
        let listed = self.transport.list_channels().await?;
        let forwards = self.forwards().await?;

        let mut channels = Vec::with_capacity(listed.channels.len());
        for ch in &listed.channels {
            let mut channel = base_channel(ch);
            match self.transport.chan_info(&ch.chan_id).await {
                Ok(edge) => {
                    let (local, remote) = policies(&edge, &info.identity_pubkey);
                    apply_policies(&mut channel, local, remote);
                }
                Err(e) => warn!("No channel policy for {}: {:#}", ch.chan_id, e),
            }
            channel.remote_alias = self.alias(&ch.remote_pubkey).await;
            forwards.annotate(&mut channel);
            channels.push(channel);
        }

        Ok(Node {
            local_pubkey: info.identity_pubkey,
            local_alias: info.alias,
            channels,
        })
    }

    async fn apply_fee_policy(&self, policy: &FeePolicy) -> anyhow::Result<()> {
        let listed = self.transport.list_channels().await?;
        for ch in &listed.channels {
            let fee = policy.calculate(&base_channel(ch));
            info!(
                "Channel {}: base={}msat, rate={}ppm, time_lock_delta={}",
                ch.chan_id, fee.base_fee_msat, fee.fee_rate_ppm, fee.time_lock_delta
            );
            self.transport
                .update_chan_policy(&PolicyUpdate {
                    chan_point: ch.channel_point.clone(),
                    base_fee_msat: fee.base_fee_msat,
                    fee_rate_ppm: fee.fee_rate_ppm,
                    time_lock_delta: fee.time_lock_delta,
                })
                .await?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(u64),
    Str(String),
}

fn parse_num<E: serde::de::Error>(v: NumOrStr) -> Result<u64, E> {
    match v {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.parse().map_err(E::custom),
    }
}

fn u64_str<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    parse_num(NumOrStr::deserialize(d)?)
}

fn opt_u64_str<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Option::<NumOrStr>::deserialize(d)?.map(parse_num).transpose()
}

// ---------------------------------------------------------------------------
// Mock transport for testing
// ---------------------------------------------------------------------------
