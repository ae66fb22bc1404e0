/// Which side funded (opened) the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Opener {
    #[default]
    Local,
    Remote,
}

/// One payment channel as reported by the node backend.
///
/// Amounts are in satoshi unless the field name says otherwise. Values a
/// backend cannot supply are `None`, never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    pub chan_id: String,
    pub remote_node_id: String,
    pub remote_alias: Option<String>,

    pub capacity: u64,
    pub local_balance: u64,
    pub remote_balance: u64,
    pub commit_fee: u64,

    /// Base fee in msat.
    pub local_base_fee: Option<u64>,
    /// Proportional fee in ppm.
    pub local_fee_rate: Option<u64>,
    pub remote_base_fee: Option<u64>,
    pub remote_fee_rate: Option<u64>,

    /// HTLC limits in msat.
    pub local_min_htlc: Option<u64>,
    pub local_max_htlc: Option<u64>,
    pub remote_min_htlc: Option<u64>,
    pub remote_max_htlc: Option<u64>,

    pub active: bool,
    /// Seconds the peer was observed online.
    pub uptime: Option<u64>,
    /// Seconds the channel has been monitored.
    pub lifetime: Option<u64>,
    pub local_disabled: Option<bool>,
    pub remote_disabled: Option<bool>,

    /// Unix timestamp of the latest forward through this channel.
    pub last_forward: Option<i64>,
    /// Fees earned on forwards leaving through this channel.
    pub local_fees_msat: Option<u64>,
    /// Estimated fees earned by the peer, in sat.
    pub remote_fees: Option<u64>,

    pub ins: Option<u64>,
    pub outs: Option<u64>,
    pub ins_percent: Option<f64>,
    pub outs_percent: Option<f64>,

    pub private: bool,
    pub opener: Opener,
}

impl Channel {
    /// Capacity minus the commitment fee, or `None` when that is not positive.
    pub fn usable_capacity(&self) -> Option<u64> {
        self.capacity
            .checked_sub(self.commit_fee)
            .filter(|usable| *usable > 0)
    }

    /// Alias if known, otherwise a shortened pubkey. Control characters
    /// in the alias are dropped.
    pub fn display_name(&self) -> String {
        let alias: String = self
            .remote_alias
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_control())
            .collect();
        if alias.is_empty() {
            self.remote_node_id.chars().take(16).collect()
        } else {
            alias
        }
    }
}

/// Snapshot of the local node and its channels, in backend enumeration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub local_pubkey: String,
    pub local_alias: String,
    pub channels: Vec<Channel>,
}

impl Node {
    pub fn public_channels(&self) -> Vec<&Channel> {
        self.channels.iter().filter(|c| !c.private).collect()
    }

    pub fn private_channels(&self) -> Vec<&Channel> {
        self.channels.iter().filter(|c| c.private).collect()
    }

    /// Local pubkey followed by every distinct remote pubkey.
    pub fn pubkeys(&self) -> Vec<&str> {
        let mut keys = vec![self.local_pubkey.as_str()];
        for channel in &self.channels {
            if !keys.contains(&channel.remote_node_id.as_str()) {
                keys.push(&channel.remote_node_id);
            }
        }
        keys
    }
}
