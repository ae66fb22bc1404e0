use async_trait::async_trait;

use super::lnd::{
    ChannelEdge, ForwardingHistory, GetInfo, ListChannels, LndTransport, NodeInfo, PolicyUpdate,
};
use super::run_json;

/// LND reached through `lncli`.
pub struct LncliTransport {
    program: String,
    args: Vec<String>,
}

impl LncliTransport {
    /// `args` go before every subcommand, e.g. `--network=testnet`.
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

fn update_args(update: &PolicyUpdate) -> Vec<String> {
    vec![
        "updatechanpolicy".to_string(),
        "--base_fee_msat".to_string(),
        update.base_fee_msat.to_string(),
        "--fee_rate_ppm".to_string(),
        update.fee_rate_ppm.to_string(),
        "--time_lock_delta".to_string(),
        update.time_lock_delta.to_string(),
        "--chan_point".to_string(),
        update.chan_point.clone(),
    ]
}

fn history_args(index_offset: u32, max_events: u32) -> Vec<String> {
    vec![
        "fwdinghistory".to_string(),
        "--start_time".to_string(),
        "-10y".to_string(),
        "--index_offset".to_string(),
        index_offset.to_string(),
        "--max_events".to_string(),
        max_events.to_string(),
    ]
}

#[async_trait]
impl LndTransport for LncliTransport {
    async fn get_info(&self) -> anyhow::Result<GetInfo> {
        self.call(&["getinfo"]).await
    }

    async fn list_channels(&self) -> anyhow::Result<ListChannels> {
        self.call(&["listchannels"]).await
    }

    async fn chan_info(&self, chan_id: &str) -> anyhow::Result<ChannelEdge> {
        self.call(&["getchaninfo", "--chan_id", chan_id]).await
    }

    async fn node_info(&self, pub_key: &str) -> anyhow::Result<NodeInfo> {
        self.call(&["getnodeinfo", "--pub_key", pub_key]).await
    }

    async fn forwarding_history(
        &self,
        index_offset: u32,
        max_events: u32,
    ) -> anyhow::Result<ForwardingHistory> {
        let args = history_args(index_offset, max_events);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.call(&args).await
    }

    async fn update_chan_policy(&self, update: &PolicyUpdate) -> anyhow::Result<()> {
        let args = update_args(update);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let result: serde_json::Value = self.call(&args).await?;
        match result.get("failed_updates").and_then(|f| f.as_array()) {
            Some(failed) if !failed.is_empty() => {
                anyhow::bail!("Policy update for {} failed: {}", update.chan_point, result)
            }
            _ => Ok(()),
        }
    }
}
