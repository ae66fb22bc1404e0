use anyhow::Context;
use async_trait::async_trait;
use hex::DisplayHex;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::lnd::{
    ChannelEdge, ForwardingHistory, GetInfo, ListChannels, LndTransport, NodeInfo, PolicyUpdate,
};
use crate::config::LndRestConfig;

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";
const HISTORY_SECS: i64 = 10 * 365 * 24 * 3600;

/// LND reached through its REST gateway.
pub struct RestTransport {
    http: reqwest::Client,
    base_url: String,
    macaroon: String,
}

#[derive(Debug, Serialize)]
struct SwitchRequest {
    start_time: String,
    end_time: String,
    index_offset: u32,
    num_max_events: u32,
}

#[derive(Debug, Serialize, PartialEq)]
struct ChannelPoint {
    funding_txid_str: String,
    output_index: u32,
}

#[derive(Debug, Serialize, PartialEq)]
struct PolicyUpdateRequest {
    chan_point: ChannelPoint,
    base_fee_msat: String,
    fee_rate_ppm: u64,
    time_lock_delta: u32,
}

impl RestTransport {
    pub fn new(config: &LndRestConfig) -> anyhow::Result<Self> {
        let macaroon = std::fs::read(&config.macaroon_path).with_context(|| {
            format!("Failed to read macaroon {}", config.macaroon_path.display())
        })?;

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(path) = &config.tls_cert_path {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read TLS cert {}", path.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("Invalid TLS cert {}", path.display()))?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            http: builder.build().context("Failed to build LND REST client")?,
            base_url: config.url.trim_end_matches('/').to_string(),
            macaroon: macaroon.as_slice().to_lower_hex_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        debug!("GET {}", path);
        let resp = self
            .http
            .get(self.url(path))
            .header(MACAROON_HEADER, &self.macaroon)
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;
        resp.error_for_status()?
            .json()
            .await
            .with_context(|| format!("Malformed response from {}", path))
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        debug!("POST {}", path);
        let resp = self
            .http
            .post(self.url(path))
            .header(MACAROON_HEADER, &self.macaroon)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        resp.error_for_status()?
            .json()
            .await
            .with_context(|| format!("Malformed response from {}", path))
    }
}

fn switch_request(now: i64, index_offset: u32, max_events: u32) -> SwitchRequest {
    SwitchRequest {
        start_time: (now - HISTORY_SECS).max(0).to_string(),
        end_time: now.to_string(),
        index_offset,
        num_max_events: max_events,
    }
}

fn policy_request(update: &PolicyUpdate) -> anyhow::Result<PolicyUpdateRequest> {
    let (txid, index) = update
        .chan_point
        .split_once(':')
        .with_context(|| format!("Malformed channel point {}", update.chan_point))?;
    let output_index = index
        .parse()
        .with_context(|| format!("Malformed channel point {}", update.chan_point))?;
    Ok(PolicyUpdateRequest {
        chan_point: ChannelPoint {
            funding_txid_str: txid.to_string(),
            output_index,
        },
        base_fee_msat: update.base_fee_msat.to_string(),
        fee_rate_ppm: update.fee_rate_ppm,
        time_lock_delta: update.time_lock_delta,
    })
}

#[async_trait]
impl LndTransport for RestTransport {
    async fn get_info(&self) -> anyhow::Result<GetInfo> {
        self.get("/v1/getinfo").await
    }

    async fn list_channels(&self) -> anyhow::Result<ListChannels> {
        self.get("/v1/channels").await
    }

    async fn chan_info(&self, chan_id: &str) -> anyhow::Result<ChannelEdge> {
        self.get(&format!("/v1/graph/edge/{}", chan_id)).await
    }

    async fn node_info(&self, pub_key: &str) -> anyhow::Result<NodeInfo> {
        self.get(&format!("/v1/graph/node/{}", pub_key)).await
    }

    async fn forwarding_history(
        &self,
        index_offset: u32,
        max_events: u32,
    ) -> anyhow::Result<ForwardingHistory> {
        let body = switch_request(chrono::Utc::now().timestamp(), index_offset, max_events);
        self.post("/v1/switch", &body).await
    }

    async fn update_chan_policy(&self, update: &PolicyUpdate) -> anyhow::Result<()> {
        let body = policy_request(update)?;
        let result: serde_json::Value = self.post("/v1/chanpolicy", &body).await?;
        match result.get("failed_updates").and_then(|f| f.as_array()) {
            Some(failed) if !failed.is_empty() => {
                anyhow::bail!("Policy update for {} failed: {}", update.chan_point, result)
            }
            _ => Ok(()),
        }
    }
}
