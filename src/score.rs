use anyhow::Context;
use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::ScoreConfig;

const TERMINAL_REFERER: &str = "https://terminal.lightning.engineering/";

/// Reputation score source, queried one node at a time.
#[async_trait::async_trait]
pub trait ScoreService: Send + Sync {
    /// `Ok(None)` means the service has no score for this node.
    async fn lookup(&self, pubkey: &str) -> anyhow::Result<Option<i64>>;

    /// Peers rated as good routing partners of `local_pubkey`.
    async fn good_peers(&self, local_pubkey: &str) -> anyhow::Result<GoodPeers>;
}

/// Scores for the nodes in one report. Missing entries are unknown, not zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreTable {
    scores: HashMap<String, i64>,
}

impl ScoreTable {
    pub fn get(&self, pubkey: &str) -> Option<i64> {
        self.scores.get(pubkey).copied()
    }

    pub fn insert(&mut self, pubkey: &str, score: i64) {
        self.scores.insert(pubkey.to_string(), score);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Look up every pubkey in turn.
    ///
    /// Any failure disables scoring for the whole run: the result is `None`
    /// rather than a partially filled table.
    pub async fn collect<'a, I>(service: &dyn ScoreService, pubkeys: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut table = Self::default();
        for pubkey in pubkeys {
            match service.lookup(pubkey).await {
                Ok(Some(score)) => table.insert(pubkey, score),
                Ok(None) => debug!("No score for {}", pubkey),
                Err(e) => {
                    warn!("Score lookup failed ({:#}), continuing without scores", e);
                    return None;
                }
            }
        }
        debug!("Collected {} node scores", table.len());
        Some(table)
    }
}

/// Peers the score service rates as good inbound or outbound partners of the
/// local node. A peer absent from both sets is simply not rated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoodPeers {
    pub inbound: HashSet<String>,
    pub outbound: HashSet<String>,
}

impl GoodPeers {
    pub fn is_good_inbound(&self, pubkey: &str) -> bool {
        self.inbound.contains(pubkey)
    }

    pub fn is_good_outbound(&self, pubkey: &str) -> bool {
        self.outbound.contains(pubkey)
    }

    /// Fetch the local node's good peers. A failure disables the column for
    /// the run, like a failed score lookup.
    pub async fn collect(service: &dyn ScoreService, local_pubkey: &str) -> Option<Self> {
        match service.good_peers(local_pubkey).await {
            Ok(peers) => {
                debug!(
                    "{} good inbound, {} good outbound peers",
                    peers.inbound.len(),
                    peers.outbound.len()
                );
                Some(peers)
            }
            Err(e) => {
                warn!("Good peer lookup failed ({:#}), continuing without them", e);
                None
            }
        }
    }
}

/// Lightning Terminal node pages.
pub struct TerminalScoreService {
    http: reqwest::Client,
    url_template: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TerminalPage {
    page_props: PageProps,
}

#[derive(Deserialize)]
struct PageProps {
    #[serde(default)]
    node: Option<TerminalNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TerminalNode {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, deserialize_with = "peer_set")]
    good_inbound_peers: HashSet<String>,
    #[serde(default, deserialize_with = "peer_set")]
    good_outbound_peers: HashSet<String>,
}

/// Pubkeys from either a list of strings or an object keyed by pubkey.
fn peer_set<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HashSet<String>, D::Error> {
    use serde_json::Value;
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Value::Object(map) => map.into_iter().map(|(key, _)| key).collect(),
        _ => HashSet::new(),
    })
}

impl TerminalScoreService {
    pub fn new(config: &ScoreConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build score service HTTP client")?;
        Ok(Self {
            http,
            url_template: config.url_template.clone(),
        })
    }

    fn url(&self, pubkey: &str) -> String {
        self.url_template.replace("{pubkey}", pubkey)
    }

    /// The node's page, or `None` when the service does not know the node.
    async fn page(&self, pubkey: &str) -> anyhow::Result<Option<TerminalPage>> {
        let resp = self
            .http
            .get(self.url(pubkey))
            .header(reqwest::header::REFERER, TERMINAL_REFERER)
            .send()
            .await
            .with_context(|| format!("Score request for {} failed", pubkey))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let page = resp
            .error_for_status()?
            .json()
            .await
            .context("Malformed score response")?;
        Ok(Some(page))
    }
}

#[async_trait::async_trait]
impl ScoreService for TerminalScoreService {
    async fn lookup(&self, pubkey: &str) -> anyhow::Result<Option<i64>> {
        Ok(self.page(pubkey).await?.and_then(parse_score))
    }

    async fn good_peers(&self, local_pubkey: &str) -> anyhow::Result<GoodPeers> {
        Ok(self
            .page(local_pubkey)
            .await?
            .map(parse_good_peers)
            .unwrap_or_default())
    }
}

/// A page without a node, or a node without a score, means no score.
fn parse_score(page: TerminalPage) -> Option<i64> {
    page.page_props
        .node
        .and_then(|n| n.score)
        .filter(|s| s.is_finite())
        .map(|s| s.round() as i64)
}

fn parse_good_peers(page: TerminalPage) -> GoodPeers {
    match page.page_props.node {
        Some(node) => GoodPeers {
            inbound: node.good_inbound_peers,
            outbound: node.good_outbound_peers,
        },
        None => GoodPeers::default(),
    }
}

// ---------------------------------------------------------------------------
// Mock score service for testing
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    pub struct MockScoreService {
        pub scores: HashMap<String, i64>,
        pub good_peers: GoodPeers,
        /// Lookups of this pubkey fail.
        pub fail_on: Option<String>,
        pub lookups: Arc<Mutex<Vec<String>>>,
    }

    impl MockScoreService {
        pub fn new() -> Self {
            Self {
                scores: HashMap::new(),
                good_peers: GoodPeers::default(),
                fail_on: None,
                lookups: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn with_score(mut self, pubkey: &str, score: i64) -> Self {
            self.scores.insert(pubkey.to_string(), score);
            self
        }
    }

    #[async_trait::async_trait]
    impl ScoreService for MockScoreService {
        async fn lookup(&self, pubkey: &str) -> anyhow::Result<Option<i64>> {
            self.lookups.lock().unwrap().push(pubkey.to_string());
            if self.fail_on.as_deref() == Some(pubkey) {
                anyhow::bail!("connection refused");
            }
            Ok(self.scores.get(pubkey).copied())
        }

        async fn good_peers(&self, local_pubkey: &str) -> anyhow::Result<GoodPeers> {
            self.lookups
                .lock()
                .unwrap()
                .push(format!("peers:{}", local_pubkey));
            if self.fail_on.as_deref() == Some(local_pubkey) {
                anyhow::bail!("connection refused");
            }
            Ok(self.good_peers.clone())
        }
    }
}
