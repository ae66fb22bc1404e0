use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::BackendKind;
use crate::report::format::ColorMode;
use crate::report::schema::Toggles;
use crate::report::ChannelFilter;

pub const DEFAULT_CONFIG_PATH: &str = "lnreport.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub lnd_rest: LndRestConfig,
    #[serde(default)]
    pub score: ScoreConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub fees: FeesConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Terminal colour: auto, always or never
    #[serde(default)]
    pub color: ColorMode,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Node implementation: lnd, c-lightning or lnd-rest
    #[serde(default)]
    pub client: BackendKind,
    /// Extra arguments passed to every client call
    #[serde(default)]
    pub client_args: Vec<String>,
    #[serde(default = "default_lncli_path")]
    pub lncli_path: String,
    #[serde(default = "default_lightning_cli_path")]
    pub lightning_cli_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LndRestConfig {
    /// REST endpoint including scheme
    #[serde(default = "default_lnd_rest_url")]
    pub url: String,
    #[serde(default = "default_macaroon_path")]
    pub macaroon_path: PathBuf,
    /// LND's self-signed certificate, added as a trusted root
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,
    /// Skip certificate verification entirely
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ScoreConfig {
    /// Node page URL; `{pubkey}` is replaced per lookup
    #[serde(default = "default_score_url_template")]
    pub url_template: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub show_remote_fees: bool,
    #[serde(default)]
    pub show_scores: bool,
    /// Mark peers Lightning Terminal rates as good inbound/outbound
    #[serde(default)]
    pub show_good_peers: bool,
    #[serde(default)]
    pub show_chan_ids: bool,
    #[serde(default)]
    pub show_forwarding_stats: bool,
    #[serde(default)]
    pub show_minmax_htlc: bool,
    #[serde(default)]
    pub show_disabled: bool,
    /// Which channels to show: all, public, private or split
    #[serde(default)]
    pub channels: ChannelFilter,
}

#[derive(Debug, Deserialize)]
pub struct FeesConfig {
    #[serde(default = "default_time_lock_delta")]
    pub time_lock_delta: u32,
    #[serde(default)]
    pub fee_spread: f64,
}

// Default value functions
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_lncli_path() -> String {
    "lncli".to_string()
}
fn default_lightning_cli_path() -> String {
    "lightning-cli".to_string()
}
fn default_lnd_rest_url() -> String {
    "https://localhost:8080".to_string()
}
fn default_macaroon_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".lnd/data/chain/bitcoin/mainnet/admin.macaroon")
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_score_url_template() -> String {
    "https://terminal.lightning.engineering/_next/data/a47c92e1/{pubkey}.json?pubkey={pubkey}"
        .to_string()
}
fn default_time_lock_delta() -> u32 {
    40
}

// Default implementations
impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            color: ColorMode::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            client: BackendKind::default(),
            client_args: Vec::new(),
            lncli_path: default_lncli_path(),
            lightning_cli_path: default_lightning_cli_path(),
        }
    }
}

impl Default for LndRestConfig {
    fn default() -> Self {
        Self {
            url: default_lnd_rest_url(),
            macaroon_path: default_macaroon_path(),
            tls_cert_path: None,
            accept_invalid_certs: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            url_template: default_score_url_template(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            time_lock_delta: default_time_lock_delta(),
            fee_spread: 0.0,
        }
    }
}

impl DisplayConfig {
    pub fn toggles(&self) -> Toggles {
        Toggles {
            show_disabled: self.show_disabled,
            show_minmax_htlc: self.show_minmax_htlc,
            show_forwarding_stats: self.show_forwarding_stats,
            show_remote_fees: self.show_remote_fees,
            show_scores: self.show_scores,
            show_good_peers: self.show_good_peers,
            show_chan_ids: self.show_chan_ids,
        }
    }
}

impl LndRestConfig {
    /// Apply `url=`, `macaroon=` and `cert=` client arguments.
    pub fn with_client_args(&self, args: &[String]) -> anyhow::Result<Self> {
        let mut config = self.clone();
        for arg in args {
            let Some((key, value)) = arg.split_once('=') else {
                anyhow::bail!("lnd-rest client argument must be key=value, got {:?}", arg);
            };
            match key {
                "url" => config.url = value.to_string(),
                "macaroon" => config.macaroon_path = PathBuf::from(value),
                "cert" => config.tls_cert_path = Some(PathBuf::from(value)),
                _ => anyhow::bail!("Unknown lnd-rest client argument {:?}", key),
            }
        }
        Ok(config)
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicitly given file, or the default file if it exists.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.fees.fee_spread.is_finite() || self.fees.fee_spread < 0.0 {
            anyhow::bail!(
                "fee_spread ({}) must be a non-negative number",
                self.fees.fee_spread
            );
        }
        if self.fees.time_lock_delta == 0 {
            anyhow::bail!("time_lock_delta must be positive");
        }
        if !self.score.url_template.contains("{pubkey}") {
            anyhow::bail!(
                "score url_template ({}) must contain {{pubkey}}",
                self.score.url_template
            );
        }
        if self.score.timeout_secs == 0 {
            anyhow::bail!("score timeout_secs must be positive");
        }
        if self.lnd_rest.timeout_secs == 0 {
            anyhow::bail!("lnd_rest timeout_secs must be positive");
        }
        Ok(())
    }
}
