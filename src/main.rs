mod app;
mod backend;
mod config;
mod error;
mod fees;
mod model;
mod report;
mod score;
mod state;

use clap::Parser;
use config::Config;
use log::{debug, warn};
use std::path::PathBuf;

use crate::app::{RunOptions, RunOutcome};
use crate::backend::BackendKind;
use crate::fees::FeeRequest;
use crate::report::format::{ColorMode, Painter};
use crate::report::{ChannelFilter, ReportOptions};
use crate::score::{ScoreService, TerminalScoreService};

#[derive(Parser)]
#[command(name = "lnreport", about = "Channel report for Lightning node operators")]
struct Cli {
    /// Path to lnreport.toml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Set base fee (msat)
    #[arg(long, default_value_t = 0)]
    base_fee: u64,
    /// Set fee rate (ppm); 0 leaves fees untouched
    #[arg(long, default_value_t = 0)]
    fee_rate: u64,
    /// Fee spread
    #[arg(long)]
    fee_spread: Option<f64>,
    /// Set time lock delta
    #[arg(long)]
    time_lock_delta: Option<u32>,

    /// Type of LN client
    #[arg(long, value_enum, ignore_case = true)]
    client: Option<BackendKind>,
    /// Extra arguments to pass to client RPC
    #[arg(long, allow_hyphen_values = true)]
    client_args: Vec<String>,

    /// Show (estimate of) remote fees
    #[arg(long)]
    show_remote_fees: bool,
    /// Show node scores (from Lightning Terminal)
    #[arg(long)]
    show_scores: bool,
    /// Show good inbound/outbound peers (from Lightning Terminal)
    #[arg(long)]
    show_good_peers: bool,
    /// Show channel ids
    #[arg(long)]
    show_chan_ids: bool,
    /// Show forwarding counts and success percentages (CLN)
    #[arg(long)]
    show_forwarding_stats: bool,
    /// Show min and max htlc
    #[arg(long)]
    show_minmax_htlc: bool,
    /// Show if channel is disabled
    #[arg(long)]
    show_disabled: bool,
    /// Which channels to select/show
    #[arg(long, value_enum, ignore_case = true)]
    channels: Option<ChannelFilter>,

    /// Logging level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
    /// Terminal colour
    #[arg(long, value_enum)]
    color: Option<ColorMode>,
}

impl Cli {
    /// Layer command-line values over the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(color) = self.color {
            config.general.color = color;
        }
        if let Some(client) = self.client {
            config.backend.client = client;
        }
        config
            .backend
            .client_args
            .extend(self.client_args.iter().cloned());
        if let Some(spread) = self.fee_spread {
            config.fees.fee_spread = spread;
        }
        if let Some(delta) = self.time_lock_delta {
            config.fees.time_lock_delta = delta;
        }

        let display = &mut config.display;
        display.show_remote_fees |= self.show_remote_fees;
        display.show_scores |= self.show_scores;
        display.show_good_peers |= self.show_good_peers;
        display.show_chan_ids |= self.show_chan_ids;
        display.show_forwarding_stats |= self.show_forwarding_stats;
        display.show_minmax_htlc |= self.show_minmax_htlc;
        display.show_disabled |= self.show_disabled;
        if let Some(channels) = self.channels {
            display.channels = channels;
        }
    }

    fn run_options(&self, config: &Config) -> RunOptions {
        RunOptions {
            fees: FeeRequest {
                base_fee: self.base_fee,
                fee_rate: self.fee_rate,
                fee_spread: config.fees.fee_spread,
                time_lock_delta: config.fees.time_lock_delta,
            },
            report: ReportOptions {
                toggles: config.display.toggles(),
                filter: config.display.channels,
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::discover(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(
            config
                .general
                .log_level
                .parse()
                .unwrap_or(log::LevelFilter::Warn),
        )
        .format_timestamp_secs()
        .init();

    debug!("lnreport v{} starting", env!("CARGO_PKG_VERSION"));

    let backend = backend::build(&config)?;
    let options = cli.run_options(&config);

    let toggles = &options.report.toggles;
    let score_service = if toggles.show_scores || toggles.show_good_peers {
        match TerminalScoreService::new(&config.score) {
            Ok(service) => Some(service),
            Err(e) => {
                warn!("{:#}, continuing without Lightning Terminal data", e);
                None
            }
        }
    } else {
        None
    };

    let painter = Painter::for_stdout(config.general.color);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let outcome = app::run(
        &options,
        backend.as_ref(),
        score_service.as_ref().map(|s| s as &dyn ScoreService),
        &painter,
        &mut out,
    )
    .await?;

    if outcome == RunOutcome::NoChannels {
        debug!("Nothing to report");
    }
    Ok(())
}
