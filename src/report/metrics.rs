//! Per-channel values derived from a raw channel record.

use chrono::{DateTime, Utc};

use super::format::{div_round_half_even, thousands, PLACEHOLDER};
use crate::error::ReportError;
use crate::model::Channel;

/// Number of units in the inbound/outbound bar.
pub const BAR_WIDTH: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    /// Fraction of usable capacity held locally.
    pub outbound_ratio: f64,
    pub send_units: u64,
    pub recv_units: u64,
    /// `None` renders as "n/a".
    pub uptime_percent: Option<u64>,
    /// `None` when the channel never forwarded.
    pub days_since_forward: Option<f64>,
}

/// Derive display metrics for one channel as of `now`.
pub fn derive(channel: &Channel, now: DateTime<Utc>) -> Result<DerivedMetrics, ReportError> {
    let usable = usable_capacity(channel)?;
    let send_units =
        div_round_half_even(BAR_WIDTH * channel.local_balance, usable).min(BAR_WIDTH);

    Ok(DerivedMetrics {
        outbound_ratio: channel.local_balance as f64 / usable as f64,
        send_units,
        recv_units: BAR_WIDTH - send_units,
        uptime_percent: uptime_percent(channel.uptime, channel.lifetime),
        days_since_forward: days_since(channel.last_forward, now),
    })
}

pub fn usable_capacity(channel: &Channel) -> Result<u64, ReportError> {
    channel.usable_capacity().ok_or_else(|| ReportError::Division {
        chan_id: channel.chan_id.clone(),
        capacity: channel.capacity,
        commit_fee: channel.commit_fee,
    })
}

/// Floor of `100 * uptime / lifetime`.
pub fn uptime_percent(uptime: Option<u64>, lifetime: Option<u64>) -> Option<u64> {
    match (uptime, lifetime) {
        (Some(up), Some(life)) if life > 0 => Some(100 * up / life),
        _ => None,
    }
}

fn days_since(last_forward: Option<i64>, now: DateTime<Utc>) -> Option<f64> {
    let then = DateTime::from_timestamp(last_forward.filter(|ts| *ts > 0)?, 0)?;
    Some((now - then).num_milliseconds() as f64 / 86_400_000.0)
}

pub fn format_days(days: Option<f64>) -> String {
    days.map_or_else(|| "never".to_string(), |d| format!("{:.1}", d))
}

/// Render an HTLC limit given in msat as sat, keeping any fractional part.
pub fn resolve_htlc(htlc_msat: Option<u64>) -> String {
    let Some(msat) = htlc_msat else {
        return PLACEHOLDER.to_string();
    };
    let sat = thousands(msat / 1000);
    match msat % 1000 {
        0 => sat,
        frac => {
            let frac = format!("{:03}", frac);
            format!("{}.{}", sat, frac.trim_end_matches('0'))
        }
    }
}

pub fn disabled_flag(disabled: Option<bool>) -> &'static str {
    match disabled {
        Some(true) => "y",
        Some(false) => "n",
        None => PLACEHOLDER,
    }
}
