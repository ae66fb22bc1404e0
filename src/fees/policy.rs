//! Fee policy pushed to the node: one base fee and fee rate for every
//! channel, with the rate skewed per channel by its balance.
//!
//! The skew uses the same exponential shape as a balance-based fee modder:
//! - 50% local balance: multiplier = 1.0
//! - all local (nothing to receive): multiplier = exp(-spread / 2), cheaper
//! - all remote (nothing to send): multiplier = exp(spread / 2), dearer
//!
//! With a spread of zero every channel gets exactly `fee_rate`.

use crate::model::Channel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeePolicy {
    /// Base fee in msat.
    pub base_fee: u64,
    /// Proportional fee in ppm.
    pub fee_rate: u64,
    pub fee_spread: f64,
    pub time_lock_delta: u32,
}

/// Fee terms for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFee {
    pub base_fee_msat: u64,
    pub fee_rate_ppm: u64,
    pub time_lock_delta: u32,
}

impl FeePolicy {
    pub fn new(base_fee: u64, fee_rate: u64, fee_spread: f64, time_lock_delta: u32) -> Self {
        Self {
            base_fee,
            fee_rate,
            fee_spread,
            time_lock_delta,
        }
    }

    /// Multiplier for a channel holding `our_ratio` of its usable capacity.
    pub fn coefficient(&self, our_ratio: f64) -> f64 {
        (self.fee_spread * (0.5 - our_ratio.clamp(0.0, 1.0))).exp()
    }

    pub fn calculate(&self, channel: &Channel) -> ChannelFee {
        let our_ratio = channel
            .usable_capacity()
            .map(|usable| channel.local_balance as f64 / usable as f64)
            .unwrap_or(0.5);
        let rate = (self.fee_rate as f64 * self.coefficient(our_ratio)).round() as u64;

        ChannelFee {
            base_fee_msat: self.base_fee,
            fee_rate_ppm: rate.max(1),
            time_lock_delta: self.time_lock_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_channel(capacity: u64, local: u64) -> Channel {
        Channel {
            capacity,
            local_balance: local,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_spread_is_flat() {
        let policy = FeePolicy::new(1_000, 50, 0.0, 40);
        for local in [0, 250_000, 500_000, 1_000_000] {
            let fee = policy.calculate(&make_channel(1_000_000, local));
            assert_eq!(
                fee,
                ChannelFee {
                    base_fee_msat: 1_000,
                    fee_rate_ppm: 50,
                    time_lock_delta: 40,
                }
            );
        }
    }

    #[test]
    fn test_spread_monotonic() {
        let policy = FeePolicy::new(0, 100, 2.0, 40);
        let rates: Vec<u64> = [0, 250_000, 500_000, 750_000, 1_000_000]
            .iter()
            .map(|local| policy.calculate(&make_channel(1_000_000, *local)).fee_rate_ppm)
            .collect();
        assert!(rates.windows(2).all(|w| w[0] > w[1]), "{:?}", rates);
        assert_eq!(rates[2], 100);
        // exp(1) and exp(-1)
        assert_eq!(rates[0], 272);
        assert_eq!(rates[4], 37);
    }

    #[test]
    fn test_rate_never_below_one_ppm() {
        let policy = FeePolicy::new(0, 1, 10.0, 40);
        assert_eq!(policy.calculate(&make_channel(1_000, 1_000)).fee_rate_ppm, 1);
    }

    #[test]
    fn test_broken_capacity_is_neutral() {
        let policy = FeePolicy::new(0, 100, 2.0, 40);
        let mut ch = make_channel(1_000, 0);
        ch.commit_fee = 1_000;
        assert_eq!(policy.calculate(&ch).fee_rate_ppm, 100);
    }
}
