pub mod policy;

use crate::error::ReportError;
use crate::state::NodeSession;
use log::info;
pub use policy::FeePolicy;

/// Fee settings given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeRequest {
    pub base_fee: u64,
    pub fee_rate: u64,
    pub fee_spread: f64,
    pub time_lock_delta: u32,
}

impl FeeRequest {
    /// A policy is only requested when a non-zero fee rate was given.
    pub fn into_state(self) -> PolicyState {
        if self.fee_rate == 0 {
            return PolicyState::Idle;
        }
        PolicyState::PolicyRequested(FeePolicy::new(
            self.base_fee,
            self.fee_rate,
            self.fee_spread,
            self.time_lock_delta,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyState {
    Idle,
    PolicyRequested(FeePolicy),
    Applied(FeePolicy),
}

/// Drive a requested policy to `Applied`: push it, then refetch the node so
/// the report shows the fees the node now has.
pub async fn settle(
    state: PolicyState,
    session: &mut NodeSession<'_>,
) -> Result<PolicyState, ReportError> {
    let PolicyState::PolicyRequested(policy) = state else {
        return Ok(state);
    };

    info!(
        "Applying fee policy: base={}msat, rate={}ppm, spread={}, time_lock_delta={}",
        policy.base_fee, policy.fee_rate, policy.fee_spread, policy.time_lock_delta
    );
    session
        .backend()
        .apply_fee_policy(&policy)
        .await
        .map_err(ReportError::PolicyApply)?;

    session.refresh().await?;
    Ok(PolicyState::Applied(policy))
}
