use thiserror::Error;

/// Failures that abort a report run.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to fetch node state: {0:#}")]
    Backend(anyhow::Error),

    #[error("failed to apply fee policy: {0:#}")]
    PolicyApply(anyhow::Error),

    #[error(
        "channel {chan_id}: usable capacity is not positive \
         (capacity {capacity}, commit fee {commit_fee})"
    )]
    Division {
        chan_id: String,
        capacity: u64,
        commit_fee: u64,
    },

    #[error("failed to write report: {0}")]
    Output(#[from] std::io::Error),
}
