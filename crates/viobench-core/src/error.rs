use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Unknown metric '{0}', expected one of MAE, RMSE, average")]
    UnknownMetric(String),

    #[error("Timestamps must be non-decreasing: sample {index} at {time}s follows {previous}s")]
    UnorderedTimestamps {
        index: usize,
        time: f64,
        previous: f64,
    },

    #[error("Length mismatch: {times} timestamps but {positions} positions")]
    LengthMismatch { times: usize, positions: usize },
}

pub type Result<T> = core::result::Result<T, CoreError>;
