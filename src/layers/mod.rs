//! Driver middleware / 驱动中间层
//!
//! A layer wraps a [`DriverBox`] in another driver with the same contract.
//! `Operator::layer` applies them bottom-up: the first layer added sits
//! right above the backend. Put `MetricsLayer` below `RetryLayer` to count
//! every retried attempt.

mod chaos;
mod concurrent_limit;
mod logging;
mod metrics;
mod retry;
mod timeout;

pub use chaos::ChaosLayer;
pub use concurrent_limit::ConcurrentLimitLayer;
pub use logging::LoggingLayer;
pub use metrics::{MetricsLayer, OperationStats, OperatorMetrics};
pub use retry::RetryLayer;
pub use timeout::TimeoutLayer;

use crate::storage::DriverBox;

/// Driver decorator / 驱动装饰器
pub trait Layer {
    fn layer(&self, inner: DriverBox) -> DriverBox;
}
