pub mod abi;
pub mod config;
mod error;
pub mod estimator;
pub mod extension;
mod factory;
pub mod rtt;

pub use config::ExtensionConfig;
pub use error::LoadError;
pub use estimator::{DefaultVideoTimingEstimator, VideoTimingEstimator};
pub use factory::{create_estimator, EstimatorHandle, EstimatorOrigin};
