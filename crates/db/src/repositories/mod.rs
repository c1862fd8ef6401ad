//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod channel_threshold_repo;
pub mod email_config_repo;
pub mod measurement_repo;

pub use channel_threshold_repo::ChannelThresholdRepo;
pub use email_config_repo::EmailConfigRepo;
pub use measurement_repo::MeasurementRepo;
