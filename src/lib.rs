pub mod calibration;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod filter;
pub mod phase;
pub mod recorder;
pub mod samplelog;
pub mod sampler;
pub mod session;
pub mod source;
pub mod status;
pub mod traits;
