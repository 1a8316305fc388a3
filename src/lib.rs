pub mod config;
pub mod dispatch;
pub mod doctor;
pub mod engine;
mod logging;
pub mod monitor;
pub mod protocol;
pub mod session;
pub mod speech;
pub mod storage;
mod telemetry;
pub mod transcript;
pub mod transport;

pub use logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
