pub mod block_store;
pub mod drag;
pub mod error;
pub mod models;
pub mod overlap;
pub mod ranking;
pub mod scheduler;
pub mod time_math;
pub mod today;
