pub mod block_repository;
pub mod command_log;
pub mod config;
pub mod error;
pub mod storage;
pub mod task_repository;
