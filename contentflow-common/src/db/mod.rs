//! Database connection helpers shared by ContentFlow services

pub mod init;

pub use init::{init_database_pool, init_memory_pool};
