pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod model;
pub mod registry;
pub mod security;
pub mod server;
pub mod storage;
