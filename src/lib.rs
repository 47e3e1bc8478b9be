pub mod auth;
pub mod backend;
pub mod cluster;
pub mod command;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod http;
pub mod metrics;
pub mod oplog;
pub mod proxy;
pub mod render;
pub mod session;
pub mod version;
