pub mod archive;
pub mod backend;
pub mod buildcfg;
pub mod cipd;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod http;
pub mod manifest;
pub mod package;
pub mod platform;
pub mod runtime;
pub mod stamp;
pub mod verify;
