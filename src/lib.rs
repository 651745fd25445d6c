// src/lib.rs
pub mod address;
pub mod config;
pub mod runtime_dir;
pub mod tls;

#[cfg(unix)]
pub mod listeners;
#[cfg(unix)]
pub mod server;
