//! Intercepting proxy front-end
//!
//! [`ProxyServer`] accepts client connections (plain TCP or TLS-terminated)
//! and hands each one to a [`ConnectionHandler`], which dials the target and
//! runs a relay session between the two.

mod config;
mod handler;
mod server;

pub use config::{resolve_listen_addr, resolve_target, ConfigError, ProxyConfig, TargetTls};
pub use handler::ConnectionHandler;
pub use server::{ProxyServer, ProxyServerError};
