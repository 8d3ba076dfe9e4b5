use std::env;
use std::net::SocketAddr;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

use crate::engine::LockConfig;

pub struct Config {
    pub bind_addr: SocketAddr,
    pub lock_max_attempts: u32,
    pub lock_base_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3001))),
            lock_max_attempts: env::var("LOCK_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6),
            lock_base_delay_ms: env::var("LOCK_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(40),
        }
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            max_attempts: self.lock_max_attempts,
            base_delay: Duration::from_millis(self.lock_base_delay_ms),
        }
    }
}
