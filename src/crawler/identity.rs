//! Outbound identity rotation
//!
//! The pool pairs the configured user agents and proxies by index and walks
//! through them with a shared cursor.

use crate::browser::Identity;
use crate::config::{IdentityConfig, RotationMode};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rotating pool of user agents and proxies
#[derive(Debug)]
pub struct IdentityPool {
    user_agents: Vec<String>,
    proxies: Vec<String>,
    mode: RotationMode,
    cursor: AtomicUsize,
}

impl IdentityPool {
    pub fn new(user_agents: Vec<String>, proxies: Vec<String>, mode: RotationMode) -> Self {
        Self {
            user_agents,
            proxies,
            mode,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(
            config.user_agents.clone(),
            config.proxies.clone(),
            config.rotate,
        )
    }

    pub fn mode(&self) -> RotationMode {
        self.mode
    }

    /// Number of distinct identities before the pool repeats
    pub fn len(&self) -> usize {
        self.user_agents.len().max(self.proxies.len()).max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.user_agents.is_empty() && self.proxies.is_empty()
    }

    /// The identity new contexts should use
    pub fn current(&self) -> Identity {
        self.at(self.cursor.load(Ordering::SeqCst))
    }

    /// Moves to the next identity and returns it
    pub fn rotate(&self) -> Identity {
        let next = self.cursor.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = self.at(next);
        if !self.is_empty() {
            tracing::info!("Rotated outbound identity to {}", identity);
        }
        identity
    }

    fn at(&self, index: usize) -> Identity {
        Identity {
            user_agent: pick(&self.user_agents, index),
            proxy: pick(&self.proxies, index),
        }
    }
}

fn pick(values: &[String], index: usize) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values[index % values.len()].clone())
    }
}
