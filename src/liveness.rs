//! Node liveness: is the configured RPC endpoint up, and is it the chain
//! we expect?

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, VaultError};
use crate::scheduler::{Scheduler, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LivenessStatus {
    /// No conclusive probe yet.
    Checking,
    Running,
    WrongChain { chain_id: u64 },
    Unreachable,
}

// ── Probe ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

/// Raw `eth_chainId` over HTTP.
#[derive(Clone)]
pub struct LivenessProbe {
    client: reqwest::Client,
    url: String,
}

impl LivenessProbe {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("yds-flow/0.1")
            .build()
            .map_err(|e| VaultError::RpcUnreachable(e.to_string()))?;
        Ok(LivenessProbe {
            client,
            url: url.to_string(),
        })
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_chainId",
            "params": [],
            "id": 1,
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VaultError::RpcUnreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VaultError::RpcUnreachable(format!("HTTP {}", resp.status())));
        }
        let parsed: RpcResponse = resp
            .json()
            .await
            .map_err(|e| VaultError::RpcUnreachable(format!("bad JSON-RPC response: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(VaultError::RpcUnreachable(err.to_string()));
        }
        let hex = parsed
            .result
            .ok_or_else(|| VaultError::RpcUnreachable("empty eth_chainId result".into()))?;
        parse_chain_id(&hex)
    }
}

/// `"0x7a69"` → 31337.
pub fn parse_chain_id(hex: &str) -> Result<u64> {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .ok_or_else(|| VaultError::RpcUnreachable(format!("chain id not hex: {hex}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| VaultError::RpcUnreachable(format!("chain id not hex: {hex}")))
}

// ── Monitor ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct MonitorState {
    status: LivenessStatus,
    consecutive_failures: u32,
}

/// Folds probe results into a [`LivenessStatus`]. A failed probe only turns
/// into `Unreachable` after `threshold` failures in a row.
pub struct LivenessMonitor {
    expected: u64,
    threshold: u32,
    state: Mutex<MonitorState>,
}

impl LivenessMonitor {
    pub fn new(expected: u64, threshold: u32) -> Self {
        LivenessMonitor {
            expected,
            threshold: threshold.max(1),
            state: Mutex::new(MonitorState {
                status: LivenessStatus::Checking,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn status(&self) -> LivenessStatus {
        self.state.lock().status
    }

    pub fn record(&self, probe: Result<u64>) -> LivenessStatus {
        let mut state = self.state.lock();
        let previous = state.status;
        match probe {
            Ok(id) => {
                state.consecutive_failures = 0;
                state.status = if id == self.expected {
                    LivenessStatus::Running
                } else {
                    LivenessStatus::WrongChain { chain_id: id }
                };
            }
            Err(e) => {
                state.consecutive_failures += 1;
                debug!(failures = state.consecutive_failures, error = %e, "liveness probe failed");
                if state.consecutive_failures >= self.threshold {
                    state.status = LivenessStatus::Unreachable;
                }
            }
        }
        if state.status != previous {
            match state.status {
                LivenessStatus::Running => info!(chain_id = self.expected, "node running"),
                LivenessStatus::WrongChain { chain_id } => {
                    warn!(chain_id, expected = self.expected, "node is on the wrong chain")
                }
                LivenessStatus::Unreachable => warn!("node unreachable"),
                LivenessStatus::Checking => {}
            }
        }
        state.status
    }

    /// Probe now and then every `interval` for as long as the returned
    /// subscription lives.
    pub fn start(
        self: &Arc<Self>,
        probe: LivenessProbe,
        scheduler: &Scheduler,
        interval: Duration,
    ) -> Subscription {
        let monitor = self.clone();
        scheduler.every("liveness", interval, move || {
            let monitor = monitor.clone();
            let probe = probe.clone();
            async move {
                monitor.record(probe.chain_id().await);
            }
        })
    }
}
