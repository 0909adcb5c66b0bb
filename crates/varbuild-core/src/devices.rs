//! GPU device discovery
//!
//! Seeds the planner's device pool from `nvidia-smi -L`. MIG instances are
//! preferred over whole GPUs when the listing contains any.

use regex::Regex;
use std::sync::OnceLock;
use tokio::process::Command;

fn gpu_regex() -> &'static Regex {
    static GPU: OnceLock<Regex> = OnceLock::new();
    GPU.get_or_init(|| {
        Regex::new(r"(?m)^GPU (\d+):")
            .unwrap_or_else(|e| unreachable!("gpu pattern is valid: {e}"))
    })
}

fn mig_regex() -> &'static Regex {
    static MIG: OnceLock<Regex> = OnceLock::new();
    MIG.get_or_init(|| {
        Regex::new(r"\(UUID: (MIG-[A-Za-z0-9\-/]+)\)")
            .unwrap_or_else(|e| unreachable!("mig pattern is valid: {e}"))
    })
}

/// Extract device identifiers from `nvidia-smi -L` output
///
/// Returns MIG UUIDs if the listing has any, else GPU indices.
#[must_use]
pub fn parse_gpu_listing(listing: &str) -> Vec<String> {
    let migs: Vec<String> = mig_regex()
        .captures_iter(listing)
        .map(|cap| cap[1].to_string())
        .collect();
    if !migs.is_empty() {
        return migs;
    }
    gpu_regex()
        .captures_iter(listing)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Query the host for GPU devices
///
/// An absent or failing `nvidia-smi` yields an empty pool.
pub async fn discover_gpu_devices() -> Vec<String> {
    match Command::new("nvidia-smi").arg("-L").output().await {
        Ok(output) if output.status.success() => {
            let devices = parse_gpu_listing(&String::from_utf8_lossy(&output.stdout));
            tracing::info!(count = devices.len(), "gpu devices discovered");
            devices
        }
        Ok(output) => {
            tracing::warn!(status = %output.status, "nvidia-smi failed, no devices assigned");
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "nvidia-smi unavailable, no devices assigned");
            Vec::new()
        }
    }
}
