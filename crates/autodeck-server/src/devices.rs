//! ADB device management (thin shell over the adb binary).

use serde_json::{json, Value};
use tokio::process::Command;

use crate::error::ApiError;

/// Connected device serials (`adb devices`, state `device` only).
pub async fn list_devices(adb_path: &str) -> Result<Vec<String>, ApiError> {
    let output = Command::new(adb_path)
        .arg("devices")
        .output()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to execute adb: {e}")))?;

    let text = String::from_utf8_lossy(&output.stdout);
    let devices = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices attached"))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect();
    Ok(devices)
}

/// PNG screenshot of one device via `adb exec-out screencap -p`.
pub async fn screenshot(adb_path: &str, device_id: &str) -> Result<Vec<u8>, ApiError> {
    let output = Command::new(adb_path)
        .args(["-s", device_id, "exec-out", "screencap", "-p"])
        .output()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("screenshot failed: {e}")))?;

    if !output.status.success() {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "screenshot failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(output.stdout)
}

/// Whether the adb server answers `get-state`.
pub async fn adb_status(adb_path: &str) -> Value {
    match Command::new(adb_path).arg("get-state").output().await {
        Ok(output) if output.status.success() => {
            json!({"status": "running", "details": "adb responded to get-state"})
        }
        Ok(_) => json!({"status": "stopped", "details": "adb server not responding"}),
        Err(e) => json!({"status": "stopped", "details": format!("adb not available: {e}")}),
    }
}

pub async fn start_adb(adb_path: &str) -> Result<(), ApiError> {
    run_adb(adb_path, &["start-server"]).await
}

pub async fn stop_adb(adb_path: &str) -> Result<(), ApiError> {
    run_adb(adb_path, &["kill-server"]).await
}

async fn run_adb(adb_path: &str, args: &[&str]) -> Result<(), ApiError> {
    let status = Command::new(adb_path)
        .args(args)
        .status()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to execute adb: {e}")))?;
    if !status.success() {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "adb {} failed with {status}",
            args.join(" ")
        )));
    }
    Ok(())
}

/// Run an arbitrary `adb <args>` command and return its combined output.
pub async fn adb_command(adb_path: &str, command: &str) -> Result<String, ApiError> {
    let args: Vec<&str> = command.split_whitespace().collect();
    if args.is_empty() {
        return Err(ApiError::Validation("command is required".into()));
    }

    let output = Command::new(adb_path)
        .args(&args)
        .output()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to execute adb: {e}")))?;

    let mut result = String::from_utf8_lossy(&output.stdout).to_string();
    result.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        result.push_str(&format!("\nError: {}", output.status));
    }
    Ok(result)
}
