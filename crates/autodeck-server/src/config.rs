//! Server configuration from environment variables and `.env`.

use autodeck_process::ExecutorCommand;
use std::path::PathBuf;

/// Runtime configuration for the server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address.
    pub bind_addr: String,
    /// Root directory holding scripts, assets and the bridge script.
    pub core_path: PathBuf,
    /// How script runs are started.
    pub executor: ExecutorCommand,
    /// Interpreter used to start the bridge companion process.
    pub bridge_program: String,
    /// Arguments for the bridge process (entry script path included).
    pub bridge_args: Vec<String>,
    /// Path to the adb binary.
    pub adb_path: String,
}

impl ServerConfig {
    /// Load configuration, preferring environment variables over `.env`.
    ///
    /// Executor mode selection: when a bundled `script-engine` binary sits
    /// next to the core directory it is used directly (release mode),
    /// otherwise the configured interpreter runs the entry script
    /// (development mode).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let bind_addr =
            std::env::var("AUTODECK_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let core_path = PathBuf::from(
            std::env::var("AUTODECK_CORE_PATH").unwrap_or_else(|_| "core".to_string()),
        );
        let interpreter =
            std::env::var("AUTODECK_PYTHON").unwrap_or_else(|_| "python".to_string());
        let adb_path = std::env::var("AUTODECK_ADB_PATH").unwrap_or_else(|_| "adb".to_string());

        let sidecar_name = if cfg!(windows) {
            "script-engine.exe"
        } else {
            "script-engine"
        };
        let sidecar = core_path.join(sidecar_name);

        let executor = if sidecar.is_file() {
            ExecutorCommand::binary(sidecar.to_string_lossy().to_string())
                .with_work_dir(&core_path)
        } else {
            ExecutorCommand::interpreter(interpreter.clone(), "entry.py")
                .with_work_dir(&core_path)
        };

        let bridge_script = core_path.join("workflow_bridge.py");
        let bridge_args = vec!["-u".to_string(), bridge_script.to_string_lossy().to_string()];

        Self {
            bind_addr,
            core_path,
            executor,
            bridge_program: interpreter,
            bridge_args,
            adb_path,
        }
    }

    /// Human-readable executor mode, for startup logging.
    pub fn executor_mode(&self) -> &'static str {
        if self.executor.entry_script.is_some() {
            "development"
        } else {
            "release"
        }
    }
}
