//! CLI command implementations

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::http_server::{Server, ServerConfig};
use crate::storage::{Journal, JournalOp};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Start {
            config,
            addr,
            force_patch,
            data_dir,
        } => {
            let config = resolve_config(config.as_deref(), addr.as_deref(), force_patch, data_dir)?;
            start(config)
        }
        Command::Verify { data_dir } => verify(&data_dir),
    }
}

/// Merge the optional config file with command-line overrides.
pub fn resolve_config(
    path: Option<&Path>,
    addr: Option<&str>,
    force_patch: Option<bool>,
    data_dir: Option<std::path::PathBuf>,
) -> CliResult<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(addr) = addr {
        config.set_addr(addr)?;
    }
    if let Some(force_patch) = force_patch {
        config.force_patch = force_patch;
    }
    if data_dir.is_some() {
        config.data_dir = data_dir;
    }

    config.validate()?;
    Ok(config)
}

/// Start the server and block until it is closed.
pub fn start(config: ServerConfig) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let addr = config.socket_addr()?;
        let server = Server::new(config)?;
        server.start(addr).await?;
        server.wait_close().await?;
        info!("Server stopped");
        Ok::<(), CliError>(())
    })
}

#[derive(Debug, Serialize)]
struct VerifyReport {
    records: usize,
    puts: usize,
    deletes: usize,
    live_keys: usize,
}

/// Replay the journal in `data_dir` and print a summary as JSON.
pub fn verify(data_dir: &Path) -> CliResult<()> {
    let records = Journal::replay(data_dir)?;
    let puts = records.iter().filter(|r| r.op == JournalOp::Put).count();

    let mut live = std::collections::HashSet::new();
    for record in &records {
        match record.op {
            JournalOp::Put => live.insert(record.key.as_str()),
            JournalOp::Delete => live.remove(record.key.as_str()),
        };
    }

    let report = VerifyReport {
        records: records.len(),
        puts,
        deletes: records.len() - puts,
        live_keys: live.len(),
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::io_error(format!("JSON error: {}", e)))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flags_override_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 9000, "force_patch": true}}"#).unwrap();

        let config = resolve_config(Some(file.path()), Some("127.0.0.1:7000"), Some(false), None)
            .unwrap();
        assert_eq!(config.port, 7000);
        assert!(!config.force_patch);
    }

    #[test]
    fn test_bad_addr_is_config_error() {
        let err = resolve_config(None, Some("nowhere"), None, None).unwrap_err();
        assert_eq!(err.code(), &crate::cli::CliErrorCode::ConfigError);
    }

    #[test]
    fn test_verify_empty_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(verify(dir.path()).is_ok());
    }
}
