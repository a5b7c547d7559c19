//! Bot process management.
//!
//! Spawns corvid instances pointed at a scripted test server.

use std::process::{Child, Command};
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;

/// Render a minimal config pointing at the given loopback port.
pub fn config_for(port: u16) -> String {
    format!(
        r##"
[network]
host = "127.0.0.1"
port = {port}

[bot]
nick = "corvid"
superuser = "boss!*@*"
autoload = ["conn", "admin", "perms", "raw"]

[plugins.conn]
channels = ["#test"]
"##
    )
}

/// A running corvid process with its config on disk.
pub struct TestBot {
    child: Child,
    _dir: TempDir,
}

impl TestBot {
    /// Write the config to a temporary directory and spawn the corvid
    /// binary on it.
    pub fn spawn(config: &str) -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, config)?;

        let child = Command::new(env!("CARGO_BIN_EXE_corvid"))
            .arg(&config_path)
            .spawn()?;

        Ok(Self { child, _dir: dir })
    }

    /// Wait up to `dur` for the process to exit on its own.
    pub async fn wait_for_exit(&mut self, dur: Duration) -> anyhow::Result<bool> {
        let deadline = tokio::time::Instant::now() + dur;
        while tokio::time::Instant::now() < deadline {
            if self.child.try_wait()?.is_some() {
                return Ok(true);
            }
            sleep(Duration::from_millis(100)).await;
        }
        Ok(false)
    }
}

impl Drop for TestBot {
    fn drop(&mut self) {
        // Kill the bot process
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
