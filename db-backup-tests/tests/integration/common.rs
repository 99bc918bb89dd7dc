//! Docker helpers shared by the integration tests

use anyhow::{bail, Context, Result};
use db_backup::managers::prompt::FixedAnswer;
use db_backup::{BackupManager, RestoreOutcome, Target};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Guard that ensures Docker container cleanup on drop (even on panic)
pub struct ContainerGuard {
    name: String,
}

impl ContainerGuard {
    pub fn new(name: &str) -> Self {
        // A container left over from an aborted run would block the name
        cleanup_container(name);
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        cleanup_container(&self.name);
    }
}

/// Stop and remove a container along with its anonymous volumes
fn cleanup_container(name: &str) {
    let _ = Command::new("docker").args(["stop", name]).output();
    let _ = Command::new("docker").args(["rm", "-v", name]).output();
}

pub fn is_docker_available() -> bool {
    Command::new("docker")
        .args(["ps"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// `docker run -d` with `container_port` published on a random local port
///
/// Returns the host port.
pub fn start_container(name: &str, image: &str, env: &[&str], container_port: u16) -> Result<u16> {
    let mut cmd = Command::new("docker");
    cmd.args(["run", "-d", "--name", name, "-p"])
        .arg(format!("127.0.0.1::{}", container_port));
    for var in env {
        cmd.args(["-e", var]);
    }
    let output = cmd.arg(image).output().context("Failed to run docker")?;
    if !output.status.success() {
        bail!(
            "docker run {} failed: {}",
            image,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let output = Command::new("docker")
        .args(["port", name, &container_port.to_string()])
        .output()?;
    let mapping = String::from_utf8_lossy(&output.stdout);
    let port = mapping
        .lines()
        .next()
        .and_then(|line| line.rsplit(':').next())
        .context("No published port")?
        .trim()
        .parse()?;
    Ok(port)
}

/// `docker exec` and return trimmed stdout, failing on a non-zero exit
pub fn exec(container: &str, args: &[&str]) -> Result<String> {
    let output = Command::new("docker")
        .arg("exec")
        .arg(container)
        .args(args)
        .output()?;
    if !output.status.success() {
        bail!(
            "docker exec {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Retry `probe` once a second until it succeeds
pub fn wait_until_ready(what: &str, attempts: u32, probe: impl Fn() -> bool) -> Result<()> {
    for _ in 0..attempts {
        if probe() {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(1));
    }
    bail!("{} failed to become ready", what)
}

/// Back up `target`, let `mutate` change the data, then restore the backup
pub async fn backup_mutate_restore(target: &Target, mutate: impl FnOnce() -> Result<()>) -> Result<()> {
    let manager = BackupManager::new().with_prompt(Arc::new(FixedAnswer(true)));

    let artifact = manager.perform_backup(target).await?;
    mutate()?;

    let outcome = manager
        .perform_restore(target, &artifact.to_string_lossy(), true)
        .await?;
    assert_eq!(outcome, RestoreOutcome::Restored);
    Ok(())
}
