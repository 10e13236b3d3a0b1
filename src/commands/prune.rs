//! `ojsandbox prune`: remove containers left behind by a crashed server.

use anyhow::{Context, Result};
use std::sync::Arc;

use ojsandbox::config::Config;
use ojsandbox::sandbox::{ContainerPool, DockerRuntime};

/// Removes every container carrying the sandbox label.
pub async fn run(config: &Config) -> Result<()> {
    let runtime = DockerRuntime::connect().context("Failed to connect to Docker. Is Docker running?")?;
    let pool = ContainerPool::new(Arc::new(runtime), config.pool_settings()?);

    let removed = pool
        .prune_orphans()
        .await
        .context("Failed to prune sandbox containers")?;

    println!("Removed {removed} sandbox container(s)");
    Ok(())
}
