use std::path::{Path, PathBuf};
use std::process::Command;

use pcast_store::JobStore;
use pcast_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with store={}",
        config.store_path.display()
    );
    for dir in [&config.output_dir, &config.processed_dir, &config.failed_dir] {
        ensure_dir(dir).await?;
    }
    ensure_tool("ffmpeg", config.ffmpeg_path.as_ref())?;
    ensure_tool("ffprobe", config.ffprobe_path.as_ref())?;
    ensure_store(&config.store_path)?;

    if !config.secrets_path.is_file() {
        println!(
            "worker-selfcheck: warning: no secrets file at {}, hosting uploads will fail",
            config.secrets_path.display()
        );
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))
}

fn ensure_tool(name: &str, configured: Option<&PathBuf>) -> anyhow::Result<()> {
    let program = configured.map_or_else(|| PathBuf::from(name), PathBuf::clone);
    let output = Command::new(&program)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} -version failed: {:?}", name, output.status));
    }
    Ok(())
}

fn ensure_store(path: &Path) -> anyhow::Result<()> {
    let jobs = JobStore::new(path)
        .try_load()
        .map_err(|e| anyhow::anyhow!("job store {} unreadable: {}", path.display(), e))?;
    println!("worker-selfcheck: store has {} jobs", jobs.len());
    Ok(())
}
