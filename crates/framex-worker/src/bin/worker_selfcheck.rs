//! Preflight for worker hosts: exits non-zero with the first failed check.

use std::future::Future;
use std::path::Path;

use anyhow::{bail, ensure, Context};

use framex_storage::StorageConfig;
use framex_worker::WorkerConfig;

const REQUIRED_ENV: &[&str] = &["REDIS_URL"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    let storage = StorageConfig::from_env().context("storage configuration")?;

    check("environment", async { required_env(REQUIRED_ENV) }).await?;
    check("work dir", writable_dir(&config.work_dir)).await?;
    check("uploads dir", readable_dir(&storage.uploads_dir)).await?;
    check("ffmpeg", async { ffmpeg_runs() }).await?;

    println!("worker-selfcheck: all checks passed");
    Ok(())
}

async fn check(name: &str, probe: impl Future<Output = anyhow::Result<()>>) -> anyhow::Result<()> {
    match probe.await {
        Ok(()) => {
            println!("worker-selfcheck: {:<12} ok", name);
            Ok(())
        }
        Err(e) => Err(e.context(format!("{} check failed", name))),
    }
}

fn required_env(vars: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<&str> = vars.iter().copied().filter(|v| std::env::var(v).is_err()).collect();
    ensure!(missing.is_empty(), "unset: {}", missing.join(", "));
    Ok(())
}

async fn writable_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("creating {}", path.display()))?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .with_context(|| format!("{} is not writable", path.display()))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

async fn readable_dir(path: &Path) -> anyhow::Result<()> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("{} is unavailable", path.display()))?;
    if !meta.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("{} cannot be listed", path.display()))?;
    entries
        .next_entry()
        .await
        .with_context(|| format!("{} cannot be read", path.display()))?;
    Ok(())
}

fn ffmpeg_runs() -> anyhow::Result<()> {
    let binary = framex_media::check_ffmpeg()?;
    let status = std::process::Command::new(&binary)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .status()
        .with_context(|| format!("running {}", binary.display()))?;
    ensure!(status.success(), "{} -version exited with {}", binary.display(), status);
    Ok(())
}
