//! End-to-end renders against a real ffmpeg.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use pcast_media::{get_duration, probe_audio, render};
use pcast_models::{
    ClipWindow, JobPayload, JobStatus, RenderRequest, RenderTier, VideoFormat, VideoPayload,
};
use pcast_worker::{JobExecutor, WorkerConfig};

fn ffmpeg(args: &[&str]) {
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(args)
        .status()
        .expect("ffmpeg not runnable");
    assert!(status.success(), "ffmpeg {:?} failed", args);
}

/// 30 s sine tone and a flat cover image.
fn fixtures(dir: &Path) -> (PathBuf, PathBuf) {
    let audio = dir.join("episode.m4a");
    let image = dir.join("cover.png");
    ffmpeg(&[
        "-f",
        "lavfi",
        "-i",
        "sine=frequency=440:duration=30",
        "-c:a",
        "aac",
        audio.to_str().unwrap(),
    ]);
    ffmpeg(&[
        "-f",
        "lavfi",
        "-i",
        "color=c=0x336699:s=640x640",
        "-frames:v",
        "1",
        image.to_str().unwrap(),
    ]);
    (audio, image)
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_square_balanced_render() {
    let dir = TempDir::new().unwrap();
    let (audio, image) = fixtures(dir.path());
    let output = dir.path().join("out").join("square.mp4");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let request = RenderRequest::full_episode(
        &audio,
        &image,
        &output,
        VideoFormat::Square,
        RenderTier::Balanced,
    );
    let path = render(&request, move |pct| sink.lock().unwrap().push(pct))
        .await
        .expect("render failed");
    assert_eq!(path, output);

    let seen = seen.lock().unwrap().clone();
    assert!(
        seen.iter().any(|p| *p > 0 && *p < 100),
        "no intermediate progress: {:?}",
        seen
    );
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "progress not increasing: {:?}", seen);
    assert_eq!(seen.last(), Some(&100));

    let info = probe_audio(&output).await.unwrap();
    assert!((info.duration - 30.0).abs() <= 1.0, "duration {}", info.duration);
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_short_clamped_at_end_of_audio() {
    let dir = TempDir::new().unwrap();
    let (audio, image) = fixtures(dir.path());
    let output = dir.path().join("short.mp4");

    let request = RenderRequest::short(
        &audio,
        &image,
        &output,
        ClipWindow::new(25.0, 58.0),
        RenderTier::Turbo,
    );
    render(&request, |_| {}).await.expect("render failed");

    let duration = get_duration(&output).await.unwrap();
    assert!((duration - 5.0).abs() <= 0.5, "duration {}", duration);
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_worker_with_ffmpeg_renderer() {
    let dir = TempDir::new().unwrap();
    let (audio, image) = fixtures(dir.path());
    let config = WorkerConfig::rooted_at(dir.path());
    let executor = JobExecutor::new(config.clone());
    let store = Arc::clone(executor.store());

    let payload = |audio_path: PathBuf| {
        JobPayload::GenerateVideo(VideoPayload {
            audio_path,
            image_path: image.clone(),
            format: VideoFormat::Square,
            tier: RenderTier::Balanced,
            background_color: None,
            output_name: None,
        })
    };
    let broken = store.submit(payload(dir.path().join("missing.m4a"))).unwrap();
    let good = store.submit(payload(audio)).unwrap();

    assert!(executor.run_once().await.unwrap());

    // Sample the stored record while the real render is running
    let executor = Arc::new(executor);
    let running = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run_once().await })
    };
    let mut stored_progress = Vec::new();
    while !running.is_finished() {
        if let Some(job) = store.get(&good.id) {
            if job.status == JobStatus::Processing {
                stored_progress.push(job.progress);
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(running.await.unwrap().unwrap());
    assert!(
        stored_progress.iter().any(|p| *p > 0 && *p < 100),
        "no intermediate progress stored: {:?}",
        stored_progress
    );
    assert!(stored_progress.windows(2).all(|w| w[0] <= w[1]));

    let broken = store.get(&broken.id).unwrap();
    assert_eq!(broken.status, JobStatus::Failed);
    assert!(!broken.error.unwrap_or_default().is_empty());

    let good = store.get(&good.id).unwrap();
    assert_eq!(good.status, JobStatus::Completed);
    assert_eq!(good.progress, 100);
    let output = good.result_path.unwrap();
    assert!(output.starts_with(&config.output_dir));
    let duration = get_duration(&output).await.unwrap();
    assert!((duration - 30.0).abs() <= 1.0, "duration {}", duration);
}
