//! Render job processing.
//!
//! Turns a `generate_video` or `generate_short` payload into a
//! [`RenderRequest`] and runs it through the [`Renderer`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use pcast_media::{ProgressSink, Renderer};
use pcast_models::{Job, JobId, JobOutcome, JobPayload, RenderRequest};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Fail with `InputMissing` for the first input that is not a file.
pub fn check_inputs(payload: &JobPayload) -> WorkerResult<()> {
    match payload.input_paths().into_iter().find(|p| !p.is_file()) {
        Some(missing) => Err(WorkerError::InputMissing(missing.to_path_buf())),
        None => Ok(()),
    }
}

/// Derive the render request for a render job.
pub fn build_request(job: &Job, output_dir: &Path) -> WorkerResult<RenderRequest> {
    let request = match &job.payload {
        JobPayload::GenerateVideo(p) => {
            let output = output_path(
                output_dir,
                p.output_name.as_deref(),
                &p.audio_path,
                p.format.as_str(),
                &job.id,
            );
            let request =
                RenderRequest::full_episode(&p.audio_path, &p.image_path, output, p.format, p.tier);
            match p.background_color {
                Some(color) => request.with_background_color(color),
                None => request,
            }
        }
        JobPayload::GenerateShort(p) => {
            let output = output_path(
                output_dir,
                p.output_name.as_deref(),
                &p.audio_path,
                "short",
                &job.id,
            );
            let request = RenderRequest::short(
                &p.audio_path,
                &p.image_path,
                output,
                p.clip_window(),
                p.tier,
            );
            match p.background_color {
                Some(color) => request.with_background_color(color),
                None => request,
            }
        }
        JobPayload::Upload(_) => {
            return Err(WorkerError::internal(format!(
                "job {} is not a render job",
                job.id
            )))
        }
    };
    Ok(request)
}

/// `<output_dir>/<name>.mp4`.
///
/// Without an explicit name the file is named after the audio, the layout and
/// the job id, so two renders of the same episode never collide.
fn output_path(
    output_dir: &Path,
    output_name: Option<&str>,
    audio_path: &Path,
    variant: &str,
    id: &JobId,
) -> PathBuf {
    let name = output_name
        .map(sanitize_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            let stem = audio_path
                .file_stem()
                .map(|s| sanitize_name(&s.to_string_lossy()))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "episode".to_string());
            let short_id: String = id.as_str().chars().take(8).collect();
            format!("{}_{}_{}", stem, variant, short_id)
        });
    output_dir.join(format!("{}.mp4", name))
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `_`, drop a trailing
/// `.mp4`.
fn sanitize_name(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_suffix(".mp4").unwrap_or(name);
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_matches('.').to_string()
}

/// Run a render job to completion.
pub async fn process_render_job(
    job: &Job,
    renderer: &dyn Renderer,
    output_dir: &Path,
    progress: ProgressSink,
) -> WorkerResult<JobOutcome> {
    let logger = JobLogger::for_job(job);

    check_inputs(&job.payload)?;
    let request = build_request(job, output_dir)?;

    logger.log_start(&format!(
        "{} render, tier {} -> {}",
        if request.is_short() { "short" } else { "full episode" },
        request.tier,
        request.output_path.display()
    ));

    let started = Instant::now();
    let output = renderer.render(&request, progress).await?;
    metrics::record_render_duration(request.tier, started.elapsed().as_secs_f64());

    Ok(JobOutcome::with_path(output))
}
