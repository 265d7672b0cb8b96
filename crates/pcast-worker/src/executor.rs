//! Job executor.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use pcast_media::{FfmpegRenderer, ProgressSink, Renderer, Toolchain};
use pcast_models::{Job, JobId, JobOutcome, JobPayload};
use pcast_store::{JobStore, StoreResult};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::render_job::process_render_job;
use crate::upload_job::{archive_upload_input, process_upload_job};
use crate::uploader::{
    CommandHostingUploader, CommandVideoPlatformUploader, HostingUploader, VideoPlatformUploader,
};

/// Single-threaded worker: claims one pending job at a time and runs it to a
/// terminal status.
pub struct JobExecutor {
    config: WorkerConfig,
    store: Arc<JobStore>,
    handlers: Handlers,
    shutdown: watch::Sender<bool>,
}

/// Collaborators shared with the spawned handler task.
#[derive(Clone)]
struct Handlers {
    renderer: Arc<dyn Renderer>,
    hosting: Arc<dyn HostingUploader>,
    video: Arc<dyn VideoPlatformUploader>,
    output_dir: PathBuf,
    secrets_path: PathBuf,
}

impl JobExecutor {
    /// Create an executor with the ffmpeg renderer and the command-backed
    /// uploaders from `config`.
    pub fn new(config: WorkerConfig) -> Self {
        let store = Arc::new(JobStore::new(&config.store_path));
        let hosting = Arc::new(CommandHostingUploader::new(config.hosting_upload_cmd.clone()));
        let video = Arc::new(CommandVideoPlatformUploader::new(config.video_upload_cmd.clone()));
        let renderer = Arc::new(FfmpegRenderer::with_tools(Toolchain::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
        )));
        Self::with_collaborators(config, store, renderer, hosting, video)
    }

    pub fn with_collaborators(
        config: WorkerConfig,
        store: Arc<JobStore>,
        renderer: Arc<dyn Renderer>,
        hosting: Arc<dyn HostingUploader>,
        video: Arc<dyn VideoPlatformUploader>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let handlers = Handlers {
            renderer,
            hosting,
            video,
            output_dir: config.output_dir.clone(),
            secrets_path: config.secrets_path.clone(),
        };
        Self {
            config,
            store,
            handlers,
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Stop claiming new jobs. The job in flight is allowed to finish.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Recover interrupted jobs, then process jobs until shutdown.
    ///
    /// Handler failures are recorded on the job. Only a failed write by the
    /// loop itself (claim, complete, fail) ends the loop with an error.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            store = %self.store.path().display(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            recovery = %self.config.recovery_policy,
            "Starting job executor"
        );

        let policy = self.config.recovery_policy;
        let recovered =
            blocking(&self.store, move |store| store.recover_interrupted(policy)).await?;
        if !recovered.is_empty() {
            metrics::record_recovered(recovered.len());
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            if self.run_once().await? {
                continue;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Claim and execute the next pending job.
    ///
    /// Returns whether a job was processed.
    pub async fn run_once(&self) -> WorkerResult<bool> {
        let pending = blocking(&self.store, |store| Ok(store.pending_count())).await?;
        metrics::set_pending(pending);

        let Some(job) = blocking(&self.store, JobStore::claim_next).await? else {
            return Ok(false);
        };
        let logger = JobLogger::for_job(&job);
        metrics::record_claimed(job.job_type());

        let result = self.execute(&job, &logger).await;
        let succeeded = result.is_ok();

        match result {
            Ok(outcome) => {
                let id = job.id.clone();
                let done =
                    blocking(&self.store, move |store| store.complete(&id, outcome)).await?;
                metrics::record_completed(job.job_type());
                let detail = done
                    .result_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .or(done.result_url)
                    .unwrap_or_else(|| "ok".to_string());
                logger.log_completion(&detail);
            }
            Err(e) => {
                let message = e.job_message();
                let (id, stored) = (job.id.clone(), message.clone());
                blocking(&self.store, move |store| store.fail(&id, stored)).await?;
                metrics::record_failed(job.job_type());
                logger.log_error(&message);
            }
        }

        if matches!(job.payload, JobPayload::Upload(_)) {
            archive_upload_input(
                &job,
                succeeded,
                &self.config.processed_dir,
                &self.config.failed_dir,
            )
            .await;
        }

        Ok(true)
    }

    /// Run the job's handler in its own task, so a panic fails the job
    /// instead of the worker.
    async fn execute(&self, job: &Job, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        let (tx, rx) = mpsc::unbounded_channel::<u8>();
        let writer = spawn_progress_writer(
            Arc::clone(&self.store),
            job.id.clone(),
            logger.clone(),
            rx,
        );
        let progress: ProgressSink = Arc::new(move |pct| {
            let _ = tx.send(pct);
        });

        let handlers = self.handlers.clone();
        let task_job = job.clone();
        let handle = tokio::spawn(
            async move { dispatch(&handlers, &task_job, progress).await }
                .instrument(logger.create_span()),
        );

        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(WorkerError::HandlerAborted(format!(
                "handler panicked: {}",
                panic_message(e.into_panic())
            ))),
            Err(e) => Err(WorkerError::HandlerAborted(e.to_string())),
        };

        // The sink is gone with the handler task, so the writer drains and ends
        if let Err(e) = writer.await {
            warn!(job_id = %job.id, error = %e, "Progress writer ended abnormally");
        }
        result
    }
}

async fn dispatch(
    handlers: &Handlers,
    job: &Job,
    progress: ProgressSink,
) -> WorkerResult<JobOutcome> {
    match &job.payload {
        JobPayload::GenerateVideo(_) | JobPayload::GenerateShort(_) => {
            let renderer = handlers.renderer.as_ref();
            process_render_job(job, renderer, &handlers.output_dir, progress).await
        }
        JobPayload::Upload(_) => {
            drop(progress);
            process_upload_job(
                job,
                handlers.hosting.as_ref(),
                handlers.video.as_ref(),
                &handlers.secrets_path,
            )
            .await
        }
    }
}

/// Persist progress samples until the sender side is dropped.
///
/// Write failures are logged; they never fail the job.
fn spawn_progress_writer(
    store: Arc<JobStore>,
    id: JobId,
    logger: JobLogger,
    mut rx: mpsc::UnboundedReceiver<u8>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut logged_decile = 0u8;
        while let Some(pct) = rx.recv().await {
            let task_id = id.clone();
            let saved =
                blocking(&store, move |store| store.update_progress(&task_id, pct)).await;
            match saved {
                Ok(true) if pct / 10 > logged_decile => {
                    logged_decile = pct / 10;
                    logger.log_progress(pct);
                }
                Ok(_) => {}
                Err(e) => logger.log_warning(&format!("progress {}% not saved: {}", pct, e)),
            }
        }
    })
}

/// Run a store operation on the blocking pool. Every store call reads and
/// rewrites the file synchronously.
async fn blocking<T, F>(store: &Arc<JobStore>, op: F) -> WorkerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&JobStore) -> StoreResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| WorkerError::internal(format!("store task failed: {}", e)))?;
    Ok(result?)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
