//! Worker pool: one master task consuming submitted jobs, a scheduler
//! running segment jobs with bounded concurrency.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use m3u8::{clean_filename, clean_path};
use reqwest::Client;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assembler::assemble;
use crate::config::GrabberConfig;
use crate::error::GrabError;
use crate::fetcher::SegmentFetcher;
use crate::job::{Job, ListJob, MasterAudioJob, SegmentJob, SubtitleJob};
use crate::mux::{self, MuxInputs};
use crate::resolver::{PlaylistResolver, ResolvedPlaylist};
use crate::subtitle::SubtitleCollector;
use crate::wait::{ErrorSlot, WaitGroup};

/// The worker pool. Owns both channels; dropping the submission side (via
/// [`Pool::shutdown`]) drains and stops the workers.
pub struct Pool {
    job_tx: mpsc::UnboundedSender<Job>,
    master: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

impl Pool {
    /// Spawns the master worker and the segment scheduler.
    pub fn spawn(config: Arc<GrabberConfig>, client: Client) -> Pool {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (seg_tx, seg_rx) = mpsc::unbounded_channel();

        let resolver = PlaylistResolver::new(client.clone(), Arc::clone(&config));

        let master_worker = MasterWorker {
            config: Arc::clone(&config),
            resolver: resolver.clone(),
            seg_tx,
        };
        let master = tokio::spawn(master_worker.run(job_rx));

        let ctx = Arc::new(WorkerCtx {
            config: Arc::clone(&config),
            fetcher: SegmentFetcher::new(client.clone(), Arc::clone(&config)),
            subtitles: SubtitleCollector::new(client.clone(), resolver.clone()),
            resolver,
        });
        let scheduler = tokio::spawn(run_scheduler(ctx, seg_rx, config.segment_workers));

        Pool {
            job_tx,
            master,
            scheduler,
        }
    }

    /// Submits a whole-presentation job; the returned receiver resolves when
    /// the job completes, carrying its first error if any.
    pub fn submit(
        &self,
        mut job: ListJob,
    ) -> Result<oneshot::Receiver<Result<(), GrabError>>, GrabError> {
        let (tx, rx) = oneshot::channel();
        job.ticket = Some(tx);
        self.job_tx
            .send(Job::List(job))
            .map_err(|_| GrabError::Config("worker pool is shut down".to_string()))?;
        Ok(rx)
    }

    /// Closes the submission channel and waits for the workers to drain.
    pub async fn shutdown(self) {
        drop(self.job_tx);
        let _ = self.master.await;
        let _ = self.scheduler.await;
    }
}

/// Shared context for segment-channel workers.
struct WorkerCtx {
    config: Arc<GrabberConfig>,
    fetcher: SegmentFetcher,
    subtitles: SubtitleCollector,
    resolver: PlaylistResolver,
}

type UnitFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs segment-channel jobs with at most `concurrency` in flight.
/// Master-audio jobs expand into further segment downloads and wait on them,
/// so they run as detached tasks outside the concurrency cap.
async fn run_scheduler(
    ctx: Arc<WorkerCtx>,
    mut seg_rx: mpsc::UnboundedReceiver<Job>,
    concurrency: usize,
) {
    debug!("segment scheduler started");
    let mut futures: FuturesUnordered<UnitFuture> = FuturesUnordered::new();
    let mut closed = false;

    loop {
        let in_progress = futures.len();

        tokio::select! {
            biased;

            maybe_job = seg_rx.recv(), if !closed && in_progress < concurrency => {
                match maybe_job {
                    Some(Job::Segment(job)) => {
                        let ctx = Arc::clone(&ctx);
                        futures.push(Box::pin(async move { ctx.run_segment(job).await }));
                    }
                    Some(Job::Subtitles(job)) => {
                        let ctx = Arc::clone(&ctx);
                        futures.push(Box::pin(async move { ctx.run_subtitles(job).await }));
                    }
                    Some(Job::MasterAudio(job)) => {
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move { ctx.run_master_audio(job).await });
                    }
                    Some(Job::List(job)) => {
                        warn!(url = %job.url, "list job on the segment channel, dropping");
                    }
                    None => {
                        closed = true;
                        if futures.is_empty() {
                            break;
                        }
                    }
                }
            }

            Some(()) = futures.next(), if in_progress > 0 => {
                if closed && futures.is_empty() {
                    break;
                }
            }

            else => break,
        }
    }
    debug!("segment scheduler finished");
}

impl WorkerCtx {
    async fn run_segment(&self, job: SegmentJob) {
        if let Err(e) = self.fetcher.download(&job).await {
            warn!(filename = %job.filename, pos = job.pos, error = %e, "segment job failed");
            job.errors.record(e);
        }
        job.group.done();
    }

    async fn run_subtitles(&self, job: SubtitleJob) {
        // Subtitle trouble never poisons the presentation; the mux step
        // simply won't find the file.
        if let Err(e) = self.subtitles.collect(&job).await {
            warn!(url = %job.url, error = %e, "failed to download subtitles");
        }
        job.group.done();
    }

    /// Expands an alternate-audio rendition into per-segment downloads, runs
    /// them with the pool's concurrency bound and assembles the result at
    /// the job's absolute path.
    async fn run_master_audio(&self, job: MasterAudioJob) {
        debug!(url = %job.url, "downloading audio stream");

        let playlist = match self.resolver.resolve(&job.url).await {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!(url = %job.url, error = %e, "failed to resolve audio stream");
                job.group.done();
                return;
            }
        };

        // the audio playlist's own key wins over the master's
        let crypto = playlist.crypto.clone().or_else(|| job.crypto.clone());

        let mut segments = playlist.segments.clone();
        if let Some(map) = &playlist.map_uri {
            segments.insert(0, map.clone());
        }

        let group = WaitGroup::new();
        let mut segment_jobs = Vec::with_capacity(segments.len());
        for (pos, url) in segments.iter().enumerate() {
            group.add(1);
            segment_jobs.push(SegmentJob {
                url: url.clone(),
                pos,
                dest_path: job.dest_path.clone(),
                filename: job.filename.clone(),
                audio: true,
                crypto: crypto.clone(),
                group: group.clone(),
                errors: job.errors.clone(),
            });
        }
        futures::stream::iter(segment_jobs)
            .for_each_concurrent(self.config.segment_workers, |segment| async move {
                self.run_segment(segment).await;
            })
            .await;
        group.wait().await;

        info!(
            count = segments.len(),
            "all audio segments downloaded, rebuilding the audio file"
        );
        if let Err(e) = assemble(
            &self.config.tmp_dir,
            &job.filename,
            segments.len(),
            &job.absolute_path,
        )
        .await
        {
            warn!(error = %e, "failed to assemble audio stream");
            job.errors.record(e);
        }
        job.group.done();
    }
}

/// Consumes the submission channel, one presentation at a time.
struct MasterWorker {
    config: Arc<GrabberConfig>,
    resolver: PlaylistResolver,
    seg_tx: mpsc::UnboundedSender<Job>,
}

impl MasterWorker {
    async fn run(self, mut job_rx: mpsc::UnboundedReceiver<Job>) {
        debug!("master worker started");
        while let Some(job) = job_rx.recv().await {
            match job {
                Job::List(mut list) => {
                    let result = self.download_list(&list).await;
                    if let Err(e) = &result {
                        warn!(url = %list.url, error = %e, "presentation download failed");
                    }
                    if let Some(ticket) = list.ticket.take() {
                        let _ = ticket.send(result);
                    }
                }
                other => {
                    // segment-scope jobs submitted directly go to the pool
                    let _ = self.seg_tx.send(other);
                }
            }
        }
        debug!("master worker finished");
    }

    /// The whole-presentation flow: resolve, subtitles first, then the
    /// default audio rendition, then video segments, then assembly and mux.
    async fn download_list(&self, job: &ListJob) -> Result<(), GrabError> {
        let filename = clean_filename(&job.filename);
        let dest_path = PathBuf::from(clean_path(&job.dest_path.display().to_string()));
        let final_path = dest_path.join(format!("{filename}.mp4"));

        if !job.skip_mux && !job.subs_only && final_path.exists() {
            info!(path = %final_path.display(), "already exists, we won't redownload it");
            return Ok(());
        }

        let playlist = self.resolver.resolve(&job.url).await.map_err(|e| {
            warn!(url = %job.url, error = %e, "failed to process the m3u8 file");
            e
        })?;

        let errors = ErrorSlot::new();

        // Queue up the subs first.
        let subtitle_paths = self
            .queue_subtitles(&playlist, &dest_path, &filename, &errors)
            .await;

        // Then the default external audio stream, if any.
        let mut audio_paths = Vec::new();
        if let Some(stream) = playlist
            .audio_streams
            .iter()
            .find(|s| s.default && !s.uri.is_empty())
        {
            if !job.subs_only {
                debug!(name = %stream.name, "queuing up default audio stream");
                let audio_filename =
                    format!("{filename}_audio_{}_{}", stream.name, stream.language);
                let absolute_path = dest_path.join(&audio_filename);
                audio_paths.push(absolute_path.clone());

                let group = WaitGroup::new();
                group.add(1);
                let audio = Job::MasterAudio(MasterAudioJob {
                    url: stream.uri.clone(),
                    dest_path: dest_path.clone(),
                    filename: audio_filename,
                    absolute_path,
                    crypto: playlist.crypto.clone(),
                    group: group.clone(),
                    errors: errors.clone(),
                });
                if self.seg_tx.send(audio).is_err() {
                    group.done();
                }
                group.wait().await;
            }
        }

        let mut segments = playlist.segments.clone();
        if let Some(map) = &playlist.map_uri {
            segments.insert(0, map.clone());
        }

        if !job.subs_only {
            let group = WaitGroup::new();
            for (pos, url) in segments.iter().enumerate() {
                let segment = Job::Segment(SegmentJob {
                    url: url.clone(),
                    pos,
                    dest_path: dest_path.clone(),
                    filename: filename.clone(),
                    audio: false,
                    crypto: playlist.crypto.clone(),
                    group: group.clone(),
                    errors: errors.clone(),
                });
                group.add(1);
                if self.seg_tx.send(segment).is_err() {
                    group.done();
                }
            }
            debug!("waiting for the segments to be downloaded");
            group.wait().await;
        }

        if let Some(e) = errors.take() {
            return Err(e);
        }

        if job.subs_only {
            info!("subtitles only, done");
            return Ok(());
        }

        info!(
            count = segments.len(),
            "all segments downloaded, rebuilding the file now"
        );
        let ts_path = dest_path.join(format!("{filename}.ts"));
        assemble(&self.config.tmp_dir, &filename, segments.len(), &ts_path).await?;

        if job.skip_mux {
            info!(path = %ts_path.display(), "content available");
            return Ok(());
        }

        let inputs = MuxInputs {
            video: ts_path,
            audio: audio_paths.into_iter().filter(|p| p.exists()).collect(),
            subtitles: subtitle_paths.into_iter().filter(|p| p.exists()).collect(),
        };
        mux::mux(&inputs, &final_path).await?;

        info!(path = %final_path.display(), "presentation available");
        Ok(())
    }

    /// Enqueues one subtitle job per rendition and waits for all of them:
    /// subtitles must be on disk before muxing. Returns the paths the
    /// renditions are expected to produce.
    async fn queue_subtitles(
        &self,
        playlist: &ResolvedPlaylist,
        dest_path: &std::path::Path,
        filename: &str,
        errors: &ErrorSlot,
    ) -> Vec<PathBuf> {
        let mut expected = Vec::new();
        if playlist.subtitle_streams.is_empty() {
            return expected;
        }

        let group = WaitGroup::new();
        let mut seen = std::collections::HashSet::new();
        for stream in &playlist.subtitle_streams {
            if stream.uri.is_empty() || !seen.insert(stream.uri.clone()) {
                continue;
            }
            let sub_filename = if stream.language.is_empty() {
                filename.to_string()
            } else {
                format!("{filename}_{}", stream.language)
            };
            let path = dest_path.join(format!("{sub_filename}.srt"));
            expected.push(path.clone());

            let job = Job::Subtitles(SubtitleJob {
                url: stream.uri.clone(),
                dest_path: dest_path.to_path_buf(),
                filename: sub_filename,
                absolute_path: Some(path),
                group: group.clone(),
                errors: errors.clone(),
            });
            group.add(1);
            if self.seg_tx.send(job).is_err() {
                group.done();
            }
        }
        group.wait().await;
        expected
    }
}
