use std::sync::Arc;

use log::{debug, warn};
use rayon::{prelude::*, ThreadPoolBuilder};

use crate::{
    cache::ResolutionCache,
    context::ResolveContext,
    model::Artifact,
    report::{ArtifactDownloadReport, DownloadStatus},
    resolver::DependencyResolver,
};

pub(crate) struct DownloadJob<K> {
    pub key: K,
    pub artifact: Artifact,
    pub resolver: Option<Arc<dyn DependencyResolver>>,
}

/// Downloads every job on a pool of up to `workers` threads. Each worker
/// gets its own copy of `ctx`, and jobs left once the resolve is interrupted
/// fail without being tried. Reports come back in job order.
pub(crate) fn download_all<K: Send + Sync>(
    jobs: Vec<DownloadJob<K>>,
    cache: &ResolutionCache,
    ctx: &ResolveContext,
    workers: usize,
) -> Vec<(K, ArtifactDownloadReport)> {
    let workers = workers.clamp(1, jobs.len().max(1));
    let download = |ctx: &mut ResolveContext, job: &DownloadJob<K>| {
        if ctx.check_interrupted().is_err() {
            ArtifactDownloadReport::failed(job.artifact.clone(), "interrupted")
        } else {
            download_one(job, cache, ctx)
        }
    };

    let reports: Vec<ArtifactDownloadReport> =
        match ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| jobs.par_iter().map_with(ctx.clone(), download).collect()),
            Err(error) => {
                warn!("Failed to start download workers, downloading in place: {}", error);
                let mut ctx = ctx.clone();
                jobs.iter().map(|job| download(&mut ctx, job)).collect()
            }
        };

    jobs.into_iter()
        .zip(reports)
        .map(|(job, report)| (job.key, report))
        .collect()
}

fn download_one<K>(
    job: &DownloadJob<K>,
    cache: &ResolutionCache,
    ctx: &ResolveContext,
) -> ArtifactDownloadReport {
    let Some(resolver) = &job.resolver else {
        return ArtifactDownloadReport::failed(
            job.artifact.clone(),
            format!("no resolver found for {}", job.artifact.mrid.module_id()),
        );
    };
    let report = resolver.download(&job.artifact, cache, ctx);
    match report.status {
        DownloadStatus::Failed if job.artifact.is_merged() => ctx
            .messages()
            .warn(format!("\tmerged artifact not found: {}", job.artifact.id())),
        DownloadStatus::Failed => ctx.messages().warn(format!("\t{}", report)),
        DownloadStatus::Successful => debug!("\tdownloaded {}", job.artifact.id()),
        DownloadStatus::No => {}
    }
    report
}
