//! Copies the artifacts of a previous resolve out of the cache, following a
//! destination pattern. Everything is read back from the XML reports the
//! resolve left in the cache.

use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
    io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, trace, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::{
    cache::{CacheError, ResolutionCache},
    context::{Interrupted, ResolveContext},
    model::{Artifact, ArtifactRevisionId, ModuleRevisionId},
    pattern::{self, PatternError},
    report::{ArtifactDownloadReport, ReportError, XmlReportParser},
    repository::copy_file,
    resolve::default_resolve_id,
};

const METADATA_TYPE: &str = "ivy";

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Retrieve interrupted")]
    Interrupted(#[from] Interrupted),
    #[error("{module} has not been resolved: no resolved descriptor in the cache")]
    NotResolved { module: ModuleRevisionId },
    #[error("No resolve report for conf '{conf}' at {}: resolve it first", path.display())]
    MissingReport { conf: String, path: PathBuf },
    #[error(
        "Multiple artifacts of the module {module} are retrieved to the same file {}: {first} and {second}. Update the retrieve pattern to fix this error.",
        destination.display()
    )]
    Collision {
        module: ModuleRevisionId,
        destination: PathBuf,
        first: String,
        second: String,
    },
    #[error("Unknown overwrite mode `{0}`: expected never, always, newer or different")]
    UnknownOverwriteMode(String),
}

/// When an existing destination file gets replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwriteMode {
    Never,
    Always,
    /// Unless the destination is at least as recent as the source.
    #[default]
    Newer,
    /// Unless both files have the same modification time.
    Different,
}

impl FromStr for OverwriteMode {
    type Err = RetrieveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(OverwriteMode::Never),
            "always" => Ok(OverwriteMode::Always),
            "newer" => Ok(OverwriteMode::Newer),
            "different" => Ok(OverwriteMode::Different),
            other => Err(RetrieveError::UnknownOverwriteMode(other.to_owned())),
        }
    }
}

impl Display for OverwriteMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OverwriteMode::Never => f.write_str("never"),
            OverwriteMode::Always => f.write_str("always"),
            OverwriteMode::Newer => f.write_str("newer"),
            OverwriteMode::Different => f.write_str("different"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Confs to retrieve, `*` for every conf of the resolved descriptor.
    pub confs: Vec<String>,
    /// Where to copy the descriptors of the dependencies, if anywhere.
    pub dest_ivy_pattern: Option<String>,
    /// Delete whatever the retrieve did not produce under the destination roots.
    pub sync: bool,
    pub make_symlinks: bool,
    /// Defaults to `organisation-module`, as for resolve.
    pub resolve_id: Option<String>,
    pub overwrite_mode: OverwriteMode,
    /// Artifact types to retrieve, all of them when empty.
    pub artifact_types: Vec<String>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            confs: vec!["*".to_owned()],
            dest_ivy_pattern: None,
            sync: false,
            make_symlinks: false,
            resolve_id: None,
            overwrite_mode: OverwriteMode::default(),
            artifact_types: vec![],
        }
    }
}

impl RetrieveOptions {
    fn accepts(&self, artifact: &Artifact) -> bool {
        self.artifact_types.is_empty()
            || self
                .artifact_types
                .iter()
                .any(|kind| kind == "*" || *kind == artifact.kind)
    }
}

/// An artifact in the cache and the places it must be copied to.
#[derive(Debug, Clone)]
pub struct RetrieveTarget {
    pub report: ArtifactDownloadReport,
    pub destinations: IndexSet<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrieveReport {
    pub retrieve_root: PathBuf,
    copied: Vec<(PathBuf, ArtifactDownloadReport)>,
    up_to_date: Vec<(PathBuf, ArtifactDownloadReport)>,
    pub total_size: u64,
    pub duration_ms: u64,
}

impl RetrieveReport {
    pub fn copied_files(&self) -> Vec<&Path> {
        self.copied.iter().map(|(path, _)| path.as_path()).collect()
    }

    pub fn up_to_date_files(&self) -> Vec<&Path> {
        self.up_to_date.iter().map(|(path, _)| path.as_path()).collect()
    }

    /// Every destination file, copied or not.
    pub fn retrieved_files(&self) -> Vec<&Path> {
        self.copied
            .iter()
            .chain(&self.up_to_date)
            .map(|(path, _)| path.as_path())
            .collect()
    }

    pub fn nbr_artifacts_copied(&self) -> usize {
        self.copied.len()
    }

    pub fn nbr_artifacts_up_to_date(&self) -> usize {
        self.up_to_date.len()
    }

    /// False when every destination was already up to date.
    pub fn has_changed(&self) -> bool {
        !self.copied.is_empty()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "\t{} artifacts copied, {} already retrieved ({}kB/{}ms)",
            self.nbr_artifacts_copied(),
            self.nbr_artifacts_up_to_date(),
            self.total_size / 1024,
            self.duration_ms
        )
    }
}

pub struct RetrieveEngine {
    ctx: ResolveContext,
    cache: ResolutionCache,
}

impl RetrieveEngine {
    pub fn new(ctx: ResolveContext, cache: ResolutionCache) -> Self {
        Self { ctx, cache }
    }

    pub fn retrieve(
        &self,
        mrid: &ModuleRevisionId,
        dest_pattern: &str,
        options: &RetrieveOptions,
    ) -> Result<RetrieveReport, RetrieveError> {
        let _lock = self.cache.lock()?;
        let start = Instant::now();
        info!(
            ":: retrieving :: {}{}",
            mrid.module_id(),
            if options.sync { " [sync]" } else { "" }
        );
        let settings = self.ctx.settings();
        let dest_pattern = settings.substitute(dest_pattern)?;
        let ivy_pattern = options
            .dest_ivy_pattern
            .as_deref()
            .map(|p| settings.substitute(p))
            .transpose()?;
        let confs = self.confs(mrid, options)?;
        info!("\tconfs: [{}]", confs.join(", "));

        let targets = self.determine_artifacts_to_copy(mrid, &dest_pattern, options)?;
        let artifact_root = PathBuf::from(pattern::token_root(&dest_pattern));
        let ivy_root = ivy_pattern
            .as_deref()
            .map(|p| PathBuf::from(pattern::token_root(p)));

        let mut report = RetrieveReport {
            retrieve_root: artifact_root.clone(),
            ..Default::default()
        };
        let mut artifact_structure: HashSet<PathBuf> = HashSet::new();
        let mut ivy_structure: HashSet<PathBuf> = HashSet::new();

        for target in targets.values() {
            let Some(source) = &target.report.local_file else {
                debug!("\tno local file available for {}: skipping", target.report);
                continue;
            };
            debug!("\tretrieving {}", source.display());
            for destination in &target.destinations {
                self.ctx.check_interrupted()?;
                if up_to_date(source, destination, options.overwrite_mode) {
                    debug!("\t\tto {} [NOT REQUIRED]", destination.display());
                    report
                        .up_to_date
                        .push((destination.clone(), target.report.clone()));
                } else {
                    debug!("\t\tto {}", destination.display());
                    if options.make_symlinks {
                        self.symlink(source, destination)?;
                    } else {
                        self.copy(source, destination)?;
                    }
                    report.total_size += std::fs::metadata(destination).map_or(0, |m| m.len());
                    report
                        .copied
                        .push((destination.clone(), target.report.clone()));
                }

                if target.report.kind() == METADATA_TYPE {
                    if let Some(root) = &ivy_root {
                        ivy_structure.extend(path_files(root, destination));
                    }
                } else {
                    for file in list_all(destination, &[]) {
                        artifact_structure.extend(path_files(&artifact_root, &file));
                    }
                }
            }
        }

        if options.sync {
            debug!("\tsyncing...");
            let ignorable = settings.ignorable_filenames();
            match &ivy_root {
                Some(ivy_root) if ivy_root == &artifact_root => {
                    artifact_structure.extend(ivy_structure);
                    sync(&artifact_root, &artifact_structure, ignorable)?;
                }
                Some(ivy_root) => {
                    sync(&artifact_root, &artifact_structure, ignorable)?;
                    sync(ivy_root, &ivy_structure, ignorable)?;
                }
                None => sync(&artifact_root, &artifact_structure, ignorable)?,
            }
        }

        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!("{}", report.summary_line());
        debug!("\tretrieve done ({}ms)", report.duration_ms);
        Ok(report)
    }

    fn confs(
        &self,
        mrid: &ModuleRevisionId,
        options: &RetrieveOptions,
    ) -> Result<Vec<String>, RetrieveError> {
        if options.confs.is_empty() || options.confs == ["*"] {
            let descriptor = self
                .cache
                .resolved_descriptor(mrid)?
                .ok_or_else(|| RetrieveError::NotResolved {
                    module: mrid.clone(),
                })?;
            debug!("no explicit confs given for retrieve, using resolved descriptor of {}", mrid);
            Ok(descriptor.configuration_names())
        } else {
            Ok(options.confs.clone())
        }
    }

    /// Maps every artifact of the requested confs to its destinations.
    /// When distinct artifacts land on the same destination, the one
    /// published last wins; two artifacts of the same module doing so is
    /// an error.
    pub fn determine_artifacts_to_copy(
        &self,
        mrid: &ModuleRevisionId,
        dest_pattern: &str,
        options: &RetrieveOptions,
    ) -> Result<IndexMap<ArtifactRevisionId, RetrieveTarget>, RetrieveError> {
        let resolve_id = options
            .resolve_id
            .clone()
            .unwrap_or_else(|| default_resolve_id(mrid));
        let settings = self.ctx.settings();
        let ivy_pattern = options
            .dest_ivy_pattern
            .as_deref()
            .map(|p| settings.substitute(p))
            .transpose()?;

        let mut targets: IndexMap<ArtifactRevisionId, RetrieveTarget> = IndexMap::new();
        // destination -> candidates, with the confs that brought them
        let mut collisions: IndexMap<PathBuf, IndexMap<ArtifactRevisionId, ArtifactDownloadReport>> =
            IndexMap::new();
        let mut collision_confs: IndexMap<PathBuf, IndexSet<String>> = IndexMap::new();

        for conf in self.confs(mrid, options)? {
            let path = self.cache.report_path(&resolve_id, &conf);
            if !path.exists() {
                return Err(RetrieveError::MissingReport { conf, path });
            }
            let parser = XmlReportParser::parse(&path)?;

            let mut reports: Vec<ArtifactDownloadReport> = parser
                .artifact_reports()
                .into_iter()
                .filter(|report| options.accepts(&report.artifact))
                .collect();
            if ivy_pattern.is_some() {
                for dependency in parser.real_dependency_revision_ids() {
                    let publication = parser.publication(&dependency).unwrap_or_default();
                    let local_file = self.cache.resolved_descriptor_path(&dependency);
                    let mut report =
                        ArtifactDownloadReport::new(Artifact::metadata(dependency, publication));
                    report.local_file = local_file.exists().then_some(local_file);
                    reports.push(report);
                }
            }

            for report in reports {
                let destination_pattern = if report.kind() == METADATA_TYPE {
                    ivy_pattern.as_deref().unwrap_or(dest_pattern)
                } else {
                    dest_pattern
                };
                let tokens = pattern::artifact_tokens(&report.artifact, Some(&conf));
                let destination = PathBuf::from(pattern::substitute(
                    destination_pattern,
                    &tokens,
                    settings.variables(),
                )?);
                let id = report.artifact.id();
                targets
                    .entry(id.clone())
                    .or_insert_with(|| RetrieveTarget {
                        report: report.clone(),
                        destinations: IndexSet::new(),
                    })
                    .destinations
                    .insert(destination.clone());
                let candidates = collisions.entry(destination.clone()).or_default();
                if !candidates.contains_key(&id) {
                    candidates.insert(id, report);
                    collision_confs
                        .entry(destination)
                        .or_default()
                        .insert(conf.clone());
                }
            }
        }

        for (destination, candidates) in collisions {
            if candidates.len() < 2 {
                continue;
            }
            let mut candidates: Vec<(ArtifactRevisionId, ArtifactDownloadReport)> =
                candidates.into_iter().collect();
            // stable: among equally old artifacts the last one met wins
            candidates.sort_by_key(|(_, report)| report.artifact.publication);
            let Some((winner_id, winner)) = candidates.pop() else {
                continue;
            };
            if let Some((_, same_module)) = candidates
                .iter()
                .find(|(_, report)| report.artifact.mrid == winner.artifact.mrid)
            {
                return Err(RetrieveError::Collision {
                    module: winner.artifact.mrid.clone(),
                    destination,
                    first: same_module.artifact.to_string(),
                    second: winner.artifact.to_string(),
                });
            }
            let confs: Vec<&str> = collision_confs
                .get(&destination)
                .map(|confs| confs.iter().map(String::as_str).collect())
                .unwrap_or_default();
            info!(
                "\tconflict on {} in [{}]: {} won",
                destination.display(),
                confs.join(", "),
                winner_id.module_revision_id().revision()
            );
            for (loser, report) in candidates {
                debug!("\t\tremoving conflict looser artifact: {}", report.artifact);
                if let Some(target) = targets.get_mut(&loser) {
                    target.destinations.shift_remove(&destination);
                    if target.destinations.is_empty() {
                        targets.shift_remove(&loser);
                    }
                }
            }
        }
        Ok(targets)
    }

    fn copy(&self, source: &Path, destination: &Path) -> Result<(), RetrieveError> {
        if destination.is_symlink() {
            std::fs::remove_file(destination)?;
        }
        match copy_file(source, destination, self.ctx.interrupt()) {
            Err(error) if error.kind() == io::ErrorKind::Interrupted => Err(Interrupted.into()),
            result => Ok(result?),
        }
    }

    fn symlink(&self, source: &Path, destination: &Path) -> Result<(), RetrieveError> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if destination.exists() || destination.is_symlink() {
            std::fs::remove_file(destination)?;
        }
        match make_symlink(source, destination) {
            Ok(()) => {
                trace!("linked {} to {}", destination.display(), source.display());
                Ok(())
            }
            Err(error) => {
                warn!(
                    "symlink of {} to {} failed, copying instead: {}",
                    source.display(),
                    destination.display(),
                    error
                );
                self.copy(source, destination)
            }
        }
    }
}

#[cfg(unix)]
fn make_symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, destination)
}

#[cfg(windows)]
fn make_symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, destination)
}

fn up_to_date(source: &Path, target: &Path, mode: OverwriteMode) -> bool {
    if !target.exists() {
        return false;
    }
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();
    match mode {
        OverwriteMode::Always => false,
        OverwriteMode::Never => true,
        OverwriteMode::Newer => match (modified(source), modified(target)) {
            (Some(source), Some(target)) => source <= target,
            _ => false,
        },
        OverwriteMode::Different => match (modified(source), modified(target)) {
            (Some(source), Some(target)) => source == target,
            _ => false,
        },
    }
}

/// `file` and every directory between it and `root`, relative to `root`.
fn path_files(root: &Path, file: &Path) -> Vec<PathBuf> {
    let Ok(relative) = file.strip_prefix(root) else {
        return vec![];
    };
    let mut current = PathBuf::new();
    relative
        .components()
        .map(|component| {
            current.push(component);
            current.clone()
        })
        .collect()
}

/// `path` itself when it is a file, every file under it otherwise.
fn list_all(path: &Path, ignorable: &[String]) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_ignorable(entry.file_name().to_str(), ignorable))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn is_ignorable(name: Option<&str>, ignorable: &[String]) -> bool {
    name.is_some_and(|name| ignorable.iter().any(|i| i == name))
}

/// Deletes everything under `root` that is not in `target`, both taken
/// relative to `root`.
fn sync(root: &Path, target: &HashSet<PathBuf>, ignorable: &[String]) -> Result<(), RetrieveError> {
    let walk_root = if root.as_os_str().is_empty() {
        Path::new(".")
    } else {
        root
    };
    if !walk_root.is_dir() {
        return Ok(());
    }
    let existing: Vec<PathBuf> = WalkDir::new(walk_root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_ignorable(entry.file_name().to_str(), ignorable))
        .filter_map(Result::ok)
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(walk_root)
                .ok()
                .map(Path::to_path_buf)
        })
        .collect();
    for relative in existing {
        if target.contains(&relative) {
            continue;
        }
        let path = walk_root.join(&relative);
        if path.is_symlink() || path.is_file() {
            debug!("\t\tdeleting {}", path.display());
            std::fs::remove_file(&path)?;
        } else if path.is_dir() {
            debug!("\t\tdeleting {}", path.display());
            std::fs::remove_dir_all(&path)?;
        }
    }
    Ok(())
}
