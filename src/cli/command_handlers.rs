use log::{debug, info};

use crate::{
    cache::ResolutionCache,
    context::ResolveContext,
    model::ModuleDescriptor,
    report::{ResolveReport, XmlReportParser},
    resolve::{default_resolve_id, ResolveEngine, ResolveOptions},
    retrieve::{RetrieveEngine, RetrieveOptions, RetrieveReport},
};
use std::{error::Error, path::Path, sync::Arc};

/// Handler to resolve command
/// Resolves the module descriptor found at `root/module_file_name` and
/// leaves its reports in the cache for retrieve and report.
pub fn do_resolve(
    ctx: &ResolveContext,
    cache: &ResolutionCache,
    root: &Path,
    module_file_name: &Path,
    options: &ResolveOptions,
) -> Result<ResolveReport, Box<dyn Error>> {
    let module_descriptor = load_module_descriptor(root, module_file_name)?;
    let engine = ResolveEngine::new(ctx.clone(), cache.clone());
    let report = engine.resolve(Arc::new(module_descriptor), options)?;
    debug!(
        "Resolved {} dependencies of {}",
        report.dependencies().len(),
        report.descriptor.mrid
    );
    Ok(report)
}

/// Handler to retrieve command
pub fn do_retrieve(
    ctx: &ResolveContext,
    cache: &ResolutionCache,
    root: &Path,
    module_file_name: &Path,
    pattern: &str,
    options: &RetrieveOptions,
) -> Result<RetrieveReport, Box<dyn Error>> {
    let module_descriptor = load_module_descriptor(root, module_file_name)?;
    let pattern = relative_pattern(root, pattern);
    let mut options = options.clone();
    options.dest_ivy_pattern = options
        .dest_ivy_pattern
        .as_deref()
        .map(|ivy_pattern| relative_pattern(root, ivy_pattern));
    let engine = RetrieveEngine::new(ctx.clone(), cache.clone());
    Ok(engine.retrieve(&module_descriptor.mrid, &pattern, &options)?)
}

/// Handler to report command
/// Prints what the last resolve of the module selected, conf by conf.
pub fn do_report(
    cache: &ResolutionCache,
    root: &Path,
    module_file_name: &Path,
    confs: &[String],
    resolve_id: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let module_descriptor = load_module_descriptor(root, module_file_name)?;
    let mrid = &module_descriptor.mrid;
    let resolve_id = resolve_id
        .map(str::to_owned)
        .unwrap_or_else(|| default_resolve_id(mrid));
    let confs = if confs.is_empty() || confs == ["*"] {
        match cache.resolved_descriptor(mrid)? {
            Some(resolved) => resolved.configuration_names(),
            None => return Err(format!("{} has not been resolved yet", mrid).into()),
        }
    } else {
        confs.to_vec()
    };

    for conf in confs {
        let path = cache.report_path(&resolve_id, &conf);
        if !path.exists() {
            return Err(format!("No report for conf '{}': resolve it first", conf).into());
        }
        let parser = XmlReportParser::parse(&path)?;
        info!(":: {} [{}]", parser.resolved_module(), parser.conf());
        for dependency in parser.dependency_revision_ids() {
            info!("\t{}", dependency);
        }
        for artifact in parser.artifact_reports() {
            match &artifact.local_file {
                Some(location) => info!("\t\t{} -> {}", artifact.artifact, location.display()),
                None => info!("\t\t{} [{}]", artifact.artifact, artifact.status),
            }
        }
    }
    Ok(())
}

/// Handler to clear-cache command
pub fn do_clear_cache(cache: &ResolutionCache) -> Result<(), Box<dyn Error>> {
    cache.clear()?;
    Ok(())
}

fn load_module_descriptor(
    root: &Path,
    module_file_name: &Path,
) -> Result<ModuleDescriptor, Box<dyn Error>> {
    let module_path = root.join(module_file_name);
    debug!("Loading module descriptor from {}", module_path.display());
    Ok(ModuleDescriptor::from_file(&module_path)?)
}

fn relative_pattern(root: &Path, pattern: &str) -> String {
    if Path::new(pattern).is_absolute() {
        pattern.to_owned()
    } else {
        root.join(pattern).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::settings::Settings;

    #[test]
    fn relative_patterns_land_under_root() {
        assert_eq!(
            relative_pattern(Path::new("/project"), "lib/[artifact].[ext]"),
            "/project/lib/[artifact].[ext]"
        );
        assert_eq!(
            relative_pattern(Path::new("/project"), "/opt/[artifact].[ext]"),
            "/opt/[artifact].[ext]"
        );
    }

    #[test]
    fn resolve_then_retrieve_from_module_file() {
        let dir = tempfile::tempdir().unwrap();
        let repository = project_root::get_project_root()
            .unwrap()
            .join("resources/repository");
        let settings = format!(
            r#"
cache_dir = "cache"
default_resolver = "local"

[[resolvers]]
name = "local"
root = "{}"
ivy_patterns = ["[organisation]/[module]/[revision]/ivy.toml"]
artifact_patterns = ["[organisation]/[module]/[revision]/[artifact].[ext]"]
"#,
            repository.display()
        );
        std::fs::write(
            dir.path().join("trellis.toml"),
            r#"
organisation = "acme"
module = "app"
revision = "1.0"

[[dependencies]]
organisation = "acme"
module = "util"
revision = "1.+"
conf = "default->default"
"#,
        )
        .unwrap();
        let settings = Settings::from_toml_str(&settings, dir.path()).unwrap();
        let cache = ResolutionCache::new(settings.cache_dir().to_path_buf()).unwrap();
        let ctx = ResolveContext::new(Arc::new(settings));
        let module_file = Path::new("trellis.toml");

        let report = do_resolve(&ctx, &cache, dir.path(), module_file, &ResolveOptions::default())
            .unwrap();
        assert!(!report.has_error());

        let retrieved = do_retrieve(
            &ctx,
            &cache,
            dir.path(),
            module_file,
            "lib/[artifact]-[revision].[ext]",
            &RetrieveOptions::default(),
        )
        .unwrap();
        assert_eq!(retrieved.nbr_artifacts_copied(), 1);
        assert!(dir.path().join("lib/util-1.5.jar").exists());

        do_report(&cache, dir.path(), module_file, &[], None).unwrap();
        do_clear_cache(&cache).unwrap();
        assert!(!cache.report_path("acme-app", "default").exists());
    }
}
