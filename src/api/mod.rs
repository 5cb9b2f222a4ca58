use std::{error::Error, path::PathBuf};

use crate::{
    cache::ResolutionCache,
    cli::command_handlers::{do_clear_cache, do_report, do_resolve, do_retrieve},
    context::{Interrupt, ResolveContext},
    report::ResolveReport,
    resolve::ResolveOptions,
    retrieve::{RetrieveOptions, RetrieveReport},
    settings::Settings,
};

mod builder;

pub use builder::TrellisBuilder;

pub struct Trellis {
    ctx: ResolveContext,
    cache: ResolutionCache,
    root: PathBuf,
    module_file_name: PathBuf,
}

impl Trellis {
    pub fn builder() -> TrellisBuilder {
        TrellisBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        self.ctx.settings()
    }

    /// Raising it stops a running resolve or retrieve at its next checkpoint.
    pub fn interrupt(&self) -> &Interrupt {
        self.ctx.interrupt()
    }

    /// Resolves the dependencies of the module descriptor
    pub fn resolve(&self, options: &ResolveOptions) -> Result<ResolveReport, Box<dyn Error>> {
        do_resolve(
            &self.ctx,
            &self.cache,
            &self.root,
            &self.module_file_name,
            options,
        )
    }

    /// Copies the artifacts of the last resolve to `pattern`, relative to the root
    pub fn retrieve(
        &self,
        pattern: &str,
        options: &RetrieveOptions,
    ) -> Result<RetrieveReport, Box<dyn Error>> {
        do_retrieve(
            &self.ctx,
            &self.cache,
            &self.root,
            &self.module_file_name,
            pattern,
            options,
        )
    }

    /// Logs the outcome of the last resolve
    pub fn report(&self, confs: &[String], resolve_id: Option<&str>) -> Result<(), Box<dyn Error>> {
        do_report(
            &self.cache,
            &self.root,
            &self.module_file_name,
            confs,
            resolve_id,
        )
    }

    pub fn clear_cache(&self) -> Result<(), Box<dyn Error>> {
        do_clear_cache(&self.cache)
    }
}
