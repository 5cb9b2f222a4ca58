use std::{error::Error, sync::Arc};

use clap::Parser;
use trellis::{
    cli::args::{CliArgs, Command},
    resolve::ResolveOptions,
    retrieve::{OverwriteMode, RetrieveOptions},
    Trellis,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = CliArgs::parse();

    let mut builder = Trellis::builder().module_file_name(&cli_args.module_location);
    if let Some(settings) = &cli_args.settings {
        builder = builder.settings_file(settings);
    }
    if let Some(cache_directory) = &cli_args.cache_directory {
        builder = builder.cache_directory(cache_directory);
    }
    let trellis = Arc::new(builder.try_build()?);

    let interrupt = trellis.interrupt().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping at the next checkpoint");
            interrupt.raise();
        }
    });

    tokio::task::spawn_blocking(move || {
        execute(&trellis, cli_args.cmd).map_err(|e| e.to_string())
    })
    .await??;
    Ok(())
}

fn execute(trellis: &Trellis, cmd: Command) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::Resolve {
            confs,
            no_transitive,
            no_download,
            resolve_id,
            types,
        } => {
            let options = ResolveOptions {
                confs: confs_or_all(confs),
                transitive: !no_transitive,
                download: !no_download,
                resolve_id,
                artifact_types: types,
                ..Default::default()
            };
            let report = trellis.resolve(&options)?;
            if report.has_error() {
                return Err(format!(
                    "resolve of {} failed: {} unresolved dependencies, {} failed artifacts",
                    report.descriptor.mrid,
                    report.unresolved_dependencies().len(),
                    report.failed_artifacts_reports().len()
                )
                .into());
            }
            Ok(())
        }
        Command::Retrieve {
            pattern,
            ivy_pattern,
            sync,
            symlink,
            overwrite,
            confs,
            resolve_id,
            types,
        } => {
            let options = RetrieveOptions {
                confs: confs_or_all(confs),
                dest_ivy_pattern: ivy_pattern,
                sync,
                make_symlinks: symlink,
                resolve_id,
                overwrite_mode: overwrite.parse::<OverwriteMode>()?,
                artifact_types: types,
            };
            trellis.retrieve(&pattern, &options)?;
            Ok(())
        }
        Command::Report { confs, resolve_id } => trellis.report(&confs, resolve_id.as_deref()),
        Command::ClearCache => trellis.clear_cache(),
    }
}

fn confs_or_all(confs: Vec<String>) -> Vec<String> {
    if confs.is_empty() {
        vec!["*".to_owned()]
    } else {
        confs
    }
}
