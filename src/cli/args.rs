use clap::Parser;

/// Dependency resolution and retrieval for TOML module descriptors.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    #[clap(short, long, default_value = "trellis.toml")]
    pub module_location: String,
    /// Settings file, `trellis-settings.toml` next to the module when present
    #[clap(short, long)]
    pub settings: Option<String>,
    #[clap(short, long)]
    pub cache_directory: Option<String>,
}

#[derive(Debug, Parser)]
pub enum Command {
    ///Resolves the dependencies of the module and downloads their artifacts into the cache
    Resolve {
        /// Confs to resolve, all of them by default
        #[clap(long = "conf", value_delimiter = ',')]
        confs: Vec<String>,
        #[clap(long)]
        no_transitive: bool,
        #[clap(long)]
        no_download: bool,
        #[clap(long)]
        resolve_id: Option<String>,
        /// Artifact types to download, all of them by default
        #[clap(long = "type", value_delimiter = ',')]
        types: Vec<String>,
    },
    ///Copies the artifacts of the last resolve to the given pattern
    Retrieve {
        pattern: String,
        #[clap(long)]
        ivy_pattern: Option<String>,
        /// Deletes files under the destination that were not retrieved
        #[clap(long)]
        sync: bool,
        #[clap(long)]
        symlink: bool,
        /// One of never, always, newer, different
        #[clap(long, default_value = "newer")]
        overwrite: String,
        #[clap(long = "conf", value_delimiter = ',')]
        confs: Vec<String>,
        #[clap(long)]
        resolve_id: Option<String>,
        #[clap(long = "type", value_delimiter = ',')]
        types: Vec<String>,
    },
    ///Lists the revisions and artifacts selected by the last resolve
    Report {
        #[clap(long = "conf", value_delimiter = ',')]
        confs: Vec<String>,
        #[clap(long)]
        resolve_id: Option<String>,
    },
    ///Deletes the resolution cache
    ClearCache,
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_retrieve() {
        let args = CliArgs::parse_from([
            "trellis",
            "--cache-directory",
            "/tmp/cache",
            "retrieve",
            "lib/[artifact].[ext]",
            "--sync",
            "--conf",
            "default,test",
        ]);
        assert_eq!(args.module_location, "trellis.toml");
        assert_eq!(args.cache_directory.as_deref(), Some("/tmp/cache"));
        match args.cmd {
            Command::Retrieve {
                pattern,
                sync,
                confs,
                overwrite,
                ..
            } => {
                assert_eq!(pattern, "lib/[artifact].[ext]");
                assert!(sync);
                assert_eq!(confs, vec!["default", "test"]);
                assert_eq!(overwrite, "newer");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
