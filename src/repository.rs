use std::{
    fmt::Debug,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use log::{debug, trace};

use crate::context::{Interrupt, Interrupted};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Metadata about a named resource of a repository, looked up without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub exists: bool,
    pub content_length: u64,
    /// Milliseconds since the epoch, 0 when unknown.
    pub last_modified: i64,
    pub local: bool,
    path: Option<PathBuf>,
}

impl Resource {
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            content_length: 0,
            last_modified: 0,
            local: true,
            path: None,
        }
    }

    pub fn open(&self) -> io::Result<File> {
        match &self.path {
            Some(path) if self.exists => File::open(path),
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("resource {} does not exist", self.name),
            )),
        }
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        io::read_to_string(self.open()?)
    }
}

/// Storage holding module descriptors and artifacts under slash separated
/// names.
pub trait Repository: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Never fails: anything unreachable is reported as missing.
    fn get_resource(&self, source: &str) -> Resource;

    /// Copies `source` to `destination`, giving up with
    /// `io::ErrorKind::Interrupted` once `interrupt` is raised.
    fn get(&self, source: &str, destination: &Path, interrupt: &Interrupt) -> io::Result<()>;

    fn put(&self, source: &Path, destination: &str, overwrite: bool) -> io::Result<()>;

    /// Names of the direct children of `parent`, or `None` when listing is
    /// not possible.
    fn list(&self, parent: &str) -> Option<Vec<String>>;
}

/// Copies `source` chunk by chunk, polling `interrupt` between chunks, and
/// keeps its modification time. The partial destination is removed when
/// interrupted.
pub fn copy_file(source: &Path, destination: &Path, interrupt: &Interrupt) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut input = File::open(source)?;
    let mut output = File::create(destination)?;
    let mut buffer = vec![0; COPY_BUFFER_SIZE];
    loop {
        if interrupt.is_raised() {
            drop(output);
            std::fs::remove_file(destination)?;
            return Err(io::Error::new(io::ErrorKind::Interrupted, Interrupted));
        }
        let read = input.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        output.write_all(&buffer[..read])?;
    }
    output.set_modified(std::fs::metadata(source)?.modified()?)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FileRepository {
    name: String,
    base: PathBuf,
}

impl FileRepository {
    pub fn new(name: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base: base.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_of(&self, name: &str) -> PathBuf {
        if name.is_empty() {
            self.base.clone()
        } else {
            self.base.join(name)
        }
    }
}

impl Repository for FileRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_resource(&self, source: &str) -> Resource {
        let path = self.path_of(source);
        match std::fs::metadata(&path) {
            Ok(metadata) => {
                let last_modified = metadata
                    .modified()
                    .ok()
                    .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |duration| duration.as_millis() as i64);
                Resource {
                    name: source.to_owned(),
                    exists: true,
                    content_length: metadata.len(),
                    last_modified,
                    local: true,
                    path: Some(path),
                }
            }
            Err(error) => {
                trace!("{} is not reachable: {}", path.display(), error);
                Resource::missing(source)
            }
        }
    }

    fn get(&self, source: &str, destination: &Path, interrupt: &Interrupt) -> io::Result<()> {
        let path = self.path_of(source);
        debug!("Copying {} to {}", path.display(), destination.display());
        copy_file(&path, destination, interrupt)
    }

    fn put(&self, source: &Path, destination: &str, overwrite: bool) -> io::Result<()> {
        let path = self.path_of(destination);
        if !overwrite && path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, &path)?;
        Ok(())
    }

    fn list(&self, parent: &str) -> Option<Vec<String>> {
        let entries = std::fs::read_dir(self.path_of(parent)).ok()?;
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn repository() -> (tempfile::TempDir, FileRepository) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("acme/util/1.0")).unwrap();
        std::fs::create_dir_all(dir.path().join("acme/util/1.1")).unwrap();
        std::fs::write(dir.path().join("acme/util/1.0/util.jar"), b"jar").unwrap();
        let repository = FileRepository::new("local", dir.path());
        (dir, repository)
    }

    #[test]
    fn lookups_never_fail() {
        let (_dir, repository) = repository();
        let found = repository.get_resource("acme/util/1.0/util.jar");
        assert!(found.exists);
        assert_eq!(found.content_length, 3);
        assert!(found.last_modified > 0);
        assert_eq!(found.read_to_string().unwrap(), "jar");

        let missing = repository.get_resource("acme/util/2.0/util.jar");
        assert_eq!(missing, Resource::missing("acme/util/2.0/util.jar"));
        assert!(missing.open().is_err());
        assert_eq!(repository.list("acme/nothing"), None);
    }

    #[test]
    fn list_children() {
        let (_dir, repository) = repository();
        assert_eq!(
            repository.list("acme/util"),
            Some(vec!["1.0".to_owned(), "1.1".to_owned()])
        );
    }

    #[test]
    fn get_and_put() {
        let (dir, repository) = repository();
        let destination = dir.path().join("out/copied.jar");
        repository
            .get("acme/util/1.0/util.jar", &destination, &Interrupt::new())
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"jar");

        repository
            .put(&destination, "acme/util/1.1/util.jar", false)
            .unwrap();
        let error = repository
            .put(&destination, "acme/util/1.1/util.jar", false)
            .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::AlreadyExists);
        repository
            .put(&destination, "acme/util/1.1/util.jar", true)
            .unwrap();
    }

    #[test]
    fn interrupted_copy_leaves_no_partial_file() {
        let (dir, repository) = repository();
        let destination = dir.path().join("out/copied.jar");
        let interrupt = Interrupt::new();
        interrupt.raise();

        let error = repository
            .get("acme/util/1.0/util.jar", &destination, &interrupt)
            .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::Interrupted);
        assert!(!destination.exists());
    }

    #[test]
    fn copy_keeps_modification_time() {
        let (dir, _repository) = repository();
        let source = dir.path().join("acme/util/1.0/util.jar");
        let destination = dir.path().join("out/util.jar");
        copy_file(&source, &destination, &Interrupt::new()).unwrap();

        let modified = |path: &Path| std::fs::metadata(path).unwrap().modified().unwrap();
        assert_eq!(modified(&destination), modified(&source));
    }
}
