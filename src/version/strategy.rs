use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, OnceLock},
};

use regex_lite::Regex;
use thiserror::Error;

use crate::{model::ModuleRevisionId, version::VersionMatcher};

/// Raised when an ordering needs a last-modified time that is not known yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("last modified time of {0} is not known yet")]
pub struct Undecidable(pub String);

/// Something a latest strategy can order.
pub trait ArtifactInfo {
    fn revision(&self) -> &str;
    fn last_modified(&self) -> Result<i64, Undecidable>;
}

/// A bare revision with a known timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionInfo {
    pub revision: String,
    pub last_modified: i64,
}

impl RevisionInfo {
    pub fn new(revision: impl Into<String>, last_modified: i64) -> Self {
        Self {
            revision: revision.into(),
            last_modified,
        }
    }
}

impl ArtifactInfo for RevisionInfo {
    fn revision(&self) -> &str {
        &self.revision
    }

    fn last_modified(&self) -> Result<i64, Undecidable> {
        Ok(self.last_modified)
    }
}

pub trait LatestStrategy: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn compare(&self, a: &dyn ArtifactInfo, b: &dyn ArtifactInfo)
        -> Result<Ordering, Undecidable>;

    /// Index of the latest element. Among equally late elements the first
    /// one in input order wins.
    fn find_latest(&self, infos: &[&dyn ArtifactInfo]) -> Result<Option<usize>, Undecidable> {
        let mut latest: Option<usize> = None;
        for (index, info) in infos.iter().enumerate() {
            latest = match latest {
                None => Some(index),
                Some(current) => {
                    if self.compare(*info, infos[current])? == Ordering::Greater {
                        Some(index)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        Ok(latest)
    }

    /// Indices sorted from oldest to latest. Stable for equal elements.
    fn sort(&self, infos: &[&dyn ArtifactInfo]) -> Result<Vec<usize>, Undecidable> {
        let mut failure: Option<Undecidable> = None;
        let mut indices: Vec<usize> = (0..infos.len()).collect();
        indices.sort_by(|&a, &b| match self.compare(infos[a], infos[b]) {
            Ok(ordering) => ordering,
            Err(error) => {
                failure.get_or_insert(error);
                Ordering::Equal
            }
        });
        match failure {
            Some(error) => Err(error),
            None => Ok(indices),
        }
    }
}

fn letter_digit() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([a-zA-Z])(\d)").unwrap())
}

fn digit_letter() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d)([a-zA-Z])").unwrap())
}

fn separators() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[._\-+]").unwrap())
}

fn split_revision(revision: &str) -> Vec<String> {
    let revision = letter_digit().replace_all(revision, "${1}.${2}");
    let revision = digit_letter().replace_all(&revision, "${1}.${2}");
    let mut parts: Vec<String> = separators()
        .split(&revision)
        .map(str::to_owned)
        .collect();
    while parts.len() > 1 && parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

fn is_number(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Orders revisions numerically where they are numbers, with a few words
/// carrying special meaning (`dev` < unknown words < `rc` < `final`).
#[derive(Debug, Clone)]
pub struct LatestRevisionStrategy {
    special_meanings: HashMap<String, i32>,
    version_matcher: Option<Arc<dyn VersionMatcher>>,
}

impl Default for LatestRevisionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestRevisionStrategy {
    pub const NAME: &'static str = "latest-revision";

    pub fn new() -> Self {
        let special_meanings = HashMap::from([
            ("dev".to_owned(), -1),
            ("rc".to_owned(), 1),
            ("final".to_owned(), 2),
        ]);
        Self {
            special_meanings,
            version_matcher: None,
        }
    }

    pub fn with_special_meaning(mut self, name: &str, value: i32) -> Self {
        self.special_meanings.insert(name.to_lowercase(), value);
        self
    }

    /// Lets dynamic revisions take part in comparisons through `matcher`.
    pub fn with_version_matcher(mut self, matcher: Arc<dyn VersionMatcher>) -> Self {
        self.version_matcher = Some(matcher);
        self
    }

    pub fn compare_revisions(&self, rev1: &str, rev2: &str) -> Ordering {
        if rev1 == rev2 {
            return Ordering::Equal;
        }
        let parts1 = split_revision(rev1);
        let parts2 = split_revision(rev2);

        let common = parts1.len().min(parts2.len());
        for i in 0..common {
            let (p1, p2) = (&parts1[i], &parts2[i]);
            if p1 == p2 {
                continue;
            }
            match (is_number(p1), is_number(p2)) {
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (true, true) => return compare_numbers(p1, p2),
                (false, false) => {}
            }
            let sm1 = self.special_meanings.get(&p1.to_lowercase());
            let sm2 = self.special_meanings.get(&p2.to_lowercase());
            return match (sm1, sm2) {
                (Some(sm1), sm2) => sm1.cmp(sm2.unwrap_or(&0)),
                (None, Some(sm2)) => 0.cmp(sm2),
                (None, None) => p1.cmp(p2),
            };
        }
        if parts1.len() > common {
            return if is_number(&parts1[common]) {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        if parts2.len() > common {
            return if is_number(&parts2[common]) {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        Ordering::Equal
    }

    pub fn compare_ids(&self, a: &ModuleRevisionId, b: &ModuleRevisionId) -> Ordering {
        self.compare_revisions(a.revision(), b.revision())
    }
}

impl LatestStrategy for LatestRevisionStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(
        &self,
        a: &dyn ArtifactInfo,
        b: &dyn ArtifactInfo,
    ) -> Result<Ordering, Undecidable> {
        let (rev1, rev2) = (a.revision(), b.revision());
        if let Some(matcher) = &self.version_matcher {
            let mrid1 = ModuleRevisionId::of("", "", rev1);
            let mrid2 = ModuleRevisionId::of("", "", rev2);
            let static_cmp = |x: &ModuleRevisionId, y: &ModuleRevisionId| self.compare_ids(x, y);
            // A dynamic revision is considered later unless the matcher knows better.
            if matcher.is_dynamic(&mrid1) {
                return Ok(match matcher.compare(&mrid1, &mrid2, &static_cmp) {
                    Ordering::Less => Ordering::Less,
                    _ => Ordering::Greater,
                });
            }
            if matcher.is_dynamic(&mrid2) {
                return Ok(match matcher.compare(&mrid2, &mrid1, &static_cmp) {
                    Ordering::Less => Ordering::Greater,
                    _ => Ordering::Less,
                });
            }
        }
        Ok(self.compare_revisions(rev1, rev2))
    }
}

/// Orders by plain string comparison; `latest*` revisions sort last.
#[derive(Debug, Clone, Default)]
pub struct LatestLexicoStrategy;

impl LatestLexicoStrategy {
    pub const NAME: &'static str = "latest-lexico";
}

impl LatestStrategy for LatestLexicoStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(
        &self,
        a: &dyn ArtifactInfo,
        b: &dyn ArtifactInfo,
    ) -> Result<Ordering, Undecidable> {
        let (rev1, rev2) = (a.revision(), b.revision());
        Ok(match (rev1.starts_with("latest"), rev2.starts_with("latest")) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => rev1.cmp(rev2),
        })
    }
}

/// Orders by last-modified time.
#[derive(Debug, Clone, Default)]
pub struct LatestTimeStrategy;

impl LatestTimeStrategy {
    pub const NAME: &'static str = "latest-time";
}

impl LatestStrategy for LatestTimeStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compare(
        &self,
        a: &dyn ArtifactInfo,
        b: &dyn ArtifactInfo,
    ) -> Result<Ordering, Undecidable> {
        Ok(a.last_modified()?.cmp(&b.last_modified()?))
    }
}
