use std::{cmp::Ordering, sync::OnceLock};

use regex_lite::Regex;

use crate::{
    model::ModuleRevisionId,
    version::{StaticComparator, VersionMatcher},
};

const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

fn timestamped() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.*)-([0-9]{8}.[0-9]{6})-([0-9]+)$").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRevision<'a> {
    pub timestamped: bool,
    pub base: &'a str,
}

/// Splits a Maven snapshot revision (`1.0-SNAPSHOT` or `1.0-20240301.101500-3`)
/// into its base revision.
pub fn snapshot_revision(revision: &str) -> Option<SnapshotRevision<'_>> {
    if revision.is_empty() {
        return None;
    }
    if let Some(captures) = timestamped().captures(revision) {
        return Some(SnapshotRevision {
            timestamped: true,
            base: captures.get(1)?.as_str(),
        });
    }
    revision
        .find(SNAPSHOT_SUFFIX)
        .filter(|_| revision.ends_with(SNAPSHOT_SUFFIX))
        .map(|index| SnapshotRevision {
            timestamped: false,
            base: &revision[..index],
        })
}

/// Only timestamped snapshots are dynamic: each one stands for the plain
/// `-SNAPSHOT` revision of the same base.
#[derive(Debug, Clone, Default)]
pub struct MavenTimedSnapshotVersionMatcher;

impl VersionMatcher for MavenTimedSnapshotVersionMatcher {
    fn name(&self) -> &str {
        "maven-timed-snapshot"
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        timestamped().is_match(asked.revision())
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        let Some(asked) = snapshot_revision(asked.revision()) else {
            return false;
        };
        if !asked.timestamped {
            return false;
        }
        snapshot_revision(found.revision()).is_some_and(|found| found.base == asked.base)
    }

    fn compare(
        &self,
        _asked: &ModuleRevisionId,
        _found: &ModuleRevisionId,
        _static_cmp: &StaticComparator,
    ) -> Ordering {
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn mrid(revision: &str) -> ModuleRevisionId {
        ModuleRevisionId::of("acme", "util", revision)
    }

    #[test]
    fn snapshot_revisions() {
        assert_eq!(
            snapshot_revision("1.0-SNAPSHOT"),
            Some(SnapshotRevision {
                timestamped: false,
                base: "1.0"
            })
        );
        assert_eq!(
            snapshot_revision("1.0-20240301.101500-3"),
            Some(SnapshotRevision {
                timestamped: true,
                base: "1.0"
            })
        );
        assert_eq!(snapshot_revision("1.0"), None);
        assert_eq!(snapshot_revision(""), None);
    }

    #[test]
    fn timestamped_snapshot_accepts_same_base() {
        let matcher = MavenTimedSnapshotVersionMatcher;
        let asked = mrid("2.1-20240301.101500-3");
        assert!(matcher.is_dynamic(&asked));
        assert!(!matcher.is_dynamic(&mrid("2.1-SNAPSHOT")));
        assert!(matcher.accept(&asked, &mrid("2.1-SNAPSHOT")));
        assert!(matcher.accept(&asked, &mrid("2.1-20240302.080000-4")));
        assert!(!matcher.accept(&asked, &mrid("2.2-SNAPSHOT")));
        assert!(!matcher.accept(&asked, &mrid("2.1")));
        assert!(!matcher.accept(&mrid("2.1-SNAPSHOT"), &mrid("2.1-SNAPSHOT")));
    }
}
