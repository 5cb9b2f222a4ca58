//! Version matchers decide whether a concrete revision satisfies an asked
//! one, and order dynamic revisions against concrete ones.

use std::{cmp::Ordering, fmt::Debug, sync::Arc};

use crate::model::{ModuleDescriptor, ModuleRevisionId};

mod pattern;
mod range;
mod snapshot;
pub mod status;
pub mod strategy;

pub use pattern::{Match, PatternVersionMatcher};
pub use range::VersionRangeMatcher;
pub use snapshot::MavenTimedSnapshotVersionMatcher;
pub use status::{Status, StatusManager};
pub use strategy::{
    ArtifactInfo, LatestLexicoStrategy, LatestRevisionStrategy, LatestStrategy,
    LatestTimeStrategy, RevisionInfo, Undecidable,
};

pub type StaticComparator<'a> = dyn Fn(&ModuleRevisionId, &ModuleRevisionId) -> Ordering + 'a;

pub trait VersionMatcher: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// True when `asked` may match more than one concrete revision.
    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool;

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool;

    /// True when `accept` cannot decide from the ids alone.
    fn need_module_descriptor(&self, _asked: &ModuleRevisionId, _found: &ModuleRevisionId) -> bool {
        false
    }

    fn accept_descriptor(&self, asked: &ModuleRevisionId, found: &ModuleDescriptor) -> bool {
        self.accept(asked, &found.mrid)
    }

    /// Orders the dynamic `asked` against the concrete `found`. `Equal` means
    /// the matcher cannot tell.
    fn compare(
        &self,
        asked: &ModuleRevisionId,
        found: &ModuleRevisionId,
        static_cmp: &StaticComparator,
    ) -> Ordering;
}

#[derive(Debug, Clone, Default)]
pub struct ExactVersionMatcher;

impl VersionMatcher for ExactVersionMatcher {
    fn name(&self) -> &str {
        "exact"
    }

    fn is_dynamic(&self, _asked: &ModuleRevisionId) -> bool {
        false
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        asked == found
    }

    fn compare(
        &self,
        asked: &ModuleRevisionId,
        found: &ModuleRevisionId,
        static_cmp: &StaticComparator,
    ) -> Ordering {
        static_cmp(asked, found)
    }
}

/// `1.2.+` style revisions.
#[derive(Debug, Clone, Default)]
pub struct SubVersionMatcher;

impl SubVersionMatcher {
    fn prefix(asked: &ModuleRevisionId) -> &str {
        asked.revision().strip_suffix('+').unwrap_or(asked.revision())
    }
}

impl VersionMatcher for SubVersionMatcher {
    fn name(&self) -> &str {
        "sub-revision"
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        asked.revision().ends_with('+')
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        let prefix = Self::prefix(asked);
        found.revision().starts_with(prefix)
            || prefix
                .strip_suffix('.')
                .is_some_and(|base| !base.is_empty() && found.revision() == base)
    }

    fn compare(
        &self,
        asked: &ModuleRevisionId,
        found: &ModuleRevisionId,
        static_cmp: &StaticComparator,
    ) -> Ordering {
        if found.revision().starts_with(Self::prefix(asked)) {
            Ordering::Greater
        } else {
            static_cmp(asked, found)
        }
    }
}

/// `latest.<status>` revisions, filtered through the status ladder.
#[derive(Debug, Clone)]
pub struct LatestVersionMatcher {
    statuses: Arc<StatusManager>,
}

impl LatestVersionMatcher {
    const PREFIX: &'static str = "latest.";

    pub fn new(statuses: Arc<StatusManager>) -> Self {
        Self { statuses }
    }

    fn asks_lowest(&self, asked: &ModuleRevisionId) -> bool {
        match (
            asked.revision().strip_prefix(Self::PREFIX),
            self.statuses.lowest(),
        ) {
            (Some(status), Some(lowest)) => status == lowest.name,
            _ => false,
        }
    }
}

impl VersionMatcher for LatestVersionMatcher {
    fn name(&self) -> &str {
        "latest"
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        asked.revision().starts_with(Self::PREFIX)
    }

    fn accept(&self, _asked: &ModuleRevisionId, _found: &ModuleRevisionId) -> bool {
        true
    }

    fn need_module_descriptor(&self, asked: &ModuleRevisionId, _found: &ModuleRevisionId) -> bool {
        !self.asks_lowest(asked)
    }

    fn accept_descriptor(&self, asked: &ModuleRevisionId, found: &ModuleDescriptor) -> bool {
        if asked.branch() != found.mrid.branch() {
            return false;
        }
        let asked_status = asked
            .revision()
            .strip_prefix(Self::PREFIX)
            .unwrap_or(asked.revision());
        self.statuses.priority(asked_status) >= self.statuses.priority(&found.status)
    }

    fn compare(
        &self,
        asked: &ModuleRevisionId,
        _found: &ModuleRevisionId,
        _static_cmp: &StaticComparator,
    ) -> Ordering {
        // Only the lowest status is known to accept every revision.
        if self.asks_lowest(asked) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

/// Tries matchers in precedence order. Every operation but `is_dynamic` is
/// delegated to the first matcher that finds the asked revision dynamic, or
/// to the last one.
#[derive(Debug, Clone, Default)]
pub struct ChainVersionMatcher {
    matchers: Vec<Arc<dyn VersionMatcher>>,
}

impl ChainVersionMatcher {
    pub fn new(matchers: Vec<Arc<dyn VersionMatcher>>) -> Self {
        Self { matchers }
    }

    /// The matchers used when nothing else is configured.
    pub fn with_defaults(statuses: Arc<StatusManager>, patterns: Option<PatternVersionMatcher>) -> Self {
        let mut chain = Self::new(vec![Arc::new(ExactVersionMatcher) as Arc<dyn VersionMatcher>]);
        if let Some(patterns) = patterns {
            chain.add(Arc::new(patterns));
        }
        chain.add(Arc::new(LatestVersionMatcher::new(statuses)));
        chain.add(Arc::new(SubVersionMatcher));
        chain.add(Arc::new(VersionRangeMatcher::default()));
        chain.add(Arc::new(MavenTimedSnapshotVersionMatcher));
        chain
    }

    /// Gives `matcher` precedence over the ones already in the chain.
    pub fn add(&mut self, matcher: Arc<dyn VersionMatcher>) {
        self.matchers.insert(0, matcher);
    }

    pub fn matchers(&self) -> &[Arc<dyn VersionMatcher>] {
        &self.matchers
    }

    fn delegate(&self, asked: &ModuleRevisionId) -> Option<&Arc<dyn VersionMatcher>> {
        self.matchers
            .iter()
            .find(|m| m.is_dynamic(asked))
            .or(self.matchers.last())
    }
}

impl VersionMatcher for ChainVersionMatcher {
    fn name(&self) -> &str {
        "chain"
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        self.matchers.iter().any(|m| m.is_dynamic(asked))
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        self.delegate(asked).is_some_and(|m| m.accept(asked, found))
    }

    fn need_module_descriptor(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        self.delegate(asked)
            .is_some_and(|m| m.need_module_descriptor(asked, found))
    }

    fn accept_descriptor(&self, asked: &ModuleRevisionId, found: &ModuleDescriptor) -> bool {
        self.delegate(asked)
            .is_some_and(|m| m.accept_descriptor(asked, found))
    }

    fn compare(
        &self,
        asked: &ModuleRevisionId,
        found: &ModuleRevisionId,
        static_cmp: &StaticComparator,
    ) -> Ordering {
        match self.delegate(asked) {
            Some(matcher) => matcher.compare(asked, found, static_cmp),
            None => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn mrid(revision: &str) -> ModuleRevisionId {
        ModuleRevisionId::of("acme", "util", revision)
    }

    #[test]
    fn sub_version_prefix() {
        let matcher = SubVersionMatcher;
        assert!(matcher.is_dynamic(&mrid("1.2.+")));
        assert!(!matcher.is_dynamic(&mrid("1.2")));
        assert!(matcher.accept(&mrid("1.2.+"), &mrid("1.2.3")));
        assert!(matcher.accept(&mrid("1.2.+"), &mrid("1.2")));
        assert!(!matcher.accept(&mrid("1.2.+"), &mrid("1.3.0")));
        assert!(!matcher.accept(&mrid("1.2.+"), &mrid("1.20")));
        let strategy = LatestRevisionStrategy::new();
        let cmp = |a: &ModuleRevisionId, b: &ModuleRevisionId| strategy.compare_ids(a, b);
        assert_eq!(
            matcher.compare(&mrid("1.2.+"), &mrid("1.2.9"), &cmp),
            Ordering::Greater
        );
        assert_eq!(
            matcher.compare(&mrid("1.2.+"), &mrid("1.3"), &cmp),
            Ordering::Less
        );
    }

    fn descriptor(revision: &str, status: &str) -> ModuleDescriptor {
        let mut descriptor = ModuleDescriptor::default_for(mrid(revision), Utc::now());
        descriptor.status = status.to_owned();
        descriptor
    }

    #[test]
    fn latest_status_uses_the_ladder() {
        let matcher = LatestVersionMatcher::new(Arc::new(StatusManager::default()));
        let asked = mrid("latest.milestone");
        assert!(matcher.is_dynamic(&asked));
        assert!(matcher.need_module_descriptor(&asked, &mrid("1.0")));
        assert!(!matcher.need_module_descriptor(&mrid("latest.integration"), &mrid("1.0")));
        assert!(matcher.accept_descriptor(&asked, &descriptor("1.0", "release")));
        assert!(matcher.accept_descriptor(&asked, &descriptor("1.0", "milestone")));
        assert!(!matcher.accept_descriptor(&asked, &descriptor("1.0", "integration")));

        let branched = mrid("latest.milestone").with_branch(Some("feature".to_owned()));
        assert!(!matcher.accept_descriptor(&branched, &descriptor("1.0", "release")));
    }

    #[derive(Debug)]
    struct StubMatcher {
        dynamic: bool,
        accepts: bool,
        calls: AtomicUsize,
    }

    impl StubMatcher {
        fn new(dynamic: bool, accepts: bool) -> Arc<Self> {
            Arc::new(Self {
                dynamic,
                accepts,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl VersionMatcher for StubMatcher {
        fn name(&self) -> &str {
            "stub"
        }

        fn is_dynamic(&self, _asked: &ModuleRevisionId) -> bool {
            self.dynamic
        }

        fn accept(&self, _asked: &ModuleRevisionId, _found: &ModuleRevisionId) -> bool {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.accepts
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

    #[test]
    fn chain_delegates_to_first_dynamic_matcher() {
        let a = StubMatcher::new(false, false);
        let b = StubMatcher::new(true, true);
        let chain = ChainVersionMatcher::new(vec![a.clone() as Arc<dyn VersionMatcher>, b.clone()]);
        assert!(chain.is_dynamic(&mrid("x")));
        assert!(chain.accept(&mrid("x"), &mrid("1.0")));
        assert_eq!(a.calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(b.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn chain_falls_back_to_last_matcher() {
        let a = StubMatcher::new(false, false);
        let b = StubMatcher::new(false, true);
        let chain = ChainVersionMatcher::new(vec![a.clone() as Arc<dyn VersionMatcher>, b.clone()]);
        assert!(!chain.is_dynamic(&mrid("x")));
        assert!(chain.accept(&mrid("x"), &mrid("1.0")));
        assert_eq!(a.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn default_chain() {
        let chain = ChainVersionMatcher::with_defaults(Arc::new(StatusManager::default()), None);
        let names: Vec<&str> = chain.matchers().iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["maven-timed-snapshot", "version-range", "sub-revision", "latest", "exact"]
        );
        assert!(chain.accept(&mrid("[1.0,2.0["), &mrid("1.5")));
        assert!(!chain.accept(&mrid("[1.0,2.0["), &mrid("2.0")));
        assert!(chain.accept(&mrid("1.0"), &mrid("1.0")));
        assert!(!chain.accept(&mrid("1.0"), &mrid("1.1")));
        assert!(chain.accept(&mrid("1.+"), &mrid("1.9")));
        assert!(!chain.is_dynamic(&mrid("1.0-SNAPSHOT")));
    }
}
