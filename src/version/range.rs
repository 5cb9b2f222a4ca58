use std::{
    cmp::Ordering,
    sync::{Arc, OnceLock},
};

use regex_lite::Regex;

use crate::{
    model::ModuleRevisionId,
    version::{
        strategy::{LatestRevisionStrategy, LatestStrategy, RevisionInfo},
        StaticComparator, VersionMatcher,
    },
};

const OPEN: &str = r"[\[\]\(]";
const CLOSE: &str = r"[\]\[\)]";
const ANY: &str = r"[^\s,\[\]\(\)]";

struct RangePatterns {
    finite: Regex,
    lower_infinite: Regex,
    upper_infinite: Regex,
}

fn patterns() -> &'static RangePatterns {
    static PATTERNS: OnceLock<RangePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| RangePatterns {
        finite: Regex::new(&format!(
            r"^{OPEN}\s*({ANY}+)\s*,\s*({ANY}+)\s*{CLOSE}$"
        ))
        .unwrap(),
        lower_infinite: Regex::new(&format!(r"^\(\s*,\s*({ANY}+)\s*{CLOSE}$")).unwrap(),
        upper_infinite: Regex::new(&format!(r"^{OPEN}\s*({ANY}+)\s*,\s*\)$")).unwrap(),
    })
}

enum Range<'a> {
    Finite { lower: &'a str, upper: &'a str },
    LowerInfinite { upper: &'a str },
    UpperInfinite { lower: &'a str },
}

fn parse(revision: &str) -> Option<Range<'_>> {
    let patterns = patterns();
    if let Some(captures) = patterns.finite.captures(revision) {
        return Some(Range::Finite {
            lower: captures.get(1)?.as_str(),
            upper: captures.get(2)?.as_str(),
        });
    }
    if let Some(captures) = patterns.lower_infinite.captures(revision) {
        return Some(Range::LowerInfinite {
            upper: captures.get(1)?.as_str(),
        });
    }
    if let Some(captures) = patterns.upper_infinite.captures(revision) {
        return Some(Range::UpperInfinite {
            lower: captures.get(1)?.as_str(),
        });
    }
    None
}

/// Ranges such as `[1.0,2.0[`, `]1.0,)` or the Maven form `(,2.0)`.
/// A bound is inclusive when its bracket faces the range.
#[derive(Debug, Clone)]
pub struct VersionRangeMatcher {
    strategy: Arc<dyn LatestStrategy>,
}

impl Default for VersionRangeMatcher {
    fn default() -> Self {
        Self::new(Arc::new(LatestRevisionStrategy::new()))
    }
}

impl VersionRangeMatcher {
    pub fn new(strategy: Arc<dyn LatestStrategy>) -> Self {
        Self { strategy }
    }

    fn cmp_revisions(&self, a: &str, b: &str) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (a, b) = (RevisionInfo::new(a, 0), RevisionInfo::new(b, 0));
        self.strategy.compare(&a, &b).unwrap_or(Ordering::Equal)
    }

    fn above_lower(&self, lower: &str, found: &str, inclusive: bool) -> bool {
        match self.cmp_revisions(found, lower) {
            Ordering::Greater => true,
            Ordering::Equal => inclusive,
            Ordering::Less => false,
        }
    }

    fn below_upper(&self, upper: &str, found: &str, inclusive: bool) -> bool {
        match self.cmp_revisions(found, upper) {
            Ordering::Less => true,
            Ordering::Equal => inclusive,
            Ordering::Greater => false,
        }
    }
}

impl VersionMatcher for VersionRangeMatcher {
    fn name(&self) -> &str {
        "version-range"
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        parse(asked.revision()).is_some()
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        let revision = asked.revision();
        let lower_inclusive = revision.starts_with('[');
        let upper_inclusive = revision.ends_with(']');
        let found = found.revision();
        match parse(revision) {
            Some(Range::Finite { lower, upper }) => {
                self.above_lower(lower, found, lower_inclusive)
                    && self.below_upper(upper, found, upper_inclusive)
            }
            Some(Range::LowerInfinite { upper }) => self.below_upper(upper, found, upper_inclusive),
            Some(Range::UpperInfinite { lower }) => self.above_lower(lower, found, lower_inclusive),
            None => false,
        }
    }

    fn compare(
        &self,
        asked: &ModuleRevisionId,
        found: &ModuleRevisionId,
        static_cmp: &StaticComparator,
    ) -> Ordering {
        let upper = match parse(asked.revision()) {
            Some(Range::Finite { upper, .. }) | Some(Range::LowerInfinite { upper }) => upper,
            // Without an upper bound the range is always the greater one.
            Some(Range::UpperInfinite { .. }) => return Ordering::Greater,
            None => return Ordering::Equal,
        };
        match static_cmp(&asked.with_revision(upper), found) {
            Ordering::Equal => Ordering::Less,
            other => other,
        }
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
    fn range_boundaries() {
        let matcher = VersionRangeMatcher::default();
        let asked = mrid("[1.0,2.0[");
        assert!(matcher.is_dynamic(&asked));
        assert!(matcher.accept(&asked, &mrid("1.0")));
        assert!(matcher.accept(&asked, &mrid("1.5")));
        assert!(!matcher.accept(&asked, &mrid("2.0")));
        assert!(!matcher.accept(&asked, &mrid("0.9")));

        let asked = mrid("]1.0,2.0]");
        assert!(!matcher.accept(&asked, &mrid("1.0")));
        assert!(matcher.accept(&asked, &mrid("2.0")));
        assert!(matcher.accept(&asked, &mrid("1.10")));
    }

    #[test]
    fn open_ended_ranges() {
        let matcher = VersionRangeMatcher::default();
        assert!(matcher.accept(&mrid("[1.0,)"), &mrid("15.3")));
        assert!(!matcher.accept(&mrid("]1.0,)"), &mrid("1.0")));
        assert!(matcher.accept(&mrid("(,2.0]"), &mrid("2.0")));
        assert!(!matcher.accept(&mrid("(,2.0["), &mrid("2.0")));
        assert!(matcher.accept(&mrid("(,2.0)"), &mrid("0.1")));
        assert!(matcher.accept(&mrid("[ 1.0 , 2.0 ]"), &mrid("1.2")));
    }

    #[test]
    fn not_a_range() {
        let matcher = VersionRangeMatcher::default();
        assert!(!matcher.is_dynamic(&mrid("1.0")));
        assert!(!matcher.is_dynamic(&mrid("[1.0]")));
        assert!(!matcher.is_dynamic(&mrid("latest.integration")));
        assert!(!matcher.accept(&mrid("1.0"), &mrid("1.0")));
    }

    #[test]
    fn compare_against_upper_bound() {
        let matcher = VersionRangeMatcher::default();
        let strategy = LatestRevisionStrategy::new();
        let cmp = |a: &ModuleRevisionId, b: &ModuleRevisionId| strategy.compare_ids(a, b);
        assert_eq!(
            matcher.compare(&mrid("[1.0,)"), &mrid("99"), &cmp),
            Ordering::Greater
        );
        assert_eq!(
            matcher.compare(&mrid("[1.0,2.0]"), &mrid("2.0"), &cmp),
            Ordering::Less
        );
        assert_eq!(
            matcher.compare(&mrid("[1.0,2.0]"), &mrid("1.5"), &cmp),
            Ordering::Greater
        );
        assert_eq!(
            matcher.compare(&mrid("[1.0,2.0]"), &mrid("3.0"), &cmp),
            Ordering::Less
        );
    }
}
