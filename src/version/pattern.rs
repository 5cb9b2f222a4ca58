use std::{cmp::Ordering, collections::HashMap};

use log::warn;
use serde::Deserialize;

use crate::{
    matcher::{CompiledPattern, PatternMatcherKind},
    model::ModuleRevisionId,
    pattern::{substitute_params, substitute_variables},
    version::{StaticComparator, VersionMatcher},
};

/// A user-declared revision alias, e.g. `revision = "compatible"` with
/// `pattern = "${major}\.\d+"` and `args = "major"`, asked as
/// `compatible(2)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Match {
    pub revision: String,
    pub pattern: String,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub matcher: PatternMatcherKind,
}

fn split_args(args: &str) -> Vec<String> {
    args.split([',', ' '])
        .filter(|a| !a.is_empty())
        .map(str::to_owned)
        .collect()
}

fn revision_args(revision: &str) -> Vec<String> {
    let Some(start) = revision.find('(') else {
        return vec![];
    };
    match revision.find(')') {
        Some(end) if end > start + 1 => split_args(&revision[start + 1..end]),
        _ => vec![],
    }
}

impl Match {
    pub fn pattern_for(&self, asked: &ModuleRevisionId) -> CompiledPattern {
        let names = self.args.as_deref().map(split_args).unwrap_or_default();
        let values = revision_args(asked.revision());
        if names.len() != values.len() {
            return CompiledPattern::Never;
        }
        let arguments: HashMap<String, String> = names.into_iter().zip(values).collect();
        let pattern = substitute_variables(&self.pattern, &arguments)
            .and_then(|pattern| substitute_params(&pattern, &arguments));
        match pattern {
            Ok(pattern) => self.matcher.compile(&pattern),
            Err(error) => {
                warn!("Ignoring revision pattern `{}`: {}", self.pattern, error);
                CompiledPattern::Never
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternVersionMatcher {
    name: String,
    matches: HashMap<String, Vec<Match>>,
}

impl PatternVersionMatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matches: HashMap::new(),
        }
    }

    pub fn add_match(&mut self, rule: Match) {
        self.matches
            .entry(rule.revision.clone())
            .or_default()
            .push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    fn rules_for(&self, asked: &ModuleRevisionId) -> Option<&Vec<Match>> {
        let revision = asked.revision();
        let key = match revision.find('(') {
            Some(index) if index > 0 => &revision[..index],
            _ => revision,
        };
        self.matches.get(key)
    }
}

impl VersionMatcher for PatternVersionMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dynamic(&self, asked: &ModuleRevisionId) -> bool {
        self.rules_for(asked).is_some()
    }

    fn accept(&self, asked: &ModuleRevisionId, found: &ModuleRevisionId) -> bool {
        self.rules_for(asked).is_some_and(|rules| {
            rules
                .iter()
                .any(|rule| rule.pattern_for(asked).matches(found.revision()))
        })
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

    fn mrid(revision: &str) -> ModuleRevisionId {
        ModuleRevisionId::of("acme", "util", revision)
    }

    fn matcher() -> PatternVersionMatcher {
        let mut matcher = PatternVersionMatcher::new("compat");
        matcher.add_match(Match {
            revision: "compatible".to_owned(),
            pattern: r"${major}\.\d+".to_owned(),
            args: Some("major".to_owned()),
            matcher: PatternMatcherKind::Regexp,
        });
        matcher.add_match(Match {
            revision: "stable".to_owned(),
            pattern: "@{line}.*-final".to_owned(),
            args: Some("line".to_owned()),
            matcher: PatternMatcherKind::Glob,
        });
        matcher
    }

    #[test]
    fn arguments_are_substituted() {
        let matcher = matcher();
        assert!(matcher.is_dynamic(&mrid("compatible(2)")));
        assert!(!matcher.is_dynamic(&mrid("2.0")));
        assert!(matcher.accept(&mrid("compatible(2)"), &mrid("2.13")));
        assert!(!matcher.accept(&mrid("compatible(2)"), &mrid("3.0")));
        assert!(matcher.accept(&mrid("stable(1.4)"), &mrid("1.4.2-final")));
        assert!(!matcher.accept(&mrid("stable(1.4)"), &mrid("1.4.2")));
    }

    #[test]
    fn argument_count_must_match() {
        let matcher = matcher();
        assert!(!matcher.accept(&mrid("compatible"), &mrid("2.13")));
        assert!(!matcher.accept(&mrid("compatible(2, 3)"), &mrid("2.13")));
    }
}
