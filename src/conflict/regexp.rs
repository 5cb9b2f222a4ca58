use log::warn;
use regex_lite::Regex;

use crate::{
    conflict::{needed_by, ConflictError, ConflictManager, ConflictOutcome, ConflictView},
    model::ModuleRevisionId,
};

/// Compares revisions through the single capturing group of a pattern,
/// e.g. `(.*)\..$` to treat `1.2.a` and `1.2.b` as the same API line.
#[derive(Debug, Clone)]
pub struct RegexpConflictManager {
    source: String,
    pattern: Regex,
    ignore_non_matching: bool,
}

impl RegexpConflictManager {
    pub const NAME: &'static str = "regexp";
    pub const DEFAULT_PATTERN: &'static str = "(.*)";

    pub fn new(pattern: &str, ignore_non_matching: bool) -> Result<Self, ConflictError> {
        let invalid = |reason: String| ConflictError::InvalidPattern(pattern.to_owned(), reason);
        let compiled = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| invalid(e.to_string()))?;
        // Group 0 is the whole match.
        if compiled.captures_len() != 2 {
            return Err(invalid("pattern does not contain ONE capturing group".to_owned()));
        }
        Ok(Self {
            source: pattern.to_owned(),
            pattern: compiled,
            ignore_non_matching,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn ignore_non_matching(&self) -> bool {
        self.ignore_non_matching
    }

    /// The captured group of `node`'s revision, or the whole revision when it
    /// does not match and non matching revisions are tolerated.
    fn group_of(&self, node: &ModuleRevisionId) -> Result<String, ConflictError> {
        let revision = node.revision();
        let message = match self.pattern.captures(revision) {
            Some(captures) => match captures.get(1) {
                Some(group) => return Ok(group.as_str().to_owned()),
                None => format!(
                    "First group of pattern: '{}' does not match: {} {}",
                    self.source, revision, node
                ),
            },
            None => format!(
                "Pattern: '{}' does not match: {} {}",
                self.source, revision, node
            ),
        };
        if self.ignore_non_matching {
            warn!("{}", message);
            Ok(revision.to_owned())
        } else {
            Err(ConflictError::StrictConflict(message))
        }
    }
}

impl ConflictManager for RegexpConflictManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_conflicts(
        &self,
        _parent: &ModuleRevisionId,
        conflicts: &[ModuleRevisionId],
        view: &dyn ConflictView,
    ) -> Result<ConflictOutcome, ConflictError> {
        let mut selected: Option<(&ModuleRevisionId, String)> = None;
        for node in conflicts {
            let group = self.group_of(node)?;
            selected = match selected {
                None => Some((node, group)),
                Some((last, last_group)) => {
                    if group != last_group {
                        return Err(ConflictError::StrictConflict(format!(
                            "{}:{} (needed by {}) conflicts with {}:{} (needed by {})",
                            last,
                            last_group,
                            needed_by(last, view),
                            node,
                            group,
                            needed_by(node, view)
                        )));
                    }
                    Some((last, last_group))
                }
            };
        }
        Ok(ConflictOutcome::Resolved(
            selected.map(|(node, _)| node.clone()).into_iter().collect(),
        ))
    }
}
