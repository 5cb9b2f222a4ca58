use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Status {
    pub name: String,
    #[serde(default)]
    pub integration: bool,
}

impl Status {
    pub fn new(name: impl Into<String>, integration: bool) -> Self {
        Self {
            name: name.into(),
            integration,
        }
    }
}

/// Ordered ladder of publication statuses, most mature first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusManager {
    statuses: Vec<Status>,
    default_status: String,
}

impl Default for StatusManager {
    fn default() -> Self {
        Self {
            statuses: vec![
                Status::new("release", false),
                Status::new("milestone", false),
                Status::new("integration", true),
            ],
            default_status: "integration".to_owned(),
        }
    }
}

impl StatusManager {
    pub fn new(statuses: Vec<Status>, default_status: Option<String>) -> Self {
        let default_status = default_status
            .or_else(|| {
                statuses
                    .iter()
                    .find(|s| s.integration)
                    .or(statuses.last())
                    .map(|s| s.name.clone())
            })
            .unwrap_or_else(|| "integration".to_owned());
        Self {
            statuses,
            default_status,
        }
    }

    pub fn statuses(&self) -> &[Status] {
        &self.statuses
    }

    /// Lower is more mature. Unknown statuses rank below every known one.
    pub fn priority(&self, status: &str) -> usize {
        self.statuses
            .iter()
            .position(|s| s.name == status)
            .unwrap_or(usize::MAX)
    }

    pub fn is_integration(&self, status: &str) -> bool {
        self.statuses
            .iter()
            .find(|s| s.name == status)
            .is_some_and(|s| s.integration)
    }

    pub fn default_status(&self) -> &str {
        &self.default_status
    }

    pub fn lowest(&self) -> Option<&Status> {
        self.statuses.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn default_ladder() {
        let manager = StatusManager::default();
        assert_eq!(manager.priority("release"), 0);
        assert_eq!(manager.priority("integration"), 2);
        assert_eq!(manager.priority("nightly"), usize::MAX);
        assert!(manager.is_integration("integration"));
        assert!(!manager.is_integration("release"));
        assert_eq!(manager.lowest().map(|s| s.name.as_str()), Some("integration"));
    }

    #[test]
    fn default_status_falls_back_to_integration_flag() {
        let manager = StatusManager::new(
            vec![Status::new("gold", false), Status::new("snapshot", true)],
            None,
        );
        assert_eq!(manager.default_status(), "snapshot");
    }
}
