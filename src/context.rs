use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use log::{debug, error, info, trace, warn};
use thiserror::Error;

use crate::settings::Settings;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation interrupted")]
pub struct Interrupted;

/// Cooperative cancellation flag shared between the caller and long running work.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Progress and diagnostic messages. Warnings and errors are also buffered
/// so they can be replayed once the run is over.
#[derive(Debug, Default)]
pub struct Messages {
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl Messages {
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message);
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        info!("{}", message.as_ref());
    }

    pub fn verbose(&self, message: impl AsRef<str>) {
        debug!("{}", message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        trace!("{}", message.as_ref());
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Everything buffered so far, as the lines of a problems summary.
    pub fn problems_summary(&self) -> Vec<String> {
        let warnings = self.warnings();
        let errors = self.errors();
        if warnings.is_empty() && errors.is_empty() {
            return vec![];
        }
        let mut lines = vec![":: problems summary ::".to_owned()];
        if !warnings.is_empty() {
            lines.push(":::: WARNINGS".to_owned());
            lines.extend(warnings.into_iter().map(|w| format!("\t{}", w)));
        }
        if !errors.is_empty() {
            lines.push(":::: ERRORS".to_owned());
            lines.extend(errors.into_iter().map(|e| format!("\t{}", e)));
        }
        lines
    }

    /// Replays the buffered problems whatever the live log level, then
    /// empties the buffer.
    pub fn sum_up_problems(&self) {
        for line in self.problems_summary() {
            // straight to stderr, the log filter would drop them below warn
            eprintln!("{}", line);
        }
        self.clear_problems();
    }

    pub fn clear_problems(&self) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.clear();
        }
        if let Ok(mut errors) = self.errors.lock() {
            errors.clear();
        }
    }
}

/// Everything a resolve or retrieve needs from its surroundings, passed
/// explicitly instead of being looked up from the current thread.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    settings: Arc<Settings>,
    messages: Arc<Messages>,
    interrupt: Interrupt,
}

impl ResolveContext {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            messages: Arc::new(Messages::default()),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_arc(&self) -> Arc<Settings> {
        self.settings.clone()
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn check_interrupted(&self) -> Result<(), Interrupted> {
        if self.interrupt.is_raised() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::settings::SettingsBuilder;

    fn context() -> ResolveContext {
        let settings = SettingsBuilder::default()
            .cache_dir("/tmp/trellis-cache")
            .build()
            .unwrap();
        ResolveContext::new(Arc::new(settings))
    }

    #[test]
    fn problems_are_summarised() {
        let messages = Messages::default();
        assert!(messages.problems_summary().is_empty());
        messages.info("resolving");
        messages.warn("module not found: acme#util;1.0");
        messages.error("unresolved dependency");
        assert_eq!(
            messages.problems_summary(),
            vec![
                ":: problems summary ::",
                ":::: WARNINGS",
                "\tmodule not found: acme#util;1.0",
                ":::: ERRORS",
                "\tunresolved dependency",
            ]
        );
        messages.sum_up_problems();
        assert!(messages.problems_summary().is_empty());
    }

    #[test]
    fn interruption_is_observed() {
        let context = context();
        assert_eq!(context.check_interrupted(), Ok(()));
        context.interrupt().raise();
        assert_eq!(context.check_interrupted(), Err(Interrupted));
    }

}
