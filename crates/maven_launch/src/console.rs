//! Launch console transcript

/// Sink for the human-readable launch transcript
pub trait Console: Send + Sync {
    fn log_message(&self, message: &str);
}

/// Writes the transcript through the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConsole;

impl Console for LogConsole {
    fn log_message(&self, message: &str) {
        log::info!(target: "maven_launch::console", "{}", message);
    }
}
