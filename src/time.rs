use chrono::{DateTime, Utc};

/// A source for the current time.
///
/// Tokens are stamped and checked against this clock, which allows pinning the time in tests.
pub trait TimeProvider: Send + Sync + 'static {
    /// Get the current time.
    fn current_time(&self) -> DateTime<Utc>;
}

/// A time provider that uses the system's wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClockTimeProvider;

impl TimeProvider for SystemClockTimeProvider {
    fn current_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
