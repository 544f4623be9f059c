#[cfg(test)]
#[path = "throttle_test.rs"]
mod tests;

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(50);

/// Decides when accumulated text is published to the presentation layer.
/// It only ever delays a publish; the text published is always the full
/// accumulated value.
#[derive(Debug)]
pub struct RenderThrottle {
    interval: Duration,
    last_published: Option<Instant>,
}

impl RenderThrottle {
    pub fn new(interval: Duration) -> RenderThrottle {
        return RenderThrottle {
            interval,
            last_published: None,
        };
    }

    /// Called after text grew. The first offer of a session always passes,
    /// later ones only once `interval` has elapsed since the last publish.
    pub fn offer(&mut self, now: Instant) -> bool {
        let due = match self.last_published {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if due {
            self.last_published = Some(now);
        }

        return due;
    }

    /// Final publish at stream end, regardless of timing.
    pub fn finish(&mut self, now: Instant) {
        self.last_published = Some(now);
    }
}
