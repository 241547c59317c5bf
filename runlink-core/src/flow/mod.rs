pub mod location;
pub mod registration;

use std::time::Duration;

/// Fixed delays used by the flows. Tests shrink these; production uses the
/// defaults observed by the original client.
#[derive(Debug, Clone)]
pub struct FlowTiming {
    /// Pause before the next scripted prompt appears.
    pub prompt_delay: Duration,
    /// Window given to any remote call before it is surfaced as retryable.
    pub remote_timeout: Duration,
    /// Inter-message delay for a first history replay.
    pub replay_stagger: Duration,
    /// Wait before an OTP resend is allowed.
    pub otp_resend_cooldown: Duration,
}

impl Default for FlowTiming {
    fn default() -> Self {
        Self {
            prompt_delay: Duration::from_millis(800),
            remote_timeout: Duration::from_secs(8),
            replay_stagger: Duration::from_millis(600),
            otp_resend_cooldown: Duration::from_secs(30),
        }
    }
}

impl FlowTiming {
    /// All delays collapsed to zero. Keeps tests that don't exercise timing
    /// from waiting on the clock.
    pub fn immediate() -> Self {
        Self {
            prompt_delay: Duration::ZERO,
            remote_timeout: Duration::from_secs(8),
            replay_stagger: Duration::ZERO,
            otp_resend_cooldown: Duration::ZERO,
        }
    }
}
