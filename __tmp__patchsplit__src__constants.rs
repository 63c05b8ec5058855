//! Application-wide constants for the gateway.
//!
//! Centralizes the timers and deadlines named in the bus/session contract
//! so every component references the same numbers instead of scattering
//! magic durations across modules.

use std::time::Duration;

// ============================================================================
// Session timers
// ============================================================================

/// How often `Session::ping_loop` sends a control ping.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How often `Session::idle_loop` samples activity.
pub const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum time since `last_activity` before a session is considered idle.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for any single write (ping, response, or close frame) to a client.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(5);

/// Cadence at which `Session::write` retries after a failed write, while the
/// caller's cancellation token has not yet fired.
pub const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// Bus timers
// ============================================================================

/// Deadline for a single inbound-frame publish to `backend-requests`.
pub const PUBLISH_DEADLINE: Duration = Duration::from_secs(10);

/// Initial backoff before the first publish retry.
pub const PUBLISH_RETRY_INITIAL: Duration = Duration::from_millis(100);

/// Backoff cap for publish retries.
pub const PUBLISH_RETRY_CAP: Duration = Duration::from_secs(5);

/// Maximum number of publish retries before failing with `TransportError`.
pub const PUBLISH_MAX_RETRIES: u32 = 3;

// ============================================================================
// Supervisor
// ============================================================================

/// Deadline for draining in-flight HTTP handshakes and publishes at shutdown.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(15);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timeout_greater_than_ping_interval() {
        // A client that never responds to pings must still be caught by the
        // idle timeout before it causes unbounded ping buildup.
        assert!(IDLE_TIMEOUT > PING_INTERVAL);
    }

    #[test]
    fn test_publish_retry_cap_greater_than_initial() {
        assert!(PUBLISH_RETRY_CAP > PUBLISH_RETRY_INITIAL);
    }
}


