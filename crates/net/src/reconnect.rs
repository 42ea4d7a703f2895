//! Reconnect backoff and heartbeat liveness.
//!
//! Reconnection delays grow exponentially from a base delay and give up
//! after a fixed number of attempts. Liveness is a ping/pong exchange on a
//! fixed interval; a connection that misses two intervals is presumed dead.

use crate::protocol::Envelope;
use crate::transport::ClientEndpoint;
use anyhow::Result;
use gridtown_core::Millis;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

/// How often a heartbeat ping is sent on an idle connection.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Backoff schedule for reconnect attempts.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; doubles each attempt after that.
    pub base_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before `attempt` (1-based): `base * 2^(attempt-1)`.
    /// `None` once the attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * 2u32.saturating_pow(attempt - 1))
    }
}

/// Dial `addr` repeatedly under `policy` until a connection lands or the
/// attempt budget is spent.
pub async fn connect_with_retry(
    endpoint: &ClientEndpoint,
    addr: SocketAddr,
    server_name: &str,
    policy: ReconnectPolicy,
) -> Result<quinn::Connection> {
    let mut attempt = 1;
    loop {
        match endpoint.connect(addr, server_name).await {
            Ok(conn) => {
                if attempt > 1 {
                    info!(attempt, "reconnected to {}", addr);
                }
                return Ok(conn);
            }
            Err(err) => match policy.delay_for(attempt) {
                Some(delay) => {
                    warn!(attempt, ?delay, %err, "connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    return Err(err.context(format!(
                        "Gave up connecting to {addr} after {} attempts",
                        policy.max_attempts
                    )))
                }
            },
        }
    }
}

/// Ping/pong liveness tracker. Pure state machine; the session feeds it the
/// clock and the wire, so it tests without either.
#[derive(Debug)]
pub struct Heartbeat {
    interval_ms: u64,
    last_ping: Millis,
    last_pong: Millis,
    rtt_ms: Option<u64>,
}

impl Heartbeat {
    /// Create a tracker; `started` counts as the last sign of life.
    pub fn new(started: Millis) -> Self {
        Self {
            interval_ms: HEARTBEAT_INTERVAL.as_millis() as u64,
            last_ping: started,
            last_pong: started,
            rtt_ms: None,
        }
    }

    /// Whether a ping should be sent now.
    pub fn ping_due(&self, now: Millis) -> bool {
        now.since(self.last_ping) >= self.interval_ms
    }

    /// Record that a ping went out at `now`.
    pub fn mark_ping(&mut self, now: Millis) {
        self.last_ping = now;
    }

    /// Record a pong echoing `sent_at`, received at `now`.
    pub fn mark_pong(&mut self, sent_at: Millis, now: Millis) {
        self.last_pong = now;
        self.rtt_ms = Some(now.since(sent_at));
    }

    /// A connection that has answered nothing for two intervals is dead.
    pub fn is_stale(&self, now: Millis) -> bool {
        now.since(self.last_pong) > 2 * self.interval_ms
    }

    /// Last measured round-trip time, if a pong has arrived.
    pub fn rtt_ms(&self) -> Option<u64> {
        self.rtt_ms
    }

    /// Build the pong reply for an incoming ping.
    pub fn answer(factory: &crate::protocol::MessageFactory, ping: &Envelope) -> Option<Envelope> {
        match &ping.payload {
            crate::protocol::Payload::Ping(msg) => Some(factory.pong(msg.sent_at)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageFactory, Payload};

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_secs(8)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_secs(16)));
    }

    #[test]
    fn backoff_gives_up_after_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(6), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn ping_is_due_after_one_interval() {
        let hb = Heartbeat::new(Millis(0));
        assert!(!hb.ping_due(Millis(29_999)));
        assert!(hb.ping_due(Millis(30_000)));
    }

    #[test]
    fn pong_records_round_trip_and_resets_staleness() {
        let mut hb = Heartbeat::new(Millis(0));
        hb.mark_ping(Millis(30_000));
        hb.mark_pong(Millis(30_000), Millis(30_120));
        assert_eq!(hb.rtt_ms(), Some(120));
        assert!(!hb.is_stale(Millis(60_000)));
    }

    #[test]
    fn silence_for_two_intervals_is_stale() {
        let hb = Heartbeat::new(Millis(0));
        assert!(!hb.is_stale(Millis(60_000)));
        assert!(hb.is_stale(Millis(60_001)));
    }

    #[test]
    fn answer_echoes_the_ping_timestamp() {
        let f = MessageFactory::new("hb-test");
        let ping = f.ping(Millis(777));
        let pong = Heartbeat::answer(&f, &ping).unwrap();
        match pong.payload {
            Payload::Pong(msg) => assert_eq!(msg.echo, Millis(777)),
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[test]
    fn answer_ignores_non_pings() {
        let f = MessageFactory::new("hb-test");
        let chat = f.chat(gridtown_core::PlayerId::new("a"), "hi");
        assert!(Heartbeat::answer(&f, &chat).is_none());
    }
}
