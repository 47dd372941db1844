use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5_000);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// No long-polling fallback.
    #[default]
    WebSocket,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backoff {
    #[default]
    Fixed,
    /// `retry_delay * factor^(attempt - 1)`, capped at `max_delay`.
    Exponential { factor: u32, max_delay: Duration },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub reconnection: bool,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reconnection: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            reconnection: false,
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Whether reconnect attempt number `attempt` (1-based) may run.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.reconnection && (1..=self.max_attempts).contains(&attempt)
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.retry_delay,
            Backoff::Exponential { factor, max_delay } => {
                let exponent = attempt.saturating_sub(1);
                let multiplier = factor.max(1).checked_pow(exponent).unwrap_or(u32::MAX);
                self.retry_delay
                    .checked_mul(multiplier)
                    .unwrap_or(max_delay)
                    .min(max_delay)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    pub transport: TransportKind,
    pub retry: RetryPolicy,
    /// Socket.IO namespace, `/` unless the server mounts handlers elsewhere.
    pub namespace: String,
    /// Upper bound for the Engine.IO open + namespace connect exchange.
    pub handshake_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            transport: TransportKind::WebSocket,
            retry: RetryPolicy::default(),
            namespace: "/".to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ConnectOptions {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}
