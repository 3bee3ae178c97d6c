//! Retry strategies.
//!
//! A [`RetryStrategy`] answers three questions for the engine after every
//! attempt: should another attempt run, how long to wait before it, and
//! when to give up altogether. [`RetryPolicy`] is the stock implementation,
//! built from a trigger predicate, a [`Backoff`], terminate limits and
//! listeners.
//!
//! # Backoff
//!
//! Exponential delays follow:
//! ```text
//! base_delay   = initial * multiplier^(retry - 1)
//! capped_delay = min(base_delay, max)
//! final_delay  = capped_delay * (1 + jitter_factor),  jitter_factor in [0, jitter]
//! ```
//! Jitter is drawn from a seeded deterministic generator, so a policy with a
//! fixed seed produces the same delays on every run.

use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Outcome;
use crate::util::DetRng;

/// Seed used for jitter unless [`RetryPolicyBuilder::seed`] says otherwise.
pub const DEFAULT_JITTER_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Decides whether, when and how often the retry engine tries again.
///
/// `attempt` is 1-based: the first call passes 1.
pub trait RetryStrategy<T>: Send + Sync + 'static {
    /// Returns true if `outcome` of attempt `attempt` warrants another try.
    fn should_retry(&self, attempt: u32, outcome: &Outcome<T>) -> bool;

    /// Delay before the attempt following `attempt`. Zero resubmits
    /// immediately.
    fn delay(&self, attempt: u32, outcome: &Outcome<T>) -> Duration;

    /// Upper bound on attempts, the first one included.
    fn max_attempts(&self) -> u32 {
        u32::MAX
    }

    /// Wall-clock limit on the whole retry loop.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Called with every settled attempt, before [`should_retry`].
    ///
    /// [`should_retry`]: RetryStrategy::should_retry
    fn on_attempt(&self, _attempt: u32, _outcome: &Outcome<T>) {}

    /// Called when attempt `next_attempt` has been scheduled.
    fn on_retry_scheduled(&self, _next_attempt: u32, _delay: Duration) {}

    /// Called once when the retry loop settles, however it ended.
    fn on_finished(&self, _attempts: u32, _outcome: &Outcome<T>) {}
}

impl<T, S> RetryStrategy<T> for Arc<S>
where
    S: RetryStrategy<T> + ?Sized,
{
    fn should_retry(&self, attempt: u32, outcome: &Outcome<T>) -> bool {
        (**self).should_retry(attempt, outcome)
    }

    fn delay(&self, attempt: u32, outcome: &Outcome<T>) -> Duration {
        (**self).delay(attempt, outcome)
    }

    fn max_attempts(&self) -> u32 {
        (**self).max_attempts()
    }

    fn timeout(&self) -> Option<Duration> {
        (**self).timeout()
    }

    fn on_attempt(&self, attempt: u32, outcome: &Outcome<T>) {
        (**self).on_attempt(attempt, outcome);
    }

    fn on_retry_scheduled(&self, next_attempt: u32, delay: Duration) {
        (**self).on_retry_scheduled(next_attempt, delay);
    }

    fn on_finished(&self, attempts: u32, outcome: &Outcome<T>) {
        (**self).on_finished(attempts, outcome);
    }
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Wait the same duration before every retry.
    Fixed(Duration),
    /// Grow the delay geometrically up to a cap.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Cap on the un-jittered delay.
        max: Duration,
        /// Growth factor per retry, at least 1.
        multiplier: f64,
        /// Extra random fraction in `[0, 1]` added on top.
        jitter: f64,
    },
}

impl Backoff {
    /// No delay between attempts.
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// A constant delay.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self::Fixed(delay)
    }

    /// Exponential backoff from `initial` capped at `max`, doubling with 10%
    /// jitter.
    #[must_use]
    pub const fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential {
            initial,
            max,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Sets the growth factor. Only affects exponential backoff.
    #[must_use]
    pub fn with_multiplier(mut self, value: f64) -> Self {
        if let Self::Exponential { multiplier, .. } = &mut self {
            *multiplier = value;
        }
        self
    }

    /// Sets the jitter fraction. Only affects exponential backoff.
    #[must_use]
    pub fn with_jitter(mut self, value: f64) -> Self {
        if let Self::Exponential { jitter, .. } = &mut self {
            *jitter = value;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if let Self::Exponential {
            multiplier, jitter, ..
        } = self
        {
            if !(*multiplier >= 1.0) {
                return Err(Error::validation("backoff multiplier must be at least 1.0"));
            }
            if !(0.0..=1.0).contains(jitter) {
                return Err(Error::validation("backoff jitter must be between 0.0 and 1.0"));
            }
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1 = first retry).
    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub(crate) fn delay_for(&self, retry: u32, rng: Option<&mut DetRng>) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                if retry == 0 {
                    return Duration::ZERO;
                }
                let exponent = retry.saturating_sub(1).min(i32::MAX as u32);
                let base_nanos = initial.as_nanos() as f64 * multiplier.powi(exponent as i32);
                let capped_nanos = base_nanos.min(max.as_nanos() as f64);
                let final_nanos = match rng {
                    Some(rng) if jitter > 0.0 => capped_nanos * (1.0 + rng.next_unit() * jitter),
                    _ => capped_nanos,
                };
                Duration::from_nanos(final_nanos.min(u64::MAX as f64) as u64)
            }
        }
    }
}

/// Something that happened inside a retry loop.
#[derive(Debug)]
pub enum RetryEvent<'a, T> {
    /// An attempt settled.
    AttemptSettled {
        /// 1-based attempt number.
        attempt: u32,
        /// How it settled.
        outcome: &'a Outcome<T>,
    },
    /// Another attempt will start after `delay`.
    RetryScheduled {
        /// 1-based number of the scheduled attempt.
        attempt: u32,
        /// Wait before it starts.
        delay: Duration,
    },
    /// The loop settled.
    Finished {
        /// Attempts started.
        attempts: u32,
        /// The loop's final outcome.
        outcome: &'a Outcome<T>,
    },
}

type Trigger<T> = Arc<dyn Fn(&Outcome<T>) -> bool + Send + Sync>;
type Listener<T> = Arc<dyn Fn(&RetryEvent<'_, T>) + Send + Sync>;

/// The stock [`RetryStrategy`].
///
/// Defaults: retry `Err` and `Panicked` outcomes (never `Ok` or
/// `Cancelled`), 3 attempts, exponential backoff from 100ms capped at 30s
/// with 10% jitter, no overall timeout.
pub struct RetryPolicy<T> {
    trigger: Trigger<T>,
    backoff: Backoff,
    max_attempts: u32,
    timeout: Option<Duration>,
    listeners: Vec<Listener<T>>,
    rng: Mutex<DetRng>,
}

impl<T> fmt::Debug for RetryPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .field("timeout", &self.timeout)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> RetryPolicy<T> {
    /// Starts building a policy from the defaults.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder<T> {
        RetryPolicyBuilder::new()
    }

    /// The backoff schedule.
    #[must_use]
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    fn emit(&self, event: &RetryEvent<'_, T>) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl<T: 'static> RetryStrategy<T> for RetryPolicy<T> {
    fn should_retry(&self, _attempt: u32, outcome: &Outcome<T>) -> bool {
        (self.trigger)(outcome)
    }

    fn delay(&self, attempt: u32, _outcome: &Outcome<T>) -> Duration {
        let mut rng = self.rng.lock();
        self.backoff.delay_for(attempt, Some(&mut rng))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn on_attempt(&self, attempt: u32, outcome: &Outcome<T>) {
        self.emit(&RetryEvent::AttemptSettled { attempt, outcome });
    }

    fn on_retry_scheduled(&self, next_attempt: u32, delay: Duration) {
        self.emit(&RetryEvent::RetryScheduled {
            attempt: next_attempt,
            delay,
        });
    }

    fn on_finished(&self, attempts: u32, outcome: &Outcome<T>) {
        self.emit(&RetryEvent::Finished { attempts, outcome });
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder<T> {
    trigger: Trigger<T>,
    backoff: Backoff,
    max_attempts: u32,
    timeout: Option<Duration>,
    listeners: Vec<Listener<T>>,
    seed: u64,
}

impl<T: 'static> RetryPolicyBuilder<T> {
    fn new() -> Self {
        Self {
            trigger: Arc::new(|outcome: &Outcome<T>| outcome.is_err() || outcome.is_panicked()),
            backoff: Backoff::exponential(Duration::from_millis(100), Duration::from_secs(30)),
            max_attempts: 3,
            timeout: None,
            listeners: Vec::new(),
            seed: DEFAULT_JITTER_SEED,
        }
    }

    /// Retries whenever `predicate` returns true for an attempt's outcome.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
    {
        self.trigger = Arc::new(predicate);
        self
    }

    /// Retries only errors whose kind is
    /// [retryable](crate::error::ErrorKind::is_retryable).
    #[must_use]
    pub fn retry_transient(self) -> Self {
        self.retry_if(|outcome| matches!(outcome, Outcome::Err(e) if e.is_retryable()))
    }

    /// Sets the delay schedule.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the attempt limit, the first attempt included.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Fails the whole loop with a timeout error after `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a listener for [`RetryEvent`]s.
    #[must_use]
    pub fn listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&RetryEvent<'_, T>) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Seeds the jitter generator.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates and builds the policy.
    pub fn build(self) -> Result<RetryPolicy<T>> {
        if self.max_attempts == 0 {
            return Err(Error::validation("max_attempts must be at least 1"));
        }
        self.backoff.validate()?;
        Ok(RetryPolicy {
            trigger: self.trigger,
            backoff: self.backoff,
            max_attempts: self.max_attempts,
            timeout: self.timeout,
            listeners: self.listeners,
            rng: Mutex::new(DetRng::new(self.seed)),
        })
    }
}
