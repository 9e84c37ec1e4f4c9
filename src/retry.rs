use crate::error::Result;
use rand::Rng;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Retry policy for transport-level operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 2.0,
            jitter: false,
        }
    }

    /// Execute operation with retry logic
    pub fn execute<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        self.execute_counted(operation).map(|(value, _)| value)
    }

    /// Like [`execute`](Self::execute) but also reports how many attempts
    /// were made. On failure the last error is returned together with the
    /// attempt count.
    pub fn execute_counted<F, T>(&self, mut operation: F) -> Result<(T, u32)>
    where
        F: FnMut(u32) -> Result<T>,
    {
        self.try_execute(&mut operation).map_err(|(err, _)| err)
    }

    pub(crate) fn try_execute<F, T>(
        &self,
        operation: &mut F,
    ) -> std::result::Result<(T, u32), (crate::error::Error, u32)>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        let mut delay = self.initial_delay;

        loop {
            attempt += 1;

            match operation(attempt) {
                Ok(result) => return Ok((result, attempt)),
                Err(err) => {
                    if !err.is_retryable() || attempt >= max_attempts {
                        return Err((err, attempt));
                    }

                    warn!(
                        "Operation failed (attempt {}/{}): {}, retrying in {:?}",
                        attempt, max_attempts, err, delay
                    );

                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }

                    delay = self.calculate_next_delay(delay);
                }
            }
        }
    }

    fn calculate_next_delay(&self, current_delay: Duration) -> Duration {
        let mut next_delay =
            Duration::from_secs_f64(current_delay.as_secs_f64() * self.exponential_base);

        if self.jitter && !next_delay.is_zero() {
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            next_delay = Duration::from_secs_f64(next_delay.as_secs_f64() * jitter_factor);
        }

        next_delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_retry_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        };

        let (value, attempts) = policy
            .execute_counted(|attempt| {
                if attempt < 3 {
                    Err(Error::Transport("Simulated timeout".to_string()))
                } else {
                    Ok(42)
                }
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_retry_exhausted() {
        let policy = RetryPolicy::immediate(2);
        let mut calls = 0;

        let result: Result<()> = policy.execute(|_| {
            calls += 1;
            Err(Error::Transport("Always fails".to_string()))
        });

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_non_retryable_error() {
        let policy = RetryPolicy::immediate(5);
        let mut calls = 0;

        let result: Result<()> = policy.execute(|_| {
            calls += 1;
            Err(Error::TableNotFound("hellotable".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(5),
            jitter: false,
            ..Default::default()
        };
        assert_eq!(
            policy.calculate_next_delay(Duration::from_secs(4)),
            Duration::from_secs(5)
        );
    }
}
