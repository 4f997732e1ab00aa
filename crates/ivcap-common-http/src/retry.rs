// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry logic with exponential backoff for HTTP requests.

use std::time::Duration;
use tracing::warn;

/// Backoff policy for one logical operation.
///
/// The defaults describe the sidecar protocol: at most 4 attempts, waiting
/// 1s, 2s and 4s between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 4,
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(60),
			backoff_factor: 2.0,
			jitter: false,
		}
	}
}

impl RetryConfig {
	/// Delay to wait after the failed attempt with the given zero-based index.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		calculate_delay(self, attempt)
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Per-call retry bookkeeping. Never outlives a single [`retry`] call.
#[derive(Debug)]
struct RetryState {
	attempt: u32,
	wait_time: Duration,
}

fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponential_delay = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);
	let capped_delay = exponential_delay.min(cfg.max_delay.as_secs_f64());

	let final_delay = if cfg.jitter {
		let jitter_factor = 0.5 + fastrand::f64();
		capped_delay * jitter_factor
	} else {
		capped_delay
	};

	Duration::from_secs_f64(final_delay)
}

/// Runs `f` until it succeeds, returns a non-retryable error, or
/// `cfg.max_attempts` attempts have failed. Sleeps between attempts, never
/// after the last one.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut state = RetryState {
		attempt: 0,
		wait_time: calculate_delay(cfg, 0),
	};

	loop {
		match f().await {
			Ok(result) => return Ok(result),
			Err(err) => {
				state.attempt += 1;

				if !err.is_retryable() {
					warn!(
						error = %err,
						attempt = state.attempt,
						"non-retryable error encountered"
					);
					return Err(err);
				}

				if state.attempt >= cfg.max_attempts {
					warn!(
						error = %err,
						attempt = state.attempt,
						max_attempts = cfg.max_attempts,
						"max retry attempts exhausted"
					);
					return Err(err);
				}

				warn!(
					error = %err,
					attempt = state.attempt,
					max_attempts = cfg.max_attempts,
					delay_ms = state.wait_time.as_millis() as u64,
					"retrying after error"
				);

				tokio::time::sleep(state.wait_time).await;
				state.wait_time = calculate_delay(cfg, state.attempt);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::{Arc, Mutex};
	use tokio::time::Instant;

	#[derive(Debug)]
	struct MockError {
		retryable: bool,
	}

	impl std::fmt::Display for MockError {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "mock error (retryable: {})", self.retryable)
		}
	}

	impl RetryableError for MockError {
		fn is_retryable(&self) -> bool {
			self.retryable
		}
	}

	fn fast_config(max_attempts: u32) -> RetryConfig {
		RetryConfig {
			max_attempts,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(10),
			backoff_factor: 2.0,
			jitter: false,
		}
	}

	#[test]
	fn default_matches_sidecar_protocol() {
		let cfg = RetryConfig::default();
		assert_eq!(cfg.max_attempts, 4);
		assert_eq!(cfg.delay_for(0), Duration::from_secs(1));
		assert_eq!(cfg.delay_for(1), Duration::from_secs(2));
		assert_eq!(cfg.delay_for(2), Duration::from_secs(4));
		assert!(!cfg.jitter);
	}

	#[tokio::test]
	async fn test_non_retryable_error_fails_immediately() {
		let attempt_count = Arc::new(AtomicU32::new(0));
		let attempt_count_clone = Arc::clone(&attempt_count);

		let result: Result<(), MockError> = retry(&fast_config(4), || {
			let count = Arc::clone(&attempt_count_clone);
			async move {
				count.fetch_add(1, Ordering::SeqCst);
				Err(MockError { retryable: false })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(
			attempt_count.load(Ordering::SeqCst),
			1,
			"non-retryable error should only attempt once"
		);
	}

	#[tokio::test]
	async fn test_retryable_error_retries_up_to_max_attempts() {
		let attempt_count = Arc::new(AtomicU32::new(0));
		let attempt_count_clone = Arc::clone(&attempt_count);

		let result: Result<(), MockError> = retry(&fast_config(3), || {
			let count = Arc::clone(&attempt_count_clone);
			async move {
				count.fetch_add(1, Ordering::SeqCst);
				Err(MockError { retryable: true })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(
			attempt_count.load(Ordering::SeqCst),
			3,
			"should retry exactly max_attempts times"
		);
	}

	#[tokio::test]
	async fn test_succeeds_after_retries() {
		let attempt_count = Arc::new(AtomicU32::new(0));
		let attempt_count_clone = Arc::clone(&attempt_count);

		let result: Result<&str, MockError> = retry(&fast_config(5), || {
			let count = Arc::clone(&attempt_count_clone);
			async move {
				let current = count.fetch_add(1, Ordering::SeqCst);
				if current < 2 {
					Err(MockError { retryable: true })
				} else {
					Ok("success")
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), "success");
		assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_backoff_doubles_between_attempts() {
		let attempts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
		let attempts_clone = Arc::clone(&attempts);

		let result: Result<u32, MockError> = retry(&RetryConfig::default(), || {
			let attempts = Arc::clone(&attempts_clone);
			async move {
				let mut seen = attempts.lock().unwrap();
				seen.push(Instant::now());
				if seen.len() < 4 {
					Err(MockError { retryable: true })
				} else {
					Ok(seen.len() as u32)
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), 4);

		let seen = attempts.lock().unwrap();
		assert_eq!(seen.len(), 4);
		let expected = [1u64, 2, 4];
		for (i, secs) in expected.iter().enumerate() {
			let gap = seen[i + 1] - seen[i];
			let want = Duration::from_secs(*secs);
			assert!(
				gap >= want && gap < want + Duration::from_millis(50),
				"gap {i} was {gap:?}, expected about {want:?}"
			);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_no_sleep_after_final_attempt() {
		let start = Instant::now();

		let result: Result<(), MockError> = retry(&RetryConfig::default(), || async {
			Err(MockError { retryable: true })
		})
		.await;

		assert!(result.is_err());
		let elapsed = start.elapsed();
		assert!(
			elapsed >= Duration::from_secs(7) && elapsed < Duration::from_secs(8),
			"expected 1+2+4 seconds of backoff, got {elapsed:?}"
		);
	}

	#[test]
	fn test_jitter_adds_randomness() {
		let cfg_with_jitter = RetryConfig {
			max_attempts: 3,
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		};

		let cfg_without_jitter = RetryConfig {
			jitter: false,
			..cfg_with_jitter.clone()
		};

		let delays_without_jitter: Vec<Duration> = (0..10)
			.map(|_| calculate_delay(&cfg_without_jitter, 1))
			.collect();

		let delays_with_jitter: Vec<Duration> = (0..10)
			.map(|_| calculate_delay(&cfg_with_jitter, 1))
			.collect();

		assert!(delays_without_jitter.windows(2).all(|w| w[0] == w[1]));
		assert!(!delays_with_jitter.windows(2).all(|w| w[0] == w[1]));
	}

	#[test]
	fn test_delay_respects_max_delay() {
		let cfg = RetryConfig {
			max_attempts: 10,
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(5),
			backoff_factor: 10.0,
			jitter: false,
		};

		for attempt in 0..10 {
			let delay = calculate_delay(&cfg, attempt);
			assert!(
				delay <= Duration::from_secs(5),
				"delay {delay:?} at attempt {attempt} exceeds max_delay"
			);
		}
	}
}
