//! Remote-first generation that degrades to a local model.
//!
//! A request that fails on the primary backend with an outage-type error
//! (unavailable, rate limited) fails as usual, and starts a cool-down. Until it
//! expires every request goes to the fallback; after it the primary is tried
//! again.

use super::{Generation, GenerationBackend};
use crate::error::GenerateError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct FailoverGenerator<P, F> {
    primary: P,
    fallback: F,
    cooldown: Duration,
    degraded_until: Mutex<Option<Instant>>,
}

impl<P: GenerationBackend, F: GenerationBackend> FailoverGenerator<P, F> {
    pub fn new(primary: P, fallback: F, cooldown: Duration) -> Self {
        Self {
            primary,
            fallback,
            cooldown,
            degraded_until: Mutex::new(None),
        }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Whether requests are currently routed to the fallback.
    pub fn is_degraded(&self) -> bool {
        let mut guard = self
            .degraded_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *guard {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *guard = None;
                info!(
                    "Failover cool-down over, trying {} again",
                    self.primary.backend_name()
                );
                false
            }
            None => false,
        }
    }

    fn degrade(&self, cause: &GenerateError) {
        let mut guard = self
            .degraded_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(Instant::now() + self.cooldown);
        warn!(
            "{} failed ({}), routing questions to {} for {}s",
            self.primary.backend_name(),
            cause,
            self.fallback.backend_name(),
            self.cooldown.as_secs()
        );
    }
}

#[async_trait]
impl<P: GenerationBackend, F: GenerationBackend> GenerationBackend for FailoverGenerator<P, F> {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerateError> {
        if self.is_degraded() {
            return self.fallback.generate(prompt).await;
        }
        let result = self.primary.generate(prompt).await;
        if let Err(e) = &result {
            if e.is_backend_outage() {
                self.degrade(e);
            }
        }
        result
    }

    fn backend_name(&self) -> &str {
        "failover"
    }

    fn active_backend(&self) -> String {
        if self.is_degraded() {
            format!("{} (failover)", self.fallback.active_backend())
        } else {
            self.primary.active_backend()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    struct Scripted {
        name: &'static str,
        fail_with: Option<fn() -> GenerateError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str) -> Self {
            Self {
                name,
                fail_with: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str, error: fn() -> GenerateError) -> Self {
            Self {
                name,
                fail_with: Some(error),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<Generation, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(error) => Err(error()),
                None => Ok(Generation::new("answer", self.name)),
            }
        }

        fn backend_name(&self) -> &str {
            self.name
        }
    }

    fn unavailable() -> GenerateError {
        GenerateError::UpstreamUnavailable {
            message: "503".into(),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failure_fails_then_routes_to_fallback() {
        let failover = FailoverGenerator::new(
            Scripted::failing("gemini", unavailable),
            Scripted::ok("ollama"),
            Duration::from_secs(60),
        );

        let first = failover.generate("q").await;
        assert_eq!(first.unwrap_err().code(), "upstream_unavailable");
        assert!(logs_contain("routing questions to ollama"));

        let second = failover.generate("q").await.unwrap();
        assert_eq!(second.backend, "ollama");
        assert_eq!(failover.primary().calls(), 1);
        assert_eq!(failover.fallback().calls(), 1);
        assert_eq!(failover.active_backend(), "ollama (failover)");
    }

    #[tokio::test]
    async fn test_primary_is_retried_after_cooldown() {
        let failover = FailoverGenerator::new(
            Scripted::failing("gemini", unavailable),
            Scripted::ok("ollama"),
            Duration::from_millis(20),
        );

        assert!(failover.generate("q").await.is_err());
        assert!(failover.is_degraded());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!failover.is_degraded());
        assert_eq!(failover.active_backend(), "gemini");
        assert!(failover.generate("q").await.is_err());
        assert_eq!(failover.primary().calls(), 2);
        assert_eq!(failover.fallback().calls(), 0);
    }

    #[tokio::test]
    async fn test_request_specific_errors_do_not_trigger_failover() {
        let failover = FailoverGenerator::new(
            Scripted::failing("gemini", || GenerateError::invalid_response("blocked")),
            Scripted::ok("ollama"),
            Duration::from_secs(60),
        );

        assert!(failover.generate("q").await.is_err());
        assert!(!failover.is_degraded());
        assert!(failover.generate("q").await.is_err());
        assert_eq!(failover.fallback().calls(), 0);
    }

    #[tokio::test]
    async fn test_healthy_primary_serves_everything() {
        let failover = FailoverGenerator::new(
            Scripted::ok("gemini"),
            Scripted::ok("ollama"),
            Duration::from_secs(60),
        );
        for _ in 0..3 {
            assert_eq!(failover.generate("q").await.unwrap().backend, "gemini");
        }
        assert_eq!(failover.fallback().calls(), 0);
    }
}
