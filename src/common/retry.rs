use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Erros que sabem dizer se vale a pena tentar de novo.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Política única de retentativa: teto de tentativas, curva exponencial com jitter
/// e o predicado de erro retentável. Usada pelo replayer e pelo cliente HTTP.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_attempts = max_attempts.max(1);
        let clamped_base = base_delay_ms.max(1);
        let clamped_max_delay = max_delay_ms.max(clamped_base);
        let clamped_jitter = jitter_pct.clamp(0.0, 1.0);
        Self {
            max_attempts: clamped_attempts,
            base_delay_ms: clamped_base,
            max_delay_ms: clamped_max_delay,
            jitter_pct: clamped_jitter,
        }
    }

    /// Fila offline: 3 tentativas por entrada, nunca infinitas.
    pub fn offline_sync() -> Self {
        Self::new(3, 2_000, 60_000, 0.2)
    }

    /// Leituras idempotentes (consulta de status após timeout).
    pub fn default_network() -> Self {
        Self::new(3, 250, 2_000, 0.25)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = 2_u64.saturating_pow(attempt);
        let mut delay = self.base_delay_ms.saturating_mul(exp);
        if delay > self.max_delay_ms {
            delay = self.max_delay_ms;
        }
        let jittered = if self.jitter_pct > 0.0 {
            let mut rng = rand::thread_rng();
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rng.gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    pub fn should_retry<E: Retryable>(&self, attempts_so_far: u32, err: &E) -> bool {
        err.is_retryable() && attempts_so_far < self.max_attempts
    }

    pub fn exhausted(&self, attempts_so_far: u32) -> bool {
        attempts_so_far >= self.max_attempts
    }

    /// Repete `op` enquanto o erro for retentável. Só para operações idempotentes.
    pub async fn retry_async<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if !self.should_retry(attempt, &err) {
                        return Err(err);
                    }
                    sleep(self.delay_for(attempt - 1)).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::offline_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Transient,
        Fatal,
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, FakeError::Transient)
        }
    }

    #[test]
    fn new_clamps_input_parameters() {
        let policy = RetryPolicy::new(0, 0, 0, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay_ms, 1);
        assert_eq!(policy.max_delay_ms, 1);
        assert_eq!(policy.jitter_pct, 1.0);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 100, 500, 0.0);
        let delays: Vec<_> = (0..5).map(|attempt| policy.delay_for(attempt)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500)); // teto
        assert_eq!(delays[4], Duration::from_millis(500));
    }

    #[test]
    fn offline_sync_ceiling_is_three() {
        let policy = RetryPolicy::offline_sync();
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(!policy.should_retry(3, &FakeError::Transient));
        assert!(!policy.should_retry(0, &FakeError::Fatal));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_retries_transient_errors_until_success() {
        let policy = RetryPolicy::new(3, 10, 10, 0.0);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<&'static str, FakeError> = policy
            .retry_async(|attempt| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 { Err(FakeError::Transient) } else { Ok("ok") }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_gives_up_on_fatal_errors() {
        let policy = RetryPolicy::new(5, 5, 5, 0.0);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), FakeError> = policy
            .retry_async(|_| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(FakeError::Fatal)
                }
            })
            .await;

        assert_eq!(result, Err(FakeError::Fatal));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
