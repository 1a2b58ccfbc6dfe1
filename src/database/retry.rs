use std::future::Future;

/// Errors that can tell whether repeating the whole unit of work may succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for crate::database::DatabaseError {
    fn is_transient(&self) -> bool {
        crate::database::DatabaseError::is_transient(self)
    }
}

/// Run `op` and repeat it up to `retries` more times while it fails with a
/// transient error. Each attempt must open its own transaction; a failed
/// attempt has already rolled back when its transaction was dropped.
pub async fn with_retry<T, E, F, Fut>(retries: u32, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < retries => {
                attempt += 1;
                tracing::warn!("transient store error, retrying (attempt {}): {}", attempt, err);
            }
            other => return other,
        }
    }
}
