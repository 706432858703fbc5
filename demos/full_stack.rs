//! Full stack example: retry + breaker + bulkhead + timeout.
use node_federation::resilience::{Backoff, Jitter, ResilienceError, ResilienceStack, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), ResilienceError<std::io::Error>> {
    let attempts = Arc::new(AtomicUsize::new(0));

    let stack: ResilienceStack<std::io::Error> = ResilienceStack::new()
        .timeout(Duration::from_secs(2))
        .bulkhead(32)
        .circuit_breaker(5, Duration::from_secs(30))
        .retry(
            RetryPolicy::builder()
                .max_attempts(4)
                .expect("4 is a valid attempt count")
                .backoff(Backoff::exponential(Duration::from_millis(100)).with_max(Duration::from_secs(1)))
                .with_jitter(Jitter::equal())
                .build(),
        )
        .build();

    let result = stack
        .execute(|| {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ResilienceError::Inner(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "transient",
                    )))
                } else {
                    Ok::<_, ResilienceError<std::io::Error>>("recovered")
                }
            }
        })
        .await?;

    println!("stack result: {result}");
    Ok(())
}
