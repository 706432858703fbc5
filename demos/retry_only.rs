//! Minimal retry-only example.
use node_federation::resilience::{Backoff, Jitter, ResilienceError, RetryPolicy};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), ResilienceError<std::io::Error>> {
    let policy = RetryPolicy::builder()
        .max_attempts(3)
        .expect("3 is a valid attempt count")
        .backoff(Backoff::exponential(Duration::from_millis(200)).with_max(Duration::from_secs(2)))
        .with_jitter(Jitter::full())
        .build();

    let value = policy
        .execute(|| async {
            // Replace with your real fallible work
            Ok::<_, ResilienceError<std::io::Error>>("hello from retry")
        })
        .await?;

    println!("{}", value);
    Ok(())
}
