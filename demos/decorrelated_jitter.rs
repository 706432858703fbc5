//! Decorrelated jitter demo.
use node_federation::resilience::Jitter;
use std::time::Duration;

fn main() {
    let jitter = Jitter::decorrelated(Duration::from_millis(50), Duration::from_secs(2));
    let mut previous = Duration::from_millis(50);
    for _ in 0..5 {
        previous = jitter.apply(previous);
        println!("decorrelated sleep: {:?}", previous);
    }
}
