//! Common test utilities for sigil-claims integration tests

use sigil_claims::{ClaimManager, ClaimsConfig, ManualClock, SigningAlgorithm};
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";

#[allow(dead_code)]
pub const HOUR: Duration = Duration::from_secs(3600);

/// Manager on a manual clock with a one hour lifetime
#[allow(dead_code)]
pub fn manager() -> (Arc<ManualClock>, Arc<ClaimManager>) {
    manager_with(SigningAlgorithm::Hs256, HOUR)
}

#[allow(dead_code)]
pub fn manager_with(
    algorithm: SigningAlgorithm,
    expiration: Duration,
) -> (Arc<ManualClock>, Arc<ClaimManager>) {
    let clock = Arc::new(ManualClock::default());
    let config = ClaimsConfig::new(SECRET)
        .expect("test secret is long enough")
        .with_algorithm(algorithm)
        .with_expiration(expiration);
    let manager = Arc::new(ClaimManager::new(config, clock.clone()));
    (clock, manager)
}

/// Install a subscriber so `RUST_LOG` shows events while debugging tests
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
