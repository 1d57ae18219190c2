//! Connection manager integration tests
//!
//! Covers initialization, the health-check loop, reconnects, breaker
//! feeding and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use resilient_cache::{CacheConfig, CacheError, CircuitState, ConnectionManager};

fn config_with_interval(secs: u64) -> CacheConfig {
    CacheConfig {
        health_check_interval_s: secs,
        failure_threshold: 2,
        ..test_config()
    }
}

#[tokio::test]
async fn test_initialize_failure_leaves_manager_unconnected() {
    init_tracing();
    let state = FaultState::new();
    state.refuse_connections(true);
    let manager = ConnectionManager::from_config(FaultyConnector::new(&state), &test_config());

    assert!(!manager.initialize().await);
    assert!(!manager.is_connected());
    assert!(matches!(
        manager.get_connection(),
        Err(CacheError::NotInitialized)
    ));
    assert_eq!(FaultState::count(&state.connects), 1);
}

#[tokio::test]
async fn test_initialize_rejects_connection_that_fails_ping() {
    let state = FaultState::new();
    state.set_fault(Fault::Connection);
    let manager = ConnectionManager::from_config(FaultyConnector::new(&state), &test_config());

    assert!(!manager.initialize().await);
    assert!(!manager.is_connected());
    assert_eq!(FaultState::count(&state.pings), 1);
}

#[tokio::test]
async fn test_get_connection_does_no_io() {
    let (state, manager) = connected_manager(&test_config()).await;
    let pings = FaultState::count(&state.pings);

    for _ in 0..10 {
        assert!(manager.get_connection().is_ok());
    }
    assert_eq!(FaultState::count(&state.pings), pings);
    assert_eq!(FaultState::count(&state.connects), 1);
}

#[tokio::test]
async fn test_failed_health_check_opens_breaker() {
    let (state, manager) = connected_manager(&config_with_interval(3600)).await;
    state.set_fault(Fault::Connection);

    // Failed ping and failed reconnect each count once
    manager.check_health().await;

    let breaker = manager.circuit_breaker();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.failure_count(), 2);
    assert!(!manager.is_connected());
    assert!(matches!(manager.get_connection(), Err(CacheError::CircuitOpen)));
}

#[tokio::test]
async fn test_health_check_reconnects_after_outage() {
    let (state, manager) = connected_manager(&config_with_interval(3600)).await;
    let breaker = Arc::clone(manager.circuit_breaker());

    state.refuse_connections(true);
    state.set_fault(Fault::Connection);
    manager.check_health().await;
    assert!(!manager.is_connected());

    state.refuse_connections(false);
    state.set_fault(Fault::None);
    manager.check_health().await;
    assert!(manager.is_connected());
    assert_eq!(FaultState::count(&state.connects), 3);

    // The next passing ping resets the breaker
    manager.check_health().await;
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_health_loop_runs_on_interval() {
    let (state, manager) = connected_manager(&config_with_interval(10)).await;
    let pings_after_init = FaultState::count(&state.pings);

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(FaultState::count(&state.pings) - pings_after_init, 3);

    state.set_fault(Fault::Connection);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!manager.is_connected());

    state.set_fault(Fault::None);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(manager.is_connected());

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_health_loop_and_is_idempotent() {
    let (state, manager) = connected_manager(&config_with_interval(10)).await;

    manager.close().await;
    manager.close().await;
    assert!(!manager.is_connected());
    assert!(matches!(
        manager.get_connection(),
        Err(CacheError::NotInitialized)
    ));

    let pings = FaultState::count(&state.pings);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(FaultState::count(&state.pings), pings);
}

#[tokio::test(start_paused = true)]
async fn test_close_abandons_hung_reconnect() {
    let (state, manager) = connected_manager(&config_with_interval(10)).await;
    state.set_fault(Fault::Connection);
    state.delay_connections(Duration::from_secs(3600));

    // The 10 s round fails its ping and then hangs in connect
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!manager.is_connected());
    assert_eq!(FaultState::count(&state.connects), 2);

    let started = tokio::time::Instant::now();
    manager.close().await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!manager.is_connected());
}
