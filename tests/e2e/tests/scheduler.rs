//! Journey: a background scheduler keeps the store consolidated

use std::time::Duration;

use reverie_core::{DreamScheduler, MemoryEngine, MemoryTier, SchedulerCommand, SchedulerConfig};
use reverie_e2e_tests::{TestDataFactory as F, TestEngineManager};

async fn wait_for_tier(engine: &MemoryEngine, id: &str, tier: MemoryTier) -> bool {
    for _ in 0..200 {
        let current = engine.get_memory(id).unwrap().map(|r| r.tier);
        if current == Some(tier) && !engine.is_dreaming() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn triggered_cycle_promotes_and_saves() {
    let manager = TestEngineManager::new();
    let id = F::create_memory(&manager.engine, "signed the lease", 0.9, F::axis(2)).await;

    let config = SchedulerConfig {
        state_path: Some(manager.state_path().to_path_buf()),
        ..Default::default()
    };
    let handle = DreamScheduler::spawn(manager.engine.clone(), config);
    assert!(handle.trigger().await);
    assert!(wait_for_tier(&manager.engine, &id, MemoryTier::ShortTerm).await);

    handle.shutdown().await;
    assert!(manager.state_path().exists());
    let reopened = manager.reopen();
    assert_eq!(
        reopened.get_memory(&id).unwrap().unwrap().tier,
        MemoryTier::ShortTerm
    );
}

#[tokio::test(start_paused = true)]
async fn interval_drives_repeated_cycles() {
    let mut config = TestEngineManager::default_config();
    config.dream.long_term_after_secs = 0;
    let manager = TestEngineManager::with_config(config);
    let id = F::create_memory(&manager.engine, "moved to a new city", 0.9, F::axis(4)).await;

    let handle = DreamScheduler::spawn(
        manager.engine.clone(),
        SchedulerConfig {
            interval: Duration::from_secs(600),
            ..Default::default()
        },
    );

    // Two ticks: Working → ShortTerm, then ShortTerm → LongTerm
    tokio::time::sleep(Duration::from_secs(1250)).await;
    assert!(wait_for_tier(&manager.engine, &id, MemoryTier::LongTerm).await);

    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_accepting_commands() {
    let manager = TestEngineManager::new();
    let handle = DreamScheduler::spawn(manager.engine.clone(), SchedulerConfig::default());

    assert!(handle.send(SchedulerCommand::Interrupt).await);
    handle.shutdown().await;
    assert!(!manager.engine.is_dreaming());
}
