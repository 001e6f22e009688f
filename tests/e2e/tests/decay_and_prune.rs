//! Journey: memories fade over time and unimportant ones are pruned

use chrono::{Duration, Utc};
use reverie_core::{AddMemoryInput, MemoryTier};
use reverie_e2e_tests::{TestDataFactory as F, TestEngineManager};

fn manager_without_sampling() -> TestEngineManager {
    let mut config = TestEngineManager::default_config();
    config.dream.retain_sample_rate = 0.0;
    TestEngineManager::with_config(config)
}

#[tokio::test]
async fn five_weak_memories_are_all_pruned() {
    let manager = manager_without_sampling();
    let engine = &manager.engine;
    let ids = F::create_batch(engine, 5, 0.4).await;

    // Working memories are protected until a cycle has looked at them
    assert!(engine.prune_memories(0.5).unwrap().is_empty());

    engine.filter_working().unwrap();
    for id in &ids {
        assert_eq!(engine.get_memory(id).unwrap().unwrap().tier, MemoryTier::ShortTerm);
    }

    let mut removed = engine.prune_memories(0.5).unwrap();
    removed.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(removed, expected);
    assert_eq!(manager.record_count(), 0);
}

#[tokio::test]
async fn prune_respects_threshold_and_pins() {
    let manager = manager_without_sampling();
    let engine = &manager.engine;

    let weak = F::create_memory(engine, "weak", 0.2, F::axis(0)).await;
    let strong = F::create_memory(engine, "strong", 0.45, F::axis(2)).await;
    let pinned = engine
        .add_memory_with(
            AddMemoryInput::new("pinned", 0.1)
                .with_embedding(F::axis(4))
                .pinned(),
        )
        .await
        .unwrap();
    engine.filter_working().unwrap();

    let removed = engine.prune_memories(0.3).unwrap();
    assert_eq!(removed, vec![weak]);
    assert!(engine.get_memory(&strong).unwrap().is_some());
    assert!(engine.get_memory(&pinned).unwrap().is_some());
}

#[tokio::test]
async fn fading_is_idempotent_at_a_fixed_clock() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;
    let id = F::create_memory(engine, "first apartment", 0.8, F::axis(1)).await;

    let later = Utc::now() + Duration::days(2);
    engine.fade_memories_at(0.5, later).unwrap();
    let once = engine.get_memory(&id).unwrap().unwrap().importance;
    assert!((once - 0.2).abs() < 1e-3);

    engine.fade_memories_at(0.5, later).unwrap();
    assert_eq!(engine.get_memory(&id).unwrap().unwrap().importance, once);
}

#[tokio::test]
async fn fading_lowers_until_pruned() {
    let manager = manager_without_sampling();
    let engine = &manager.engine;
    let anchor = engine
        .add_memory_with(
            AddMemoryInput::new("wedding day", 0.6)
                .with_embedding(F::axis(3))
                .pinned(),
        )
        .await
        .unwrap();
    let ordinary = F::create_memory(engine, "bus was late", 0.45, F::axis(5)).await;
    engine.filter_working().unwrap();

    let before = engine.get_memory(&ordinary).unwrap().unwrap().importance;
    engine
        .fade_memories_at(0.9, Utc::now() + Duration::days(10))
        .unwrap();
    let after = engine.get_memory(&ordinary).unwrap().unwrap().importance;
    assert!(after < before);

    assert_eq!(engine.prune_memories(0.3).unwrap(), vec![ordinary]);
    assert_eq!(engine.get_memory(&anchor).unwrap().unwrap().importance, 0.6);
}

#[tokio::test]
async fn empty_store_maintenance_is_a_no_op() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;
    assert!(engine.prune_memories(1.0).unwrap().is_empty());
    let report = engine.fade_memories(0.5).unwrap();
    assert_eq!(report.records_faded, 0);
}
