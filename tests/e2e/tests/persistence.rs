//! Journey: save the store, reopen it, and refuse incompatible files

use reverie_core::{FORMAT_VERSION, MemoryError, MemorySnapshot};
use reverie_e2e_tests::{TestDataFactory as F, TestEngineManager};

#[tokio::test]
async fn reopened_store_matches_the_saved_one() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;

    let a = F::create_emotional_memory(
        engine,
        "first concert",
        0.7,
        F::with_similarity(0, 1, 0.95),
        &[("joy", 0.8)],
    )
    .await;
    let b = F::create_memory(engine, "second concert", 0.5, F::with_similarity(0, 2, 0.95)).await;
    let c = F::create_memory(engine, "lost ticket", 0.3, F::axis(5)).await;
    let resolved = engine
        .resolve_conflict(&b, &c, "second concert, found the ticket")
        .await
        .unwrap();
    engine.activate_memory(&a, 1.0).unwrap();
    engine.recall_by_embedding(&F::axis(0), 1, None).unwrap();

    manager.save();
    let reopened = manager.reopen();

    let saved = engine.all_memories().unwrap();
    let loaded = reopened.all_memories().unwrap();
    assert_eq!(saved.len(), loaded.len());
    for (before, after) in saved.iter().zip(&loaded) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.content, after.content);
        assert_eq!(before.importance, after.importance);
        assert_eq!(before.access_count, after.access_count);
        assert_eq!(before.tier, after.tier);
        assert_eq!(before.emotion_profile, after.emotion_profile);
        assert_eq!(before.connections, after.connections);
        assert_eq!(after.activation, 0.0);
    }

    assert_eq!(
        reopened.memory_graph().unwrap().edges,
        engine.memory_graph().unwrap().edges
    );
    let history = reopened.get_memory(&b).unwrap().unwrap();
    assert_eq!(history.superseded_by.as_deref(), Some(resolved.as_str()));

    // Search works against the rebuilt index
    let hits = reopened.recall_by_embedding(&F::axis(0), 1, None).unwrap();
    assert_eq!(hits[0].record.id, a);
}

#[tokio::test]
async fn mismatched_dimension_is_incompatible() {
    let manager = TestEngineManager::new();
    F::create_memory(&manager.engine, "kept", 0.5, F::axis(1)).await;
    manager.save();

    let mut snapshot = MemorySnapshot::read_from(manager.state_path()).unwrap();
    snapshot.embedding_dim = 32;
    snapshot.write_to(manager.state_path()).unwrap();

    let fresh = manager.fresh_engine();
    assert!(matches!(
        fresh.load_state(manager.state_path()),
        Err(MemoryError::IncompatibleState(_))
    ));
    assert_eq!(fresh.stats().unwrap().total_records, 0);
}

#[tokio::test]
async fn newer_format_is_incompatible() {
    let manager = TestEngineManager::new();
    manager.save();

    let mut snapshot = MemorySnapshot::read_from(manager.state_path()).unwrap();
    snapshot.format_version = FORMAT_VERSION + 1;
    snapshot.write_to(manager.state_path()).unwrap();

    assert!(matches!(
        manager.fresh_engine().load_state(manager.state_path()),
        Err(MemoryError::IncompatibleState(_))
    ));
}

#[tokio::test]
async fn corrupt_file_leaves_the_store_alone() {
    let manager = TestEngineManager::new();
    let id = F::create_memory(&manager.engine, "still here", 0.5, F::axis(3)).await;
    std::fs::write(manager.state_path(), b"{ not json").unwrap();

    assert!(matches!(
        manager.engine.load_state(manager.state_path()),
        Err(MemoryError::Serialization(_))
    ));
    assert!(manager.engine.get_memory(&id).unwrap().is_some());
}
