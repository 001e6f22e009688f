//! Journey: dream cycles triage, promote, merge and imagine

use std::sync::Arc;

use reverie_core::{DreamStage, EngineConfig, MemoryError, MemoryTier};
use reverie_e2e_tests::{
    FailingGenerator, MockSummarizer, TestDataFactory as F, TestEngineManager,
};

fn fast_config() -> EngineConfig {
    let mut config = TestEngineManager::default_config();
    config.dream.retain_sample_rate = 0.0;
    config.dream.long_term_after_secs = 0;
    config
}

#[tokio::test]
async fn two_cycles_consolidate_a_duplicate_cluster() {
    let manager = TestEngineManager::with_config(fast_config());
    let engine = &manager.engine;
    let cluster = F::create_duplicate_cluster(engine, 0).await;

    // Cycle 1: triage and first promotion
    let first = engine.dream().await.unwrap();
    assert_eq!(first.stages.len(), 4);
    for id in &cluster {
        let record = engine.get_memory(id).unwrap().unwrap();
        assert_eq!(record.tier, MemoryTier::ShortTerm);
        assert!((record.importance - 0.66).abs() < 1e-9);
    }
    // Nothing long-term yet, so nothing to imagine
    assert_eq!(first.stage(DreamStage::Synthesize).unwrap().records_created, 0);

    // Cycle 2: long-term promotion, merge, then scenarios from the summaries
    let second = engine.dream().await.unwrap();
    let merge = second.stage(DreamStage::Merge).unwrap();
    assert_eq!(merge.records_changed, 1);
    assert_eq!(merge.records_created, 2);
    assert_eq!(merge.records_removed, 4);

    let synthesize = second.stage(DreamStage::Synthesize).unwrap();
    assert_eq!(synthesize.records_created, 2);

    let summaries: Vec<_> = engine
        .all_memories()
        .unwrap()
        .into_iter()
        .filter(|r| r.derived_from.len() == 4)
        .collect();
    assert_eq!(summaries.len(), 2);
    for summary in &summaries {
        assert_eq!(summary.tier, MemoryTier::LongTerm);
        assert!((summary.importance - 0.66).abs() < 1e-9);
    }
    assert!(summaries[0].connections.contains_key(&summaries[1].id));

    for id in &cluster {
        assert!(engine.get_memory(id).unwrap().unwrap().is_superseded());
    }

    let scenarios = engine.emotional_memories("anticipation", 0.7).unwrap();
    assert_eq!(scenarios.len(), 2);
    assert!(scenarios.iter().all(|r| r.tier == MemoryTier::Working));
    assert!(scenarios.iter().any(|r| r.content.starts_with("It works out")));
    assert!(scenarios.iter().any(|r| r.content.starts_with("It goes wrong")));
}

#[tokio::test]
async fn failing_generator_does_not_break_the_cycle() {
    let manager = TestEngineManager::with_collaborators(
        fast_config(),
        Arc::new(MockSummarizer),
        Arc::new(FailingGenerator),
    );
    let engine = &manager.engine;
    let id = F::create_memory(engine, "launch day", 0.8, F::axis(2)).await;
    engine.activate_memory(&id, 1.0).unwrap();

    let report = engine.dream().await.unwrap();
    let synthesize = report.stage(DreamStage::Synthesize).unwrap();
    assert_eq!(synthesize.records_created, 0);
    assert!(synthesize.actions.iter().any(|a| a.contains("backend offline")));
    assert_eq!(manager.record_count(), 1);

    let err = engine.simulate_future_situations().await.unwrap_err();
    assert!(matches!(err, MemoryError::GeneratorUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn stages_can_run_one_at_a_time() {
    let manager = TestEngineManager::with_config(fast_config());
    let engine = &manager.engine;
    let keeper = F::create_memory(engine, "learned to drive", 0.95, F::axis(6)).await;

    let filter = engine.filter_working().unwrap();
    assert_eq!(filter.records_processed, 1);
    assert_eq!(engine.get_memory(&keeper).unwrap().unwrap().tier, MemoryTier::Working);

    engine.promote_tiers().unwrap();
    assert_eq!(engine.get_memory(&keeper).unwrap().unwrap().tier, MemoryTier::ShortTerm);

    engine.promote_tiers().unwrap();
    let record = engine.get_memory(&keeper).unwrap().unwrap();
    assert_eq!(record.tier, MemoryTier::LongTerm);
    assert_eq!(record.importance, 1.0);

    let merge = engine.merge_similar_memories().await.unwrap();
    assert_eq!(merge.records_changed, 0);
}

#[tokio::test]
async fn resolving_a_conflict_keeps_an_audit_trail() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;
    let monday = F::create_emotional_memory(
        engine,
        "the exam is on monday",
        0.6,
        F::with_similarity(8, 9, 0.95),
        &[("fear", 0.4)],
    )
    .await;
    let friday = F::create_emotional_memory(
        engine,
        "the exam is on friday",
        0.5,
        F::with_similarity(8, 10, 0.95),
        &[("relief", 0.6)],
    )
    .await;

    let resolved = engine
        .resolve_conflict(&monday, &friday, "the exam moved from monday to friday")
        .await
        .unwrap();

    let record = engine.get_memory(&resolved).unwrap().unwrap();
    assert_eq!(record.importance, 0.6);
    assert_eq!(record.emotion_profile.intensity("fear"), 0.4);
    assert_eq!(record.emotion_profile.intensity("relief"), 0.6);
    assert_eq!(record.derived_from, vec![monday.clone(), friday.clone()]);

    for old in [&monday, &friday] {
        let old = engine.get_memory(old).unwrap().unwrap();
        assert_eq!(old.superseded_by.as_deref(), Some(resolved.as_str()));
    }
    assert_eq!(manager.record_count(), 1);
    assert_eq!(engine.stats().unwrap().superseded, 2);
}
