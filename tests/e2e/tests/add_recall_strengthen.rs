//! Journey: add memories, recall them, watch them strengthen and activate

use reverie_core::{EmotionProfile, MemoryError};
use reverie_e2e_tests::{TestDataFactory as F, TestEngineManager};

#[tokio::test]
async fn similar_records_rank_first_and_strengthen_by_delta() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;
    let delta = engine.config().scoring.strengthen_delta;

    let first = F::create_memory(engine, "bought a bicycle", 0.5, F::axis(0)).await;
    let second =
        F::create_memory(engine, "bought a helmet", 0.5, F::with_similarity(0, 1, 0.9)).await;
    let third =
        F::create_memory(engine, "bought groceries", 0.5, F::with_similarity(0, 2, 0.1)).await;
    let fourth = F::create_memory(engine, "read a novel", 0.5, F::axis(7)).await;

    let hits = engine.recall_by_embedding(&F::axis(0), 4, None).unwrap();
    let order: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();

    assert_eq!(order[0], first);
    assert_eq!(order[1], second);
    assert!(order[2..].contains(&third.as_str()));
    assert!(order[2..].contains(&fourth.as_str()));

    let first = engine.get_memory(&first).unwrap().unwrap();
    assert!((first.importance - (0.5 + delta)).abs() < 1e-12);
    assert_eq!(first.access_count, 1);
}

#[tokio::test]
async fn recall_by_text_uses_the_embedder() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;
    manager.embedder.pin("what did I drink", F::axis(3));

    let tea = F::create_memory(engine, "green tea in the garden", 0.4, F::axis(3)).await;
    F::create_memory(engine, "fixed the sink", 0.4, F::axis(9)).await;

    let hits = engine.recall_memory("what did I drink", 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, tea);
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn repeated_recall_never_weakens() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;
    for i in 0..5 {
        F::create_memory(engine, &format!("note {}", i), 0.3, F::with_similarity(0, i + 1, 0.8))
            .await;
    }

    let first = engine.recall_by_embedding(&F::axis(0), 3, None).unwrap();
    let second = engine.recall_by_embedding(&F::axis(0), 3, None).unwrap();
    assert!(first.len() <= 3);

    for hit in &first {
        let again = engine.get_memory(&hit.record.id).unwrap().unwrap();
        assert!(again.access_count >= hit.record.access_count);
        assert!(again.importance >= hit.record.importance);
    }
    for pair in second.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn emotion_filter_prefers_matching_feelings() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;

    let neutral =
        F::create_memory(engine, "walked the dog", 0.5, F::with_similarity(4, 5, 0.99)).await;
    let happy = F::create_emotional_memory(
        engine,
        "walked the dog on the beach",
        0.5,
        F::with_similarity(4, 6, 0.8),
        &[("joy", 0.9)],
    )
    .await;

    let plain = engine.recall_by_embedding(&F::axis(4), 1, None).unwrap();
    assert_eq!(plain[0].record.id, neutral);

    let joy = EmotionProfile::from_pairs([("joy", 1.0)]).unwrap();
    let filtered = engine.recall_by_embedding(&F::axis(4), 2, Some(&joy)).unwrap();
    assert_eq!(filtered[0].record.id, happy);
    assert!(filtered[0].score > filtered[1].score);
}

#[tokio::test]
async fn activation_fades_with_distance() {
    let manager = TestEngineManager::new();
    let engine = &manager.engine;
    let diagonal = std::f32::consts::FRAC_1_SQRT_2;

    let a = F::create_memory(engine, "a", 0.5, F::axis(0)).await;
    let mut middle = vec![0.0_f32; reverie_e2e_tests::DIM];
    middle[0] = diagonal;
    middle[1] = diagonal;
    let b = F::create_memory(engine, "b", 0.5, middle).await;
    let c = F::create_memory(engine, "c", 0.5, F::axis(1)).await;

    let touched = engine.activate_memory(&a, 1.0).unwrap();
    let level = |id: &str| touched.iter().find(|t| t.id == id).map(|t| (t.activation, t.hops));

    let (act_a, hops_a) = level(&a).unwrap();
    let (act_b, hops_b) = level(&b).unwrap();
    let (act_c, hops_c) = level(&c).unwrap();
    assert_eq!((hops_a, hops_b, hops_c), (0, 1, 2));
    assert!(act_a > act_b && act_b > act_c && act_c > 0.0);

    let active = engine.active_memories(0.3).unwrap();
    assert_eq!(active.len(), 2);
}

#[tokio::test]
async fn unknown_ids_are_reported() {
    let manager = TestEngineManager::new();
    assert!(matches!(
        manager.engine.activate_memory("nope", 1.0),
        Err(MemoryError::RecordNotFound(_))
    ));
    assert!(manager.engine.get_memory("nope").unwrap().is_none());
}
