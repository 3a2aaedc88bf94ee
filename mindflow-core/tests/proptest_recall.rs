//! Property-Based Tests for mindflow core
//!
//! Uses `proptest` to check the recall and cache invariants under random
//! similarities, thresholds and insertion sequences.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;

use mindflow_core::attributes::classify_descriptions;
use mindflow_core::catalog::{QueryCatalog, RecallLabel};
use mindflow_core::embedding::{EmbeddingProvider, HashEmbeddingProvider};
use mindflow_core::mind_flow::{BoundedFifoMap, MindFlowCache};
use mindflow_core::status::{GateRole, StatusGate, SystemStatus};
use mindflow_core::types::UnitId;
use mindflow_core::MindflowError;

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_similarities() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0..1.0f32, 0..12)
}

fn arb_thresholds() -> impl Strategy<Value = (f32, f32)> {
    (-1.0..1.0f32, -1.0..1.0f32).prop_map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
}

fn arb_utterance() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "你好", "你喜欢吃什么", "你是什么性格", "刚才说了什么", "我们以前见过吗",
        "今天天气不错", "xyz", "再见",
    ])
    .prop_map(str::to_string)
}

fn schema() -> BTreeMap<String, Vec<String>> {
    let mut s = BTreeMap::new();
    s.insert("性格".to_string(), vec!["你是什么性格".to_string(), "你脾气好吗".to_string()]);
    s.insert("喜好".to_string(), vec!["你喜欢吃什么".to_string()]);
    s.insert("短期记忆".to_string(), vec!["刚才说了什么".to_string()]);
    s.insert("长期记忆".to_string(), vec!["我们以前见过吗".to_string()]);
    s
}

// ---------------------------------------------------------------------------
// Property: classify returns a subset of configured labels
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn classify_is_subset_of_catalog_labels(text in arb_utterance(), threshold in 0.0..1.0f32) {
        let embedder = HashEmbeddingProvider::new(128);
        let catalog = QueryCatalog::build(&schema(), &embedder).expect("build");
        let query = embedder.embed(&text).expect("embed");
        let labels = catalog.classify(&query, threshold);
        let known = catalog.labels();
        prop_assert!(labels.iter().all(|l| known.contains(l)));
        prop_assert!(!labels.contains(&RecallLabel::Attribute("0".to_string())));
    }

    #[test]
    fn classify_above_one_is_empty(text in arb_utterance()) {
        let embedder = HashEmbeddingProvider::new(128);
        let catalog = QueryCatalog::build(&schema(), &embedder).expect("build");
        let query = embedder.embed(&text).expect("embed");
        prop_assert!(catalog.classify(&query, 1.01).is_empty());
    }
}

// ---------------------------------------------------------------------------
// Property: entailment and contradiction sets are disjoint
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn entailed_and_contradicted_are_disjoint(sims in arb_similarities(), (contra, entail) in arb_thresholds()) {
        let texts: Vec<String> = (0..sims.len()).map(|i| format!("d{i}")).collect();
        let recall = classify_descriptions(&texts, &sims, contra, entail);

        for c in &recall.contradictions {
            prop_assert!(c.similarity <= contra);
        }
        let natural: Vec<_> = recall.entailed.iter().filter(|d| d.similarity >= entail && d.similarity > contra).collect();
        for d in &natural {
            prop_assert!(!recall.contradictions.iter().any(|c| c.text == d.text));
        }
    }

    #[test]
    fn non_empty_descriptions_never_yield_empty_entailment(sims in prop::collection::vec(-1.0..1.0f32, 1..12)) {
        let texts: Vec<String> = (0..sims.len()).map(|i| format!("d{i}")).collect();
        let recall = classify_descriptions(&texts, &sims, 0.58, 0.7);
        prop_assert!(!recall.entailed.is_empty());
        if sims.iter().all(|s| *s < 0.7) {
            prop_assert_eq!(recall.entailed.len(), 1);
            let best = sims.iter().copied().fold(f32::MIN, f32::max);
            prop_assert_eq!(recall.entailed[0].similarity, best);
        }
    }

    #[test]
    fn contradictions_sorted_ascending(sims in arb_similarities()) {
        let texts: Vec<String> = (0..sims.len()).map(|i| format!("d{i}")).collect();
        let recall = classify_descriptions(&texts, &sims, 0.58, 0.7);
        for pair in recall.contradictions.windows(2) {
            prop_assert!(pair[0].similarity <= pair[1].similarity);
        }
        for pair in recall.entailed.windows(2) {
            prop_assert!(pair[0].similarity >= pair[1].similarity);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: FIFO eviction keeps exactly the newest C entries
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn fifo_keeps_most_recent(capacity in 1usize..16, inserts in 0usize..64) {
        let mut map = BoundedFifoMap::new(capacity);
        let mut evicted = Vec::new();
        for i in 0..inserts {
            if let Some((k, _)) = map.insert(i, i * 10) {
                evicted.push(k);
            }
        }
        prop_assert_eq!(map.len(), inserts.min(capacity));
        let expected: Vec<usize> = (inserts.saturating_sub(capacity)..inserts).collect();
        prop_assert_eq!(map.keys().copied().collect::<Vec<_>>(), expected);
        let expected_evicted: Vec<usize> = (0..inserts.saturating_sub(capacity)).collect();
        prop_assert_eq!(evicted, expected_evicted);
    }

    #[test]
    fn mind_flow_never_exceeds_capacity(capacity in 1usize..12, turns in 0usize..40) {
        let mut cache = MindFlowCache::new(capacity);
        let ids: Vec<UnitId> = (0..turns).map(|_| UnitId::generate()).collect();
        for id in &ids {
            cache.record(id.clone(), "思考");
            prop_assert!(cache.len() <= capacity);
        }
        let survivors: Vec<&UnitId> = cache.turn_ids().collect();
        let expected: Vec<&UnitId> = ids.iter().skip(turns.saturating_sub(capacity)).collect();
        prop_assert_eq!(survivors, expected);
    }
}

// ---------------------------------------------------------------------------
// Property: concurrent edit admissions admit exactly one
// ---------------------------------------------------------------------------

fn arb_edit_pair() -> impl Strategy<Value = (GateRole, GateRole)> {
    let roles = vec![
        GateRole::MemoryEdit,
        GateRole::RoleGraphEdit,
        GateRole::QueryEdit,
        GateRole::AnswerEdit,
        GateRole::ConfigEdit,
    ];
    (prop::sample::select(roles.clone()), prop::sample::select(roles))
        .prop_filter("roles must differ", |(a, b)| a != b)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn concurrent_editors_admit_exactly_one((a, b) in arb_edit_pair()) {
        let gate = StatusGate::with_status(SystemStatus::Closed);
        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|role| {
                let gate = gate.clone();
                thread::spawn(move || (role, gate.try_enter_write(role)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();

        let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
        prop_assert_eq!(winners.len(), 1);
        let winner = winners[0].0;
        for (_, r) in &results {
            if let Err(MindflowError::Busy { status }) = r {
                prop_assert_eq!(*status, winner.held_status());
            } else {
                prop_assert!(r.is_ok());
            }
        }
        prop_assert_eq!(gate.status(), winner.held_status());
    }
}

#[test]
fn shared_gate_clone_sees_same_state() {
    let gate = Arc::new(StatusGate::with_status(SystemStatus::Closed));
    let other = (*gate).clone();
    gate.try_enter_write(GateRole::QueryEdit).expect("enter");
    assert_eq!(other.status(), SystemStatus::StandardQueryEditing);
}
