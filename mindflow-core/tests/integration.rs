//! Integration Tests: recall flows over the in-process store
//!
//! These tests wire a role graph, query/answer schemas, the hashing embedder
//! and `InMemoryStore` together and check the recall blocks a turn would see.

use std::collections::BTreeMap;
use std::sync::Arc;

use mindflow_core::catalog::{QueryCatalog, RecallLabel};
use mindflow_core::config::RecallConfig;
use mindflow_core::embedding::HashEmbeddingProvider;
use mindflow_core::recall::{LTM_HEADER, MemoryRetriever, RecallSource, STM_HEADER};
use mindflow_core::role_graph::RoleGraph;
use mindflow_core::store::{InMemoryStore, MemoryStore};
use mindflow_core::style::{NO_STYLE, StyleRetriever};
use mindflow_core::types::NewMemory;
use mindflow_core::AttributeIndex;

const ROLE_GRAPH: &str = r#"{
    "roles": {
        "艾琳": {
            "attributes": {
                "喜好": [
                    {"description": "喜欢吃苹果派", "access_rights": "unlimited"},
                    {"description": "讨厌下雨天", "access_rights": "unlimited"}
                ]
            },
            "ideas": {}
        }
    }
}"#;

fn schema(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.iter().map(|s| (*s).to_string()).collect()))
        .collect()
}

fn build(store: Arc<InMemoryStore>) -> MemoryRetriever {
    let embedder = HashEmbeddingProvider::new(256);
    let graph = RoleGraph::from_json(ROLE_GRAPH).expect("graph");
    let attributes =
        AttributeIndex::build(graph.entity_attributes("艾琳"), &embedder).expect("attributes");
    let catalog = QueryCatalog::build(
        &schema(&[
            ("喜好", &["你喜欢吃什么"]),
            ("短期记忆", &["刚才说了什么"]),
            ("长期记忆", &["我们以前见过吗"]),
        ]),
        &embedder,
    )
    .expect("catalog");
    let style = StyleRetriever::build(
        schema(&[("你喜欢吃什么", &["当然是苹果派啦！"])]),
        &embedder,
    )
    .expect("style");
    MemoryRetriever::new(store, catalog, attributes, style)
}

fn new_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(Arc::new(HashEmbeddingProvider::new(256))))
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[test]
fn greeting_selects_nothing() {
    let retriever = build(new_store());
    let q = retriever.embed("你好").expect("embed");
    assert!(retriever.classify(&q, &RecallConfig::default()).is_empty());
    assert_eq!(retriever.recall_style(&q, &RecallConfig::default()), NO_STYLE);
}

#[test]
fn catalog_phrase_selects_attribute_and_style() {
    let retriever = build(new_store());
    let config = RecallConfig::default();
    let q = retriever.embed("你喜欢吃什么").expect("embed");
    let labels = retriever.classify(&q, &config);
    assert!(labels.contains(&RecallLabel::Attribute("喜好".to_string())));

    let style = retriever.recall_style(&q, &config);
    assert!(style.contains("当然是苹果派啦！"));

    let attr = retriever.recall_attribute(&q, "喜好", "旅人", &config);
    assert!(attr.starts_with("(system: 对话可能涉及的信息:"));
    assert!(attr.contains("艾琳的喜好包括:"));
}

// ---------------------------------------------------------------------------
// Memory tiers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn short_then_long_term_after_flush() {
    let store = new_store();
    let retriever = build(Arc::clone(&store));
    let config = RecallConfig::default();

    store.start_session(None).await.expect("session");
    store
        .add_memory(NewMemory::speak("旅人", "我来自北方的雪山"))
        .await
        .expect("add");
    store
        .add_memory(NewMemory::speak("艾琳", "那里一定很冷吧"))
        .await
        .expect("add");

    let q = retriever.embed("我来自北方的雪山").expect("embed");
    let stm = retriever.recall_short_term(&q, &config).await.expect("stm");
    assert!(stm.starts_with(STM_HEADER));
    assert!(stm.contains("旅人-speak: 我来自北方的雪山"));
    assert!(retriever.recall_long_term(&q, &config).await.expect("ltm").is_empty());

    store.flush_context().await.expect("flush");
    store.start_session(None).await.expect("session");

    assert!(retriever.recall_short_term(&q, &config).await.expect("stm").is_empty());
    let ltm = retriever.recall_long_term(&q, &config).await.expect("ltm");
    assert!(ltm.starts_with(LTM_HEADER));
    assert!(ltm.contains("我来自北方的雪山"));
}

#[tokio::test]
async fn context_window_is_bounded_and_ordered() {
    let store = new_store();
    let retriever = build(Arc::clone(&store));
    for i in 0..15 {
        store
            .add_memory(NewMemory::speak("旅人", format!("第{i}句")))
            .await
            .expect("add");
    }
    let window = retriever.context_window(10).await.expect("ctx");
    assert_eq!(window.len(), 10);
    assert_eq!(window[0].content, "第5句");
    assert_eq!(window[9].content, "第14句");
}

#[tokio::test]
async fn resume_restores_eight_units_in_order() {
    let store = new_store();
    let session = store.start_session(None).await.expect("session");
    for i in 0..4 {
        store
            .add_memory(NewMemory::speak("旅人", format!("问{i}")))
            .await
            .expect("add");
        store
            .add_memory(NewMemory::speak("艾琳", format!("答{i}")))
            .await
            .expect("add");
    }
    store.flush_context().await.expect("flush");
    store.start_session(None).await.expect("other session");

    store.start_session(Some(session.clone())).await.expect("reopen");
    let restored = store.restore_short_term(&session).await.expect("restore");
    let texts: Vec<&str> = restored.iter().map(|u| u.content.as_str()).collect();
    assert_eq!(
        texts,
        vec!["问0", "答0", "问1", "答1", "问2", "答2", "问3", "答3"]
    );
}
