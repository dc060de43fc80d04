// ABOUTME: Tests for the SQLite catalog loader and answer store
// ABOUTME: Runs against an in-memory database with the real schema applied

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use marketwise_questionnaire::{
    Answer, AnswerStore, CatalogDocument, CatalogLoader, Diagnosis, DiagnosisGenerator,
    EngineConfig, EnginePhase, GenerationError, QuestionKind, QuestionnaireEngine,
    QuestionnaireError, QuestionnaireStorage,
};
use marketwise_storage::connect_in_memory;

const CATALOG: &str = r#"{
    "stages": [
        {
            "step_number": 1,
            "title": "Your business",
            "questions": [
                {
                    "step": 1,
                    "text": "What kind of business do you run?",
                    "kind": "single_select",
                    "options": [
                        { "display": "Retail", "option_key": "retail" },
                        { "display": "Other", "option_key": "other", "allows_free_text": true }
                    ]
                },
                {
                    "step": 2,
                    "text": "Where do you reach customers?",
                    "kind": "multi_select",
                    "max_selections": 2,
                    "options": [
                        { "display": "Instagram" },
                        { "display": "Facebook" },
                        { "display": "Newsletter" }
                    ]
                }
            ]
        },
        {
            "step_number": 2,
            "title": "Goals",
            "questions": [
                { "step": 1, "text": "What would success look like?", "kind": "free_text" }
            ]
        }
    ]
}"#;

async fn seeded_storage() -> QuestionnaireStorage {
    let pool = connect_in_memory().await.unwrap();
    let storage = QuestionnaireStorage::new(pool);
    let catalog = CatalogDocument::from_json(CATALOG)
        .unwrap()
        .into_catalog()
        .unwrap();
    storage.replace_catalog(&catalog).await.unwrap();
    storage
}

/// (question id, option ids) in traversal order
async fn ids(storage: &QuestionnaireStorage) -> Vec<(String, Vec<String>)> {
    let catalog = storage.load_catalog("user-1").await.unwrap();
    catalog
        .positions()
        .map(|(_, q)| (q.id.clone(), q.options.iter().map(|o| o.id.clone()).collect()))
        .collect()
}

#[tokio::test]
async fn test_imported_catalog_loads_in_order() {
    let storage = seeded_storage().await;
    let catalog = storage.load_catalog("user-1").await.unwrap();

    assert_eq!(catalog.stages().len(), 2);
    assert_eq!(catalog.total_questions(), 3);

    let kinds: Vec<QuestionKind> = catalog.positions().map(|(_, q)| q.kind).collect();
    assert_eq!(
        kinds,
        vec![
            QuestionKind::SingleSelect,
            QuestionKind::MultiSelect,
            QuestionKind::FreeText
        ]
    );

    let first = catalog.positions().next().unwrap().1;
    assert_eq!(first.options[0].display_text, "Retail");
    assert_eq!(first.options[1].option_key.as_deref(), Some("other"));
    assert!(first.options[1].allows_free_text);
    assert_eq!(catalog.positions().nth(1).unwrap().1.max_selections, 2);
}

#[tokio::test]
async fn test_empty_database_fails_to_load() {
    let pool = connect_in_memory().await.unwrap();
    let storage = QuestionnaireStorage::new(pool);

    assert!(matches!(
        storage.load_catalog("user-1").await,
        Err(QuestionnaireError::InvalidCatalog(_))
    ));
}

#[tokio::test]
async fn test_single_answer_is_replaced() {
    let storage = seeded_storage().await;
    let ids = ids(&storage).await;
    let (question, options) = &ids[0];

    storage
        .upsert_single_answer("user-1", question, &options[0], None)
        .await
        .unwrap();
    storage
        .upsert_single_answer("user-1", question, &options[1], Some("Bakery"))
        .await
        .unwrap();

    let rows = storage.list_answers("user-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].answer,
        Answer::SelectedOption {
            option_id: options[1].clone(),
            text: Some("Bakery".to_string()),
        }
    );
}

#[tokio::test]
async fn test_identical_single_answer_keeps_existing_row() {
    let storage = seeded_storage().await;
    let ids = ids(&storage).await;
    let (question, options) = &ids[0];

    storage
        .upsert_single_answer("user-1", question, &options[0], None)
        .await
        .unwrap();
    let before = storage.list_answers("user-1").await.unwrap();

    storage
        .upsert_single_answer("user-1", question, &options[0], None)
        .await
        .unwrap();
    assert_eq!(storage.list_answers("user-1").await.unwrap(), before);
}

#[tokio::test]
async fn test_multi_answers_are_reconciled() {
    let storage = seeded_storage().await;
    let ids = ids(&storage).await;
    let (question, options) = &ids[1];
    let no_text = BTreeMap::new();

    storage
        .reconcile_multi_answers(
            "user-1",
            question,
            &[options[0].clone(), options[1].clone()],
            &no_text,
        )
        .await
        .unwrap();
    let kept = storage.list_answers("user-1").await.unwrap()[1].clone();

    storage
        .reconcile_multi_answers(
            "user-1",
            question,
            &[options[1].clone(), options[2].clone()],
            &no_text,
        )
        .await
        .unwrap();

    let rows = storage.list_answers("user-1").await.unwrap();
    let stored: Vec<&str> = rows.iter().filter_map(|r| r.answer.option_id()).collect();
    assert_eq!(stored, vec![options[1].as_str(), options[2].as_str()]);
    assert_eq!(rows[0].id, kept.id);
}

#[tokio::test]
async fn test_free_text_answer_has_no_option() {
    let storage = seeded_storage().await;
    let ids = ids(&storage).await;
    let (question, _) = &ids[2];

    storage
        .upsert_free_text_answer("user-1", question, "Twice the orders")
        .await
        .unwrap();
    storage
        .upsert_free_text_answer("user-1", question, "Three times the orders")
        .await
        .unwrap();

    let rows = storage.list_answers("user-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].answer,
        Answer::FreeText {
            text: "Three times the orders".to_string()
        }
    );
    assert!(storage.list_answers("user-2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reimport_replaces_catalog_and_answers() {
    let storage = seeded_storage().await;
    let ids = ids(&storage).await;
    storage
        .upsert_free_text_answer("user-1", &ids[2].0, "Grow")
        .await
        .unwrap();

    let catalog = CatalogDocument::from_json(CATALOG)
        .unwrap()
        .into_catalog()
        .unwrap();
    let summary = storage.replace_catalog(&catalog).await.unwrap();

    assert_eq!(summary.stages, 2);
    assert_eq!(summary.questions, 3);
    assert_eq!(summary.options, 5);
    assert!(storage.list_answers("user-1").await.unwrap().is_empty());
}

struct EchoGenerator;

#[async_trait]
impl DiagnosisGenerator for EchoGenerator {
    async fn generate_diagnosis(
        &self,
        user_id: &str,
    ) -> std::result::Result<Diagnosis, GenerationError> {
        Ok(Diagnosis {
            user_id: user_id.to_string(),
            text: "ok".to_string(),
            generated_at: Utc::now(),
        })
    }
}

#[tokio::test]
async fn test_engine_walkthrough_against_sqlite() {
    let storage = Arc::new(seeded_storage().await);
    let ids = ids(&storage).await;

    let mut engine = QuestionnaireEngine::start(
        "user-1",
        storage.as_ref(),
        storage.clone(),
        Arc::new(EchoGenerator),
        EngineConfig::default(),
    )
    .await;

    engine.select_option(&ids[0].0, &ids[0].1[0]).await.unwrap();
    engine.toggle_option(&ids[1].0, &ids[1].1[2]).await.unwrap();
    engine.proceed().await.unwrap();
    engine.set_free_text(&ids[2].0, "More regulars").await.unwrap();
    engine.proceed().await.unwrap();

    assert!(matches!(
        engine.wait_for_generation().await,
        EnginePhase::DiagnosisReady { .. }
    ));
    assert_eq!(storage.list_answers("user-1").await.unwrap().len(), 3);
}
