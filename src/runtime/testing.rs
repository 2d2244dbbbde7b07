//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::capabilities::{CapabilityError, RuleExtractor};
use crate::state_machine::{ConversationState, FeatureVector, Metrics, Phase, Prediction, RiskLabel, Turn};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock Extractor
// ============================================================================

/// Extractor that returns queued results, falling back to the rule
/// extractor once the queue is empty
#[allow(dead_code)]
pub struct MockExtractor {
    responses: Mutex<VecDeque<Result<Extraction, CapabilityError>>>,
    delay: Duration,
    /// Utterances seen, in order
    pub calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockExtractor {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue_reply(&self, metrics: Metrics, reply: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(Extraction {
            metrics,
            reply: Some(reply.into()),
        }));
    }

    pub fn queue_error(&self, error: CapabilityError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(
        &self,
        text: &str,
        _history: &[Turn],
        _current: &Metrics,
    ) -> Result<Extraction, CapabilityError> {
        self.calls.lock().unwrap().push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let queued = self.responses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(Extraction {
                metrics: RuleExtractor::parse(text),
                reply: None,
            })
        })
    }
}

// ============================================================================
// Mock Classifier
// ============================================================================

/// Classifier with a fixed answer that records every feature vector
#[allow(dead_code)]
pub struct MockClassifier {
    result: Mutex<Result<Prediction, CapabilityError>>,
    /// Feature vectors seen, in order
    pub seen: Mutex<Vec<FeatureVector>>,
}

#[allow(dead_code)]
impl MockClassifier {
    pub fn returning(label: RiskLabel, probability: f64) -> Self {
        Self {
            result: Mutex::new(Ok(Prediction::new(label, probability))),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            result: Mutex::new(Err(error)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn set_result(&self, result: Result<Prediction, CapabilityError>) {
        *self.result.lock().unwrap() = result;
    }

    pub fn seen(&self) -> Vec<FeatureVector> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction, CapabilityError> {
        self.seen.lock().unwrap().push(*features);
        self.result.lock().unwrap().clone()
    }

    fn model_id(&self) -> &str {
        "mock-classifier"
    }
}

// ============================================================================
// Mock Retriever
// ============================================================================

#[allow(dead_code)]
pub struct MockRetriever {
    result: Result<String, CapabilityError>,
    /// Queries seen, in order
    pub queries: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockRetriever {
    pub fn returning(text: impl Into<String>) -> Self {
        Self {
            result: Ok(text.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            result: Err(error),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn search(&self, query: &str) -> Result<String, CapabilityError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.result.clone()
    }
}

// ============================================================================
// In-memory Storage
// ============================================================================

/// In-memory session store that records the phase of every save
#[allow(dead_code)]
#[derive(Default)]
pub struct InMemoryStorage {
    sessions: Mutex<HashMap<String, ConversationState>>,
    /// (`session_id`, phase) per save, in order
    pub saves: Mutex<Vec<(String, Phase)>>,
    fail_saves: Mutex<bool>,
}

#[allow(dead_code)]
impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: &str, state: ConversationState) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), state);
    }

    pub fn snapshot(&self, session_id: &str) -> Option<ConversationState> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn saved_phases(&self, session_id: &str) -> Vec<Phase> {
        self.saves
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, phase)| *phase)
            .collect()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap() = fail;
    }
}

#[async_trait]
impl SessionStore for InMemoryStorage {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, String> {
        Ok(self.snapshot(session_id))
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), String> {
        if *self.fail_saves.lock().unwrap() {
            return Err("disk full".to_string());
        }
        self.saves
            .lock()
            .unwrap()
            .push((session_id.to_string(), state.phase));
        self.insert(session_id, state.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, String> {
        Ok(self.sessions.lock().unwrap().remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        ConversationRuntime, ExecutorError, SessionManager, GREETING, PREDICTION_FAILED_MESSAGE,
    };
    use crate::state_machine::{Role, StepName, ValidationRanges, ValidationStatus};
    use crate::steps::ADVICE_UNAVAILABLE;
    use std::sync::Arc;

    type TestManager = SessionManager<
        Arc<InMemoryStorage>,
        Arc<MockExtractor>,
        Arc<MockClassifier>,
        Arc<MockRetriever>,
    >;

    struct Harness {
        storage: Arc<InMemoryStorage>,
        extractor: Arc<MockExtractor>,
        classifier: Arc<MockClassifier>,
        retriever: Arc<MockRetriever>,
        manager: TestManager,
    }

    fn harness_with(
        extractor: MockExtractor,
        classifier: MockClassifier,
        retriever: MockRetriever,
    ) -> Harness {
        let storage = Arc::new(InMemoryStorage::new());
        let extractor = Arc::new(extractor);
        let classifier = Arc::new(classifier);
        let retriever = Arc::new(retriever);
        let runtime = ConversationRuntime::new(
            Arc::clone(&storage),
            Arc::clone(&extractor),
            Arc::clone(&classifier),
            Arc::clone(&retriever),
            ValidationRanges::default(),
        );
        Harness {
            storage,
            extractor,
            classifier,
            retriever,
            manager: SessionManager::new(runtime),
        }
    }

    fn harness() -> Harness {
        harness_with(
            MockExtractor::new(),
            MockClassifier::returning(RiskLabel::HighRisk, 0.78),
            MockRetriever::returning("- Choose whole grains\n- Walk daily"),
        )
    }

    /// Scenario A: all required metrics in one turn arms the gate
    async fn gated_session(h: &Harness) -> String {
        let (id, _) = h.manager.create_session().await.unwrap();
        let outcome = h
            .manager
            .advance(&id, "I'm 45, glucose 130, BMI 29")
            .await
            .unwrap();
        assert!(outcome.gated);
        id
    }

    #[tokio::test]
    async fn test_new_session_has_greeting() {
        let h = harness();
        let (id, state) = h.manager.create_session().await.unwrap();
        assert_eq!(state.history, vec![Turn::assistant(GREETING)]);
        assert_eq!(h.manager.get_state(&id).await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_scenario_a_gate_arms_without_predicting() {
        let h = harness();
        let (id, _) = h.manager.create_session().await.unwrap();

        let outcome = h
            .manager
            .advance(&id, "I'm 45, glucose 130, BMI 29")
            .await
            .unwrap();

        assert!(outcome.gated);
        assert_eq!(outcome.phase, Phase::GatedForPredict);
        // User turn plus the extraction reply; Validate passed silently
        assert_eq!(outcome.turns_appended.len(), 2);
        assert_eq!(outcome.turns_appended[0], Turn::user("I'm 45, glucose 130, BMI 29"));

        let state = h.manager.get_state(&id).await.unwrap();
        assert_eq!(state.pending_step, Some(StepName::Predict));
        assert_eq!(state.validation_status, ValidationStatus::Pass);
        assert!(state.prediction.is_none());
        assert!(h.classifier.seen().is_empty());
        assert!(h.retriever.queries().is_empty());

        // Persisted after Extract and again once the gate was armed
        assert_eq!(
            h.storage.saved_phases(&id),
            vec![Phase::Collecting, Phase::ReadyToValidate, Phase::GatedForPredict]
        );
    }

    #[tokio::test]
    async fn test_scenario_b_out_of_range_glucose() {
        let h = harness();
        let (id, _) = h.manager.create_session().await.unwrap();
        h.manager.advance(&id, "I'm 45 and my BMI is 29").await.unwrap();

        let outcome = h.manager.advance(&id, "glucose 900").await.unwrap();
        assert!(!outcome.gated);
        assert_eq!(outcome.phase, Phase::Collecting);

        let corrective = outcome.turns_appended.last().unwrap();
        assert_eq!(corrective.role, Role::Assistant);
        assert!(corrective.text.contains("Glucose (900)"));

        let state = h.manager.get_state(&id).await.unwrap();
        assert_eq!(state.pending_step, None);
        assert_eq!(state.validation_status, ValidationStatus::Fail);
        assert_eq!(state.metrics.glucose, Some(900.0));
    }

    #[tokio::test]
    async fn test_standing_validation_failure_is_repeated_not_ready() {
        let h = harness();
        let (id, _) = h.manager.create_session().await.unwrap();

        let first = h
            .manager
            .advance(&id, "I'm 45, glucose 900, BMI 29")
            .await
            .unwrap();
        assert!(!first.gated);
        let texts: Vec<&str> = first.turns_appended.iter().map(|t| t.text.as_str()).collect();
        assert!(texts.iter().all(|t| !t.contains("ready to perform")));
        assert!(texts.last().unwrap().contains("Glucose (900)"));

        // Nothing changes, so Validate stays silent and the reply must carry the correction
        let second = h.manager.advance(&id, "hello?").await.unwrap();
        assert!(!second.gated);
        assert_eq!(second.turns_appended.len(), 2);
        let reply = &second.turns_appended[1];
        assert_eq!(reply.role, Role::Assistant);
        assert!(!reply.text.contains("ready to perform"));
        assert!(reply.text.contains("Glucose (900) is outside the realistic range of 20-600"));

        let state = h.manager.get_state(&id).await.unwrap();
        assert_eq!(state.validation_status, ValidationStatus::Fail);
        assert_eq!(state.pending_step, None);

        // Correcting the value clears the failure and arms the gate
        let third = h.manager.advance(&id, "glucose 130").await.unwrap();
        assert!(third.gated);
    }

    #[tokio::test]
    async fn test_scenario_c_resume_predicts_and_enriches() {
        let h = harness();
        let id = gated_session(&h).await;

        let outcome = h.manager.resume(&id).await.unwrap();
        assert!(!outcome.gated);
        assert_eq!(outcome.phase, Phase::Done);
        assert_eq!(outcome.turns_appended.len(), 1);

        let final_turn = &outcome.turns_appended[0].text;
        assert!(final_turn.contains("High Risk (78% probability)"));
        assert!(final_turn.contains("Personalized Recommendations"));
        assert!(final_turn.contains("Walk daily"));

        let state = h.manager.get_state(&id).await.unwrap();
        let prediction = state.prediction.unwrap();
        assert_eq!(prediction.label, RiskLabel::HighRisk);
        assert!((prediction.probability - 0.78).abs() < 1e-9);
        assert!(state.advice.is_some());
        assert_eq!(state.pending_step, None);
        assert_eq!(
            h.retriever.queries(),
            vec!["Vegetarian diet and lifestyle tips for a 45 year old with high diabetes risk"]
        );
    }

    #[tokio::test]
    async fn test_edit_after_gate_clears_it() {
        let h = harness();
        let id = gated_session(&h).await;

        let outcome = h.manager.advance(&id, "actually BMI is 85").await.unwrap();
        assert!(!outcome.gated);
        assert!(outcome
            .turns_appended
            .iter()
            .any(|t| t.text.contains("BMI (85) is outside the realistic range of 10-70")));

        let state = h.manager.get_state(&id).await.unwrap();
        assert_eq!(state.metrics.bmi, Some(85.0));
        assert_eq!(state.pending_step, None);
        assert_eq!(state.validation_status, ValidationStatus::Fail);

        // Resuming now is a protocol error
        assert!(matches!(
            h.manager.resume(&id).await,
            Err(ExecutorError::InvalidResume(_))
        ));
    }

    #[tokio::test]
    async fn test_valid_edit_after_gate_rearms() {
        let h = harness();
        let id = gated_session(&h).await;

        let outcome = h.manager.advance(&id, "sorry, BMI is 31").await.unwrap();
        assert!(outcome.gated);
        let state = h.manager.get_state(&id).await.unwrap();
        assert_eq!(state.metrics.bmi, Some(31.0));
        assert_eq!(state.validation_status, ValidationStatus::Pass);
    }

    #[tokio::test]
    async fn test_resume_when_ungated_is_rejected() {
        let h = harness();
        let (id, _) = h.manager.create_session().await.unwrap();
        let before = h.manager.get_state(&id).await.unwrap();

        assert!(matches!(
            h.manager.resume(&id).await,
            Err(ExecutorError::InvalidResume(_))
        ));
        assert_eq!(h.manager.get_state(&id).await.unwrap(), before);
        assert!(matches!(
            h.manager.resume("missing").await,
            Err(ExecutorError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_twice_is_rejected() {
        let h = harness();
        let id = gated_session(&h).await;
        h.manager.resume(&id).await.unwrap();
        assert!(matches!(
            h.manager.resume(&id).await,
            Err(ExecutorError::InvalidResume(_))
        ));
        assert_eq!(h.classifier.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_resume_after_reload_matches_direct_resume() {
        let h = harness();
        let id = gated_session(&h).await;
        let gated = h.storage.snapshot(&id).unwrap();

        // Directly on the in-memory value
        let mut direct = gated.clone();
        h.manager
            .runtime()
            .resume("direct", &mut direct)
            .await
            .unwrap();

        // Through a JSON round-trip, as a restart would
        let json = serde_json::to_string(&gated).unwrap();
        let mut reloaded: ConversationState = serde_json::from_str(&json).unwrap();
        h.manager
            .runtime()
            .resume("reloaded", &mut reloaded)
            .await
            .unwrap();

        assert_eq!(direct, reloaded);
    }

    #[tokio::test]
    async fn test_prediction_failure_clears_gate() {
        let h = harness_with(
            MockExtractor::new(),
            MockClassifier::failing(CapabilityError::network("model server down")),
            MockRetriever::returning("tips"),
        );
        let id = gated_session(&h).await;

        let err = h.manager.resume(&id).await.unwrap_err();
        assert!(matches!(err, ExecutorError::PredictionFailed(_)));

        let state = h.manager.get_state(&id).await.unwrap();
        assert_eq!(state.pending_step, None);
        assert_eq!(state.phase, Phase::Collecting);
        assert!(state.prediction.is_none());
        assert_eq!(state.history.last().unwrap().text, PREDICTION_FAILED_MESSAGE);
        assert!(h.retriever.queries().is_empty());

        // A fresh advance re-arms the gate and the retry succeeds
        h.classifier
            .set_result(Ok(Prediction::new(RiskLabel::LowRisk, 0.12)));
        let outcome = h.manager.advance(&id, "please try again").await.unwrap();
        assert!(outcome.gated);
        let outcome = h.manager.resume(&id).await.unwrap();
        assert_eq!(outcome.phase, Phase::Done);
    }

    #[tokio::test]
    async fn test_enrichment_failure_still_delivers_prediction() {
        let h = harness_with(
            MockExtractor::new(),
            MockClassifier::returning(RiskLabel::LowRisk, 0.25),
            MockRetriever::failing(CapabilityError::timeout("search timed out")),
        );
        let id = gated_session(&h).await;

        let outcome = h.manager.resume(&id).await.unwrap();
        assert_eq!(outcome.phase, Phase::Done);
        assert!(outcome.turns_appended[0].text.contains("Low Risk (25% probability)"));

        let state = h.manager.get_state(&id).await.unwrap();
        assert!(state.prediction.is_some());
        assert_eq!(state.advice.as_deref(), Some(ADVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_extraction_failure_reprompts() {
        let h = harness();
        let (id, _) = h.manager.create_session().await.unwrap();
        h.manager.advance(&id, "I'm 45").await.unwrap();

        h.extractor
            .queue_error(CapabilityError::malformed("not json"));
        let outcome = h.manager.advance(&id, "glucose 130, BMI 29").await.unwrap();
        assert!(!outcome.gated);
        assert_eq!(outcome.turns_appended.len(), 2);

        let state = h.manager.get_state(&id).await.unwrap();
        assert_eq!(state.metrics.age, Some(45.0));
        assert_eq!(state.metrics.glucose, None);
        assert_eq!(state.phase, Phase::Collecting);
    }

    #[tokio::test]
    async fn test_done_conversation_is_not_regated() {
        let h = harness();
        let id = gated_session(&h).await;
        h.manager.resume(&id).await.unwrap();

        let outcome = h.manager.advance(&id, "thank you!").await.unwrap();
        assert!(!outcome.gated);
        assert_eq!(outcome.phase, Phase::Done);

        // Changing a metric invalidates the result and gates again
        let outcome = h.manager.advance(&id, "my glucose is actually 150").await.unwrap();
        assert!(outcome.gated);
        let state = h.manager.get_state(&id).await.unwrap();
        assert!(state.prediction.is_none());
        assert!(state.advice.is_none());
    }

    #[tokio::test]
    async fn test_first_message_creates_session() {
        let h = harness();
        let outcome = h.manager.advance("new-id", "hello").await.unwrap();
        assert_eq!(outcome.phase, Phase::Collecting);

        let state = h.manager.get_state("new-id").await.unwrap();
        assert_eq!(state.history[0], Turn::assistant(GREETING));
        assert_eq!(state.history[1], Turn::user("hello"));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let h = harness();
        assert!(matches!(
            h.manager.advance("s", "   ").await,
            Err(ExecutorError::EmptyInput)
        ));
        assert!(h.storage.snapshot("s").is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let h = harness();
        let (id, _) = h.manager.create_session().await.unwrap();
        h.storage.set_fail_saves(true);
        assert!(matches!(
            h.manager.advance(&id, "I'm 45").await,
            Err(ExecutorError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_discard() {
        let h = harness();
        let (id, _) = h.manager.create_session().await.unwrap();
        assert!(h.manager.discard(&id).await.unwrap());
        assert!(!h.manager.discard(&id).await.unwrap());
        assert!(matches!(
            h.manager.get_state(&id).await,
            Err(ExecutorError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_same_session_calls_do_not_interleave() {
        let h = Arc::new(harness_with(
            MockExtractor::new().with_delay(Duration::from_millis(20)),
            MockClassifier::returning(RiskLabel::HighRisk, 0.78),
            MockRetriever::returning("tips"),
        ));
        let (id, _) = h.manager.create_session().await.unwrap();

        let messages = ["I'm 45", "glucose 130", "BMI 29", "insulin 80"];
        let tasks: Vec<_> = messages
            .iter()
            .map(|text| {
                let h = Arc::clone(&h);
                let id = id.clone();
                let text = (*text).to_string();
                tokio::spawn(async move { h.manager.advance(&id, &text).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Greeting plus a user/assistant pair per call, never interleaved
        let state = h.manager.get_state(&id).await.unwrap();
        assert_eq!(state.history.len(), 1 + messages.len() * 2);
        for pair in state.history[1..].chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
        assert!(state.metrics.has_required());
        assert_eq!(h.extractor.recorded_calls().len(), messages.len());
    }

    #[tokio::test]
    async fn test_distinct_sessions_run_concurrently() {
        let h = Arc::new(harness_with(
            MockExtractor::new().with_delay(Duration::from_millis(200)),
            MockClassifier::returning(RiskLabel::HighRisk, 0.78),
            MockRetriever::returning("tips"),
        ));

        let start = std::time::Instant::now();
        let ids: Vec<String> = (0..4).map(|i| format!("s-{i}")).collect();
        let results =
            futures::future::join_all(ids.iter().map(|id| h.manager.advance(id, "I'm 45"))).await;
        for result in results {
            result.unwrap();
        }
        // Serialized execution would need at least 800ms
        assert!(start.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_lock_table_does_not_grow_with_lookups() {
        let h = harness();
        let (id, _) = h.manager.create_session().await.unwrap();

        for i in 0..50 {
            let ghost = format!("ghost-{i}");
            assert!(matches!(
                h.manager.get_state(&ghost).await,
                Err(ExecutorError::SessionNotFound(_))
            ));
            assert!(matches!(
                h.manager.resume(&ghost).await,
                Err(ExecutorError::SessionNotFound(_))
            ));
        }
        h.manager.advance(&id, "I'm 45").await.unwrap();
        h.manager.get_state(&id).await.unwrap();
        assert!(matches!(
            h.manager.advance(&id, "  ").await,
            Err(ExecutorError::EmptyInput)
        ));

        assert_eq!(h.manager.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_session_locks_prune() {
        let locks = crate::runtime::SessionLocks::new();
        let guard = locks.acquire("a").await;
        locks.prune("a");
        assert_eq!(locks.len(), 1);
        drop(guard);
        locks.prune("a");
        assert_eq!(locks.len(), 0);
    }
}
