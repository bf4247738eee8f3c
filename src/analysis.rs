use futures_util::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::completion::RemoteCallError;
use crate::dialogue::{Conversation, FormatError, format_transcript};
use crate::objections::{Objection, ObjectionAnalyzer};
use crate::topics::{TopicAnalysis, TopicAnalyzer};

/// Why one analysis of a dialogue produced no usable answer.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisFailure {
    #[error(transparent)]
    Remote(#[from] RemoteCallError),

    #[error("Reply does not match the expected schema: {0}")]
    SchemaMismatch(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Dialogue {dialogue_id} is malformed")]
pub struct MalformedDialogue {
    pub dialogue_id: String,
    #[source]
    pub source: FormatError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub dialogue_id: String,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub info_anchors_found: Vec<String>,
    pub info_anchors_missing: Vec<String>,
    pub objections_found: Vec<Objection>,
}

pub struct DialogueAnalyzer {
    topics: TopicAnalyzer,
    objections: ObjectionAnalyzer,
    call_timeout: Duration,
    max_in_flight: usize,
}

impl DialogueAnalyzer {
    pub fn new(
        topics: TopicAnalyzer,
        objections: ObjectionAnalyzer,
        call_timeout: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            topics,
            objections,
            call_timeout,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Analyzes one dialogue. Failed remote analyses degrade to "no topics
    /// covered" and "no objections"; only a malformed dialogue is an error.
    pub async fn analyze(
        &self,
        conversation: &Conversation,
    ) -> Result<AnalysisResult, MalformedDialogue> {
        let dialogue_id = &conversation.dialogue_id;
        let transcript =
            format_transcript(&conversation.messages).map_err(|source| MalformedDialogue {
                dialogue_id: dialogue_id.clone(),
                source,
            })?;

        let (topics, objections) = tokio::join!(
            self.within_timeout(self.topics.analyze(&transcript)),
            self.within_timeout(self.objections.analyze(&transcript)),
        );

        let topics = topics.unwrap_or_else(|failure| {
            tracing::warn!(%dialogue_id, %failure, "Info anchor analysis failed, assuming none were covered");
            TopicAnalysis::conservative(self.topics.checklist())
        });
        let objections = objections.unwrap_or_else(|failure| {
            tracing::warn!(%dialogue_id, %failure, "Objection analysis failed, reporting none");
            Vec::new()
        });

        Ok(AnalysisResult {
            dialogue_id: dialogue_id.clone(),
            analysis: Analysis {
                info_anchors_found: topics.found,
                info_anchors_missing: topics.missing,
                objections_found: objections,
            },
        })
    }

    /// Analyzes every dialogue, keeping input order, with at most
    /// `max_in_flight` dialogues in progress at a time.
    pub async fn analyze_all(
        &self,
        conversations: &[Conversation],
    ) -> Result<Vec<AnalysisResult>, MalformedDialogue> {
        let total = conversations.len();

        stream::iter(conversations)
            .map(|conversation| self.analyze(conversation))
            .buffered(self.max_in_flight)
            .enumerate()
            .map(|(index, result)| {
                if let Ok(analyzed) = &result {
                    println!(
                        "[{}/{total}] Analyzed dialogue {}",
                        index + 1,
                        analyzed.dialogue_id
                    );
                }
                result
            })
            .try_collect()
            .await
    }

    async fn within_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, AnalysisFailure>>,
    ) -> Result<T, AnalysisFailure> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(RemoteCallError::Timeout(self.call_timeout).into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::fake::FakeCompletionClient;
    use crate::completion::{CompletionClient, CompletionRequest};
    use crate::dialogue::Turn;
    use crate::objections::{self, UnknownObjectionPolicy};
    use crate::topics;
    use crate::vocabulary::{Checklist, ObjectionTaxonomy};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    fn dialogue_analyzer(client: Arc<dyn CompletionClient>, max_in_flight: usize) -> DialogueAnalyzer {
        DialogueAnalyzer::new(
            TopicAnalyzer::new(client.clone(), Checklist::default(), 0.1),
            ObjectionAnalyzer::new(
                client,
                ObjectionTaxonomy::default(),
                0.1,
                UnknownObjectionPolicy::Drop,
            ),
            Duration::from_secs(5),
            max_in_flight,
        )
    }

    fn conversation(id: &str, turns: Vec<Turn>) -> Conversation {
        Conversation {
            dialogue_id: id.to_owned(),
            messages: turns,
        }
    }

    fn budget_conversation(id: &str) -> Conversation {
        conversation(
            id,
            vec![
                Turn::new("Менеджер", "Какой у вас бюджет?"),
                Turn::new("Клиент", "Ограниченный бюджет, максимум 50 тысяч."),
            ],
        )
    }

    fn healthy_client() -> FakeCompletionClient {
        FakeCompletionClient::new()
            .reply(
                topics::SCHEMA_NAME,
                Ok(json!({
                    "found": ["Бюджет"],
                    "missing": [
                        "Цели и KPI/метрики успеха",
                        "Текущие источники трафика",
                        "URL/артефакты",
                        "Ожидания от партнёра"
                    ]
                })),
            )
            .reply(
                objections::SCHEMA_NAME,
                Ok(json!({"objections": [{
                    "objection_type": "Финансовые ограничения",
                    "client_quote": "Ограниченный бюджет",
                    "manager_handled": false,
                    "manager_actions": []
                }]})),
            )
    }

    #[tokio::test]
    async fn combines_both_analyses() {
        let client = Arc::new(healthy_client());
        let analyzer = dialogue_analyzer(client.clone(), 1);

        let result = analyzer.analyze(&budget_conversation("d1")).await.unwrap();

        assert_eq!(result.dialogue_id, "d1");
        assert_eq!(result.analysis.info_anchors_found, ["Бюджет"]);
        assert_eq!(result.analysis.info_anchors_missing.len(), 4);
        assert_eq!(result.analysis.objections_found.len(), 1);
        assert_eq!(client.call_count(), 2);

        assert!(client
            .requests()
            .iter()
            .all(|request| request.user_prompt.contains("Менеджер: Какой у вас бюджет?")));
    }

    #[tokio::test]
    async fn remote_failures_degrade_to_conservative_results() {
        let client = Arc::new(
            FakeCompletionClient::new()
                .reply(topics::SCHEMA_NAME, Err(RemoteCallError::Http("boom".to_owned())))
                .reply(
                    objections::SCHEMA_NAME,
                    Err(RemoteCallError::InvalidJson("truncated".to_owned())),
                ),
        );
        let analyzer = dialogue_analyzer(client, 1);

        let result = analyzer.analyze(&budget_conversation("d1")).await.unwrap();

        assert!(result.analysis.info_anchors_found.is_empty());
        assert_eq!(
            result.analysis.info_anchors_missing,
            Checklist::default().names().collect::<Vec<_>>()
        );
        assert!(result.analysis.objections_found.is_empty());
    }

    #[tokio::test]
    async fn empty_conversation_reports_everything_missing() {
        let client = Arc::new(FakeCompletionClient::new());
        let analyzer = dialogue_analyzer(client.clone(), 1);

        let result = analyzer.analyze(&conversation("empty", vec![])).await.unwrap();

        assert!(result.analysis.info_anchors_found.is_empty());
        assert_eq!(result.analysis.info_anchors_missing.len(), 5);
        assert!(result.analysis.objections_found.is_empty());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn batch_keeps_count_and_order() {
        let analyzer = dialogue_analyzer(Arc::new(healthy_client()), 3);
        let conversations: Vec<_> = (0..7)
            .map(|index| budget_conversation(&format!("dialogue-{index}")))
            .collect();

        let results = analyzer.analyze_all(&conversations).await.unwrap();

        assert_eq!(results.len(), conversations.len());
        for (result, conversation) in results.iter().zip(&conversations) {
            assert_eq!(result.dialogue_id, conversation.dialogue_id);
        }
    }

    #[tokio::test]
    async fn batch_continues_past_failed_analyses() {
        let client = Arc::new(
            FakeCompletionClient::new()
                .reply(topics::SCHEMA_NAME, Err(RemoteCallError::EmptyResponse))
                .reply(topics::SCHEMA_NAME, Ok(json!({"found": ["Бюджет"], "missing": []})))
                .reply(objections::SCHEMA_NAME, Ok(json!({"objections": []}))),
        );
        let analyzer = dialogue_analyzer(client, 1);
        let conversations = vec![budget_conversation("first"), budget_conversation("second")];

        let results = analyzer.analyze_all(&conversations).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].analysis.info_anchors_found.is_empty());
        assert_eq!(results[1].analysis.info_anchors_found, ["Бюджет"]);
    }

    #[tokio::test]
    async fn malformed_dialogue_aborts_the_batch() {
        let analyzer = dialogue_analyzer(Arc::new(healthy_client()), 2);
        let conversations = vec![
            budget_conversation("fine"),
            conversation(
                "broken",
                vec![Turn {
                    sender: None,
                    text: Some("Дорого".to_owned()),
                }],
            ),
        ];

        let error = analyzer.analyze_all(&conversations).await.unwrap_err();

        assert_eq!(error.dialogue_id, "broken");
        assert_eq!(error.source.field, "sender");
    }

    struct StalledClient;

    #[async_trait]
    impl CompletionClient for StalledClient {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<serde_json::Value, RemoteCallError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(RemoteCallError::EmptyResponse)
        }
    }

    #[tokio::test]
    async fn stalled_calls_time_out_and_degrade() {
        let client: Arc<dyn CompletionClient> = Arc::new(StalledClient);
        let analyzer = DialogueAnalyzer::new(
            TopicAnalyzer::new(client.clone(), Checklist::default(), 0.1),
            ObjectionAnalyzer::new(
                client,
                ObjectionTaxonomy::default(),
                0.1,
                UnknownObjectionPolicy::Drop,
            ),
            Duration::from_millis(50),
            1,
        );

        let result = analyzer.analyze(&budget_conversation("slow")).await.unwrap();

        assert!(result.analysis.info_anchors_found.is_empty());
        assert_eq!(result.analysis.info_anchors_missing.len(), 5);
        assert!(result.analysis.objections_found.is_empty());
    }

    #[tokio::test]
    async fn sub_second_timeout_reports_the_exact_duration() {
        let analyzer = dialogue_analyzer(Arc::new(StalledClient), 1);
        let analyzer = DialogueAnalyzer {
            call_timeout: Duration::from_millis(50),
            ..analyzer
        };

        let failure = analyzer
            .within_timeout(analyzer.topics.analyze("Клиент: Дорого"))
            .await
            .unwrap_err();

        assert!(matches!(
            failure,
            AnalysisFailure::Remote(RemoteCallError::Timeout(elapsed)) if elapsed == Duration::from_millis(50)
        ));
        assert_eq!(failure.to_string(), "Request timed out after 50ms");
    }
}
