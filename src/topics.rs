use itertools::Itertools;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use crate::analysis::AnalysisFailure;
use crate::completion::{CompletionClient, CompletionRequest, ResponseSchema};
use crate::vocabulary::Checklist;

pub const SCHEMA_NAME: &str = "info_anchors_analysis";

/// Partition of the checklist into covered and uncovered topics, both in
/// checklist order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAnalysis {
    pub found: Vec<String>,
    pub missing: Vec<String>,
}

impl TopicAnalysis {
    /// Assume nothing was covered.
    pub fn conservative(checklist: &Checklist) -> Self {
        Self {
            found: Vec::new(),
            missing: checklist.names().map(str::to_owned).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TopicReply {
    found: Vec<String>,
    missing: Vec<String>,
}

pub struct TopicAnalyzer {
    client: Arc<dyn CompletionClient>,
    checklist: Checklist,
    temperature: f32,
}

impl TopicAnalyzer {
    pub fn new(client: Arc<dyn CompletionClient>, checklist: Checklist, temperature: f32) -> Self {
        Self {
            client,
            checklist,
            temperature,
        }
    }

    pub fn checklist(&self) -> &Checklist {
        &self.checklist
    }

    pub async fn analyze(&self, transcript: &str) -> Result<TopicAnalysis, AnalysisFailure> {
        if transcript.trim().is_empty() {
            tracing::debug!("Empty transcript, no topics can have been covered");
            return Ok(TopicAnalysis::conservative(&self.checklist));
        }

        let reply = self.client.complete(self.request(transcript)).await?;
        let reply: TopicReply = serde_json::from_value(reply)
            .map_err(|error| AnalysisFailure::SchemaMismatch(error.to_string()))?;

        self.validate(reply)
    }

    fn request(&self, transcript: &str) -> CompletionRequest {
        let topics = self
            .checklist
            .topics()
            .iter()
            .enumerate()
            .map(|(index, topic)| {
                format!("{}. \"{}\" - {}", index + 1, topic.name, topic.description)
            })
            .join("\n");

        let system_prompt = format!(
            r#"Ты - эксперт по анализу продающих диалогов.
Твоя задача - определить, какие важные темы менеджер обсудил с клиентом из следующего списка:

{topics}

Анализируй диалог тщательно и укажи только те темы, которые ДЕЙСТВИТЕЛЬНО обсуждались.
Используй названия тем в точности как в списке. Каждая тема должна попасть ровно в один из списков."#
        );

        let user_prompt = format!(
            r#"Проанализируй следующий диалог и определи, какие темы были обсуждены:

{transcript}

Верни JSON со списками найденных и отсутствующих тем."#
        );

        CompletionRequest {
            system_prompt,
            user_prompt,
            schema: schema(),
            temperature: self.temperature,
        }
    }

    fn validate(&self, reply: TopicReply) -> Result<TopicAnalysis, AnalysisFailure> {
        if let Some(unknown) = reply
            .found
            .iter()
            .chain(&reply.missing)
            .find(|name| !self.checklist.contains(name))
        {
            return Err(AnalysisFailure::SchemaMismatch(format!(
                "unknown topic `{unknown}`"
            )));
        }

        let found: HashSet<&str> = reply.found.iter().map(String::as_str).collect();
        let missing: HashSet<&str> = reply.missing.iter().map(String::as_str).collect();

        if let Some(both) = found.intersection(&missing).next() {
            return Err(AnalysisFailure::SchemaMismatch(format!(
                "topic `{both}` reported as both found and missing"
            )));
        }

        let (found_topics, missing_topics): (Vec<_>, Vec<_>) = self
            .checklist
            .names()
            .partition(|name| found.contains(name));

        let omitted = missing_topics
            .iter()
            .filter(|name| !missing.contains(*name))
            .count();
        if omitted > 0 {
            tracing::debug!(omitted, "Model left topics unclassified, treating them as missing");
        }

        Ok(TopicAnalysis {
            found: found_topics.into_iter().map(str::to_owned).collect(),
            missing: missing_topics.into_iter().map(str::to_owned).collect(),
        })
    }
}

fn schema() -> ResponseSchema {
    ResponseSchema {
        name: SCHEMA_NAME,
        schema: json!({
            "type": "object",
            "properties": {
                "found": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Список тем, которые были обсуждены"
                },
                "missing": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Список тем, которые НЕ были обсуждены"
                }
            },
            "required": ["found", "missing"],
            "additionalProperties": false
        }),
    }
}
