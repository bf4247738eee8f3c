use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use strum::{Display, EnumString};

use crate::analysis::AnalysisFailure;
use crate::completion::{CompletionClient, CompletionRequest, ResponseSchema};
use crate::vocabulary::ObjectionTaxonomy;

pub const SCHEMA_NAME: &str = "objections_analysis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Objection {
    pub objection_type: String,
    pub client_quote: String,
    pub manager_handled: bool,
    pub manager_actions: Vec<String>,
}

/// What to do with an objection whose type is not part of the taxonomy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnknownObjectionPolicy {
    #[default]
    Drop,
    Keep,
    Reject,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectionsReply {
    objections: Vec<Objection>,
}

pub struct ObjectionAnalyzer {
    client: Arc<dyn CompletionClient>,
    taxonomy: ObjectionTaxonomy,
    temperature: f32,
    unknown_policy: UnknownObjectionPolicy,
}

impl ObjectionAnalyzer {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        taxonomy: ObjectionTaxonomy,
        temperature: f32,
        unknown_policy: UnknownObjectionPolicy,
    ) -> Self {
        Self {
            client,
            taxonomy,
            temperature,
            unknown_policy,
        }
    }

    /// Every objection the client raised, in the order the model lists them.
    /// Repeated objections of one type stay separate entries.
    pub async fn analyze(&self, transcript: &str) -> Result<Vec<Objection>, AnalysisFailure> {
        if transcript.trim().is_empty() {
            return Ok(Vec::new());
        }

        let reply = self.client.complete(self.request(transcript)).await?;
        let reply: ObjectionsReply = serde_json::from_value(reply)
            .map_err(|error| AnalysisFailure::SchemaMismatch(error.to_string()))?;

        self.validate(reply.objections)
    }

    fn request(&self, transcript: &str) -> CompletionRequest {
        let types = self
            .taxonomy
            .types()
            .iter()
            .enumerate()
            .map(|(index, kind)| {
                format!(
                    "{}. \"{}\" - {}",
                    index + 1,
                    kind.name,
                    kind.triggers.iter().join(", ")
                )
            })
            .join("\n");

        let system_prompt = format!(
            r#"Ты - эксперт по анализу техник работы с возражениями в B2B продажах.

Типы возражений:
{types}

Для каждого возражения определи:
- Тип возражения (в точности одно из названий выше)
- Краткую цитату клиента
- Отработал ли менеджер (true/false)
- Конкретные действия менеджера (2-3 пункта)

Если клиент высказал несколько возражений одного типа, укажи каждое отдельно.
Если возражений не было, верни пустой список.

Хорошая отработка включает:
- Уточнение деталей
- Объяснение ценности
- Предложение альтернатив/компромиссов
- Установка следующего шага (next step)"#
        );

        let user_prompt = format!(
            r#"Проанализируй диалог и найди все возражения клиента:

{transcript}

Для каждого возражения укажи тип, цитату клиента, факт отработки и действия менеджера."#
        );

        CompletionRequest {
            system_prompt,
            user_prompt,
            schema: schema(),
            temperature: self.temperature,
        }
    }

    fn validate(&self, objections: Vec<Objection>) -> Result<Vec<Objection>, AnalysisFailure> {
        let mut accepted = Vec::with_capacity(objections.len());

        for objection in objections {
            if self.taxonomy.contains(&objection.objection_type) {
                accepted.push(objection);
                continue;
            }

            match self.unknown_policy {
                UnknownObjectionPolicy::Drop => {
                    tracing::warn!(
                        objection_type = %objection.objection_type,
                        "Dropping objection of unknown type"
                    );
                }
                UnknownObjectionPolicy::Keep => accepted.push(objection),
                UnknownObjectionPolicy::Reject => {
                    return Err(AnalysisFailure::SchemaMismatch(format!(
                        "unknown objection type `{}`",
                        objection.objection_type
                    )));
                }
            }
        }

        Ok(accepted)
    }
}

fn schema() -> ResponseSchema {
    ResponseSchema {
        name: SCHEMA_NAME,
        schema: json!({
            "type": "object",
            "properties": {
                "objections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "objection_type": {
                                "type": "string",
                                "description": "Тип возражения"
                            },
                            "client_quote": {
                                "type": "string",
                                "description": "Краткая цитата клиента"
                            },
                            "manager_handled": {
                                "type": "boolean",
                                "description": "Отработал ли менеджер возражение"
                            },
                            "manager_actions": {
                                "type": "array",
                                "items": {"type": "string"},
                                "description": "Список действий менеджера"
                            }
                        },
                        "required": ["objection_type", "client_quote", "manager_handled", "manager_actions"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["objections"],
            "additionalProperties": false
        }),
    }
}
