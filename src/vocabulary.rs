use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub description: String,
}

/// Topics a sales conversation is expected to cover, in reporting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checklist(Vec<Topic>);

impl Checklist {
    pub fn topics(&self) -> &[Topic] {
        &self.0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|topic| topic.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|known| known == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Topic names listed more than once.
    pub fn duplicate_names(&self) -> Vec<&str> {
        self.names().duplicates().collect()
    }
}

impl Default for Checklist {
    fn default() -> Self {
        Self(
            [
                (
                    "Цели и KPI/метрики успеха",
                    "целевые KPI (CPA/ROMI/лиды), критерии успеха",
                ),
                (
                    "Текущие источники трафика",
                    "где рекламируются сейчас, с кем работали",
                ),
                (
                    "Бюджет",
                    "планируемый бюджет, модель оплаты, минимальные депозиты",
                ),
                ("URL/артефакты", "ссылки на лендинги, креативы, материалы"),
                (
                    "Ожидания от партнёра",
                    "что важно клиенту, какие условия критичны",
                ),
            ]
            .into_iter()
            .map(|(name, description)| Topic {
                name: name.to_owned(),
                description: description.to_owned(),
            })
            .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionType {
    pub name: String,
    pub triggers: Vec<String>,
}

/// Known objection types with the phrases that typically signal them. The
/// phrases only steer the prompt; classification is left to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectionTaxonomy(Vec<ObjectionType>);

impl ObjectionTaxonomy {
    pub fn types(&self) -> &[ObjectionType] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|kind| kind.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn duplicate_names(&self) -> Vec<&str> {
        self.0.iter().map(|kind| kind.name.as_str()).duplicates().collect()
    }
}

impl Default for ObjectionTaxonomy {
    fn default() -> Self {
        let kind = |name: &str, triggers: &[&str]| ObjectionType {
            name: name.to_owned(),
            triggers: triggers.iter().map(|&t| t.to_owned()).collect(),
        };

        Self(vec![
            kind(
                "Финансовые ограничения",
                &[
                    "дорого",
                    "нет бюджета",
                    "высокая комиссия",
                    "дорогой",
                    "дорогая",
                ],
            ),
            kind(
                "Невыгодные условия сотрудничества",
                &[
                    "не устраивают условия",
                    "высокий минимальный депозит",
                    "хотим другую модель",
                ],
            ),
            kind(
                "Потеря в пользу конкурента",
                &[
                    "нашли другое агентство",
                    "у конкурента выгоднее",
                    "более выгодные условия",
                ],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_checklist_has_five_topics_in_order() {
        let checklist = Checklist::default();
        let names: Vec<_> = checklist.names().collect();
        assert_eq!(names.len(), 5);
        assert_eq!(names[2], "Бюджет");
        assert!(checklist.contains("URL/артефакты"));
        assert!(!checklist.contains("Погода"));
        assert!(checklist.duplicate_names().is_empty());
    }

    #[test]
    fn default_taxonomy_knows_three_types() {
        let taxonomy = ObjectionTaxonomy::default();
        assert_eq!(taxonomy.types().len(), 3);
        assert!(taxonomy.contains("Потеря в пользу конкурента"));
        assert!(!taxonomy.contains("Сезонность"));
        assert!(taxonomy.duplicate_names().is_empty());
    }
}
