use std::collections::BTreeMap;
use std::sync::Arc;

use autodoc_core::{
    Field, FieldValue, LocalizedText, MessageType, OutputLanguage, Translations, WorkflowState,
};
use tracing::{debug, info, warn};

use super::{StageSettings, enter, note, skip};
use crate::agent::batch::run_batched;
use crate::agent::envelope::Stage;
use crate::collab::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::graph::stage::StageId;

const SYSTEM: &str = "You are a technical translator. Translate software documentation from English \
                      to Vietnamese, keeping code identifiers and markdown intact.";

/// Fills in Vietnamese text for summaries and knowledge results.
///
/// Only entries without a `vi` value are translated; existing
/// translations are never overwritten.
pub struct TranslateStage {
    completion: Arc<dyn CompletionClient>,
    settings: Arc<StageSettings>,
}

/// One piece of text awaiting translation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    Summary(String),
    Overview,
    Module(String),
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Summary(id) => write!(f, "summary {id}"),
            Slot::Overview => f.write_str("architectural overview"),
            Slot::Module(path) => write!(f, "module explanation {path}"),
        }
    }
}

impl TranslateStage {
    pub fn new(completion: Arc<dyn CompletionClient>, settings: Arc<StageSettings>) -> Self {
        Self {
            completion,
            settings,
        }
    }

    async fn translate_all(&self, pending: Vec<(Slot, String)>) -> Vec<(Slot, Result<String, CompletionError>)> {
        let completion = self.completion.clone();
        let model = self.settings.translation_model.clone();
        run_batched(pending, self.settings.translation_batch_size, |(slot, text)| {
            let completion = completion.clone();
            let model = model.clone();
            async move {
                let prompt = format!(
                    "Translate the following text to Vietnamese. Return only the translation.\n\n{text}"
                );
                let request = CompletionRequest::new(model, prompt).system(SYSTEM).max_tokens(2048);
                let result = completion
                    .complete(&request)
                    .await
                    .map(|t| t.trim().to_string());
                (slot, result)
            }
        })
        .await
    }
}

fn needs_vi(text: &LocalizedText) -> Option<&String> {
    match (text.get("en"), text.get("vi")) {
        (Some(en), None) if !en.trim().is_empty() => Some(en),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Stage for TranslateStage {
    fn id(&self) -> StageId {
        StageId::Translator
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let id = self.id();
        enter(state, id)?;

        if !self.settings.wants(OutputLanguage::Vi) {
            debug!("vietnamese output not requested");
            return Ok(());
        }
        if state.summaries.as_ref().map_or(true, |s| s.is_empty()) && state.knowledge_results.is_none() {
            skip(state, id, "No summaries or knowledge results to translate");
            return Ok(());
        }

        // Start from earlier translations so existing `vi` text wins.
        let previous = state.translations.clone().unwrap_or_default();
        let mut summaries: BTreeMap<String, LocalizedText> = state.summaries.clone().unwrap_or_default();
        for (snippet_id, text) in &mut summaries {
            if let Some(vi) = previous.summaries.get(snippet_id).and_then(|t| t.get("vi")) {
                text.entry("vi".to_string()).or_insert_with(|| vi.clone());
            }
        }
        let mut knowledge = state.knowledge_results.clone();
        if let (Some(k), Some(prev)) = (knowledge.as_mut(), previous.knowledge.as_ref()) {
            if let Some(vi) = prev.architectural_overview.get("vi") {
                k.architectural_overview.entry("vi".to_string()).or_insert_with(|| vi.clone());
            }
            for (path, text) in &mut k.module_explanations {
                if let Some(vi) = prev.module_explanations.get(path).and_then(|t| t.get("vi")) {
                    text.entry("vi".to_string()).or_insert_with(|| vi.clone());
                }
            }
        }

        let mut pending: Vec<(Slot, String)> = summaries
            .iter()
            .filter_map(|(sid, text)| needs_vi(text).map(|en| (Slot::Summary(sid.clone()), en.clone())))
            .collect();
        if let Some(k) = &knowledge {
            if let Some(en) = needs_vi(&k.architectural_overview) {
                pending.push((Slot::Overview, en.clone()));
            }
            for (path, text) in &k.module_explanations {
                if let Some(en) = needs_vi(text) {
                    pending.push((Slot::Module(path.clone()), en.clone()));
                }
            }
        }
        let requested = pending.len();
        note(state, id, format!("Translating {requested} entries to Vietnamese"));

        let mut translated = 0usize;
        for (slot, result) in self.translate_all(pending).await {
            let text = match result {
                Ok(t) if !t.is_empty() => t,
                Ok(_) => continue,
                Err(e) => {
                    warn!(entry = %slot, error = %e, "translation failed");
                    state.push_message(
                        id.agent_name(),
                        MessageType::Warning,
                        format!("Could not translate {slot}: {e}"),
                    );
                    continue;
                }
            };
            let target = match (&slot, knowledge.as_mut()) {
                (Slot::Summary(sid), _) => summaries.get_mut(sid),
                (Slot::Overview, Some(k)) => Some(&mut k.architectural_overview),
                (Slot::Module(path), Some(k)) => k.module_explanations.get_mut(path),
                _ => None,
            };
            if let Some(target) = target {
                target.insert("vi".to_string(), text);
                translated += 1;
            }
        }

        if let Some(list) = state.snippets_mut() {
            for snippet in list.iter_mut().filter(|s| s.ai_summary_vi.is_none()) {
                snippet.ai_summary_vi = summaries.get(&snippet.id).and_then(|t| t.get("vi")).cloned();
            }
        }

        info!(translated, requested, "translation finished");
        note(state, id, format!("Translated {translated} of {requested} entries"));
        state.set_field(Field::Translations, FieldValue::Translations(Translations {
            summaries,
            knowledge,
        }))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::envelope::execute;
    use crate::collab::mock::MockCompletion;
    use crate::stages::fixtures;
    use autodoc_core::KnowledgeResults;

    fn settings(languages: Vec<OutputLanguage>) -> Arc<StageSettings> {
        Arc::new(StageSettings {
            languages,
            translation_batch_size: 2,
            ..StageSettings::default()
        })
    }

    fn summarized(dir: &std::path::Path) -> WorkflowState {
        let mut state = fixtures::analyzed(dir);
        state.summaries = Some(fixtures::summaries_for(&state));
        state.knowledge_results = Some(KnowledgeResults {
            architectural_overview: LocalizedText::from([("en".to_string(), "Layered.".to_string())]),
            module_explanations: BTreeMap::from([(
                "pkg/core.py".to_string(),
                LocalizedText::from([
                    ("en".to_string(), "Core.".to_string()),
                    ("vi".to_string(), "Lõi.".to_string()),
                ]),
            )]),
            collection_name: None,
        });
        state
    }

    #[tokio::test]
    async fn skipped_silently_without_vi() {
        let dir = tempfile::tempdir().unwrap();
        let completion = Arc::new(MockCompletion::default());
        let stage = TranslateStage::new(completion.clone(), settings(vec![OutputLanguage::En]));
        let mut state = summarized(dir.path());

        let report = execute(&stage, &mut state).await.unwrap();
        assert_eq!(report.warnings, 0);
        assert!(state.translations.is_none());
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn fills_only_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let completion = Arc::new(MockCompletion::new("Bản dịch."));
        let stage = TranslateStage::new(completion.clone(), settings(vec![OutputLanguage::En, OutputLanguage::Vi]));
        let mut state = summarized(dir.path());
        state.summaries.as_mut().unwrap().values_mut().next().unwrap().insert("vi".into(), "Có sẵn.".into());

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        // One summary plus the overview; the module explanation already had `vi`.
        assert_eq!(completion.call_count(), 2);

        let translations = state.translations.as_ref().unwrap();
        let vis: Vec<&str> = translations.summaries.values().map(|t| t["vi"].as_str()).collect();
        assert_eq!(vis, vec!["Có sẵn.", "Bản dịch."]);
        let knowledge = translations.knowledge.as_ref().unwrap();
        assert_eq!(knowledge.architectural_overview["vi"], "Bản dịch.");
        assert_eq!(knowledge.module_explanations["pkg/core.py"]["vi"], "Lõi.");
        assert!(state.snippets().iter().all(|s| s.ai_summary_vi.is_some()));
    }

    #[tokio::test]
    async fn previous_translations_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let completion = Arc::new(MockCompletion::new("Mới."));
        let stage = TranslateStage::new(completion.clone(), settings(vec![OutputLanguage::Vi]));
        let mut state = summarized(dir.path());
        let mut previous = state.summaries.clone().unwrap();
        for text in previous.values_mut() {
            text.insert("vi".into(), "Cũ.".into());
        }
        state.translations = Some(Translations {
            summaries: previous,
            knowledge: None,
        });

        execute(&stage, &mut state).await.unwrap();
        let translations = state.translations.as_ref().unwrap();
        assert!(translations.summaries.values().all(|t| t["vi"] == "Cũ."));
        assert_eq!(completion.call_count(), 1);
    }

    #[tokio::test]
    async fn nothing_to_translate_warns() {
        let stage = TranslateStage::new(Arc::new(MockCompletion::default()), settings(vec![OutputLanguage::Vi]));
        let mut state = WorkflowState::new("r", "/tmp/out");

        let report = execute(&stage, &mut state).await.unwrap();
        assert_eq!(report.warnings, 1);
        assert!(state.translations.is_none());
    }
}
