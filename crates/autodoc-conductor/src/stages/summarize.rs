use std::collections::BTreeMap;
use std::sync::Arc;

use autodoc_core::{
    CodeSnippet, Field, FieldValue, LocalizedText, MessageType, OutputLanguage, WorkflowState,
};
use tracing::{info, warn};

use super::{StageSettings, enter, note, skip};
use crate::agent::batch::run_batched;
use crate::agent::envelope::Stage;
use crate::collab::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::graph::stage::StageId;

const SYSTEM: &str = "You are a technical documentation expert. Summarize code clearly and concisely.";
const EN_HEADER: &str = "## SUMMARY_EN";
const VI_HEADER: &str = "## SUMMARY_VI";

/// Writes an AI summary for every snippet.
pub struct SummarizeStage {
    completion: Arc<dyn CompletionClient>,
    settings: Arc<StageSettings>,
}

impl SummarizeStage {
    pub fn new(completion: Arc<dyn CompletionClient>, settings: Arc<StageSettings>) -> Self {
        Self {
            completion,
            settings,
        }
    }
}

fn prompt(snippet: &CodeSnippet, with_vi: bool) -> String {
    let mut p = format!(
        "Analyze the following {lang} {kind} and summarize its purpose and behaviour in 2-3 sentences, \
         then note key parameters or dependencies.\n\n\
         ```{lang}\n{code}\n```\n\nExisting docstring:\n{doc}\n\n\
         Format your response as:\n\n{EN_HEADER}\n[English summary]\n",
        lang = snippet.language,
        kind = snippet.symbol_type,
        code = snippet.text_content,
        doc = snippet.original_docstring.as_deref().unwrap_or("None"),
    );
    if with_vi {
        p.push_str(&format!("\n{VI_HEADER}\n[Vietnamese summary with correct technical terminology]\n"));
    }
    p
}

/// Split a response into `en` / `vi` parts. A response without the
/// expected headers is taken as the English summary.
pub fn parse_summary(response: &str) -> LocalizedText {
    let mut out = LocalizedText::new();
    let en = match response.split_once(EN_HEADER) {
        Some((_, rest)) => rest.split(VI_HEADER).next().unwrap_or("").trim(),
        None if !response.contains(VI_HEADER) => response.trim(),
        None => response.split(VI_HEADER).next().unwrap_or("").trim(),
    };
    if !en.is_empty() {
        out.insert("en".to_string(), en.to_string());
    }
    if let Some((_, vi)) = response.split_once(VI_HEADER) {
        let vi = vi.trim();
        if !vi.is_empty() {
            out.insert("vi".to_string(), vi.to_string());
        }
    }
    out
}

async fn summarize_one(
    completion: &dyn CompletionClient,
    model: &str,
    snippet: &CodeSnippet,
    with_vi: bool,
) -> Result<LocalizedText, CompletionError> {
    if let Some(en) = &snippet.ai_summary_en {
        let mut existing = LocalizedText::from([("en".to_string(), en.clone())]);
        if let Some(vi) = &snippet.ai_summary_vi {
            existing.insert("vi".to_string(), vi.clone());
        }
        return Ok(existing);
    }
    let request = CompletionRequest::new(model, prompt(snippet, with_vi)).system(SYSTEM);
    let response = completion.complete(&request).await?;
    Ok(parse_summary(&response))
}

#[async_trait::async_trait]
impl Stage for SummarizeStage {
    fn id(&self) -> StageId {
        StageId::Summarizer
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let id = self.id();
        enter(state, id)?;

        let snippets = state.snippets().to_vec();
        if snippets.is_empty() {
            skip(state, id, "No code snippets to summarize");
            return Ok(());
        }
        let total = snippets.len();
        let with_vi = self.settings.wants(OutputLanguage::Vi);
        note(state, id, format!("Summarizing {total} code snippets"));

        let completion = self.completion.clone();
        let model = self.settings.summarizer_model.clone();
        let results = run_batched(snippets, self.settings.summary_batch_size, |snippet| {
            let completion = completion.clone();
            let model = model.clone();
            async move {
                let result = summarize_one(completion.as_ref(), &model, &snippet, with_vi).await;
                (snippet.id, result)
            }
        })
        .await;

        let mut summaries: BTreeMap<String, LocalizedText> = BTreeMap::new();
        for (snippet_id, result) in results {
            match result {
                Ok(text) if text.contains_key("en") => {
                    summaries.insert(snippet_id, text);
                }
                Ok(_) => {
                    warn!(snippet = %snippet_id, "empty summary response");
                    state.push_message(
                        id.agent_name(),
                        MessageType::Warning,
                        format!("Empty summary for {snippet_id}"),
                    );
                }
                Err(e) => {
                    warn!(snippet = %snippet_id, error = %e, "summarization failed");
                    state.push_message(
                        id.agent_name(),
                        MessageType::Warning,
                        format!("Could not summarize {snippet_id}: {e}"),
                    );
                }
            }
        }

        if let Some(list) = state.snippets_mut() {
            for snippet in list.iter_mut() {
                if let Some(text) = summaries.get(&snippet.id) {
                    snippet.ai_summary_en = text.get("en").cloned();
                    if let Some(vi) = text.get("vi") {
                        snippet.ai_summary_vi = Some(vi.clone());
                    }
                }
            }
        }

        info!(summarized = summaries.len(), total, "summarization finished");
        note(state, id, format!("Summarized {} of {total} snippets", summaries.len()));
        state.set_field(Field::Summaries, FieldValue::Summaries(summaries))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::envelope::execute;
    use crate::collab::mock::MockCompletion;
    use crate::stages::fixtures;

    fn settings(languages: Vec<OutputLanguage>, batch: usize) -> Arc<StageSettings> {
        Arc::new(StageSettings {
            languages,
            summary_batch_size: batch,
            ..StageSettings::default()
        })
    }

    #[test]
    fn parses_both_sections() {
        let parsed = parse_summary("## SUMMARY_EN\nRuns things.\n\n## SUMMARY_VI\nChạy mọi thứ.");
        assert_eq!(parsed["en"], "Runs things.");
        assert_eq!(parsed["vi"], "Chạy mọi thứ.");
    }

    #[test]
    fn unformatted_response_is_english() {
        let parsed = parse_summary("  Just a plain summary. ");
        assert_eq!(parsed["en"], "Just a plain summary.");
        assert!(!parsed.contains_key("vi"));
    }

    #[test]
    fn prompt_asks_for_vi_only_when_requested() {
        let s = fixtures::snippet(autodoc_core::SymbolType::Function, "a.py", Some("f"), None);
        assert!(prompt(&s, true).contains(VI_HEADER));
        assert!(!prompt(&s, false).contains(VI_HEADER));
    }

    #[tokio::test]
    async fn summarizes_and_enriches_snippets() {
        let dir = tempfile::tempdir().unwrap();
        let completion = Arc::new(MockCompletion::new("## SUMMARY_EN\nDoes work.\n## SUMMARY_VI\nLàm việc."));
        let stage = SummarizeStage::new(
            completion.clone(),
            settings(vec![OutputLanguage::En, OutputLanguage::Vi], 1),
        );
        let mut state = fixtures::analyzed(dir.path());

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        let summaries = state.summaries.as_ref().unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(state
            .snippets()
            .iter()
            .all(|s| s.ai_summary_en.as_deref() == Some("Does work.")
                && s.ai_summary_vi.as_deref() == Some("Làm việc.")));
        assert_eq!(completion.call_count(), 2);
    }

    #[tokio::test]
    async fn existing_summary_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let completion = Arc::new(MockCompletion::new("## SUMMARY_EN\nFresh."));
        let stage = SummarizeStage::new(completion.clone(), settings(vec![OutputLanguage::En], 5));
        let mut state = fixtures::analyzed(dir.path());
        state.snippets_mut().unwrap()[0].ai_summary_en = Some("Cached.".into());

        execute(&stage, &mut state).await.unwrap();
        assert_eq!(completion.call_count(), 1);
        assert_eq!(state.snippets()[0].ai_summary_en.as_deref(), Some("Cached."));
        assert_eq!(state.snippets()[1].ai_summary_en.as_deref(), Some("Fresh."));
    }

    #[tokio::test]
    async fn per_snippet_failures_are_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let completion = Arc::new(MockCompletion::failing(CompletionError::RateLimited));
        let stage = SummarizeStage::new(completion, settings(vec![OutputLanguage::En], 5));
        let mut state = fixtures::analyzed(dir.path());

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        assert_eq!(report.warnings, 2);
        assert!(state.errors.is_empty());
        assert_eq!(state.summaries.as_ref().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn no_snippets_is_a_warning() {
        let stage = SummarizeStage::new(Arc::new(MockCompletion::default()), settings(vec![], 5));
        let mut state = WorkflowState::new("r", "/tmp/out");
        state.code_snippets = Some(vec![]);

        let report = execute(&stage, &mut state).await.unwrap();
        assert_eq!(report.warnings, 1);
        assert!(state.summaries.is_none());
    }
}
