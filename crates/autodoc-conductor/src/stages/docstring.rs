use std::collections::BTreeMap;
use std::sync::Arc;

use autodoc_core::{
    CodeSnippet, Field, FieldValue, LocalizedText, OutputLanguage, WorkflowState,
};
use tracing::{debug, info, warn};

use super::{StageSettings, enter, note, skip};
use crate::agent::batch::run_batched;
use crate::agent::envelope::Stage;
use crate::collab::completion::{strip_code_fence, CompletionClient, CompletionRequest};
use crate::graph::stage::StageId;

const WRITER: &str = "You are an expert Python documentation writer producing clear Google-style docstrings.";
const TRANSLATOR: &str =
    "You are a technical translator. Translate programming documentation from English to Vietnamese.";

/// Generates docstrings for snippets that have none (or a trivial one).
pub struct DocstringStage {
    completion: Arc<dyn CompletionClient>,
    settings: Arc<StageSettings>,
}

impl DocstringStage {
    pub fn new(completion: Arc<dyn CompletionClient>, settings: Arc<StageSettings>) -> Self {
        Self {
            completion,
            settings,
        }
    }
}

async fn ask(completion: &dyn CompletionClient, request: CompletionRequest, what: &str) -> Option<String> {
    match completion.complete(&request).await {
        Ok(text) => {
            let text = strip_code_fence(&text);
            let text = text.trim_matches('"').trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Err(e) => {
            warn!(target_symbol = what, error = %e, "docstring request failed; using placeholder");
            None
        }
    }
}

async fn enhance_one(
    completion: &dyn CompletionClient,
    model: &str,
    translation_model: &str,
    snippet: &CodeSnippet,
    with_vi: bool,
) -> LocalizedText {
    let name = snippet.display_name().to_string();
    let prompt = format!(
        "Write a docstring for the {kind} `{name}` below. Describe its purpose, parameters, \
         return value and raised exceptions. Return only the docstring text.\n\n```{lang}\n{code}\n```",
        kind = snippet.symbol_type,
        lang = snippet.language,
        code = snippet.text_content,
    );
    let en = ask(completion, CompletionRequest::new(model, prompt).system(WRITER), &name)
        .await
        .unwrap_or_else(|| format!("Docstring for {name}"));

    let mut out = LocalizedText::from([("en".to_string(), en.clone())]);
    if with_vi {
        let prompt = format!(
            "Translate this docstring to Vietnamese, keeping its structure. Return only the translation.\n\n```\n{en}\n```"
        );
        let vi = ask(
            completion,
            CompletionRequest::new(translation_model, prompt).system(TRANSLATOR),
            &name,
        )
        .await
        .unwrap_or_else(|| format!("Docstring cho {name}"));
        out.insert("vi".to_string(), vi);
    }
    out
}

#[async_trait::async_trait]
impl Stage for DocstringStage {
    fn id(&self) -> StageId {
        StageId::DocstringEnhancer
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let id = self.id();
        enter(state, id)?;

        if state.snippets().is_empty() {
            skip(state, id, "No code snippets to enhance");
            return Ok(());
        }
        let targets: Vec<CodeSnippet> = state
            .snippets()
            .iter()
            .filter(|s| s.lacks_docstring() && s.enhanced_docstring.is_none())
            .cloned()
            .collect();
        if targets.is_empty() {
            skip(state, id, "Every snippet already has a docstring");
            state.set_field(Field::EnhancedSnippets, FieldValue::Snippets(Vec::new()))?;
            return Ok(());
        }
        note(state, id, format!("Enhancing docstrings for {} snippets", targets.len()));

        let with_vi = self.settings.wants(OutputLanguage::Vi);
        let completion = self.completion.clone();
        let model = self.settings.summarizer_model.clone();
        let translation_model = self.settings.translation_model.clone();
        let enhanced = run_batched(targets, self.settings.summary_batch_size, |mut snippet| {
            let completion = completion.clone();
            let model = model.clone();
            let translation_model = translation_model.clone();
            async move {
                let doc = enhance_one(completion.as_ref(), &model, &translation_model, &snippet, with_vi).await;
                debug!(snippet = %snippet.id, "docstring generated");
                snippet.enhanced_docstring = Some(doc);
                snippet
            }
        })
        .await;

        let by_id: BTreeMap<String, LocalizedText> = enhanced
            .iter()
            .filter_map(|s| s.enhanced_docstring.clone().map(|d| (s.id.clone(), d)))
            .collect();
        if let Some(list) = state.snippets_mut() {
            for snippet in list.iter_mut() {
                if let Some(doc) = by_id.get(&snippet.id) {
                    snippet.enhanced_docstring = Some(doc.clone());
                }
            }
        }

        info!(enhanced = enhanced.len(), "docstring enhancement finished");
        note(state, id, format!("Enhanced docstrings for {} snippets", enhanced.len()));
        state.set_field(Field::EnhancedSnippets, FieldValue::Snippets(enhanced))?;
        Ok(())
    }
}
