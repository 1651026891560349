use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use autodoc_core::{
    CodeSnippet, Field, FieldValue, KnowledgeResults, LocalizedText, SymbolType, WorkflowState,
};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{StageSettings, enter, note, skip};
use crate::agent::batch::run_batched;
use crate::agent::envelope::Stage;
use crate::collab::completion::{CompletionClient, CompletionRequest};
use crate::collab::index::{IndexPoint, SearchHit, SimilarityIndex};
use crate::graph::stage::StageId;

const POINT_NS: Uuid = Uuid::from_bytes([
    0xa7, 0x0d, 0x0c, 0x00, 0x00, 0x00, 0x50, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
]);

const OVERVIEW_QUERY: &str = "overall architecture, main components and how they interact";
const SEARCH_LIMIT: usize = 8;
const SYSTEM: &str = "You are a software architect explaining codebases to new contributors.";

/// Deterministic index point id for a snippet.
pub fn point_id(snippet_id: &str) -> String {
    Uuid::new_v5(&POINT_NS, snippet_id.as_bytes()).to_string()
}

/// `autodoc_{key}` where key is a short hash of the repository identifier.
pub fn collection_name(repo_identifier: &str) -> String {
    format!("autodoc_{}", autodoc_store::repo_key(repo_identifier, 12))
}

/// Text embedded for a snippet.
fn embedding_text(snippet: &CodeSnippet) -> String {
    let mut text = format!(
        "File: {}\nType: {}\nName: {}\n",
        snippet.file_path,
        snippet.symbol_type,
        snippet.display_name()
    );
    if let Some(doc) = &snippet.original_docstring {
        text.push_str(&format!("Documentation: {doc}\n"));
    }
    if let Some(summary) = &snippet.ai_summary_en {
        text.push_str(&format!("Summary: {summary}\n"));
    }
    let code: String = snippet.text_content.chars().take(2000).collect();
    text.push_str(&format!("Code:\n{code}\n"));
    text
}

/// Embeds snippets into the similarity index and derives the
/// architectural overview and per-module explanations.
pub struct KnowledgeStage {
    completion: Arc<dyn CompletionClient>,
    index: Arc<dyn SimilarityIndex>,
    settings: Arc<StageSettings>,
}

impl KnowledgeStage {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        index: Arc<dyn SimilarityIndex>,
        settings: Arc<StageSettings>,
    ) -> Self {
        Self {
            completion,
            index,
            settings,
        }
    }

    async fn embed_all(&self, snippets: &[CodeSnippet]) -> (Vec<IndexPoint>, Vec<String>) {
        let completion = self.completion.clone();
        let model = self.settings.embedding_model.clone();
        let results = run_batched(snippets.to_vec(), self.settings.summary_batch_size, |snippet| {
            let completion = completion.clone();
            let model = model.clone();
            async move {
                let vector = completion.embed(&model, &embedding_text(&snippet)).await;
                (snippet, vector)
            }
        })
        .await;

        let mut points = Vec::new();
        let mut failures = Vec::new();
        for (snippet, vector) in results {
            match vector {
                Ok(vector) => points.push(IndexPoint {
                    id: point_id(&snippet.id),
                    vector,
                    payload: json!({
                        "snippet_id": snippet.id,
                        "file_path": snippet.file_path,
                        "symbol_type": snippet.symbol_type,
                        "symbol_name": snippet.symbol_name,
                        "language": snippet.language,
                    }),
                }),
                Err(e) => {
                    warn!(snippet = %snippet.id, error = %e, "embedding failed");
                    failures.push(format!("{}: {e}", snippet.id));
                }
            }
        }
        (points, failures)
    }

    async fn overview(
        &self,
        state: &WorkflowState,
        collection: &str,
        hits: &[SearchHit],
    ) -> Option<String> {
        let repo = state.repository_metadata.as_ref();
        let by_id: BTreeMap<&str, &CodeSnippet> =
            state.snippets().iter().map(|s| (s.id.as_str(), s)).collect();
        let mut context = String::new();
        for hit in hits {
            let Some(snippet) = hit.payload["snippet_id"].as_str().and_then(|id| by_id.get(id)) else {
                continue;
            };
            context.push_str(&format!(
                "- {} `{}` in {}: {}\n",
                snippet.symbol_type,
                snippet.display_name(),
                snippet.file_path,
                snippet
                    .ai_summary_en
                    .as_deref()
                    .or(snippet.original_docstring.as_deref())
                    .unwrap_or("(no summary)")
            ));
        }
        let prompt = format!(
            "Write an architectural overview of the repository {name}{desc}.\n\
             Cover its purpose, main components and how they interact.\n\n\
             Most relevant components:\n{context}",
            name = repo.map(|r| r.name.as_str()).unwrap_or(&state.repo_identifier),
            desc = repo
                .and_then(|r| r.description.as_deref())
                .map(|d| format!(" ({d})"))
                .unwrap_or_default(),
        );
        let request = CompletionRequest::new(&self.settings.rag_model, prompt)
            .system(SYSTEM)
            .max_tokens(2048);
        match self.completion.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!(collection, error = %e, "architectural overview failed");
                None
            }
        }
    }

    async fn module_explanations(&self, state: &WorkflowState) -> BTreeMap<String, LocalizedText> {
        let modules: Vec<CodeSnippet> = state
            .snippets()
            .iter()
            .filter(|s| s.symbol_type == SymbolType::Module)
            .cloned()
            .collect();
        let completion = self.completion.clone();
        let model = self.settings.rag_model.clone();
        let results = run_batched(modules, self.settings.summary_batch_size, |snippet| {
            let completion = completion.clone();
            let model = model.clone();
            async move {
                if let Some(en) = &snippet.ai_summary_en {
                    let mut text = LocalizedText::from([("en".to_string(), en.clone())]);
                    if let Some(vi) = &snippet.ai_summary_vi {
                        text.insert("vi".to_string(), vi.clone());
                    }
                    return (snippet.file_path, Some(text));
                }
                let code: String = snippet.text_content.chars().take(4000).collect();
                let prompt = format!(
                    "Explain what the module {} is responsible for and how it is used.\n\n```{}\n{code}\n```",
                    snippet.file_path, snippet.language
                );
                let request = CompletionRequest::new(&model, prompt).system(SYSTEM);
                let text = match completion.complete(&request).await {
                    Ok(t) if !t.trim().is_empty() => {
                        Some(LocalizedText::from([("en".to_string(), t.trim().to_string())]))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!(module = %snippet.file_path, error = %e, "module explanation failed");
                        None
                    }
                };
                (snippet.file_path, text)
            }
        })
        .await;
        results
            .into_iter()
            .filter_map(|(path, text)| text.map(|t| (path, t)))
            .collect()
    }
}

#[async_trait::async_trait]
impl Stage for KnowledgeStage {
    fn id(&self) -> StageId {
        StageId::KnowledgeIndexer
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let id = self.id();
        enter(state, id)?;

        let snippets = state.snippets().to_vec();
        if snippets.is_empty() {
            skip(state, id, "No code snippets to index");
            return Ok(());
        }

        let collection = collection_name(&state.repo_identifier);
        let (points, failures) = self.embed_all(&snippets).await;
        for failure in &failures {
            state.push_message(
                id.agent_name(),
                autodoc_core::MessageType::Warning,
                format!("Could not embed {failure}"),
            );
        }
        let Some(dimension) = points.first().map(|p| p.vector.len()) else {
            anyhow::bail!("no snippet could be embedded");
        };

        self.index
            .ensure_collection(&collection, dimension)
            .await
            .with_context(|| format!("preparing collection {collection}"))?;
        let indexed = points.len();
        self.index
            .upsert(&collection, points)
            .await
            .with_context(|| format!("indexing into {collection}"))?;
        note(state, id, format!("Indexed {indexed} snippets into {collection}"));

        let query = self
            .completion
            .embed(&self.settings.embedding_model, OVERVIEW_QUERY)
            .await
            .context("embedding architecture query")?;
        let hits = self
            .index
            .search(&collection, &query, SEARCH_LIMIT)
            .await
            .with_context(|| format!("searching {collection}"))?;

        let mut results = KnowledgeResults {
            collection_name: Some(collection.clone()),
            ..KnowledgeResults::default()
        };
        match self.overview(state, &collection, &hits).await {
            Some(text) => {
                results.architectural_overview.insert("en".to_string(), text.trim().to_string());
            }
            None => skip(state, id, "Architectural overview could not be generated"),
        }
        results.module_explanations = self.module_explanations(state).await;

        info!(
            collection = %collection,
            indexed,
            modules = results.module_explanations.len(),
            "knowledge indexing finished"
        );
        state.set_field(Field::KnowledgeResults, FieldValue::Knowledge(results))?;
        Ok(())
    }
}
