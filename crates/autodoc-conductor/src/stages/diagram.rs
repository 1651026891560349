use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use autodoc_core::{CodeSnippet, Field, FieldValue, ParsedModule, SymbolType, WorkflowState};
use tracing::{debug, info, warn};

use super::{StageSettings, enter, note, skip};
use crate::agent::envelope::Stage;
use crate::collab::completion::{strip_code_fence, CompletionClient, CompletionRequest};
use crate::graph::stage::StageId;

const STDLIB_PREFIXES: &[&str] = &[
    "os", "sys", "re", "json", "time", "datetime", "math", "random", "collections", "typing",
];
const FLOW_MIN_LINES: usize = 15;
const MAX_FLOW_DIAGRAMS: usize = 5;
const SYSTEM: &str = "You produce valid Mermaid diagrams. Reply with the diagram source only.";

/// Mermaid-safe node id: `[A-Za-z0-9_]`, never starting with a digit.
pub fn sanitize_id(text: &str) -> String {
    let mut id: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if id.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        id.insert(0, 'n');
    }
    id
}

fn is_stdlib(module: &str) -> bool {
    STDLIB_PREFIXES
        .iter()
        .any(|p| module == *p || module.strip_prefix(p).is_some_and(|rest| rest.starts_with('.')))
}

/// Module dependency graph between the repository's own modules.
pub fn module_dependency_diagram(modules: &[ParsedModule]) -> Option<String> {
    if modules.is_empty() {
        return None;
    }
    let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for module in modules {
        let targets = deps.entry(module.short_name().to_string()).or_default();
        for import in &module.imports {
            if import.module.is_empty() || is_stdlib(&import.module) {
                continue;
            }
            let target = import.module.rsplit('.').next().unwrap_or("");
            if !target.is_empty() {
                targets.insert(target.to_string());
            }
        }
    }

    let mut out = String::from("graph TD\n");
    let mut edges = 0;
    for (source, targets) in &deps {
        for target in targets.iter().filter(|t| deps.contains_key(*t) && *t != source) {
            out.push_str(&format!("    {} --> {}\n", sanitize_id(source), sanitize_id(target)));
            edges += 1;
        }
    }
    if edges == 0 {
        for name in deps.keys() {
            out.push_str(&format!("    {}[{name}]\n", sanitize_id(name)));
        }
    }
    Some(out)
}

/// `classDiagram` for one module, if it defines classes.
pub fn class_diagram(module: &ParsedModule) -> Option<String> {
    if module.classes.is_empty() {
        return None;
    }
    let mut out = String::from("classDiagram\n");
    for class in &module.classes {
        let name = sanitize_id(&class.name);
        out.push_str(&format!("    class {name} {{\n"));
        for method in &class.methods {
            out.push_str(&format!("        +{}({})\n", method.name, method.params.join(", ")));
        }
        out.push_str("    }\n");
        for base in &class.base_classes {
            let base = base.rsplit('.').next().unwrap_or(base);
            out.push_str(&format!("    {} <|-- {name}\n", sanitize_id(base)));
        }
    }
    Some(out)
}

/// Generates Mermaid diagrams: module dependencies, class diagrams, flow
/// charts for long functions and an architecture sketch.
pub struct DiagramStage {
    completion: Arc<dyn CompletionClient>,
    settings: Arc<StageSettings>,
}

impl DiagramStage {
    pub fn new(completion: Arc<dyn CompletionClient>, settings: Arc<StageSettings>) -> Self {
        Self {
            completion,
            settings,
        }
    }

    async fn ask(&self, prompt: String, what: &str) -> Option<String> {
        let request = CompletionRequest::new(&self.settings.summarizer_model, prompt)
            .system(SYSTEM)
            .max_tokens(1500);
        match self.completion.complete(&request).await {
            Ok(text) => {
                let diagram = strip_code_fence(&text);
                (!diagram.is_empty()).then_some(diagram)
            }
            Err(e) => {
                warn!(diagram = what, error = %e, "diagram generation failed");
                None
            }
        }
    }

    async fn flow_diagram(&self, snippet: &CodeSnippet) -> Option<String> {
        let prompt = format!(
            "Create a Mermaid `graph TD` flowchart of the control flow of `{}`.\n\n```{}\n{}\n```",
            snippet.display_name(),
            snippet.language,
            snippet.text_content
        );
        self.ask(prompt, snippet.display_name()).await
    }

    async fn architecture_diagram(&self, state: &WorkflowState) -> Option<String> {
        let mut prompt = String::from(
            "Create a Mermaid diagram of the high-level architecture of this codebase, \
             showing its main components and their relationships.\n\n",
        );
        if let Some(overview) = state
            .knowledge_results
            .as_ref()
            .and_then(|k| k.architectural_overview.get("en"))
        {
            prompt.push_str(&format!("Architectural overview:\n{overview}\n\n"));
        }
        let files: BTreeSet<&str> = state.snippets().iter().map(|s| s.file_path.as_str()).collect();
        prompt.push_str("Files:\n");
        for file in files.iter().take(50) {
            prompt.push_str(&format!("- {file}\n"));
        }
        self.ask(prompt, "architecture").await
    }
}

#[async_trait::async_trait]
impl Stage for DiagramStage {
    fn id(&self) -> StageId {
        StageId::DiagramGenerator
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let id = self.id();
        enter(state, id)?;

        let modules = state.modules.clone().unwrap_or_default();
        if state.snippets().is_empty() && modules.is_empty() {
            skip(state, id, "No code to generate diagrams for");
            return Ok(());
        }

        let mut diagrams = BTreeMap::new();
        if let Some(d) = module_dependency_diagram(&modules) {
            diagrams.insert("module_dependencies".to_string(), d);
        }
        for module in &modules {
            if let Some(d) = class_diagram(module) {
                diagrams.insert(format!("class_{}", sanitize_id(module.short_name())), d);
            }
        }

        let long: Vec<CodeSnippet> = state
            .snippets()
            .iter()
            .filter(|s| matches!(s.symbol_type, SymbolType::Function | SymbolType::Method))
            .filter(|s| s.line_count() > FLOW_MIN_LINES)
            .take(MAX_FLOW_DIAGRAMS)
            .cloned()
            .collect();
        for snippet in &long {
            if let Some(d) = self.flow_diagram(snippet).await {
                debug!(snippet = %snippet.id, "flow diagram generated");
                diagrams.insert(format!("flow_{}", sanitize_id(snippet.display_name())), d);
            }
        }

        if !state.snippets().is_empty() {
            if let Some(d) = self.architecture_diagram(state).await {
                diagrams.insert("architecture".to_string(), d);
            }
        }

        info!(count = diagrams.len(), "diagram generation finished");
        note(state, id, format!("Generated {} diagrams", diagrams.len()));
        state.set_field(Field::Diagrams, FieldValue::Diagrams(diagrams))?;
        Ok(())
    }
}
