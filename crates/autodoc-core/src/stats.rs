use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::snippet::SymbolType;
use crate::state::WorkflowState;

/// Counts reported alongside a successful run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStats {
    pub files_processed: usize,
    pub modules_documented: usize,
    pub functions_documented: usize,
    pub classes_documented: usize,
    pub methods_documented: usize,
    pub diagrams_generated: usize,
}

impl RunStats {
    pub fn from_state(state: &WorkflowState) -> Self {
        let files: BTreeSet<&str> = state
            .snippets()
            .iter()
            .map(|s| s.file_path.as_str())
            .collect();
        Self {
            files_processed: files.len(),
            modules_documented: state.count_snippets(SymbolType::Module),
            functions_documented: state.count_snippets(SymbolType::Function),
            classes_documented: state.count_snippets(SymbolType::Class),
            methods_documented: state.count_snippets(SymbolType::Method),
            diagrams_generated: state.diagrams.as_ref().map_or(0, |d| d.len()),
        }
    }

    pub fn snippets_total(&self) -> usize {
        self.modules_documented
            + self.functions_documented
            + self.classes_documented
            + self.methods_documented
    }
}
