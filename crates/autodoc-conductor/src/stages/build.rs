use std::path::Path;
use std::sync::Arc;

use autodoc_core::{Field, FieldValue, MessageType, WorkflowState};
use tracing::{error, info};

use super::{enter, note};
use crate::agent::envelope::Stage;
use crate::collab::site::SiteBuilder;
use crate::graph::stage::StageId;

/// Installs and builds the formatted site.
///
/// Build problems are recorded on the state rather than raised: the run
/// simply ends without a `build_location`.
pub struct BuildStage {
    site: Arc<dyn SiteBuilder>,
}

impl BuildStage {
    pub fn new(site: Arc<dyn SiteBuilder>) -> Self {
        Self { site }
    }
}

fn record_failure(state: &mut WorkflowState, id: StageId, message: &str) {
    error!(stage = id.agent_name(), message, "site build failed");
    state.push_message(id.agent_name(), MessageType::Error, message);
    state.push_error(id.agent_name(), message);
}

#[async_trait::async_trait]
impl Stage for BuildStage {
    fn id(&self) -> StageId {
        StageId::SiteBuilder
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let id = self.id();
        enter(state, id)?;

        let Some(docs) = state.docs_location.clone() else {
            record_failure(state, id, "No documentation location available to build");
            return Ok(());
        };
        let docs_dir = Path::new(&docs);

        if !self.site.install(docs_dir).await {
            record_failure(state, id, "Failed to install documentation site dependencies");
            return Ok(());
        }
        note(state, id, "Site dependencies installed");

        match self.site.build(docs_dir).await.filter(|b| !b.is_empty()) {
            Some(build) => {
                info!(build = %build, "documentation site built");
                note(state, id, format!("Documentation built at {build}"));
                state.set_field(Field::BuildLocation, FieldValue::Text(build))?;
            }
            None => record_failure(state, id, "Failed to build documentation site"),
        }
        Ok(())
    }
}
