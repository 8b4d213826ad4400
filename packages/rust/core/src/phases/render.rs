//! Render: hand the consolidated artifact to the external renderer.

use std::path::PathBuf;

use async_trait::async_trait;
use docweave_shared::{DocweaveError, PhaseKind, Result, Severity, SourceDocument};
use tracing::{info, instrument};

use super::{ARTIFACT_NAME, DocumentOutput, FinishOutput, Phase, PhaseContext};

#[derive(Debug, Default)]
pub struct RenderPhase;

#[async_trait]
impl Phase for RenderPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Render
    }

    fn expected_outputs(&self, _ctx: &PhaseContext, _doc: &SourceDocument) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Nothing is rendered per document; only check the section exists.
    async fn process_document(
        &self,
        ctx: &PhaseContext,
        doc: &SourceDocument,
    ) -> Result<DocumentOutput> {
        let section = ctx.input_dir(PhaseKind::Render).join(doc.id.output_path());
        if !section.is_file() {
            return Err(DocweaveError::validation(format!(
                "no consolidated section for {}",
                doc.id
            )));
        }
        Ok(DocumentOutput::default())
    }

    #[instrument(skip_all)]
    async fn finish(&self, ctx: &PhaseContext, _succeeded: &[SourceDocument]) -> Result<FinishOutput> {
        let Some(renderer) = ctx.renderer.as_ref() else {
            info!("no renderer configured, skipping render");
            return Ok(FinishOutput::default());
        };

        let input = ctx.input_dir(PhaseKind::Render).join(ARTIFACT_NAME);
        if !input.is_file() {
            return Err(DocweaveError::processing(
                Severity::Error,
                format!("{} is missing; run the consolidate phase first", input.display()),
            ));
        }
        let output = ctx.phase_dir(PhaseKind::Render).join(renderer.output_name());

        let timeout = ctx.config.converter_timeout;
        match tokio::time::timeout(timeout, renderer.render(&input, &output)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DocweaveError::processing(
                    Severity::Error,
                    format!("renderer {} timed out after {}s", renderer.name(), timeout.as_secs()),
                ));
            }
        }

        info!(renderer = renderer.name(), output = %output.display(), "artifact rendered");
        Ok(FinishOutput {
            outputs: vec![output],
            warnings: Vec::new(),
        })
    }
}
