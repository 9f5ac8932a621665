//! Diagnosis of failed executions via a second model round-trip.

use tracing::{info, instrument, warn};

use crate::core::types::{AnalysisReport, Artifact, ArtifactRequest, ExecutionResult};
use crate::io::model::{ChunkSink, ModelClient};
use crate::io::prompt::PromptComposer;

/// Ask the model why `result` failed.
///
/// Returns `None` for successful runs: analysis only exists for non-zero
/// exits. Any failure on the way (prompt rendering, transport) degrades to
/// [`AnalysisReport::Unavailable`], since the execution outcome is already
/// known and must still be reported.
#[instrument(skip_all, fields(exit_code = result.exit_code()))]
pub fn analyze_failure<M: ModelClient>(
    client: &M,
    composer: &PromptComposer,
    request: &ArtifactRequest,
    artifact: &Artifact,
    result: &ExecutionResult,
    on_chunk: ChunkSink<'_>,
) -> Option<AnalysisReport> {
    if result.success() {
        return None;
    }

    let prompt = match composer.analysis(request, artifact, result) {
        Ok(prompt) => prompt,
        Err(err) => {
            let reason = format!("{err:#}");
            warn!(err = %reason, "could not compose analysis prompt");
            return Some(AnalysisReport::Unavailable(reason));
        }
    };

    info!("requesting failure analysis");
    match client.complete(&request.model, &prompt, on_chunk) {
        Ok(completion) => Some(AnalysisReport::Available(completion.into_string())),
        Err(err) => {
            warn!(err = %err, "analysis unavailable");
            Some(AnalysisReport::Unavailable(err.to_string()))
        }
    }
}
