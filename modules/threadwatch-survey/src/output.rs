use std::path::PathBuf;

use threadwatch_common::{HarvestError, MappedResponse, SurveyConfig, Table, TableWriter};
use tracing::info;

/// `<output_dir>/<stem>_<submission epoch>.<ext>`.
pub fn response_path(config: &SurveyConfig, response: &MappedResponse, ext: &str) -> PathBuf {
    config.output_dir.join(format!(
        "{}_{}.{ext}",
        config.file_stem,
        response.timestamp.timestamp()
    ))
}

/// Write one survey run as a single-row table.
pub fn write_response(
    config: &SurveyConfig,
    response: &MappedResponse,
    writer: &dyn TableWriter,
) -> Result<PathBuf, HarvestError> {
    let path = response_path(config, response, writer.extension());
    let persistence = |reason: String| HarvestError::Persistence {
        path: path.clone(),
        reason,
    };
    std::fs::create_dir_all(&config.output_dir).map_err(|e| persistence(e.to_string()))?;
    writer
        .write(&path, &Table::from_records(std::slice::from_ref(response)))
        .map_err(|e| persistence(format!("{e:#}")))?;
    info!(path = %path.display(), "Survey response saved");
    Ok(path)
}
