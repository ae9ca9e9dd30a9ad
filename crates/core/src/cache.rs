use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::Result,
    pipeline::{PipelineContext, PipelineRun, StageResult},
    types::SummarizeRequest,
};

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("tubedigest")
}

/// Get the cache directory for a given video
pub fn get_video_cache_dir(root: &Path, video_id: &str) -> PathBuf {
    root.join(video_id)
}

/// Get the path for a cached stage output
pub fn get_stage_path(cache_dir: &Path, stage: &str) -> PathBuf {
    cache_dir.join(format!("{stage}.json"))
}

/// Stage outputs of earlier runs for one video, stored as JSON files.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_video(video_id: &str) -> Self {
        Self::new(get_video_cache_dir(&get_root_cache_dir(), video_id))
    }

    /// Outputs depend on the transcript language, so each language gets its own directory.
    pub fn for_request(request: &SummarizeRequest) -> Self {
        Self::for_video(&request.video_id).language(&request.language)
    }

    pub fn language(self, language: &str) -> Self {
        Self::new(self.dir.join(language))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn load(&self, stage: &str) -> Result<Option<Value>> {
        let path = get_stage_path(&self.dir, stage);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, stage: &str, value: &Value) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = get_stage_path(&self.dir, stage);
        tokio::fs::write(&path, serde_json::to_vec_pretty(value)?).await?;
        debug!(stage, path = %path.display(), "Cached stage output");
        Ok(path)
    }

    /// Copy cached outputs of `stages` into `context`. Unreadable entries are ignored.
    pub async fn seed(&self, context: &mut PipelineContext, stages: &[&str]) -> Vec<String> {
        let mut seeded = Vec::new();
        for stage in stages {
            match self.load(stage).await {
                Ok(Some(value)) => {
                    context.insert(*stage, value);
                    seeded.push(stage.to_string());
                }
                Ok(None) => {}
                Err(err) => warn!(stage, error = %err, "Ignoring unreadable cache entry"),
            }
        }
        seeded
    }

    /// Persist every stage output the run actually produced.
    pub async fn store_run(&self, run: &PipelineRun, stages: &[&str]) -> Result<usize> {
        let mut stored = 0;
        for record in &run.stages {
            if record.reused || !stages.contains(&record.name.as_str()) {
                continue;
            }
            if let StageResult::Ok { value } = &record.result {
                self.save(&record.name, value).await?;
                stored += 1;
            }
        }
        Ok(stored)
    }
}
