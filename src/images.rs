use std::path::Path;

use crate::analysis_types::ImageAnalysis;
use crate::cancel::CancellationToken;
use crate::errors::PipelineResult;
use crate::llm::{schemas, LlmClient};
use crate::readers::ContentReader;
use crate::types::FileMetadata;

const SYSTEM_PROMPT: &str = "You are a forensic image examiner supporting a legal \
investigation. Describe the scene, transcribe every piece of legible text (OCR), list \
detected objects, and report your analysis confidence, conforming exactly to the \
requested schema. Transcribe text verbatim; note uncertainty rather than guessing.";

/// Image analyzer: vision-capable payload (image bytes or rasterized PDF
/// page) plus the forensic prompt, OCR text comes back in the response.
pub struct ImageAnalyzer<'a> {
    client: &'a LlmClient,
    reader: &'a dyn ContentReader,
}

impl<'a> ImageAnalyzer<'a> {
    pub fn new(client: &'a LlmClient, reader: &'a dyn ContentReader) -> Self {
        ImageAnalyzer { client, reader }
    }

    pub fn analyze(
        &self,
        raw_path: &Path,
        metadata: &FileMetadata,
        cancel: &CancellationToken,
    ) -> PipelineResult<ImageAnalysis> {
        cancel.check()?;
        let payload = self.reader.read_image(raw_path)?;

        let user_content = serde_json::json!({
            "filename": metadata.filename,
            "media_type": payload.media_type,
            "image_hex": hex::encode(&payload.bytes),
        });

        self.client
            .call_structured(SYSTEM_PROMPT, user_content, schemas::IMAGE_ANALYSIS, cancel)
            .map_err(|e| e.into_analyzer_error())
    }
}
