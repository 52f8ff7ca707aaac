use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;

use crate::analysis_types::{DocumentAnalysis, WordCount, WordStats};
use crate::cancel::CancellationToken;
use crate::errors::PipelineResult;
use crate::llm::{schemas, LlmClient};
use crate::readers::ContentReader;
use crate::types::FileMetadata;

const SYSTEM_PROMPT: &str = "You are a forensic document examiner supporting a legal \
investigation. Analyze the supplied document text and return findings that conform \
exactly to the requested schema: a neutral summary, extracted entities with \
confidences, a document-type tag, sentiment, legal significance, and any applicable \
risk flags. Ground every finding in the text; do not speculate.";

/// Document analyzer: one structured call over the extracted text, plus
/// deterministic word statistics for the visualization outputs.
pub struct DocumentAnalyzer<'a> {
    client: &'a LlmClient,
    reader: &'a dyn ContentReader,
}

impl<'a> DocumentAnalyzer<'a> {
    pub fn new(client: &'a LlmClient, reader: &'a dyn ContentReader) -> Self {
        DocumentAnalyzer { client, reader }
    }

    pub fn analyze(
        &self,
        raw_path: &Path,
        metadata: &FileMetadata,
        cancel: &CancellationToken,
    ) -> PipelineResult<DocumentAnalysis> {
        cancel.check()?;
        let text = self.reader.extract_text(raw_path)?;

        let user_content = serde_json::json!({
            "filename": metadata.filename,
            "size_bytes": metadata.size_bytes,
            "text": text,
        });

        let mut analysis: DocumentAnalysis = self
            .client
            .call_structured(SYSTEM_PROMPT, user_content, schemas::DOCUMENT_ANALYSIS, cancel)
            .map_err(|e| e.into_analyzer_error())?;

        analysis.word_stats = Some(compute_word_stats(&text));
        Ok(analysis)
    }
}

/// Deterministic word statistics: lowercase alphabetic tokens of length >= 3,
/// top 20 by count with alphabetical tie-break.
pub fn compute_word_stats(text: &str) -> WordStats {
    let token_re = Regex::new(r"[a-zA-Z][a-zA-Z']{2,}").expect("token regex");
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;

    for token in token_re.find_iter(text) {
        let word = token.as_str().to_ascii_lowercase();
        *counts.entry(word).or_insert(0) += 1;
        total += 1;
    }

    let unique = counts.len();
    let mut ranked: Vec<WordCount> = counts
        .into_iter()
        .map(|(word, count)| WordCount { word, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    ranked.truncate(20);

    WordStats {
        total_words: total,
        unique_words: unique,
        top_words: ranked,
    }
}
