use std::path::Path;

use crate::analysis_types::EmailAnalysis;
use crate::cancel::CancellationToken;
use crate::errors::PipelineResult;
use crate::llm::{schemas, LlmClient};
use crate::readers::{ContentReader, Mailbox};
use crate::types::FileMetadata;

const SYSTEM_PROMPT: &str = "You are a forensic analyst examining an email thread for a \
legal investigation. Return findings conforming exactly to the requested schema: every \
participant with role, interaction counts, and a deference score in [0,1] (0 dominant, \
0.5 neutral, 1 deferential); a thread summary; the communication pattern; whether \
escalation is present; legal significance; risk flags; and extracted entities. Preserve \
participant metadata faithfully; do not collapse participants into counts.";

/// Email analyzer: parses the envelope through the reader, ships envelope
/// plus body to one structured call.
pub struct EmailAnalyzer<'a> {
    client: &'a LlmClient,
    reader: &'a dyn ContentReader,
}

impl<'a> EmailAnalyzer<'a> {
    pub fn new(client: &'a LlmClient, reader: &'a dyn ContentReader) -> Self {
        EmailAnalyzer { client, reader }
    }

    pub fn analyze(
        &self,
        raw_path: &Path,
        metadata: &FileMetadata,
        cancel: &CancellationToken,
    ) -> PipelineResult<EmailAnalysis> {
        cancel.check()?;
        let email = self.reader.read_email(raw_path)?;

        let user_content = serde_json::json!({
            "filename": metadata.filename,
            "envelope": {
                "from": mailboxes_json(&email.from),
                "to": mailboxes_json(&email.to),
                "cc": mailboxes_json(&email.cc),
                "bcc": mailboxes_json(&email.bcc),
                "subject": email.subject,
                "date_utc": email.date_utc,
            },
            "body": email.body,
        });

        self.client
            .call_structured(SYSTEM_PROMPT, user_content, schemas::EMAIL_ANALYSIS, cancel)
            .map_err(|e| e.into_analyzer_error())
    }
}

fn mailboxes_json(mailboxes: &[Mailbox]) -> Vec<serde_json::Value> {
    mailboxes
        .iter()
        .map(|m| {
            serde_json::json!({
                "name": m.display_name(),
                "address": m.address,
            })
        })
        .collect()
}
