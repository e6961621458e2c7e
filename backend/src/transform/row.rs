//! Per-row transformation.
//!
//! A [`RowTransformer`] turns one cell into a [`TransformResult`]. Every
//! failure of the external call is captured as [`TransformResult::Failed`];
//! nothing here returns an error to the caller.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ai::{ChatClient, GenerationRequest, GeneratorConfig, TextGenerator};
use crate::api::logs::{log_info_indent, log_warning};
use crate::error::GenerationResult;
use crate::models::{Cell, Instruction, TransformResult};

/// Runs the external generator on single cells.
#[derive(Clone)]
pub struct RowTransformer {
    generator: Arc<dyn TextGenerator>,
    directive: String,
    max_attempts: u32,
    retry_delay: Duration,
    coerce_numbers: bool,
}

impl RowTransformer {
    /// Wrap a generator, taking directive and retry policy from `config`.
    pub fn new(generator: Arc<dyn TextGenerator>, config: &GeneratorConfig) -> Self {
        Self {
            generator,
            directive: config.directive_text.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
            coerce_numbers: false,
        }
    }

    /// Build a transformer backed by the chat-completions client.
    pub fn from_config(config: &GeneratorConfig) -> GenerationResult<Self> {
        let client = ChatClient::new(config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    /// Send numeric cells as text instead of skipping them.
    pub fn with_number_coercion(mut self, enabled: bool) -> Self {
        self.coerce_numbers = enabled;
        self
    }

    /// Text sent for `cell`, or `None` when the row is skipped.
    pub fn request_text<'a>(&self, cell: &'a Cell) -> Option<Cow<'a, str>> {
        match cell {
            Cell::Text(_) => cell.as_text().map(Cow::Borrowed),
            Cell::Number(_) if self.coerce_numbers => Some(Cow::Owned(cell.to_field())),
            _ => None,
        }
    }

    /// Transform one cell. Never fails; failures become [`TransformResult::Failed`].
    pub async fn transform(&self, cell: &Cell, instruction: &Instruction) -> TransformResult {
        let text = match self.request_text(cell) {
            Some(text) => text,
            None => return TransformResult::Skipped,
        };
        let request = GenerationRequest::new(&self.directive, instruction.as_str(), &text);

        let mut attempt = 1;
        loop {
            let start = Instant::now();
            match self.generator.generate(&request).await {
                Ok(answer) => {
                    log_info_indent(
                        format!("Time taken for response: {:.2} seconds", start.elapsed().as_secs_f64()),
                        1,
                    );
                    return TransformResult::Success(answer);
                }
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    log_warning(format!("Attempt {}/{} failed: {}", attempt, self.max_attempts, e));
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return TransformResult::Failed(e.to_string()),
            }
        }
    }
}
