// src/pipeline.rs

use async_trait::async_trait;
use tracing::{info, warn};

use crate::fields::{ExtractedFields, Outcome};

/// One extraction strategy.
///
/// Implementations never fail outward: every failure mode collapses into
/// `Outcome::Unusable`, so the pipeline can fall through strategies without
/// handling strategy-specific errors.
#[async_trait]
pub trait FieldExtraction: Send + Sync {
    fn name(&self) -> &'static str;
    async fn extract(&self, text: &str) -> Outcome;
}

enum Stage {
    Primary,
    Fallback,
    Done(ExtractedFields),
}

/// Runs the primary strategy first and falls back to the secondary one when
/// the primary result is unusable. Single pass, no state across calls.
pub struct ExtractionPipeline {
    primary: Box<dyn FieldExtraction>,
    fallback: Box<dyn FieldExtraction>,
}

impl ExtractionPipeline {
    pub fn new(primary: Box<dyn FieldExtraction>, fallback: Box<dyn FieldExtraction>) -> Self {
        Self { primary, fallback }
    }

    /// Produce one normalized record for `text`.
    ///
    /// Always returns a complete record: when both strategies come back
    /// unusable, the fallback's sentinel record is returned rather than an
    /// error, and callers detect the failure through the sentinel values.
    pub async fn run(&self, text: &str) -> ExtractedFields {
        let mut stage = if text.trim().is_empty() {
            // Nothing worth sending out; go straight to the deterministic path.
            info!(strategy = self.primary.name(), "No document text, skipping primary strategy");
            Stage::Fallback
        } else {
            Stage::Primary
        };

        loop {
            stage = match stage {
                Stage::Primary => match self.primary.extract(text).await {
                    Outcome::Usable(fields) => {
                        info!(
                            strategy = self.primary.name(),
                            merchant = %fields.merchant_name,
                            "Extraction usable"
                        );
                        Stage::Done(fields)
                    }
                    Outcome::Unusable { reason, .. } => {
                        warn!(
                            strategy = self.primary.name(),
                            reason = %reason,
                            "Unusable result, falling back"
                        );
                        Stage::Fallback
                    }
                },
                Stage::Fallback => match self.fallback.extract(text).await {
                    Outcome::Usable(fields) => {
                        info!(
                            strategy = self.fallback.name(),
                            merchant = %fields.merchant_name,
                            "Extraction usable"
                        );
                        Stage::Done(fields)
                    }
                    Outcome::Unusable { reason, fields } => {
                        warn!(
                            strategy = self.fallback.name(),
                            reason = %reason,
                            "No strategy produced a usable result, returning sentinel record"
                        );
                        Stage::Done(fields)
                    }
                },
                Stage::Done(fields) => return fields,
            };
        }
    }
}
