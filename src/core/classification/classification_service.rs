// Classification service - wraps the external classifier behind a named
// failure policy so an unreachable oracle has one, documented outcome.
//
// NO HTTP or Google API types here - just the port and the policy.

use super::classification_models::{SafeSearchScores, Verdict};
use crate::core::storage::ObjectRef;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier transport error: {0}")]
    Transport(String),

    #[error("classifier returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Port to the external image-safety classifier.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, object: &ObjectRef) -> Result<SafeSearchScores, ClassifierError>;
}

/// What to answer when the classifier itself fails.
///
/// The production contract is fail-closed: an unreachable classifier must
/// not let unmoderated content publish silently. `FailOpen` reproduces the
/// legacy backend fallback that approved by default and exists so the
/// policy stays an explicit, overridable choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    FailClosed,
    FailOpen,
}

impl FailurePolicy {
    pub fn fallback_verdict(&self) -> Verdict {
        match self {
            FailurePolicy::FailClosed => Verdict {
                approved: false,
                details: "error analyzing image".to_string(),
            },
            FailurePolicy::FailOpen => Verdict {
                approved: true,
                details: "Filtro de respaldo en backend (aprobada por defecto)".to_string(),
            },
        }
    }
}

/// Turns raw classifier output (or a classifier failure) into a `Verdict`.
pub struct ClassificationService<C: ImageClassifier> {
    classifier: C,
    policy: FailurePolicy,
}

impl<C: ImageClassifier> ClassificationService<C> {
    pub fn new(classifier: C, policy: FailurePolicy) -> Self {
        Self { classifier, policy }
    }

    /// Classify one stored image. Never fails: a classifier error resolves
    /// through the configured policy.
    pub async fn moderate(&self, object: &ObjectRef) -> Verdict {
        match self.classifier.classify(object).await {
            Ok(scores) => Verdict::from_scores(&scores),
            Err(err) => {
                tracing::error!(
                    path = %object.path,
                    policy = ?self.policy,
                    "Image classification failed: {err}"
                );
                self.policy.fallback_verdict()
            }
        }
    }
}
