//! Topic classification: one forward pass plus a label lookup.

use crate::provider::{ClassificationModel, ProviderError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// AG News topic classes, in label-id order.
pub const AG_NEWS_CLASSES: &[&str] = &["World", "Sports", "Business", "Sci/Tech"];

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Text is empty")]
    EmptyText,

    #[error("Model predicted label {label_id} but only {classes} classes are configured")]
    UnknownLabel { label_id: usize, classes: usize },

    #[error("Model has {labels} labels but {classes} class names are configured")]
    LabelCountMismatch { labels: usize, classes: usize },

    #[error("Model error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Classification task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub predicted_class: String,
    /// The model's own score for the top label, unmodified.
    pub confidence: f32,
}

/// Maps a classification model's label ids to class names.
#[derive(Clone)]
pub struct Classifier {
    model: Arc<dyn ClassificationModel>,
    class_names: Vec<String>,
}

impl Classifier {
    pub fn new(model: Arc<dyn ClassificationModel>, class_names: Vec<String>) -> Self {
        Self { model, class_names }
    }

    /// Like [`Classifier::new`], but rejects class names that do not cover
    /// the model's label space one-to-one.
    pub fn checked(model: Arc<dyn ClassificationModel>, class_names: Vec<String>) -> Result<Self> {
        if let Some(labels) = model.num_labels() {
            if labels != class_names.len() {
                return Err(ClassifierError::LabelCountMismatch {
                    labels,
                    classes: class_names.len(),
                });
            }
        }
        Ok(Self::new(model, class_names))
    }

    /// Classifier over the four AG News classes.
    pub fn ag_news(model: Arc<dyn ClassificationModel>) -> Self {
        Self::new(model, AG_NEWS_CLASSES.iter().map(|c| c.to_string()).collect())
    }

    /// Classifies `text` into one of the configured classes.
    ///
    /// The forward pass runs on a blocking thread.
    pub async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        if text.trim().is_empty() {
            return Err(ClassifierError::EmptyText);
        }

        let model = self.model.clone();
        let text = text.to_string();
        let output = tokio::task::spawn_blocking(move || model.forward(&text))
            .await
            .map_err(|e| ClassifierError::Join(e.to_string()))??;

        let predicted_class = self
            .class_names
            .get(output.label_id)
            .ok_or(ClassifierError::UnknownLabel {
                label_id: output.label_id,
                classes: self.class_names.len(),
            })?
            .clone();

        debug!(
            label = output.label_id,
            score = output.score,
            "Classified as {}",
            predicted_class
        );
        Ok(ClassificationResult {
            predicted_class,
            confidence: output.score,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LabelScore;

    struct FixedModel(LabelScore);

    impl ClassificationModel for FixedModel {
        fn forward(&self, _text: &str) -> crate::provider::Result<LabelScore> {
            Ok(self.0)
        }
    }

    fn classifier(label_id: usize, score: f32) -> Classifier {
        Classifier::ag_news(Arc::new(FixedModel(LabelScore { label_id, score })))
    }

    #[tokio::test]
    async fn test_label_two_is_business() {
        let result = classifier(2, 0.8731)
            .classify("Stocks rallied today")
            .await
            .unwrap();
        assert_eq!(result.predicted_class, "Business");
        assert_eq!(result.confidence, 0.8731);
    }

    #[tokio::test]
    async fn test_every_ag_news_label() {
        for (label_id, name) in AG_NEWS_CLASSES.iter().enumerate() {
            let result = classifier(label_id, 0.5).classify("text").await.unwrap();
            assert_eq!(&result.predicted_class, name);
        }
    }

    #[tokio::test]
    async fn test_out_of_range_label() {
        assert!(matches!(
            classifier(4, 0.9).classify("text").await,
            Err(ClassifierError::UnknownLabel { label_id: 4, classes: 4 })
        ));
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        assert!(matches!(
            classifier(0, 1.0).classify(" \n").await,
            Err(ClassifierError::EmptyText)
        ));
    }

    #[tokio::test]
    async fn test_custom_class_names() {
        let classifier = Classifier::new(
            Arc::new(FixedModel(LabelScore { label_id: 1, score: 0.6 })),
            vec!["negative".to_string(), "positive".to_string()],
        );
        let result = classifier.classify("great").await.unwrap();
        assert_eq!(result.predicted_class, "positive");
    }

    struct SizedModel(usize);

    impl ClassificationModel for SizedModel {
        fn forward(&self, _text: &str) -> crate::provider::Result<LabelScore> {
            Ok(LabelScore {
                label_id: 0,
                score: 1.0,
            })
        }

        fn num_labels(&self) -> Option<usize> {
            Some(self.0)
        }
    }

    #[test]
    fn test_checked_rejects_label_count_mismatch() {
        let names: Vec<String> = AG_NEWS_CLASSES.iter().map(|c| c.to_string()).collect();

        assert!(Classifier::checked(Arc::new(SizedModel(4)), names.clone()).is_ok());
        assert!(matches!(
            Classifier::checked(Arc::new(SizedModel(2)), names.clone()),
            Err(ClassifierError::LabelCountMismatch {
                labels: 2,
                classes: 4
            })
        ));
        // Models that cannot report their label count are taken as configured.
        let unsized_model = FixedModel(LabelScore {
            label_id: 0,
            score: 1.0,
        });
        assert!(Classifier::checked(Arc::new(unsized_model), names).is_ok());
    }
}
