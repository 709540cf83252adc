use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use triage_ai::{EmbeddingClient, EmbeddingRequest};
use triage_vector::validate_embedding;

use crate::dedupe_types::TriageItem;

#[derive(Clone)]
/// Turns triage items into embedding vectors through an `EmbeddingClient`.
pub struct ItemEmbedder {
    client: Arc<dyn EmbeddingClient>,
    model: String,
    dimensions: Option<usize>,
}

impl ItemEmbedder {
    pub fn new(
        client: Arc<dyn EmbeddingClient>,
        model: impl Into<String>,
        dimensions: Option<usize>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub async fn embed_item(&self, item: &TriageItem) -> Result<Vec<f32>> {
        self.embed_text(&item.embedding_text())
            .await
            .with_context(|| format!("failed to embed {} #{}", item.item_type(), item.number()))
    }

    /// Embeds one text. Empty, non-finite, or wrongly sized vectors are errors.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(anyhow!("refusing to embed empty text"));
        }
        let response = self
            .client
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
                dimensions: self.dimensions,
            })
            .await
            .context("embedding provider request failed")?;
        let vector = response
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedding provider returned no vectors"))?;
        validate_embedding(&vector, self.dimensions).context("embedding provider returned an invalid vector")?;
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use triage_ai::{ChatUsage, EmbeddingClient, EmbeddingRequest, EmbeddingResponse, TriageAiError};

    use super::ItemEmbedder;

    struct FixedEmbeddings(Vec<Vec<f32>>);

    #[async_trait]
    impl EmbeddingClient for FixedEmbeddings {
        async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, TriageAiError> {
            Ok(EmbeddingResponse {
                vectors: self.0.clone(),
                usage: ChatUsage::default(),
            })
        }
    }

    #[tokio::test]
    async fn functional_embed_text_returns_validated_vector() {
        let embedder = ItemEmbedder::new(Arc::new(FixedEmbeddings(vec![vec![0.1, 0.2, 0.3]])), "m", Some(3));
        let vector = embedder.embed_text("crash on save").await.expect("vector");
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn regression_embed_text_rejects_placeholder_and_malformed_vectors() {
        let empty = ItemEmbedder::new(Arc::new(FixedEmbeddings(vec![Vec::new()])), "m", None);
        assert!(empty.embed_text("x").await.is_err());

        let missing = ItemEmbedder::new(Arc::new(FixedEmbeddings(Vec::new())), "m", None);
        assert!(missing.embed_text("x").await.is_err());

        let nan = ItemEmbedder::new(Arc::new(FixedEmbeddings(vec![vec![f32::NAN, 1.0]])), "m", None);
        assert!(nan.embed_text("x").await.is_err());

        let wrong_size = ItemEmbedder::new(Arc::new(FixedEmbeddings(vec![vec![1.0, 0.0]])), "m", Some(3));
        assert!(wrong_size.embed_text("x").await.is_err());
    }

    #[tokio::test]
    async fn unit_embed_text_rejects_blank_input_without_calling_provider() {
        let embedder = ItemEmbedder::new(Arc::new(FixedEmbeddings(vec![vec![1.0]])), "m", None);
        assert!(embedder.embed_text("   ").await.is_err());
    }
}
