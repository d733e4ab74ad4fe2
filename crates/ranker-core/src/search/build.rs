//! Offline index build from a catalog snapshot.

use ranker_state::Agent;
use tracing::{info, instrument, warn};

use super::artifacts::{ArtifactSet, MetadataRecord};
use super::encoder::{Encoder, EncoderError};
use super::index::{l2_normalize, FlatIpIndex};
use crate::error::Result;

/// Texts sent to the encoder per request.
pub const ENCODE_BATCH: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub indexed: usize,
    pub skipped: Vec<String>,
}

/// `"{name} {description}"`, trimmed.
pub fn agent_text(agent: &Agent) -> String {
    format!("{} {}", agent.name, agent.description)
        .trim()
        .to_string()
}

/// Encode `agents` (in the given order) into an artifact set.
///
/// Agents with no text or no DID are skipped with a warning; positions in the
/// result follow the surviving agents' order.
#[instrument(skip_all, fields(agents = agents.len(), model = encoder.model_id()))]
pub async fn build_artifacts(
    agents: &[Agent],
    encoder: &dyn Encoder,
) -> Result<(ArtifactSet, BuildReport)> {
    let mut report = BuildReport::default();
    let mut texts = Vec::with_capacity(agents.len());
    let mut metadata = Vec::with_capacity(agents.len());

    for agent in agents {
        let text = agent_text(agent);
        if text.is_empty() || agent.did.trim().is_empty() {
            warn!(agent_id = %agent.id, "skipping agent without text or did");
            report.skipped.push(agent.id.clone());
            continue;
        }
        texts.push(text);
        metadata.push(MetadataRecord {
            id: agent.id.clone(),
            did: agent.did.clone(),
            name: agent.name.clone(),
            description: agent.description.clone(),
        });
    }

    let dimension = encoder.dimension();
    let mut index = FlatIpIndex::new(dimension);
    for batch in texts.chunks(ENCODE_BATCH) {
        let vectors = encoder.encode(batch).await?;
        if vectors.len() != batch.len() {
            return Err(EncoderError::Count {
                expected: batch.len(),
                actual: vectors.len(),
            }
            .into());
        }
        for mut v in vectors {
            if v.len() != dimension {
                return Err(EncoderError::Dimension {
                    expected: dimension,
                    actual: v.len(),
                }
                .into());
            }
            l2_normalize(&mut v);
            index.add(&v);
        }
    }

    report.indexed = index.len();
    info!(
        indexed = report.indexed,
        skipped = report.skipped.len(),
        "index built"
    );
    Ok((ArtifactSet::new(encoder.model_id(), index, metadata), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RankerError;
    use crate::search::encoder::HashingEncoder;
    use async_trait::async_trait;

    /// Drops the last text of every batch.
    struct LossyEncoder(HashingEncoder);

    #[async_trait]
    impl Encoder for LossyEncoder {
        fn model_id(&self) -> &str {
            self.0.model_id()
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        async fn encode(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EncoderError> {
            let mut vectors = self.0.encode(texts).await?;
            vectors.pop();
            Ok(vectors)
        }
    }

    #[test]
    fn text_is_trimmed_concatenation() {
        let a = Agent::new("a1", "Alpha", "did:a1").with_description("finds invoices");
        assert_eq!(agent_text(&a), "Alpha finds invoices");
        let b = Agent::new("b1", "Beta", "did:b1");
        assert_eq!(agent_text(&b), "Beta");
        let c = Agent::new("c1", "", "did:c1");
        assert_eq!(agent_text(&c), "");
    }

    #[tokio::test]
    async fn skips_agents_without_text_and_keeps_order() {
        let agents = vec![
            Agent::new("a1", "Alpha", "did:a1").with_description("one"),
            Agent::new("blank", "  ", "did:blank"),
            Agent::new("nodid", "Named", ""),
            Agent::new("a2", "Beta", "did:a2").with_description("two"),
        ];
        let (set, report) = build_artifacts(&agents, &HashingEncoder::new(16))
            .await
            .unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped, vec!["blank", "nodid"]);
        let ids: Vec<_> = set.metadata.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(set.manifest.count, 2);
        assert_eq!(set.manifest.model, "hashing-v1-16");

        let v = &set.index.as_slice()[..16];
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn short_encoder_output_fails_the_build() {
        let agents = vec![
            Agent::new("a1", "Alpha", "did:a1"),
            Agent::new("a2", "Beta", "did:a2"),
        ];
        let err = build_artifacts(&agents, &LossyEncoder(HashingEncoder::new(16)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RankerError::Encoder(EncoderError::Count {
                expected: 2,
                actual: 1
            })
        ));
    }
}
