//! # Providers
//!
//! Async seams to the outside world: audio feature lookups, ML score
//! predictions and candidate sources. The [`FeatureGateway`] walks the
//! feature providers in priority order with a per-call timeout, caches and
//! deduplicates results through a [`FeatureCache`], and turns every failure
//! into "no data".

use crate::cache::FeatureCache;
use crate::track::{AudioFeatures, Provenance, Track, TrackId};
use async_trait::async_trait;
use futures::future::{join_all, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by providers and candidate sources.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("{provider} failed: {message}")]
    Failed { provider: String, message: String },

    #[error("{0} is unavailable")]
    Unavailable(String),
}

/// Source of audio features for a track.
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Lower values are asked first.
    fn priority(&self) -> u32;

    /// `Ok(None)` when the provider does not know the track.
    async fn get_audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError>;
}

/// Learned "will the user like this" prediction, in `[0, 1]` or `[0, 100]`.
#[async_trait]
pub trait MlPredictionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_score(&self, track_id: &str) -> Result<Option<f64>, ProviderError>;
}

/// A pool of tracks the auto-queue may draw from.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    /// Provenance attached to every entry this source contributes.
    fn provenance(&self) -> Provenance;

    async fn candidates(&self, limit: usize) -> Result<Vec<Track>, ProviderError>;
}

/// Run `call` with a timeout, mapping expiry to [`ProviderError::Timeout`].
///
/// # Errors
///
/// Returns the provider's own error, or `Timeout` when `timeout` elapses.
pub async fn with_timeout<T, F>(provider: &str, timeout: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
            timeout,
        }),
    }
}

/// Prioritized feature lookup plus optional ML predictions.
pub struct FeatureGateway {
    providers: Arc<Vec<Arc<dyn FeatureProvider>>>,
    ml: Option<Arc<dyn MlPredictionProvider>>,
    cache: Arc<FeatureCache>,
    timeout: Duration,
}

impl FeatureGateway {
    /// Providers are ordered by ascending [`FeatureProvider::priority`] once, here.
    #[must_use]
    pub fn new(mut providers: Vec<Arc<dyn FeatureProvider>>, cache: Arc<FeatureCache>, timeout: Duration) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self {
            providers: Arc::new(providers),
            ml: None,
            cache,
            timeout,
        }
    }

    #[must_use]
    pub fn with_ml_provider(mut self, ml: Arc<dyn MlPredictionProvider>) -> Self {
        self.ml = Some(ml);
        self
    }

    #[must_use]
    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    /// Provider names in the order they are consulted.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Features of `track_id` from the cache or the first provider that has them.
    pub async fn features_for(&self, track_id: &str) -> Option<AudioFeatures> {
        let providers = Arc::clone(&self.providers);
        let id = track_id.to_string();
        let timeout = self.timeout;
        self.cache
            .get_or_fetch(track_id, move || {
                async move { resolve_features(&providers, &id, timeout).await }.boxed()
            })
            .await
    }

    /// Features for many tracks, fetched concurrently. Tracks without data are absent.
    pub async fn features_for_many(&self, track_ids: &[TrackId]) -> HashMap<TrackId, AudioFeatures> {
        let lookups = track_ids.iter().map(|id| async move {
            self.features_for(id).await.map(|features| (id.clone(), features))
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }

    /// ML prediction for `track_id`; `None` without a provider or on failure.
    pub async fn ml_score(&self, track_id: &str) -> Option<f64> {
        let ml = self.ml.as_ref()?;
        match with_timeout(ml.name(), self.timeout, ml.get_score(track_id)).await {
            Ok(score) => score.filter(|s| s.is_finite() && *s >= 0.0),
            Err(e) => {
                log::warn!("ML prediction for {track_id} unavailable: {e}");
                None
            }
        }
    }

    /// ML predictions for many tracks, fetched concurrently.
    pub async fn ml_scores_for_many(&self, track_ids: &[TrackId]) -> HashMap<TrackId, f64> {
        if self.ml.is_none() {
            return HashMap::new();
        }
        let lookups = track_ids
            .iter()
            .map(|id| async move { self.ml_score(id).await.map(|score| (id.clone(), score)) });
        join_all(lookups).await.into_iter().flatten().collect()
    }
}

async fn resolve_features(
    providers: &[Arc<dyn FeatureProvider>],
    track_id: &str,
    timeout: Duration,
) -> Option<AudioFeatures> {
    for provider in providers {
        match with_timeout(provider.name(), timeout, provider.get_audio_features(track_id)).await {
            Ok(Some(features)) => {
                let features = features.normalized();
                if !features.is_empty() {
                    log::trace!("Features for {track_id} from {}", provider.name());
                    return Some(features);
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Feature provider {} failed for {track_id}: {e}", provider.name()),
        }
    }
    log::debug!("No provider has features for {track_id}");
    None
}

/// Features known up front, e.g. embedded in a library file.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatureProvider {
    name: String,
    priority: u32,
    features: HashMap<TrackId, AudioFeatures>,
}

impl StaticFeatureProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            features: HashMap::new(),
        }
    }

    /// Provider serving the features embedded in `tracks`.
    #[must_use]
    pub fn from_tracks(name: impl Into<String>, priority: u32, tracks: &[Track]) -> Self {
        let mut provider = Self::new(name, priority);
        for track in tracks {
            if let Some(features) = &track.features {
                provider.features.insert(track.id.clone(), features.clone());
            }
        }
        provider
    }

    #[must_use]
    pub fn with(mut self, track_id: impl Into<TrackId>, features: AudioFeatures) -> Self {
        self.features.insert(track_id.into(), features);
        self
    }
}

#[async_trait]
impl FeatureProvider for StaticFeatureProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn get_audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError> {
        Ok(self.features.get(track_id).cloned())
    }
}

/// A fixed list of seed tracks, such as a radio station or search results.
#[derive(Debug, Clone)]
pub struct SeedTracksSource {
    name: String,
    provenance: Provenance,
    tracks: Vec<Track>,
}

impl SeedTracksSource {
    #[must_use]
    pub fn new(name: impl Into<String>, provenance: Provenance, tracks: Vec<Track>) -> Self {
        Self {
            name: name.into(),
            provenance,
            tracks,
        }
    }
}

#[async_trait]
impl CandidateSource for SeedTracksSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn provenance(&self) -> Provenance {
        self.provenance.clone()
    }

    async fn candidates(&self, limit: usize) -> Result<Vec<Track>, ProviderError> {
        Ok(self.tracks.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::SourceType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn energy(value: f64) -> AudioFeatures {
        AudioFeatures {
            energy: Some(value),
            ..AudioFeatures::default()
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl FeatureProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn priority(&self) -> u32 {
            0
        }

        async fn get_audio_features(&self, _track_id: &str) -> Result<Option<AudioFeatures>, ProviderError> {
            Err(ProviderError::Failed {
                provider: "failing".to_string(),
                message: "backend down".to_string(),
            })
        }
    }

    struct SlowProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeatureProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        fn priority(&self) -> u32 {
            1
        }

        async fn get_audio_features(&self, _track_id: &str) -> Result<Option<AudioFeatures>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(energy(0.9)))
        }
    }

    struct FixedMl(f64);

    #[async_trait]
    impl MlPredictionProvider for FixedMl {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn get_score(&self, _track_id: &str) -> Result<Option<f64>, ProviderError> {
            Ok(Some(self.0))
        }
    }

    fn cache() -> Arc<FeatureCache> {
        Arc::new(FeatureCache::new(64, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_lowest_priority_value_wins() {
        let high: Arc<dyn FeatureProvider> = Arc::new(StaticFeatureProvider::new("high", 10).with("t", energy(0.2)));
        let low: Arc<dyn FeatureProvider> = Arc::new(StaticFeatureProvider::new("low", 1).with("t", energy(0.8)));
        let gateway = FeatureGateway::new(vec![high, low], cache(), Duration::from_secs(1));

        assert_eq!(gateway.provider_names(), vec!["low", "high"]);
        assert_eq!(gateway.features_for("t").await, Some(energy(0.8)));
    }

    #[tokio::test]
    async fn test_failures_fall_through_to_next_provider() {
        let fallback: Arc<dyn FeatureProvider> =
            Arc::new(StaticFeatureProvider::new("fallback", 5).with("t", energy(0.4)));
        let failing: Arc<dyn FeatureProvider> = Arc::new(FailingProvider);
        let gateway = FeatureGateway::new(vec![fallback, failing], cache(), Duration::from_secs(1));

        assert_eq!(gateway.features_for("t").await, Some(energy(0.4)));
        assert_eq!(gateway.features_for("unknown").await, None);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_no_data() {
        let slow = Arc::new(SlowProvider {
            calls: AtomicUsize::new(0),
        });
        let provider: Arc<dyn FeatureProvider> = slow.clone();
        let gateway = FeatureGateway::new(vec![provider], cache(), Duration::from_millis(20));

        assert_eq!(gateway.features_for("t").await, None);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_features_for_many_skips_unknown() {
        let provider: Arc<dyn FeatureProvider> = Arc::new(
            StaticFeatureProvider::new("static", 0)
                .with("a", energy(0.1))
                .with("b", energy(0.2)),
        );
        let gateway = FeatureGateway::new(vec![provider], cache(), Duration::from_secs(1));
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let found = gateway.features_for_many(&ids).await;
        assert_eq!(found.len(), 2);
        assert!(!found.contains_key("c"));
        assert_eq!(gateway.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_ml_scores() {
        let gateway = FeatureGateway::new(Vec::new(), cache(), Duration::from_secs(1));
        assert_eq!(gateway.ml_score("t").await, None);

        let gateway = gateway.with_ml_provider(Arc::new(FixedMl(0.75)));
        assert_eq!(gateway.ml_score("t").await, Some(0.75));

        let nan = FeatureGateway::new(Vec::new(), cache(), Duration::from_secs(1))
            .with_ml_provider(Arc::new(FixedMl(f64::NAN)));
        assert_eq!(nan.ml_score("t").await, None);
    }

    #[tokio::test]
    async fn test_seed_source_respects_limit() {
        let tracks = (0..5).map(|i| Track::new(i.to_string(), "x")).collect();
        let source = SeedTracksSource::new("radio", Provenance::new(SourceType::Radio, "Radio"), tracks);
        assert_eq!(source.candidates(3).await.unwrap().len(), 3);
        assert_eq!(source.provenance().source, SourceType::Radio);
    }
}
