//! # Smart Queue Module
//!
//! Keeps the play queue stocked while it is being consumed.
//!
//! ## Lifecycle
//!
//! The [`SmartQueueController`] is a two-state machine:
//!
//! ```text
//!   Idle ──(upcoming ≤ threshold)──▶ Replenishing ──(done / failed / dropped)──▶ Idle
//! ```
//!
//! A replenishment gathers candidates from every [`CandidateSource`], drops
//! duplicates and anything already queued, already played this session or
//! played within the exclusion window, fetches features and ML scores
//! concurrently, scores and ranks the pool, samples a batch from the top of
//! the ranking and enforces artist variety. The batch is appended in one
//! step under the queue lock.
//!
//! A trigger that arrives while a replenishment is running is a no-op. The
//! state flag is flipped before the first `.await` and reset by a drop
//! guard, so a cancelled replenishment never leaves the controller stuck.
//!
//! All queue mutations (auto-queue, optimize and manual edits) go through
//! a single `tokio::sync::Mutex` around the [`QueueStore`].

use crate::algorithm::{batch_calculate_scores, rank_tracks, ScoredTrack, ScoringContext, ScoringInput};
use crate::cache::GenerationCounter;
use crate::config::EngineConfig;
use crate::history::UserHistoryStore;
use crate::providers::{with_timeout, CandidateSource, FeatureGateway, ProviderError};
use crate::scorers::recency::hours_since;
use crate::selection::{enforce_variety, separate_neighbours, weighted_random_select};
use crate::session::{Activity, MoodTarget, SessionEntry, SessionState, UserProfile};
use crate::track::{Provenance, QueueEntry, Track, TrackId};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors surfaced by queue stores and the controller.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue index {index} is out of bounds (queue length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Failed to load listening history: {0}")]
    History(#[from] ProviderError),
}

/// Storage of the play queue and the playback position.
///
/// Positions are indices into [`QueueStore::get_queue`]; entries after the
/// current position are "upcoming". Without a position nothing has played
/// yet and the whole queue is upcoming.
pub trait QueueStore: Send {
    fn get_queue(&self) -> Vec<QueueEntry>;

    fn current_position(&self) -> Option<usize>;

    /// # Errors
    ///
    /// [`QueueError::IndexOutOfBounds`] when `position` is past the end.
    fn set_position(&mut self, position: usize) -> Result<(), QueueError>;

    fn append(&mut self, entries: Vec<QueueEntry>);

    /// # Errors
    ///
    /// [`QueueError::IndexOutOfBounds`] when `index` is past the end.
    fn insert(&mut self, index: usize, entry: QueueEntry) -> Result<(), QueueError>;

    /// # Errors
    ///
    /// [`QueueError::IndexOutOfBounds`] when `index` is past the end.
    fn remove(&mut self, index: usize) -> Result<QueueEntry, QueueError>;

    /// Move the entry at `from` so it ends up at `to`.
    ///
    /// # Errors
    ///
    /// [`QueueError::IndexOutOfBounds`] when either index is past the end.
    fn reorder(&mut self, from: usize, to: usize) -> Result<(), QueueError>;

    fn clear(&mut self);

    /// Index of the first upcoming entry.
    fn upcoming_start(&self) -> usize {
        self.current_position().map_or(0, |p| p + 1)
    }

    fn upcoming(&self) -> Vec<QueueEntry> {
        let start = self.upcoming_start();
        self.get_queue().into_iter().skip(start).collect()
    }

    fn upcoming_len(&self) -> usize {
        self.get_queue().len().saturating_sub(self.upcoming_start())
    }
}

/// A [`QueueStore`] backed by a `Vec`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueStore {
    entries: Vec<QueueEntry>,
    position: Option<usize>,
}

impl InMemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `entries`, playing the one at `position`.
    #[must_use]
    pub fn with_entries(entries: Vec<QueueEntry>, position: Option<usize>) -> Self {
        let position = position.filter(|p| *p < entries.len());
        Self { entries, position }
    }

    fn check(&self, index: usize) -> Result<(), QueueError> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(QueueError::IndexOutOfBounds {
                index,
                len: self.entries.len(),
            })
        }
    }
}

impl QueueStore for InMemoryQueueStore {
    fn get_queue(&self) -> Vec<QueueEntry> {
        self.entries.clone()
    }

    fn current_position(&self) -> Option<usize> {
        self.position
    }

    fn set_position(&mut self, position: usize) -> Result<(), QueueError> {
        self.check(position)?;
        self.position = Some(position);
        Ok(())
    }

    fn append(&mut self, entries: Vec<QueueEntry>) {
        self.entries.extend(entries);
    }

    fn insert(&mut self, index: usize, entry: QueueEntry) -> Result<(), QueueError> {
        if index > self.entries.len() {
            return Err(QueueError::IndexOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        self.entries.insert(index, entry);
        if let Some(p) = self.position {
            if index <= p {
                self.position = Some(p + 1);
            }
        }
        Ok(())
    }

    fn remove(&mut self, index: usize) -> Result<QueueEntry, QueueError> {
        self.check(index)?;
        let removed = self.entries.remove(index);
        self.position = match self.position {
            // removing the playing track falls back to the one before it
            Some(p) if index <= p => p.checked_sub(1),
            other => other,
        };
        Ok(removed)
    }

    fn reorder(&mut self, from: usize, to: usize) -> Result<(), QueueError> {
        self.check(from)?;
        self.check(to)?;
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        self.position = self.position.map(|p| {
            if p == from {
                to
            } else if from < p && to >= p {
                p - 1
            } else if from > p && to <= p {
                p + 1
            } else {
                p
            }
        });
        Ok(())
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.position = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Replenishing,
}

/// Result of a replenishment trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplenishOutcome {
    Replenished { added: usize },
    /// Another replenishment was already running.
    AlreadyRunning,
    /// More than `threshold` tracks are still upcoming.
    NotNeeded,
    /// No candidate survived the filters.
    EmptyPool,
}

/// Notifications sent to subscribed observers.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    ReplenishStarted { upcoming: usize },
    ReplenishCompleted { added: usize },
    ReplenishSkipped { outcome: ReplenishOutcome },
    ReplenishFailed { error: String },
    Optimized { moved: usize },
}

pub trait QueueObserver: Send + Sync {
    fn on_event(&self, event: &QueueEvent);
}

impl<F> QueueObserver for F
where
    F: Fn(&QueueEvent) + Send + Sync,
{
    fn on_event(&self, event: &QueueEvent) {
        self(event);
    }
}

/// Handle returned by [`SmartQueueController::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Resets the controller to `Idle` when dropped.
struct ReplenishGuard<'a> {
    state: &'a Mutex<ControllerState>,
}

impl Drop for ReplenishGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = ControllerState::Idle;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, Default)]
struct ListeningIntent {
    mood: Option<MoodTarget>,
    activity: Option<Activity>,
}

/// Watches queue depth and refills the queue with scored recommendations.
pub struct SmartQueueController<S: QueueStore> {
    store: tokio::sync::Mutex<S>,
    gateway: FeatureGateway,
    history: Arc<dyn UserHistoryStore>,
    sources: Vec<Arc<dyn CandidateSource>>,
    config: EngineConfig,
    session: Mutex<SessionState>,
    rng: Mutex<StdRng>,
    state: Mutex<ControllerState>,
    intent: Mutex<ListeningIntent>,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn QueueObserver>)>>,
    next_subscription: AtomicU64,
    now_playing: GenerationCounter,
}

impl<S: QueueStore> fmt::Debug for SmartQueueController<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartQueueController")
            .field("state", &self.state())
            .field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("session_len", &lock(&self.session).len())
            .finish_non_exhaustive()
    }
}

impl<S: QueueStore> SmartQueueController<S> {
    /// Controller with no candidate sources yet.
    ///
    /// The RNG is seeded from `config.auto_queue.seed` when set, from
    /// entropy otherwise.
    #[must_use]
    pub fn new(store: S, gateway: FeatureGateway, history: Arc<dyn UserHistoryStore>, config: EngineConfig) -> Self {
        let rng = config
            .auto_queue
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let session = SessionState::with_capacity(config.auto_queue.session_capacity);
        Self {
            store: tokio::sync::Mutex::new(store),
            gateway,
            history,
            sources: Vec::new(),
            config,
            session: Mutex::new(session),
            rng: Mutex::new(rng),
            state: Mutex::new(ControllerState::Idle),
            intent: Mutex::new(ListeningIntent::default()),
            observers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
            now_playing: GenerationCounter::new(),
        }
    }

    /// Add a candidate source. Sources are consulted in the order added and
    /// the first source to offer a track decides its provenance.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn with_rng(self, rng: StdRng) -> Self {
        *lock(&self.rng) = rng;
        self
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *lock(&self.state)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_mood(&self, mood: Option<MoodTarget>) {
        lock(&self.intent).mood = mood;
    }

    pub fn set_activity(&self, activity: Option<Activity>) {
        lock(&self.intent).activity = activity;
    }

    #[must_use]
    pub fn session_snapshot(&self) -> SessionState {
        lock(&self.session).clone()
    }

    pub async fn queue_snapshot(&self) -> Vec<QueueEntry> {
        self.store.lock().await.get_queue()
    }

    pub async fn current_position(&self) -> Option<usize> {
        self.store.lock().await.current_position()
    }

    pub fn subscribe(&self, observer: Arc<dyn QueueObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.observers).push((id, observer));
        id
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn emit(&self, event: QueueEvent) {
        let observers: Vec<Arc<dyn QueueObserver>> =
            lock(&self.observers).iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer.on_event(&event);
        }
    }

    fn try_begin(&self) -> Option<ReplenishGuard<'_>> {
        let mut state = lock(&self.state);
        if *state == ControllerState::Replenishing {
            return None;
        }
        *state = ControllerState::Replenishing;
        Some(ReplenishGuard { state: &self.state })
    }

    /// Replenish when no more than `threshold` tracks are upcoming.
    ///
    /// # Errors
    ///
    /// Fails when the listening history cannot be loaded. The controller is
    /// back in `Idle` either way.
    pub async fn replenish_if_needed(&self) -> Result<ReplenishOutcome, QueueError> {
        self.run_replenish(false).await
    }

    /// Replenish regardless of queue depth.
    ///
    /// # Errors
    ///
    /// See [`SmartQueueController::replenish_if_needed`].
    pub async fn replenish(&self) -> Result<ReplenishOutcome, QueueError> {
        self.run_replenish(true).await
    }

    async fn run_replenish(&self, force: bool) -> Result<ReplenishOutcome, QueueError> {
        let Some(_guard) = self.try_begin() else {
            log::debug!("Replenish already running, ignoring trigger");
            return Ok(self.skipped(ReplenishOutcome::AlreadyRunning));
        };

        let upcoming = self.store.lock().await.upcoming_len();
        if !force && upcoming > self.config.auto_queue.threshold {
            return Ok(self.skipped(ReplenishOutcome::NotNeeded));
        }

        log::info!("Replenishing queue ({upcoming} upcoming)");
        self.emit(QueueEvent::ReplenishStarted { upcoming });

        let batch = match self.build_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("Replenish failed: {e}");
                self.emit(QueueEvent::ReplenishFailed { error: e.to_string() });
                return Err(e);
            }
        };
        if batch.is_empty() {
            log::info!("No candidates left to queue");
            return Ok(self.skipped(ReplenishOutcome::EmptyPool));
        }

        let added = {
            let mut store = self.store.lock().await;
            let mut live: HashSet<TrackId> = store.get_queue().iter().map(|e| e.id().to_string()).collect();
            let fresh: Vec<QueueEntry> = batch
                .into_iter()
                .filter(|entry| live.insert(entry.id().to_string()))
                .collect();
            let added = fresh.len();
            store.append(fresh);
            added
        };

        log::info!("Queued {added} tracks");
        self.emit(QueueEvent::ReplenishCompleted { added });
        Ok(ReplenishOutcome::Replenished { added })
    }

    fn skipped(&self, outcome: ReplenishOutcome) -> ReplenishOutcome {
        self.emit(QueueEvent::ReplenishSkipped { outcome });
        outcome
    }

    /// Candidates from every source, in source order, first occurrence wins.
    async fn gather_candidates(&self) -> Vec<(Track, Provenance)> {
        let limit = self.config.auto_queue.candidates_per_source;
        let timeout = self.config.auto_queue.provider_timeout();
        let fetches = self
            .sources
            .iter()
            .map(|source| with_timeout(source.name(), timeout, source.candidates(limit)));
        let results = join_all(fetches).await;

        let mut seen = HashSet::new();
        let mut gathered = Vec::new();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(tracks) => {
                    log::debug!("{} offered {} candidates", source.name(), tracks.len());
                    let provenance = source.provenance();
                    gathered.extend(
                        tracks
                            .into_iter()
                            .filter(|t| seen.insert(t.id.clone()))
                            .map(|t| (t, provenance.clone())),
                    );
                }
                Err(e) => log::warn!("Candidate source {} failed: {e}", source.name()),
            }
        }
        gathered
    }

    fn excluded(&self, track: &Track, profile: &UserProfile, now: DateTime<Utc>) -> bool {
        let window = self.config.auto_queue.exclusion_window_hours;
        hours_since(profile.last_played_at(&track.id), now).is_some_and(|hours| hours < window)
    }

    async fn load_profile(&self) -> Result<UserProfile, QueueError> {
        let timeout = self.config.auto_queue.provider_timeout();
        Ok(with_timeout("history", timeout, self.history.profile()).await?)
    }

    async fn build_batch(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let profile = self.load_profile().await?;
        let (live_ids, upcoming) = {
            let store = self.store.lock().await;
            let live: HashSet<TrackId> = store.get_queue().iter().map(|e| e.id().to_string()).collect();
            (live, store.upcoming())
        };
        let session = self.session_snapshot();
        let now = Utc::now();

        let pool: Vec<(Track, Provenance)> = self
            .gather_candidates()
            .await
            .into_iter()
            .filter(|(track, _)| {
                !live_ids.contains(&track.id)
                    && !session.contains_track(&track.id)
                    && !self.excluded(track, &profile, now)
            })
            .collect();
        if pool.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("{} candidates after filtering", pool.len());

        let ids: Vec<TrackId> = pool.iter().map(|(t, _)| t.id.clone()).collect();
        let (mut features, ml_scores) = tokio::join!(
            self.gateway.features_for_many(&ids),
            self.gateway.ml_scores_for_many(&ids)
        );

        let mut provenance: HashMap<TrackId, Provenance> = HashMap::with_capacity(pool.len());
        let inputs: Vec<ScoringInput> = pool
            .into_iter()
            .map(|(track, origin)| {
                provenance.insert(track.id.clone(), origin);
                let fetched = features.remove(&track.id);
                let ml = ml_scores.get(&track.id).copied();
                ScoringInput::new(track).with_features(fetched).with_ml_score(ml)
            })
            .collect();

        let intent = *lock(&self.intent);
        let context = ScoringContext::new(&profile, &session, &self.config)
            .with_upcoming(&upcoming)
            .with_mood(intent.mood)
            .with_activity(intent.activity);
        let batch = self.select_batch(inputs, &context);

        Ok(batch
            .into_iter()
            .filter_map(|scored| {
                let origin = provenance.remove(&scored.track.id)?;
                Some(QueueEntry::new(scored.track, origin))
            })
            .collect())
    }

    /// Score, rank, sample from the top `3 · batch_size` and enforce variety.
    fn select_batch(&self, inputs: Vec<ScoringInput>, context: &ScoringContext<'_>) -> Vec<ScoredTrack> {
        let auto_queue = &self.config.auto_queue;
        let mut rng = lock(&self.rng);

        let ranked = rank_tracks(batch_calculate_scores(inputs, context, &mut *rng));
        let shortlist_len = auto_queue.batch_size.saturating_mul(3).min(ranked.len());
        let mut shortlist = ranked;
        let rest = shortlist.split_off(shortlist_len);

        let scores: Vec<f64> = shortlist.iter().map(|s| s.score).collect();
        let picked = weighted_random_select(&shortlist, &scores, auto_queue.batch_size, auto_queue.temperature, &mut *rng);
        drop(rng);

        let picked_ids: HashSet<&str> = picked.iter().map(|s| s.track.id.as_str()).collect();
        let reserve: Vec<ScoredTrack> = shortlist
            .iter()
            .filter(|s| !picked_ids.contains(s.track.id.as_str()))
            .cloned()
            .chain(rest)
            .collect();

        enforce_variety(picked, reserve, self.config.diversity.max_same_artist, |s: &ScoredTrack| {
            s.track.primary_artist().map(str::to_string)
        })
    }

    /// Re-rank the upcoming part of the queue in place.
    ///
    /// The current and already played entries are never touched. When the
    /// queue changes while scores are computed the reorder is abandoned.
    /// Returns how many entries moved.
    ///
    /// # Errors
    ///
    /// Fails when the listening history cannot be loaded.
    pub async fn optimize(&self) -> Result<usize, QueueError> {
        let profile = self.load_profile().await?;
        let (start, upcoming) = {
            let store = self.store.lock().await;
            (store.upcoming_start(), store.upcoming())
        };
        if upcoming.len() < 2 {
            return Ok(0);
        }

        let ids: Vec<TrackId> = upcoming.iter().map(|e| e.id().to_string()).collect();
        let (mut features, ml_scores) = tokio::join!(
            self.gateway.features_for_many(&ids),
            self.gateway.ml_scores_for_many(&ids)
        );
        let inputs: Vec<ScoringInput> = upcoming
            .iter()
            .map(|entry| {
                ScoringInput::new(entry.track.clone())
                    .with_features(features.remove(entry.id()))
                    .with_ml_score(ml_scores.get(entry.id()).copied())
            })
            .collect();

        let session = self.session_snapshot();
        let intent = *lock(&self.intent);
        let context = ScoringContext::new(&profile, &session, &self.config)
            .with_mood(intent.mood)
            .with_activity(intent.activity);
        let ranked = {
            let mut rng = lock(&self.rng);
            rank_tracks(batch_calculate_scores(inputs, &context, &mut *rng))
        };
        let order: Vec<TrackId> = separate_neighbours(ranked, |s: &ScoredTrack| {
            s.track.primary_artist().map(str::to_string)
        })
        .into_iter()
        .map(|s| s.track.id)
        .collect();

        let mut store = self.store.lock().await;
        let unchanged = store.upcoming_start() == start
            && store.upcoming().iter().map(QueueEntry::id).eq(ids.iter().map(String::as_str));
        if !unchanged {
            log::debug!("Queue changed while optimizing, leaving it alone");
            return Ok(0);
        }

        let mut moved = 0;
        for (offset, id) in order.iter().enumerate() {
            let target = start + offset;
            let queue = store.get_queue();
            let Some(found) = queue.iter().skip(target).position(|e| e.id() == id) else {
                continue;
            };
            if found > 0 {
                store.reorder(target + found, target)?;
                moved += 1;
            }
        }
        drop(store);

        log::info!("Optimized queue, {moved} entries moved");
        self.emit(QueueEvent::Optimized { moved });
        Ok(moved)
    }

    /// Move playback to the next entry.
    ///
    /// Records the new track in the session, loads its features for the
    /// flow scorers (discarding them if playback moved on meanwhile) and
    /// then checks whether the queue needs replenishing. Returns the new
    /// current track, or `None` at the end of the queue.
    ///
    /// # Errors
    ///
    /// Propagates replenishment failures.
    pub async fn advance(&self) -> Result<Option<Track>, QueueError> {
        let track = {
            let mut store = self.store.lock().await;
            let next = store.upcoming_start();
            let Some(entry) = store.get_queue().into_iter().nth(next) else {
                return Ok(None);
            };
            store.set_position(next)?;
            entry.track
        };

        lock(&self.session).push(SessionEntry::from(&track));
        let generation = self.now_playing.advance();
        log::debug!("Now playing {} (generation {generation})", track.display_name());

        if let Some(features) = self.gateway.features_for(&track.id).await {
            if self.now_playing.is_current(generation) {
                lock(&self.session).attach_features(&track.id, features);
            } else {
                log::trace!("Discarding stale features for {}", track.id);
            }
        }

        self.replenish_if_needed().await?;
        Ok(Some(track))
    }

    /// Insert a track chosen by the listener at `index`.
    ///
    /// # Errors
    ///
    /// [`QueueError::IndexOutOfBounds`] when `index` is past the end.
    pub async fn insert(&self, index: usize, track: Track) -> Result<(), QueueError> {
        let entry = QueueEntry::new(track, Provenance::manual());
        self.store.lock().await.insert(index, entry)
    }

    /// Append a track chosen by the listener.
    pub async fn enqueue(&self, track: Track) {
        let entry = QueueEntry::new(track, Provenance::manual());
        self.store.lock().await.append(vec![entry]);
    }

    /// # Errors
    ///
    /// [`QueueError::IndexOutOfBounds`] when `index` is past the end.
    pub async fn remove(&self, index: usize) -> Result<QueueEntry, QueueError> {
        self.store.lock().await.remove(index)
    }

    /// # Errors
    ///
    /// [`QueueError::IndexOutOfBounds`] when either index is past the end.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<(), QueueError> {
        self.store.lock().await.reorder(from, to)
    }

    pub async fn clear(&self) {
        self.store.lock().await.clear();
    }
}
