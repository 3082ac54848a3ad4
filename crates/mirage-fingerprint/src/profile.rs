//! Profiles and the profile manager
//!
//! A profile owns one fingerprint, a behavioral model and the risk ledger
//! the mutation engine feeds on. The manager is the single owned store of
//! profiles; everything else refers to profiles by id.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mirage_types::{
    BehavioralModel, ComponentName, DetectionKind, Fingerprint, ProfileState,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::synthesizer::{SeedConstraints, Synthesizer};

/// Mutation history entries kept per profile.
const MUTATION_HISTORY_LIMIT: usize = 20;
/// Detection history entries kept per profile.
const DETECTION_HISTORY_LIMIT: usize = 50;

/// One committed mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRecord {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    /// Component name to (old, new) canonical JSON values
    pub changes: BTreeMap<ComponentName, (String, String)>,
}

/// A fingerprint plus lifecycle state, risk ledger and behavioral model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub state: ProfileState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    pub behavioral: BehavioralModel,
    pub risk_scores: HashMap<ComponentName, f64>,
    pub cooldowns: HashMap<ComponentName, DateTime<Utc>>,
    pub mutation_history: VecDeque<MutationRecord>,
    pub detection_history: VecDeque<(DateTime<Utc>, DetectionKind)>,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    /// Pool-facing reputation in [0, 1]; halved on quarantine exit
    pub reputation: f64,
}

impl Profile {
    /// Create a profile around an already-synthesized fingerprint.
    pub fn from_fingerprint<R: Rng + ?Sized>(fingerprint: Fingerprint, rng: &mut R) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            state: ProfileState::Pristine,
            created_at: now,
            last_active: now,
            fingerprint,
            behavioral: BehavioralModel::sampled(rng),
            risk_scores: HashMap::new(),
            cooldowns: HashMap::new(),
            mutation_history: VecDeque::new(),
            detection_history: VecDeque::new(),
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            reputation: 1.0,
        }
    }

    pub fn risk(&self, name: ComponentName) -> f64 {
        self.risk_scores.get(&name).copied().unwrap_or(0.0)
    }

    pub fn in_cooldown(&self, name: ComponentName, now: DateTime<Utc>) -> bool {
        self.cooldowns.get(&name).map(|until| now < *until).unwrap_or(false)
    }

    /// Hours since the last committed mutation, or since creation.
    pub fn hours_since_last_mutation(&self, now: DateTime<Utc>) -> f64 {
        let since = self
            .mutation_history
            .back()
            .map(|m| m.timestamp)
            .unwrap_or(self.created_at);
        (now - since).num_seconds() as f64 / 3600.0
    }

    pub fn push_mutation_record(&mut self, record: MutationRecord) {
        self.mutation_history.push_back(record);
        while self.mutation_history.len() > MUTATION_HISTORY_LIMIT {
            self.mutation_history.pop_front();
        }
    }

    /// Record a successful interaction round: decay risk everywhere, adapt
    /// behavior, possibly promote SUSPICIOUS back to HEALTHY.
    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.last_active = Utc::now();
        self.behavioral.adapt(true);
        for score in self.risk_scores.values_mut() {
            *score = (*score - 0.05).max(0.0);
        }
        if self.state == ProfileState::Suspicious
            && self.success_count > self.failure_count + 2
        {
            self.state = ProfileState::Healthy;
        } else if self.state == ProfileState::Pristine {
            self.state = ProfileState::Healthy;
        }
    }

    /// Record a detection against the profile, attributing risk to the
    /// components most likely to have leaked.
    pub fn record_detection(&mut self, kind: DetectionKind) {
        let now = Utc::now();
        self.failure_count += 1;
        self.consecutive_failures += 1;
        self.last_active = now;
        self.behavioral.adapt(false);
        self.detection_history.push_back((now, kind));
        while self.detection_history.len() > DETECTION_HISTORY_LIMIT {
            self.detection_history.pop_front();
        }

        let base_risk = 0.3 + self.consecutive_failures as f64 * 0.1;

        // Components mutated within the last hour are prime suspects.
        let recent: Vec<ComponentName> = self
            .mutation_history
            .iter()
            .filter(|m| (now - m.timestamp) < ChronoDuration::hours(1))
            .flat_map(|m| m.changes.keys().copied())
            .collect();
        for name in recent {
            *self.risk_scores.entry(name).or_default() += 0.25 * base_risk;
        }

        // Fingerprint-level blocks implicate the classic leak set.
        if matches!(kind, DetectionKind::Fingerprint | DetectionKind::CdpDetection) {
            for name in [
                ComponentName::UserAgent,
                ComponentName::WebglRenderer,
                ComponentName::SecChUa,
                ComponentName::TlsJa3,
                ComponentName::CanvasParams,
            ] {
                *self.risk_scores.entry(name).or_default() += base_risk * 1.2;
            }
        }
        for score in self.risk_scores.values_mut() {
            *score = score.min(1.0);
        }

        if self.consecutive_failures >= 3 {
            self.state = ProfileState::Compromised;
        } else if self.state != ProfileState::Compromised {
            self.state = ProfileState::Suspicious;
        }

        debug!(
            profile_id = %self.id,
            kind = %kind,
            consecutive_failures = self.consecutive_failures,
            state = %self.state,
            "Detection recorded against profile"
        );
    }
}

/// Owned store of profiles, keyed by id
///
/// Each profile sits behind its own async mutex so mutations of different
/// profiles proceed in parallel while a single profile's mutation stays
/// atomic.
pub struct ProfileManager {
    synthesizer: Synthesizer,
    profiles: dashmap::DashMap<String, Arc<Mutex<Profile>>>,
}

impl Default for ProfileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileManager {
    pub fn new() -> Self {
        Self {
            synthesizer: Synthesizer::new(),
            profiles: dashmap::DashMap::new(),
        }
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    /// Synthesize a new profile and register it.
    pub fn create<R: Rng + ?Sized>(&self, seed: &SeedConstraints, rng: &mut R) -> Arc<Mutex<Profile>> {
        let fingerprint = self.synthesizer.generate(seed, rng);
        let profile = Profile::from_fingerprint(fingerprint, rng);
        let id = profile.id.clone();
        let handle = Arc::new(Mutex::new(profile));
        self.profiles.insert(id.clone(), handle.clone());
        debug!(profile_id = %id, "Profile created");
        handle
    }

    /// Register an externally constructed profile (snapshot restore).
    pub fn adopt(&self, profile: Profile) -> Arc<Mutex<Profile>> {
        let id = profile.id.clone();
        let handle = Arc::new(Mutex::new(profile));
        self.profiles.insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<Profile>>> {
        self.profiles.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Mutex<Profile>>> {
        self.profiles.remove(id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.profiles.iter().map(|e| e.key().clone()).collect()
    }

    /// Pick an acquirable profile, preferring the least recently active
    /// one; `None` when every profile is burned or evolving.
    pub async fn select_available(&self) -> Option<Arc<Mutex<Profile>>> {
        let mut best: Option<(DateTime<Utc>, Arc<Mutex<Profile>>)> = None;
        for entry in self.profiles.iter() {
            let handle = entry.value().clone();
            let profile = handle.lock().await;
            if !profile.state.acquirable() {
                continue;
            }
            let last_active = profile.last_active;
            drop(profile);
            match &best {
                Some((current, _)) if *current <= last_active => {}
                _ => best = Some((last_active, handle)),
            }
        }
        best.map(|(_, handle)| handle)
    }

    /// Snapshot clones of every profile, for persistence.
    pub async fn export_all(&self) -> Vec<Profile> {
        let mut out = Vec::with_capacity(self.profiles.len());
        for entry in self.profiles.iter() {
            out.push(entry.value().lock().await.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_profile() -> Profile {
        let mut rng = StdRng::seed_from_u64(11);
        let synth = Synthesizer::new();
        let fp = synth.generate(&SeedConstraints::default(), &mut rng);
        Profile::from_fingerprint(fp, &mut rng)
    }

    #[test]
    fn three_consecutive_failures_compromise_the_profile() {
        let mut profile = make_profile();
        profile.record_detection(DetectionKind::Cloudflare);
        assert_eq!(profile.state, ProfileState::Suspicious);
        profile.record_detection(DetectionKind::Cloudflare);
        profile.record_detection(DetectionKind::Cloudflare);
        assert_eq!(profile.state, ProfileState::Compromised);
    }

    #[test]
    fn fingerprint_block_raises_risk_on_leak_set() {
        let mut profile = make_profile();
        profile.record_detection(DetectionKind::Fingerprint);
        assert!(profile.risk(ComponentName::UserAgent) > 0.0);
        assert!(profile.risk(ComponentName::TlsJa3) > 0.0);
        assert!(profile.risk(ComponentName::FontsList) == 0.0);
    }

    #[test]
    fn success_decays_risk_and_promotes_state() {
        let mut profile = make_profile();
        profile.record_detection(DetectionKind::RateLimit);
        let risky = profile.risk_scores.values().cloned().fold(0.0, f64::max);
        for _ in 0..4 {
            profile.record_success();
        }
        let after = profile.risk_scores.values().cloned().fold(0.0, f64::max);
        assert!(after < risky);
        assert_eq!(profile.state, ProfileState::Healthy);
    }

    #[test]
    fn mutation_history_is_bounded() {
        let mut profile = make_profile();
        for i in 0..30 {
            profile.push_mutation_record(MutationRecord {
                timestamp: Utc::now(),
                strategy: format!("test-{i}"),
                changes: BTreeMap::new(),
            });
        }
        assert_eq!(profile.mutation_history.len(), 20);
        assert_eq!(profile.mutation_history.back().unwrap().strategy, "test-29");
    }

    #[tokio::test]
    async fn manager_selects_least_recently_active() {
        let manager = ProfileManager::new();
        let mut rng = StdRng::seed_from_u64(2);
        let first = manager.create(&SeedConstraints::default(), &mut rng);
        let _second = manager.create(&SeedConstraints::default(), &mut rng);

        {
            let mut p = first.lock().await;
            p.last_active = Utc::now() - ChronoDuration::hours(2);
        }
        let selected = manager.select_available().await.unwrap();
        let selected_id = selected.lock().await.id.clone();
        let first_id = first.lock().await.id.clone();
        assert_eq!(selected_id, first_id);
    }
}
