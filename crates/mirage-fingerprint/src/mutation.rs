//! Fingerprint mutation engine
//!
//! Decides when a profile's fingerprint should evolve and commits one of
//! three evolution strategies, preserving catalog consistency throughout.
//! Natural evolution drifts a couple of low-stakes components; targeted
//! evolution rewrites whatever the risk ledger implicates; major evolution
//! re-rolls a primary identity axis and everything hanging off it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mirage_types::{ComponentName, ComponentValue, ProfileState};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::profile::{MutationRecord, Profile};
use crate::sampling::weighted_indices;
use crate::synthesizer::{SeedConstraints, Synthesizer};

/// Primary identity axes; kept stable unless risk forces a change.
const PRIMARY_IDENTIFIERS: &[ComponentName] = &[
    ComponentName::OsName,
    ComponentName::BrowserName,
    ComponentName::DeviceClass,
];

/// Components regenerated wholesale after a primary identity change.
const HIGH_IMPACT_DEPENDENTS: &[ComponentName] = &[
    ComponentName::WebglRenderer,
    ComponentName::FontsList,
    ComponentName::PluginsList,
    ComponentName::HardwareConcurrency,
    ComponentName::ScreenResolution,
    ComponentName::Locale,
    ComponentName::TlsJa3,
];

/// Components whose value is a pure function of the browser version;
/// mutating them means bumping the version first.
const VERSION_DERIVED: &[ComponentName] = &[
    ComponentName::UserAgent,
    ComponentName::SecChUaFullVersionList,
    ComponentName::TlsJa3,
];

/// Caller-requested mutation intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceLevel {
    Moderate,
    Major,
}

/// Outcome of one committed mutation
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Strategy that ran
    pub strategy: &'static str,

    /// Directly mutated components: name to (old, new)
    pub changes: BTreeMap<ComponentName, (ComponentValue, ComponentValue)>,

    /// Components rewritten by the consistency pass as a consequence
    pub cascaded: BTreeSet<ComponentName>,
}

impl ChangeSet {
    fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            changes: BTreeMap::new(),
            cascaded: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn contains(&self, name: ComponentName) -> bool {
        self.changes.contains_key(&name)
    }
}

/// Mutation engine over the shared synthesizer
#[derive(Clone, Copy, Default)]
pub struct MutationEngine {
    synthesizer: Synthesizer,
}

impl MutationEngine {
    pub fn new() -> Self {
        Self {
            synthesizer: Synthesizer::new(),
        }
    }

    /// Whether the profile is due for a mutation at `now`.
    pub fn should_mutate<R: Rng + ?Sized>(
        &self,
        profile: &Profile,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> bool {
        if profile.state == ProfileState::Compromised {
            return true;
        }
        if profile.state == ProfileState::Evolving {
            return false;
        }
        let hours = profile.hours_since_last_mutation(now);
        // Natural browser update cadence: four to eight weeks.
        if hours > rng.gen_range(4.0 * 7.0 * 24.0..8.0 * 7.0 * 24.0) {
            return true;
        }
        if profile.state == ProfileState::Suspicious && hours > rng.gen_range(0.5..4.0) {
            return true;
        }
        if profile.state == ProfileState::Healthy
            && rng.gen_bool(0.005)
            && hours > 72.0
        {
            return true;
        }
        false
    }

    /// Commit one mutation, preserving every fingerprint invariant.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        profile: &mut Profile,
        force: Option<ForceLevel>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> ChangeSet {
        let original_state = profile.state;
        profile.state = ProfileState::Evolving;
        profile.last_active = now;

        let pre_pass: BTreeMap<ComponentName, String> = profile
            .fingerprint
            .iter()
            .map(|(name, c)| (*name, c.value.canonical_json()))
            .collect();

        let mut change_set = match (force, original_state) {
            (Some(ForceLevel::Major), _) | (_, ProfileState::Compromised) => {
                self.major_evolution(profile, now, rng)
            }
            (Some(ForceLevel::Moderate), _) | (_, ProfileState::Suspicious) => {
                self.targeted_evolution(profile, now, rng)
            }
            _ => self.natural_evolution(profile, now, rng),
        };

        self.synthesizer.consistency_pass(&mut profile.fingerprint, rng);

        // Anything the pass rewrote beyond the direct mutations cascaded
        // from them.
        for (name, component) in profile.fingerprint.iter() {
            let before = pre_pass.get(name);
            if !change_set.changes.contains_key(name)
                && before.map(|b| *b != component.value.canonical_json()).unwrap_or(true)
            {
                change_set.cascaded.insert(*name);
            }
        }

        // Cooldowns scale inversely with risk: hot components come back
        // into rotation sooner.
        for name in change_set.changes.keys() {
            let risk = profile.risk(*name);
            let hours = rng.gen_range(0.5..12.0) / (risk + 0.1);
            profile
                .cooldowns
                .insert(*name, now + ChronoDuration::seconds((hours * 3600.0) as i64));
        }

        profile.push_mutation_record(MutationRecord {
            timestamp: now,
            strategy: change_set.strategy.to_string(),
            changes: change_set
                .changes
                .iter()
                .map(|(name, (old, new))| {
                    (*name, (old.canonical_json(), new.canonical_json()))
                })
                .collect(),
        });

        if original_state == ProfileState::Compromised {
            profile.state = ProfileState::Dormant;
            profile.risk_scores.clear();
            profile.consecutive_failures = 0;
        } else {
            profile.state = ProfileState::Healthy;
            for name in change_set.changes.keys() {
                if let Some(score) = profile.risk_scores.get_mut(name) {
                    *score = (*score * 0.5 - 0.1).max(0.0);
                }
            }
        }

        debug!(
            profile_id = %profile.id,
            strategy = change_set.strategy,
            changed = change_set.changes.len(),
            cascaded = change_set.cascaded.len(),
            state = %profile.state,
            "Mutation committed"
        );

        change_set
    }

    /// Drift one to three components chosen by weight and risk.
    fn natural_evolution<R: Rng + ?Sized>(
        &self,
        profile: &mut Profile,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> ChangeSet {
        let mut change_set = ChangeSet::new("natural");
        let count = rng.gen_range(1..=3);
        for name in self.select_candidates(profile, count, now, rng) {
            self.mutate_component(profile, name, &mut change_set, now, rng);
        }
        change_set
    }

    /// Rewrite the riskiest components first, topping up from the natural
    /// selection to a total of two to five.
    fn targeted_evolution<R: Rng + ?Sized>(
        &self,
        profile: &mut Profile,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> ChangeSet {
        let mut change_set = ChangeSet::new("targeted");
        let target_count = rng.gen_range(2..=5usize);
        // Dependent side effects (a browser-version bump) do not count
        // toward the target; only deliberately selected components do.
        let mut direct = 0usize;

        let mut by_risk: Vec<(ComponentName, f64)> = profile
            .risk_scores
            .iter()
            .map(|(name, score)| (*name, *score))
            .collect();
        by_risk.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (name, risk) in by_risk {
            if direct >= target_count {
                break;
            }
            if !profile.fingerprint.contains(name) || change_set.contains(name) {
                continue;
            }
            if risk > 0.2 || rng.gen_bool((risk * 0.5).clamp(0.0, 1.0)) {
                self.mutate_component(profile, name, &mut change_set, now, rng);
                if change_set.contains(name) {
                    direct += 1;
                }
            }
        }

        if direct < target_count {
            let missing = target_count - direct;
            for name in self.select_candidates(profile, missing + 5, now, rng) {
                if direct >= target_count {
                    break;
                }
                if !change_set.contains(name) {
                    self.mutate_component(profile, name, &mut change_set, now, rng);
                    if change_set.contains(name) {
                        direct += 1;
                    }
                }
            }
        }
        change_set
    }

    /// Re-roll a primary identity axis and force-refresh the dependents
    /// that would otherwise betray the old identity.
    fn major_evolution<R: Rng + ?Sized>(
        &self,
        profile: &mut Profile,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> ChangeSet {
        let mut change_set = ChangeSet::new("major");
        let catalog = self.synthesizer.catalog();
        let path = *["os_change", "browser_change", "device_class_change", "full_refresh"]
            .choose(rng)
            .unwrap_or(&"full_refresh");

        if path == "os_change" || path == "full_refresh" {
            let current = profile.fingerprint.os_name().unwrap_or("").to_string();
            let options: Vec<&str> = catalog
                .os_names()
                .into_iter()
                .filter(|o| *o != current)
                .collect();
            if let Some(new_os) = options.choose(rng) {
                self.apply_direct(
                    profile,
                    ComponentName::OsName,
                    ComponentValue::Str(new_os.to_string()),
                    &mut change_set,
                );
                // Device class must remain valid under the new OS.
                let dc = profile.fingerprint.device_class().unwrap_or("").to_string();
                let classes = catalog.device_classes(new_os);
                if !classes.contains(&dc.as_str()) {
                    if let Some(new_dc) = classes.choose(rng) {
                        self.apply_direct(
                            profile,
                            ComponentName::DeviceClass,
                            ComponentValue::Str(new_dc.to_string()),
                            &mut change_set,
                        );
                    }
                }
            }
        }

        if path == "browser_change" || path == "full_refresh" {
            let current = profile.fingerprint.browser_name().unwrap_or("").to_string();
            let options: Vec<&str> = catalog
                .browser_names()
                .into_iter()
                .filter(|b| *b != current)
                .collect();
            if let Some(new_browser) = options.choose(rng) {
                self.apply_direct(
                    profile,
                    ComponentName::BrowserName,
                    ComponentValue::Str(new_browser.to_string()),
                    &mut change_set,
                );
            }
        }

        if path == "device_class_change" || path == "full_refresh" {
            let os = profile.fingerprint.os_name().unwrap_or("Windows").to_string();
            let current = profile.fingerprint.device_class().unwrap_or("").to_string();
            let options: Vec<&str> = catalog
                .device_classes(&os)
                .into_iter()
                .filter(|dc| *dc != current)
                .collect();
            if let Some(new_dc) = options.choose(rng) {
                self.apply_direct(
                    profile,
                    ComponentName::DeviceClass,
                    ComponentValue::Str(new_dc.to_string()),
                    &mut change_set,
                );
            }
        }

        for name in HIGH_IMPACT_DEPENDENTS {
            self.mutate_component(profile, *name, &mut change_set, now, rng);
        }
        change_set
    }

    /// Weighted candidate selection honoring cooldowns and the primary
    /// identifier retention rule.
    fn select_candidates<R: Rng + ?Sized>(
        &self,
        profile: &Profile,
        count: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<ComponentName> {
        let mut names = Vec::new();
        let mut weights = Vec::new();
        for (name, component) in profile.fingerprint.iter() {
            if profile.in_cooldown(*name, now) {
                continue;
            }
            let risk = profile.risk(*name);
            names.push(*name);
            weights.push(component.mutation_weight.max(0.001) * (1.0 + 2.0 * risk));
        }

        let mut selected = Vec::new();
        for index in weighted_indices(&weights, count, rng) {
            let name = names[index];
            // Primary identifiers survive selection only 5% of the time
            // unless their own risk forces the issue.
            if PRIMARY_IDENTIFIERS.contains(&name)
                && profile.risk(name) < 0.6
                && !rng.gen_bool(0.05)
            {
                continue;
            }
            selected.push(name);
        }
        selected
    }

    /// Regenerate one component, retrying when the generator hands back
    /// the previous value; an unchanged result is a no-op. Components in
    /// cooldown are untouchable regardless of the calling strategy.
    fn mutate_component<R: Rng + ?Sized>(
        &self,
        profile: &mut Profile,
        name: ComponentName,
        change_set: &mut ChangeSet,
        now: DateTime<Utc>,
        rng: &mut R,
    ) {
        if profile.in_cooldown(name, now) {
            return;
        }
        // Version-derived components only move when the browser version
        // moves; bump it first so the mutation has an effect.
        if VERSION_DERIVED.contains(&name)
            && !change_set.contains(ComponentName::BrowserVersion)
            && !profile.in_cooldown(ComponentName::BrowserVersion, now)
        {
            self.bump_browser_version(profile, name == ComponentName::TlsJa3, change_set, rng);
        }

        let Some(current) = profile.fingerprint.value(name).cloned() else {
            return;
        };
        let previous = profile
            .fingerprint
            .get(name)
            .map(|c| c.last_mutated_value.clone())
            .unwrap_or(ComponentValue::Absent);

        let mut candidate =
            self.synthesizer
                .plausible_value(name, &profile.fingerprint, None, rng);
        for _ in 0..3 {
            if candidate != previous || candidate == current {
                break;
            }
            candidate = self
                .synthesizer
                .plausible_value(name, &profile.fingerprint, None, rng);
        }

        if candidate == current {
            return;
        }
        self.apply_direct(profile, name, candidate, change_set);
    }

    /// Move the browser to a different full version (or release train when
    /// `major_jump`), recording the change.
    fn bump_browser_version<R: Rng + ?Sized>(
        &self,
        profile: &mut Profile,
        major_jump: bool,
        change_set: &mut ChangeSet,
        rng: &mut R,
    ) {
        let catalog = self.synthesizer.catalog();
        let browser_name = profile.fingerprint.browser_name().unwrap_or("Chrome").to_string();
        let browser = catalog.browser(&browser_name);
        let current = profile.fingerprint.browser_version().unwrap_or("").to_string();
        let current_major = current.split('.').next().unwrap_or("");

        let candidates: Vec<&str> = browser
            .versions
            .iter()
            .filter(|v| !major_jump || v.major != current_major)
            .flat_map(|v| v.full_versions.iter().copied())
            .filter(|v| *v != current)
            .collect();
        if let Some(version) = candidates.choose(rng) {
            self.apply_direct(
                profile,
                ComponentName::BrowserVersion,
                ComponentValue::Str(version.to_string()),
                change_set,
            );
        }
    }

    fn apply_direct(
        &self,
        profile: &mut Profile,
        name: ComponentName,
        value: ComponentValue,
        change_set: &mut ChangeSet,
    ) {
        let old = profile
            .fingerprint
            .value(name)
            .cloned()
            .unwrap_or(ComponentValue::Absent);
        if old == value {
            return;
        }
        profile.fingerprint.apply(name, value.clone());
        change_set.changes.insert(name, (old, value));
    }
}
