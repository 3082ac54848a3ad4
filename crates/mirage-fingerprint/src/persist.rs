//! Profile snapshots and per-platform session files
//!
//! Snapshots are plain JSON written atomically (tmp + rename). Session
//! files are lz4-compressed JSON sealed with AES-256-GCM; the key is
//! supplied by the caller and its management is out of scope. A session is
//! rejected on load when it is older than 24 hours, when its fingerprint
//! hash no longer matches the owning profile, or when the caller marked it
//! invalid.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mirage_types::{
    BehavioralModel, ComponentName, Fingerprint, PersistError, ProfileState,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::profile::Profile;

/// Bumped whenever the snapshot layout changes.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

/// Maximum session age before it is treated as stale.
const SESSION_MAX_AGE_HOURS: i64 = 24;

static AUTH_TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(token|auth|session|jwt|bearer|csrf)").expect("valid regex"));

/// Stable hex digest of a fingerprint's component values.
pub fn fingerprint_hash(fingerprint: &Fingerprint) -> String {
    let digest = blake3::hash(fingerprint.canonical_json().as_bytes());
    digest.to_hex().to_string()
}

/// Sticky bindings that survive restarts alongside the fingerprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticBinding {
    pub proxy_session_id: Option<String>,
    pub proxy_provider: Option<String>,
    pub fingerprint_hash: String,
}

/// Persisted per-profile statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub reputation: f64,
    pub risk_scores: HashMap<ComponentName, f64>,
    pub behavioral: BehavioralModel,
}

/// One profile as written to the snapshot file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub id: String,
    pub state: ProfileState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    pub stats: ProfileStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#static: Option<StaticBinding>,
}

impl From<&Profile> for ProfileSnapshot {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            state: profile.state,
            created_at: profile.created_at,
            last_active: profile.last_active,
            fingerprint: profile.fingerprint.clone(),
            stats: ProfileStats {
                success_count: profile.success_count,
                failure_count: profile.failure_count,
                consecutive_failures: profile.consecutive_failures,
                reputation: profile.reputation,
                risk_scores: profile.risk_scores.clone(),
                behavioral: profile.behavioral.clone(),
            },
            r#static: Some(StaticBinding {
                proxy_session_id: None,
                proxy_provider: None,
                fingerprint_hash: fingerprint_hash(&profile.fingerprint),
            }),
        }
    }
}

impl ProfileSnapshot {
    /// Rehydrate a profile; runtime-only state (cooldowns, histories)
    /// starts empty.
    pub fn into_profile(self) -> Profile {
        Profile {
            id: self.id,
            state: self.state,
            created_at: self.created_at,
            last_active: self.last_active,
            fingerprint: self.fingerprint,
            behavioral: self.stats.behavioral,
            risk_scores: self.stats.risk_scores,
            cooldowns: HashMap::new(),
            mutation_history: VecDeque::new(),
            detection_history: VecDeque::new(),
            success_count: self.stats.success_count,
            failure_count: self.stats.failure_count,
            consecutive_failures: self.stats.consecutive_failures,
            reputation: self.stats.reputation,
        }
    }
}

/// Top-level snapshot file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    pub profiles: Vec<ProfileSnapshot>,
}

/// Write all profiles to `path` atomically.
pub async fn save_snapshot(path: &Path, profiles: &[Profile]) -> Result<(), PersistError> {
    let snapshot = Snapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        timestamp: Utc::now(),
        profiles: profiles.iter().map(ProfileSnapshot::from).collect(),
    };
    let encoded = serde_json::to_vec_pretty(&snapshot)?;

    let tmp: PathBuf = path.with_extension("tmp");
    tokio::fs::write(&tmp, &encoded).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), profiles = profiles.len(), "Snapshot written");
    Ok(())
}

/// Load every profile from a snapshot file.
pub async fn load_snapshot(path: &Path) -> Result<Vec<Profile>, PersistError> {
    let raw = tokio::fs::read(path).await?;
    let snapshot: Snapshot = serde_json::from_slice(&raw)?;
    if snapshot.schema_version > SNAPSHOT_SCHEMA_VERSION {
        return Err(PersistError::SchemaVersion(snapshot.schema_version));
    }
    Ok(snapshot
        .profiles
        .into_iter()
        .map(ProfileSnapshot::into_profile)
        .collect())
}

/// One cookie inside a session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
}

/// Captured site state for one (profile, platform)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub platform: String,
    pub cookies: Vec<SessionCookie>,
    pub local_storage: HashMap<String, String>,
    pub auth_tokens: HashMap<String, String>,
    pub last_updated: DateTime<Utc>,
    pub fingerprint_hash: String,
    pub is_valid: bool,
}

impl SessionData {
    pub fn new(platform: impl Into<String>, fingerprint_hash: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            cookies: Vec::new(),
            local_storage: HashMap::new(),
            auth_tokens: HashMap::new(),
            last_updated: Utc::now(),
            fingerprint_hash: fingerprint_hash.into(),
            is_valid: true,
        }
    }

    /// Pull auth-shaped entries out of cookies and storage by name
    /// pattern.
    pub fn harvest_auth_tokens(&mut self) {
        for cookie in &self.cookies {
            if AUTH_TOKEN_PATTERN.is_match(&cookie.name) {
                self.auth_tokens
                    .insert(cookie.name.clone(), cookie.value.clone());
            }
        }
        for (key, value) in &self.local_storage {
            if AUTH_TOKEN_PATTERN.is_match(key) {
                self.auth_tokens.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Sealed session-file store rooted at one directory
pub struct SessionStore {
    dir: PathBuf,
    cipher: Aes256Gcm,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>, key: &[u8; 32]) -> Self {
        Self {
            dir: dir.into(),
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    fn file_path(&self, profile_id: &str, platform: &str) -> PathBuf {
        self.dir.join(format!("{profile_id}_{platform}.session"))
    }

    /// Seal and write one session: JSON, lz4-compressed, AES-256-GCM with
    /// the nonce prepended.
    pub async fn save(&self, profile_id: &str, data: &SessionData) -> Result<(), PersistError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let plain = serde_json::to_vec(data)?;
        let compressed = lz4_flex::compress_prepend_size(&plain);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, compressed.as_slice())
            .map_err(|e| PersistError::Crypto(e.to_string()))?;

        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&sealed);

        let path = self.file_path(profile_id, &data.platform);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load a session, returning `None` when it is missing or invalid.
    pub async fn load(
        &self,
        profile_id: &str,
        platform: &str,
        expected_fingerprint_hash: &str,
    ) -> Result<Option<SessionData>, PersistError> {
        let path = self.file_path(profile_id, platform);
        let blob = match tokio::fs::read(&path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if blob.len() < 12 {
            return Err(PersistError::SessionRejected("truncated blob".into()));
        }
        let (nonce, sealed) = blob.split_at(12);
        let compressed = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| PersistError::Crypto(e.to_string()))?;
        let plain = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| PersistError::SessionRejected(e.to_string()))?;
        let data: SessionData = serde_json::from_slice(&plain)?;

        if !data.is_valid {
            debug!(profile_id, platform, "Session marked invalid by caller");
            return Ok(None);
        }
        if Utc::now() - data.last_updated > ChronoDuration::hours(SESSION_MAX_AGE_HOURS) {
            debug!(profile_id, platform, "Session expired");
            return Ok(None);
        }
        if data.fingerprint_hash != expected_fingerprint_hash {
            warn!(
                profile_id,
                platform, "Session fingerprint hash mismatch, discarding"
            );
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Mark a stored session invalid without deleting it.
    pub async fn invalidate(&self, profile_id: &str, platform: &str) -> Result<(), PersistError> {
        let path = self.file_path(profile_id, platform);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::{SeedConstraints, Synthesizer};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_profiles(count: usize) -> Vec<Profile> {
        let mut rng = StdRng::seed_from_u64(21);
        let synth = Synthesizer::new();
        (0..count)
            .map(|_| {
                let fp = synth.generate(&SeedConstraints::default(), &mut rng);
                Profile::from_fingerprint(fp, &mut rng)
            })
            .collect()
    }

    #[tokio::test]
    async fn snapshot_round_trips_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let profiles = make_profiles(3);

        save_snapshot(&path, &profiles).await.unwrap();
        let restored = load_snapshot(&path).await.unwrap();

        assert_eq!(restored.len(), profiles.len());
        for (original, loaded) in profiles.iter().zip(restored.iter()) {
            assert_eq!(original.id, loaded.id);
            assert_eq!(original.state, loaded.state);
            assert_eq!(
                original.fingerprint.canonical_json(),
                loaded.fingerprint.canonical_json()
            );
            assert_eq!(original.success_count, loaded.success_count);
            assert_eq!(original.behavioral, loaded.behavioral);
        }
    }

    #[tokio::test]
    async fn newer_schema_versions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let snapshot = Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION + 1,
            timestamp: Utc::now(),
            profiles: Vec::new(),
        };
        tokio::fs::write(&path, serde_json::to_vec(&snapshot).unwrap())
            .await
            .unwrap();

        let err = load_snapshot(&path).await.unwrap_err();
        assert!(matches!(err, PersistError::SchemaVersion(_)));
    }

    #[tokio::test]
    async fn session_round_trips_through_seal_and_compress() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), &[7u8; 32]);

        let mut data = SessionData::new("ticketer", "abc123");
        data.cookies.push(SessionCookie {
            name: "session_token".into(),
            value: "v".repeat(500),
            domain: ".example.com".into(),
            path: "/".into(),
            expires: None,
            http_only: true,
            secure: true,
        });
        data.harvest_auth_tokens();
        store.save("p1", &data).await.unwrap();

        let loaded = store.load("p1", "ticketer", "abc123").await.unwrap().unwrap();
        assert_eq!(loaded.cookies, data.cookies);
        assert!(loaded.auth_tokens.contains_key("session_token"));
    }

    #[tokio::test]
    async fn session_rejected_on_hash_mismatch_and_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), &[9u8; 32]);

        let mut data = SessionData::new("ticketer", "hash-a");
        store.save("p2", &data).await.unwrap();
        assert!(store.load("p2", "ticketer", "hash-b").await.unwrap().is_none());

        data.last_updated = Utc::now() - ChronoDuration::hours(25);
        store.save("p2", &data).await.unwrap();
        assert!(store.load("p2", "ticketer", "hash-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_key_fails_to_unseal() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), &[1u8; 32]);
        let data = SessionData::new("ticketer", "h");
        store.save("p3", &data).await.unwrap();

        let other = SessionStore::new(dir.path(), &[2u8; 32]);
        assert!(other.load("p3", "ticketer", "h").await.is_err());
    }

    #[test]
    fn auth_tokens_detected_by_name_pattern() {
        let mut data = SessionData::new("x", "h");
        data.local_storage.insert("refresh_jwt".into(), "a".into());
        data.local_storage.insert("theme".into(), "dark".into());
        data.harvest_auth_tokens();
        assert!(data.auth_tokens.contains_key("refresh_jwt"));
        assert!(!data.auth_tokens.contains_key("theme"));
    }
}
