//! TLS profile catalog and rotator
//!
//! A TLS profile captures the ClientHello shape (ciphers, extensions,
//! curves, ALPN, HTTP/2 settings, signature algorithms) of one browser
//! build on one OS. Per session the rotator enhances a base profile with
//! GREASE values and archetype-respecting shuffles; the enhancement is
//! cached so a context keeps one stable TLS identity across its requests.

use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

/// TLS stack family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserArchetype {
    Chromium,
    Gecko,
}

impl BrowserArchetype {
    pub fn from_browser(name: &str) -> Self {
        if name.eq_ignore_ascii_case("firefox") {
            BrowserArchetype::Gecko
        } else {
            BrowserArchetype::Chromium
        }
    }
}

/// HTTP/2 priority frame parameters
#[derive(Debug, Clone, PartialEq)]
pub struct H2Priority {
    pub stream_dependency: u32,
    pub exclusive: bool,
    pub weight: u8,
}

/// One complete TLS ClientHello shape
#[derive(Debug, Clone)]
pub struct TlsProfile {
    pub name: String,
    pub browser: String,
    pub major: String,
    pub os: String,
    pub popularity: f64,
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<u16>,
    pub curves: Vec<u16>,
    pub curve_formats: Vec<u8>,
    pub alpn: Vec<String>,
    pub h2_settings: Vec<(&'static str, u32)>,
    pub h2_priority: H2Priority,
    pub signature_algorithms: Vec<u16>,
}

impl TlsProfile {
    pub fn archetype(&self) -> BrowserArchetype {
        BrowserArchetype::from_browser(&self.browser)
    }

    /// JA3: TLSVersion,Ciphers,Extensions,Curves,CurveFormats
    pub fn ja3_string(&self) -> String {
        let join = |values: &[u16]| {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("-")
        };
        format!(
            "771,{},{},{},{}",
            join(&self.cipher_suites),
            join(&self.extensions),
            join(&self.curves),
            self.curve_formats
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("-"),
        )
    }
}

/// Reserved GREASE values (RFC 8701).
const GREASE_VALUES: [u16; 16] = [
    0x0a0a, 0x1a1a, 0x2a2a, 0x3a3a, 0x4a4a, 0x5a5a, 0x6a6a, 0x7a7a, 0x8a8a, 0x9a9a, 0xaaaa,
    0xbaba, 0xcaca, 0xdada, 0xeaea, 0xfafa,
];

pub fn is_grease(value: u16) -> bool {
    GREASE_VALUES.contains(&value)
}

fn chrome_profile(major: &str, os: &str, popularity: f64) -> TlsProfile {
    TlsProfile {
        name: format!("chrome_{major}_{}", os.to_ascii_lowercase()),
        browser: "Chrome".into(),
        major: major.into(),
        os: os.into(),
        popularity,
        cipher_suites: vec![
            4865, 4866, 4867, 49195, 49199, 49196, 49200, 52393, 52392, 49171, 49172, 156, 157,
            47, 53,
        ],
        extensions: vec![
            0, 23, 65281, 10, 11, 35, 16, 5, 13, 18, 51, 45, 43, 27, 17513, 21,
        ],
        curves: vec![29, 23, 24],
        curve_formats: vec![0],
        alpn: vec!["h2".into(), "http/1.1".into()],
        h2_settings: vec![
            ("HEADER_TABLE_SIZE", 65536),
            ("ENABLE_PUSH", 0),
            ("INITIAL_WINDOW_SIZE", 6_291_456),
            ("MAX_HEADER_LIST_SIZE", 262_144),
        ],
        h2_priority: H2Priority {
            stream_dependency: 0,
            exclusive: true,
            weight: 255,
        },
        signature_algorithms: vec![
            0x0403, 0x0804, 0x0401, 0x0503, 0x0805, 0x0501, 0x0806, 0x0601,
        ],
    }
}

fn firefox_profile(major: &str, os: &str, popularity: f64) -> TlsProfile {
    TlsProfile {
        name: format!("firefox_{major}_{}", os.to_ascii_lowercase()),
        browser: "Firefox".into(),
        major: major.into(),
        os: os.into(),
        popularity,
        cipher_suites: vec![
            4865, 4867, 4866, 49195, 49199, 52393, 52392, 49196, 49200, 49162, 49161, 49171,
            49172, 156, 157, 47, 53,
        ],
        extensions: vec![
            0, 23, 65281, 10, 11, 35, 16, 5, 34, 51, 43, 13, 45, 28,
        ],
        curves: vec![29, 23, 24, 25, 256, 257],
        curve_formats: vec![0],
        alpn: vec!["h2".into(), "http/1.1".into()],
        h2_settings: vec![
            ("HEADER_TABLE_SIZE", 65536),
            ("INITIAL_WINDOW_SIZE", 131_072),
            ("MAX_FRAME_SIZE", 16_384),
        ],
        h2_priority: H2Priority {
            stream_dependency: 13,
            exclusive: false,
            weight: 42,
        },
        signature_algorithms: vec![
            0x0403, 0x0503, 0x0603, 0x0804, 0x0805, 0x0806, 0x0401, 0x0501, 0x0601, 0x0203,
            0x0201,
        ],
    }
}

struct UsageRecord {
    times_used: u64,
    last_used: Option<Instant>,
}

/// Rotator over the base catalog with per-session enhancement caching
pub struct TlsRotator {
    profiles: Vec<TlsProfile>,
    usage: Mutex<Vec<UsageRecord>>,
    session_cache: DashMap<String, TlsProfile>,
}

impl Default for TlsRotator {
    fn default() -> Self {
        Self::new()
    }
}

impl TlsRotator {
    pub fn new() -> Self {
        let profiles = vec![
            chrome_profile("126", "Windows", 1.0),
            chrome_profile("127", "Windows", 0.9),
            chrome_profile("126", "macOS", 0.6),
            chrome_profile("126", "Linux", 0.3),
            firefox_profile("127", "Windows", 0.35),
            firefox_profile("128", "Windows", 0.4),
            firefox_profile("128", "Linux", 0.2),
        ];
        let usage = profiles
            .iter()
            .map(|_| UsageRecord {
                times_used: 0,
                last_used: None,
            })
            .collect();
        Self {
            profiles,
            usage: Mutex::new(usage),
            session_cache: DashMap::new(),
        }
    }

    /// Session-stable enhanced profile for a browser identity. The same
    /// `session_id` always receives the identical enhancement, so a
    /// context's TLS shape does not drift between its requests.
    pub fn get_profile<R: Rng + ?Sized>(
        &self,
        session_id: &str,
        browser: &str,
        major: &str,
        os: &str,
        rng: &mut R,
    ) -> TlsProfile {
        if let Some(cached) = self.session_cache.get(session_id) {
            return cached.clone();
        }
        let index = self.lookup(browser, major, os, rng);
        {
            let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
            usage[index].times_used += 1;
            usage[index].last_used = Some(Instant::now());
        }
        let enhanced = self.enhance(&self.profiles[index], rng);
        self.session_cache
            .insert(session_id.to_string(), enhanced.clone());
        debug!(session_id, profile = %enhanced.name, "TLS profile bound");
        enhanced
    }

    /// Pick from the least-recently-used half, weighted by popularity.
    pub fn rotate<R: Rng + ?Sized>(&self, rng: &mut R) -> TlsProfile {
        let mut order: Vec<usize> = (0..self.profiles.len()).collect();
        {
            let usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
            order.sort_by_key(|i| usage[*i].last_used);
        }
        let half = &order[..(order.len() / 2).max(1)];
        let index = *pick_weighted(half, |i| self.profiles[*i].popularity, rng);
        {
            let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
            usage[index].times_used += 1;
            usage[index].last_used = Some(Instant::now());
        }
        self.enhance(&self.profiles[index], rng)
    }

    pub fn forget_session(&self, session_id: &str) {
        self.session_cache.remove(session_id);
    }

    /// Catalog lookup ladder: exact (browser, major, os), then (browser,
    /// os), then (browser), finally popularity-weighted default.
    fn lookup<R: Rng + ?Sized>(&self, browser: &str, major: &str, os: &str, rng: &mut R) -> usize {
        let find = |pred: &dyn Fn(&TlsProfile) -> bool| {
            self.profiles.iter().position(|p| pred(p))
        };
        if let Some(i) = find(&|p| {
            p.browser.eq_ignore_ascii_case(browser) && p.major == major && p.os == os
        }) {
            return i;
        }
        if let Some(i) = find(&|p| p.browser.eq_ignore_ascii_case(browser) && p.os == os) {
            return i;
        }
        if let Some(i) = find(&|p| p.browser.eq_ignore_ascii_case(browser)) {
            return i;
        }
        let all: Vec<usize> = (0..self.profiles.len()).collect();
        *pick_weighted(&all, |i| self.profiles[*i].popularity, rng)
    }

    /// Per-session profile enhancement: GREASE insertion, archetype
    /// cipher shuffling, Chromium curve shuffle, signature reordering.
    fn enhance<R: Rng + ?Sized>(&self, base: &TlsProfile, rng: &mut R) -> TlsProfile {
        let mut profile = base.clone();
        let archetype = profile.archetype();

        profile.cipher_suites = shuffle_cipher_groups(&profile.cipher_suites, rng);
        profile.extensions = insert_grease(&profile.extensions, rng);
        if archetype == BrowserArchetype::Chromium {
            // Chromium shuffles named-group order per session; keep the
            // preferred first group in place.
            if profile.curves.len() > 2 {
                let tail = &mut profile.curves[1..];
                tail.shuffle(rng);
            }
        }
        profile.signature_algorithms = shuffle_within_families(&profile.signature_algorithms, rng);
        profile
    }
}

fn pick_weighted<'a, T, R: Rng + ?Sized>(
    items: &'a [T],
    weight: impl Fn(&T) -> f64,
    rng: &mut R,
) -> &'a T {
    let total: f64 = items.iter().map(&weight).sum();
    if total <= 0.0 {
        return &items[0];
    }
    let mut target = rng.gen_range(0.0..total);
    for item in items {
        target -= weight(item);
        if target <= 0.0 {
            return item;
        }
    }
    &items[items.len() - 1]
}

/// Insert two or three GREASE values at the documented positions: head
/// (index 1-3), 40-60% and optionally 80-90% of the list length.
fn insert_grease<R: Rng + ?Sized>(extensions: &[u16], rng: &mut R) -> Vec<u16> {
    let mut out: Vec<u16> = extensions.iter().copied().filter(|e| !is_grease(*e)).collect();
    let mut values: Vec<u16> = GREASE_VALUES.to_vec();
    values.shuffle(rng);

    let len = out.len();
    let mut positions = vec![
        rng.gen_range(1..=3usize.min(len)),
        (len as f64 * rng.gen_range(0.4..0.6)) as usize,
    ];
    if rng.gen_bool(0.5) {
        positions.push((len as f64 * rng.gen_range(0.8..0.9)) as usize);
    }
    positions.sort_unstable();
    // Insert back-to-front so earlier positions stay valid.
    for (offset, pos) in positions.iter().enumerate().rev() {
        out.insert((*pos).min(out.len()), values[offset]);
    }
    out
}

/// Shuffle cipher suites inside their strength groups: TLS 1.3 suites
/// stay in front, the ECDHE block shuffles internally, legacy suites
/// keep their tail positions.
fn shuffle_cipher_groups<R: Rng + ?Sized>(ciphers: &[u16], rng: &mut R) -> Vec<u16> {
    let is_tls13 = |c: u16| (4865..=4869).contains(&c);
    let is_ecdhe = |c: u16| (49152..=52399).contains(&c);

    let tls13: Vec<u16> = ciphers.iter().copied().filter(|c| is_tls13(*c)).collect();
    let mut ecdhe: Vec<u16> = ciphers.iter().copied().filter(|c| is_ecdhe(*c)).collect();
    let legacy: Vec<u16> = ciphers
        .iter()
        .copied()
        .filter(|c| !is_tls13(*c) && !is_ecdhe(*c))
        .collect();

    ecdhe.shuffle(rng);
    let mut out = tls13;
    out.extend(ecdhe);
    out.extend(legacy);
    out
}

/// Reorder signature algorithms only within their hash family (high
/// byte), preserving family order.
fn shuffle_within_families<R: Rng + ?Sized>(algorithms: &[u16], rng: &mut R) -> Vec<u16> {
    let mut out = Vec::with_capacity(algorithms.len());
    let mut i = 0;
    while i < algorithms.len() {
        let family = algorithms[i] >> 8;
        let mut group: Vec<u16> = Vec::new();
        while i < algorithms.len() && (algorithms[i] >> 8) == family {
            group.push(algorithms[i]);
            i += 1;
        }
        group.shuffle(rng);
        out.extend(group);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn same_session_gets_identical_profile() {
        let rotator = TlsRotator::new();
        let a = rotator.get_profile("s1", "Chrome", "126", "Windows", &mut rng(1));
        let b = rotator.get_profile("s1", "Chrome", "126", "Windows", &mut rng(999));
        assert_eq!(a.ja3_string(), b.ja3_string());
    }

    #[test]
    fn different_sessions_usually_differ() {
        let rotator = TlsRotator::new();
        let mut r = rng(7);
        let signatures: HashSet<String> = (0..10)
            .map(|i| {
                rotator
                    .get_profile(&format!("s{i}"), "Chrome", "126", "Windows", &mut r)
                    .ja3_string()
            })
            .collect();
        assert!(signatures.len() > 1);
    }

    #[test]
    fn grease_inserted_at_documented_positions() {
        let base = chrome_profile("126", "Windows", 1.0);
        for seed in 0..50 {
            let enhanced = insert_grease(&base.extensions, &mut rng(seed));
            let grease_positions: Vec<usize> = enhanced
                .iter()
                .enumerate()
                .filter(|(_, v)| is_grease(**v))
                .map(|(i, _)| i)
                .collect();
            assert!(grease_positions.len() >= 2 && grease_positions.len() <= 3);
            assert!(grease_positions[0] <= 3, "head grease at {grease_positions:?}");
        }
    }

    #[test]
    fn cipher_shuffle_keeps_tls13_in_front() {
        let base = chrome_profile("126", "Windows", 1.0);
        let shuffled = shuffle_cipher_groups(&base.cipher_suites, &mut rng(3));
        assert_eq!(&shuffled[..3], &[4865, 4866, 4867]);
        assert_eq!(
            shuffled.iter().collect::<HashSet<_>>(),
            base.cipher_suites.iter().collect::<HashSet<_>>()
        );
    }

    #[test]
    fn gecko_curves_are_never_shuffled() {
        let rotator = TlsRotator::new();
        let profile = rotator.get_profile("fx", "Firefox", "128", "Windows", &mut rng(4));
        assert_eq!(profile.curves, vec![29, 23, 24, 25, 256, 257]);
    }

    #[test]
    fn lookup_ladder_falls_back_by_browser() {
        let rotator = TlsRotator::new();
        // No Firefox/macOS entry exists; browser-level fallback applies.
        let profile = rotator.get_profile("m", "Firefox", "999", "macOS", &mut rng(5));
        assert_eq!(profile.browser, "Firefox");
    }

    #[test]
    fn signature_families_preserve_relative_order() {
        let algorithms = vec![0x0403, 0x0401, 0x0503, 0x0501, 0x0601];
        let shuffled = shuffle_within_families(&algorithms, &mut rng(6));
        let families: Vec<u16> = shuffled.iter().map(|a| a >> 8).collect();
        assert_eq!(families, vec![4, 4, 5, 5, 6]);
    }
}
