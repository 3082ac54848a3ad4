//! Adversary-response pattern catalog
//!
//! Compiled once; scanned against page text and response bodies. Multiple
//! matches of the same kind keep the highest-confidence pattern.

use mirage_types::DetectionKind;
use once_cell::sync::Lazy;
use regex::Regex;

/// One content pattern with its classification
pub struct ContentPattern {
    pub kind: DetectionKind,
    pub regex: Regex,
    pub confidence: f64,
    pub label: &'static str,
}

fn pattern(kind: DetectionKind, raw: &'static str, confidence: f64) -> ContentPattern {
    ContentPattern {
        kind,
        regex: Regex::new(&format!("(?i){raw}")).expect("valid detection pattern"),
        confidence,
        label: raw,
    }
}

pub static CONTENT_PATTERNS: Lazy<Vec<ContentPattern>> = Lazy::new(|| {
    use DetectionKind::*;
    vec![
        pattern(Captcha, r"captcha", 0.9),
        pattern(Captcha, r"recaptcha", 0.95),
        pattern(Captcha, r"hcaptcha", 0.95),
        pattern(Captcha, r"funcaptcha", 0.9),
        pattern(Captcha, r"arkose", 0.9),
        pattern(Captcha, r"challenge-form", 0.85),
        pattern(Cloudflare, r"cf-challenge", 0.95),
        pattern(Cloudflare, r"checking your browser", 0.9),
        pattern(Cloudflare, r"__cf_chl", 0.95),
        pattern(Cloudflare, r"cf_clearance", 0.9),
        pattern(Cloudflare, r"ray id", 0.8),
        pattern(RateLimit, r"too many requests", 0.95),
        pattern(RateLimit, r"rate limit", 0.9),
        pattern(RateLimit, r"\b429\b", 0.85),
        pattern(RateLimit, r"quota exceeded", 0.9),
        pattern(Fingerprint, r"bot detected", 0.95),
        pattern(Fingerprint, r"browser verification", 0.85),
        pattern(Fingerprint, r"suspicious activity", 0.8),
        pattern(CdpDetection, r"cdp.{0,40}detected", 0.95),
        pattern(CdpDetection, r"runtime\.enable", 0.95),
        pattern(CdpDetection, r"devtools.{0,40}detected", 0.9),
        pattern(IpBlock, r"ip.{0,20}blocked", 0.95),
        pattern(IpBlock, r"access denied", 0.8),
        pattern(IpBlock, r"forbidden", 0.7),
    ]
});

/// Console phrases that betray CDP/DevTools probing by the site.
pub static CONSOLE_PATTERNS: Lazy<Vec<ContentPattern>> = Lazy::new(|| {
    use DetectionKind::*;
    vec![
        pattern(CdpDetection, r"runtime\.enable", 0.95),
        pattern(CdpDetection, r"devtools", 0.85),
        pattern(CdpDetection, r"headless", 0.8),
        pattern(CdpDetection, r"webdriver", 0.85),
    ]
});

/// Best match per kind over `text`, highest confidence first.
pub fn scan(text: &str, patterns: &[ContentPattern]) -> Vec<(DetectionKind, f64, String)> {
    let mut best: Vec<(DetectionKind, f64, String)> = Vec::new();
    for pattern in patterns {
        if pattern.regex.is_match(text) {
            match best.iter_mut().find(|(kind, _, _)| *kind == pattern.kind) {
                Some(entry) if entry.1 < pattern.confidence => {
                    entry.1 = pattern.confidence;
                    entry.2 = pattern.label.to_string();
                }
                Some(_) => {}
                None => best.push((pattern.kind, pattern.confidence, pattern.label.to_string())),
            }
        }
    }
    best.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_types::DetectionKind;

    #[test]
    fn recaptcha_beats_generic_captcha_confidence() {
        let hits = scan(
            "<div class=\"g-recaptcha\">please solve this captcha</div>",
            &CONTENT_PATTERNS,
        );
        let captcha = hits.iter().find(|(k, _, _)| *k == DetectionKind::Captcha).unwrap();
        assert_eq!(captcha.1, 0.95);
    }

    #[test]
    fn cloudflare_challenge_text_is_detected() {
        let hits = scan("Checking your browser before accessing", &CONTENT_PATTERNS);
        assert!(hits
            .iter()
            .any(|(k, c, _)| *k == DetectionKind::Cloudflare && *c == 0.9));
    }

    #[test]
    fn plain_content_matches_nothing() {
        let hits = scan("Welcome to the ticket shop. Great seats available.", &CONTENT_PATTERNS);
        assert!(hits.is_empty());
    }

    #[test]
    fn bare_429_token_matches_rate_limit() {
        let hits = scan("Error 429: slow down", &CONTENT_PATTERNS);
        assert!(hits
            .iter()
            .any(|(k, _, _)| *k == DetectionKind::RateLimit));
        // "1429" must not match.
        let no_hits = scan("item 1429 in stock", &CONTENT_PATTERNS);
        assert!(!no_hits.iter().any(|(k, _, _)| *k == DetectionKind::RateLimit));
    }
}
