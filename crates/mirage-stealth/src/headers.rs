//! Outbound header discipline
//!
//! Header ORDER is itself a fingerprint: Chrome and Firefox emit their
//! request headers in distinct, fixed sequences, and automation stacks
//! betray themselves both by extra headers and by alphabetized ordering.
//! The plan removes driver artifacts, emits the browser-correct sequence
//! derived from the fingerprint, and shuffles only the tail headers real
//! browsers vary.

use mirage_types::{ComponentName, Fingerprint};
use rand::seq::SliceRandom;
use rand::Rng;

/// Headers the driver or its transport adds that no real browser sends.
const DRIVER_HEADERS: &[&str] = &[
    "x-devtools-emulate-network-conditions-client-id",
    "x-devtools-request-id",
    "headless",
    "x-headless",
];

/// Chrome's fixed header emission order for document requests.
const CHROME_ORDER: &[&str] = &[
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-platform",
    "upgrade-insecure-requests",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-user",
    "sec-fetch-dest",
    "accept-encoding",
    "accept-language",
];

/// Firefox's fixed header emission order.
const FIREFOX_ORDER: &[&str] = &[
    "user-agent",
    "accept",
    "accept-language",
    "accept-encoding",
    "dnt",
    "upgrade-insecure-requests",
    "sec-fetch-dest",
    "sec-fetch-mode",
    "sec-fetch-site",
    "sec-fetch-user",
];

/// A rendered header configuration for one context
#[derive(Debug, Clone)]
pub struct HeaderPlan {
    /// Headers to strip before the request leaves
    pub remove: Vec<&'static str>,

    /// Headers in emission order
    pub ordered: Vec<(String, String)>,
}

impl HeaderPlan {
    /// Build the header plan implied by a fingerprint.
    pub fn for_fingerprint<R: Rng + ?Sized>(fingerprint: &Fingerprint, rng: &mut R) -> Self {
        let browser = fingerprint.browser_name().unwrap_or("Chrome");
        let chrome_like = !browser.eq_ignore_ascii_case("Firefox");
        let order = if chrome_like { CHROME_ORDER } else { FIREFOX_ORDER };

        let mut ordered = Vec::new();
        for name in order {
            if let Some(value) = header_value(fingerprint, name, chrome_like) {
                ordered.push((name.to_string(), value));
            }
        }

        // Client-hint extras real Chrome appends in varying order.
        if chrome_like {
            let mut extras: Vec<(&ComponentName, &str)> = vec![
                (&ComponentName::SecChUaFullVersionList, "sec-ch-ua-full-version-list"),
                (&ComponentName::SecChUaArch, "sec-ch-ua-arch"),
                (&ComponentName::SecChUaBitness, "sec-ch-ua-bitness"),
                (&ComponentName::SecChUaModel, "sec-ch-ua-model"),
                (&ComponentName::SecChUaPlatformVersion, "sec-ch-ua-platform-version"),
                (&ComponentName::SecChUaWow64, "sec-ch-ua-wow64"),
            ];
            extras.shuffle(rng);
            for (component, header) in extras {
                if let Some(value) = fingerprint.str_value(*component) {
                    if !value.is_empty() {
                        ordered.push((header.to_string(), value.to_string()));
                    }
                }
            }
        }

        Self {
            remove: DRIVER_HEADERS.to_vec(),
            ordered,
        }
    }

    /// Position of a header in the plan, for order assertions.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.ordered.iter().position(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.ordered
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

fn header_value(fingerprint: &Fingerprint, name: &str, chrome_like: bool) -> Option<String> {
    match name {
        "user-agent" => fingerprint.user_agent().map(|s| s.to_string()),
        "accept" => Some(if chrome_like {
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7".to_string()
        } else {
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string()
        }),
        "accept-language" => Some(accept_language(fingerprint)),
        "accept-encoding" => Some(if chrome_like {
            "gzip, deflate, br, zstd".to_string()
        } else {
            "gzip, deflate, br".to_string()
        }),
        "upgrade-insecure-requests" => Some("1".to_string()),
        "dnt" => None,
        "sec-fetch-site" => Some("none".to_string()),
        "sec-fetch-mode" => Some("navigate".to_string()),
        "sec-fetch-user" => Some("?1".to_string()),
        "sec-fetch-dest" => Some("document".to_string()),
        "sec-ch-ua" => fingerprint
            .str_value(ComponentName::SecChUa)
            .filter(|v| !v.is_empty())
            .map(|s| s.to_string()),
        "sec-ch-ua-mobile" => fingerprint
            .str_value(ComponentName::SecChUaMobile)
            .map(|s| s.to_string()),
        "sec-ch-ua-platform" => fingerprint
            .str_value(ComponentName::SecChUaPlatform)
            .map(|s| s.to_string()),
        _ => None,
    }
}

/// Accept-Language with descending q-values over the profile languages.
fn accept_language(fingerprint: &Fingerprint) -> String {
    let languages = fingerprint.languages().unwrap_or(&[]);
    if languages.is_empty() {
        return "en-US,en;q=0.9".to_string();
    }
    let mut parts = Vec::new();
    let mut q = 10u32;
    for (i, lang) in languages.iter().enumerate() {
        if i == 0 {
            parts.push(lang.clone());
            // The bare language code follows the first full locale.
            if let Some(prefix) = lang.split('-').next() {
                if prefix != lang {
                    q -= 1;
                    parts.push(format!("{prefix};q=0.{q}"));
                }
            }
        } else {
            q -= 1;
            parts.push(format!("{lang};q=0.{q}"));
        }
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_fingerprint::{SeedConstraints, Synthesizer};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fp(browser: &str) -> Fingerprint {
        let mut rng = StdRng::seed_from_u64(17);
        Synthesizer::new().generate(
            &SeedConstraints::default().os("Windows").browser(browser),
            &mut rng,
        )
    }

    #[test]
    fn chrome_plan_orders_client_hints_before_user_agent() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = HeaderPlan::for_fingerprint(&fp("Chrome"), &mut rng);
        assert!(plan.position("sec-ch-ua").unwrap() < plan.position("user-agent").unwrap());
        assert!(plan.position("accept-language").unwrap() > plan.position("accept").unwrap());
    }

    #[test]
    fn firefox_plan_has_no_client_hints() {
        let mut rng = StdRng::seed_from_u64(2);
        let plan = HeaderPlan::for_fingerprint(&fp("Firefox"), &mut rng);
        assert!(plan.position("sec-ch-ua").is_none());
        assert_eq!(plan.position("user-agent"), Some(0));
    }

    #[test]
    fn accept_language_leads_with_profile_locale() {
        let mut rng = StdRng::seed_from_u64(3);
        let fingerprint = fp("Chrome");
        let plan = HeaderPlan::for_fingerprint(&fingerprint, &mut rng);
        let value = plan.get("accept-language").unwrap();
        assert!(value.starts_with(fingerprint.locale().unwrap()));
    }

    #[test]
    fn driver_headers_are_removed() {
        let mut rng = StdRng::seed_from_u64(4);
        let plan = HeaderPlan::for_fingerprint(&fp("Chrome"), &mut rng);
        assert!(plan
            .remove
            .contains(&"x-devtools-emulate-network-conditions-client-id"));
    }
}
