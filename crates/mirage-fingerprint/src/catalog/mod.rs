//! Read-only identity catalog
//!
//! The catalog is the closed universe the synthesizer draws from. Lookups
//! never fail: a miss at the most specific key climbs a generality ladder
//! and bottoms out at a recorded default, so an unknown seed degrades to
//! the nearest plausible identity instead of an error.

mod data;

use once_cell::sync::Lazy;

/// Catalog schema revision, bumped when table shapes change.
pub const CATALOG_VERSION: u32 = 3;

/// TLS stack family a browser belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsFamily {
    Chromium,
    Gecko,
}

/// One browser release train entry
#[derive(Debug)]
pub struct BrowserVersionEntry {
    pub major: &'static str,
    pub full_versions: &'static [&'static str],
    pub release_date: &'static str,
    /// Canonical sec-ch-ua brand sequences; empty for browsers that do not
    /// send client hints.
    pub brands: &'static [&'static [(&'static str, &'static str)]],
}

/// A supported browser with its UA templates per OS
#[derive(Debug)]
pub struct BrowserEntry {
    pub name: &'static str,
    pub family: TlsFamily,
    pub versions: &'static [BrowserVersionEntry],
    pub ua_template_windows: &'static str,
    pub ua_template_macos: &'static str,
    pub ua_template_linux: &'static str,
}

impl BrowserEntry {
    pub fn version(&self, major: &str) -> Option<&BrowserVersionEntry> {
        self.versions.iter().find(|v| v.major == major)
    }

    pub fn latest(&self) -> &BrowserVersionEntry {
        self.versions.last().unwrap_or(&self.versions[0])
    }

    pub fn sends_client_hints(&self) -> bool {
        self.versions.iter().any(|v| !v.brands.is_empty())
    }
}

/// One OS release entry
#[derive(Debug)]
pub struct OsVersionEntry {
    pub major: &'static str,
    pub builds: &'static [&'static str],
    pub nt_version: &'static str,
    /// Frozen macOS UA platform token (10_15_7 regardless of actual build)
    pub mac_platform_version: &'static str,
    pub sec_ch_ua_platform: &'static str,
    pub sec_ch_ua_platform_versions: &'static [&'static str],
}

/// A supported operating system
#[derive(Debug)]
pub struct OsEntry {
    pub name: &'static str,
    pub versions: &'static [OsVersionEntry],
    pub js_platform: &'static str,
    pub sec_ch_ua_arch: &'static str,
    pub sec_ch_ua_bitness: &'static str,
    pub sec_ch_ua_wow64: Option<&'static str>,
}

impl OsEntry {
    /// Version entry owning a concrete build string, falling back to the
    /// latest entry.
    pub fn version_for_build(&self, build: &str) -> &OsVersionEntry {
        self.versions
            .iter()
            .find(|v| v.builds.contains(&build))
            .unwrap_or_else(|| self.latest())
    }

    pub fn latest(&self) -> &OsVersionEntry {
        self.versions.last().unwrap_or(&self.versions[0])
    }
}

/// Hardware envelope for a (os, device class) pair
#[derive(Debug)]
pub struct HardwareProfile {
    pub os: &'static str,
    pub device_class: &'static str,
    pub cores: &'static [i64],
    pub memory_gb: &'static [i64],
    pub screen_resolutions: &'static [(u32, u32)],
    pub dpr: &'static [f64],
    pub color_depths: &'static [i64],
    pub gpu_classes: &'static [&'static str],
}

/// WebGL identity bundle for a (os, browser, gpu class) triple
#[derive(Debug)]
pub struct WebglBundle {
    pub os: &'static str,
    pub browser: &'static str,
    pub gpu_class: &'static str,
    pub vendors: &'static [&'static str],
    pub renderers: &'static [&'static str],
    pub extensions: &'static [&'static str],
    pub params: &'static [(&'static str, i64)],
}

/// Navigator plugin entry
#[derive(Debug)]
pub struct PluginEntry {
    pub name: &'static str,
    pub filename: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

/// The complete read-only catalog
pub struct Catalog {
    pub browsers: &'static [BrowserEntry],
    pub oses: &'static [OsEntry],
    pub hardware: &'static [HardwareProfile],
    pub webgl: &'static [WebglBundle],
    pub fonts: &'static [(&'static str, &'static [&'static str])],
    pub plugins: &'static [(&'static str, &'static [PluginEntry])],
    pub locales: &'static [(&'static str, &'static [&'static str])],
    pub timezones: &'static [(&'static str, &'static [&'static str])],
    pub locale_regions: &'static [(&'static str, &'static str)],
    pub ja3: &'static [((&'static str, &'static str, &'static str), &'static str)],
    pub webrtc_modes: &'static [&'static str],
}

static CATALOG: Lazy<Catalog> = Lazy::new(|| Catalog {
    browsers: data::BROWSERS,
    oses: data::OSES,
    hardware: data::HARDWARE_PROFILES,
    webgl: data::WEBGL_BUNDLES,
    fonts: data::FONTS,
    plugins: data::PLUGINS,
    locales: data::LOCALES,
    timezones: data::TIMEZONES,
    locale_regions: data::LOCALE_REGIONS,
    ja3: data::JA3,
    webrtc_modes: data::WEBRTC_MODES,
});

impl Catalog {
    pub fn global() -> &'static Catalog {
        &CATALOG
    }

    /// Browser by name, or the first catalog entry as the nearest fallback.
    pub fn browser(&self, name: &str) -> &BrowserEntry {
        self.browsers
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .unwrap_or(&self.browsers[0])
    }

    pub fn browser_names(&self) -> Vec<&'static str> {
        self.browsers.iter().map(|b| b.name).collect()
    }

    /// OS by name, or the first catalog entry as the nearest fallback.
    pub fn os(&self, name: &str) -> &OsEntry {
        self.oses
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
            .unwrap_or(&self.oses[0])
    }

    pub fn os_names(&self) -> Vec<&'static str> {
        self.oses.iter().map(|o| o.name).collect()
    }

    pub fn has_os(&self, name: &str) -> bool {
        self.oses.iter().any(|o| o.name.eq_ignore_ascii_case(name))
    }

    /// Hardware profile for (os, device class). Falls back to the first
    /// profile of the OS, then to the first profile overall.
    pub fn hardware_profile(&self, os: &str, device_class: &str) -> &HardwareProfile {
        self.hardware
            .iter()
            .find(|h| h.os == os && h.device_class == device_class)
            .or_else(|| self.hardware.iter().find(|h| h.os == os))
            .unwrap_or(&self.hardware[0])
    }

    pub fn device_classes(&self, os: &str) -> Vec<&'static str> {
        self.hardware
            .iter()
            .filter(|h| h.os == os)
            .map(|h| h.device_class)
            .collect()
    }

    /// WebGL bundle ladder: (os, browser, gpu) → (os, Chrome, gpu) →
    /// (Windows, browser, gpu) → any bundle for the gpu class → first
    /// bundle.
    pub fn webgl_bundle(&self, os: &str, browser: &str, gpu_class: &str) -> &WebglBundle {
        self.webgl
            .iter()
            .find(|w| w.os == os && w.browser == browser && w.gpu_class == gpu_class)
            .or_else(|| {
                self.webgl
                    .iter()
                    .find(|w| w.os == os && w.browser == "Chrome" && w.gpu_class == gpu_class)
            })
            .or_else(|| {
                self.webgl
                    .iter()
                    .find(|w| w.os == "Windows" && w.browser == browser && w.gpu_class == gpu_class)
            })
            .or_else(|| self.webgl.iter().find(|w| w.gpu_class == gpu_class))
            .unwrap_or(&self.webgl[0])
    }

    /// All bundles eligible for the hardware profile of (os, device class).
    pub fn webgl_bundles_for_device(
        &self,
        os: &str,
        browser: &str,
        device_class: &str,
    ) -> Vec<&WebglBundle> {
        let profile = self.hardware_profile(os, device_class);
        profile
            .gpu_classes
            .iter()
            .map(|gc| self.webgl_bundle(os, browser, gc))
            .collect()
    }

    pub fn fonts_for_os(&self, os: &str) -> &'static [&'static str] {
        self.fonts
            .iter()
            .find(|(o, _)| *o == os)
            .map(|(_, f)| *f)
            .unwrap_or(self.fonts[0].1)
    }

    pub fn plugins_for(&self, browser: &str) -> &'static [PluginEntry] {
        self.plugins
            .iter()
            .find(|(b, _)| b.eq_ignore_ascii_case(browser))
            .map(|(_, p)| *p)
            .unwrap_or(self.plugins[0].1)
    }

    pub fn locales_for_language(&self, lang_prefix: &str) -> &'static [&'static str] {
        self.locales
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(lang_prefix))
            .map(|(_, locs)| *locs)
            .unwrap_or(self.locales[0].1)
    }

    pub fn all_locales(&self) -> Vec<&'static str> {
        self.locales.iter().flat_map(|(_, l)| l.iter().copied()).collect()
    }

    /// Timezone cluster the locale's geography implies.
    pub fn timezones_for_locale(&self, locale: &str) -> &'static [&'static str] {
        let region = self
            .locale_regions
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(locale))
            .map(|(_, r)| *r)
            .unwrap_or("Europe");
        self.timezones
            .iter()
            .find(|(r, _)| *r == region)
            .map(|(_, tzs)| *tzs)
            .unwrap_or(self.timezones[0].1)
    }

    /// JA3 ladder: (browser, major, os) → (browser, any version, os) →
    /// (browser, any) → recorded default.
    pub fn ja3(&self, browser: &str, major: &str, os: &str) -> &'static str {
        if let Some((_, ja3)) = self
            .ja3
            .iter()
            .find(|((b, m, o), _)| *b == browser && *m == major && *o == os)
        {
            return ja3;
        }
        if let Some((_, ja3)) = self.ja3.iter().find(|((b, _, o), _)| *b == browser && *o == os) {
            return ja3;
        }
        if let Some((_, ja3)) = self.ja3.iter().find(|((b, _, _), _)| *b == browser) {
            return ja3;
        }
        data::DEFAULT_JA3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_browser_falls_back_to_first_entry() {
        let catalog = Catalog::global();
        assert_eq!(catalog.browser("Netscape").name, catalog.browsers[0].name);
    }

    #[test]
    fn ja3_ladder_climbs_to_default() {
        let catalog = Catalog::global();
        // Exact hit
        let exact = catalog.ja3("Chrome", "126", "Windows");
        assert!(exact.starts_with("771,"));
        // Version miss, same browser/os
        let version_miss = catalog.ja3("Chrome", "999", "Windows");
        assert!(version_miss.starts_with("771,"));
        // OS miss, same browser
        let os_miss = catalog.ja3("Firefox", "999", "FreeBSD");
        assert!(os_miss.starts_with("771,"));
        // Full miss
        let full_miss = catalog.ja3("Lynx", "1", "Plan9");
        assert_eq!(full_miss, data::DEFAULT_JA3);
    }

    #[test]
    fn every_hardware_gpu_class_has_a_webgl_bundle() {
        let catalog = Catalog::global();
        for hw in catalog.hardware {
            for gpu_class in hw.gpu_classes {
                let bundle = catalog.webgl_bundle(hw.os, "Chrome", gpu_class);
                assert!(
                    !bundle.renderers.is_empty(),
                    "no renderers for {} / {}",
                    hw.os,
                    gpu_class
                );
            }
        }
    }

    #[test]
    fn locale_regions_cover_every_catalog_locale() {
        let catalog = Catalog::global();
        for locale in catalog.all_locales() {
            let tzs = catalog.timezones_for_locale(locale);
            assert!(!tzs.is_empty());
        }
    }

    #[test]
    fn chrome_sends_client_hints_firefox_does_not() {
        let catalog = Catalog::global();
        assert!(catalog.browser("Chrome").sends_client_hints());
        assert!(!catalog.browser("Firefox").sends_client_hints());
    }
}
