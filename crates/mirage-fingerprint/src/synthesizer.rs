//! Fingerprint synthesis and the consistency pass
//!
//! Synthesis is top-down: primary identity (OS, device class, browser) is
//! chosen first and everything else is derived from it against the
//! catalog. The consistency pass re-walks the same order and regenerates
//! any component that is missing or violates the constraint implied by its
//! already-resolved parents; running it twice changes nothing.

use mirage_types::{
    ComponentName, ComponentValue, Fingerprint, FingerprintComponent, RESOLUTION_ORDER,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

use crate::catalog::{Catalog, TlsFamily, WebglBundle};

/// Optional constraints for `generate`
#[derive(Debug, Clone, Default)]
pub struct SeedConstraints {
    pub os_name: Option<String>,
    pub browser_name: Option<String>,
    pub device_class: Option<String>,
    pub locale: Option<String>,
}

impl SeedConstraints {
    pub fn os(mut self, os: impl Into<String>) -> Self {
        self.os_name = Some(os.into());
        self
    }

    pub fn browser(mut self, browser: impl Into<String>) -> Self {
        self.browser_name = Some(browser.into());
        self
    }

    pub fn device_class(mut self, dc: impl Into<String>) -> Self {
        self.device_class = Some(dc.into());
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// Per-component mutation weight used at synthesis time.
fn mutation_weight(name: ComponentName) -> f64 {
    use ComponentName::*;
    match name {
        OsName => 0.02,
        OsVersion => 0.2,
        DeviceClass => 0.05,
        BrowserName => 0.05,
        BrowserVersion => 0.7,
        JsPlatform => 0.0,
        HardwareConcurrency | DeviceMemory => 0.02,
        ScreenResolution | ViewportDimensions => 0.1,
        ColorDepth | DevicePixelRatio => 0.05,
        UserAgent => 0.0,
        SecChUa | SecChUaFullVersionList | SecChUaPlatform | SecChUaPlatformVersion
        | SecChUaWow64 => 0.0,
        SecChUaMobile | SecChUaArch | SecChUaBitness | SecChUaModel => 0.01,
        WebglVendor => 0.3,
        WebglRenderer => 0.4,
        WebglExtensions => 0.1,
        WebglParams => 0.05,
        FontsList => 0.05,
        PluginsList => 0.01,
        CanvasParams => 0.2,
        AudioContextParams => 0.1,
        Locale | Timezone | Languages => 0.05,
        TlsJa3 => 0.1,
        WebrtcIpHandlingMode => 0.02,
        BatteryStatus => 0.05,
    }
}

/// Declared dependency edges, mirrored from the component table.
fn dependencies(name: ComponentName) -> &'static [ComponentName] {
    use ComponentName::*;
    match name {
        OsName | BrowserName => &[],
        OsVersion => &[OsName],
        DeviceClass => &[OsName],
        BrowserVersion => &[BrowserName],
        JsPlatform => &[OsName],
        HardwareConcurrency | DeviceMemory | ColorDepth => &[OsName, DeviceClass],
        ScreenResolution => &[OsName, DeviceClass],
        ViewportDimensions => &[ScreenResolution, OsName, BrowserName],
        DevicePixelRatio => &[OsName, DeviceClass, ScreenResolution],
        UserAgent => &[BrowserName, BrowserVersion, OsName, OsVersion],
        SecChUa | SecChUaFullVersionList => &[BrowserName, BrowserVersion],
        SecChUaPlatform => &[OsName],
        SecChUaPlatformVersion => &[OsName, OsVersion],
        SecChUaMobile => &[DeviceClass],
        SecChUaArch | SecChUaBitness => &[OsName],
        SecChUaModel => &[DeviceClass],
        SecChUaWow64 => &[OsName, SecChUaArch],
        WebglVendor => &[OsName, BrowserName, DeviceClass],
        WebglRenderer => &[WebglVendor, OsName, BrowserName, DeviceClass],
        WebglExtensions | WebglParams => &[WebglRenderer],
        FontsList => &[OsName],
        PluginsList => &[OsName, BrowserName],
        CanvasParams | AudioContextParams => &[],
        Locale => &[],
        Timezone => &[Locale],
        Languages => &[Locale],
        TlsJa3 => &[BrowserName, BrowserVersion, OsName],
        WebrtcIpHandlingMode => &[],
        BatteryStatus => &[DeviceClass],
    }
}

/// Fingerprint synthesizer over the static catalog
#[derive(Clone, Copy)]
pub struct Synthesizer {
    catalog: &'static Catalog,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::global(),
        }
    }

    pub fn catalog(&self) -> &'static Catalog {
        self.catalog
    }

    /// Synthesize a fresh fingerprint honoring the seed where the catalog
    /// can, falling back to the nearest entry where it cannot.
    pub fn generate<R: Rng + ?Sized>(&self, seed: &SeedConstraints, rng: &mut R) -> Fingerprint {
        let mut fp = Fingerprint::new();
        for name in RESOLUTION_ORDER {
            let value = self.plausible_value(*name, &fp, Some(seed), rng);
            fp.insert(FingerprintComponent::new(
                *name,
                value,
                dependencies(*name),
                mutation_weight(*name),
            ));
        }
        self.consistency_pass(&mut fp, rng);
        fp
    }

    /// Regenerate every component that is absent or violates its parents'
    /// catalog constraint, in topological order. Idempotent: a freshly
    /// regenerated value always passes its own check.
    pub fn consistency_pass<R: Rng + ?Sized>(&self, fp: &mut Fingerprint, rng: &mut R) {
        for name in RESOLUTION_ORDER {
            let needs_regen = match fp.value(*name) {
                None => true,
                Some(_) => !self.is_consistent(*name, fp),
            };
            if needs_regen {
                let value = self.plausible_value(*name, fp, None, rng);
                if fp.contains(*name) {
                    fp.apply(*name, value);
                } else {
                    fp.insert(FingerprintComponent::new(
                        *name,
                        value,
                        dependencies(*name),
                        mutation_weight(*name),
                    ));
                }
            }
        }
    }

    /// Produce a new in-distribution value for one component given the
    /// rest of the fingerprint. The input fingerprint is not modified.
    pub fn plausible_value<R: Rng + ?Sized>(
        &self,
        name: ComponentName,
        fp: &Fingerprint,
        hints: Option<&SeedConstraints>,
        rng: &mut R,
    ) -> ComponentValue {
        use ComponentName::*;

        let os_name = hints
            .and_then(|h| h.os_name.as_deref())
            .or_else(|| fp.os_name())
            .map(|n| self.catalog.os(n).name)
            .unwrap_or_else(|| *self.catalog.os_names().choose(rng).unwrap_or(&"Windows"));
        let browser_name = hints
            .and_then(|h| h.browser_name.as_deref())
            .or_else(|| fp.browser_name())
            .map(|n| self.catalog.browser(n).name)
            .unwrap_or_else(|| *self.catalog.browser_names().choose(rng).unwrap_or(&"Chrome"));
        let device_class = hints
            .and_then(|h| h.device_class.as_deref())
            .or_else(|| fp.device_class())
            .unwrap_or("mid_range_laptop");
        let browser_version = fp.browser_version().unwrap_or("126.0.6478.56").to_string();
        let os_version = fp
            .str_value(OsVersion)
            .unwrap_or("10.0.19045")
            .to_string();

        match name {
            OsName => ComponentValue::Str(os_name.to_string()),
            OsVersion => ComponentValue::Str(self.gen_os_version(os_name, Some(&os_version), rng)),
            DeviceClass => {
                let classes = self.catalog.device_classes(os_name);
                let value = if classes.iter().any(|c| *c == device_class) {
                    device_class.to_string()
                } else {
                    classes
                        .choose(rng)
                        .copied()
                        .unwrap_or("mid_range_laptop")
                        .to_string()
                };
                ComponentValue::Str(value)
            }
            BrowserName => ComponentValue::Str(browser_name.to_string()),
            BrowserVersion => {
                ComponentValue::Str(self.gen_browser_version(browser_name, Some(&browser_version), rng))
            }
            JsPlatform => ComponentValue::Str(self.catalog.os(os_name).js_platform.to_string()),
            HardwareConcurrency => {
                let hw = self.catalog.hardware_profile(os_name, device_class);
                ComponentValue::Int(*hw.cores.choose(rng).unwrap_or(&8))
            }
            DeviceMemory => {
                let hw = self.catalog.hardware_profile(os_name, device_class);
                let actual = *hw.memory_gb.choose(rng).unwrap_or(&8);
                ComponentValue::Int(exposed_device_memory(actual))
            }
            ScreenResolution => {
                let hw = self.catalog.hardware_profile(os_name, device_class);
                let (w, h) = *hw.screen_resolutions.choose(rng).unwrap_or(&(1920, 1080));
                ComponentValue::Dims(w, h)
            }
            ViewportDimensions => {
                let screen = fp.screen_resolution().unwrap_or((1920, 1080));
                let (w, h) = self.gen_viewport(screen, os_name, browser_name, rng);
                ComponentValue::Dims(w, h)
            }
            ColorDepth => {
                let hw = self.catalog.hardware_profile(os_name, device_class);
                ComponentValue::Int(*hw.color_depths.choose(rng).unwrap_or(&24))
            }
            DevicePixelRatio => {
                let hw = self.catalog.hardware_profile(os_name, device_class);
                ComponentValue::Float(*hw.dpr.choose(rng).unwrap_or(&1.0))
            }
            UserAgent => ComponentValue::Str(self.derive_user_agent(
                browser_name,
                &browser_version,
                os_name,
                &os_version,
            )),
            SecChUa => ComponentValue::Str(self.gen_sec_ch_ua(browser_name, &browser_version, rng)),
            SecChUaFullVersionList => ComponentValue::Str(self.gen_sec_ch_ua_full_version_list(
                browser_name,
                &browser_version,
                rng,
            )),
            SecChUaPlatform => {
                let os = self.catalog.os(os_name);
                ComponentValue::Str(os.latest().sec_ch_ua_platform.to_string())
            }
            SecChUaPlatformVersion => {
                let os = self.catalog.os(os_name);
                let entry = os.version_for_build(&os_version);
                ComponentValue::Str(
                    entry
                        .sec_ch_ua_platform_versions
                        .choose(rng)
                        .unwrap_or(&"\"0.0.0\"")
                        .to_string(),
                )
            }
            SecChUaMobile => {
                let mobile = {
                    let dc = device_class.to_ascii_lowercase();
                    dc.contains("mobile") || dc.contains("tablet")
                };
                ComponentValue::Str(if mobile { "?1" } else { "?0" }.to_string())
            }
            SecChUaArch => ComponentValue::Str(self.catalog.os(os_name).sec_ch_ua_arch.to_string()),
            SecChUaBitness => {
                ComponentValue::Str(self.catalog.os(os_name).sec_ch_ua_bitness.to_string())
            }
            SecChUaModel => ComponentValue::Str("\"\"".to_string()),
            SecChUaWow64 => match self.catalog.os(os_name).sec_ch_ua_wow64 {
                Some(v) => ComponentValue::Str(v.to_string()),
                None => ComponentValue::Absent,
            },
            WebglVendor => {
                let bundle = self.pick_bundle(os_name, browser_name, device_class, rng);
                ComponentValue::Str(bundle.vendors.choose(rng).unwrap_or(&"Google Inc.").to_string())
            }
            WebglRenderer => {
                let vendor = fp.str_value(WebglVendor);
                let bundle = self
                    .bundle_for_vendor(os_name, browser_name, device_class, vendor)
                    .unwrap_or_else(|| self.pick_bundle(os_name, browser_name, device_class, rng));
                ComponentValue::Str(
                    bundle
                        .renderers
                        .choose(rng)
                        .unwrap_or(&"Generic ANGLE Renderer")
                        .to_string(),
                )
            }
            WebglExtensions => {
                let bundle = self.bundle_for_current(fp, os_name, browser_name, device_class, rng);
                let min = (bundle.extensions.len() as f64 * 0.85).floor() as usize;
                let count = rng.gen_range(min.max(1)..=bundle.extensions.len().max(1));
                let mut picked: Vec<String> = bundle
                    .extensions
                    .choose_multiple(rng, count.min(bundle.extensions.len()))
                    .map(|s| s.to_string())
                    .collect();
                picked.sort();
                ComponentValue::StrList(picked)
            }
            WebglParams => {
                let bundle = self.bundle_for_current(fp, os_name, browser_name, device_class, rng);
                let mut record = BTreeMap::new();
                for (key, value) in bundle.params {
                    let jittered = if *key == "MAX_VERTEX_ATTRIBS" {
                        value + rng.gen_range(-1..=1)
                    } else {
                        *value
                    };
                    record.insert(key.to_string(), ComponentValue::Int(jittered));
                }
                ComponentValue::Record(record)
            }
            FontsList => {
                let fonts = self.catalog.fonts_for_os(os_name);
                let min = (fonts.len() as f64 * 0.6).floor() as usize;
                let count = rng.gen_range(min.max(1)..=fonts.len());
                let mut picked: Vec<String> = fonts
                    .choose_multiple(rng, count)
                    .map(|s| s.to_string())
                    .collect();
                picked.sort();
                ComponentValue::StrList(picked)
            }
            PluginsList => {
                let plugins = self.catalog.plugins_for(browser_name);
                let list = plugins
                    .iter()
                    .map(|p| {
                        let mut record = BTreeMap::new();
                        record.insert("name".into(), ComponentValue::Str(p.name.into()));
                        record.insert("filename".into(), ComponentValue::Str(p.filename.into()));
                        record
                            .insert("description".into(), ComponentValue::Str(p.description.into()));
                        record.insert("mime_type".into(), ComponentValue::Str(p.mime_type.into()));
                        record
                    })
                    .collect();
                ComponentValue::RecordList(list)
            }
            CanvasParams => {
                let mut record = BTreeMap::new();
                record.insert("noise_seed".into(), ComponentValue::Int(rng.gen_range(0..u32::MAX as i64)));
                record.insert(
                    "noise_intensity".into(),
                    ComponentValue::Float(rng.gen_range(0.00001..0.00005)),
                );
                record.insert("noise_r_shift".into(), ComponentValue::Int(rng.gen_range(0..=2)));
                record.insert("noise_g_shift".into(), ComponentValue::Int(rng.gen_range(0..=2)));
                record.insert("noise_b_shift".into(), ComponentValue::Int(rng.gen_range(0..=2)));
                record.insert(
                    "text_angle_variation".into(),
                    ComponentValue::Float(rng.gen_range(-0.05..0.05)),
                );
                ComponentValue::Record(record)
            }
            AudioContextParams => {
                let mut record = BTreeMap::new();
                let sample_rate = *[44100i64, 48000, 44100, 48000, 32000, 96000]
                    .choose(rng)
                    .unwrap_or(&48000);
                record.insert("sample_rate".into(), ComponentValue::Int(sample_rate));
                record.insert(
                    "base_latency".into(),
                    ComponentValue::Float(rng.gen_range(0.005..0.030)),
                );
                record.insert(
                    "output_latency".into(),
                    ComponentValue::Float(rng.gen_range(0.010..0.050)),
                );
                record.insert(
                    "analyser_fft_size".into(),
                    ComponentValue::Int(*[1024i64, 2048, 4096, 8192].choose(rng).unwrap_or(&2048)),
                );
                record.insert(
                    "compressor_threshold".into(),
                    ComponentValue::Float(rng.gen_range(-50.0..-40.0)),
                );
                record.insert(
                    "compressor_knee".into(),
                    ComponentValue::Float(rng.gen_range(30.0..40.0)),
                );
                record.insert(
                    "compressor_ratio".into(),
                    ComponentValue::Float(rng.gen_range(10.0..15.0)),
                );
                record.insert(
                    "compressor_attack".into(),
                    ComponentValue::Float(rng.gen_range(0.001..0.005)),
                );
                record.insert(
                    "compressor_release".into(),
                    ComponentValue::Float(rng.gen_range(0.20..0.30)),
                );
                ComponentValue::Record(record)
            }
            Locale => {
                let hinted = hints.and_then(|h| h.locale.as_deref());
                let current = fp
                    .languages()
                    .and_then(|l| l.first().cloned());
                let wanted = hinted.or(current.as_deref());
                ComponentValue::Str(self.gen_locale(wanted, rng))
            }
            Timezone => {
                let locale = fp.locale().unwrap_or("en-US");
                let tzs = self.catalog.timezones_for_locale(locale);
                ComponentValue::Str(tzs.choose(rng).unwrap_or(&"Etc/UTC").to_string())
            }
            Languages => {
                let locale = fp.locale().unwrap_or("en-US").to_string();
                ComponentValue::StrList(self.gen_languages(&locale, rng))
            }
            TlsJa3 => {
                let major = browser_version.split('.').next().unwrap_or("126");
                ComponentValue::Str(self.catalog.ja3(browser_name, major, os_name).to_string())
            }
            WebrtcIpHandlingMode => ComponentValue::Str(
                self.catalog
                    .webrtc_modes
                    .choose(rng)
                    .unwrap_or(&"default")
                    .to_string(),
            ),
            BatteryStatus => {
                let dc = device_class.to_ascii_lowercase();
                let powered =
                    dc.contains("laptop") || dc.contains("mobile") || dc.contains("tablet");
                if !powered {
                    return ComponentValue::Absent;
                }
                let charging = rng.gen_bool(0.4);
                let level = (rng.gen_range(0.15..1.0f64) * 100.0).round() / 100.0;
                let mut record = BTreeMap::new();
                record.insert("charging".into(), ComponentValue::Bool(charging));
                record.insert("level".into(), ComponentValue::Float(level));
                // -1 encodes Infinity for the init script.
                record.insert(
                    "charging_time".into(),
                    ComponentValue::Int(if charging { rng.gen_range(600..7200) } else { -1 }),
                );
                record.insert(
                    "discharging_time".into(),
                    ComponentValue::Int(if charging { -1 } else { rng.gen_range(3600..28800) }),
                );
                ComponentValue::Record(record)
            }
        }
    }

    /// True when the component's current value satisfies the catalog
    /// constraint implied by its already-resolved parents.
    pub fn is_consistent(&self, name: ComponentName, fp: &Fingerprint) -> bool {
        use ComponentName::*;

        let Some(value) = fp.value(name) else {
            return false;
        };
        let os_name = fp.os_name().unwrap_or("");
        let browser_name = fp.browser_name().unwrap_or("");
        let device_class = fp.device_class().unwrap_or("");

        match name {
            OsName => value
                .as_str()
                .map(|v| self.catalog.has_os(v))
                .unwrap_or(false),
            OsVersion => value
                .as_str()
                .map(|v| {
                    self.catalog
                        .os(os_name)
                        .versions
                        .iter()
                        .any(|ver| ver.builds.contains(&v))
                })
                .unwrap_or(false),
            DeviceClass => value
                .as_str()
                .map(|v| self.catalog.device_classes(os_name).contains(&v))
                .unwrap_or(false),
            BrowserName => value
                .as_str()
                .map(|v| self.catalog.browsers.iter().any(|b| b.name == v))
                .unwrap_or(false),
            BrowserVersion => value
                .as_str()
                .map(|v| {
                    self.catalog
                        .browser(browser_name)
                        .versions
                        .iter()
                        .any(|ver| ver.full_versions.contains(&v))
                })
                .unwrap_or(false),
            JsPlatform => value.as_str() == Some(self.catalog.os(os_name).js_platform),
            HardwareConcurrency => value
                .as_int()
                .map(|v| {
                    self.catalog
                        .hardware_profile(os_name, device_class)
                        .cores
                        .contains(&v)
                })
                .unwrap_or(false),
            DeviceMemory => value
                .as_int()
                .map(|v| {
                    self.catalog
                        .hardware_profile(os_name, device_class)
                        .memory_gb
                        .iter()
                        .any(|m| exposed_device_memory(*m) == v)
                })
                .unwrap_or(false),
            ScreenResolution => value
                .as_dims()
                .map(|dims| {
                    self.catalog
                        .hardware_profile(os_name, device_class)
                        .screen_resolutions
                        .contains(&dims)
                })
                .unwrap_or(false),
            ViewportDimensions => {
                let Some((screen_w, screen_h)) = fp.screen_resolution() else {
                    return false;
                };
                value
                    .as_dims()
                    .map(|(w, h)| w >= 800 && h >= 600 && w <= screen_w && h <= screen_h)
                    .unwrap_or(false)
            }
            ColorDepth => value
                .as_int()
                .map(|v| {
                    self.catalog
                        .hardware_profile(os_name, device_class)
                        .color_depths
                        .contains(&v)
                })
                .unwrap_or(false),
            DevicePixelRatio => value
                .as_float()
                .map(|v| {
                    self.catalog
                        .hardware_profile(os_name, device_class)
                        .dpr
                        .iter()
                        .any(|d| (d - v).abs() < f64::EPSILON)
                })
                .unwrap_or(false),
            UserAgent => {
                let expected = self.derive_user_agent(
                    browser_name,
                    fp.browser_version().unwrap_or(""),
                    os_name,
                    fp.str_value(OsVersion).unwrap_or(""),
                );
                value.as_str() == Some(expected.as_str())
            }
            SecChUa => {
                let major = fp.browser_major().unwrap_or("");
                let browser = self.catalog.browser(browser_name);
                match browser.version(major) {
                    Some(entry) if !entry.brands.is_empty() => value
                        .as_str()
                        .map(|v| entry.brands.iter().any(|b| render_brands(b, None) == v))
                        .unwrap_or(false),
                    _ => value.as_str() == Some(""),
                }
            }
            SecChUaFullVersionList => {
                let major = fp.browser_major().unwrap_or("");
                let full = fp.browser_version().unwrap_or("");
                let browser = self.catalog.browser(browser_name);
                match browser.version(major) {
                    Some(entry) if !entry.brands.is_empty() => value
                        .as_str()
                        .map(|v| {
                            entry
                                .brands
                                .iter()
                                .any(|b| render_brands(b, Some(full)) == v)
                        })
                        .unwrap_or(false),
                    _ => value.as_str() == Some(""),
                }
            }
            SecChUaPlatform => {
                value.as_str() == Some(self.catalog.os(os_name).latest().sec_ch_ua_platform)
            }
            SecChUaPlatformVersion => {
                let os = self.catalog.os(os_name);
                let entry = os.version_for_build(fp.str_value(OsVersion).unwrap_or(""));
                value
                    .as_str()
                    .map(|v| entry.sec_ch_ua_platform_versions.contains(&v))
                    .unwrap_or(false)
            }
            SecChUaMobile => {
                let expected = if fp.is_mobile() { "?1" } else { "?0" };
                value.as_str() == Some(expected)
            }
            SecChUaArch => value.as_str() == Some(self.catalog.os(os_name).sec_ch_ua_arch),
            SecChUaBitness => value.as_str() == Some(self.catalog.os(os_name).sec_ch_ua_bitness),
            SecChUaModel => value.as_str() == Some("\"\""),
            SecChUaWow64 => match self.catalog.os(os_name).sec_ch_ua_wow64 {
                Some(expected) => value.as_str() == Some(expected),
                None => value.is_absent(),
            },
            WebglVendor => {
                let Some(vendor) = value.as_str() else {
                    return false;
                };
                self.catalog
                    .webgl_bundles_for_device(os_name, browser_name, device_class)
                    .iter()
                    .any(|b| b.vendors.contains(&vendor))
            }
            WebglRenderer => {
                let Some(renderer) = value.as_str() else {
                    return false;
                };
                let vendor = fp.str_value(WebglVendor).unwrap_or("");
                self.catalog
                    .webgl_bundles_for_device(os_name, browser_name, device_class)
                    .iter()
                    .any(|b| b.vendors.contains(&vendor) && b.renderers.contains(&renderer))
            }
            WebglExtensions => {
                let Some(list) = value.as_list() else {
                    return false;
                };
                let Some(bundle) = self.bundle_for_renderer(fp, os_name, browser_name, device_class)
                else {
                    return false;
                };
                !list.is_empty() && list.iter().all(|e| bundle.extensions.contains(&e.as_str()))
            }
            WebglParams => {
                let Some(record) = value.as_record() else {
                    return false;
                };
                let Some(bundle) = self.bundle_for_renderer(fp, os_name, browser_name, device_class)
                else {
                    return false;
                };
                bundle.params.len() == record.len()
                    && bundle.params.iter().all(|(k, _)| record.contains_key(*k))
            }
            FontsList => {
                let Some(list) = value.as_list() else {
                    return false;
                };
                let fonts = self.catalog.fonts_for_os(os_name);
                !list.is_empty() && list.iter().all(|f| fonts.contains(&f.as_str()))
            }
            PluginsList => {
                let Some(list) = value.as_record_list() else {
                    return false;
                };
                let expected = self.catalog.plugins_for(browser_name);
                list.len() == expected.len()
                    && list.iter().zip(expected.iter()).all(|(record, plugin)| {
                        record.get("name").and_then(|v| v.as_str()) == Some(plugin.name)
                    })
            }
            CanvasParams => {
                let Some(record) = value.as_record() else {
                    return false;
                };
                let shifts_ok = ["noise_r_shift", "noise_g_shift", "noise_b_shift"]
                    .iter()
                    .all(|k| {
                        record
                            .get(*k)
                            .and_then(|v| v.as_int())
                            .map(|v| (0..=2).contains(&v))
                            .unwrap_or(false)
                    });
                let intensity_ok = record
                    .get("noise_intensity")
                    .and_then(|v| v.as_float())
                    .map(|v| (0.00001..=0.00005).contains(&v))
                    .unwrap_or(false);
                shifts_ok && intensity_ok && record.contains_key("noise_seed")
            }
            AudioContextParams => {
                let Some(record) = value.as_record() else {
                    return false;
                };
                let fft_ok = record
                    .get("analyser_fft_size")
                    .and_then(|v| v.as_int())
                    .map(|v| [1024, 2048, 4096, 8192].contains(&v))
                    .unwrap_or(false);
                fft_ok && record.contains_key("sample_rate")
            }
            Locale => value
                .as_str()
                .map(|v| self.catalog.all_locales().contains(&v))
                .unwrap_or(false),
            Timezone => {
                let locale = fp.locale().unwrap_or("en-US");
                value
                    .as_str()
                    .map(|v| self.catalog.timezones_for_locale(locale).contains(&v))
                    .unwrap_or(false)
            }
            Languages => {
                let Some(list) = value.as_list() else {
                    return false;
                };
                let locale = fp.locale().unwrap_or("");
                !list.is_empty()
                    && list.len() <= 3
                    && list[0] == locale
                    && list
                        .iter()
                        .all(|l| self.catalog.all_locales().contains(&l.as_str()))
            }
            TlsJa3 => {
                let major = fp.browser_major().unwrap_or("");
                value.as_str() == Some(self.catalog.ja3(browser_name, major, os_name))
            }
            WebrtcIpHandlingMode => value
                .as_str()
                .map(|v| self.catalog.webrtc_modes.contains(&v))
                .unwrap_or(false),
            BatteryStatus => {
                if fp.has_battery() {
                    value
                        .as_record()
                        .map(|r| r.contains_key("charging") && r.contains_key("level"))
                        .unwrap_or(false)
                } else {
                    value.is_absent()
                }
            }
        }
    }

    // --- derivation helpers ---

    fn gen_browser_version<R: Rng + ?Sized>(
        &self,
        browser_name: &str,
        current: Option<&str>,
        rng: &mut R,
    ) -> String {
        let browser = self.catalog.browser(browser_name);
        if let Some(current) = current {
            let major = current.split('.').next().unwrap_or("");
            // High chance to stay on the same release train.
            if rng.gen_bool(0.8) {
                if let Some(entry) = browser.version(major) {
                    let others: Vec<&&str> = entry
                        .full_versions
                        .iter()
                        .filter(|v| **v != current)
                        .collect();
                    if let Some(picked) = others.choose(rng) {
                        return picked.to_string();
                    }
                    return current.to_string();
                }
            }
        }
        let entry = browser
            .versions
            .choose(rng)
            .unwrap_or_else(|| browser.latest());
        entry
            .full_versions
            .choose(rng)
            .unwrap_or(&entry.full_versions[0])
            .to_string()
    }

    fn gen_os_version<R: Rng + ?Sized>(
        &self,
        os_name: &str,
        current: Option<&str>,
        rng: &mut R,
    ) -> String {
        let os = self.catalog.os(os_name);
        if let Some(current) = current {
            let entry = os.version_for_build(current);
            if entry.builds.contains(&current) && rng.gen_bool(0.9) {
                return entry.builds.choose(rng).unwrap_or(&entry.builds[0]).to_string();
            }
        }
        let entry = os.versions.choose(rng).unwrap_or_else(|| os.latest());
        entry.builds.choose(rng).unwrap_or(&entry.builds[0]).to_string()
    }

    /// UA strings are fully determined by (browser, version, os, build).
    pub fn derive_user_agent(
        &self,
        browser_name: &str,
        browser_version: &str,
        os_name: &str,
        os_build: &str,
    ) -> String {
        let browser = self.catalog.browser(browser_name);
        let os = self.catalog.os(os_name);
        let entry = os.version_for_build(os_build);
        let major = browser_version.split('.').next().unwrap_or(browser_version);

        let template = match os.name {
            "Windows" => browser.ua_template_windows,
            "macOS" => browser.ua_template_macos,
            _ => browser.ua_template_linux,
        };
        template
            .replace("{nt}", entry.nt_version)
            .replace("{mac_dotted}", &mac_dotted(entry.mac_platform_version))
            .replace("{mac}", entry.mac_platform_version)
            .replace("{version}", browser_version)
            .replace("{major}", major)
    }

    fn gen_sec_ch_ua<R: Rng + ?Sized>(
        &self,
        browser_name: &str,
        browser_version: &str,
        rng: &mut R,
    ) -> String {
        let browser = self.catalog.browser(browser_name);
        let major = browser_version.split('.').next().unwrap_or("");
        match browser.version(major) {
            Some(entry) if !entry.brands.is_empty() => {
                let brands = entry.brands.choose(rng).unwrap_or(&entry.brands[0]);
                render_brands(brands, None)
            }
            _ => String::new(),
        }
    }

    fn gen_sec_ch_ua_full_version_list<R: Rng + ?Sized>(
        &self,
        browser_name: &str,
        browser_version: &str,
        rng: &mut R,
    ) -> String {
        let browser = self.catalog.browser(browser_name);
        let major = browser_version.split('.').next().unwrap_or("");
        match browser.version(major) {
            Some(entry) if !entry.brands.is_empty() => {
                let brands = entry.brands.choose(rng).unwrap_or(&entry.brands[0]);
                render_brands(brands, Some(browser_version))
            }
            _ => String::new(),
        }
    }

    fn gen_viewport<R: Rng + ?Sized>(
        &self,
        screen: (u32, u32),
        os_name: &str,
        browser_name: &str,
        rng: &mut R,
    ) -> (u32, u32) {
        let (screen_w, screen_h) = screen;
        // Approximate browser top chrome and OS taskbar heights.
        let (top, bottom) = match (os_name, browser_name) {
            ("Windows", "Chrome") => (70, 40),
            ("Windows", _) => (74, 40),
            ("macOS", _) => (78, 0),
            _ => (90, 0),
        };
        let mut height = screen_h.saturating_sub(top + bottom);
        if rng.gen_bool(0.2) {
            // Bookmarks bar, extension toolbars.
            height = height.saturating_sub(*[30u32, 50, 70].choose(rng).unwrap_or(&30));
        }
        (screen_w.max(800), height.max(600))
    }

    fn gen_locale<R: Rng + ?Sized>(&self, wanted: Option<&str>, rng: &mut R) -> String {
        if let Some(wanted) = wanted {
            if self.catalog.all_locales().contains(&wanted) {
                return wanted.to_string();
            }
            let prefix = wanted.split('-').next().unwrap_or("en");
            let candidates = self.catalog.locales_for_language(prefix);
            if let Some(locale) = candidates.choose(rng) {
                return locale.to_string();
            }
        }
        self.catalog
            .all_locales()
            .choose(rng)
            .unwrap_or(&"en-US")
            .to_string()
    }

    fn gen_languages<R: Rng + ?Sized>(&self, locale: &str, rng: &mut R) -> Vec<String> {
        let mut languages = vec![locale.to_string()];
        let prefix = locale.split('-').next().unwrap_or("en");
        let related: Vec<&&str> = self
            .catalog
            .locales_for_language(prefix)
            .iter()
            .filter(|l| **l != locale)
            .collect();
        if !related.is_empty() && rng.gen_bool(0.8) {
            languages.push(related.choose(rng).unwrap().to_string());
        }
        if prefix != "en" && rng.gen_bool(0.6) {
            languages.push("en-US".to_string());
        }
        languages.dedup();
        languages.truncate(rng.gen_range(1..=3));
        if languages.is_empty() {
            languages.push(locale.to_string());
        }
        languages
    }

    fn pick_bundle<R: Rng + ?Sized>(
        &self,
        os_name: &str,
        browser_name: &str,
        device_class: &str,
        rng: &mut R,
    ) -> &'static WebglBundle {
        let hw = self.catalog.hardware_profile(os_name, device_class);
        let gpu_class = hw.gpu_classes.choose(rng).unwrap_or(&hw.gpu_classes[0]);
        self.catalog.webgl_bundle(os_name, browser_name, gpu_class)
    }

    fn bundle_for_vendor(
        &self,
        os_name: &str,
        browser_name: &str,
        device_class: &str,
        vendor: Option<&str>,
    ) -> Option<&'static WebglBundle> {
        let vendor = vendor?;
        self.catalog
            .webgl_bundles_for_device(os_name, browser_name, device_class)
            .into_iter()
            .find(|b| b.vendors.contains(&vendor))
    }

    fn bundle_for_renderer(
        &self,
        fp: &Fingerprint,
        os_name: &str,
        browser_name: &str,
        device_class: &str,
    ) -> Option<&'static WebglBundle> {
        let renderer = fp.str_value(ComponentName::WebglRenderer)?;
        self.catalog
            .webgl_bundles_for_device(os_name, browser_name, device_class)
            .into_iter()
            .find(|b| b.renderers.contains(&renderer))
    }

    fn bundle_for_current<R: Rng + ?Sized>(
        &self,
        fp: &Fingerprint,
        os_name: &str,
        browser_name: &str,
        device_class: &str,
        rng: &mut R,
    ) -> &'static WebglBundle {
        self.bundle_for_renderer(fp, os_name, browser_name, device_class)
            .unwrap_or_else(|| self.pick_bundle(os_name, browser_name, device_class, rng))
    }

    /// TLS stack family of the fingerprint's browser.
    pub fn tls_family(&self, browser_name: &str) -> TlsFamily {
        self.catalog.browser(browser_name).family
    }
}

/// Device memory as exposed through `navigator.deviceMemory`: the nearest
/// power of two, capped at 8.
pub fn exposed_device_memory(actual_gb: i64) -> i64 {
    let mut exposed = 1i64;
    while exposed < actual_gb && exposed < 8 {
        exposed *= 2;
    }
    exposed.min(8)
}

/// Render a brand sequence as a sec-ch-ua header value. With
/// `full_version`, Chromium-family brands carry the full version string
/// (sec-ch-ua-full-version-list form).
fn render_brands(brands: &[(&str, &str)], full_version: Option<&str>) -> String {
    brands
        .iter()
        .map(|(brand, major)| match full_version {
            Some(full) if brand.contains("Chrom") || brand.contains("Chrome") => {
                format!("\"{brand}\";v=\"{full}\"")
            }
            Some(_) => format!("\"{brand}\";v=\"{major}.0.0.0\""),
            None => format!("\"{brand}\";v=\"{major}\""),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn mac_dotted(mac_platform_version: &str) -> String {
    let dotted = mac_platform_version.replace('_', ".");
    dotted
        .split('.')
        .take(2)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn generate_produces_all_components() {
        let synth = Synthesizer::new();
        let fp = synth.generate(&SeedConstraints::default(), &mut rng(1));
        assert_eq!(fp.len(), RESOLUTION_ORDER.len());
    }

    #[test]
    fn generated_fingerprints_are_fully_consistent() {
        let synth = Synthesizer::new();
        for seed in 0..200 {
            let fp = synth.generate(&SeedConstraints::default(), &mut rng(seed));
            for name in RESOLUTION_ORDER {
                assert!(
                    synth.is_consistent(*name, &fp),
                    "seed {seed}: {name} inconsistent: {:?}",
                    fp.value(*name)
                );
            }
        }
    }

    #[test]
    fn consistency_pass_is_idempotent() {
        let synth = Synthesizer::new();
        for seed in 0..100 {
            let mut fp = synth.generate(&SeedConstraints::default(), &mut rng(seed));
            let once = fp.clone();
            synth.consistency_pass(&mut fp, &mut rng(seed + 10_000));
            assert_eq!(once.canonical_json(), fp.canonical_json(), "seed {seed}");
        }
    }

    #[test]
    fn windows_chrome_fingerprint_matches_expected_shape() {
        let synth = Synthesizer::new();
        let seed = SeedConstraints::default()
            .os("Windows")
            .browser("Chrome")
            .device_class("mid_range_laptop");
        let fp = synth.generate(&seed, &mut rng(42));

        let ua = fp.user_agent().unwrap();
        assert!(ua.starts_with(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/"
        ));
        assert!(ua.ends_with(" Safari/537.36"));
        assert_eq!(
            fp.str_value(ComponentName::SecChUaPlatform),
            Some("\"Windows\"")
        );
        assert_eq!(fp.str_value(ComponentName::SecChUaMobile), Some("?0"));
        assert_eq!(fp.str_value(ComponentName::JsPlatform), Some("Win32"));
        assert_eq!(
            fp.languages().unwrap()[0].as_str(),
            fp.locale().unwrap()
        );
        let (screen_w, _) = fp.screen_resolution().unwrap();
        let (vp_w, _) = fp.viewport_dimensions().unwrap();
        assert!(vp_w <= screen_w);
    }

    #[test]
    fn unknown_seed_falls_back_instead_of_failing() {
        let synth = Synthesizer::new();
        let seed = SeedConstraints::default().os("TempleOS").browser("Mosaic");
        let fp = synth.generate(&seed, &mut rng(9));
        assert!(synth.catalog.has_os(fp.os_name().unwrap()));
    }

    #[test]
    fn plausible_value_does_not_mutate_input() {
        let synth = Synthesizer::new();
        let fp = synth.generate(&SeedConstraints::default(), &mut rng(3));
        let snapshot = fp.canonical_json();
        let _ = synth.plausible_value(ComponentName::WebglRenderer, &fp, None, &mut rng(4));
        assert_eq!(fp.canonical_json(), snapshot);
    }

    #[test]
    fn device_memory_exposure_rounds_to_power_of_two() {
        assert_eq!(exposed_device_memory(4), 4);
        assert_eq!(exposed_device_memory(6), 8);
        assert_eq!(exposed_device_memory(8), 8);
        assert_eq!(exposed_device_memory(16), 8);
        assert_eq!(exposed_device_memory(64), 8);
        assert_eq!(exposed_device_memory(1), 1);
    }

    #[test]
    fn battery_present_only_on_battery_devices() {
        let synth = Synthesizer::new();
        let laptop = synth.generate(
            &SeedConstraints::default()
                .os("Windows")
                .device_class("mid_range_laptop"),
            &mut rng(5),
        );
        assert!(!laptop.value(ComponentName::BatteryStatus).unwrap().is_absent());

        let desktop = synth.generate(
            &SeedConstraints::default()
                .os("Windows")
                .device_class("high_end_desktop"),
            &mut rng(6),
        );
        assert!(desktop.value(ComponentName::BatteryStatus).unwrap().is_absent());
    }

    #[test]
    fn firefox_has_empty_client_hints_and_gecko_ua() {
        let synth = Synthesizer::new();
        let fp = synth.generate(
            &SeedConstraints::default().os("Windows").browser("Firefox"),
            &mut rng(8),
        );
        assert_eq!(fp.str_value(ComponentName::SecChUa), Some(""));
        assert!(fp.user_agent().unwrap().contains("Gecko/20100101"));
    }
}
