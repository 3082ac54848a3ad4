//! Fingerprint component model
//!
//! A fingerprint is an ordered set of named components whose values are
//! jointly constrained: the user agent must be derivable from the OS and
//! browser choice, the WebGL renderer from the GPU class, and so on. The
//! component set is closed; unknown component names do not exist at
//! runtime.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Category a component belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCategory {
    Os,
    Browser,
    Hardware,
    Rendering,
    Localization,
    Network,
    Headers,
}

/// Polymorphic component value
///
/// Components range from plain strings (`os_name`) over dimension pairs
/// (`screen_resolution`) to nested records (`canvas_params`). `Absent`
/// models components that are legitimately missing, e.g. battery status on
/// a desktop device class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    StrList(Vec<String>),
    Dims(u32, u32),
    Record(BTreeMap<String, ComponentValue>),
    RecordList(Vec<BTreeMap<String, ComponentValue>>),
    Absent,
}

impl ComponentValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ComponentValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ComponentValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ComponentValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ComponentValue::Float(f) => Some(*f),
            ComponentValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_dims(&self) -> Option<(u32, u32)> {
        match self {
            ComponentValue::Dims(w, h) => Some((*w, *h)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ComponentValue::StrList(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, ComponentValue>> {
        match self {
            ComponentValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_record_list(&self) -> Option<&[BTreeMap<String, ComponentValue>]> {
        match self {
            ComponentValue::RecordList(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ComponentValue::Absent)
    }

    /// Canonical JSON rendering used for equality checks and hashing.
    ///
    /// Record keys are already sorted by the underlying BTreeMap, so the
    /// output is stable across processes.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

impl fmt::Display for ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentValue::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.canonical_json()),
        }
    }
}

macro_rules! component_names {
    ($( $variant:ident => $name:literal, $category:expr ;)*) => {
        /// Closed set of fingerprint component names.
        ///
        /// Declaration order is the topological resolution order of the
        /// consistency pass: a component only depends on components
        /// declared before it.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum ComponentName {
            $( $variant, )*
        }

        impl ComponentName {
            pub const ALL: &'static [ComponentName] = &[ $( ComponentName::$variant, )* ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( ComponentName::$variant => $name, )*
                }
            }

            pub fn category(&self) -> ComponentCategory {
                match self {
                    $( ComponentName::$variant => $category, )*
                }
            }
        }

        impl FromStr for ComponentName {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(ComponentName::$variant), )*
                    other => Err(format!("unknown component name: {other}")),
                }
            }
        }
    };
}

component_names! {
    OsName => "os_name", ComponentCategory::Os;
    OsVersion => "os_version", ComponentCategory::Os;
    DeviceClass => "device_class", ComponentCategory::Os;
    BrowserName => "browser_name", ComponentCategory::Browser;
    BrowserVersion => "browser_version", ComponentCategory::Browser;
    JsPlatform => "js_platform", ComponentCategory::Os;
    HardwareConcurrency => "hardware_concurrency", ComponentCategory::Hardware;
    DeviceMemory => "device_memory", ComponentCategory::Hardware;
    ScreenResolution => "screen_resolution", ComponentCategory::Hardware;
    ViewportDimensions => "viewport_dimensions", ComponentCategory::Hardware;
    ColorDepth => "color_depth", ComponentCategory::Hardware;
    DevicePixelRatio => "device_pixel_ratio", ComponentCategory::Hardware;
    UserAgent => "user_agent", ComponentCategory::Headers;
    SecChUa => "sec_ch_ua", ComponentCategory::Headers;
    SecChUaFullVersionList => "sec_ch_ua_full_version_list", ComponentCategory::Headers;
    SecChUaPlatform => "sec_ch_ua_platform", ComponentCategory::Headers;
    SecChUaPlatformVersion => "sec_ch_ua_platform_version", ComponentCategory::Headers;
    SecChUaMobile => "sec_ch_ua_mobile", ComponentCategory::Headers;
    SecChUaArch => "sec_ch_ua_arch", ComponentCategory::Headers;
    SecChUaBitness => "sec_ch_ua_bitness", ComponentCategory::Headers;
    SecChUaModel => "sec_ch_ua_model", ComponentCategory::Headers;
    SecChUaWow64 => "sec_ch_ua_wow64", ComponentCategory::Headers;
    WebglVendor => "webgl_vendor", ComponentCategory::Rendering;
    WebglRenderer => "webgl_renderer", ComponentCategory::Rendering;
    WebglExtensions => "webgl_extensions", ComponentCategory::Rendering;
    WebglParams => "webgl_params", ComponentCategory::Rendering;
    FontsList => "fonts_list", ComponentCategory::Rendering;
    PluginsList => "plugins_list", ComponentCategory::Rendering;
    CanvasParams => "canvas_params", ComponentCategory::Rendering;
    AudioContextParams => "audio_context_params", ComponentCategory::Rendering;
    Locale => "locale", ComponentCategory::Localization;
    Timezone => "timezone", ComponentCategory::Localization;
    Languages => "languages", ComponentCategory::Localization;
    TlsJa3 => "tls_ja3", ComponentCategory::Network;
    WebrtcIpHandlingMode => "webrtc_ip_handling_mode", ComponentCategory::Network;
    BatteryStatus => "battery_status", ComponentCategory::Hardware;
}

/// Topological resolution order of the consistency pass.
///
/// Identical to declaration order of [`ComponentName`]; exported under its
/// own name so call sites read as intent rather than as an enum detail.
pub const RESOLUTION_ORDER: &[ComponentName] = ComponentName::ALL;

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled component of a fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintComponent {
    /// Component name (closed set)
    pub name: ComponentName,

    /// Current value
    pub value: ComponentValue,

    /// Category of the component
    pub category: ComponentCategory,

    /// Names of components whose values constrain this one
    pub dependencies: BTreeSet<ComponentName>,

    /// Bias for mutation selection, in [0, 1]
    pub mutation_weight: f64,

    /// Value snapshot from the last committed mutation
    pub last_mutated_value: ComponentValue,
}

impl FingerprintComponent {
    pub fn new(
        name: ComponentName,
        value: ComponentValue,
        dependencies: &[ComponentName],
        mutation_weight: f64,
    ) -> Self {
        let last_mutated_value = value.clone();
        Self {
            name,
            value,
            category: name.category(),
            dependencies: dependencies.iter().copied().collect(),
            mutation_weight,
            last_mutated_value,
        }
    }
}

/// A complete fingerprint: the synthesized identity tuple observable by a
/// site.
///
/// Iteration order follows [`RESOLUTION_ORDER`], which makes the
/// consistency pass a single forward sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    components: BTreeMap<ComponentName, FingerprintComponent>,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: FingerprintComponent) {
        self.components.insert(component.name, component);
    }

    pub fn get(&self, name: ComponentName) -> Option<&FingerprintComponent> {
        self.components.get(&name)
    }

    pub fn get_mut(&mut self, name: ComponentName) -> Option<&mut FingerprintComponent> {
        self.components.get_mut(&name)
    }

    pub fn value(&self, name: ComponentName) -> Option<&ComponentValue> {
        self.components.get(&name).map(|c| &c.value)
    }

    /// Replace a component's value, snapshotting the old one into
    /// `last_mutated_value`. No-op for names not present.
    pub fn apply(&mut self, name: ComponentName, value: ComponentValue) {
        if let Some(component) = self.components.get_mut(&name) {
            component.last_mutated_value = component.value.clone();
            component.value = value;
        }
    }

    pub fn contains(&self, name: ComponentName) -> bool {
        self.components.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ComponentName, &FingerprintComponent)> {
        self.components.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = ComponentName> + '_ {
        self.components.keys().copied()
    }

    // Typed accessors for the components the rest of the system reads on
    // hot paths.

    pub fn str_value(&self, name: ComponentName) -> Option<&str> {
        self.value(name).and_then(|v| v.as_str())
    }

    pub fn os_name(&self) -> Option<&str> {
        self.str_value(ComponentName::OsName)
    }

    pub fn browser_name(&self) -> Option<&str> {
        self.str_value(ComponentName::BrowserName)
    }

    pub fn browser_version(&self) -> Option<&str> {
        self.str_value(ComponentName::BrowserVersion)
    }

    /// Major version prefix of `browser_version`, e.g. "126" from
    /// "126.0.6478.56".
    pub fn browser_major(&self) -> Option<&str> {
        self.browser_version()
            .map(|v| v.split('.').next().unwrap_or(v))
    }

    pub fn device_class(&self) -> Option<&str> {
        self.str_value(ComponentName::DeviceClass)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.str_value(ComponentName::UserAgent)
    }

    pub fn locale(&self) -> Option<&str> {
        self.str_value(ComponentName::Locale)
    }

    pub fn screen_resolution(&self) -> Option<(u32, u32)> {
        self.value(ComponentName::ScreenResolution)
            .and_then(|v| v.as_dims())
    }

    pub fn viewport_dimensions(&self) -> Option<(u32, u32)> {
        self.value(ComponentName::ViewportDimensions)
            .and_then(|v| v.as_dims())
    }

    pub fn languages(&self) -> Option<&[String]> {
        self.value(ComponentName::Languages).and_then(|v| v.as_list())
    }

    /// True when the device class names a mobile or tablet device.
    pub fn is_mobile(&self) -> bool {
        self.device_class()
            .map(|dc| {
                let dc = dc.to_ascii_lowercase();
                dc.contains("mobile") || dc.contains("tablet")
            })
            .unwrap_or(false)
    }

    /// True when the device class names a battery-powered device.
    pub fn has_battery(&self) -> bool {
        self.device_class()
            .map(|dc| {
                let dc = dc.to_ascii_lowercase();
                dc.contains("laptop") || dc.contains("mobile") || dc.contains("tablet")
            })
            .unwrap_or(false)
    }

    /// Canonical JSON of all component values, used for stable hashing.
    pub fn canonical_json(&self) -> String {
        let values: BTreeMap<&str, &ComponentValue> = self
            .components
            .iter()
            .map(|(name, c)| (name.as_str(), &c.value))
            .collect();
        serde_json::to_string(&values).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_name_round_trips_via_str() {
        for name in ComponentName::ALL {
            let parsed: ComponentName = name.as_str().parse().unwrap();
            assert_eq!(parsed, *name);
        }
    }

    #[test]
    fn resolution_order_respects_declared_dependencies() {
        // A dependency must come strictly earlier in the order.
        let position = |n: ComponentName| {
            RESOLUTION_ORDER.iter().position(|c| *c == n).unwrap()
        };
        assert!(position(ComponentName::OsName) < position(ComponentName::OsVersion));
        assert!(position(ComponentName::BrowserVersion) < position(ComponentName::UserAgent));
        assert!(
            position(ComponentName::ScreenResolution)
                < position(ComponentName::ViewportDimensions)
        );
        assert!(position(ComponentName::Locale) < position(ComponentName::Timezone));
    }

    #[test]
    fn apply_snapshots_previous_value() {
        let mut fp = Fingerprint::new();
        fp.insert(FingerprintComponent::new(
            ComponentName::OsName,
            ComponentValue::Str("Windows".into()),
            &[],
            0.02,
        ));
        fp.apply(ComponentName::OsName, ComponentValue::Str("macOS".into()));

        let comp = fp.get(ComponentName::OsName).unwrap();
        assert_eq!(comp.value.as_str(), Some("macOS"));
        assert_eq!(comp.last_mutated_value.as_str(), Some("Windows"));
    }

    #[test]
    fn canonical_json_is_stable() {
        let mut fp = Fingerprint::new();
        fp.insert(FingerprintComponent::new(
            ComponentName::BrowserName,
            ComponentValue::Str("Chrome".into()),
            &[],
            0.05,
        ));
        fp.insert(FingerprintComponent::new(
            ComponentName::OsName,
            ComponentValue::Str("Windows".into()),
            &[],
            0.02,
        ));
        assert_eq!(fp.canonical_json(), fp.clone().canonical_json());
    }

    #[test]
    fn dims_value_serializes_as_pair() {
        let v = ComponentValue::Dims(1920, 1080);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[1920,1080]");
    }
}
