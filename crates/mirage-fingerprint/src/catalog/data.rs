//! Static catalog tables
//!
//! All identity raw material lives here as compile-time constants: browser
//! release trains with their client-hint brand sequences, OS build strings,
//! hardware envelopes per device class, WebGL bundles per GPU class, font
//! and plugin inventories, locale clusters and JA3 strings. Nothing in this
//! module is read from disk.

use super::{
    BrowserEntry, BrowserVersionEntry, HardwareProfile, OsEntry, OsVersionEntry, PluginEntry,
    TlsFamily, WebglBundle,
};

pub(super) const BROWSERS: &[BrowserEntry] = &[
    BrowserEntry {
        name: "Chrome",
        family: TlsFamily::Chromium,
        ua_template_windows:
            "Mozilla/5.0 (Windows NT {nt}; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36",
        ua_template_macos:
            "Mozilla/5.0 (Macintosh; Intel Mac OS X {mac}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36",
        ua_template_linux:
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36",
        versions: &[
            BrowserVersionEntry {
                major: "124",
                full_versions: &["124.0.6367.60", "124.0.6367.119", "124.0.6367.201"],
                release_date: "2024-04-16",
                brands: &[
                    &[("Chromium", "124"), ("Not-A.Brand", "99"), ("Google Chrome", "124")],
                    &[("Not_A Brand", "8"), ("Chromium", "124"), ("Google Chrome", "124")],
                ],
            },
            BrowserVersionEntry {
                major: "125",
                full_versions: &["125.0.6422.60", "125.0.6422.112", "125.0.6422.141"],
                release_date: "2024-05-14",
                brands: &[
                    &[("Not_A Brand", "24"), ("Chromium", "125"), ("Google Chrome", "125")],
                    &[("Chromium", "125"), ("Google Chrome", "125"), ("Not-A.Brand", "99")],
                ],
            },
            BrowserVersionEntry {
                major: "126",
                full_versions: &["126.0.6478.56", "126.0.6478.114", "126.0.6478.126"],
                release_date: "2024-06-11",
                brands: &[
                    &[("Not_A Brand", "8"), ("Chromium", "126"), ("Google Chrome", "126")],
                    &[("Chromium", "126"), ("Google Chrome", "126"), ("Not-A.Brand", "99")],
                ],
            },
            BrowserVersionEntry {
                major: "127",
                full_versions: &["127.0.6533.72", "127.0.6533.88"],
                release_date: "2024-07-23",
                brands: &[
                    &[("Not_A Brand", "8"), ("Chromium", "127"), ("Google Chrome", "127")],
                    &[("Chromium", "127"), ("Google Chrome", "127"), ("Not-A.Brand", "99")],
                ],
            },
        ],
    },
    BrowserEntry {
        name: "Firefox",
        family: TlsFamily::Gecko,
        ua_template_windows:
            "Mozilla/5.0 (Windows NT {nt}; Win64; x64; rv:{major}.0) Gecko/20100101 Firefox/{major}.0",
        ua_template_macos:
            "Mozilla/5.0 (Macintosh; Intel Mac OS X {mac_dotted}; rv:{major}.0) Gecko/20100101 Firefox/{major}.0",
        ua_template_linux:
            "Mozilla/5.0 (X11; Linux x86_64; rv:{major}.0) Gecko/20100101 Firefox/{major}.0",
        versions: &[
            BrowserVersionEntry {
                major: "126",
                full_versions: &["126.0", "126.0.1"],
                release_date: "2024-05-14",
                brands: &[],
            },
            BrowserVersionEntry {
                major: "127",
                full_versions: &["127.0", "127.0.2"],
                release_date: "2024-06-11",
                brands: &[],
            },
            BrowserVersionEntry {
                major: "128",
                full_versions: &["128.0", "128.0.3"],
                release_date: "2024-07-09",
                brands: &[],
            },
        ],
    },
];

pub(super) const OSES: &[OsEntry] = &[
    OsEntry {
        name: "Windows",
        js_platform: "Win32",
        sec_ch_ua_arch: "\"x86\"",
        sec_ch_ua_bitness: "\"64\"",
        sec_ch_ua_wow64: Some("\"?0\""),
        versions: &[
            OsVersionEntry {
                major: "10",
                builds: &["10.0.19045"],
                nt_version: "10.0",
                mac_platform_version: "10_15_7",
                sec_ch_ua_platform: "\"Windows\"",
                sec_ch_ua_platform_versions: &["\"10.0.0\"", "\"13.0.0\"", "\"14.0.0\"", "\"15.0.0\""],
            },
            OsVersionEntry {
                major: "11",
                builds: &["10.0.22000", "10.0.22621", "10.0.22631", "10.0.26100"],
                nt_version: "10.0",
                mac_platform_version: "10_15_7",
                sec_ch_ua_platform: "\"Windows\"",
                sec_ch_ua_platform_versions: &["\"15.0.0\"", "\"16.0.0\"", "\"17.0.0\"", "\"18.0.0\""],
            },
        ],
    },
    OsEntry {
        name: "macOS",
        js_platform: "MacIntel",
        sec_ch_ua_arch: "\"arm\"",
        sec_ch_ua_bitness: "\"64\"",
        sec_ch_ua_wow64: None,
        versions: &[
            OsVersionEntry {
                major: "13",
                builds: &["13.5", "13.6.7"],
                nt_version: "10.0",
                mac_platform_version: "10_15_7",
                sec_ch_ua_platform: "\"macOS\"",
                sec_ch_ua_platform_versions: &["\"13.0.0\"", "\"13.6.0\""],
            },
            OsVersionEntry {
                major: "14",
                builds: &["14.3", "14.5"],
                nt_version: "10.0",
                mac_platform_version: "10_15_7",
                sec_ch_ua_platform: "\"macOS\"",
                sec_ch_ua_platform_versions: &["\"14.0.0\"", "\"14.3.0\"", "\"14.5.0\""],
            },
            OsVersionEntry {
                major: "15",
                builds: &["15.0", "15.0.1"],
                nt_version: "10.0",
                mac_platform_version: "10_15_7",
                sec_ch_ua_platform: "\"macOS\"",
                sec_ch_ua_platform_versions: &["\"15.0.0\""],
            },
        ],
    },
    OsEntry {
        name: "Linux",
        js_platform: "Linux x86_64",
        sec_ch_ua_arch: "\"x86\"",
        sec_ch_ua_bitness: "\"64\"",
        sec_ch_ua_wow64: None,
        versions: &[OsVersionEntry {
            major: "6",
            builds: &["6.5.0", "6.8.0"],
            nt_version: "10.0",
            mac_platform_version: "10_15_7",
            sec_ch_ua_platform: "\"Linux\"",
            sec_ch_ua_platform_versions: &["\"6.5.0\"", "\"6.8.0\""],
        }],
    },
];

pub(super) const HARDWARE_PROFILES: &[HardwareProfile] = &[
    HardwareProfile {
        os: "Windows",
        device_class: "high_end_desktop",
        cores: &[12, 16, 24],
        memory_gb: &[16, 32, 64],
        screen_resolutions: &[(2560, 1440), (3840, 2160)],
        dpr: &[1.0, 1.25, 1.5],
        color_depths: &[24, 32],
        gpu_classes: &["NVIDIA_HighEnd", "AMD_HighEnd"],
    },
    HardwareProfile {
        os: "Windows",
        device_class: "mid_range_desktop",
        cores: &[6, 8, 12],
        memory_gb: &[8, 16, 32],
        screen_resolutions: &[(1920, 1080), (2560, 1440)],
        dpr: &[1.0, 1.25],
        color_depths: &[24],
        gpu_classes: &["NVIDIA_MidRange", "AMD_MidRange", "Intel_Integrated"],
    },
    HardwareProfile {
        os: "Windows",
        device_class: "mid_range_laptop",
        cores: &[6, 8, 12],
        memory_gb: &[8, 16],
        screen_resolutions: &[(1920, 1080), (2560, 1440)],
        dpr: &[1.0, 1.25],
        color_depths: &[24],
        gpu_classes: &["NVIDIA_MidRange", "AMD_MidRange", "Intel_Integrated"],
    },
    HardwareProfile {
        os: "Windows",
        device_class: "low_end_laptop",
        cores: &[2, 4],
        memory_gb: &[4, 8],
        screen_resolutions: &[(1366, 768), (1920, 1080)],
        dpr: &[1.0],
        color_depths: &[24],
        gpu_classes: &["Intel_Integrated"],
    },
    HardwareProfile {
        os: "macOS",
        device_class: "high_end_laptop",
        cores: &[10, 12, 14, 16],
        memory_gb: &[16, 32, 64],
        screen_resolutions: &[(3024, 1964), (3456, 2234)],
        dpr: &[2.0],
        color_depths: &[30, 24],
        gpu_classes: &["Apple_Silicon"],
    },
    HardwareProfile {
        os: "macOS",
        device_class: "mid_range_laptop",
        cores: &[8, 10],
        memory_gb: &[8, 16, 24],
        screen_resolutions: &[(2560, 1664), (2880, 1864)],
        dpr: &[2.0],
        color_depths: &[30, 24],
        gpu_classes: &["Apple_Silicon"],
    },
    HardwareProfile {
        os: "macOS",
        device_class: "desktop",
        cores: &[8, 12, 24],
        memory_gb: &[16, 32, 64],
        screen_resolutions: &[(5120, 2880), (4480, 2520)],
        dpr: &[2.0],
        color_depths: &[30, 24],
        gpu_classes: &["Apple_Silicon"],
    },
    HardwareProfile {
        os: "Linux",
        device_class: "mid_range_desktop",
        cores: &[4, 8, 12, 16],
        memory_gb: &[8, 16, 32],
        screen_resolutions: &[(1920, 1080), (2560, 1440)],
        dpr: &[1.0],
        color_depths: &[24],
        gpu_classes: &["NVIDIA_MidRange", "AMD_MidRange", "Intel_Integrated"],
    },
    HardwareProfile {
        os: "Linux",
        device_class: "mid_range_laptop",
        cores: &[4, 8],
        memory_gb: &[8, 16],
        screen_resolutions: &[(1920, 1080)],
        dpr: &[1.0, 1.25],
        color_depths: &[24],
        gpu_classes: &["Intel_Integrated", "AMD_MidRange"],
    },
];

pub(super) const WEBGL_BUNDLES: &[WebglBundle] = &[
    WebglBundle {
        os: "Windows",
        browser: "Chrome",
        gpu_class: "NVIDIA_HighEnd",
        vendors: &["Google Inc. (NVIDIA)"],
        renderers: &[
            "ANGLE (NVIDIA, NVIDIA GeForce RTX 4090 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            "ANGLE (NVIDIA, NVIDIA GeForce RTX 4070 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        ],
        extensions: &[
            "EXT_texture_filter_anisotropic",
            "WEBGL_debug_renderer_info",
            "KHR_parallel_shader_compile",
            "OES_texture_float_linear",
        ],
        params: &[("MAX_TEXTURE_SIZE", 32768), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Windows",
        browser: "Chrome",
        gpu_class: "NVIDIA_MidRange",
        vendors: &["Google Inc. (NVIDIA)"],
        renderers: &[
            "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        ],
        extensions: &[
            "EXT_texture_filter_anisotropic",
            "WEBGL_debug_renderer_info",
            "WEBGL_draw_buffers",
        ],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Windows",
        browser: "Chrome",
        gpu_class: "AMD_HighEnd",
        vendors: &["Google Inc. (AMD)"],
        renderers: &[
            "ANGLE (AMD, AMD Radeon RX 7900 XTX Direct3D11 vs_5_0 ps_5_0, D3D11)",
        ],
        extensions: &[
            "EXT_texture_filter_anisotropic",
            "WEBGL_debug_renderer_info",
            "WEBGL_draw_buffers",
        ],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Windows",
        browser: "Chrome",
        gpu_class: "AMD_MidRange",
        vendors: &["Google Inc. (AMD)"],
        renderers: &[
            "ANGLE (AMD, AMD Radeon RX 6700 XT Direct3D11 vs_5_0 ps_5_0, D3D11)",
            "ANGLE (AMD, AMD Radeon RX 6600 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        ],
        extensions: &["EXT_texture_filter_anisotropic", "WEBGL_draw_buffers"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Windows",
        browser: "Chrome",
        gpu_class: "Intel_Integrated",
        vendors: &["Google Inc. (Intel)"],
        renderers: &[
            "ANGLE (Intel, Intel(R) Iris(R) Xe Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)",
            "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        ],
        extensions: &["OES_vertex_array_object", "WEBGL_lose_context", "EXT_texture_filter_anisotropic"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 0)],
    },
    WebglBundle {
        os: "Windows",
        browser: "Firefox",
        gpu_class: "NVIDIA_MidRange",
        vendors: &["NVIDIA Corporation"],
        renderers: &["NVIDIA GeForce RTX 3060/PCIe/SSE2"],
        extensions: &["EXT_texture_filter_anisotropic", "WEBGL_debug_renderer_info"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Windows",
        browser: "Firefox",
        gpu_class: "AMD_MidRange",
        vendors: &["ATI Technologies Inc."],
        renderers: &["AMD Radeon RX 6700 XT"],
        extensions: &["EXT_texture_filter_anisotropic", "WEBGL_draw_buffers"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Windows",
        browser: "Firefox",
        gpu_class: "Intel_Integrated",
        vendors: &["Intel"],
        renderers: &["Intel(R) Iris(R) Xe Graphics"],
        extensions: &["OES_vertex_array_object", "WEBGL_lose_context"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 0)],
    },
    WebglBundle {
        os: "macOS",
        browser: "Chrome",
        gpu_class: "Apple_Silicon",
        vendors: &["Google Inc. (Apple)", "Apple"],
        renderers: &[
            "ANGLE (Apple, Apple M2 Pro, Unspecified Version)",
            "ANGLE (Apple, Apple M3, Unspecified Version)",
        ],
        extensions: &[
            "EXT_texture_filter_anisotropic",
            "WEBGL_draw_buffers_indexed",
            "WEBGL_debug_renderer_info",
        ],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "macOS",
        browser: "Firefox",
        gpu_class: "Apple_Silicon",
        vendors: &["Apple"],
        renderers: &["Apple M2", "Apple M3"],
        extensions: &["EXT_texture_filter_anisotropic", "WEBGL_debug_renderer_info"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Linux",
        browser: "Chrome",
        gpu_class: "NVIDIA_MidRange",
        vendors: &["Google Inc. (NVIDIA Corporation)"],
        renderers: &["ANGLE (NVIDIA Corporation, NVIDIA GeForce RTX 3060/PCIe/SSE2, OpenGL 4.5.0)"],
        extensions: &["EXT_texture_filter_anisotropic", "WEBGL_debug_renderer_info"],
        params: &[("MAX_TEXTURE_SIZE", 32768), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Linux",
        browser: "Chrome",
        gpu_class: "AMD_MidRange",
        vendors: &["Google Inc. (AMD)"],
        renderers: &["ANGLE (AMD, AMD Radeon RX 6600 (radeonsi navi23), OpenGL 4.6)"],
        extensions: &["EXT_texture_filter_anisotropic", "WEBGL_draw_buffers"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Linux",
        browser: "Chrome",
        gpu_class: "Intel_Integrated",
        vendors: &["Google Inc. (Intel)"],
        renderers: &["ANGLE (Intel, Mesa Intel(R) Xe Graphics (TGL GT2), OpenGL 4.6)"],
        extensions: &["OES_vertex_array_object", "WEBGL_lose_context"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 0)],
    },
    WebglBundle {
        os: "Linux",
        browser: "Firefox",
        gpu_class: "Intel_Integrated",
        vendors: &["Mesa"],
        renderers: &["Mesa Intel(R) Xe Graphics (TGL GT2)"],
        extensions: &["OES_vertex_array_object", "WEBGL_lose_context"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 0)],
    },
    WebglBundle {
        os: "Linux",
        browser: "Firefox",
        gpu_class: "AMD_MidRange",
        vendors: &["AMD"],
        renderers: &["AMD Radeon RX 6600 (radeonsi, navi23, LLVM 15.0.7)"],
        extensions: &["EXT_texture_filter_anisotropic", "WEBGL_draw_buffers"],
        params: &[("MAX_TEXTURE_SIZE", 16384), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
    WebglBundle {
        os: "Linux",
        browser: "Firefox",
        gpu_class: "NVIDIA_MidRange",
        vendors: &["NVIDIA Corporation"],
        renderers: &["NVIDIA GeForce RTX 3060/PCIe/SSE2"],
        extensions: &["EXT_texture_filter_anisotropic", "WEBGL_debug_renderer_info"],
        params: &[("MAX_TEXTURE_SIZE", 32768), ("MAX_VERTEX_ATTRIBS", 16), ("STENCIL_BITS", 8)],
    },
];

pub(super) const FONTS: &[(&str, &[&str])] = &[
    (
        "Windows",
        &[
            "Arial", "Arial Black", "Calibri", "Cambria", "Candara", "Comic Sans MS",
            "Consolas", "Constantia", "Corbel", "Courier New", "Georgia", "Impact",
            "Lucida Console", "Segoe UI", "Tahoma", "Times New Roman", "Trebuchet MS",
            "Verdana",
        ],
    ),
    (
        "macOS",
        &[
            "American Typewriter", "Arial", "Avenir", "Avenir Next", "Baskerville",
            "Helvetica", "Helvetica Neue", "Lucida Grande", "Menlo", "Monaco",
            "New York", "SF Pro Display", "SF Pro Text", "Times New Roman",
        ],
    ),
    (
        "Linux",
        &[
            "Cantarell", "DejaVu Sans", "DejaVu Sans Mono", "DejaVu Serif",
            "Liberation Mono", "Liberation Sans", "Liberation Serif", "Noto Sans",
            "Noto Serif", "Ubuntu", "Ubuntu Mono",
        ],
    ),
];

pub(super) const PLUGINS: &[(&str, &[PluginEntry])] = &[
    (
        "Chrome",
        &[
            PluginEntry {
                name: "PDF Viewer",
                filename: "internal-pdf-viewer",
                description: "Portable Document Format",
                mime_type: "application/pdf",
            },
            PluginEntry {
                name: "Chrome PDF Viewer",
                filename: "internal-pdf-viewer",
                description: "Portable Document Format",
                mime_type: "application/pdf",
            },
            PluginEntry {
                name: "Chromium PDF Viewer",
                filename: "internal-pdf-viewer",
                description: "Portable Document Format",
                mime_type: "application/pdf",
            },
            PluginEntry {
                name: "Microsoft Edge PDF Viewer",
                filename: "internal-pdf-viewer",
                description: "Portable Document Format",
                mime_type: "application/pdf",
            },
            PluginEntry {
                name: "WebKit built-in PDF",
                filename: "internal-pdf-viewer",
                description: "Portable Document Format",
                mime_type: "application/pdf",
            },
        ],
    ),
    (
        "Firefox",
        &[PluginEntry {
            name: "PDF Viewer",
            filename: "internal-pdf-viewer",
            description: "Portable Document Format",
            mime_type: "application/pdf",
        }],
    ),
];

/// Locale clusters: language prefix to plausible regional locales.
pub(super) const LOCALES: &[(&str, &[&str])] = &[
    ("en", &["en-US", "en-GB"]),
    ("de", &["de-DE"]),
    ("fr", &["fr-FR"]),
    ("es", &["es-ES"]),
    ("it", &["it-IT"]),
    ("nl", &["nl-NL"]),
    ("ja", &["ja-JP"]),
];

/// Timezone clusters keyed by geographic region.
pub(super) const TIMEZONES: &[(&str, &[&str])] = &[
    (
        "NorthAmerica",
        &["America/New_York", "America/Chicago", "America/Denver", "America/Los_Angeles"],
    ),
    (
        "Europe",
        &["Europe/London", "Europe/Paris", "Europe/Berlin", "Europe/Amsterdam", "Europe/Madrid", "Europe/Rome"],
    ),
    ("Asia", &["Asia/Tokyo", "Asia/Shanghai", "Asia/Seoul"]),
];

/// Which timezone region a locale implies.
pub(super) const LOCALE_REGIONS: &[(&str, &str)] = &[
    ("en-US", "NorthAmerica"),
    ("en-GB", "Europe"),
    ("de-DE", "Europe"),
    ("fr-FR", "Europe"),
    ("es-ES", "Europe"),
    ("it-IT", "Europe"),
    ("nl-NL", "Europe"),
    ("ja-JP", "Asia"),
];

/// JA3 strings keyed by (browser, major, os).
pub(super) const JA3: &[((&str, &str, &str), &str)] = &[
    (
        ("Chrome", "124", "Windows"),
        "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0",
    ),
    (
        ("Chrome", "125", "Windows"),
        "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0",
    ),
    (
        ("Chrome", "126", "Windows"),
        "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,65037-0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0",
    ),
    (
        ("Chrome", "127", "Windows"),
        "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,65037-0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,1",
    ),
    (
        ("Chrome", "125", "macOS"),
        "771,4865-4866-4867-49195-49203-49196-49204-52393-52392-49171-49172-156-157-47-53,45-10-13-18-5-27-16-65281-65037-17513-51-0-11-23-43-35,4588-29-23-24,0",
    ),
    (
        ("Chrome", "126", "macOS"),
        "771,4865-4866-4867-49195-49203-49196-49204-52393-52392-49171-49172-156-157-47-53,45-10-13-18-5-27-16-65281-65037-17513-51-0-11-23-43-35,4588-29-23-24,0",
    ),
    (
        ("Chrome", "126", "Linux"),
        "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,65037-0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0",
    ),
    (
        ("Firefox", "127", "Windows"),
        "771,4865-4867-4866-49195-49199-52393-52392-49196-49200-49162-49161-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-34-51-43-13-45-28-65037,29-23-24-25-256-257,0",
    ),
    (
        ("Firefox", "128", "Windows"),
        "771,4865-4867-4866-49195-49199-52393-52392-49196-49200-49162-49161-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-34-51-43-13-45-28-65037,29-23-24-25-256-257,0",
    ),
    (
        ("Firefox", "128", "Linux"),
        "771,4865-4867-4866-49195-49199-52393-52392-49196-49200-49162-49161-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-34-51-43-13-45-28,29-23-24-25-256-257,0",
    ),
];

/// Recorded default JA3 used when the whole ladder misses.
pub(super) const DEFAULT_JA3: &str =
    "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0";

/// WebRTC IP handling modes the init script understands.
pub(super) const WEBRTC_MODES: &[&str] = &[
    "default",
    "default_public_interface_only",
    "disable_non_proxied_udp",
    "proxy_only_with_fallback",
    "disabled",
];
