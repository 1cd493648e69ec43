//! Browser data collector — builds the flat snapshot sent with each click
//! registration: landing page, campaign parameters, referrer classification,
//! browser/OS/device detection, and screen metrics.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::page::PageEnvironment;

/// Campaign and ad-platform click parameters from the landing URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UtmParams {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub gclid: Option<String>,
    pub gbraid: Option<String>,
    pub wbraid: Option<String>,
    pub fbclid: Option<String>,
    pub msclkid: Option<String>,
    pub ttclid: Option<String>,
    pub twclid: Option<String>,
    pub li_fat_id: Option<String>,
}

impl UtmParams {
    pub fn from_page(page: &PageEnvironment) -> Self {
        Self {
            utm_source: page.query_param("utm_source"),
            utm_medium: page.query_param("utm_medium"),
            utm_campaign: page.query_param("utm_campaign"),
            utm_term: page.query_param("utm_term"),
            utm_content: page.query_param("utm_content"),
            gclid: page.query_param("gclid"),
            gbraid: page.query_param("gbraid"),
            wbraid: page.query_param("wbraid"),
            fbclid: page.query_param("fbclid"),
            msclkid: page.query_param("msclkid"),
            ttclid: page.query_param("ttclid"),
            twclid: page.query_param("twclid"),
            li_fat_id: page.query_param("li_fat_id"),
        }
    }

    /// Whether any ad-platform click id is present.
    pub fn has_paid_click_id(&self) -> bool {
        [
            &self.gclid,
            &self.gbraid,
            &self.wbraid,
            &self.fbclid,
            &self.msclkid,
            &self.ttclid,
            &self.twclid,
            &self.li_fat_id,
        ]
        .iter()
        .any(|id| id.is_some())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferrerType {
    Direct,
    Paid,
    Search,
    Social,
    Email,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

const SEARCH_ENGINES: &[&str] = &[
    "google",
    "bing",
    "yahoo",
    "duckduckgo",
    "baidu",
    "yandex",
    "ecosia",
    "ask",
    "aol",
    "startpage",
    "qwant",
    "brave",
];

const SOCIAL_PLATFORMS: &[&str] = &[
    "facebook",
    "fb.com",
    "instagram",
    "twitter",
    "x.com",
    "linkedin",
    "pinterest",
    "tiktok",
    "reddit",
    "youtube",
    "snapchat",
    "whatsapp",
    "telegram",
    "discord",
    "tumblr",
    "threads.net",
    "mastodon",
];

const EMAIL_PROVIDERS: &[&str] = &[
    "mail",
    "outlook",
    "yahoo",
    "gmail",
    "protonmail",
    "zoho",
    "mailchimp",
    "sendgrid",
    "constantcontact",
    "hubspot",
    "klaviyo",
    "convertkit",
    "drip",
];

/// Hostname of a referrer URL, `None` when absent or unparseable.
pub fn parse_referrer_domain(referrer: Option<&str>) -> Option<String> {
    let referrer = referrer.filter(|r| !r.is_empty())?;
    Url::parse(referrer)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Classify the traffic source. Paid click ids win over the referrer domain;
/// domain checks are substring matches in search, social, email order.
pub fn classify_referrer(referrer_domain: Option<&str>, params: &UtmParams) -> ReferrerType {
    let Some(domain) = referrer_domain else {
        return ReferrerType::Direct;
    };
    if params.has_paid_click_id() {
        return ReferrerType::Paid;
    }

    let domain = domain.to_lowercase();
    let matches = |list: &[&str]| list.iter().any(|needle| domain.contains(needle));
    if matches(SEARCH_ENGINES) {
        ReferrerType::Search
    } else if matches(SOCIAL_PLATFORMS) {
        ReferrerType::Social
    } else if matches(EMAIL_PROVIDERS) {
        ReferrerType::Email
    } else {
        ReferrerType::Unknown
    }
}

static EDGE_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Edg/([0-9.]+)").unwrap());
static OPERA_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:OPR|Opera)/([0-9.]+)").unwrap());
static CHROME_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Chrome/([0-9.]+)").unwrap());
static SAFARI_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Version/([0-9.]+)").unwrap());
static FIREFOX_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Firefox/([0-9.]+)").unwrap());
static IE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:MSIE |rv:)([0-9.]+)").unwrap());
static MAC_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Mac OS X ([0-9_]+)").unwrap());
static IOS_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"OS ([0-9_]+)").unwrap());
static ANDROID_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Android ([0-9.]+)").unwrap());

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Detect the browser. More specific tokens are checked first since most
/// user agents claim several engines.
pub fn parse_browser_info(user_agent: Option<&str>) -> BrowserInfo {
    let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
        return BrowserInfo::default();
    };

    let (name, re) = if ua.contains("Edg/") {
        ("Edge", &*EDGE_VERSION)
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        ("Opera", &*OPERA_VERSION)
    } else if ua.contains("Chrome/") && !ua.contains("Chromium") {
        ("Chrome", &*CHROME_VERSION)
    } else if ua.contains("Safari/") && !ua.contains("Chrome") {
        ("Safari", &*SAFARI_VERSION)
    } else if ua.contains("Firefox/") {
        ("Firefox", &*FIREFOX_VERSION)
    } else if ua.contains("MSIE") || ua.contains("Trident/") {
        ("Internet Explorer", &*IE_VERSION)
    } else {
        return BrowserInfo::default();
    };

    BrowserInfo {
        name: Some(name.to_string()),
        version: capture(re, ua),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

pub fn parse_os_info(user_agent: Option<&str>) -> OsInfo {
    let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
        return OsInfo::default();
    };

    let (name, version) = if ua.contains("Windows") {
        let version = [
            ("Windows NT 10.0", "10"),
            ("Windows NT 6.3", "8.1"),
            ("Windows NT 6.2", "8"),
            ("Windows NT 6.1", "7"),
        ]
        .iter()
        .find(|(token, _)| ua.contains(token))
        .map(|(_, v)| v.to_string());
        ("Windows", version)
    } else if ua.contains("Mac OS X") {
        ("macOS", capture(&MAC_VERSION, ua).map(|v| v.replace('_', ".")))
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        ("iOS", capture(&IOS_VERSION, ua).map(|v| v.replace('_', ".")))
    } else if ua.contains("Android") {
        ("Android", capture(&ANDROID_VERSION, ua))
    } else if ua.contains("Linux") {
        ("Linux", None)
    } else if ua.contains("CrOS") {
        ("Chrome OS", None)
    } else {
        return OsInfo::default();
    };

    OsInfo {
        name: Some(name.to_string()),
        version,
    }
}

pub fn detect_device_type(user_agent: Option<&str>) -> DeviceType {
    let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
        return DeviceType::Desktop;
    };
    let ua = ua.to_lowercase();

    if ua.contains("ipad") || (ua.contains("android") && !ua.contains("mobile")) || ua.contains("tablet") {
        return DeviceType::Tablet;
    }

    let mobile_tokens = ["mobile", "iphone", "ipod", "android", "blackberry", "windows phone"];
    if mobile_tokens.iter().any(|t| ua.contains(t)) {
        return DeviceType::Mobile;
    }

    DeviceType::Desktop
}

/// Snapshot of the visit sent alongside a click registration. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrowserData {
    // Landing page
    pub full_landing_url: String,
    pub pathname: String,
    pub query_string: Option<String>,

    #[serde(flatten)]
    pub utm: UtmParams,

    // Referrer
    pub document_referrer: Option<String>,
    pub referrer_domain: Option<String>,
    pub referrer_type: ReferrerType,

    // User agent and device
    pub user_agent: Option<String>,
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub device_type: DeviceType,

    // Screen and viewport
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub color_depth: Option<u32>,
    pub pixel_ratio: Option<f64>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,

    // Language; `languages` is the JSON-encoded list
    pub language: Option<String>,
    pub languages: Option<String>,
}

fn non_zero(v: Option<u32>) -> Option<u32> {
    v.filter(|v| *v != 0)
}

/// Collect a fresh [`BrowserData`] snapshot from the page.
pub fn collect_browser_data(page: &PageEnvironment) -> BrowserData {
    let user_agent = page.user_agent.clone().filter(|ua| !ua.is_empty());
    let utm = UtmParams::from_page(page);
    let document_referrer = page.referrer.clone().filter(|r| !r.is_empty());
    let referrer_domain = parse_referrer_domain(document_referrer.as_deref());
    let referrer_type = classify_referrer(referrer_domain.as_deref(), &utm);
    let browser = parse_browser_info(user_agent.as_deref());
    let os = parse_os_info(user_agent.as_deref());
    let device_type = detect_device_type(user_agent.as_deref());

    let languages = if page.languages.is_empty() {
        None
    } else {
        serde_json::to_string(&page.languages).ok()
    };

    BrowserData {
        full_landing_url: page.location.to_string(),
        pathname: page.location.path().to_string(),
        query_string: page.search(),
        utm,
        document_referrer,
        referrer_domain,
        referrer_type,
        user_agent,
        browser_name: browser.name,
        browser_version: browser.version,
        os_name: os.name,
        os_version: os.version,
        device_type,
        screen_width: non_zero(page.screen.map(|s| s.width)),
        screen_height: non_zero(page.screen.map(|s| s.height)),
        color_depth: non_zero(page.screen.map(|s| s.color_depth)),
        pixel_ratio: page.device_pixel_ratio.filter(|r| *r != 0.0),
        viewport_width: non_zero(page.viewport_width),
        viewport_height: non_zero(page.viewport_height),
        language: page.language.clone().filter(|l| !l.is_empty()),
        languages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.109 Safari/537.36";
    const EDGE_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const IE11: &str = "Mozilla/5.0 (Windows NT 6.1; Trident/7.0; rv:11.0) like Gecko";

    fn page(url: &str) -> PageEnvironment {
        PageEnvironment::new(Url::parse(url).unwrap())
    }

    #[test]
    fn test_browser_detection() {
        let cases = [
            (CHROME_MAC, "Chrome", Some("120.0.6099.109")),
            (EDGE_WIN, "Edge", Some("120.0.2210.91")),
            (SAFARI_IPHONE, "Safari", Some("17.2")),
            (FIREFOX_LINUX, "Firefox", Some("121.0")),
            (IE11, "Internet Explorer", Some("11.0")),
        ];
        for (ua, name, version) in cases {
            let info = parse_browser_info(Some(ua));
            assert_eq!(info.name.as_deref(), Some(name), "ua: {ua}");
            assert_eq!(info.version.as_deref(), version, "ua: {ua}");
        }
        assert_eq!(parse_browser_info(None), BrowserInfo::default());
        assert_eq!(parse_browser_info(Some("curl/8.4.0")), BrowserInfo::default());
    }

    #[test]
    fn test_os_detection() {
        let mac = parse_os_info(Some(CHROME_MAC));
        assert_eq!(mac.name.as_deref(), Some("macOS"));
        assert_eq!(mac.version.as_deref(), Some("10.15.7"));

        let win = parse_os_info(Some(EDGE_WIN));
        assert_eq!(win.name.as_deref(), Some("Windows"));
        assert_eq!(win.version.as_deref(), Some("10"));

        assert_eq!(parse_os_info(Some(IE11)).version.as_deref(), Some("7"));

        let android = parse_os_info(Some(ANDROID_PHONE));
        assert_eq!(android.name.as_deref(), Some("Android"));
        assert_eq!(android.version.as_deref(), Some("14"));

        assert_eq!(parse_os_info(Some(FIREFOX_LINUX)).name.as_deref(), Some("Linux"));
    }

    #[test]
    fn test_iphone_user_agent_reports_macos_token_first() {
        // "like Mac OS X" in iPhone agents matches the macOS branch first
        let info = parse_os_info(Some(SAFARI_IPHONE));
        assert_eq!(info.name.as_deref(), Some("macOS"));
        let ipad = parse_os_info(Some("Mozilla/5.0 (iPad; CPU OS 16_1)"));
        assert_eq!(ipad.name.as_deref(), Some("iOS"));
        assert_eq!(ipad.version.as_deref(), Some("16.1"));
    }

    #[test]
    fn test_device_type() {
        assert_eq!(detect_device_type(Some(CHROME_MAC)), DeviceType::Desktop);
        assert_eq!(detect_device_type(Some(SAFARI_IPHONE)), DeviceType::Mobile);
        assert_eq!(detect_device_type(Some(ANDROID_PHONE)), DeviceType::Mobile);
        assert_eq!(detect_device_type(Some(ANDROID_TABLET)), DeviceType::Tablet);
        assert_eq!(detect_device_type(None), DeviceType::Desktop);
    }

    #[test]
    fn test_referrer_classification() {
        let none = UtmParams::default();
        assert_eq!(classify_referrer(None, &none), ReferrerType::Direct);
        assert_eq!(classify_referrer(Some("www.google.com"), &none), ReferrerType::Search);
        assert_eq!(classify_referrer(Some("t.co.x.com"), &none), ReferrerType::Social);
        assert_eq!(classify_referrer(Some("l.facebook.com"), &none), ReferrerType::Social);
        assert_eq!(classify_referrer(Some("mail.proton.me"), &none), ReferrerType::Email);
        assert_eq!(classify_referrer(Some("blog.example.org"), &none), ReferrerType::Unknown);

        let paid = UtmParams {
            fbclid: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(classify_referrer(Some("l.facebook.com"), &paid), ReferrerType::Paid);
        // Paid ids without a referrer still count as direct
        assert_eq!(classify_referrer(None, &paid), ReferrerType::Direct);
    }

    #[test]
    fn test_referrer_domain() {
        assert_eq!(
            parse_referrer_domain(Some("https://news.ycombinator.com/item?id=1")),
            Some("news.ycombinator.com".into())
        );
        assert_eq!(parse_referrer_domain(Some("not a url")), None);
        assert_eq!(parse_referrer_domain(Some("")), None);
        assert_eq!(parse_referrer_domain(None), None);
    }

    #[test]
    fn test_collect_browser_data() {
        let env = page("https://shop.example.com/pricing?ref=alice&utm_source=newsletter&gclid=g-1")
            .with_referrer("https://www.google.com/search?q=shop")
            .with_user_agent(CHROME_MAC)
            .with_screen(1920, 1080, 24)
            .with_viewport(1440, 0, 2.0)
            .with_languages(&["en-US", "en"]);

        let data = collect_browser_data(&env);
        assert_eq!(data.pathname, "/pricing");
        assert_eq!(data.query_string.as_deref(), Some("?ref=alice&utm_source=newsletter&gclid=g-1"));
        assert_eq!(data.utm.utm_source.as_deref(), Some("newsletter"));
        assert_eq!(data.referrer_domain.as_deref(), Some("www.google.com"));
        assert_eq!(data.referrer_type, ReferrerType::Paid);
        assert_eq!(data.browser_name.as_deref(), Some("Chrome"));
        assert_eq!(data.screen_width, Some(1920));
        assert_eq!(data.viewport_height, None);
        assert_eq!(data.language.as_deref(), Some("en-US"));
        assert_eq!(data.languages.as_deref(), Some(r#"["en-US","en"]"#));

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["fullLandingUrl"], env.location.as_str());
        assert_eq!(json["utmSource"], "newsletter");
        assert_eq!(json["liFatId"], serde_json::Value::Null);
        assert_eq!(json["referrerType"], "paid");
        assert_eq!(json["deviceType"], "desktop");
    }

    #[test]
    fn test_collect_minimal_page() {
        let data = collect_browser_data(&page("https://shop.example.com/"));
        assert_eq!(data.query_string, None);
        assert_eq!(data.referrer_type, ReferrerType::Direct);
        assert_eq!(data.device_type, DeviceType::Desktop);
        assert_eq!(data.screen_width, None);
        assert_eq!(data.languages, None);
    }
}
