//! Page environment — the host's description of the page the tracker runs
//! on: location, referrer, navigator and screen properties, and the script
//! tags the program id is resolved from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Attribute marking the tracker's script tag.
pub const AFFILIATE_SCRIPT_ATTR: &str = "data-affiliate";
/// Attribute carrying the program id on the tracker's script tag.
pub const PROGRAM_ID_ATTR: &str = "data-program-id";
/// Query parameter carrying the program id on the tracker script's `src`.
pub const PROGRAM_ID_PARAM: &str = "programId";

/// A `<script>` element present on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptTag {
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl ScriptTag {
    pub fn with_src(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            attributes: HashMap::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// `window.screen` metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
}

/// Everything the tracker reads from the host page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEnvironment {
    pub location: Url,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub screen: Option<ScreenInfo>,
    #[serde(default)]
    pub device_pixel_ratio: Option<f64>,
    #[serde(default)]
    pub viewport_width: Option<u32>,
    #[serde(default)]
    pub viewport_height: Option<u32>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub scripts: Vec<ScriptTag>,
}

impl PageEnvironment {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            referrer: None,
            user_agent: None,
            screen: None,
            device_pixel_ratio: None,
            viewport_width: None,
            viewport_height: None,
            language: None,
            languages: Vec::new(),
            scripts: Vec::new(),
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_screen(mut self, width: u32, height: u32, color_depth: u32) -> Self {
        self.screen = Some(ScreenInfo {
            width,
            height,
            color_depth,
        });
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32, pixel_ratio: f64) -> Self {
        self.viewport_width = Some(width);
        self.viewport_height = Some(height);
        self.device_pixel_ratio = Some(pixel_ratio);
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.language = languages.first().map(|l| l.to_string());
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_script(mut self, script: ScriptTag) -> Self {
        self.scripts.push(script);
        self
    }

    pub fn hostname(&self) -> &str {
        self.location.host_str().unwrap_or("")
    }

    /// First value of a query parameter on the page URL. Empty values count
    /// as absent.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.location
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    }

    /// `location.search`, including the leading `?`, or `None` when empty.
    pub fn search(&self) -> Option<String> {
        self.location
            .query()
            .filter(|q| !q.is_empty())
            .map(|q| format!("?{q}"))
    }

    /// Resolve the affiliate program id: the `data-program-id` attribute of
    /// the script tagged `data-affiliate`, else the `programId` query param
    /// of the tracker script's `src`.
    pub fn program_id(&self, tracker_script_prefix: &str) -> Option<String> {
        let from_attr = self
            .scripts
            .iter()
            .find(|s| s.get_attribute(AFFILIATE_SCRIPT_ATTR).is_some())
            .and_then(|s| s.get_attribute(PROGRAM_ID_ATTR))
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        from_attr.or_else(|| self.script_query_param(tracker_script_prefix, PROGRAM_ID_PARAM))
    }

    fn script_query_param(&self, tracker_script_prefix: &str, name: &str) -> Option<String> {
        let src = self
            .scripts
            .iter()
            .filter_map(|s| s.src.as_deref())
            .find(|src| src.starts_with(tracker_script_prefix))?;
        let url = Url::parse(src).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "https://pushlapgrowth.com/affiliate-tracker.js";

    fn page(url: &str) -> PageEnvironment {
        PageEnvironment::new(Url::parse(url).unwrap())
    }

    #[test]
    fn test_program_id_from_data_attribute() {
        let env = page("https://shop.example.com/").with_script(
            ScriptTag::with_src("/static/tracker.js")
                .attr(AFFILIATE_SCRIPT_ATTR, "")
                .attr(PROGRAM_ID_ATTR, "prog-1"),
        );
        assert_eq!(env.program_id(PREFIX), Some("prog-1".into()));
    }

    #[test]
    fn test_program_id_from_script_src() {
        let env = page("https://shop.example.com/")
            .with_script(ScriptTag::with_src("https://cdn.other.com/lib.js"))
            .with_script(ScriptTag::with_src(format!("{PREFIX}?programId=prog-2")));
        assert_eq!(env.program_id(PREFIX), Some("prog-2".into()));
    }

    #[test]
    fn test_program_id_missing() {
        let env = page("https://shop.example.com/")
            .with_script(ScriptTag::with_src("https://cdn.other.com/lib.js"));
        assert_eq!(env.program_id(PREFIX), None);
    }

    #[test]
    fn test_query_param_and_search() {
        let env = page("https://shop.example.com/pricing?ref=alice&utm_source=&x=1");
        assert_eq!(env.query_param("ref"), Some("alice".into()));
        assert_eq!(env.query_param("utm_source"), None);
        assert_eq!(env.query_param("missing"), None);
        assert_eq!(env.search(), Some("?ref=alice&utm_source=&x=1".into()));
        assert_eq!(page("https://shop.example.com/").search(), None);
    }

    #[test]
    fn test_page_from_json() {
        let env: PageEnvironment = serde_json::from_str(
            r#"{"location":"https://a.example.com/?ref=bob","languages":["en-US","en"]}"#,
        )
        .unwrap();
        assert_eq!(env.hostname(), "a.example.com");
        assert_eq!(env.query_param("ref"), Some("bob".into()));
        assert_eq!(env.languages.len(), 2);
    }
}
