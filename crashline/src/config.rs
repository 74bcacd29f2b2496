//! Configuration of fallback anchors.

use serde::{Deserialize, Serialize};

/// The symbol that fallback offsets are measured against.
pub const DEFAULT_FALLBACK_SYMBOL: &str = "Platform::StackTrace";

fn default_symbol() -> String {
    DEFAULT_FALLBACK_SYMBOL.to_owned()
}

/// A known distance between the top stack frame and an anchor symbol for one build.
///
/// Builds that do not print their `Main` address crash inside the stack trace printer. For such
/// a build, the top frame of every report is a fixed number of bytes into the anchor symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackAnchor {
    /// The value of the report's `Version:` line.
    pub version: String,
    /// The value of the report's `Tag:` line.
    pub tag: String,
    /// The distance of the top frame from the start of the anchor symbol.
    pub offset: u64,
    /// The anchor symbol.
    #[serde(default = "default_symbol")]
    pub symbol: String,
}

impl FallbackAnchor {
    /// Creates a fallback anchor relative to [`DEFAULT_FALLBACK_SYMBOL`].
    pub fn new(version: impl Into<String>, tag: impl Into<String>, offset: u64) -> Self {
        Self {
            version: version.into(),
            tag: tag.into(),
            offset,
            symbol: default_symbol(),
        }
    }
}

/// The fallback anchors known for released builds.
///
/// # Example
///
/// ```
/// use crashline::AnchorConfig;
///
/// let config = AnchorConfig::from_json(r#"{
///     "fallbacks": [{ "version": "1.0", "tag": "abc", "offset": 326 }]
/// }"#).unwrap();
///
/// let anchor = config.find("1.0", "abc").unwrap();
/// assert_eq!(anchor.symbol, "Platform::StackTrace");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    /// All known fallback anchors.
    #[serde(default)]
    pub fallbacks: Vec<FallbackAnchor>,
}

impl AnchorConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Adds a fallback anchor.
    pub fn with_fallback(mut self, fallback: FallbackAnchor) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    /// Returns the fallback anchor for a build.
    pub fn find(&self, version: &str, tag: &str) -> Option<&FallbackAnchor> {
        self.fallbacks
            .iter()
            .find(|anchor| anchor.version == version && anchor.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_from_json() {
        let config = AnchorConfig::from_json(
            r#"{
                "fallbacks": [
                    {
                        "version": "98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS",
                        "tag": "e371d63",
                        "offset": 326
                    },
                    {
                        "version": "99.0.1",
                        "tag": "0badc0de",
                        "offset": 16,
                        "symbol": "Platform::Crash"
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.find("98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS", "e371d63"),
            Some(&FallbackAnchor::new(
                "98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS",
                "e371d63",
                0x146
            ))
        );
        assert_eq!(
            config.find("99.0.1", "0badc0de").unwrap().symbol,
            "Platform::Crash"
        );
        assert_eq!(config.find("99.0.1", "e371d63"), None);
    }

    #[test]
    fn test_empty() {
        let config = AnchorConfig::from_json("{}").unwrap();
        assert_eq!(config, AnchorConfig::default());
        assert!(AnchorConfig::from_json(r#"{"fallbacks": [{"version": "1"}]}"#).is_err());
    }
}
