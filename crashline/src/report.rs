//! Scanning and rewriting of crash report text.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::AnchorConfig;
use crate::error::ReportError;

lazy_static! {
    static ref MAIN_ANCHOR_RE: Regex = Regex::new(r"Main is at (0x[^\n:]+):").unwrap();
    static ref ADDRESS_RE: Regex = Regex::new(r"\[(0x[^\n\]]+)\]").unwrap();
    static ref VERSION_RE: Regex = Regex::new(r"Version: ([^\n]+)").unwrap();
    static ref TAG_RE: Regex = Regex::new(r"Tag: ([^\n]+)").unwrap();
    static ref FRAME_RE: Regex = Regex::new(r"-[^\n\[]+\[(0x[^\n\]]+)\]").unwrap();
}

/// The symbol printed by the `Main is at` marker.
pub const MAIN_SYMBOL: &str = "Main";

/// Parses a `0x` prefixed hexadecimal address.
///
/// Returns `None` unless the entire input is a valid address.
pub fn parse_address(text: &str) -> Option<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

/// A symbol at a known virtual address in the crashed process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Anchor {
    /// The name of the symbol.
    pub symbol: String,
    /// The virtual address of the symbol's first instruction.
    pub address: u64,
}

fn capture<'a>(regex: &Regex, report: &'a str) -> Option<&'a str> {
    let captures = regex.captures(report)?;
    Some(captures.get(1)?.as_str())
}

/// Locates the anchor of a crash report.
///
/// Reports of builds that print their `Main` address carry a `Main is at 0x…:` marker. Otherwise,
/// the top stack frame is located relative to a fallback anchor configured for the report's
/// `Version:` and `Tag:`.
pub fn find_anchor(report: &str, config: &AnchorConfig) -> Result<Anchor, ReportError> {
    if let Some(address) = capture(&MAIN_ANCHOR_RE, report)
        .and_then(parse_address)
        .filter(|&address| address != 0)
    {
        return Ok(Anchor {
            symbol: MAIN_SYMBOL.to_owned(),
            address,
        });
    }

    let top_frame = capture(&ADDRESS_RE, report).and_then(parse_address);
    let version = capture(&VERSION_RE, report).map(str::trim_end);
    let tag = capture(&TAG_RE, report).map(str::trim_end);

    if let (Some(top_frame), Some(version), Some(tag)) = (top_frame, version, tag) {
        if let Some(fallback) = config.find(version, tag) {
            if let Some(address) = top_frame
                .checked_sub(fallback.offset)
                .filter(|&address| address != 0)
            {
                return Ok(Anchor {
                    symbol: fallback.symbol.clone(),
                    address,
                });
            }
        }
    }

    Err(ReportError::MissingAnchor)
}

/// Inserts an annotation in front of the address of every stack frame.
///
/// Stack frames are a `-` followed by text and a bracketed address on the same line. `annotate`
/// receives each frame address and returns the annotation to insert before the address, or
/// `None` to leave the frame unchanged. Addresses that fail to parse are left unchanged.
///
/// # Example
///
/// ```
/// use crashline::rewrite_frames;
///
/// let report = "- Foo [0x10]\n- Bar [0x20]";
/// let rewritten = rewrite_frames(report, |address| {
///     Ok::<_, ()>((address == 0x10).then(|| "foo.c:1".to_owned()))
/// });
/// assert_eq!(rewritten.unwrap(), "- Foo @ foo.c:1 [0x10]\n- Bar [0x20]");
/// ```
pub fn rewrite_frames<F, E>(report: &str, mut annotate: F) -> Result<Cow<'_, str>, E>
where
    F: FnMut(u64) -> Result<Option<String>, E>,
{
    let mut output = String::new();
    let mut copied = 0;

    for captures in FRAME_RE.captures_iter(report) {
        let Some(address_match) = captures.get(1) else {
            continue;
        };
        let Some(address) = parse_address(address_match.as_str()) else {
            continue;
        };
        let Some(annotation) = annotate(address)? else {
            continue;
        };

        // the bracket in front of the address
        let token_start = address_match.start() - 1;
        output.push_str(&report[copied..token_start]);
        output.push_str("@ ");
        output.push_str(&annotation);
        output.push(' ');
        copied = token_start;
    }

    if output.is_empty() {
        return Ok(Cow::Borrowed(report));
    }

    output.push_str(&report[copied..]);
    Ok(Cow::Owned(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::config::FallbackAnchor;

    fn fallback_config() -> AnchorConfig {
        AnchorConfig::default().with_fallback(FallbackAnchor::new(
            "98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS",
            "e371d63",
            0x146,
        ))
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x7ff6a2b31010"), Some(0x7ff6_a2b3_1010));
        assert_eq!(parse_address("0X10"), Some(0x10));
        assert_eq!(parse_address("0x"), None);
        assert_eq!(parse_address("0x12zz"), None);
        assert_eq!(parse_address("1234"), None);
    }

    #[test]
    fn test_main_anchor() {
        let report = "Main is at 0x7ff600001000: ok\n- Foo [0x7ff600001010]";
        let anchor = find_anchor(report, &AnchorConfig::default()).unwrap();
        assert_eq!(
            anchor,
            Anchor {
                symbol: "Main".into(),
                address: 0x7ff6_0000_1000,
            }
        );
    }

    #[test]
    fn test_fallback_anchor() {
        let report = "Version: 98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS\r\n\
                      Tag: e371d63\r\n\
                      - Platform::StackTrace [0x7ff600002146]\r\n\
                      - Main [0x7ff600001234]\r\n";
        let anchor = find_anchor(report, &fallback_config()).unwrap();
        assert_eq!(anchor.symbol, "Platform::StackTrace");
        assert_eq!(anchor.address, 0x7ff6_0000_2000);
    }

    #[test]
    fn test_unparsable_main_anchor_falls_back() {
        let report = "Main is at 0xnope:\n\
                      Version: 98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS\n\
                      Tag: e371d63\n\
                      - Platform::StackTrace [0x1146]\n";
        let anchor = find_anchor(report, &fallback_config()).unwrap();
        assert_eq!(anchor.symbol, "Platform::StackTrace");
        assert_eq!(anchor.address, 0x1000);
    }

    #[test]
    fn test_missing_anchor() {
        let report = "Version: 1.0\nTag: abc\n- Foo [0x1010]\n";
        let err = find_anchor(report, &fallback_config()).unwrap_err();
        assert!(matches!(err, ReportError::MissingAnchor));

        // known build but no frames
        let report = "Version: 98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS\nTag: e371d63\n";
        let err = find_anchor(report, &fallback_config()).unwrap_err();
        assert!(matches!(err, ReportError::MissingAnchor));
    }

    #[test]
    fn test_rewrite_frames() {
        let report = "Crash!\n- Foo [0x1010]\n- Bar [0x2020]\n[0x1010] not a frame";
        let rewritten = rewrite_frames(report, |address| {
            Ok::<_, ()>(match address {
                0x1010 => Some("a.c:5".to_owned()),
                _ => None,
            })
        })
        .unwrap();

        insta::assert_snapshot!(rewritten, @r###"
        Crash!
        - Foo @ a.c:5 [0x1010]
        - Bar [0x2020]
        [0x1010] not a frame
        "###);
    }

    #[test]
    fn test_rewrite_unparsable_frame() {
        let report = "- Foo [0xgg]\n";
        let mut calls = 0;
        let rewritten = rewrite_frames(report, |_| {
            calls += 1;
            Ok::<_, ()>(Some("a.c:1".to_owned()))
        })
        .unwrap();
        assert_eq!(rewritten, report);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_rewrite_propagates_errors() {
        let err = rewrite_frames("- Foo [0x10]", |_| Err("broken")).unwrap_err();
        assert_eq!(err, "broken");
    }
}
