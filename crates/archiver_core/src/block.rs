/// Substrings that only show up on anti-bot interstitials.
///
/// Matching is case-sensitive. The list drifts as providers change their
/// challenge markup, so callers can replace it through [`BlockDetector::with_markers`].
pub const DEFAULT_CHALLENGE_MARKERS: &[&str] = &[
    // Cloudflare
    "Just a moment...",
    "Attention Required! | Cloudflare",
    "cf-browser-verification",
    "challenges.cloudflare.com/cdn-cgi/challenge-platform",
    // DataDome
    "geo.captcha-delivery.com",
    "captcha-delivery.com/captcha",
    // PerimeterX
    "px-captcha",
    // Generic
    "Verify you are human",
];

/// Classifies a fetched or rendered response as an anti-bot block.
///
/// This is a heuristic: false negatives are tolerated, and a false positive only
/// costs one unnecessary evasion-provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDetector {
    markers: Vec<String>,
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::with_markers(DEFAULT_CHALLENGE_MARKERS.iter().map(|m| m.to_string()))
    }
}

impl BlockDetector {
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Server errors and refusals count as blocks; a 404 is a real "not found".
    pub fn is_blocked(&self, status: u16, body: &str) -> bool {
        let bad_status = status >= 400 && status != 404;
        bad_status || self.has_challenge_marker(body)
    }

    pub fn has_challenge_marker(&self, body: &str) -> bool {
        self.markers.iter().any(|marker| body.contains(marker.as_str()))
    }
}
