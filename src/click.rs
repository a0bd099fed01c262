//! Click-through resolution.

use crate::host::{Navigator, TrackerDispatcher};
use log::debug;
use url::Url;

pub const NATIVE_BROWSER_SCHEME: &str = "mopubnativebrowser";
pub const DEEP_LINK_WITH_FALLBACK_SCHEME: &str = "deeplink+";

/// What a click-through URL asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickResolution {
    /// `about:` links are ignored
    Ignored,
    /// Open `url` in the system browser; unwrapped from the native-browser scheme
    OpenNativeBrowser(String),
    OpenAppMarket(String),
    OpenInAppBrowser(String),
    DeepLinkWithFallback {
        primary_url: String,
        primary_tracking_urls: Vec<String>,
        fallback_url: Option<String>,
        fallback_tracking_urls: Vec<String>,
    },
    FollowDeepLink(String),
    /// Nothing can handle the URL
    Failed(String),
}

/// Classify a click-through URL. Never panics; malformed input resolves to
/// [`ClickResolution::Failed`].
pub fn resolve_click_through(raw: &str) -> ClickResolution {
    let raw = raw.trim();
    if raw.is_empty() {
        return ClickResolution::Failed("empty url".to_string());
    }

    // Market links may come without a scheme
    if raw.starts_with("play.google.com/") || raw.starts_with("market.android.com/") {
        return ClickResolution::OpenAppMarket(raw.to_string());
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => return ClickResolution::Failed(format!("unparseable url: {e}")),
    };

    match url.scheme() {
        "about" => ClickResolution::Ignored,
        NATIVE_BROWSER_SCHEME => native_browser_destination(&url),
        "market" => ClickResolution::OpenAppMarket(raw.to_string()),
        _ if matches!(url.host_str(), Some("play.google.com" | "market.android.com")) => {
            ClickResolution::OpenAppMarket(raw.to_string())
        }
        "http" | "https" => ClickResolution::OpenInAppBrowser(raw.to_string()),
        scheme if scheme.eq_ignore_ascii_case(DEEP_LINK_WITH_FALLBACK_SCHEME) => {
            deep_link_with_fallback(&url)
        }
        _ if url.host_str().is_some_and(|host| !host.is_empty()) => {
            ClickResolution::FollowDeepLink(raw.to_string())
        }
        _ => ClickResolution::Failed(format!("no handler for {raw}")),
    }
}

/// `mopubnativebrowser://navigate?url=<encoded destination>`
fn native_browser_destination(url: &Url) -> ClickResolution {
    if url.host_str() != Some("navigate") {
        return ClickResolution::Failed(format!("native browser url without navigate host: {url}"));
    }
    match query_parameter(url, "url") {
        Some(destination) if !destination.is_empty() => ClickResolution::OpenNativeBrowser(destination),
        _ => ClickResolution::Failed(format!("native browser url without url parameter: {url}")),
    }
}

fn deep_link_with_fallback(url: &Url) -> ClickResolution {
    if !url.host_str().is_some_and(|host| host.eq_ignore_ascii_case("navigate")) {
        return ClickResolution::Failed("deeplink+ url did not have 'navigate' as the host".to_string());
    }

    let Some(primary_url) = query_parameter(url, "primaryUrl") else {
        return ClickResolution::Failed("deeplink+ did not have 'primaryUrl' query param".to_string());
    };
    let fallback_url = query_parameter(url, "fallbackUrl");

    // Nested deeplink+ urls are not allowed
    let is_nested = |candidate: &str| {
        Url::parse(candidate)
            .is_ok_and(|nested| nested.scheme().eq_ignore_ascii_case(DEEP_LINK_WITH_FALLBACK_SCHEME))
    };
    if is_nested(&primary_url) || fallback_url.as_deref().is_some_and(is_nested) {
        return ClickResolution::Failed("deeplink+ nested inside deeplink+".to_string());
    }

    ClickResolution::DeepLinkWithFallback {
        primary_url,
        primary_tracking_urls: query_parameters(url, "primaryTrackingUrl"),
        fallback_url,
        fallback_tracking_urls: query_parameters(url, "fallbackTrackingUrl"),
    }
}

fn query_parameter(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn query_parameters(url: &Url, key: &str) -> Vec<String> {
    url.query_pairs()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .collect()
}

/// Which resolutions a click surface may act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickPolicy {
    /// Video and companion clicks: browsers, app market and deep links
    Full,
    /// Icon clicks: browsers only
    BrowserOnly,
}

impl ClickPolicy {
    fn permits(self, resolution: &ClickResolution) -> bool {
        match self {
            ClickPolicy::Full => true,
            ClickPolicy::BrowserOnly => matches!(
                resolution,
                ClickResolution::Ignored
                    | ClickResolution::OpenNativeBrowser(_)
                    | ClickResolution::OpenInAppBrowser(_)
                    | ClickResolution::Failed(_)
            ),
        }
    }
}

/// Resolve `raw` and act on it. Returns the URL that was opened, if any.
pub fn handle_click_through<N, D>(
    raw: &str,
    policy: ClickPolicy,
    navigator: &N,
    dispatcher: &D,
) -> Option<String>
where
    N: Navigator + ?Sized,
    D: TrackerDispatcher + ?Sized,
{
    let resolution = resolve_click_through(raw);
    if !policy.permits(&resolution) {
        debug!("Click-through {raw} not supported here");
        return None;
    }

    match resolution {
        ClickResolution::Ignored => {
            debug!("Link to about page ignored.");
            None
        }
        ClickResolution::OpenNativeBrowser(url)
        | ClickResolution::OpenAppMarket(url)
        | ClickResolution::OpenInAppBrowser(url)
        | ClickResolution::FollowDeepLink(url) => {
            navigator.open_url(&url);
            Some(url)
        }
        ClickResolution::DeepLinkWithFallback {
            primary_url,
            primary_tracking_urls,
            fallback_url,
            fallback_tracking_urls,
        } => {
            if navigator.can_open(&primary_url) {
                navigator.open_url(&primary_url);
                fire_all(&primary_tracking_urls, dispatcher);
                return Some(primary_url);
            }
            let Some(fallback_url) = fallback_url else {
                debug!("Unable to handle 'primaryUrl' for deeplink+ and 'fallbackUrl' was missing.");
                return None;
            };
            let opened = handle_click_through(&fallback_url, policy, navigator, dispatcher);
            if opened.is_some() {
                fire_all(&fallback_tracking_urls, dispatcher);
            }
            opened
        }
        ClickResolution::Failed(reason) => {
            debug!("Click-through not handled: {reason}");
            None
        }
    }
}

fn fire_all<D: TrackerDispatcher + ?Sized>(urls: &[String], dispatcher: &D) {
    for url in urls {
        dispatcher.fire_and_forget(url);
    }
}
