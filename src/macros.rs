//! Macro substitution for tracking URL templates.

use crate::offset::format_content_play_head;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Error codes reported through `[ERRORCODE]`
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum VastErrorCode {
    XmlParsingError,
    WrapperTimeout,
    NoAdsVastResponse,
    GeneralLinearAdError,
    GeneralCompanionAdError,
    UndefinedError,
}

impl VastErrorCode {
    pub fn code(self) -> u16 {
        match self {
            VastErrorCode::XmlParsingError => 100,
            VastErrorCode::WrapperTimeout => 301,
            VastErrorCode::NoAdsVastResponse => 303,
            VastErrorCode::GeneralLinearAdError => 400,
            VastErrorCode::GeneralCompanionAdError => 600,
            VastErrorCode::UndefinedError => 900,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VastMacro {
    ErrorCode,
    ContentPlayHead,
    CacheBusting,
    AssetUri,
}

impl VastMacro {
    const ALL: [VastMacro; 4] = [
        VastMacro::ErrorCode,
        VastMacro::ContentPlayHead,
        VastMacro::CacheBusting,
        VastMacro::AssetUri,
    ];

    fn token(self) -> &'static str {
        match self {
            VastMacro::ErrorCode => "[ERRORCODE]",
            VastMacro::ContentPlayHead => "[CONTENTPLAYHEAD]",
            VastMacro::CacheBusting => "[CACHEBUSTING]",
            VastMacro::AssetUri => "[ASSETURI]",
        }
    }
}

/// Expands macros in one batch of tracking URLs.
///
/// The cache-busting value is drawn once per helper, so every URL in the
/// batch carries the same one. Values that were never supplied expand to
/// the empty string.
#[derive(Debug, Clone)]
pub struct VastMacroHelper {
    uris: Vec<String>,
    error_code: Option<String>,
    content_play_head: Option<String>,
    cache_busting: String,
    asset_uri: Option<String>,
}

impl VastMacroHelper {
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VastMacroHelper {
            uris: uris.into_iter().map(Into::into).collect(),
            error_code: None,
            content_play_head: None,
            cache_busting: cache_busting_string(),
            asset_uri: None,
        }
    }

    pub fn with_error_code(mut self, error_code: Option<VastErrorCode>) -> Self {
        if let Some(error_code) = error_code {
            self.error_code = Some(error_code.code().to_string());
        }
        self
    }

    pub fn with_content_play_head(mut self, millis: Option<u64>) -> Self {
        if let Some(millis) = millis {
            self.content_play_head = Some(format_content_play_head(millis));
        }
        self
    }

    /// The asset URI is form-encoded before substitution.
    pub fn with_asset_uri(mut self, asset_uri: Option<&str>) -> Self {
        if let Some(asset_uri) = asset_uri.filter(|uri| !uri.is_empty()) {
            self.asset_uri = Some(url::form_urlencoded::byte_serialize(asset_uri.as_bytes()).collect());
        }
        self
    }

    pub fn cache_busting(&self) -> &str {
        &self.cache_busting
    }

    /// The batch with every macro replaced. Empty templates are dropped.
    /// Substitution is plain text replacement, so URLs that do not parse
    /// (custom schemes, broken templates) still get their macros expanded.
    pub fn uris(&self) -> Vec<String> {
        self.uris
            .iter()
            .filter(|uri| !uri.is_empty())
            .map(|uri| {
                VastMacro::ALL.iter().fold(uri.clone(), |expanded, &vast_macro| {
                    expanded.replace(vast_macro.token(), self.value(vast_macro))
                })
            })
            .collect()
    }

    fn value(&self, vast_macro: VastMacro) -> &str {
        match vast_macro {
            VastMacro::ErrorCode => self.error_code.as_deref().unwrap_or(""),
            VastMacro::ContentPlayHead => self.content_play_head.as_deref().unwrap_or(""),
            VastMacro::CacheBusting => &self.cache_busting,
            VastMacro::AssetUri => self.asset_uri.as_deref().unwrap_or(""),
        }
    }
}

fn cache_busting_string() -> String {
    format!("{:08}", rand::thread_rng().gen_range(0..100_000_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_macros_replaced() {
        let helper = VastMacroHelper::new([
            "https://t?e=[ERRORCODE]&p=[CONTENTPLAYHEAD]&a=[ASSETURI]&c=[CACHEBUSTING]",
        ])
        .with_error_code(Some(VastErrorCode::XmlParsingError))
        .with_content_play_head(Some(3_723_456))
        .with_asset_uri(Some("https://a/b"));

        let expected = format!(
            "https://t?e=100&p=01:02:03.456&a=https%3A%2F%2Fa%2Fb&c={}",
            helper.cache_busting()
        );
        assert_eq!(helper.uris(), vec![expected]);
        assert_eq!(helper.cache_busting().len(), 8);
        assert!(helper.cache_busting().bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_repeated_tokens_and_missing_values() {
        let helper = VastMacroHelper::new([
            "https://t?[ERRORCODE][CONTENTPLAYHEAD][ERRORCODE]asset[CONTENTPLAYHEAD][ERRORCODE]",
            "https://t?code=[ERRORCODE]&asset=[ASSETURI]",
        ])
        .with_error_code(Some(VastErrorCode::UndefinedError))
        .with_content_play_head(Some(100_000));

        assert_eq!(
            helper.uris(),
            vec![
                "https://t?90000:01:40.000900asset00:01:40.000900".to_string(),
                "https://t?code=900&asset=".to_string(),
            ]
        );
    }

    #[test]
    fn test_asset_uri_special_characters() {
        let helper = VastMacroHelper::new(["[ASSETURI]"])
            .with_asset_uri(Some("https://aaddss.mmooppuubb.ccoomm:123/method?args=one~`!@#$%^&*()_+-[]{}|:,.<>/"));
        assert_eq!(
            helper.uris(),
            vec![
                "https%3A%2F%2Faaddss.mmooppuubb.ccoomm%3A123%2Fmethod%3Fargs%3Done%7E%60%21%40%23%24%25%5E%26*%28%29_%2B-%5B%5D%7B%7D%7C%3A%2C.%3C%3E%2F"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_malformed_urls_still_expanded() {
        let helper = VastMacroHelper::new([
            "htttttt:////oops [CONTENTPLAYHEAD]this [ERRORCODE]is not [ASSETURI]a url",
            "",
            "myapp://deeplink/without/macros",
        ])
        .with_error_code(Some(VastErrorCode::UndefinedError))
        .with_content_play_head(Some(1))
        .with_asset_uri(Some("asset"));

        assert_eq!(
            helper.uris(),
            vec![
                "htttttt:////oops 00:00:00.001this 900is not asseta url".to_string(),
                "myapp://deeplink/without/macros".to_string(),
            ]
        );
    }

    #[test]
    fn test_cache_busting_shared_across_batch() {
        let helper = VastMacroHelper::new(["a=[CACHEBUSTING]", "b=[CACHEBUSTING]"]);
        let uris = helper.uris();
        assert_eq!(uris[0][2..], uris[1][2..]);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(VastErrorCode::WrapperTimeout.code(), 301);
        assert_eq!(VastErrorCode::NoAdsVastResponse.code(), 303);
        assert_eq!(VastErrorCode::GeneralLinearAdError.code(), 400);
        assert_eq!(VastErrorCode::GeneralCompanionAdError.code(), 600);
    }
}
