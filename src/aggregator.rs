//! Resolves a VAST response, following wrapper redirects, into a single
//! playable [`VastVideoConfig`].

use crate::creative::{CompanionView, IconView};
use crate::host::TrackerDispatcher;
use crate::macros::{VastErrorCode, VastMacroHelper};
use crate::models::{ResourceType, VastCompanionAdConfig, VastIconConfig, VastResource, VastTracker};
use crate::network::VastFetcher;
use crate::parser::{self, InLineView, LinearView, MediaView, VastDocument, WrapperView};
use crate::settings::Settings;
use crate::video_config::{CompanionOrientation, VastVideoConfig};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

const VIDEO_MIME_TYPES: [&str; 2] = ["video/mp4", "video/3gpp"];

const ASPECT_RATIO_WEIGHT: f64 = 70.0;
const AREA_WEIGHT: f64 = 30.0;

const MINIMUM_COMPANION_AD_WIDTH: i32 = 300;
const MINIMUM_COMPANION_AD_HEIGHT: i32 = 250;
const MAXIMUM_ICON_DIMENSION: i32 = 300;

/// Padding the host's web surface adds around a companion
const WEBVIEW_PADDING: i32 = 16;

/// Why no playable ad came out of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoAdReason {
    MalformedXml,
    /// A document carried no `<Ad>` at all
    EmptyResponse,
    RedirectLimitReached,
    WrapperFetchFailed,
    /// Ads were present but none had a usable media file
    NoPlayableMedia,
}

impl fmt::Display for NoAdReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            NoAdReason::MalformedXml => "malformed VAST XML",
            NoAdReason::EmptyResponse => "VAST response without ads",
            NoAdReason::RedirectLimitReached => "too many VAST redirects",
            NoAdReason::WrapperFetchFailed => "VAST redirect could not be fetched",
            NoAdReason::NoPlayableMedia => "no playable media file",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Ready(VastVideoConfig),
    NoAd(NoAdReason),
}

impl Aggregation {
    pub fn into_config(self) -> Option<VastVideoConfig> {
        match self {
            Aggregation::Ready(config) => Some(config),
            Aggregation::NoAd(_) => None,
        }
    }
}

/// One document on the wrapper chain
struct Frame {
    document: VastDocument,
    /// Next `<Ad>` to evaluate
    next_ad: usize,
    /// Error trackers of every wrapper above this document
    error_trackers: Vec<VastTracker>,
    /// Wrapper ad whose redirect is being evaluated below this frame
    pending_wrapper: Option<usize>,
}

enum Step {
    Resolved(VastVideoConfig),
    Follow { xml: String, error_trackers: Vec<VastTracker> },
    Exhausted,
}

/// State of one [`Aggregator::resolve`] call
struct Walk {
    redirects_followed: u32,
    reason: NoAdReason,
}

/// Walks wrapper chains. Redirects are fetched through `fetcher`; error
/// trackers are fired through `dispatcher` as problems are found.
pub struct Aggregator<F, D> {
    settings: Settings,
    fetcher: F,
    dispatcher: D,
}

impl<F: VastFetcher, D: TrackerDispatcher> Aggregator<F, D> {
    pub fn new(settings: Settings, fetcher: F, dispatcher: D) -> Self {
        Aggregator {
            settings,
            fetcher,
            dispatcher,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve `xml` into a config. At most `max_redirects` wrapper
    /// redirects are followed across the whole chain.
    ///
    /// The chain is walked with an explicit stack of documents. When an
    /// InLine yields a config, the stack unwinds and every wrapper on the way
    /// up merges its trackers into it.
    pub fn resolve(&self, xml: &str) -> Aggregation {
        let mut walk = Walk {
            redirects_followed: 0,
            reason: NoAdReason::NoPlayableMedia,
        };
        let mut stack = Vec::new();
        match self.open(xml, Vec::new(), &mut walk) {
            Some(frame) => stack.push(frame),
            None => return Aggregation::NoAd(walk.reason),
        }

        // Result handed back by the frame that was just popped
        let mut returned: Option<Option<VastVideoConfig>> = None;

        loop {
            let Some(frame) = stack.last_mut() else {
                return match returned.flatten() {
                    Some(config) => Aggregation::Ready(config),
                    None => Aggregation::NoAd(walk.reason),
                };
            };

            if let Some(result) = returned.take() {
                let wrapper_index = frame.pending_wrapper.take();
                if let (Some(mut config), Some(index)) = (result, wrapper_index) {
                    let ads = frame.document.ads();
                    if let Some(wrapper) = ads.get(index).and_then(|ad| ad.wrapper()) {
                        self.merge_wrapper(wrapper, &mut config);
                    }
                    populate_mopub_custom_elements(&frame.document, &mut config);
                    stack.pop();
                    returned = Some(Some(config));
                    continue;
                }
                // Nothing down that chain; carry on with the next ad
            }

            match self.advance(frame, &mut walk) {
                Step::Resolved(config) => {
                    stack.pop();
                    returned = Some(Some(config));
                }
                Step::Follow { xml, error_trackers } => match self.open(&xml, error_trackers, &mut walk) {
                    Some(frame) => stack.push(frame),
                    None => returned = Some(None),
                },
                Step::Exhausted => {
                    stack.pop();
                    returned = Some(None);
                }
            }
        }
    }

    /// Parse one document of the chain. Documents that cannot be used fire
    /// the relevant error trackers and yield `None`.
    fn open(&self, xml: &str, error_trackers: Vec<VastTracker>, walk: &mut Walk) -> Option<Frame> {
        let document = match parser::parse_vast(xml) {
            Ok(document) => document,
            Err(e) => {
                debug!("Failed to parse VAST XML: {e}");
                self.fire_error_trackers(&error_trackers, VastErrorCode::XmlParsingError);
                walk.reason = NoAdReason::MalformedXml;
                return None;
            }
        };

        if document.ads().is_empty() {
            // A document with only an <Error> is a "no ad" response
            if let Some(error_tracker) = document.error_tracker() {
                let code = if walk.redirects_followed > 0 {
                    VastErrorCode::NoAdsVastResponse
                } else {
                    VastErrorCode::UndefinedError
                };
                self.fire_error_trackers(&[error_tracker], code);
            }
            walk.reason = NoAdReason::EmptyResponse;
            return None;
        }

        Some(Frame {
            document,
            next_ad: 0,
            error_trackers,
            pending_wrapper: None,
        })
    }

    /// Evaluate the frame's remaining ads until one resolves or asks for a
    /// redirect to be followed.
    fn advance(&self, frame: &mut Frame, walk: &mut Walk) -> Step {
        let ads = frame.document.ads();

        while frame.next_ad < ads.len() {
            let index = frame.next_ad;
            frame.next_ad += 1;
            let ad = ads[index];

            if !parser::is_valid_sequence_number(ad.sequence()) {
                continue;
            }

            if let Some(inline) = ad.inline() {
                if let Some(mut config) = self.evaluate_inline(inline, &frame.error_trackers) {
                    populate_mopub_custom_elements(&frame.document, &mut config);
                    return Step::Resolved(config);
                }
            }

            let Some(wrapper) = ad.wrapper() else {
                continue;
            };
            let mut wrapper_error_trackers = frame.error_trackers.clone();
            wrapper_error_trackers.extend(wrapper.base.error_trackers());

            let Some(redirect_url) = wrapper.vast_ad_tag_uri() else {
                continue;
            };
            if walk.redirects_followed >= self.settings.max_redirects {
                debug!("Not following VAST redirect to {redirect_url}: limit reached");
                walk.reason = NoAdReason::RedirectLimitReached;
                continue;
            }
            walk.redirects_followed += 1;

            info!("Following VAST redirect to {redirect_url}");
            match self.fetcher.fetch(redirect_url) {
                Ok(xml) => {
                    frame.pending_wrapper = Some(index);
                    return Step::Follow {
                        xml,
                        error_trackers: wrapper_error_trackers,
                    };
                }
                Err(e) => {
                    warn!("Failed to follow VAST redirect: {e}");
                    if !wrapper_error_trackers.is_empty() {
                        self.fire_error_trackers(&wrapper_error_trackers, VastErrorCode::WrapperTimeout);
                    }
                    walk.reason = NoAdReason::WrapperFetchFailed;
                }
            }
        }

        Step::Exhausted
    }

    /// The first linear with a playable media file becomes the config.
    fn evaluate_inline(&self, inline: InLineView<'_>, error_trackers: &[VastTracker]) -> Option<VastVideoConfig> {
        for linear in inline.base.linears() {
            let Some(media_url) = self.best_media_file_url(&linear.media_files()) else {
                continue;
            };

            let mut config = VastVideoConfig::new();
            config.add_impression_trackers(inline.base.impression_trackers());
            self.populate_linear_trackers_and_icon(&linear, &mut config);

            // Only InLine linears carry a click-through and media
            config.click_through_url = linear.click_through_url().map(str::to_string);
            config.network_media_file_url = Some(media_url);

            let companions = inline.base.companions();
            config.set_companion_ads(
                self.best_companion_ad(&companions, CompanionOrientation::Landscape),
                self.best_companion_ad(&companions, CompanionOrientation::Portrait),
            );
            config.viewability_tracker = inline.base.viewability_tracker();

            config.add_error_trackers(error_trackers.iter().cloned());
            config.add_error_trackers(inline.base.error_trackers());
            return Some(config);
        }

        None
    }

    fn merge_wrapper(&self, wrapper: WrapperView<'_>, config: &mut VastVideoConfig) {
        config.add_impression_trackers(wrapper.base.impression_trackers());
        for linear in wrapper.base.linears() {
            self.populate_linear_trackers_and_icon(&linear, config);
        }

        if config.viewability_tracker.is_none() {
            config.viewability_tracker = wrapper.base.viewability_tracker();
        }

        let companions = wrapper.base.companions();
        if !config.has_companion_ad() {
            config.set_companion_ads(
                self.best_companion_ad(&companions, CompanionOrientation::Landscape),
                self.best_companion_ad(&companions, CompanionOrientation::Portrait),
            );
            return;
        }

        // Resource-less wrapper companions only contribute trackers
        for companion in companions.iter().filter(|companion| !companion.has_resources()) {
            for resolved in [
                config.landscape_companion_ad.as_mut(),
                config.portrait_companion_ad.as_mut(),
            ]
            .into_iter()
            .flatten()
            {
                resolved.add_click_trackers(companion.click_trackers());
                resolved.add_creative_view_trackers(companion.creative_view_trackers());
            }
        }
    }

    /// Skip offset and icon are only taken when no deeper document set them.
    fn populate_linear_trackers_and_icon(&self, linear: &LinearView<'_>, config: &mut VastVideoConfig) {
        config.add_absolute_trackers(linear.absolute_progress_trackers());
        config.add_fractional_trackers(linear.fractional_progress_trackers());
        config.add_pause_trackers(linear.pause_trackers());
        config.add_resume_trackers(linear.resume_trackers());
        config.add_complete_trackers(linear.complete_trackers());
        config.add_close_trackers(linear.close_trackers());
        config.add_skip_trackers(linear.skip_trackers());
        config.add_click_trackers(linear.click_trackers());

        if config.skip_offset.is_none() {
            config.skip_offset = linear.skip_offset();
        }
        if config.icon_config.is_none() {
            config.icon_config = self.best_icon(&linear.icons());
        }
    }

    /// URL of the supported media file closest to the screen's shape and size
    pub fn best_media_file_url(&self, media_files: &[MediaView<'_>]) -> Option<String> {
        let mut best: Option<(f64, &str)> = None;

        for media in media_files {
            let supported = media.media_type().is_some_and(|mime| VIDEO_MIME_TYPES.contains(&mime));
            let (Some(url), true) = (media.url(), supported) else {
                continue;
            };
            let (Some(width), Some(height)) = (media.width(), media.height()) else {
                continue;
            };
            if width <= 0 || height <= 0 {
                continue;
            }

            let fitness = self.calculate_fitness(width, height);
            if best.map_or(true, |(best_fitness, _)| fitness < best_fitness) {
                best = Some((fitness, url));
            }
        }

        best.map(|(_, url)| url.to_string())
    }

    /// Best companion for `orientation`. Resource types are tried in priority
    /// order and the first type with any usable companion wins.
    pub fn best_companion_ad(
        &self,
        companions: &[CompanionView<'_>],
        orientation: CompanionOrientation,
    ) -> Option<VastCompanionAdConfig> {
        for resource_type in ResourceType::PRIORITY {
            let mut best: Option<(f64, &CompanionView<'_>, VastResource, (i32, i32))> = None;

            for companion in companions {
                let (Some(width), Some(height)) = (companion.width(), companion.height()) else {
                    continue;
                };
                if width < MINIMUM_COMPANION_AD_WIDTH || height < MINIMUM_COMPANION_AD_HEIGHT {
                    continue;
                }

                let (scaled_width, scaled_height) = self.scaled_dimensions(width, height);
                let Some(resource) = companion
                    .resources()
                    .to_resource(resource_type, scaled_width, scaled_height)
                else {
                    continue;
                };

                let fitness = match orientation {
                    CompanionOrientation::Portrait => self.calculate_fitness(height, width),
                    CompanionOrientation::Landscape => self.calculate_fitness(width, height),
                };
                if best.as_ref().map_or(true, |(best_fitness, ..)| fitness < *best_fitness) {
                    best = Some((fitness, companion, resource, (scaled_width, scaled_height)));
                }
            }

            if let Some((_, companion, resource, (width, height))) = best {
                return Some(VastCompanionAdConfig {
                    width,
                    height,
                    resource,
                    click_through_url: companion.click_through_url().map(str::to_string),
                    click_trackers: companion.click_trackers(),
                    creative_view_trackers: companion.creative_view_trackers(),
                });
            }
        }

        None
    }

    /// Fit `width` x `height` onto the landscape screen, keeping the aspect
    /// ratio and leaving room for the surface padding. Dimensions that
    /// already fit, or that would scale to nothing, are returned unchanged.
    pub fn scaled_dimensions(&self, width: i32, height: i32) -> (i32, i32) {
        let (x, y) = (self.settings.screen_width, self.settings.screen_height);
        let screen_width = x.max(y);
        let screen_height = x.min(y);

        if width <= screen_width && height <= screen_height {
            return (width, height);
        }

        let width_ratio = width as f32 / screen_width as f32;
        let height_ratio = height as f32 / screen_height as f32;

        let (scaled_width, scaled_height) = if width_ratio >= height_ratio {
            (
                screen_width - WEBVIEW_PADDING,
                (height as f32 / width_ratio) as i32 - WEBVIEW_PADDING,
            )
        } else {
            (
                (width as f32 / height_ratio) as i32 - WEBVIEW_PADDING,
                screen_height - WEBVIEW_PADDING,
            )
        };

        if scaled_width < 0 || scaled_height < 0 {
            return (width, height);
        }
        (scaled_width, scaled_height)
    }

    /// First icon, by resource type priority, no larger than 300x300
    pub fn best_icon(&self, icons: &[IconView<'_>]) -> Option<VastIconConfig> {
        let fits = |dimension: Option<i32>| dimension.is_some_and(|d| d > 0 && d <= MAXIMUM_ICON_DIMENSION);

        for resource_type in ResourceType::PRIORITY {
            for icon in icons {
                if !fits(icon.width()) || !fits(icon.height()) {
                    continue;
                }
                let (Some(width), Some(height)) = (icon.width(), icon.height()) else {
                    continue;
                };
                if let Some(resource) = icon.resources().to_resource(resource_type, width, height) {
                    return Some(icon.to_config(width, height, resource));
                }
            }
        }

        None
    }

    /// Closer to zero is better. Aspect ratio weighs more than area.
    pub fn calculate_fitness(&self, width: i32, height: i32) -> f64 {
        let aspect_ratio = f64::from(width) / f64::from(height);
        let area = f64::from(width) * f64::from(height);
        let aspect_ratio_ratio = aspect_ratio / self.settings.screen_aspect_ratio();
        let area_ratio = area / self.settings.screen_area();
        ASPECT_RATIO_WEIGHT * aspect_ratio_ratio.ln().abs() + AREA_WEIGHT * area_ratio.ln().abs()
    }

    fn fire_error_trackers(&self, trackers: &[VastTracker], code: VastErrorCode) {
        let urls = VastMacroHelper::new(trackers.iter().map(|tracker| tracker.url.clone()))
            .with_error_code(Some(code))
            .uris();
        for url in urls {
            debug!("Firing error tracker {url}");
            self.dispatcher.fire_and_forget(&url);
        }
    }
}

/// MoPub elements appended next to `<VAST>`. Impression trackers always
/// accumulate; the other values keep whatever a deeper document set.
fn populate_mopub_custom_elements(document: &VastDocument, config: &mut VastVideoConfig) {
    config.add_impression_trackers(document.mopub_impression_trackers());

    if config.custom_cta_text.is_none() {
        config.custom_cta_text = document.custom_cta_text();
    }
    if config.custom_skip_text.is_none() {
        config.custom_skip_text = document.custom_skip_text();
    }
    if config.custom_close_icon_url.is_none() {
        config.custom_close_icon_url = document.custom_close_icon_url();
    }
    if !config.is_custom_force_orientation_set() {
        config.set_custom_force_orientation(document.custom_force_orientation());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::InMemoryFetcher;
    use crate::xml::XmlNode;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        fired: RefCell<Vec<String>>,
    }

    impl TrackerDispatcher for Recorder {
        fn fire_and_forget(&self, url: &str) {
            self.fired.borrow_mut().push(url.to_string());
        }
    }

    fn aggregator() -> Aggregator<InMemoryFetcher, Recorder> {
        let settings = Settings {
            screen_width: 1280,
            screen_height: 720,
            ..Settings::default()
        };
        Aggregator::new(settings, InMemoryFetcher::new(), Recorder::default())
    }

    fn media_document(media: &str) -> XmlNode {
        crate::xml::parse_document(&format!("<MediaFiles>{media}</MediaFiles>")).unwrap()
    }

    fn media_views(root: &XmlNode) -> Vec<MediaView<'_>> {
        root.descendants_named("MediaFile")
            .into_iter()
            .map(MediaView::new)
            .collect()
    }

    #[test]
    fn test_best_media_prefers_screen_shape() {
        let root = media_document(
            r#"<MediaFile type="video/mp4" width="640" height="480"><![CDATA[https://v/4x3.mp4]]></MediaFile>
               <MediaFile type="video/mp4" width="1280" height="720"><![CDATA[https://v/16x9.mp4]]></MediaFile>
               <MediaFile type="video/webm" width="1280" height="720"><![CDATA[https://v/16x9.webm]]></MediaFile>"#,
        );
        assert_eq!(
            aggregator().best_media_file_url(&media_views(&root)).as_deref(),
            Some("https://v/16x9.mp4")
        );
    }

    #[test]
    fn test_best_media_skips_invalid_entries() {
        let root = media_document(
            r#"<MediaFile type="video/mp4" width="0" height="480">https://v/zero.mp4</MediaFile>
               <MediaFile type="video/mp4" width="oops" height="480">https://v/bad.mp4</MediaFile>
               <MediaFile type="video/3gpp" width="1280" height="720"></MediaFile>"#,
        );
        assert_eq!(aggregator().best_media_file_url(&media_views(&root)), None);
    }

    #[test]
    fn test_fitness_is_zero_for_screen_size() {
        let aggregator = aggregator();
        assert!(aggregator.calculate_fitness(1280, 720).abs() < 1e-9);
        assert!(aggregator.calculate_fitness(640, 360) > 0.0);
        assert!(aggregator.calculate_fitness(720, 1280) > aggregator.calculate_fitness(640, 360));
    }

    #[test]
    fn test_scaled_dimensions() {
        let aggregator = aggregator();
        assert_eq!(aggregator.scaled_dimensions(300, 250), (300, 250));
        // Twice the screen width: scaled by the width ratio, minus padding
        assert_eq!(aggregator.scaled_dimensions(2560, 720), (1264, 344));
        assert_eq!(aggregator.scaled_dimensions(640, 1440), (304, 704));
    }

    #[test]
    fn test_no_ad_reason_display() {
        assert_eq!(NoAdReason::RedirectLimitReached.to_string(), "too many VAST redirects");
    }
}
