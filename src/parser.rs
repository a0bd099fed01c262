//! Read-only views over a parsed VAST document.
//!
//! Every accessor is forgiving: an element or attribute that is missing,
//! empty or malformed comes back as `None` or an empty list.

use crate::creative::{CompanionView, ExtensionView, IconView};
use crate::error::Result;
use crate::models::*;
use crate::offset;
use crate::xml::{self, XmlNode};

// Custom MoPub elements appended to the response
const MP_IMPRESSION_TRACKER: &str = "MP_TRACKING_URL";
const CUSTOM_CTA_TEXT: &str = "MoPubCtaText";
const CUSTOM_SKIP_TEXT: &str = "MoPubSkipText";
const CUSTOM_CLOSE_ICON: &str = "MoPubCloseIcon";
const CUSTOM_FORCE_ORIENTATION: &str = "MoPubForceOrientation";

const MAX_CTA_TEXT_LENGTH: usize = 15;
const MAX_SKIP_TEXT_LENGTH: usize = 8;

const CREATIVE_VIEW_TRACKER_THRESHOLD: u32 = 0;
const START_TRACKER_THRESHOLD: u32 = 2000;
const FIRST_QUARTER_MARKER: f32 = 0.25;
const MID_POINT_MARKER: f32 = 0.50;
const THIRD_QUARTER_MARKER: f32 = 0.75;

/// Parse a VAST XML string into a queryable document
pub fn parse_vast(xml: &str) -> Result<VastDocument> {
    Ok(VastDocument {
        root: xml::parse_document(xml)?,
    })
}

/// A parsed VAST response, including any elements the ad server appended
/// next to `<VAST>`
#[derive(Debug, Clone)]
pub struct VastDocument {
    root: XmlNode,
}

impl VastDocument {
    /// Every `<Ad>` in the document, at any depth
    pub fn ads(&self) -> Vec<AdView<'_>> {
        self.root
            .descendants_named("Ad")
            .into_iter()
            .map(|node| AdView { node })
            .collect()
    }

    /// The document-level `<Error>` used for "no ad" responses
    pub fn error_tracker(&self) -> Option<VastTracker> {
        self.root.first_descendant_text("Error").map(VastTracker::new)
    }

    pub fn mopub_impression_trackers(&self) -> Vec<VastTracker> {
        self.root
            .descendants_named(MP_IMPRESSION_TRACKER)
            .into_iter()
            .filter_map(XmlNode::text)
            .map(VastTracker::new)
            .collect()
    }

    pub fn custom_cta_text(&self) -> Option<String> {
        self.custom_text(CUSTOM_CTA_TEXT, MAX_CTA_TEXT_LENGTH)
    }

    pub fn custom_skip_text(&self) -> Option<String> {
        self.custom_text(CUSTOM_SKIP_TEXT, MAX_SKIP_TEXT_LENGTH)
    }

    pub fn custom_close_icon_url(&self) -> Option<String> {
        self.root
            .first_descendant_text(CUSTOM_CLOSE_ICON)
            .map(str::to_string)
    }

    pub fn custom_force_orientation(&self) -> ForceOrientation {
        ForceOrientation::from_key(self.root.first_descendant_text(CUSTOM_FORCE_ORIENTATION))
    }

    fn custom_text(&self, name: &str, max_chars: usize) -> Option<String> {
        self.root
            .first_descendant_text(name)
            .filter(|text| text.chars().count() <= max_chars)
            .map(str::to_string)
    }
}

/// An `<Ad>` element
#[derive(Debug, Clone, Copy)]
pub struct AdView<'a> {
    node: &'a XmlNode,
}

impl<'a> AdView<'a> {
    pub fn sequence(&self) -> Option<&'a str> {
        self.node.attribute("sequence")
    }

    /// The first `<InLine>`; later ones are ignored
    pub fn inline(&self) -> Option<InLineView<'a>> {
        self.node.first_child("InLine").map(|node| InLineView {
            base: BaseView { node },
        })
    }

    /// The first `<Wrapper>`; later ones are ignored
    pub fn wrapper(&self) -> Option<WrapperView<'a>> {
        self.node.first_child("Wrapper").map(|node| WrapperView {
            base: BaseView { node },
        })
    }
}

/// Ad pods are not supported: only stand-alone ads and the first ad of a
/// pod are played. Missing or unparseable sequences count as stand-alone.
pub fn is_valid_sequence_number(sequence: Option<&str>) -> bool {
    match sequence.map(str::trim) {
        None | Some("") => true,
        Some(value) => value.parse::<i64>().map_or(true, |n| n < 2),
    }
}

/// Elements shared by `<InLine>` and `<Wrapper>`
#[derive(Debug, Clone, Copy)]
pub struct BaseView<'a> {
    node: &'a XmlNode,
}

impl<'a> BaseView<'a> {
    pub fn impression_trackers(&self) -> Vec<VastTracker> {
        self.node
            .children_named("Impression")
            .filter_map(XmlNode::text)
            .map(VastTracker::new)
            .collect()
    }

    pub fn error_trackers(&self) -> Vec<VastTracker> {
        self.node
            .children_named("Error")
            .filter_map(XmlNode::text)
            .map(VastTracker::new)
            .collect()
    }

    /// The first `<Linear>` of each `<Creative>` under the first `<Creatives>`
    pub fn linears(&self) -> Vec<LinearView<'a>> {
        self.creatives()
            .filter_map(|creative| creative.first_child("Linear"))
            .map(|node| LinearView { node })
            .collect()
    }

    /// Every `<Companion>` under the first `<CompanionAds>` of each creative
    pub fn companions(&self) -> Vec<CompanionView<'a>> {
        self.creatives()
            .filter_map(|creative| creative.first_child("CompanionAds"))
            .flat_map(|ads| ads.children_named("Companion"))
            .map(CompanionView::new)
            .collect()
    }

    pub fn extensions(&self) -> Vec<ExtensionView<'a>> {
        self.node
            .first_child("Extensions")
            .map(|extensions| {
                extensions
                    .children_named("Extension")
                    .map(ExtensionView::new)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First well-formed viewability tracker among the extensions
    pub fn viewability_tracker(&self) -> Option<VideoViewabilityTracker> {
        self.extensions()
            .iter()
            .find_map(ExtensionView::viewability_tracker)
    }

    fn creatives(&self) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.node
            .first_child("Creatives")
            .into_iter()
            .flat_map(|creatives| creatives.children_named("Creative"))
    }
}

/// A terminal `<InLine>` ad
#[derive(Debug, Clone, Copy)]
pub struct InLineView<'a> {
    pub base: BaseView<'a>,
}

/// A `<Wrapper>` pointing at another VAST document
#[derive(Debug, Clone, Copy)]
pub struct WrapperView<'a> {
    pub base: BaseView<'a>,
}

impl<'a> WrapperView<'a> {
    pub fn vast_ad_tag_uri(&self) -> Option<&'a str> {
        self.base
            .node
            .first_child("VASTAdTagURI")
            .and_then(XmlNode::text)
    }
}

/// A `<Linear>` creative
#[derive(Debug, Clone, Copy)]
pub struct LinearView<'a> {
    node: &'a XmlNode,
}

impl<'a> LinearView<'a> {
    pub fn new(node: &'a XmlNode) -> Self {
        LinearView { node }
    }

    /// Quartile trackers plus `progress` trackers with a percentage offset,
    /// sorted by fraction
    pub fn fractional_progress_trackers(&self) -> Vec<VastFractionalProgressTracker> {
        let mut trackers = Vec::new();
        for (event, fraction) in [
            ("firstQuartile", FIRST_QUARTER_MARKER),
            ("midpoint", MID_POINT_MARKER),
            ("thirdQuartile", THIRD_QUARTER_MARKER),
        ] {
            trackers.extend(
                self.tracker_urls(&[event])
                    .into_iter()
                    .map(|url| VastFractionalProgressTracker::new(url, fraction)),
            );
        }

        for node in self.tracking_nodes(&["progress"]) {
            let (Some(offset), Some(url)) = (node.attribute("offset"), node.text()) else {
                continue;
            };
            if let Some(fraction) = offset::parse_percentage_offset(offset) {
                trackers.push(VastFractionalProgressTracker::new(url, fraction));
            }
        }

        trackers.sort_by(|a, b| a.tracking_fraction.total_cmp(&b.tracking_fraction));
        trackers
    }

    /// `start` trackers at two seconds, `progress` trackers with an absolute
    /// offset, and `creativeView` trackers at zero, sorted by offset
    pub fn absolute_progress_trackers(&self) -> Vec<VastAbsoluteProgressTracker> {
        let mut trackers: Vec<_> = self
            .tracker_urls(&["start"])
            .into_iter()
            .map(|url| VastAbsoluteProgressTracker::new(url, START_TRACKER_THRESHOLD))
            .collect();

        for node in self.tracking_nodes(&["progress"]) {
            let (Some(offset), Some(url)) = (node.attribute("offset"), node.text()) else {
                continue;
            };
            if let Some(millis) = offset::parse_absolute_offset(offset) {
                trackers.push(VastAbsoluteProgressTracker::new(url, millis));
            }
        }

        trackers.extend(
            self.tracker_urls(&["creativeView"])
                .into_iter()
                .map(|url| VastAbsoluteProgressTracker::new(url, CREATIVE_VIEW_TRACKER_THRESHOLD)),
        );

        trackers.sort_by_key(|tracker| tracker.tracking_milliseconds);
        trackers
    }

    pub fn complete_trackers(&self) -> Vec<VastTracker> {
        self.trackers(&["complete"])
    }

    pub fn pause_trackers(&self) -> Vec<VastTracker> {
        self.tracker_urls(&["pause"])
            .into_iter()
            .map(VastTracker::repeatable)
            .collect()
    }

    pub fn resume_trackers(&self) -> Vec<VastTracker> {
        self.tracker_urls(&["resume"])
            .into_iter()
            .map(VastTracker::repeatable)
            .collect()
    }

    pub fn close_trackers(&self) -> Vec<VastTracker> {
        self.trackers(&["close", "closeLinear"])
    }

    pub fn skip_trackers(&self) -> Vec<VastTracker> {
        self.trackers(&["skip"])
    }

    pub fn click_through_url(&self) -> Option<&'a str> {
        self.node
            .first_child("VideoClicks")
            .and_then(|clicks| clicks.first_child("ClickThrough"))
            .and_then(XmlNode::text)
    }

    pub fn click_trackers(&self) -> Vec<VastTracker> {
        self.node
            .first_child("VideoClicks")
            .map(|clicks| {
                clicks
                    .children_named("ClickTracking")
                    .filter_map(XmlNode::text)
                    .map(VastTracker::new)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw `skipoffset` attribute, `HH:MM:SS[.mmm]` or `n%`
    pub fn skip_offset(&self) -> Option<String> {
        self.node
            .attribute("skipoffset")
            .map(str::trim)
            .filter(|offset| !offset.is_empty())
            .map(str::to_string)
    }

    pub fn media_files(&self) -> Vec<MediaView<'a>> {
        self.node
            .first_child("MediaFiles")
            .map(|files| files.children_named("MediaFile").map(MediaView::new).collect())
            .unwrap_or_default()
    }

    pub fn icons(&self) -> Vec<IconView<'a>> {
        self.node
            .first_child("Icons")
            .map(|icons| icons.children_named("Icon").map(IconView::new).collect())
            .unwrap_or_default()
    }

    fn tracking_nodes(&self, events: &[&str]) -> Vec<&'a XmlNode> {
        self.node
            .first_child("TrackingEvents")
            .map(|events_node| {
                events_node
                    .children_with_attribute("Tracking", "event", events)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn tracker_urls(&self, events: &[&str]) -> Vec<&'a str> {
        self.tracking_nodes(events)
            .into_iter()
            .filter_map(XmlNode::text)
            .collect()
    }

    fn trackers(&self, events: &[&str]) -> Vec<VastTracker> {
        self.tracker_urls(events)
            .into_iter()
            .map(VastTracker::new)
            .collect()
    }
}

/// A `<MediaFile>`
#[derive(Debug, Clone, Copy)]
pub struct MediaView<'a> {
    node: &'a XmlNode,
}

impl<'a> MediaView<'a> {
    pub fn new(node: &'a XmlNode) -> Self {
        MediaView { node }
    }

    pub fn media_type(&self) -> Option<&'a str> {
        self.node.attribute("type")
    }

    pub fn width(&self) -> Option<i32> {
        self.node.attribute_as_int("width")
    }

    pub fn height(&self) -> Option<i32> {
        self.node.attribute_as_int("height")
    }

    pub fn url(&self) -> Option<&'a str> {
        self.node.text()
    }
}
