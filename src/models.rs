use serde::{Deserialize, Serialize};

/// A tracking URL fired on a playback event
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct VastTracker {
    /// URL template, may contain macros such as `[CONTENTPLAYHEAD]`
    pub url: String,

    /// Repeatable trackers (pause, resume) fire on every occurrence
    #[serde(default)]
    pub repeatable: bool,
}

impl VastTracker {
    pub fn new(url: impl Into<String>) -> Self {
        VastTracker {
            url: url.into(),
            repeatable: false,
        }
    }

    pub fn repeatable(url: impl Into<String>) -> Self {
        VastTracker {
            url: url.into(),
            repeatable: true,
        }
    }
}

/// A tracker due once playback reaches a fixed position
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct VastAbsoluteProgressTracker {
    pub url: String,

    /// Offset from the start of the video
    pub tracking_milliseconds: u32,
}

impl VastAbsoluteProgressTracker {
    pub fn new(url: impl Into<String>, tracking_milliseconds: u32) -> Self {
        VastAbsoluteProgressTracker {
            url: url.into(),
            tracking_milliseconds,
        }
    }
}

/// A tracker due once playback reaches a fraction of the duration
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct VastFractionalProgressTracker {
    pub url: String,

    /// Fraction of the duration in `[0, 1]`
    pub tracking_fraction: f32,
}

impl VastFractionalProgressTracker {
    pub fn new(url: impl Into<String>, tracking_fraction: f32) -> Self {
        VastFractionalProgressTracker {
            url: url.into(),
            tracking_fraction,
        }
    }

    /// Position at which this tracker becomes due for a video of `duration_millis`.
    pub fn threshold_millis(&self, duration_millis: u32) -> f64 {
        f64::from(self.tracking_fraction) * f64::from(duration_millis)
    }
}

/// Tracker from the `MoPubViewabilityTracker` extension
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct VideoViewabilityTracker {
    pub url: String,

    /// How long the video must play while viewable
    pub viewable_playtime_millis: u32,

    /// Share of the player that must be on screen, 0 to 100
    pub percent_viewable: u8,
}

/// Resource kinds in selection priority order
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum ResourceType {
    StaticResource,
    HtmlResource,
    IframeResource,
}

impl ResourceType {
    pub const PRIORITY: [ResourceType; 3] = [
        ResourceType::StaticResource,
        ResourceType::HtmlResource,
        ResourceType::IframeResource,
    ];
}

/// Creative kind of a static resource
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum CreativeType {
    None,
    Image,
    Javascript,
}

const VALID_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/bmp", "image/gif"];
const VALID_APPLICATION_TYPES: [&str; 1] = ["application/x-javascript"];

impl CreativeType {
    /// Creative type of a static resource MIME type, `None` when unsupported
    pub fn from_mime_type(mime_type: &str) -> Option<CreativeType> {
        let mime_type = mime_type.trim().to_lowercase();
        if VALID_IMAGE_TYPES.contains(&mime_type.as_str()) {
            Some(CreativeType::Image)
        } else if VALID_APPLICATION_TYPES.contains(&mime_type.as_str()) {
            Some(CreativeType::Javascript)
        } else {
            None
        }
    }
}

/// A renderable creative: an image or script URL, an HTML fragment, or an
/// IFrame URL. Only constructed in a valid state.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct VastResource {
    resource: String,
    resource_type: ResourceType,
    creative_type: CreativeType,
    width: i32,
    height: i32,
}

impl VastResource {
    /// Returns `None` when a static resource is not an image or script, or
    /// when any other resource carries a creative type.
    pub fn new(
        resource: impl Into<String>,
        resource_type: ResourceType,
        creative_type: CreativeType,
        width: i32,
        height: i32,
    ) -> Option<Self> {
        let valid = match resource_type {
            ResourceType::StaticResource => creative_type != CreativeType::None,
            ResourceType::HtmlResource | ResourceType::IframeResource => {
                creative_type == CreativeType::None
            }
        };
        if !valid {
            return None;
        }
        Some(VastResource {
            resource: resource.into(),
            resource_type,
            creative_type,
            width,
            height,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn creative_type(&self) -> CreativeType {
        self.creative_type
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Markup for a web surface to load.
    pub fn html(&self) -> String {
        match (self.resource_type, self.creative_type) {
            (ResourceType::IframeResource, _) => format!(
                "<iframe frameborder=\"0\" scrolling=\"no\" marginheight=\"0\" marginwidth=\"0\" \
                 style=\"border: 0px; margin: 0px;\" width=\"{}\" height=\"{}\" src=\"{}\"></iframe>",
                self.width, self.height, self.resource
            ),
            (ResourceType::HtmlResource, _) => self.resource.clone(),
            (ResourceType::StaticResource, CreativeType::Javascript) => {
                format!("<script src=\"{}\"></script>", self.resource)
            }
            // Zero margin and padding so the image is not cut off by the surface
            (ResourceType::StaticResource, _) => format!(
                "<html><head></head><body style=\"margin:0;padding:0\">\
                 <img src=\"{}\" width=\"100%\" style=\"max-width:100%;max-height:100%;\" />\
                 </body></html>",
                self.resource
            ),
        }
    }

    /// Static images have no click handling of their own, so the VAST
    /// click-through applies. Everything else navigates to whatever URL the
    /// rendering surface reported.
    pub fn correct_click_through_url<'a>(
        &self,
        vast_click_through_url: Option<&'a str>,
        surface_click_through_url: Option<&'a str>,
    ) -> Option<&'a str> {
        match (self.resource_type, self.creative_type) {
            (ResourceType::StaticResource, CreativeType::Image) => vast_click_through_url,
            _ => surface_click_through_url,
        }
    }
}

/// An overlay icon shown during a window of playback
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct VastIconConfig {
    pub width: i32,
    pub height: i32,

    /// Position at which the icon appears; absent offsets mean from the start
    pub offset_millis: u32,

    /// How long the icon stays visible; `None` keeps it up until the end
    pub duration_millis: Option<u32>,

    pub resource: VastResource,
    pub click_trackers: Vec<VastTracker>,
    pub click_through_url: Option<String>,
    pub view_trackers: Vec<VastTracker>,
}

impl VastIconConfig {
    /// Whether the display window has closed for good.
    pub fn has_expired_at(&self, position_millis: u32) -> bool {
        match self.duration_millis {
            Some(duration) => u64::from(position_millis) >= u64::from(self.offset_millis) + u64::from(duration),
            None => false,
        }
    }
}

/// A companion banner shown beside or after the video
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct VastCompanionAdConfig {
    pub width: i32,
    pub height: i32,
    pub resource: VastResource,
    pub click_through_url: Option<String>,
    pub click_trackers: Vec<VastTracker>,
    pub creative_view_trackers: Vec<VastTracker>,
}

impl VastCompanionAdConfig {
    pub fn add_click_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.click_trackers.extend(trackers);
    }

    pub fn add_creative_view_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.creative_view_trackers.extend(trackers);
    }
}

/// Orientation requested by the `MoPubForceOrientation` element
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum ForceOrientation {
    Portrait,
    #[default]
    Landscape,
    Device,
    Undefined,
}

impl ForceOrientation {
    /// Case-insensitive; unknown or absent keys map to `Undefined`.
    pub fn from_key(key: Option<&str>) -> ForceOrientation {
        match key.map(|k| k.trim().to_lowercase()).as_deref() {
            Some("portrait") => ForceOrientation::Portrait,
            Some("landscape") => ForceOrientation::Landscape,
            Some("device") => ForceOrientation::Device,
            _ => ForceOrientation::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(resource_type: ResourceType, creative_type: CreativeType) -> VastResource {
        VastResource::new("https://res", resource_type, creative_type, 300, 250).unwrap()
    }

    #[test]
    fn test_creative_type_from_mime_type() {
        assert_eq!(CreativeType::from_mime_type("image/png"), Some(CreativeType::Image));
        assert_eq!(CreativeType::from_mime_type("ImAge/JpEg"), Some(CreativeType::Image));
        assert_eq!(
            CreativeType::from_mime_type("application/x-javascript"),
            Some(CreativeType::Javascript)
        );
        assert_eq!(CreativeType::from_mime_type("video/mp4"), None);
        assert_eq!(CreativeType::from_mime_type(""), None);
    }

    #[test]
    fn test_static_resource_requires_creative_type() {
        assert!(VastResource::new("x", ResourceType::StaticResource, CreativeType::None, 1, 1).is_none());
        assert!(VastResource::new("x", ResourceType::HtmlResource, CreativeType::Image, 1, 1).is_none());
        assert!(VastResource::new("x", ResourceType::IframeResource, CreativeType::None, 1, 1).is_some());
    }

    #[test]
    fn test_html_rendering() {
        let iframe = resource(ResourceType::IframeResource, CreativeType::None);
        assert_eq!(
            iframe.html(),
            "<iframe frameborder=\"0\" scrolling=\"no\" marginheight=\"0\" marginwidth=\"0\" \
             style=\"border: 0px; margin: 0px;\" width=\"300\" height=\"250\" src=\"https://res\"></iframe>"
        );
        let script = resource(ResourceType::StaticResource, CreativeType::Javascript);
        assert_eq!(script.html(), "<script src=\"https://res\"></script>");
        let image = resource(ResourceType::StaticResource, CreativeType::Image);
        assert!(image.html().contains("<img src=\"https://res\" width=\"100%\""));
        let html = resource(ResourceType::HtmlResource, CreativeType::None);
        assert_eq!(html.html(), "https://res");
    }

    #[test]
    fn test_correct_click_through_url() {
        let vast = Some("https://vast");
        let surface = Some("https://surface");
        let image = resource(ResourceType::StaticResource, CreativeType::Image);
        assert_eq!(image.correct_click_through_url(vast, surface), vast);
        for (ty, ct) in [
            (ResourceType::StaticResource, CreativeType::Javascript),
            (ResourceType::HtmlResource, CreativeType::None),
            (ResourceType::IframeResource, CreativeType::None),
        ] {
            assert_eq!(resource(ty, ct).correct_click_through_url(vast, surface), surface);
        }
    }

    #[test]
    fn test_icon_display_window() {
        let icon = VastIconConfig {
            width: 40,
            height: 40,
            offset_millis: 1000,
            duration_millis: Some(2000),
            resource: resource(ResourceType::HtmlResource, CreativeType::None),
            click_trackers: vec![],
            click_through_url: None,
            view_trackers: vec![],
        };
        assert!(!icon.has_expired_at(2999));
        assert!(icon.has_expired_at(3000));

        let forever = VastIconConfig { duration_millis: None, ..icon };
        assert!(!forever.has_expired_at(1_000_000));
    }

    #[test]
    fn test_force_orientation_from_key() {
        assert_eq!(ForceOrientation::from_key(Some("PORTRAIT")), ForceOrientation::Portrait);
        assert_eq!(ForceOrientation::from_key(Some("device")), ForceOrientation::Device);
        assert_eq!(ForceOrientation::from_key(Some("sideways")), ForceOrientation::Undefined);
        assert_eq!(ForceOrientation::from_key(None), ForceOrientation::Undefined);
    }
}
