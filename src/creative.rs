//! Views over companion, icon, resource and extension elements.

use crate::models::*;
use crate::offset;
use crate::xml::XmlNode;

const VIEWABILITY_TRACKER: &str = "MoPubViewabilityTracker";

/// The resource children shared by companions and icons
#[derive(Debug, Clone, Copy)]
pub struct ResourceView<'a> {
    node: &'a XmlNode,
}

impl<'a> ResourceView<'a> {
    pub fn new(node: &'a XmlNode) -> Self {
        ResourceView { node }
    }

    pub fn static_resource(&self) -> Option<&'a str> {
        self.node.first_child("StaticResource").and_then(XmlNode::text)
    }

    /// `creativeType` of the static resource, lower-cased
    pub fn static_resource_type(&self) -> Option<String> {
        self.node
            .first_child("StaticResource")
            .and_then(|node| node.attribute("creativeType"))
            .map(|mime| mime.trim().to_lowercase())
    }

    pub fn iframe_resource(&self) -> Option<&'a str> {
        self.node.first_child("IFrameResource").and_then(XmlNode::text)
    }

    pub fn html_resource(&self) -> Option<&'a str> {
        self.node.first_child("HTMLResource").and_then(XmlNode::text)
    }

    pub fn has_resources(&self) -> bool {
        self.static_resource().is_some()
            || self.html_resource().is_some()
            || self.iframe_resource().is_some()
    }

    /// Build a resource of exactly `resource_type`, if this element carries a
    /// valid one.
    pub fn to_resource(&self, resource_type: ResourceType, width: i32, height: i32) -> Option<VastResource> {
        match resource_type {
            ResourceType::StaticResource => {
                let resource = self.static_resource()?;
                let creative_type = CreativeType::from_mime_type(&self.static_resource_type()?)?;
                VastResource::new(resource, resource_type, creative_type, width, height)
            }
            ResourceType::HtmlResource => {
                VastResource::new(self.html_resource()?, resource_type, CreativeType::None, width, height)
            }
            ResourceType::IframeResource => {
                VastResource::new(self.iframe_resource()?, resource_type, CreativeType::None, width, height)
            }
        }
    }
}

/// A `<Companion>` element
#[derive(Debug, Clone, Copy)]
pub struct CompanionView<'a> {
    node: &'a XmlNode,
}

impl<'a> CompanionView<'a> {
    pub fn new(node: &'a XmlNode) -> Self {
        CompanionView { node }
    }

    pub fn width(&self) -> Option<i32> {
        self.node.attribute_as_int("width")
    }

    pub fn height(&self) -> Option<i32> {
        self.node.attribute_as_int("height")
    }

    pub fn resources(&self) -> ResourceView<'a> {
        ResourceView::new(self.node)
    }

    pub fn has_resources(&self) -> bool {
        self.resources().has_resources()
    }

    pub fn click_through_url(&self) -> Option<&'a str> {
        self.node.first_child("CompanionClickThrough").and_then(XmlNode::text)
    }

    pub fn click_trackers(&self) -> Vec<VastTracker> {
        self.node
            .children_named("CompanionClickTracking")
            .filter_map(XmlNode::text)
            .map(VastTracker::new)
            .collect()
    }

    pub fn creative_view_trackers(&self) -> Vec<VastTracker> {
        self.node
            .first_child("TrackingEvents")
            .map(|events| {
                events
                    .children_with_attribute("Tracking", "event", &["creativeView"])
                    .filter_map(XmlNode::text)
                    .map(VastTracker::new)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// An `<Icon>` element
#[derive(Debug, Clone, Copy)]
pub struct IconView<'a> {
    node: &'a XmlNode,
}

impl<'a> IconView<'a> {
    pub fn new(node: &'a XmlNode) -> Self {
        IconView { node }
    }

    pub fn width(&self) -> Option<i32> {
        self.node.attribute_as_int("width")
    }

    pub fn height(&self) -> Option<i32> {
        self.node.attribute_as_int("height")
    }

    pub fn offset_millis(&self) -> Option<u32> {
        self.time_attribute("offset")
    }

    pub fn duration_millis(&self) -> Option<u32> {
        self.time_attribute("duration")
    }

    pub fn resources(&self) -> ResourceView<'a> {
        ResourceView::new(self.node)
    }

    pub fn click_trackers(&self) -> Vec<VastTracker> {
        self.node
            .first_child("IconClicks")
            .map(|clicks| {
                clicks
                    .children_named("IconClickTracking")
                    .filter_map(XmlNode::text)
                    .map(VastTracker::new)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn click_through_url(&self) -> Option<&'a str> {
        self.node
            .first_child("IconClicks")
            .and_then(|clicks| clicks.first_child("IconClickThrough"))
            .and_then(XmlNode::text)
    }

    pub fn view_trackers(&self) -> Vec<VastTracker> {
        self.node
            .children_named("IconViewTracking")
            .filter_map(XmlNode::text)
            .map(VastTracker::new)
            .collect()
    }

    fn time_attribute(&self, key: &str) -> Option<u32> {
        let raw = self.node.attribute(key)?;
        let parsed = offset::parse_absolute_offset(raw);
        if parsed.is_none() {
            log::debug!("Invalid VAST icon {key} format: {raw}");
        }
        parsed
    }

    /// Icon config for `resource`; a missing offset means "from the start".
    pub fn to_config(&self, width: i32, height: i32, resource: VastResource) -> VastIconConfig {
        VastIconConfig {
            width,
            height,
            offset_millis: self.offset_millis().unwrap_or(0),
            duration_millis: self.duration_millis(),
            resource,
            click_trackers: self.click_trackers(),
            click_through_url: self.click_through_url().map(str::to_string),
            view_trackers: self.view_trackers(),
        }
    }
}

/// An `<Extension>` element
#[derive(Debug, Clone, Copy)]
pub struct ExtensionView<'a> {
    node: &'a XmlNode,
}

impl<'a> ExtensionView<'a> {
    pub fn new(node: &'a XmlNode) -> Self {
        ExtensionView { node }
    }

    /// Requires a play time, a percentage and a URL; anything less is no tracker.
    pub fn viewability_tracker(&self) -> Option<VideoViewabilityTracker> {
        let node = self.node.first_child(VIEWABILITY_TRACKER)?;
        let viewable_playtime_millis = offset::parse_viewable_playtime(node.attribute("viewablePlaytime")?)?;
        let percent_viewable = parse_percent_viewable(node.attribute("percentViewable")?)?;
        let url = node.text()?;
        Some(VideoViewabilityTracker {
            url: url.to_string(),
            viewable_playtime_millis,
            percent_viewable,
        })
    }
}

/// `0` to `100`, `%` optional, fractional digits dropped
fn parse_percent_viewable(raw: &str) -> Option<u8> {
    let percent = match raw.replace('%', "").trim().parse::<f32>() {
        Ok(percent) => percent.trunc(),
        Err(_) => {
            log::debug!("Invalid VAST percentViewable format: {raw}");
            return None;
        }
    };
    if (0.0..=100.0).contains(&percent) {
        Some(percent as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn element(xml: &str) -> XmlNode {
        parse_document(xml).unwrap().children.remove(0)
    }

    #[test]
    fn test_static_resource_type_lower_cased() {
        let node = element("<Companion><StaticResource creativeType=\"ImAge/JpEg\">https://img</StaticResource></Companion>");
        let view = ResourceView::new(&node);
        assert_eq!(view.static_resource_type().as_deref(), Some("image/jpeg"));
        let resource = view.to_resource(ResourceType::StaticResource, 300, 250).unwrap();
        assert_eq!(resource.resource_type(), ResourceType::StaticResource);
        assert_eq!(resource.creative_type(), CreativeType::Image);
    }

    #[test]
    fn test_static_resource_without_valid_type_falls_back() {
        let node = element(
            "<Companion>\
               <StaticResource creativeType=\"video/mp4\">https://img</StaticResource>\
               <IFrameResource>https://frame</IFrameResource>\
             </Companion>",
        );
        let view = ResourceView::new(&node);
        assert!(view.to_resource(ResourceType::StaticResource, 1, 1).is_none());
        let resource = view.to_resource(ResourceType::IframeResource, 1, 1).unwrap();
        assert_eq!(resource.resource_type(), ResourceType::IframeResource);
        assert_eq!(resource.resource(), "https://frame");
    }

    #[test]
    fn test_missing_resources() {
        let node = element("<Companion/>");
        let view = ResourceView::new(&node);
        assert!(!view.has_resources());
        assert!(ResourceType::PRIORITY
            .into_iter()
            .all(|resource_type| view.to_resource(resource_type, 1, 1).is_none()));
    }

    #[test]
    fn test_companion_fields() {
        let node = element(
            "<Companion id=\"valid\" width=\"300\" height=\"250\" adSlotID=\"slot\">\
               <HTMLResource><![CDATA[<p>hi</p>]]></HTMLResource>\
               <TrackingEvents>\
                 <Tracking event=\"creativeView\">https://view1</Tracking>\
                 <Tracking event=\"start\">https://ignored</Tracking>\
                 <Tracking event=\"creativeView\">https://view2</Tracking>\
               </TrackingEvents>\
               <CompanionClickThrough>https://through</CompanionClickThrough>\
               <CompanionClickTracking><![CDATA[https://track]]></CompanionClickTracking>\
             </Companion>",
        );
        let companion = CompanionView::new(&node);
        assert_eq!(companion.width(), Some(300));
        assert_eq!(companion.height(), Some(250));
        assert!(companion.has_resources());
        assert_eq!(companion.click_through_url(), Some("https://through"));
        assert_eq!(companion.click_trackers(), vec![VastTracker::new("https://track")]);
        assert_eq!(companion.creative_view_trackers().len(), 2);
    }

    #[test]
    fn test_icon_fields() {
        let node = element(
            "<Icon program=\"AdChoices\" width=\"123\" height=\"234\" offset=\"01:02:03\" duration=\"not-a-time\">\
               <StaticResource creativeType=\"image/png\">https://icon.png</StaticResource>\
               <IconClicks>\
                 <IconClickThrough>https://icon-through</IconClickThrough>\
                 <IconClickTracking>https://icon-click1</IconClickTracking>\
                 <IconClickTracking>https://icon-click2</IconClickTracking>\
               </IconClicks>\
               <IconViewTracking>https://icon-view</IconViewTracking>\
             </Icon>",
        );
        let icon = IconView::new(&node);
        assert_eq!(icon.width(), Some(123));
        assert_eq!(icon.offset_millis(), Some(3_723_000));
        assert_eq!(icon.duration_millis(), None);
        assert_eq!(icon.click_through_url(), Some("https://icon-through"));
        assert_eq!(icon.click_trackers().len(), 2);
        assert_eq!(icon.view_trackers(), vec![VastTracker::new("https://icon-view")]);

        let resource = icon.resources().to_resource(ResourceType::StaticResource, 123, 234).unwrap();
        let config = icon.to_config(123, 234, resource);
        assert_eq!(config.offset_millis, 3_723_000);
        assert_eq!(config.duration_millis, None);
    }

    #[test]
    fn test_viewability_tracker() {
        let node = element(
            "<Extension type=\"MoPub\">\
               <MoPubViewabilityTracker viewablePlaytime=\"2.5\" percentViewable=\"50%\">\
                 <![CDATA[https://ad.server.com/impression/dot.gif]]>\
               </MoPubViewabilityTracker>\
             </Extension>",
        );
        let extension = ExtensionView::new(&node);
        let tracker = extension.viewability_tracker().unwrap();
        assert_eq!(tracker.viewable_playtime_millis, 2500);
        assert_eq!(tracker.percent_viewable, 50);
        assert_eq!(tracker.url, "https://ad.server.com/impression/dot.gif");
    }

    #[test]
    fn test_viewability_tracker_requires_all_parts() {
        for xml in [
            "<Extension><MoPubViewabilityTracker percentViewable=\"50%\">https://u</MoPubViewabilityTracker></Extension>",
            "<Extension><MoPubViewabilityTracker viewablePlaytime=\"2\">https://u</MoPubViewabilityTracker></Extension>",
            "<Extension><MoPubViewabilityTracker viewablePlaytime=\"2\" percentViewable=\"50\"></MoPubViewabilityTracker></Extension>",
            "<Extension><MoPubViewabilityTracker viewablePlaytime=\"2\" percentViewable=\"101%\">https://u</MoPubViewabilityTracker></Extension>",
            "<Extension><MoPubViewabilityTracker viewablePlaytime=\"-2\" percentViewable=\"50\">https://u</MoPubViewabilityTracker></Extension>",
            "<Extension type=\"MoPub\"></Extension>",
        ] {
            let node = element(xml);
            assert!(ExtensionView::new(&node).viewability_tracker().is_none(), "{xml}");
        }
    }

    #[test]
    fn test_percent_viewable_truncates() {
        assert_eq!(parse_percent_viewable("99.9%"), Some(99));
        assert_eq!(parse_percent_viewable("70"), Some(70));
        assert_eq!(parse_percent_viewable("-1"), None);
        assert_eq!(parse_percent_viewable("lots"), None);
    }
}
