use crate::models::*;
use crate::offset;
use serde::{Deserialize, Serialize};

/// Which companion to look up
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
pub enum CompanionOrientation {
    Landscape,
    Portrait,
}

/// Everything a player needs to show one video ad and report on it.
///
/// Built up by the aggregator while it walks the wrapper chain, then handed
/// to a [`TrackingSession`](crate::tracking::TrackingSession). Plain data
/// throughout so it can be persisted between preparing and playing the video.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct VastVideoConfig {
    // Trackers
    pub impression_trackers: Vec<VastTracker>,
    /// Sorted by fraction
    fractional_trackers: Vec<VastFractionalProgressTracker>,
    /// Sorted by offset
    absolute_trackers: Vec<VastAbsoluteProgressTracker>,
    pub pause_trackers: Vec<VastTracker>,
    pub resume_trackers: Vec<VastTracker>,
    pub complete_trackers: Vec<VastTracker>,
    pub close_trackers: Vec<VastTracker>,
    pub skip_trackers: Vec<VastTracker>,
    pub click_trackers: Vec<VastTracker>,
    pub error_trackers: Vec<VastTracker>,

    // Linear assets
    pub click_through_url: Option<String>,
    pub network_media_file_url: Option<String>,
    pub disk_media_file_url: Option<String>,
    pub skip_offset: Option<String>,
    pub landscape_companion_ad: Option<VastCompanionAdConfig>,
    pub portrait_companion_ad: Option<VastCompanionAdConfig>,
    pub icon_config: Option<VastIconConfig>,
    pub viewability_tracker: Option<VideoViewabilityTracker>,

    // MoPub extensions
    pub custom_cta_text: Option<String>,
    pub custom_skip_text: Option<String>,
    pub custom_close_icon_url: Option<String>,
    custom_force_orientation: Option<ForceOrientation>,

    pub is_rewarded_video: bool,

    /// Filled in by the host once the media has been prepared
    pub duration_millis: Option<u32>,
}

impl VastVideoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_impression_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.impression_trackers.extend(trackers);
    }

    /// Merge a batch, keeping the list sorted. The sort is stable so trackers
    /// with equal fractions keep their insertion order.
    pub fn add_fractional_trackers(
        &mut self,
        trackers: impl IntoIterator<Item = VastFractionalProgressTracker>,
    ) {
        self.fractional_trackers.extend(trackers);
        self.sort_progress_trackers();
    }

    /// Merge a batch, keeping the list sorted by offset.
    pub fn add_absolute_trackers(
        &mut self,
        trackers: impl IntoIterator<Item = VastAbsoluteProgressTracker>,
    ) {
        self.absolute_trackers.extend(trackers);
        self.sort_progress_trackers();
    }

    pub fn fractional_trackers(&self) -> &[VastFractionalProgressTracker] {
        &self.fractional_trackers
    }

    pub fn absolute_trackers(&self) -> &[VastAbsoluteProgressTracker] {
        &self.absolute_trackers
    }

    /// Restore threshold order. Configs read back from storage may not be
    /// sorted.
    pub(crate) fn sort_progress_trackers(&mut self) {
        self.absolute_trackers
            .sort_by_key(|tracker| tracker.tracking_milliseconds);
        self.fractional_trackers
            .sort_by(|a, b| a.tracking_fraction.total_cmp(&b.tracking_fraction));
    }

    pub fn add_pause_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.pause_trackers.extend(trackers);
    }

    pub fn add_resume_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.resume_trackers.extend(trackers);
    }

    pub fn add_complete_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.complete_trackers.extend(trackers);
    }

    pub fn add_close_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.close_trackers.extend(trackers);
    }

    pub fn add_skip_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.skip_trackers.extend(trackers);
    }

    pub fn add_click_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.click_trackers.extend(trackers);
    }

    pub fn add_error_trackers(&mut self, trackers: impl IntoIterator<Item = VastTracker>) {
        self.error_trackers.extend(trackers);
    }

    pub fn set_companion_ads(
        &mut self,
        landscape: Option<VastCompanionAdConfig>,
        portrait: Option<VastCompanionAdConfig>,
    ) {
        self.landscape_companion_ad = landscape;
        self.portrait_companion_ad = portrait;
    }

    pub fn companion_ad(&self, orientation: CompanionOrientation) -> Option<&VastCompanionAdConfig> {
        match orientation {
            CompanionOrientation::Landscape => self.landscape_companion_ad.as_ref(),
            CompanionOrientation::Portrait => self.portrait_companion_ad.as_ref(),
        }
    }

    /// Only true when both orientations are covered
    pub fn has_companion_ad(&self) -> bool {
        self.landscape_companion_ad.is_some() && self.portrait_companion_ad.is_some()
    }

    /// `Undefined` means the response did not ask for an orientation and
    /// leaves the current value alone.
    pub fn set_custom_force_orientation(&mut self, orientation: ForceOrientation) {
        if orientation != ForceOrientation::Undefined {
            self.custom_force_orientation = Some(orientation);
        }
    }

    pub fn is_custom_force_orientation_set(&self) -> bool {
        self.custom_force_orientation.is_some()
    }

    /// Landscape unless the response asked for something else
    pub fn custom_force_orientation(&self) -> ForceOrientation {
        self.custom_force_orientation.unwrap_or_default()
    }

    pub fn total_progress_tracker_count(&self) -> usize {
        self.absolute_trackers.len() + self.fractional_trackers.len()
    }

    /// When the skip button may appear, if the `skipoffset` applies to a
    /// video of `duration_millis`. Offsets at or past the end are ignored.
    pub fn skip_offset_millis(&self, duration_millis: u32) -> Option<u32> {
        let skip_offset = self.skip_offset.as_deref()?.trim();

        if offset::is_absolute_offset(skip_offset) {
            return offset::parse_absolute_offset(skip_offset).filter(|&millis| millis < duration_millis);
        }

        if let Some(fraction) = offset::parse_percentage_offset(skip_offset) {
            let millis = (f64::from(duration_millis) * f64::from(fraction)).round() as u32;
            return (millis < duration_millis).then_some(millis);
        }

        log::debug!("Invalid VAST skipoffset format: {skip_offset}");
        None
    }
}
