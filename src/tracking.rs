//! Drives tracker firing while a video plays.
//!
//! A [`TrackingSession`] owns a resolved [`VastVideoConfig`] and the set of
//! trackers it has already fired. The host polls it with the current
//! playback position; the session works out what became due, expands the
//! macros and hands the URLs to the dispatcher.

use crate::click::{handle_click_through, ClickPolicy};
use crate::host::{Navigator, PlaybackClock, TrackerDispatcher};
use crate::macros::{VastErrorCode, VastMacroHelper};
use crate::models::VastTracker;
use crate::video_config::{CompanionOrientation, VastVideoConfig};
use log::debug;
use std::collections::HashSet;

const DEFAULT_VIDEO_DURATION_FOR_CLOSE_BUTTON: u32 = 5_000;
const MAX_VIDEO_DURATION_FOR_CLOSE_BUTTON: u32 = 16_000;

/// The tracker list a [`TrackerId`] indexes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerGroup {
    Impression,
    Viewability,
    AbsoluteProgress,
    FractionalProgress,
    Pause,
    Resume,
    Complete,
    Close,
    Skip,
    Click,
    Error,
    IconView,
    IconClick,
    CompanionView(CompanionOrientation),
    CompanionClick(CompanionOrientation),
}

/// Position of a tracker within its group's list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerId {
    pub group: TrackerGroup,
    pub index: usize,
}

/// A progress tracker whose threshold has been crossed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTracker {
    pub id: TrackerId,
    /// Unexpanded URL template
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconChange {
    Shown,
    Hidden,
}

/// What happened during one [`TrackingSession::tick`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Expanded URLs handed to the dispatcher, in firing order
    pub fired: Vec<String>,
    pub icon: Option<IconChange>,
    pub skip_became_available: bool,
}

/// Per-playback tracking state for one ad.
pub struct TrackingSession<D: TrackerDispatcher> {
    config: VastVideoConfig,
    dispatcher: D,
    fired: HashSet<TrackerId>,
    icon_shown: bool,
    icon_hidden: bool,
    interactable: bool,
}

impl<D: TrackerDispatcher> TrackingSession<D> {
    pub fn new(mut config: VastVideoConfig, dispatcher: D) -> Self {
        config.sort_progress_trackers();
        TrackingSession {
            config,
            dispatcher,
            fired: HashSet::new(),
            icon_shown: false,
            icon_hidden: false,
            interactable: false,
        }
    }

    pub fn config(&self) -> &VastVideoConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Progress trackers that are due at `position_millis` and have not been
    /// returned before. Absolute trackers come first, then fractional ones,
    /// each in ascending threshold order. Every returned tracker is marked
    /// fired, so a later seek back and replay will not surface it again.
    ///
    /// Nothing is due while the position is unknown or the duration is zero.
    pub fn due_trackers(&mut self, position_millis: Option<u32>, duration_millis: u32) -> Vec<DueTracker> {
        let Some(position) = position_millis else {
            return Vec::new();
        };
        if duration_millis == 0 {
            return Vec::new();
        }

        let mut due = Vec::new();

        for (index, tracker) in self.config.absolute_trackers().iter().enumerate() {
            if tracker.tracking_milliseconds > position {
                break;
            }
            let id = TrackerId { group: TrackerGroup::AbsoluteProgress, index };
            if self.fired.insert(id) {
                due.push(DueTracker { id, url: tracker.url.clone() });
            }
        }

        for (index, tracker) in self.config.fractional_trackers().iter().enumerate() {
            if tracker.threshold_millis(duration_millis) > f64::from(position) {
                break;
            }
            let id = TrackerId { group: TrackerGroup::FractionalProgress, index };
            if self.fired.insert(id) {
                due.push(DueTracker { id, url: tracker.url.clone() });
            }
        }

        due
    }

    /// Progress trackers that have not fired yet
    pub fn remaining_progress_tracker_count(&self) -> usize {
        let fired = self
            .fired
            .iter()
            .filter(|id| {
                matches!(
                    id.group,
                    TrackerGroup::AbsoluteProgress | TrackerGroup::FractionalProgress
                )
            })
            .count();
        self.config.total_progress_tracker_count() - fired
    }

    /// Poll `clock` once: fire due progress trackers, update the icon window
    /// and the skip gate. The config's duration is used while the clock does
    /// not know one yet.
    pub fn tick<C: PlaybackClock + ?Sized>(&mut self, clock: &C) -> TickReport {
        let mut report = TickReport::default();
        let Some(position) = clock.current_position_millis() else {
            return report;
        };
        let duration = clock.duration_millis().or(self.config.duration_millis);

        if let Some(duration) = duration {
            let due = self.due_trackers(Some(position), duration);
            if !due.is_empty() {
                let urls = self.expand(due.into_iter().map(|tracker| tracker.url), None, Some(position));
                self.dispatch(&urls);
                report.fired.extend(urls);
            }
        }

        self.update_icon(position, &mut report);

        if !self.interactable {
            if let Some(duration) = duration {
                if position >= self.close_button_delay_millis(duration) {
                    self.interactable = true;
                    report.skip_became_available = true;
                }
            }
        }

        report
    }

    fn update_icon(&mut self, position: u32, report: &mut TickReport) {
        let Some(icon) = self.config.icon_config.as_ref() else {
            return;
        };

        if !self.icon_shown && position >= icon.offset_millis {
            self.icon_shown = true;
            report.icon = Some(IconChange::Shown);
            let view_trackers = icon.view_trackers.clone();
            let fired = self.fire(TrackerGroup::IconView, &view_trackers, None, Some(position));
            report.fired.extend(fired);
        }

        let expired = self
            .config
            .icon_config
            .as_ref()
            .is_some_and(|icon| icon.has_expired_at(position));
        if self.icon_shown && !self.icon_hidden && expired {
            self.icon_hidden = true;
            report.icon = Some(IconChange::Hidden);
        }
    }

    /// How long the close/skip affordance stays hidden for a video of
    /// `duration_millis`.
    pub fn close_button_delay_millis(&self, duration_millis: u32) -> u32 {
        if let Some(skip_offset) = self.config.skip_offset_millis(duration_millis) {
            return skip_offset;
        }
        if duration_millis < MAX_VIDEO_DURATION_FOR_CLOSE_BUTTON {
            duration_millis
        } else {
            DEFAULT_VIDEO_DURATION_FOR_CLOSE_BUTTON
        }
    }

    /// Whether the viewer may skip or click through yet
    pub fn is_interactable(&self) -> bool {
        self.interactable
    }

    pub fn handle_impression(&mut self, content_play_head: u32) -> Vec<String> {
        let trackers = self.config.impression_trackers.clone();
        self.fire(TrackerGroup::Impression, &trackers, None, Some(content_play_head))
    }

    /// The rendering layer saw the video meet the viewability tracker's
    /// play time and on-screen share. Fires that tracker at most once.
    pub fn handle_viewable(&mut self, content_play_head: u32) -> Vec<String> {
        let Some(tracker) = self.config.viewability_tracker.as_ref() else {
            return Vec::new();
        };
        let trackers = [VastTracker::new(tracker.url.clone())];
        self.fire(TrackerGroup::Viewability, &trackers, None, Some(content_play_head))
    }

    /// Fire the click trackers and open the video click-through. Ignored
    /// until the video is interactable. Returns the URL that was opened.
    pub fn handle_click<N: Navigator + ?Sized>(
        &mut self,
        content_play_head: u32,
        navigator: &N,
    ) -> Option<String> {
        if !self.interactable {
            debug!("Video click ignored before the skip delay elapsed");
            return None;
        }

        let trackers = self.config.click_trackers.clone();
        self.fire(TrackerGroup::Click, &trackers, None, Some(content_play_head));

        let click_through = self
            .config
            .click_through_url
            .as_deref()
            .filter(|url| !url.is_empty())?;
        handle_click_through(click_through, ClickPolicy::Full, navigator, &self.dispatcher)
    }

    pub fn handle_pause(&mut self, content_play_head: u32) -> Vec<String> {
        let trackers = self.config.pause_trackers.clone();
        self.fire(TrackerGroup::Pause, &trackers, None, Some(content_play_head))
    }

    pub fn handle_resume(&mut self, content_play_head: u32) -> Vec<String> {
        let trackers = self.config.resume_trackers.clone();
        self.fire(TrackerGroup::Resume, &trackers, None, Some(content_play_head))
    }

    /// Playback finished; the video becomes interactable.
    pub fn handle_complete(&mut self, content_play_head: u32) -> Vec<String> {
        self.interactable = true;
        let trackers = self.config.complete_trackers.clone();
        self.fire(TrackerGroup::Complete, &trackers, None, Some(content_play_head))
    }

    /// Closing the video counts as a skip too.
    pub fn handle_close(&mut self, content_play_head: u32) -> Vec<String> {
        let close_trackers = self.config.close_trackers.clone();
        let skip_trackers = self.config.skip_trackers.clone();
        let mut fired = self.fire(TrackerGroup::Close, &close_trackers, None, Some(content_play_head));
        fired.extend(self.fire(TrackerGroup::Skip, &skip_trackers, None, Some(content_play_head)));
        fired
    }

    pub fn handle_error(&mut self, error_code: VastErrorCode, content_play_head: u32) -> Vec<String> {
        let trackers = self.config.error_trackers.clone();
        self.fire(TrackerGroup::Error, &trackers, Some(error_code), Some(content_play_head))
    }

    /// The companion for `orientation` became visible.
    pub fn handle_companion_impression(
        &mut self,
        orientation: CompanionOrientation,
        content_play_head: u32,
    ) -> Vec<String> {
        let Some(companion) = self.config.companion_ad(orientation) else {
            return Vec::new();
        };
        let trackers = companion.creative_view_trackers.clone();
        let urls = self.pending(TrackerGroup::CompanionView(orientation), &trackers);
        let expanded = VastMacroHelper::new(urls)
            .with_content_play_head(Some(u64::from(content_play_head)))
            .uris();
        self.dispatch(&expanded);
        expanded
    }

    /// A click on the companion surface. `surface_click_through_url` is the
    /// URL the rendering surface reported, if any.
    pub fn handle_companion_click<N: Navigator + ?Sized>(
        &mut self,
        orientation: CompanionOrientation,
        surface_click_through_url: Option<&str>,
        content_play_head: u32,
        navigator: &N,
    ) -> Option<String> {
        let companion = self.config.companion_ad(orientation)?.clone();
        self.fire(
            TrackerGroup::CompanionClick(orientation),
            &companion.click_trackers,
            None,
            Some(content_play_head),
        );

        let click_through = companion
            .resource
            .correct_click_through_url(companion.click_through_url.as_deref(), surface_click_through_url)
            .filter(|url| !url.is_empty())?;
        handle_click_through(click_through, ClickPolicy::Full, navigator, &self.dispatcher)
    }

    /// A click on the icon. Icons only ever open a browser.
    pub fn handle_icon_click<N: Navigator + ?Sized>(
        &mut self,
        surface_click_through_url: Option<&str>,
        content_play_head: u32,
        navigator: &N,
    ) -> Option<String> {
        let icon = self.config.icon_config.clone()?;
        self.fire(TrackerGroup::IconClick, &icon.click_trackers, None, Some(content_play_head));

        let click_through = icon
            .resource
            .correct_click_through_url(icon.click_through_url.as_deref(), surface_click_through_url)
            .filter(|url| !url.is_empty())?;
        handle_click_through(click_through, ClickPolicy::BrowserOnly, navigator, &self.dispatcher)
    }

    /// Fire every tracker of `group` that may still fire, returning the
    /// expanded URLs.
    fn fire(
        &mut self,
        group: TrackerGroup,
        trackers: &[VastTracker],
        error_code: Option<VastErrorCode>,
        content_play_head: Option<u32>,
    ) -> Vec<String> {
        let urls = self.pending(group, trackers);
        if urls.is_empty() {
            return urls;
        }
        let expanded = self.expand(urls, error_code, content_play_head);
        self.dispatch(&expanded);
        expanded
    }

    /// Templates of `trackers` that may fire now; non-repeatable ones are
    /// marked fired.
    fn pending(&mut self, group: TrackerGroup, trackers: &[VastTracker]) -> Vec<String> {
        trackers
            .iter()
            .enumerate()
            .filter(|(index, tracker)| {
                tracker.repeatable || self.fired.insert(TrackerId { group, index: *index })
            })
            .map(|(_, tracker)| tracker.url.clone())
            .collect()
    }

    fn expand(
        &self,
        urls: impl IntoIterator<Item = String>,
        error_code: Option<VastErrorCode>,
        content_play_head: Option<u32>,
    ) -> Vec<String> {
        VastMacroHelper::new(urls)
            .with_error_code(error_code)
            .with_content_play_head(content_play_head.map(u64::from))
            .with_asset_uri(self.config.network_media_file_url.as_deref())
            .uris()
    }

    fn dispatch(&self, urls: &[String]) {
        for url in urls {
            debug!("Firing tracker {url}");
            self.dispatcher.fire_and_forget(url);
        }
    }
}
