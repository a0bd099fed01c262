use std::cell::{Cell, RefCell};

use vast_video::host::{Navigator, PlaybackClock, TrackerDispatcher};
use vast_video::macros::VastErrorCode;
use vast_video::network::InMemoryFetcher;
use vast_video::tracking::IconChange;
use vast_video::{Aggregator, Settings, TrackingSession, VastVideoConfig};

#[derive(Default)]
struct Recorder {
    fired: RefCell<Vec<String>>,
    opened: RefCell<Vec<String>>,
}

impl TrackerDispatcher for Recorder {
    fn fire_and_forget(&self, url: &str) {
        self.fired.borrow_mut().push(url.to_string());
    }
}

impl Navigator for Recorder {
    fn open_url(&self, url: &str) {
        self.opened.borrow_mut().push(url.to_string());
    }
}

struct Clock {
    position: Cell<Option<u32>>,
    duration: Cell<Option<u32>>,
}

impl Clock {
    fn new() -> Self {
        Clock {
            position: Cell::new(None),
            duration: Cell::new(None),
        }
    }

    fn at(&self, position: u32) -> &Self {
        self.position.set(Some(position));
        self
    }
}

impl PlaybackClock for Clock {
    fn current_position_millis(&self) -> Option<u32> {
        self.position.get()
    }

    fn duration_millis(&self) -> Option<u32> {
        self.duration.get()
    }
}

const VAST_XML: &str = r#"<VAST version="3.0"><Ad><InLine>
  <Impression>https://t/impression?p=[CONTENTPLAYHEAD]</Impression>
  <Error>https://t/error?code=[ERRORCODE]</Error>
  <Creatives><Creative>
    <Linear skipoffset="25%">
      <TrackingEvents>
        <Tracking event="creativeView">https://t/creative-view</Tracking>
        <Tracking event="start">https://t/start</Tracking>
        <Tracking event="firstQuartile">https://t/q1</Tracking>
        <Tracking event="midpoint">https://t/mid</Tracking>
        <Tracking event="thirdQuartile">https://t/q3</Tracking>
        <Tracking event="progress" offset="00:00:15.000">https://t/progress-15s</Tracking>
        <Tracking event="complete">https://t/complete</Tracking>
        <Tracking event="pause">https://t/pause</Tracking>
        <Tracking event="skip">https://t/skip</Tracking>
        <Tracking event="closeLinear">https://t/close</Tracking>
      </TrackingEvents>
      <VideoClicks>
        <ClickThrough><![CDATA[mopubnativebrowser://navigate?url=https%3A%2F%2Fexample.com%2F]]></ClickThrough>
        <ClickTracking>https://t/click?a=[ASSETURI]</ClickTracking>
      </VideoClicks>
      <MediaFiles>
        <MediaFile type="video/mp4" width="1280" height="720">https://cdn/v.mp4</MediaFile>
      </MediaFiles>
      <Icons>
        <Icon width="40" height="40" offset="00:00:03" duration="00:00:05">
          <StaticResource creativeType="image/png">https://cdn/icon.png</StaticResource>
          <IconClicks><IconClickThrough>https://icon.example/</IconClickThrough></IconClicks>
          <IconViewTracking>https://t/icon-view</IconViewTracking>
        </Icon>
      </Icons>
    </Linear>
  </Creative></Creatives>
</InLine></Ad></VAST>"#;

fn resolved_config() -> VastVideoConfig {
    let recorder = Recorder::default();
    let aggregation = Aggregator::new(Settings::default(), InMemoryFetcher::new(), &recorder).resolve(VAST_XML);
    aggregation.into_config().unwrap()
}

#[test]
fn playback_fires_every_progress_tracker_once() {
    let config = resolved_config();
    let total = config.total_progress_tracker_count();
    assert_eq!(total, 6);

    let mut session = TrackingSession::new(config, Recorder::default());
    let clock = Clock::new();

    // Not started yet
    assert!(session.tick(&clock).fired.is_empty());
    clock.duration.set(Some(30_000));

    let mut fired = Vec::new();
    for position in (0..=30_000).step_by(500) {
        fired.extend(session.tick(clock.at(position)).fired);
    }
    // Seek back and play through again
    for position in (10_000..=30_000).step_by(500) {
        fired.extend(session.tick(clock.at(position)).fired);
    }

    assert_eq!(
        fired,
        vec![
            "https://t/creative-view",
            "https://t/start",
            "https://t/icon-view",
            "https://t/q1",
            "https://t/progress-15s",
            "https://t/mid",
            "https://t/q3",
        ]
    );
    assert_eq!(session.remaining_progress_tracker_count(), 0);
}

#[test]
fn due_trackers_sum_to_total() {
    let config = resolved_config();
    let total = config.total_progress_tracker_count();
    let mut session = TrackingSession::new(config, Recorder::default());

    let mut count = 0;
    for position in [0, 1_999, 2_000, 7_000, 3_000, 14_999, 22_500, 40_000, 40_000] {
        count += session.due_trackers(Some(position), 30_000).len();
    }
    assert_eq!(count, total);
}

#[test]
fn icon_and_skip_affordances() {
    let mut session = TrackingSession::new(resolved_config(), Recorder::default());
    let clock = Clock::new();
    clock.duration.set(Some(30_000));

    assert_eq!(session.tick(clock.at(2_900)).icon, None);
    assert_eq!(session.tick(clock.at(3_000)).icon, Some(IconChange::Shown));

    // skipoffset="25%" of 30s
    assert_eq!(session.close_button_delay_millis(30_000), 7_500);
    assert!(!session.tick(clock.at(7_000)).skip_became_available);
    let report = session.tick(clock.at(7_500));
    assert!(report.skip_became_available);
    assert!(session.is_interactable());

    assert_eq!(session.tick(clock.at(8_000)).icon, Some(IconChange::Hidden));
}

#[test]
fn click_unwraps_native_browser_url() {
    let mut session = TrackingSession::new(resolved_config(), Recorder::default());
    let navigator = Recorder::default();
    let clock = Clock::new();
    clock.duration.set(Some(30_000));

    session.tick(clock.at(8_000));
    let opened = session.handle_click(8_000, &navigator);

    assert_eq!(opened.as_deref(), Some("https://example.com/"));
    assert_eq!(*navigator.opened.borrow(), vec!["https://example.com/"]);
    assert!(session
        .dispatcher()
        .fired
        .borrow()
        .contains(&"https://t/click?a=https%3A%2F%2Fcdn%2Fv.mp4".to_string()));
}

#[test]
fn icon_click_navigates_to_icon_click_through() {
    let mut session = TrackingSession::new(resolved_config(), Recorder::default());
    let navigator = Recorder::default();
    let opened = session.handle_icon_click(None, 4_000, &navigator);
    assert_eq!(opened.as_deref(), Some("https://icon.example/"));
}

#[test]
fn event_trackers() {
    let mut session = TrackingSession::new(resolved_config(), Recorder::default());

    assert_eq!(
        session.handle_impression(1_500),
        vec!["https://t/impression?p=00:00:01.500"]
    );
    assert!(session.handle_impression(1_500).is_empty());

    assert_eq!(session.handle_pause(2_000), vec!["https://t/pause"]);
    assert_eq!(session.handle_pause(4_000), vec!["https://t/pause"]);

    assert_eq!(
        session.handle_error(VastErrorCode::GeneralLinearAdError, 4_000),
        vec!["https://t/error?code=400"]
    );

    assert_eq!(session.handle_complete(30_000), vec!["https://t/complete"]);
    assert_eq!(session.handle_close(30_000), vec!["https://t/close", "https://t/skip"]);
    assert!(session.handle_close(30_000).is_empty());
}
