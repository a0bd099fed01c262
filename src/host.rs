//! Collaborators supplied by the application hosting the player.

/// Playback position source. Polled on every tick; the engine owns no timer.
pub trait PlaybackClock {
    /// `None` until playback has started
    fn current_position_millis(&self) -> Option<u32>;

    /// `None` until the media has been prepared
    fn duration_millis(&self) -> Option<u32>;
}

/// Sends tracking pixels. Delivery is not observed or retried.
pub trait TrackerDispatcher {
    fn fire_and_forget(&self, url: &str);
}

/// Opens click-through destinations.
pub trait Navigator {
    fn open_url(&self, url: &str);

    /// Whether some installed handler accepts `url`. Deep links with a
    /// fallback open the fallback when this is false.
    fn can_open(&self, _url: &str) -> bool {
        true
    }
}

impl<T: TrackerDispatcher + ?Sized> TrackerDispatcher for &T {
    fn fire_and_forget(&self, url: &str) {
        (**self).fire_and_forget(url)
    }
}

impl<T: Navigator + ?Sized> Navigator for &T {
    fn open_url(&self, url: &str) {
        (**self).open_url(url)
    }

    fn can_open(&self, url: &str) -> bool {
        (**self).can_open(url)
    }
}
