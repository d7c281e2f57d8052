use std::time::Duration;

/// Geometry of the message list as last reported by the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl Viewport {
    pub fn new(scroll_top: f64, viewport_height: f64, content_height: f64) -> Self {
        Self { scroll_top, viewport_height, content_height }
    }

    pub fn distance_to_bottom(&self) -> f64 {
        (self.content_height - self.viewport_height - self.scroll_top).max(0.0)
    }
}

/// What the view should do with its scroll position after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirective {
    Hold,
    /// Jump to the newest message once layout has had `settle` to catch up.
    ToBottom { settle: Duration },
}

/// Decides, per thread update, whether the view follows the newest message.
#[derive(Debug, Clone)]
pub struct ScrollAnchor {
    should_follow: bool,
    threshold: f64,
    settle: Duration,
    last_viewport: Option<Viewport>,
}

impl ScrollAnchor {
    pub fn new(threshold: f64, settle: Duration) -> Self {
        Self { should_follow: true, threshold, settle, last_viewport: None }
    }

    pub fn should_follow(&self) -> bool {
        self.should_follow
    }

    /// Back to defaults for a freshly selected partner.
    pub fn reset(&mut self) {
        self.should_follow = true;
        self.last_viewport = None;
    }

    /// Records geometry without treating it as user intent (resize, relayout).
    pub fn observe_layout(&mut self, viewport: Viewport) {
        self.last_viewport = Some(viewport);
    }

    pub fn on_user_scroll(&mut self, viewport: Viewport) {
        self.last_viewport = Some(viewport);
        self.should_follow = self.near_bottom();
    }

    /// Runs before an update is rendered. Skipped for a partner's first load.
    pub fn before_update(&mut self, has_new: bool) {
        if self.near_bottom() {
            self.should_follow = true;
        }
        if !has_new {
            self.should_follow = false;
        }
    }

    pub fn after_update(&self, has_new: bool) -> ScrollDirective {
        if self.should_follow && has_new {
            ScrollDirective::ToBottom { settle: self.settle }
        } else {
            ScrollDirective::Hold
        }
    }

    /// Full pass for one fetched update.
    pub fn route(&mut self, first_load: bool, has_new: bool) -> ScrollDirective {
        if !first_load {
            self.before_update(has_new);
        }
        self.after_update(has_new)
    }

    /// The sender always wants to see their own message land.
    pub fn on_send(&mut self) -> ScrollDirective {
        self.should_follow = true;
        ScrollDirective::ToBottom { settle: self.settle }
    }

    fn near_bottom(&self) -> bool {
        match self.last_viewport {
            Some(v) => v.distance_to_bottom() <= self.threshold,
            None => true,
        }
    }
}
