use crate::constants::{FAR_EDGE_ROWS, MIN_WINDOW_PAGES, NEAR_EDGE_ROWS, PAGE_SIZE};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub page_size: usize,
    pub min_window_pages: usize,
    pub near_edge: usize,
    pub far_edge: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            min_window_pages: MIN_WINDOW_PAGES,
            near_edge: NEAR_EDGE_ROWS,
            far_edge: FAR_EDGE_ROWS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollAffordances {
    pub show_jump_to_top: bool,
    pub show_jump_to_bottom: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollMetrics {
    pub from_top: usize,
    pub from_bottom: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowShift {
    None,
    Earlier,
    Later,
}

#[derive(Debug)]
pub struct WindowController {
    config: WindowConfig,
    current_page: usize,
    total_pages: usize,
    auto_scroll: bool,
    affordances: ScrollAffordances,
    suppress_next_scroll: bool,
    was_near_top: bool,
    was_near_bottom: bool,
}

impl WindowController {
    pub fn new(config: WindowConfig) -> Self {
        let config = WindowConfig {
            page_size: config.page_size.max(1),
            min_window_pages: config.min_window_pages.max(1),
            ..config
        };
        Self {
            current_page: config.min_window_pages,
            config,
            total_pages: 0,
            auto_scroll: true,
            affordances: ScrollAffordances::default(),
            suppress_next_scroll: false,
            was_near_top: true,
            was_near_bottom: true,
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    pub fn affordances(&self) -> ScrollAffordances {
        self.affordances
    }

    fn last_page(&self) -> usize {
        self.total_pages.max(self.config.min_window_pages)
    }

    pub fn recompute(&mut self, filtered_len: usize) -> bool {
        self.total_pages = filtered_len.div_ceil(self.config.page_size);
        let last = self.last_page();
        self.current_page = if self.auto_scroll {
            last
        } else {
            self.current_page.clamp(self.config.min_window_pages, last)
        };
        if self.auto_scroll {
            self.affordances.show_jump_to_bottom = false;
        }
        self.auto_scroll
    }

    /// Filter change or log clear. `just_connected` re-arms follow-tail.
    pub fn reset(&mut self, just_connected: bool) {
        self.current_page = self.config.min_window_pages;
        if just_connected {
            self.auto_scroll = true;
        }
        self.was_near_top = true;
        self.was_near_bottom = true;
        self.affordances = ScrollAffordances::default();
    }

    pub fn mark_programmatic_scroll(&mut self) {
        self.suppress_next_scroll = true;
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> WindowShift {
        let programmatic = std::mem::take(&mut self.suppress_next_scroll);
        let near_top = metrics.from_top <= self.config.near_edge;
        let near_bottom = metrics.from_bottom <= self.config.near_edge;
        let last = self.last_page();
        let mut shift = WindowShift::None;

        if !programmatic {
            if self.auto_scroll && metrics.from_bottom > 0 {
                tracing::debug!("manual scroll, follow-tail off");
                self.auto_scroll = false;
            }

            if near_top && !self.was_near_top && self.current_page > self.config.min_window_pages {
                self.current_page -= 1;
                shift = WindowShift::Earlier;
            } else if near_bottom && !self.was_near_bottom && self.current_page < last {
                self.current_page += 1;
                shift = WindowShift::Later;
            }

            let entered_bottom = near_bottom && !self.was_near_bottom;
            if self.current_page >= last && (entered_bottom || metrics.from_bottom == 0) {
                self.auto_scroll = true;
            }
        }

        self.was_near_top = near_top;
        self.was_near_bottom = near_bottom;
        self.update_affordances(metrics);
        shift
    }

    fn update_affordances(&mut self, metrics: ScrollMetrics) {
        let last = self.last_page();
        self.affordances.show_jump_to_top = metrics.from_top > self.config.far_edge
            || self.current_page > self.config.min_window_pages;
        self.affordances.show_jump_to_bottom = !self.auto_scroll
            && (metrics.from_bottom > self.config.far_edge || self.current_page < last);
    }

    pub fn jump_to_top(&mut self) {
        self.auto_scroll = false;
        self.current_page = self.config.min_window_pages;
        self.was_near_top = true;
        self.affordances.show_jump_to_top = false;
    }

    pub fn jump_to_bottom(&mut self) {
        self.auto_scroll = true;
        self.affordances.show_jump_to_bottom = false;
    }

    pub fn visible_range(&self, filtered_len: usize) -> Range<usize> {
        let start = (self.current_page - self.config.min_window_pages) * self.config.page_size;
        let end = start + self.config.min_window_pages * self.config.page_size;
        start.min(filtered_len)..end.min(filtered_len)
    }
}
