use crate::connection::machine::{ConnectionState, LifecycleEvent};
use crate::connection::{Connection, DisconnectStatus, SerialEvent};
use crate::constants::DEFAULT_FILTER_MAX_CONTENT_CHARS;
use crate::core::settings::cycle_baud_rate;
use crate::core::{
    FilterState, FilteredIndex, InputFields, InputMode, LogCategory, LogRecord, LogStore,
    ScrollMetrics, SettingsField, SettingsPatch, SettingsStore, WindowConfig, WindowController,
    WindowShift,
};
use crate::highlight::classify_line;
use crate::transport::{PortConfig, Transport};
use crossterm::event::KeyCode;
use std::sync::mpsc::{self, Receiver};

pub struct App {
    pub store: LogStore,
    pub filtered: FilteredIndex,
    pub window: WindowController,
    pub connection: Connection,
    pub settings: SettingsStore,
    pub input_fields: InputFields,
    pub input_mode: InputMode,
    pub status_message: Option<String>,
    pub show_quit_confirm: bool,
    events: Receiver<SerialEvent>,
    log_chunk: Option<String>,
    scroll_offset: usize,
    viewport_height: usize,
}

impl App {
    pub fn new(transport: Box<dyn Transport>, settings: SettingsStore) -> Self {
        let (tx, rx) = mpsc::channel();
        let connection = Connection::new(transport, tx, settings.get().max_chunk_length);
        Self {
            store: LogStore::default(),
            filtered: FilteredIndex::new(DEFAULT_FILTER_MAX_CONTENT_CHARS),
            window: WindowController::new(WindowConfig::default()),
            connection,
            settings,
            input_fields: InputFields::default(),
            input_mode: InputMode::Normal,
            status_message: None,
            show_quit_confirm: false,
            events: rx,
            log_chunk: None,
            scroll_offset: 0,
            viewport_height: 0,
        }
    }

    pub fn poll_connection(&mut self) -> bool {
        let classify = self.settings.get().classify;
        let mut received = false;
        while let Ok(event) = self.events.try_recv() {
            received = true;
            match event {
                SerialEvent::Chunk(text) => self.log_chunk = Some(text),
                SerialEvent::Line(line) => {
                    self.log_chunk = None;
                    let category = if classify {
                        classify_line(&line)
                    } else {
                        LogCategory::Plain
                    };
                    self.store.append(category, line);
                }
                SerialEvent::Lifecycle(event) => self.on_lifecycle(event),
                SerialEvent::ReaderExited { generation, error } => {
                    self.connection.on_reader_exited(generation, error)
                }
                SerialEvent::DeviceRemoved { generation } => {
                    self.connection.on_device_removed(generation)
                }
            }
        }
        received
    }

    fn on_lifecycle(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Connected {
                reused_handle,
                baud_rate,
            } => {
                self.window.reset(true);
                let verb = if reused_handle { "Reconnected" } else { "Connected" };
                self.info(format!(
                    "{} ({}, {} baud)",
                    verb,
                    self.connection.port_label(),
                    baud_rate
                ));
            }
            LifecycleEvent::Disconnected(status) => {
                self.flush_chunk();
                self.info(match status {
                    DisconnectStatus::ClosedForReconfigure => "Port closed for reconfiguration",
                    DisconnectStatus::Disconnected => "Disconnected",
                });
            }
            LifecycleEvent::Failed(err) => {
                self.flush_chunk();
                self.info(err.to_string());
            }
        }
    }

    fn info(&mut self, text: impl Into<String>) {
        self.store.append(LogCategory::Info, text);
    }

    /// A partial line that will never be completed becomes a record of its own.
    fn flush_chunk(&mut self) {
        if let Some(chunk) = self.log_chunk.take() {
            self.store.append(LogCategory::Plain, chunk);
        }
    }

    pub fn tick(&mut self) {
        self.poll_connection();
        self.filtered.update(&self.store);
        let pinned = self.window.recompute(self.filtered.len());
        let max = self.max_offset();
        if pinned {
            if self.scroll_offset != max {
                self.scroll_to(max, true);
            }
        } else if self.scroll_offset > max {
            self.scroll_offset = max;
        }
    }

    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height;
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn window_records(&self) -> impl Iterator<Item = &LogRecord> + '_ {
        let range = self.window.visible_range(self.filtered.len());
        let records = self.store.records();
        self.filtered.indices()[range].iter().map(move |&i| &records[i])
    }

    pub fn chunk_preview(&self) -> Option<&str> {
        if self.window.auto_scroll() && !self.filtered.filter().is_active() {
            self.log_chunk.as_deref()
        } else {
            None
        }
    }

    fn slice_rows(&self) -> usize {
        self.window.visible_range(self.filtered.len()).len() + usize::from(self.chunk_preview().is_some())
    }

    fn max_offset(&self) -> usize {
        self.slice_rows().saturating_sub(self.viewport_height)
    }

    fn metrics(&self) -> ScrollMetrics {
        ScrollMetrics {
            from_top: self.scroll_offset,
            from_bottom: self.max_offset().saturating_sub(self.scroll_offset),
        }
    }

    fn scroll_to(&mut self, offset: usize, programmatic: bool) {
        self.scroll_offset = offset.min(self.max_offset());
        if programmatic {
            self.window.mark_programmatic_scroll();
        }
        let page_size = self.window.config().page_size;
        match self.window.on_scroll(self.metrics()) {
            // The slice start moved; keep the same records on screen.
            WindowShift::Later => self.scroll_offset = self.scroll_offset.saturating_sub(page_size),
            WindowShift::Earlier => self.scroll_offset += page_size,
            WindowShift::None => {}
        }
        self.scroll_offset = self.scroll_offset.min(self.max_offset());
    }

    pub fn scroll_up(&mut self, amount: usize) {
        self.scroll_to(self.scroll_offset.saturating_sub(amount), false);
    }

    pub fn scroll_down(&mut self, amount: usize) {
        self.scroll_to(self.scroll_offset + amount, false);
    }

    pub fn jump_to_top(&mut self) {
        self.window.jump_to_top();
        self.scroll_to(0, true);
    }

    pub fn jump_to_bottom(&mut self) {
        self.window.jump_to_bottom();
        self.window.recompute(self.filtered.len());
        self.scroll_to(self.max_offset(), true);
    }

    fn set_filter(&mut self, filter: FilterState) {
        if self.filtered.set_filter(filter) {
            self.window.reset(false);
            self.scroll_offset = 0;
            self.filtered.update(&self.store);
        }
    }

    pub fn apply_search(&mut self) {
        let filter = FilterState::new(&self.input_fields.search.text, self.filtered.filter().category());
        self.set_filter(filter);
    }

    /// Selecting the active category again clears the category filter.
    pub fn toggle_category(&mut self, category: LogCategory) {
        let current = self.filtered.filter();
        let next = if current.category() == Some(category) {
            None
        } else {
            Some(category)
        };
        let filter = FilterState::new(current.search_text(), next);
        self.set_filter(filter);
    }

    pub fn category_buttons(&self) -> Vec<(LogCategory, usize, bool)> {
        let selected = self.filtered.filter().category();
        self.filtered
            .counts()
            .iter()
            .filter_map(|(category, count)| {
                let is_selected = selected == Some(category);
                (count > 0 || is_selected).then_some((category, count, is_selected))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.filtered.reset();
        self.window.reset(false);
        self.log_chunk = None;
        self.scroll_offset = 0;
        self.status_message = Some("Cleared".to_string());
    }

    pub fn connect(&mut self) {
        let config = PortConfig {
            baud_rate: self.settings.get().baud_rate,
        };
        if let Err(e) = self.connection.connect(config) {
            self.status_message = Some(e.to_string());
        }
    }

    pub fn toggle_connection(&mut self) {
        if self.connection.is_reading() {
            self.connection.disconnect();
        } else {
            self.connect();
        }
    }

    pub fn cycle_baud(&mut self, forward: bool) {
        let next = cycle_baud_rate(self.settings.get().baud_rate, forward);
        let update = self.settings.set(SettingsPatch {
            baud_rate: Some(next),
            ..Default::default()
        });
        if update.touched(SettingsField::BaudRate) && self.connection.is_reading() {
            self.connect();
        }
        self.status_message = Some(format!("Baud rate: {}", update.snapshot.baud_rate));
    }

    /// Applies to lines read from now on.
    pub fn toggle_classify(&mut self) {
        let classify = !self.settings.get().classify;
        self.settings.set(SettingsPatch {
            classify: Some(classify),
            ..Default::default()
        });
        self.status_message = Some(format!(
            "Classification {}",
            if classify { "on" } else { "off" }
        ));
    }

    pub fn send_message(&mut self) {
        let text = self.input_fields.send.take();
        if text.is_empty() {
            return;
        }
        if !self.connection.is_reading() {
            self.info("not connected");
            return;
        }
        self.store.append(LogCategory::Sent, text.as_str());
        if let Err(e) = self.connection.send(&text) {
            self.info(e.to_string());
        }
    }

    pub fn connection_label(&self) -> &'static str {
        match self.connection.state() {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::PortAcquired => "Connected",
            ConnectionState::PortOpen => "Reading",
            ConnectionState::ClosingForReconfigure => "Reconfiguring",
            ConnectionState::DisconnectingFully => "Disconnecting",
        }
    }

    pub fn handle_input_key(&mut self, key_code: KeyCode) -> bool {
        if let Some(input) = self.input_fields.get_active_mut(self.input_mode) {
            match key_code {
                KeyCode::Left => input.move_cursor_left(),
                KeyCode::Right => input.move_cursor_right(),
                KeyCode::Home => input.move_cursor_to_start(),
                KeyCode::End => input.move_cursor_to_end(),
                KeyCode::Char(c) => input.insert_char(c),
                KeyCode::Backspace => input.delete_char_before_cursor(),
                KeyCode::Delete => input.delete_char_at_cursor(),
                KeyCode::Enter => return true,
                KeyCode::Esc => {
                    self.input_mode = InputMode::Normal;
                }
                _ => {}
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Settings;
    use crate::transport::mock::MockDevice;
    use std::thread;
    use std::time::{Duration, Instant};

    fn app_with(settings: Settings) -> (MockDevice, App) {
        let device = MockDevice::default();
        let app = App::new(Box::new(device.clone()), SettingsStore::new(settings));
        (device, app)
    }

    fn wait_for(app: &mut App, mut done: impl FnMut(&App) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done(app) && Instant::now() < deadline {
            app.poll_connection();
            thread::sleep(Duration::from_millis(5));
        }
        assert!(done(app), "timed out waiting for connection events");
    }

    fn contents(app: &App) -> Vec<(LogCategory, String)> {
        app.store
            .records()
            .iter()
            .map(|r| (r.category, r.content.clone()))
            .collect()
    }

    fn fill(app: &mut App, n: usize) {
        for i in 0..n {
            app.store.append(LogCategory::Plain, format!("line {}", i));
        }
        app.filtered.catch_up(&app.store);
    }

    #[test]
    fn test_pending_chunk_flushed_before_disconnect_record() {
        let (device, mut app) = app_with(Settings::default());
        app.connect();
        device.push(b"one\ntwo\nthree\npartial");
        wait_for(&mut app, |app| app.log_chunk.as_deref() == Some("partial"));

        app.connection.disconnect();
        app.poll_connection();

        assert_eq!(
            contents(&app),
            vec![
                (LogCategory::Info, "Connected (mock, 9600 baud)".to_string()),
                (LogCategory::Plain, "one".to_string()),
                (LogCategory::Plain, "two".to_string()),
                (LogCategory::Plain, "three".to_string()),
                (LogCategory::Plain, "partial".to_string()),
                (LogCategory::Info, "Disconnected".to_string()),
            ]
        );
        assert!(app.chunk_preview().is_none());
    }

    #[test]
    fn test_line_replaces_chunk_preview() {
        let (device, mut app) = app_with(Settings::default());
        app.connect();
        device.push(b"he");
        wait_for(&mut app, |app| app.chunk_preview() == Some("he"));
        device.push(b"llo\n");
        wait_for(&mut app, |app| app.store.len() == 2);
        assert_eq!(app.chunk_preview(), None);
        assert_eq!(app.store.records()[1].content, "hello");
    }

    #[test]
    fn test_read_error_is_logged_and_resets() {
        let (device, mut app) = app_with(Settings::default());
        app.connect();
        device.push(b"tail");
        wait_for(&mut app, |app| app.log_chunk.is_some());
        device.with(|s| s.read_error = Some("EIO".to_string()));
        wait_for(&mut app, |app| {
            app.connection.state() == ConnectionState::Disconnected
                && app.store.records().last().map(|r| r.content.as_str()) == Some("Disconnected")
        });

        let records = contents(&app);
        assert_eq!(records[1], (LogCategory::Plain, "tail".to_string()));
        assert_eq!(records[2], (LogCategory::Info, "read failed: EIO".to_string()));
    }

    #[test]
    fn test_access_denied_becomes_info_record() {
        let (device, mut app) = app_with(Settings::default());
        device.with(|s| s.deny_access = true);
        app.connect();
        app.poll_connection();
        assert_eq!(
            contents(&app),
            vec![(LogCategory::Info, "access denied: user declined".to_string())]
        );
        assert_eq!(app.connection_label(), "Disconnected");
    }

    #[test]
    fn test_baud_change_reconfigures_without_new_access() {
        let (device, mut app) = app_with(Settings::default());
        app.connect();
        app.cycle_baud(true);
        app.poll_connection();

        assert_eq!(
            contents(&app),
            vec![
                (LogCategory::Info, "Connected (mock, 9600 baud)".to_string()),
                (LogCategory::Info, "Port closed for reconfiguration".to_string()),
                (LogCategory::Info, "Reconnected (mock, 19200 baud)".to_string()),
            ]
        );
        assert_eq!(device.with(|s| s.access_requests), 1);
        assert_eq!(app.connection_label(), "Reading");
    }

    #[test]
    fn test_baud_change_while_disconnected_only_updates_settings() {
        let (device, mut app) = app_with(Settings::default());
        app.cycle_baud(false);
        assert_eq!(app.settings.get().baud_rate, 4800);
        assert_eq!(device.with(|s| s.access_requests), 0);
    }

    #[test]
    fn test_toggle_classify_affects_later_lines() {
        let (device, mut app) = app_with(Settings::default());
        app.connect();
        device.push(b"ERROR one\n");
        wait_for(&mut app, |app| app.store.len() == 2);

        app.toggle_classify();
        assert!(app.settings.get().classify);
        assert_eq!(app.status_message.as_deref(), Some("Classification on"));
        device.push(b"ERROR two\n");
        wait_for(&mut app, |app| app.store.len() == 3);

        let categories: Vec<LogCategory> = app.store.records().iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![LogCategory::Info, LogCategory::Plain, LogCategory::Error]
        );
    }

    #[test]
    fn test_send_echoes_and_writes() {
        let (device, mut app) = app_with(Settings::default());
        app.input_fields.send.text = "AT".to_string();
        app.send_message();
        assert_eq!(contents(&app), vec![(LogCategory::Info, "not connected".to_string())]);
        assert!(device.with(|s| s.written.is_empty()));

        app.connect();
        app.poll_connection();
        app.input_fields.send.text = "AT+RST".to_string();
        app.send_message();
        assert_eq!(
            contents(&app).last(),
            Some(&(LogCategory::Sent, "AT+RST".to_string()))
        );
        assert_eq!(device.with(|s| s.written.clone()), b"AT+RST\n");
        assert!(app.input_fields.send.text.is_empty());
    }

    #[test]
    fn test_classify_uses_keywords() {
        let (device, mut app) = app_with(Settings {
            classify: true,
            ..Settings::default()
        });
        app.connect();
        device.push(b"boot\nWARN low battery\nE: sensor read failed\n");
        wait_for(&mut app, |app| app.store.len() == 4);
        let categories: Vec<LogCategory> = app.store.records().iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![
                LogCategory::Info,
                LogCategory::Plain,
                LogCategory::Warning,
                LogCategory::Error
            ]
        );
    }

    #[test]
    fn test_category_toggle_and_buttons() {
        let (_device, mut app) = app_with(Settings::default());
        for i in 0..10 {
            let category = if i % 5 == 0 { LogCategory::Error } else { LogCategory::Plain };
            app.store.append(category, format!("record {}", i));
        }
        app.tick();
        assert_eq!(
            app.category_buttons(),
            vec![(LogCategory::Plain, 8, false), (LogCategory::Error, 2, false)]
        );

        app.toggle_category(LogCategory::Error);
        app.tick();
        assert_eq!(app.filtered.len(), 2);
        assert_eq!(app.category_buttons(), vec![(LogCategory::Error, 2, true)]);

        app.toggle_category(LogCategory::Error);
        app.tick();
        assert_eq!(app.filtered.counts(), app.store.counts());
    }

    #[test]
    fn test_search_is_live_and_hides_chunk_preview() {
        let (_device, mut app) = app_with(Settings::default());
        app.store.append(LogCategory::Plain, "Temperature 21C");
        app.store.append(LogCategory::Plain, "humidity 40%");
        app.log_chunk = Some("temp".to_string());
        app.tick();
        assert_eq!(app.chunk_preview(), Some("temp"));

        app.input_mode = InputMode::SearchEdit;
        for c in "TEMP".chars() {
            app.handle_input_key(KeyCode::Char(c));
            app.apply_search();
        }
        app.tick();
        assert_eq!(app.filtered.indices(), &[0]);
        assert_eq!(app.chunk_preview(), None);
    }

    #[test]
    fn test_clear_resets_everything() {
        let (_device, mut app) = app_with(Settings::default());
        app.set_viewport_height(10);
        fill(&mut app, 50);
        app.tick();
        app.scroll_up(5);
        app.clear();
        app.tick();
        assert!(app.store.is_empty());
        assert_eq!(app.filtered.len(), 0);
        assert_eq!(app.filtered.scanned_up_to(), 0);
        assert_eq!(app.scroll_offset(), 0);
        assert_eq!(app.window.current_page(), app.window.config().min_window_pages);
    }

    #[test]
    fn test_follow_tail_until_user_scrolls() {
        let (_device, mut app) = app_with(Settings::default());
        app.set_viewport_height(20);
        fill(&mut app, 1000);
        app.tick();

        // 3 pages of 100 rows rendered, view pinned to their end.
        assert!(app.window.auto_scroll());
        assert_eq!(app.window.current_page(), 10);
        assert_eq!(app.scroll_offset(), 280);
        assert_eq!(app.window_records().last().map(|r| r.id), Some(999));

        app.scroll_up(30);
        assert!(!app.window.auto_scroll());
        let held = app.scroll_offset();
        fill(&mut app, 100);
        app.tick();
        assert_eq!(app.scroll_offset(), held);
        assert_eq!(app.window.current_page(), 10);

        app.jump_to_bottom();
        app.tick();
        assert!(app.window.auto_scroll());
        assert_eq!(app.window.current_page(), 11);
        assert_eq!(app.scroll_offset(), 280);
    }

    #[test]
    fn test_jump_to_top_is_not_mistaken_for_user_scroll() {
        let (_device, mut app) = app_with(Settings::default());
        app.set_viewport_height(20);
        fill(&mut app, 1000);
        app.tick();

        app.jump_to_top();
        assert_eq!(app.scroll_offset(), 0);
        assert_eq!(app.window.current_page(), 3);
        assert_eq!(app.window_records().next().map(|r| r.id), Some(0));
        assert!(!app.window.auto_scroll());
    }

    #[test]
    fn test_scrolling_into_bottom_edge_slides_window() {
        let (_device, mut app) = app_with(Settings::default());
        app.set_viewport_height(20);
        fill(&mut app, 1000);
        app.tick();
        app.jump_to_top();

        // Max offset is 280; near edge is 5 rows.
        app.scroll_down(270);
        assert_eq!(app.window.current_page(), 3);
        let first_visible = app.window_records().nth(app.scroll_offset()).map(|r| r.id);

        app.scroll_down(6);
        assert_eq!(app.window.current_page(), 4);
        // Same record sits at the top of the viewport after the slide.
        assert_eq!(
            app.window_records().nth(app.scroll_offset()).map(|r| r.id),
            first_visible.map(|id| id + 6)
        );
    }
}
