use crate::constants::{BAUD_RATES, DEFAULT_BAUD_RATE, DEFAULT_MAX_CHUNK_LENGTH};
use std::sync::Arc;

/// `max_chunk_length` is read once, when the connection is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub baud_rate: u32,
    pub max_chunk_length: usize,
    pub classify: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            classify: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    BaudRate,
    Classify,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub baud_rate: Option<u32>,
    pub classify: Option<bool>,
}

pub struct SettingsUpdate {
    pub snapshot: Arc<Settings>,
    pub changed: Vec<SettingsField>,
}

impl SettingsUpdate {
    pub fn touched(&self, field: SettingsField) -> bool {
        self.changed.contains(&field)
    }
}

type Listener = Box<dyn FnMut(&Settings)>;

pub struct SettingsStore {
    current: Arc<Settings>,
    listeners: Vec<(Option<SettingsField>, Listener)>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: Arc::new(settings),
            listeners: Vec::new(),
        }
    }

    pub fn get(&self) -> Arc<Settings> {
        Arc::clone(&self.current)
    }

    /// `None` subscribes to every change.
    pub fn subscribe(&mut self, field: Option<SettingsField>, listener: impl FnMut(&Settings) + 'static) {
        self.listeners.push((field, Box::new(listener)));
    }

    pub fn set(&mut self, patch: SettingsPatch) -> SettingsUpdate {
        let mut next = (*self.current).clone();
        let mut changed = Vec::new();

        if let Some(baud) = patch.baud_rate {
            if baud != next.baud_rate {
                next.baud_rate = baud;
                changed.push(SettingsField::BaudRate);
            }
        }
        if let Some(classify) = patch.classify {
            if classify != next.classify {
                next.classify = classify;
                changed.push(SettingsField::Classify);
            }
        }

        if !changed.is_empty() {
            self.current = Arc::new(next);
            for (field, listener) in self.listeners.iter_mut() {
                let wanted = match field {
                    Some(f) => changed.contains(f),
                    None => true,
                };
                if wanted {
                    listener(&self.current);
                }
            }
        }

        SettingsUpdate {
            snapshot: self.get(),
            changed,
        }
    }
}

pub fn cycle_baud_rate(current: u32, forward: bool) -> u32 {
    let Some(pos) = BAUD_RATES.iter().position(|&b| b == current) else {
        return DEFAULT_BAUD_RATE;
    };
    let len = BAUD_RATES.len();
    let next = if forward {
        (pos + 1) % len
    } else {
        (pos + len - 1) % len
    };
    BAUD_RATES[next]
}

pub fn is_supported_baud_rate(baud: u32) -> bool {
    BAUD_RATES.contains(&baud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_set_returns_new_snapshot() {
        let mut store = SettingsStore::new(Settings::default());
        let before = store.get();
        let update = store.set(SettingsPatch {
            baud_rate: Some(115200),
            ..Default::default()
        });

        assert_eq!(before.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(update.snapshot.baud_rate, 115200);
        assert!(update.touched(SettingsField::BaudRate));
        assert!(!update.touched(SettingsField::Classify));
    }

    #[test]
    fn test_listeners_fire_only_for_changed_fields() {
        let mut store = SettingsStore::new(Settings::default());
        let baud_calls = Rc::new(RefCell::new(Vec::new()));
        let any_calls = Rc::new(RefCell::new(0));

        let sink = Rc::clone(&baud_calls);
        store.subscribe(Some(SettingsField::BaudRate), move |s| {
            sink.borrow_mut().push(s.baud_rate)
        });
        let counter = Rc::clone(&any_calls);
        store.subscribe(None, move |_| *counter.borrow_mut() += 1);

        store.set(SettingsPatch {
            classify: Some(true),
            ..Default::default()
        });
        store.set(SettingsPatch {
            baud_rate: Some(57600),
            ..Default::default()
        });
        // Same value again: nothing changes, nobody hears about it.
        let update = store.set(SettingsPatch {
            baud_rate: Some(57600),
            ..Default::default()
        });

        assert!(update.changed.is_empty());
        assert_eq!(*baud_calls.borrow(), vec![57600]);
        assert_eq!(*any_calls.borrow(), 2);
    }

    #[test]
    fn test_cycle_baud_rate_wraps() {
        assert_eq!(cycle_baud_rate(9600, true), 19200);
        assert_eq!(cycle_baud_rate(300, false), 2000000);
        assert_eq!(cycle_baud_rate(2000000, true), 300);
        assert_eq!(cycle_baud_rate(12345, true), DEFAULT_BAUD_RATE);
    }
}
