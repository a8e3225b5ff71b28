pub mod filter_state;
pub mod input_state;
pub mod log_state;
pub mod settings;
pub mod window_state;

pub use filter_state::{FilterState, FilteredIndex};
pub use input_state::{InputFields, InputMode};
pub use log_state::{get_time_age, LogCategory, LogRecord, LogStore, TimeAge};
pub use settings::{Settings, SettingsField, SettingsPatch, SettingsStore};
pub use window_state::{ScrollMetrics, WindowConfig, WindowController, WindowShift};
