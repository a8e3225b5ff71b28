pub const TIMESTAMP_WIDTH: usize = 13;
pub const CATEGORY_WIDTH: usize = 5;

pub const POLL_INTERVAL_MS: u64 = 50;
pub const READ_TIMEOUT_MS: u64 = 100;
pub const TCP_CONNECT_TIMEOUT_MS: u64 = 3000;
pub const READ_BUFFER_SIZE: usize = 4096;

/// Longest partial line kept before it is forced out as a line.
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 256;
/// Matched content a single filter pass may collect before yielding.
pub const DEFAULT_FILTER_MAX_CONTENT_CHARS: usize = 100_000;

pub const PAGE_SIZE: usize = 100;
pub const MIN_WINDOW_PAGES: usize = 3;
/// Rows from an edge that count as "near" it; crossing loads the adjacent page.
pub const NEAR_EDGE_ROWS: usize = 5;
/// Rows from an edge beyond which the jump affordance is offered.
pub const FAR_EDGE_ROWS: usize = 40;

pub const BAUD_RATES: [u32; 15] = [
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 74880, 115200, 230400, 250000, 500000,
    1000000, 2000000,
];
pub const DEFAULT_BAUD_RATE: u32 = 9600;

pub const INPUT_FIELD_HEIGHT: u16 = 3;
pub const MANAGEMENT_BAR_HEIGHT: u16 = 1;
pub const STATUS_BAR_HEIGHT: u16 = 1;

pub const QUIT_POPUP_WIDTH: u16 = 40;
pub const QUIT_POPUP_HEIGHT: u16 = 5;
