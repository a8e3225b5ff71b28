use crate::app::App;
use crate::connection::machine::ConnectionState;
use crate::constants::POLL_INTERVAL_MS;
use anyhow::Result;
use std::io::Write;
use std::thread;
use std::time::Duration;

/// Write records `[from..]` as JSON lines. Returns the new cursor.
pub fn write_records<W: Write>(app: &App, from: usize, out: &mut W) -> Result<usize> {
    let records = app.store.records();
    for record in records.iter().skip(from) {
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(records.len())
}

pub fn run<W: Write>(mut app: App, out: &mut W) -> Result<()> {
    app.connect();
    let mut printed = 0;
    loop {
        app.poll_connection();
        printed = write_records(&app, printed, out)?;
        if app.connection.state() == ConnectionState::Disconnected {
            tracing::info!("device disconnected, leaving headless mode");
            return Ok(());
        }
        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}
