//! Wire framing for streamed output.
//!
//! Pure, one chunk per input line, no buffering beyond the current line.

use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;

use super::executor::{OutputEvent, OutputFormat};
use super::subprocess::OutputStream;

/// Framed chunks ready to be written to the response body.
pub type ChunkStream = BoxStream<'static, String>;

#[derive(Serialize)]
struct LineRecord<'a> {
    line: &'a str,
}

/// Frame a single line.
pub fn format_line(format: OutputFormat, event: &OutputEvent) -> String {
    match format {
        OutputFormat::Plain => event.as_str().to_string(),
        OutputFormat::Jsonl => format!("{}\n", record_json(event)),
        OutputFormat::Sse => format!("data: {}\n\n", record_json(event)),
    }
}

fn record_json(event: &OutputEvent) -> String {
    // Serializing a struct holding a single &str cannot fail.
    serde_json::to_string(&LineRecord {
        line: event.content(),
    })
    .unwrap_or_default()
}

/// Map every event of `events` through [`format_line`].
pub fn format_stream(events: OutputStream, format: OutputFormat) -> ChunkStream {
    events.map(move |event| format_line(format, &event)).boxed()
}
