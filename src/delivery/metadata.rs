//! Session start time from the recording's `metadata.xml`.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::DeliveryError;

const START_TIME_ELEMENT: &[u8] = b"start_time";

/// Epoch milliseconds held by the first `start_time` element of `path`.
pub fn read_start_time(path: &Path) -> Result<i64, DeliveryError> {
    let file = File::open(path).map_err(|source| DeliveryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_start_time(BufReader::new(file)).map_err(|message| DeliveryError::Metadata {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_start_time<R: BufRead>(source: R) -> Result<i64, String> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut in_start_time = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == START_TIME_ELEMENT => {
                in_start_time = true;
            }
            Ok(Event::Text(ref e)) if in_start_time => {
                let text = e.unescape().map_err(|err| err.to_string())?;
                let text = text.trim();
                return text
                    .parse::<i64>()
                    .map_err(|_| format!("start_time {:?} is not an integer", text));
            }
            Ok(Event::End(_)) if in_start_time => return Err("start_time is empty".to_string()),
            Ok(Event::Eof) => return Err("no start_time element".to_string()),
            Err(err) => return Err(format!("invalid XML: {}", err)),
            _ => {}
        }
        buf.clear();
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn format_start_time(epoch_millis: i64) -> Result<String, DeliveryError> {
    DateTime::<Utc>::from_timestamp_millis(epoch_millis)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
        .ok_or(DeliveryError::InvalidStartTime(epoch_millis))
}
