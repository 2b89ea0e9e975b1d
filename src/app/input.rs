//! Newline-delimited JSON events, one `Event` per line.

use crate::domain::Event;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::warn;

pub struct EventReader<R> {
    lines: Lines<R>,
    line_number: u64,
    rejected: u64,
}

impl<R: AsyncBufRead + Unpin> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            rejected: 0,
        }
    }

    /// Next well-formed event, or `None` at end of input. Blank lines are
    /// skipped; malformed lines are logged and skipped.
    pub async fn next_event(&mut self) -> std::io::Result<Option<Event>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Event>(line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    self.rejected += 1;
                    warn!(line = self.line_number, error = %e, "Skipping malformed event");
                }
            }
        }
        Ok(None)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_skips_blank_and_malformed_lines() {
        let input = concat!(
            r#"{"kind":"values","host":"host-a","plugin":"cpu","type":"freq","time":1441357149.5,"values":[2400.0]}"#,
            "\n\n",
            "not json\n",
            r#"{"kind":"notification","host":"host-a","plugin":"link","type":"status","time":1441357149.0,"severity":"failure","message":"value is above 1"}"#,
            "\n",
        );
        let mut reader = EventReader::new(BufReader::new(input.as_bytes()));

        assert!(matches!(reader.next_event().await.unwrap(), Some(Event::Values(_))));
        assert!(matches!(
            reader.next_event().await.unwrap(),
            Some(Event::Notification(_))
        ));
        assert!(reader.next_event().await.unwrap().is_none());
        assert_eq!(reader.rejected(), 1);
    }
}
