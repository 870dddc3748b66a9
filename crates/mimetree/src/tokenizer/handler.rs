//! Callbacks for the MIME tokenizer.
//!
//! The tokenizer reports the structure of a message as a flat sequence of
//! events: one `start_message`, then a `start_part`/`end_part` pair for every
//! part in document order with any number of `part_data` calls in between,
//! then one `end_message`.
//!
//! # Example
//!
//! ```
//! use mimetree::tokenizer::{self, PartHandler, PartHeaders, TokenizerOptions};
//!
//! #[derive(Default)]
//! struct PartCounter {
//!     parts: usize,
//! }
//!
//! impl PartHandler for PartCounter {
//!     fn on_start_part(&mut self, _part: &str, _headers: &PartHeaders) {
//!         self.parts += 1;
//!     }
//! }
//!
//! let counter = tokenizer::parse(
//!     b"Subject: hi\r\n\r\nbody\r\n",
//!     PartCounter::default(),
//!     TokenizerOptions::default(),
//! );
//! assert_eq!(counter.parts, 1);
//! ```

use super::{PartData, PartHeaders};

/// Receives tokenizer events.
///
/// Part identifiers are dot-separated 1-based indexes; the message itself is
/// the part `""`, its children are `"1"`, `"2"`, their children `"1.1"`, and
/// so on. Every method has an empty default.
pub trait PartHandler {
    /// Called once before anything else.
    fn on_start_message(&mut self) {}

    /// Called when a part's header block has been read.
    fn on_start_part(&mut self, part: &str, headers: &PartHeaders) {
        let _ = (part, headers);
    }

    /// Called with the next chunk of a part's body.
    ///
    /// Concatenating the chunks of one part in delivery order gives its
    /// whole content. A part with no body gets no calls.
    fn on_part_data(&mut self, part: &str, data: PartData) {
        let _ = (part, data);
    }

    /// Called after the last data chunk of a part.
    fn on_end_part(&mut self, part: &str) {
        let _ = part;
    }

    /// Called once after everything else.
    fn on_end_message(&mut self) {}
}

impl<H: PartHandler + ?Sized> PartHandler for &mut H {
    fn on_start_message(&mut self) {
        (**self).on_start_message();
    }

    fn on_start_part(&mut self, part: &str, headers: &PartHeaders) {
        (**self).on_start_part(part, headers);
    }

    fn on_part_data(&mut self, part: &str, data: PartData) {
        (**self).on_part_data(part, data);
    }

    fn on_end_part(&mut self, part: &str) {
        (**self).on_end_part(part);
    }

    fn on_end_message(&mut self) {
        (**self).on_end_message();
    }
}

/// A handler that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl PartHandler for NoopHandler {}

/// A handler that logs every event using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl PartHandler for LoggingHandler {
    fn on_start_message(&mut self) {
        tracing::debug!("START MESSAGE");
    }

    fn on_start_part(&mut self, part: &str, headers: &PartHeaders) {
        tracing::debug!(
            part,
            content_type = %headers.content_type.mime_type(),
            headers = headers.raw_headers.len(),
            "START PART"
        );
    }

    fn on_part_data(&mut self, part: &str, data: PartData) {
        tracing::trace!(
            part,
            bytes = data.bytes.len(),
            text = data.text.as_ref().map(String::len),
            "DATA"
        );
    }

    fn on_end_part(&mut self, part: &str) {
        tracing::debug!(part, "END PART");
    }

    fn on_end_message(&mut self) {
        tracing::debug!("END MESSAGE");
    }
}

/// A handler that collects events for later inspection.
///
/// Useful for testing or for replaying a parse.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    /// Collected events.
    pub events: Vec<PartEvent>,
}

impl CollectingHandler {
    /// Creates a new collecting handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all collected events, leaving the handler empty.
    pub fn take(&mut self) -> Vec<PartEvent> {
        std::mem::take(&mut self.events)
    }

    /// Identifiers of the parts that were started, in order.
    #[must_use]
    pub fn part_ids(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                PartEvent::StartPart { part, .. } => Some(part.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated bytes delivered for one part.
    #[must_use]
    pub fn bytes(&self, part: &str) -> Vec<u8> {
        self.data(part)
            .flat_map(|data| data.bytes.iter().copied())
            .collect()
    }

    /// Concatenated text delivered for one part.
    #[must_use]
    pub fn text(&self, part: &str) -> String {
        self.data(part)
            .filter_map(|data| data.text.as_deref())
            .collect()
    }

    fn data<'a>(&'a self, part: &'a str) -> impl Iterator<Item = &'a PartData> {
        self.events.iter().filter_map(move |event| match event {
            PartEvent::Data { part: p, data } if p == part => Some(data),
            _ => None,
        })
    }
}

impl PartHandler for CollectingHandler {
    fn on_start_message(&mut self) {
        self.events.push(PartEvent::StartMessage);
    }

    fn on_start_part(&mut self, part: &str, headers: &PartHeaders) {
        self.events.push(PartEvent::StartPart {
            part: part.to_string(),
            headers: headers.clone(),
        });
    }

    fn on_part_data(&mut self, part: &str, data: PartData) {
        self.events.push(PartEvent::Data {
            part: part.to_string(),
            data,
        });
    }

    fn on_end_part(&mut self, part: &str) {
        self.events.push(PartEvent::EndPart(part.to_string()));
    }

    fn on_end_message(&mut self) {
        self.events.push(PartEvent::EndMessage);
    }
}

/// A tokenizer event collected by [`CollectingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartEvent {
    /// Start of the message.
    StartMessage,
    /// Start of a part.
    StartPart {
        /// Part identifier.
        part: String,
        /// The part's headers.
        headers: PartHeaders,
    },
    /// A body chunk.
    Data {
        /// Part identifier.
        part: String,
        /// The chunk.
        data: PartData,
    },
    /// End of a part.
    EndPart(String),
    /// End of the message.
    EndMessage,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_handler() {
        let mut handler = NoopHandler;
        // Should not panic
        handler.on_start_message();
        handler.on_start_part("", &PartHeaders::default());
        handler.on_end_part("");
        handler.on_end_message();
    }

    #[test]
    fn test_collecting_handler() {
        let mut handler = CollectingHandler::new();

        handler.on_start_message();
        handler.on_start_part("1", &PartHeaders::default());
        handler.on_part_data(
            "1",
            PartData {
                bytes: b"ab".to_vec(),
                text: Some("ab".to_string()),
            },
        );
        handler.on_part_data(
            "1",
            PartData {
                bytes: b"c".to_vec(),
                text: Some("c".to_string()),
            },
        );
        handler.on_end_part("1");
        handler.on_end_message();

        assert_eq!(handler.events.len(), 6);
        assert_eq!(handler.part_ids(), vec!["1"]);
        assert_eq!(handler.bytes("1"), b"abc");
        assert_eq!(handler.text("1"), "abc");
        assert_eq!(handler.events[4], PartEvent::EndPart("1".to_string()));

        let taken = handler.take();
        assert_eq!(taken.len(), 6);
        assert!(handler.events.is_empty());
    }

    #[test]
    fn test_handler_by_reference() {
        fn drive<H: PartHandler>(mut handler: H) {
            handler.on_start_message();
            handler.on_end_message();
        }

        let mut collector = CollectingHandler::new();
        drive(&mut collector);
        assert_eq!(collector.events, vec![PartEvent::StartMessage, PartEvent::EndMessage]);
    }
}
