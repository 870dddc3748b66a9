//! # mimetree
//!
//! Lenient MIME mail parsing: headers, part tree, bodies, and attachments.
//!
//! ## Features
//!
//! - **Streaming tokenizer**: Feed a message in chunks, get part events through a callback trait
//! - **Part tree**: Nested multiparts, sizes, body/attachment classification
//! - **Header grammars**: Address lists, parameter lists (RFC 2231), encoded words (RFC 2047)
//! - **Structured headers**: Extensible registry of per-header decoders and encoders
//! - **Decoding**: Base64, Quoted-Printable, every `encoding_rs` charset plus UTF-7
//!
//! Broken input is never an error. Missing boundaries, unterminated multiparts,
//! malformed encoded words and unknown body charsets are recovered and logged
//! with `tracing`.
//!
//! ## Quick Start
//!
//! ### Summarizing a message
//!
//! ```
//! let raw = "From: Alice <alice@example.com>\r\n\
//!            To: bob@example.com\r\n\
//!            Subject: =?UTF-8?B?8J+YgyBzbWlsZQ==?=\r\n\
//!            \r\n\
//!            Hello, Bob!\r\n";
//!
//! let mail = mimetree::parse_mail(raw);
//! assert_eq!(mail.subject.as_deref(), Some("\u{1F603} smile"));
//! assert_eq!(mail.from.unwrap().email, "alice@example.com");
//! assert_eq!(mail.body.text, "Hello, Bob!\n");
//! ```
//!
//! ### Walking the part tree
//!
//! ```
//! use mimetree::{Extraction, ParseOptions};
//!
//! let raw = "Content-Type: multipart/mixed; boundary=b\r\n\
//!            \r\n\
//!            --b\r\n\
//!            \r\n\
//!            see attached\r\n\
//!            --b\r\n\
//!            Content-Type: application/pdf\r\n\
//!            Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
//!            \r\n\
//!            %PDF\r\n\
//!            --b--\r\n";
//!
//! let Some(Extraction::Tree(tree)) = mimetree::extract_mime_msg(raw, &ParseOptions::default())? else {
//!     unreachable!();
//! };
//! assert_eq!(tree.body_parts.text, ["see attached"]);
//! assert_eq!(tree.attachments[0].file_name, "report.pdf");
//! assert_eq!(tree.attachments[0].content, b"%PDF");
//! # Ok::<(), mimetree::Error>(())
//! ```
//!
//! ### Decoding a single header
//!
//! ```
//! use mimetree::header::{HeaderFlags, HeaderValue, decode_header_field};
//!
//! let value = decode_header_field(
//!     b"attachment; filename*=utf-8''%E2%82%AC.txt",
//!     HeaderFlags::PARAMETER | HeaderFlags::ALL_I18N,
//!     None,
//! )?;
//! let HeaderValue::Parameters(params) = value else { unreachable!() };
//! assert_eq!(params.get("filename"), Some("\u{20ac}.txt"));
//! # Ok::<(), mimetree::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod mail;
mod options;
mod tree;

pub mod charset;
pub mod encoding;
pub mod header;
pub mod tokenizer;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::{Headers, Mailbox, get_parameter};
pub use mail::{Body, Mail, extract_headers, extract_headers_and_body, extract_mime_msg, parse_mail};
pub use options::{ParseOptions, ParseOptionsBuilder};
pub use tree::{Attachment, BodyParts, Extraction, MimeTree, Part, PartKind, TreeBuilder};
