//! Entity-preserving search and replace for archived Telegram messages.
//!
//! Text and formatting are kept as a [`text::RichText`]: plain text plus
//! UTF-16 indexed spans. [`replace::replace`] rewrites the text and re-anchors
//! every span; [`codec`] and [`markup`] move rich text in and out of storage;
//! [`store`] and [`batch`] apply edits to a JSON message archive.

pub mod batch;
pub mod codec;
pub mod config;
pub mod errors;
pub mod logging;
pub mod markup;
pub mod replace;
pub mod span;
pub mod store;
pub mod text;
pub mod utils;

pub use errors::{Error, Result};
