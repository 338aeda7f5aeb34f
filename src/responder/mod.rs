//! Byte-range, conditional and static-file responses.
//!
//! # Data Flow
//! ```text
//! send_file / send_bytes / StaticFiles::serve
//!     → source.rs (ByteSource with length and timestamp)
//!     → range.rs (validators via conditional.rs, range selection, chunked copy)
//!     → HttpResponse
//! ```

pub mod conditional;
pub mod range;
pub mod source;
pub mod static_files;

pub use range::{send_bytes, send_file, ByteRange, RangeResponder, Served};
pub use source::{ByteSource, KnownSize};
pub use static_files::StaticFiles;
