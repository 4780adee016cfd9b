//! Ingestion of conversation log files.
//!
//! Provides the record schema, a restartable streaming line parser and an
//! offset-tracking tailer for growing files.

mod error;
mod record;
mod stream;
mod tailer;

pub use error::{IngestError, ParseError};
pub use record::{ContentBlock, Message, MessageContent, MessageKind};
pub use stream::{parse_chunk, Cursor, LineParser, ParsedChunk};
pub use tailer::{FileStamp, JsonlTailer, TailRead};
