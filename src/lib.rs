pub mod codec;
pub mod exclude;
pub mod pack;
pub mod record;
pub mod sniff;

pub use codec::{decode_stream, encode_record, UnpackError};
pub use exclude::{ExcludeSet, DEFAULT_EXCLUDES};
pub use pack::{pack_tree, PackSummary};
pub use record::{FormatError, RecordHeader, END_MARK, START_MARK};
pub use sniff::{classify, sniff_file, FileKind};
