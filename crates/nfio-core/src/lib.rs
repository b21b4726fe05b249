pub mod comm;
pub mod error;
pub mod naming;
pub mod read;
pub mod schedule;
pub mod timer;
pub mod topology;
pub mod write;

// Re-export primary types for convenience
pub use comm::{Comm, Message, Rank, Tag};
pub use error::NfioError;
pub use naming::file_name;
pub use read::ReadSession;
pub use schedule::{CompletionReport, ScheduleTable, UNASSIGNED};
pub use timer::{PassTimers, now};
pub use topology::{GroupingMode, Topology};
pub use write::{DEFAULT_BUFFER_SIZE, WriteSession};
