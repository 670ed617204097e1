pub mod trace;

pub use trace::{TraceError, TraceRecord, TraceReplayer};
