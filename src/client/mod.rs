//! Tracking Client
//!
//! The visitor-side half of the pipeline: a persistent visitor id and a
//! session-deduplicating event emitter.

pub mod emitter;
pub mod identity;

pub use emitter::{
    EmitOutcome, EventEmitter, EventTransport, HttpTransport, PageView, SessionDedup, TrackPayload,
    TransportError,
};
pub use identity::{
    generate_visitor_id, FileStorage, MemoryStorage, StorageError, VisitorIdentity, VisitorStorage,
};
