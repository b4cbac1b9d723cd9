//! Core abstractions for the live session client.
//!
//! This crate provides the fundamental building blocks:
//! - `TranscriptEntry` - materialized messages handed to the view layer
//! - `StreamAssembler` - folds streamed fragments into one open entry
//! - `TurnState` - gates when a new submission may be sent
//! - `Transcript` - broadcast + history feed for late-attaching views
//! - Directory and transport traits

pub mod assembler;
pub mod events;
pub mod feed;
pub mod message;
pub mod session;
pub mod traits;
pub mod turn;

pub use assembler::StreamAssembler;
pub use events::{ClientEvent, ConnectionStatus};
pub use feed::Transcript;
pub use message::{AgentInfo, Details, EntryId, EntryKind, TranscriptEntry};
pub use session::{ModelCatalog, Session, SessionId};
pub use traits::{
    DirectoryError, FrameSink, FrameSource, NewSession, SessionDirectory, Transport,
    TransportError,
};
pub use turn::{TurnPhase, TurnState};
