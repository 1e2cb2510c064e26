pub mod actions;
pub mod error;
pub mod hlc;
pub mod ids;
pub mod model;
pub mod ordering;
pub mod status;

pub use actions::{ActionPayload, SyncQueueItem};
pub use error::CoreError;
pub use hlc::{Hlc, HlcClock};
pub use ids::*;
pub use model::{Document, DocumentStatus, DocumentType, Line, LineStatus, NewLine, Priority};
