//! Placement: where a sticker may go and how it gets committed
//!
//! - `collision`: minimum-separation index over placed stickers
//! - `search`: bounded spot search and nearest-valid-spot correction
//! - `coordinator`: draft, commit, conflict relocation and batch retries

pub mod collision;
pub mod coordinator;
pub mod search;

pub use collision::CollisionIndex;
pub use coordinator::{DraftInfo, PendingPlacement, Placed, PlacementPhase};
pub use search::SpotSearch;
