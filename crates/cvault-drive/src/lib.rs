//! cvault-drive: metadata-level drive operations.
//!
//! Everything a user does to the tree without touching file content
//! lives here: rename, move, create, trash/restore/delete, favorites,
//! folder sizes, share propagation and public links. Every operation
//! re-encrypts metadata client-side for each audience that must keep
//! reading it (owner, share recipients, public links) before telling
//! the server anything.

pub mod client;
pub mod error;
pub mod link;
pub mod ops;
pub mod share;
pub mod tree;

pub use client::DriveClient;
pub use error::{DriveError, DriveResult};
pub use link::LinkProgress;
pub use tree::{TreeEntry, TreeScope};
