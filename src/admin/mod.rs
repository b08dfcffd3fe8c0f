//! Tree administration.
//!
//! # Data Flow
//! ```text
//! logserver.Admin RPCs (service.rs) → AdminStorage
//!
//! Deleted tree GC (gc.rs):
//!     randomized timer → list trees incl. deleted
//!     → hard-delete those deleted longer than the threshold
//! ```
//!
//! # Design Decisions
//! - Admin calls are never charged quota
//! - The GC is a single task; one tree failing does not abort a pass

pub mod gc;
pub mod service;

pub use gc::DeletedTreeGc;
pub use service::AdminService;
