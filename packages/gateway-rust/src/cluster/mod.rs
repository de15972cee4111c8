//! Cluster bootstrap module.
//!
//! Provides the metadata owners, the control-plane broadcast and reduction
//! machinery, slow-path uuid resolution, the collaborator contracts with
//! their HTTP implementations, and the bootstrap state machine that drives
//! a starting gateway to a consistent view of cluster membership and
//! identity.

pub mod bootstrap;
pub mod broadcast;
pub mod errors;
pub mod gateway;
pub mod owner;
pub mod reduce;
pub mod resolve;
pub mod sync;
pub mod traits;

// ---------------------------------------------------------------------------
// Re-exports — flat public API
// ---------------------------------------------------------------------------

// bootstrap
pub use bootstrap::{Bootstrapper, EnvHint};

// broadcast
pub use broadcast::{BcastArgs, BcastResult, BcastScope, CtrlPlaneBroadcaster};

// errors
pub use errors::{BootstrapError, ClusterIntegrityError, OwnerError};

// gateway
pub use gateway::{Gateway, MetaMismatch};

// owner
pub use owner::MetaOwner;

// reduce
pub use reduce::{reduce_max_ver, ReduceState};

// resolve
pub use resolve::{resolve_bmeta_uuid, resolve_cmap_uuid};

// sync
pub use sync::{CtrlPlaneMetaSyncer, HttpJoiner};

// traits
pub use traits::{Broadcast, Joiner, MetaSyncer, SyncHandle};
