//! strand-actor: the actor runtime for strand
//!
//! Actors are lowered `ActorExpr`s running on their own kernel `Machine`,
//! one tokio task each, on a worker pool shared by an `ActorSystem`.
//! Actors only interact by sending `Envelope`s through `ActorRef`s:
//!
//! - **tell**: fire and forget
//! - **ask**: the requester gets `Response` envelopes; inside an actor the
//!   final response is bound to the ask's reply variable, outside one a
//!   `ResponseCollector` gathers them
//!
//! Actors are created with the staged `ActorBuilder` or spawned from a
//! reusable `ActorImage`.

mod actor;
pub mod actor_ref;
pub mod address;
pub mod builder;
pub mod config;
pub mod envelope;
pub mod error;
pub mod image;
pub mod mailbox;
pub mod module;
pub mod routing;
pub mod system;

pub use actor_ref::ActorRef;
pub use address::Address;
pub use builder::{ActorBuilder, Configured, Constructed, Init, Parsed, Ready, Spawned};
pub use config::SystemConfig;
pub use envelope::{Envelope, RequestId};
pub use error::{ActorError, Result};
pub use image::{ActorCfg, ActorImage};
pub use mailbox::{Collected, Mailbox, ResponseCollector};
pub use module::{evaluate_module, DirectoryBroker, MemoryBroker, ModuleBroker};
pub use routing::{PathPattern, Route, RouteMatch, RouteTable, Segment};
pub use system::ActorSystem;
