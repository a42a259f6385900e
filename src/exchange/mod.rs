//! Exchange harness
//!
//! One-shot fan-out/fan-in message exchange between isolated processes.
//!
//! # Architecture
//!
//! - **Coordinator** (rank 0): owns the rendezvous address, sends one task to
//!   every worker, collects one result from each
//! - **Workers** (ranks 1..N): receive a task, simulate work, reply
//!
//! # Modules
//!
//! - `protocol`: message definitions and framing
//! - `communicator`: group formation (`discover`), `send`, `receive`
//! - `harness`: the coordinator/worker algorithm
//! - `launcher`: runs a whole group on the local host

pub mod communicator;
pub mod harness;
pub mod launcher;
pub mod protocol;

pub use communicator::{Communicator, Discovery, GroupSpec};
pub use harness::{run_participant, ExchangeReport, HarnessOptions, Role};
pub use launcher::launch_local_group;
pub use protocol::{Message, PAYLOAD_CAPACITY, PROTOCOL_VERSION};
