//! # Module: adapters
//!
//! Ways for agents to hand outcomes to the loop. Each adapter is a thin
//! translation layer over [`Observer`](crate::observer::Observer) or
//! [`ImprovementLoop`](crate::cycle::ImprovementLoop); none of them analyse
//! anything themselves.
//!
//! | Adapter | Transport |
//! |---|---|
//! | [`agent_events::AgentEventAdapter`] | in-process lifecycle hooks |
//! | [`inbox::InboxAdapter`] | JSON files dropped into a directory |
//! | [`webhook`] | HTTP `POST /observe` |

pub mod agent_events;
pub mod inbox;
pub mod webhook;

pub use agent_events::AgentEventAdapter;
pub use inbox::InboxAdapter;
