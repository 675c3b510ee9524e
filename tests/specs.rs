//! Black-box behavioral specifications for the `varie`/`varied` binaries.
//!
//! Each test spawns real `varie`/`varied` processes against an isolated
//! `VARIE_HOME`, exercising the daemon lifecycle and control socket the
//! way a real operator would (spec.md §4, §6).

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/daemon/lifecycle.rs"]
mod daemon_lifecycle;

#[path = "specs/dispatch/control_socket.rs"]
mod dispatch_control_socket;
