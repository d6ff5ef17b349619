//! Narrow adapter to an external terminal multiplexer.
//!
//! The monitor/supervisor engine never speaks the multiplexer's wire
//! protocol directly — it only goes through [`MultiplexerAdapter`]. This
//! crate ships a tmux-backed implementation ([`tmux::TmuxAdapter`]) and an
//! in-memory fake ([`memory::InMemoryAdapter`]) for tests.

mod adapter;
mod memory;
mod tmux;

pub use adapter::{MultiplexerAdapter, MuxError, WindowHandle, WindowInfo};
pub use memory::InMemoryAdapter;
pub use tmux::TmuxAdapter;
