//! fsroutes - filesystem-driven collection route resolution.
//!
//! Watches a directory of route templates whose file names embed
//! `{Type.field}` bindings, resolves the bindings against externally
//! supplied data records, and incrementally reconciles the set of
//! concrete output pages. Rendering is somebody else's job: this crate
//! decides which pages exist, with what identity and context.
//!
//! Control flow: [`watch`] events → [`pattern`] parsing → [`resolver`]
//! enumeration → [`reconcile`] diffing → [`sink`] page lifecycle calls.

pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod logger;
pub mod pattern;
pub mod reconcile;
pub mod resolver;
pub mod sink;
pub mod slug;
pub mod watch;
