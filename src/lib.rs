#![doc(html_root_url = "https://docs.rs/sdom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod binder;
pub mod config;
pub mod content;
pub mod context;
pub mod dom;
mod engine;
mod error;
pub mod host;
pub mod identity;
pub mod listeners;
pub mod load;
pub mod memory;
mod rc_hash_map;
pub mod reconcile;
pub mod scheduler;
mod temp_set;
pub mod tree;

pub use binder::{Behavior, Capability, Resolution};
pub use config::Config;
pub use context::{DataContext, Store};
pub use engine::Engine;
pub use error::{Error, Result};
pub use host::{Host, HostError};
pub use scheduler::{ManualTimer, PassReport, SyncHandle, Timer};
pub use tree::{Decl, EventBinding, Uid};
