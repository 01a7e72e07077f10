//! logdev core library: single-file write-close watch service.
//!
//! Public API surface:
//! - [`resolver`]: configured path to [`WatchTarget`]
//! - [`registry`]: [`Backend`] capability and scoped group/mark handles
//! - [`debounce`]: [`DebounceGate`]
//! - [`reader`]: bounded [`ContentReader`]
//! - [`dispatcher`]: [`Dispatcher`], the event entry point
//! - [`lifecycle`]: [`WatchService`] startup/shutdown
//! - [`config`]: [`WatchConfig`] and YAML loading
//! - [`error`]: [`WatchError`]

pub mod config;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod reader;
pub mod registry;
pub mod resolver;
pub mod types;

pub use config::{ConfigFile, WatchConfig};
pub use debounce::{DebounceGate, DebounceState};
pub use dispatcher::{
    DispatchOutcome, DispatchStats, Dispatcher, DispatcherState, ReadReport, COMPONENT,
    INTEREST_MASK,
};
pub use error::{ReadError, ResolutionError, Resource, WatchError};
pub use lifecycle::{StartupStep, WatchService};
pub use reader::{ContentReader, Contents};
pub use registry::{Backend, ChangeHandler, GroupGuard, MarkGuard, Registration};
pub use resolver::{PathRef, PathResolver};
pub use types::{
    EventMask, FileIdentity, GroupId, MarkId, Notification, Timestamp, WatchTarget,
};
