//! Service lifecycle: ordered setup and teardown of the single watch.
//!
//! Startup runs these steps, each one scoped so that a failure drops every
//! resource acquired before it (in reverse order) and returns one error:
//!
//! 1. resolve the configured path
//! 2. create the watch group
//! 3. resolve the target identity
//! 4. create the mark with the write-close mask
//! 5. attach the mark to the target
//! 6. release the path reference
//!
//! Releasing the path reference cannot fail, so it has no [`StartupStep`].
//!
//! Shutdown drops the registration (mark, then group) and resets the
//! dispatcher, so a later start begins with an open debounce window and an
//! empty buffer. It is idempotent and safe to call on a service that never
//! started.

use std::fmt;
use std::sync::Arc;

use crate::config::WatchConfig;
use crate::dispatcher::{Dispatcher, INTEREST_MASK};
use crate::error::WatchError;
use crate::registry::{Backend, ChangeHandler, GroupGuard, Registration};
use crate::resolver::PathResolver;
use crate::types::WatchTarget;

/// Named startup steps, used in logs and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupStep {
    ResolvePath,
    CreateGroup,
    ResolveTarget,
    CreateMark,
    AttachMark,
}

impl fmt::Display for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StartupStep::ResolvePath => "resolve path",
            StartupStep::CreateGroup => "create group",
            StartupStep::ResolveTarget => "resolve target",
            StartupStep::CreateMark => "create mark",
            StartupStep::AttachMark => "attach mark",
        };
        f.write_str(s)
    }
}

pub struct WatchService<B: Backend + ?Sized> {
    config: WatchConfig,
    backend: Arc<B>,
    resolver: PathResolver,
    dispatcher: Arc<Dispatcher>,
    registration: Option<Registration<B>>,
}

impl<B: Backend + ?Sized> WatchService<B> {
    /// Validate `config` and allocate the dispatcher and its read buffer.
    /// Nothing is registered with the backend until [`start`](Self::start).
    pub fn new(config: WatchConfig, backend: Arc<B>) -> Result<Self, WatchError> {
        config.validate()?;
        let dispatcher = Arc::new(Dispatcher::from_config(&config)?);
        Ok(Self {
            config,
            backend,
            resolver: PathResolver,
            dispatcher,
            registration: None,
        })
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn is_armed(&self) -> bool {
        self.registration.is_some()
    }

    pub fn target(&self) -> Option<&WatchTarget> {
        self.registration.as_ref().map(Registration::target)
    }

    /// Arm the watch with the dispatcher as the event handler.
    pub fn start(&mut self) -> Result<(), WatchError> {
        let handler: Arc<dyn ChangeHandler> = self.dispatcher.clone();
        self.start_with_handler(handler)
    }

    /// Arm the watch, delivering events to `handler` instead of straight to
    /// the dispatcher (e.g. a queue feeding a single worker).
    ///
    /// Calling this on an armed service is a no-op.
    pub fn start_with_handler(&mut self, handler: Arc<dyn ChangeHandler>) -> Result<(), WatchError> {
        if self.registration.is_some() {
            tracing::debug!("watch already armed");
            return Ok(());
        }

        let path = self.config.path.clone();
        tracing::info!(path = %path.display(), "arming watch");

        let registration = self.arm(handler).map_err(|(step, err)| {
            tracing::error!(
                path = %path.display(),
                step = %step,
                error = %err,
                "watch startup failed; acquired resources released",
            );
            err
        })?;

        self.registration = Some(registration);
        tracing::info!(path = %path.display(), "watch armed");
        Ok(())
    }

    fn arm(
        &self,
        handler: Arc<dyn ChangeHandler>,
    ) -> Result<Registration<B>, (StartupStep, WatchError)> {
        let path_ref = self
            .resolver
            .resolve(&self.config.path)
            .map_err(|e| (StartupStep::ResolvePath, e.into()))?;

        let group = GroupGuard::create(self.backend.clone(), handler)
            .map_err(|e| (StartupStep::CreateGroup, e))?;

        let target = path_ref
            .target()
            .map_err(|e| (StartupStep::ResolveTarget, e.into()))?;

        let mut mark = group
            .create_mark(INTEREST_MASK)
            .map_err(|e| (StartupStep::CreateMark, e))?;

        mark.attach(&target).map_err(|e| (StartupStep::AttachMark, e))?;

        path_ref.release();
        Ok(Registration::new(mark, group, target))
    }

    /// Disarm the watch. Repeated calls are no-ops.
    pub fn shutdown(&mut self) {
        match self.registration.take() {
            Some(registration) => {
                tracing::info!(path = %registration.target().path.display(), "disarming watch");
                drop(registration);
                self.dispatcher.reset();
            }
            None => tracing::debug!("watch not armed; nothing to release"),
        }
    }
}

impl<B: Backend + ?Sized> Drop for WatchService<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<B: Backend + ?Sized> fmt::Debug for WatchService<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchService")
            .field("config", &self.config)
            .field("registration", &self.registration)
            .finish()
    }
}
