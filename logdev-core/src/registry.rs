//! Watch registry: the notification backend capability and the scoped
//! handles that own its resources.
//!
//! # Ownership
//!
//! ```text
//! Registration
//!   mark:  MarkGuard   (dropped first: detach + free)
//!   group: GroupGuard  (dropped second: release group)
//! ```
//!
//! Each guard releases exactly the resource it acquired, so any prefix of a
//! setup sequence unwinds itself in reverse order when an error is returned.

use std::sync::Arc;

use crate::error::WatchError;
use crate::types::{EventMask, GroupId, MarkId, Notification, WatchTarget};

/// Receiver of change notifications for a watch group.
///
/// Backends call this from whatever thread they deliver events on.
pub trait ChangeHandler: Send + Sync {
    fn on_change(&self, notification: Notification);
}

/// A filesystem notification backend.
pub trait Backend: Send + Sync {
    /// Create a group whose marks deliver into `handler`.
    fn create_group(&self, handler: Arc<dyn ChangeHandler>) -> Result<GroupId, WatchError>;

    /// Allocate a mark owned by `group` with the given interest mask.
    fn create_mark(&self, group: GroupId, mask: EventMask) -> Result<MarkId, WatchError>;

    /// Bind `mark` to `target`. Fails if the target already carries an
    /// incompatible mark or the mask is rejected.
    fn attach(&self, mark: MarkId, target: &WatchTarget) -> Result<(), WatchError>;

    /// Detach and free `mark`. Unknown or already-detached marks are a no-op.
    fn detach(&self, mark: MarkId);

    /// Release `group` and any marks it still owns.
    fn destroy_group(&self, group: GroupId);
}

/// Scoped ownership of a watch group.
pub struct GroupGuard<B: Backend + ?Sized> {
    backend: Arc<B>,
    id: GroupId,
}

impl<B: Backend + ?Sized> GroupGuard<B> {
    pub fn create(backend: Arc<B>, handler: Arc<dyn ChangeHandler>) -> Result<Self, WatchError> {
        let id = backend.create_group(handler)?;
        tracing::info!(group = %id, "watch group created");
        Ok(Self { backend, id })
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Allocate a mark in this group.
    pub fn create_mark(&self, mask: EventMask) -> Result<MarkGuard<B>, WatchError> {
        let id = self.backend.create_mark(self.id, mask)?;
        tracing::info!(group = %self.id, mark = %id, mask = %mask, "mark created");
        Ok(MarkGuard {
            backend: self.backend.clone(),
            id,
            mask,
            live: true,
            attached: false,
        })
    }
}

impl<B: Backend + ?Sized> Drop for GroupGuard<B> {
    fn drop(&mut self) {
        self.backend.destroy_group(self.id);
        tracing::info!(group = %self.id, "watch group released");
    }
}

/// Scoped ownership of a mark.
pub struct MarkGuard<B: Backend + ?Sized> {
    backend: Arc<B>,
    id: MarkId,
    mask: EventMask,
    live: bool,
    attached: bool,
}

impl<B: Backend + ?Sized> MarkGuard<B> {
    pub fn id(&self) -> MarkId {
        self.id
    }

    pub fn mask(&self) -> EventMask {
        self.mask
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn attach(&mut self, target: &WatchTarget) -> Result<(), WatchError> {
        self.backend.attach(self.id, target)?;
        self.attached = true;
        tracing::info!(mark = %self.id, path = %target.path.display(), "inode mark added");
        Ok(())
    }

    /// Detach and free the mark. Calling this more than once is a no-op.
    pub fn detach(&mut self) {
        if !self.live {
            return;
        }
        self.backend.detach(self.id);
        self.live = false;
        self.attached = false;
        tracing::info!(mark = %self.id, "mark deleted");
    }
}

impl<B: Backend + ?Sized> Drop for MarkGuard<B> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// A fully armed watch: one mark attached to one target inside one group.
pub struct Registration<B: Backend + ?Sized> {
    // Field order is drop order: the mark goes before its group.
    mark: MarkGuard<B>,
    group: GroupGuard<B>,
    target: WatchTarget,
}

impl<B: Backend + ?Sized> Registration<B> {
    pub fn new(mark: MarkGuard<B>, group: GroupGuard<B>, target: WatchTarget) -> Self {
        Self {
            mark,
            group,
            target,
        }
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn group_id(&self) -> GroupId {
        self.group.id()
    }

    pub fn mark_id(&self) -> MarkId {
        self.mark.id()
    }
}

impl<B: Backend + ?Sized> std::fmt::Debug for Registration<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("group", &self.group.id())
            .field("mark", &self.mark.id())
            .field("target", &self.target.path)
            .finish()
    }
}
