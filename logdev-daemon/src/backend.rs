//! `notify`-backed implementation of the watch registry.
//!
//! One group is one `RecommendedWatcher`; its callback runs on notify's own
//! thread and forwards matching events to the group's handler. Marks are
//! bookkeeping on top: a mark's attach is a non-recursive watch of the
//! target's canonical path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use logdev_core::{
    Backend, ChangeHandler, EventMask, GroupId, MarkId, Notification, Resource, Timestamp,
    WatchError, WatchTarget,
};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

/// Translate a notify event kind into mask bits.
pub fn mask_for_kind(kind: &EventKind) -> EventMask {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => EventMask::CLOSE_WRITE,
        EventKind::Access(AccessKind::Close(_)) => EventMask::CLOSE_NOWRITE,
        EventKind::Access(AccessKind::Open(_)) => EventMask::OPEN,
        EventKind::Access(_) => EventMask::ACCESS,
        // FSEvents and friends never report closes; a data write is the
        // closest equivalent there.
        #[cfg(not(target_os = "linux"))]
        EventKind::Modify(notify::event::ModifyKind::Data(_) | notify::event::ModifyKind::Any) => {
            EventMask::MODIFY | EventMask::CLOSE_WRITE
        }
        EventKind::Modify(_) => EventMask::MODIFY,
        _ => EventMask::empty(),
    }
}

#[derive(Debug, Clone)]
struct MarkEntry {
    mask: EventMask,
    target: Option<PathBuf>,
}

type MarkTable = Arc<Mutex<HashMap<MarkId, MarkEntry>>>;

struct GroupEntry {
    watcher: RecommendedWatcher,
    marks: MarkTable,
}

#[derive(Default)]
struct Inner {
    groups: HashMap<GroupId, GroupEntry>,
    mark_owner: HashMap<MarkId, GroupId>,
}

#[derive(Default)]
pub struct NotifyBackend {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl NotifyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Backend for NotifyBackend {
    fn create_group(&self, handler: Arc<dyn ChangeHandler>) -> Result<GroupId, WatchError> {
        let marks: MarkTable = Arc::new(Mutex::new(HashMap::new()));
        let callback_marks = marks.clone();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => deliver(&event, &callback_marks, handler.as_ref()),
                Err(err) => tracing::warn!(error = %err, "watcher event error"),
            }
        })
        .map_err(|err| WatchError::allocation(Resource::Group, err.to_string()))?;

        let id = GroupId(self.next_id());
        self.inner
            .lock()
            .groups
            .insert(id, GroupEntry { watcher, marks });
        Ok(id)
    }

    fn create_mark(&self, group: GroupId, mask: EventMask) -> Result<MarkId, WatchError> {
        if mask.is_empty() {
            return Err(WatchError::allocation(Resource::Mark, "empty interest mask"));
        }
        let mut inner = self.inner.lock();
        let Some(entry) = inner.groups.get(&group) else {
            return Err(WatchError::allocation(
                Resource::Mark,
                format!("{group} does not exist"),
            ));
        };
        let id = MarkId(self.next_id());
        entry
            .marks
            .lock()
            .insert(id, MarkEntry { mask, target: None });
        inner.mark_owner.insert(id, group);
        Ok(id)
    }

    fn attach(&self, mark: MarkId, target: &WatchTarget) -> Result<(), WatchError> {
        let mut inner = self.inner.lock();
        let Some(group) = inner.mark_owner.get(&mark).copied() else {
            return Err(WatchError::attach(&target.path, format!("{mark} does not exist")));
        };

        let canonical = target.canonical.clone();
        let mask = {
            let Some(entry) = inner.groups.get(&group) else {
                return Err(WatchError::attach(&target.path, format!("{group} does not exist")));
            };
            let marks = entry.marks.lock();
            match marks.get(&mark) {
                Some(MarkEntry {
                    target: Some(existing),
                    ..
                }) => {
                    return Err(WatchError::attach(
                        &target.path,
                        format!("{mark} already attached to {}", existing.display()),
                    ))
                }
                Some(entry) => entry.mask,
                None => {
                    return Err(WatchError::attach(&target.path, format!("{mark} does not exist")))
                }
            }
        };

        if let Some(conflict) = conflicting_mark(&inner, &canonical, mask) {
            return Err(WatchError::attach(
                &target.path,
                format!("target already carries {conflict} with a different mask"),
            ));
        }

        let Some(entry) = inner.groups.get_mut(&group) else {
            return Err(WatchError::attach(&target.path, format!("{group} does not exist")));
        };
        entry
            .watcher
            .watch(&canonical, RecursiveMode::NonRecursive)
            .map_err(|err| WatchError::attach(&target.path, err.to_string()))?;
        if let Some(record) = entry.marks.lock().get_mut(&mark) {
            record.target = Some(canonical);
        }
        Ok(())
    }

    fn detach(&self, mark: MarkId) {
        let mut inner = self.inner.lock();
        let Some(group) = inner.mark_owner.remove(&mark) else {
            return;
        };
        let Some(entry) = inner.groups.get_mut(&group) else {
            return;
        };
        let (removed, still_watched) = {
            let mut marks = entry.marks.lock();
            let removed = marks.remove(&mark);
            let still_watched = |path: &Path| {
                marks
                    .values()
                    .any(|m| m.target.as_deref() == Some(path))
            };
            match removed.and_then(|m| m.target) {
                Some(path) => {
                    let watched = still_watched(&path);
                    (Some(path), watched)
                }
                None => (None, false),
            }
        };
        if let Some(path) = removed {
            if !still_watched {
                if let Err(err) = entry.watcher.unwatch(&path) {
                    tracing::debug!(path = %path.display(), error = %err, "unwatch failed");
                }
            }
        }
    }

    fn destroy_group(&self, group: GroupId) {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.groups.remove(&group);
            inner.mark_owner.retain(|_, owner| *owner != group);
            removed
        };
        // Dropping the watcher outside the lock stops its event thread.
        drop(removed);
    }
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("NotifyBackend")
            .field("groups", &inner.groups.len())
            .field("marks", &inner.mark_owner.len())
            .finish()
    }
}

fn conflicting_mark(inner: &Inner, canonical: &Path, mask: EventMask) -> Option<MarkId> {
    inner.groups.values().find_map(|entry| {
        entry.marks.lock().iter().find_map(|(id, m)| {
            (m.target.as_deref() == Some(canonical) && m.mask != mask).then_some(*id)
        })
    })
}

/// Fan one notify event out to the attached marks it concerns.
fn deliver(event: &Event, marks: &MarkTable, handler: &dyn ChangeHandler) {
    let mask = mask_for_kind(&event.kind);
    if mask.is_empty() {
        return;
    }
    let at = Timestamp::now();

    let notifications: Vec<Notification> = {
        let marks = marks.lock();
        marks
            .values()
            .filter(|m| m.mask.intersects(mask))
            .filter_map(|m| {
                let target = m.target.as_ref()?;
                let concerns_target =
                    event.paths.is_empty() || event.paths.iter().any(|p| p == target);
                concerns_target.then(|| Notification::new(mask & m.mask, target.clone(), at))
            })
            .collect()
    };

    for notification in notifications {
        handler.on_change(notification);
    }
}
