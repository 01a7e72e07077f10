//! In-memory backend for lifecycle tests.
//!
//! Records every call in order, tracks live groups/marks, and can be told to
//! fail one allocation step.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use logdev_core::{
    Backend, ChangeHandler, EventMask, GroupId, MarkId, Notification, Resource, Timestamp,
    WatchError, WatchTarget,
};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    CreateGroup,
    CreateMark,
    Attach,
}

struct MarkRecord {
    group: GroupId,
    mask: EventMask,
    target: Option<PathBuf>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    groups: HashMap<GroupId, Arc<dyn ChangeHandler>>,
    marks: HashMap<MarkId, MarkRecord>,
    calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct RecordingBackend {
    state: Mutex<State>,
    fail_at: Option<FailAt>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(step: FailAt) -> Self {
        Self {
            state: Mutex::new(State::default()),
            fail_at: Some(step),
        }
    }

    pub fn live_groups(&self) -> usize {
        self.state.lock().groups.len()
    }

    pub fn live_marks(&self) -> usize {
        self.state.lock().marks.len()
    }

    pub fn attached_marks(&self) -> usize {
        self.state
            .lock()
            .marks
            .values()
            .filter(|m| m.target.is_some())
            .count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Deliver an event to every attached mark whose mask intersects `mask`.
    /// Returns how many handlers were invoked.
    pub fn fire(&self, mask: EventMask, at: Timestamp) -> usize {
        let deliveries: Vec<(Arc<dyn ChangeHandler>, Notification)> = {
            let state = self.state.lock();
            state
                .marks
                .values()
                .filter(|m| m.mask.intersects(mask))
                .filter_map(|m| {
                    let target = m.target.clone()?;
                    let handler = state.groups.get(&m.group)?.clone();
                    Some((handler, Notification::new(mask & m.mask, target, at)))
                })
                .collect()
        };
        let count = deliveries.len();
        for (handler, notification) in deliveries {
            handler.on_change(notification);
        }
        count
    }

    fn next_id(state: &mut State) -> u64 {
        state.next_id += 1;
        state.next_id
    }
}

impl Backend for RecordingBackend {
    fn create_group(&self, handler: Arc<dyn ChangeHandler>) -> Result<GroupId, WatchError> {
        let mut state = self.state.lock();
        state.calls.push("create_group");
        if self.fail_at == Some(FailAt::CreateGroup) {
            return Err(WatchError::allocation(Resource::Group, "injected failure"));
        }
        let id = GroupId(Self::next_id(&mut state));
        state.groups.insert(id, handler);
        Ok(id)
    }

    fn create_mark(&self, group: GroupId, mask: EventMask) -> Result<MarkId, WatchError> {
        let mut state = self.state.lock();
        state.calls.push("create_mark");
        if self.fail_at == Some(FailAt::CreateMark) {
            return Err(WatchError::allocation(Resource::Mark, "injected failure"));
        }
        let id = MarkId(Self::next_id(&mut state));
        state.marks.insert(
            id,
            MarkRecord {
                group,
                mask,
                target: None,
            },
        );
        Ok(id)
    }

    fn attach(&self, mark: MarkId, target: &WatchTarget) -> Result<(), WatchError> {
        let mut state = self.state.lock();
        state.calls.push("attach");
        if self.fail_at == Some(FailAt::Attach) {
            return Err(WatchError::attach(&target.path, "injected failure"));
        }
        match state.marks.get_mut(&mark) {
            Some(record) => {
                record.target = Some(target.canonical.clone());
                Ok(())
            }
            None => Err(WatchError::attach(&target.path, "unknown mark")),
        }
    }

    fn detach(&self, mark: MarkId) {
        let mut state = self.state.lock();
        state.calls.push("detach");
        state.marks.remove(&mark);
    }

    fn destroy_group(&self, group: GroupId) {
        let mut state = self.state.lock();
        state.calls.push("destroy_group");
        state.groups.remove(&group);
        state.marks.retain(|_, m| m.group != group);
    }
}
