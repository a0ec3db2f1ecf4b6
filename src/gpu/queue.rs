//! Command queues and fence bookkeeping.
//!
//! A [`CommandQueue`] owns one hardware queue's fence counter and the command
//! lists it has submitted. A list is only handed out again once the fence value
//! it was submitted with has been reached, so nothing the GPU may still read is
//! overwritten.

use std::{collections::VecDeque, rc::Rc};

use crate::{
    error::RenderError,
    gpu::{Backend, QueueKind, command::CommandList},
};

pub struct CommandQueue {
    backend: Rc<dyn Backend>,
    kind: QueueKind,
    fence_value: u64,
    in_flight: VecDeque<(u64, CommandList)>,
}

impl CommandQueue {
    pub fn new(backend: Rc<dyn Backend>, kind: QueueKind) -> Self {
        Self {
            backend,
            kind,
            fence_value: 0,
            in_flight: VecDeque::new(),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Returns an empty list, reusing the oldest submitted one if the GPU is
    /// done with it.
    pub fn get_command_list(&mut self) -> CommandList {
        let reusable = self
            .in_flight
            .front()
            .is_some_and(|(value, _)| self.is_fence_complete(*value));
        if reusable {
            if let Some((_, mut list)) = self.in_flight.pop_front() {
                list.reset();
                return list;
            }
        }
        CommandList::new(self.kind)
    }

    /// Submits `list` and returns the fence value that marks its completion.
    pub fn execute(&mut self, list: CommandList) -> anyhow::Result<u64> {
        if list.queue() != self.kind {
            return Err(RenderError::InvalidCommand(format!(
                "a {:?} command list was submitted to the {:?} queue",
                list.queue(),
                self.kind
            ))
            .into());
        }
        let value = self.fence_value + 1;
        self.backend.execute(self.kind, &list, value)?;
        self.fence_value = value;
        self.in_flight.push_back((value, list));
        Ok(value)
    }

    pub fn is_fence_complete(&self, value: u64) -> bool {
        self.backend.completed_value(self.kind) >= value
    }

    /// Blocks until the GPU reaches `value`. Returns at once if it already has.
    pub fn wait_for_fence_value(&self, value: u64) -> anyhow::Result<()> {
        if self.is_fence_complete(value) {
            return Ok(());
        }
        self.backend
            .wait_for_value(self.kind, value)
            .map_err(|e| RenderError::FenceWait {
                queue: self.kind,
                value,
                reason: format!("{e:#}"),
            })?;
        Ok(())
    }

    /// Waits for everything submitted so far.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.wait_for_fence_value(self.fence_value)
    }

    /// Drops every submitted list the GPU is done with, payload included.
    /// Returns how many were dropped.
    pub fn release_completed(&mut self) -> usize {
        let completed = self.backend.completed_value(self.kind);
        let before = self.in_flight.len();
        self.in_flight.retain(|(value, _)| *value > completed);
        before - self.in_flight.len()
    }

    pub fn last_fence_value(&self) -> u64 {
        self.fence_value
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
