// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Per-role mailboxes. Messages are keyed by their destination [RoleId], so a
//! role only ever scans the messages addressed to it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::concurrency::{timeout_at, Duration, Instant, Notify};
use crate::errors::RoleErr;
use crate::protocol::RoleMessage;
use crate::RoleId;

struct Mailbox {
    queue: Mutex<VecDeque<RoleMessage>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn take<P>(&self, predicate: &P) -> Option<RoleMessage>
    where
        P: Fn(&RoleMessage) -> bool,
    {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = queue.iter().position(predicate)?;
        queue.remove(pos)
    }
}

/// The mailboxes of every role running on a node
#[derive(Default)]
pub struct Inbox {
    boxes: DashMap<RoleId, Arc<Mailbox>>,
}

impl Inbox {
    /// Open the mailbox of a new role
    pub(crate) fn open(&self, role: RoleId) {
        self.boxes.insert(role, Arc::new(Mailbox::new()));
    }

    /// Close a mailbox: nothing more is accepted and waiters which run out of
    /// matching messages return [RoleErr::Stopped]
    pub(crate) fn close(&self, role: &RoleId) {
        if let Some(mailbox) = self.boxes.get(role) {
            mailbox.closed.store(true, Ordering::Release);
            mailbox.notify.notify_waiters();
        }
    }

    /// Drop a mailbox and everything left in it
    pub(crate) fn remove(&self, role: &RoleId) {
        if let Some((_, mailbox)) = self.boxes.remove(role) {
            mailbox.closed.store(true, Ordering::Release);
            mailbox.notify.notify_waiters();
        }
    }

    /// Queue a message for its destination role. Hands the message back if the
    /// role has no open mailbox.
    pub(crate) fn deliver(&self, msg: RoleMessage) -> Result<(), RoleMessage> {
        let mailbox = match self.boxes.get(&msg.to) {
            Some(mailbox) if !mailbox.closed.load(Ordering::Acquire) => mailbox.value().clone(),
            _ => return Err(msg),
        };
        mailbox
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(msg);
        mailbox.notify.notify_waiters();
        Ok(())
    }

    /// Number of messages waiting for `role`
    pub fn pending(&self, role: &RoleId) -> usize {
        self.boxes.get(role).map_or(0, |mailbox| {
            mailbox
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        })
    }

    /// Remove and return every queued message for `role` matching `predicate`
    pub(crate) fn drain<P>(&self, role: &RoleId, predicate: P) -> Vec<RoleMessage>
    where
        P: Fn(&RoleMessage) -> bool,
    {
        let mailbox = match self.boxes.get(role) {
            Some(mailbox) => mailbox.value().clone(),
            None => return Vec::new(),
        };
        let mut queue = mailbox.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let (drained, kept): (VecDeque<_>, VecDeque<_>) =
            queue.drain(..).partition(|msg| predicate(msg));
        *queue = kept;
        drained.into_iter().collect()
    }

    /// Remove and return the first message for `role` matching `predicate`,
    /// waiting up to `timeout` for one to arrive ([None] waits until stopped)
    pub(crate) async fn wait_for<P>(
        &self,
        role: &RoleId,
        timeout: Option<Duration>,
        predicate: P,
    ) -> Result<RoleMessage, RoleErr>
    where
        P: Fn(&RoleMessage) -> bool,
    {
        let mailbox = self
            .boxes
            .get(role)
            .map(|mailbox| mailbox.value().clone())
            .ok_or(RoleErr::Stopped)?;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let notified = mailbox.notify.notified();
            futures::pin_mut!(notified);
            // register before scanning so a delivery in between is not missed
            notified.as_mut().enable();

            if let Some(msg) = mailbox.take(&predicate) {
                return Ok(msg);
            }
            if mailbox.closed.load(Ordering::Acquire) {
                return Err(RoleErr::Stopped);
            }
            match deadline {
                Some(deadline) => timeout_at(deadline, notified).await?,
                None => notified.await,
            }
        }
    }
}
