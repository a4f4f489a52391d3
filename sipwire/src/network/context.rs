use std::collections::HashSet;
use std::mem;

use tokio::sync::oneshot;

use crate::cert::CertErrorInfo;
use crate::channel::Channel;
use crate::error::Result;
use crate::message::SipMsg;
use crate::transaction::TransactionKey;

/// A message parked while its destination connects.
///
/// The message stays unencoded, Via and Contact are only stamped at
/// flush time when the channel that will carry it is known.
#[derive(Debug)]
pub(crate) struct QueuedSend {
    pub(crate) msg: SipMsg,
    /// Resolves the caller's send once the flush is done.
    pub(crate) notify: oneshot::Sender<Result<()>>,
}

/// Lifecycle state of a pooled destination.
#[derive(Debug)]
pub(crate) enum ContextState {
    /// A factory connect is in flight.
    Connecting { queued: Vec<QueuedSend> },

    /// A certificate verdict is pending.
    CertPending {
        queued: Vec<QueuedSend>,
        info: CertErrorInfo,
    },

    /// The channel is up.
    Connected { channel: Channel },
}

/// One pooled destination.
pub(crate) struct ChannelContext {
    pub(crate) state: ContextState,
    /// Users currently holding the channel through `request_channel`.
    pub(crate) refs: usize,
    /// Bumped on every touch so a stale idle timer cannot close a
    /// channel that got used again.
    pub(crate) generation: u64,
    /// Transactions bound to this destination.
    pub(crate) transactions: HashSet<TransactionKey>,
}

impl ChannelContext {
    pub(crate) fn connecting(first: QueuedSend) -> Self {
        Self {
            state: ContextState::Connecting {
                queued: vec![first],
            },
            refs: 0,
            generation: 0,
            transactions: HashSet::new(),
        }
    }

    pub(crate) fn connected(channel: Channel) -> Self {
        Self {
            state: ContextState::Connected { channel },
            refs: 0,
            generation: 0,
            transactions: HashSet::new(),
        }
    }

    pub(crate) fn channel(&self) -> Option<&Channel> {
        match &self.state {
            ContextState::Connected { channel } => Some(channel),
            _ => None,
        }
    }

    /// Drains everything parked on this context.
    pub(crate) fn take_queued(&mut self) -> Vec<QueuedSend> {
        match &mut self.state {
            ContextState::Connecting { queued } | ContextState::CertPending { queued, .. } => {
                mem::take(queued)
            }
            ContextState::Connected { .. } => Vec::new(),
        }
    }

    /// Queues `send` if the context is still waiting for its channel.
    pub(crate) fn queue(&mut self, send: QueuedSend) -> std::result::Result<(), QueuedSend> {
        match &mut self.state {
            ContextState::Connecting { queued } | ContextState::CertPending { queued, .. } => {
                queued.push(send);
                Ok(())
            }
            ContextState::Connected { .. } => Err(send),
        }
    }
}
