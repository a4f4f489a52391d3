//! Server (UAS) transaction for everything but INVITE.

use std::ops::Deref;

use crate::error::Result;
use crate::message::Method;
use crate::network::{IncomingRequest, NetworkLayer, OutgoingResponse};

use super::{Role, State, Transaction, TransactionBuilder, TransactionKey, T1};

/// A non-INVITE UAS transaction (RFC 3261 17.2.2).
///
/// A provisional from the TU moves it to `Proceeding`, a final
/// completes it, and retransmitted requests replay whatever went out
/// last. On unreliable channels the final answer stays around for
/// timer J before the key is released.
#[derive(Clone)]
pub struct ServerTransaction {
    transaction: Transaction,
}

impl ServerTransaction {
    pub(crate) fn create(network: &NetworkLayer, request: &IncomingRequest) -> Self {
        let method = request.msg.method();
        assert!(
            !matches!(method, Method::Ack | Method::Invite),
            "Invalid request method: {}. ACK and INVITE are not allowed here.",
            method
        );

        let headers = &request.request_headers;
        let key = TransactionKey::server(&headers.call_id, &headers.cseq, &headers.to);

        let mut builder = TransactionBuilder::new();
        builder
            .set_role(Role::UAS)
            .set_key(key)
            .set_channel(request.channel.clone())
            .set_addr(request.outbound_addr())
            .set_endpoint(request.endpoint.clone())
            .set_network(network.clone())
            .set_state(State::Trying);

        Self {
            transaction: builder.build(),
        }
    }

    /// Sends a response from the TU through the transaction.
    pub async fn respond(&self, response: &mut OutgoingResponse) -> Result<()> {
        self.transaction.send_response(response).await?;

        match self.state() {
            State::Trying if response.code().is_provisional() => {
                self.set_state(State::Proceeding);
            }
            State::Trying | State::Proceeding if response.code().is_final() => {
                self.set_state(State::Completed);
                self.terminate();
            }
            _ => {}
        }

        Ok(())
    }

    /// A retransmitted request replays the last response, if any went
    /// out already.
    pub(crate) async fn receive_request(&self, _request: &IncomingRequest) -> Result<()> {
        if matches!(self.state(), State::Proceeding | State::Completed)
            && self.last_status_code().is_some()
        {
            self.retransmit().await?;
        }

        Ok(())
    }

    /// Timer J covers late request retransmissions on unreliable
    /// channels.
    fn terminate(&self) {
        if self.is_reliable() {
            self.on_terminated();
        } else {
            self.schedule_termination(T1 * 64);
        }
    }

    pub(crate) fn shutdown(&self) {
        self.set_state(State::Terminated);
    }
}

impl Deref for ServerTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}
