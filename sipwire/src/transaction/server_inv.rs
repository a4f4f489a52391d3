//! Server (UAS) transaction for INVITE.

use std::cmp;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use tokio::pin;
use tokio::sync::oneshot;
use tokio::time::{self, Instant};

use crate::error::Result;
use crate::network::{IncomingRequest, NetworkLayer, OutgoingResponse};

use super::{Role, State, Transaction, TransactionBuilder, TransactionKey, T1, T2, T4};

type TxConfirmed = Arc<Mutex<Option<oneshot::Sender<()>>>>;

/// An INVITE UAS transaction (RFC 3261 17.2.1).
///
/// Starts in `Proceeding`; what to answer is the TU's call. A 2xx ends
/// the transaction at once, since 2xx retransmission and its ACK are
/// owned end to end by the TU. Any other final is retransmitted on
/// timer G until the ACK confirms it or timer H gives up waiting.
#[derive(Clone)]
pub struct ServerInvTransaction {
    transaction: Transaction,
    tx_confirmed: TxConfirmed,
}

impl ServerInvTransaction {
    pub(crate) fn create(network: &NetworkLayer, request: &IncomingRequest) -> Self {
        assert!(
            request.msg.method().is_invite(),
            "Request method must be Invite"
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
            .set_state(State::Proceeding);

        Self {
            transaction: builder.build(),
            tx_confirmed: Arc::default(),
        }
    }

    /// Sends a response from the TU through the transaction.
    pub async fn respond(&self, response: &mut OutgoingResponse) -> Result<()> {
        let code = response.code();

        if code.is_provisional() {
            self.transaction.send_response(response).await?;
            self.set_state(State::Proceeding);
            return Ok(());
        }

        let state = self.state();
        self.transaction.send_response(response).await?;

        if matches!(state, State::Completed | State::Confirmed | State::Terminated) {
            return Ok(());
        }

        if matches!(code.as_u16(), 200..=299) {
            self.on_terminated();
            return Ok(());
        }

        self.set_state(State::Completed);

        let (tx, rx) = oneshot::channel();
        self.tx_confirmed.lock().expect("Lock failed").replace(tx);

        let uas = self.clone();
        tokio::spawn(async move {
            uas.retrans_loop(rx).await;
        });

        Ok(())
    }

    /// Feeds the original INVITE coming again, or its ACK, into the
    /// state machine.
    pub(crate) async fn receive_request(&self, request: &IncomingRequest) -> Result<()> {
        if request.msg.method().is_ack() {
            if self.state() == State::Completed {
                self.set_state(State::Confirmed);
                self.signal_confirmed();
                self.terminate();
            }
            return Ok(());
        }

        // A retransmitted INVITE replays the last response.
        if matches!(self.state(), State::Proceeding | State::Completed)
            && self.last_status_code().is_some()
        {
            self.retransmit().await?;
        }

        Ok(())
    }

    /// Retransmits the non-2xx final on timer G until the ACK lands or
    /// timer H runs out.
    async fn retrans_loop(&self, mut rx_confirmed: oneshot::Receiver<()>) {
        pin! {
            let timer_h = time::sleep(64 * T1);
        }

        if self.is_reliable() {
            tokio::select! {
                _ = &mut timer_h => {
                    self.network().notify_timeout(self.key()).await;
                    self.on_terminated();
                }
                _ = &mut rx_confirmed => {}
            }
            return;
        }

        pin! {
            let timer_g = time::sleep(T1);
        }

        'retrans: loop {
            tokio::select! {
                _ = &mut timer_g => {
                    match self.retransmit().await {
                        Ok(retrans) => {
                            let next_interval = cmp::min(T1 * 2u32.pow(retrans), T2);
                            timer_g.as_mut().reset(Instant::now() + next_interval);
                        }
                        Err(err) => {
                            log::info!("Failed to retransmit: {}", err);
                            break 'retrans;
                        }
                    }
                }
                _ = &mut timer_h => {
                    self.network().notify_timeout(self.key()).await;
                    self.on_terminated();
                    break 'retrans;
                }
                _ = &mut rx_confirmed => break 'retrans,
            }
        }
    }

    /// Timer I soaks up ACK retransmissions on unreliable channels.
    fn terminate(&self) {
        if self.is_reliable() {
            self.on_terminated();
        } else {
            self.schedule_termination(T4);
        }
    }

    fn signal_confirmed(&self) {
        let sender = self.tx_confirmed.lock().expect("Lock failed").take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    pub(crate) fn shutdown(&self) {
        self.set_state(State::Terminated);
        self.signal_confirmed();
    }
}

impl Deref for ServerInvTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}
