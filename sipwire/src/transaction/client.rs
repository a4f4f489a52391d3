//! Client (UAC) transaction.

use std::cmp;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{self, Either};
use tokio::pin;
use tokio::sync::oneshot;
use tokio::time;

use crate::error::{Error, Result};
use crate::headers::{CSeq, CallId, From as FromHdr, Header, HeaderParse, Headers, To, Via};
use crate::message::{Method, Request, Response, SipMsg, ToBytes, Uri};
use crate::network::{IncomingResponse, NetworkLayer, OutgoingRequest};

use super::{Role, State, Transaction, TransactionBuilder, TransactionKey, T1, T2, T4};

/// How long a completed INVITE client lingers to absorb late finals
/// before it lets go (timer D, RFC 3261 17.1.1.2).
const TIMER_D: Duration = Duration::from_secs(32);

/// What the ACK for a non-2xx final is built from.
struct OriginalRequest {
    uri: Uri,
    via: Via,
    from: FromHdr,
    call_id: CallId,
    cseq: CSeq,
}

/// A UAC transaction for one request, INVITE or not.
///
/// INVITE differs in three ways: it starts in `Calling`, request
/// retransmission stops at the first provisional, and a non-2xx final
/// is answered with an ACK generated here rather than by the TU.
#[derive(Clone)]
pub struct ClientTransaction {
    transaction: Transaction,
    tx_completed: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    invite: Option<Arc<OriginalRequest>>,
}

impl ClientTransaction {
    pub(crate) fn create(network: &NetworkLayer, request: &OutgoingRequest) -> Result<Self> {
        let method = request.msg.method();
        assert!(!method.is_ack(), "ACK does not get a client transaction");

        let headers = &request.msg.headers;
        let via = headers
            .topmost_via()
            .ok_or(Error::MissingRequiredHeader(Via::NAME))?;
        let branch = via
            .branch()
            .ok_or(Error::MissingRequiredHeader(Via::NAME))?;
        let key = TransactionKey::client(method.clone(), branch);

        let invite = if method.is_invite() {
            let from = headers
                .from_hdr()
                .ok_or(Error::MissingRequiredHeader(FromHdr::NAME))?;
            let call_id = headers
                .call_id()
                .ok_or(Error::MissingRequiredHeader(CallId::NAME))?;
            let cseq = headers
                .cseq()
                .ok_or(Error::MissingRequiredHeader(CSeq::NAME))?;

            Some(Arc::new(OriginalRequest {
                uri: request.msg.req_line.uri.clone(),
                via: via.clone(),
                from: from.clone(),
                call_id: call_id.clone(),
                cseq: cseq.clone(),
            }))
        } else {
            None
        };

        let mut builder = TransactionBuilder::new();
        builder
            .set_role(Role::UAC)
            .set_key(key)
            .set_channel(request.channel.clone())
            .set_addr(request.addr)
            .set_endpoint(request.endpoint.clone())
            .set_network(network.clone())
            .set_state(if method.is_invite() {
                State::Calling
            } else {
                State::Trying
            });
        if let Some(buf) = &request.buf {
            builder.set_last_msg(buf.clone());
        }

        let (tx, rx) = oneshot::channel();
        let tsx = Self {
            transaction: builder.build(),
            tx_completed: Arc::new(Mutex::new(Some(tx))),
            invite,
        };

        let uac = tsx.clone();
        tokio::spawn(async move {
            uac.retrans_loop(rx).await;
        });

        Ok(tsx)
    }

    /// Feeds a response from the wire into the state machine.
    ///
    /// `Ok(true)` means a retransmission was absorbed and the delegate
    /// must not see the response.
    pub(crate) async fn receive(&self, response: &IncomingResponse) -> Result<bool> {
        let code = response.msg.code();
        self.transaction.set_last_status_code(code);

        match self.state() {
            State::Calling | State::Trying if code.is_provisional() => {
                self.set_state(State::Proceeding);
                Ok(false)
            }
            State::Proceeding if code.is_provisional() => Ok(false),
            State::Calling | State::Proceeding if self.is_invite() => {
                // A 2xx ends the transaction at once; its ACK is a new
                // exchange owned by the TU (RFC 3261 17.1.1.2). Any
                // other final is acked here and lingers for timer D.
                if matches!(code.as_u16(), 200..=299) {
                    self.signal_completed();
                    self.on_terminated();
                } else {
                    self.set_state(State::Completed);
                    self.signal_completed();
                    self.send_ack(&response.msg).await?;
                    self.terminate();
                }
                Ok(false)
            }
            State::Trying | State::Proceeding => {
                self.set_state(State::Completed);
                self.signal_completed();
                self.terminate();
                Ok(false)
            }
            State::Completed => {
                if self.is_invite() {
                    // The final came again, so the ACK was lost.
                    self.retransmit().await?;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Builds and sends the ACK for a non-2xx final, per RFC 3261
    /// 17.1.1.3: Via and CSeq number of the INVITE, To of the answer
    /// with its tag, same channel.
    async fn send_ack(&self, response: &Response) -> Result<()> {
        let Some(original) = &self.invite else {
            return Ok(());
        };
        let to = response
            .headers
            .to_hdr()
            .ok_or(Error::MissingRequiredHeader(To::NAME))?;

        let mut headers = Headers::with_capacity(5);
        headers.push(Header::Via(original.via.clone()));
        headers.push(Header::From(original.from.clone()));
        headers.push(Header::To(to.clone()));
        headers.push(Header::CallId(original.call_id.clone()));
        headers.push(Header::CSeq(CSeq::new(original.cseq.cseq(), Method::Ack)));

        let mut ack = Request::new(Method::Ack, original.uri.clone());
        ack.headers = headers;

        let mut msg = SipMsg::Request(ack);
        msg.ensure_content_length();
        let buf = msg.to_bytes()?;

        log::debug!("=> Request {} to /{}", Method::Ack, self.addr());

        self.send_buf(buf).await
    }

    async fn retrans_loop(&self, mut rx_completed: oneshot::Receiver<()>) {
        let unreliable = !self.is_reliable();

        // Timers B (INVITE) and F both give up after 64*T1.
        pin! {
            let timer_f = time::sleep(64 * T1);
            let timer_e = if unreliable {
                Either::Left(time::sleep(T1))
            } else {
                Either::Right(future::pending::<()>())
            };
        }

        'retrans: loop {
            tokio::select! {
                _ = &mut timer_e => {
                    let state = self.state();
                    if self.is_invite() && state != State::Calling {
                        // Timer A stops at the first provisional.
                        timer_e.set(Either::Right(future::pending()));
                        continue;
                    }

                    match self.retransmit().await {
                        Ok(retrans) => {
                            // For the default values of T1 and T2, this results in
                            // intervals of 500 ms, 1 s, 2 s, 4 s, 4 s, 4 s, etc.
                            let interval = if state == State::Proceeding {
                                T2
                            } else {
                                cmp::min(T1 * (1 << retrans), T2)
                            };
                            timer_e.set(Either::Left(time::sleep(interval)));
                        }
                        Err(err) => {
                            log::info!("Failed to retransmit: {}", err);
                            timer_e.set(Either::Right(future::pending()));
                        }
                    }
                }
                _ = &mut timer_f => {
                    let state = self.state();
                    if matches!(state, State::Calling | State::Trying | State::Proceeding) {
                        self.network().notify_timeout(self.key()).await;
                        self.on_terminated();
                    }
                    break 'retrans;
                }
                _ = &mut rx_completed => break 'retrans,
            }
        }
    }

    /// Starts the terminal linger: timer D after an acked INVITE
    /// final, timer K after a non-INVITE final. Reliable channels skip
    /// the wait.
    fn terminate(&self) {
        if self.is_reliable() {
            self.on_terminated();
        } else {
            let linger = if self.is_invite() { TIMER_D } else { T4 };
            self.schedule_termination(linger);
        }
    }

    fn signal_completed(&self) {
        let sender = self.tx_completed.lock().expect("Lock failed").take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    pub(crate) fn shutdown(&self) {
        self.set_state(State::Terminated);
        self.signal_completed();
    }
}

impl Deref for ClientTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::channel::mock::MockChannel;
    use crate::message::StatusCode;
    use crate::parser::Parser;
    use crate::transaction::mock::{self, RAW_INVITE, RAW_OPTIONS};

    fn invite_tsx(channel: &MockChannel) -> ClientTransaction {
        let network = mock::network();
        let request = mock::outgoing_request(RAW_INVITE, channel);

        ClientTransaction::create(&network, &request).unwrap()
    }

    fn options_tsx(channel: &MockChannel) -> ClientTransaction {
        let network = mock::network();
        let request = mock::outgoing_request(RAW_OPTIONS, channel);

        ClientTransaction::create(&network, &request).unwrap()
    }

    async fn receive(tsx: &ClientTransaction, channel: &MockChannel, code: StatusCode) -> bool {
        let method = tsx.key().method().clone();
        let raw = mock::raw_response(code, method);
        let response = mock::incoming_response(&raw, channel);

        tsx.receive(&response).await.unwrap()
    }

    //////////////////////////////////
    // Invite Client Transaction Tests
    //////////////////////////////////

    #[tokio::test]
    async fn invite_starts_in_calling_state() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        assert_eq!(tsx.state(), State::Calling);
        assert_eq!(tsx.last_status_code(), None);
    }

    #[tokio::test]
    async fn invite_transitions_to_proceeding_on_a_provisional_response() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        let claimed = receive(&tsx, &channel, StatusCode::RINGING).await;

        assert!(!claimed, "provisional responses go to the delegate");
        assert_eq!(
            tsx.state(),
            State::Proceeding,
            "should transition to Proceeding after receiving 180 Ringing"
        );
        assert_eq!(tsx.last_status_code(), Some(StatusCode::RINGING));
    }

    #[tokio::test(start_paused = true)]
    async fn invite_retransmits_with_a_doubling_interval() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        // For the default values of T1 and T2, this results in
        // intervals of 500 ms, 1 s, 2 s, 4 s, 4 s, 4 s, etc.
        time::sleep(T1 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 1);

        time::sleep(T1 * 2 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 2);

        time::sleep(T1 * 4 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 3);

        time::sleep(T2 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 4);

        time::sleep(T2 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn invite_stops_retransmitting_after_a_provisional() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        time::sleep(T1 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 1);

        receive(&tsx, &channel, StatusCode::TRYING).await;

        time::sleep(T1 * 16).await;
        assert_eq!(
            tsx.retrans_count(),
            1,
            "no further retransmissions after a provisional response"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invite_on_a_reliable_transport_does_not_retransmit() {
        let channel = MockChannel::new_tcp();
        let tsx = invite_tsx(&channel);

        time::sleep(T1 * 16).await;

        assert_eq!(tsx.retrans_count(), 0);
        assert_eq!(tsx.state(), State::Calling);
    }

    #[tokio::test]
    async fn invite_transitions_to_completed_and_acks_a_3xx_response() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        let claimed = receive(&tsx, &channel, StatusCode::MOVED_TEMPORARILY).await;

        assert!(!claimed, "the first final response goes to the delegate");
        assert_eq!(
            tsx.state(),
            State::Completed,
            "should transition to Completed after receiving 3xx response"
        );

        let sent = channel.sent().await;
        assert_eq!(
            sent.len(),
            1,
            "MUST generate an ACK request after receiving 3xx response"
        );

        let SipMsg::Request(ack) = Parser::parse_sip_msg(sent[0].0.as_slice()).unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(*ack.method(), Method::Ack);

        let via = ack.headers.topmost_via().unwrap();
        assert_eq!(via.branch(), Some("z9hG4bK74bf9"));

        let to = ack.headers.to_hdr().unwrap();
        assert_eq!(to.tag(), Some("8321234356"));

        let cseq = ack.headers.cseq().unwrap();
        assert_eq!(cseq.cseq(), 1);
        assert_eq!(*cseq.method(), Method::Ack);
    }

    #[tokio::test]
    async fn invite_retransmits_the_ack_for_repeated_final_responses() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        receive(&tsx, &channel, StatusCode::BUSY_HERE).await;
        let claimed = receive(&tsx, &channel, StatusCode::BUSY_HERE).await;

        assert!(claimed, "retransmitted finals must be absorbed");

        let expected_retrans = 2;
        assert_eq!(channel.sent().await.len(), expected_retrans);
    }

    #[tokio::test]
    async fn invite_2xx_terminates_without_an_ack() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        let claimed = receive(&tsx, &channel, StatusCode::OK).await;

        assert!(!claimed);
        assert_eq!(
            tsx.state(),
            State::Terminated,
            "a 2xx ends the INVITE transaction at once"
        );
        assert!(
            channel.sent().await.is_empty(),
            "the ACK for a 2xx belongs to the TU"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invite_completed_lingers_for_timer_d() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        receive(&tsx, &channel, StatusCode::BUSY_HERE).await;
        assert_eq!(tsx.state(), State::Completed);

        time::sleep(TIMER_D + Duration::from_millis(1)).await;
        assert_eq!(tsx.state(), State::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn invite_times_out_after_64_t1() {
        let channel = MockChannel::new_udp();
        let tsx = invite_tsx(&channel);

        time::sleep(T1 * 64 + Duration::from_millis(1)).await;

        assert_eq!(tsx.state(), State::Terminated);
    }

    //////////////////////////////////////
    // Non-Invite Client Transaction Tests
    //////////////////////////////////////

    #[tokio::test]
    async fn non_invite_starts_in_trying_state() {
        let channel = MockChannel::new_udp();
        let tsx = options_tsx(&channel);

        assert_eq!(tsx.state(), State::Trying);
    }

    #[tokio::test]
    async fn non_invite_transitions_to_proceeding_on_a_provisional_response() {
        let channel = MockChannel::new_udp();
        let tsx = options_tsx(&channel);

        let claimed = receive(&tsx, &channel, StatusCode::TRYING).await;

        assert!(!claimed);
        assert_eq!(tsx.state(), State::Proceeding);
    }

    #[tokio::test]
    async fn non_invite_transitions_to_completed_on_a_final_response() {
        let channel = MockChannel::new_udp();
        let tsx = options_tsx(&channel);

        let claimed = receive(&tsx, &channel, StatusCode::OK).await;

        assert!(!claimed, "the first final response goes to the delegate");
        assert_eq!(tsx.state(), State::Completed);
        assert_eq!(tsx.last_status_code(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn non_invite_absorbs_final_response_retransmissions() {
        let channel = MockChannel::new_udp();
        let tsx = options_tsx(&channel);

        receive(&tsx, &channel, StatusCode::OK).await;
        let claimed = receive(&tsx, &channel, StatusCode::OK).await;

        assert!(claimed, "retransmitted finals must be absorbed");
        assert!(
            channel.sent().await.is_empty(),
            "absorbing a final must not send anything"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_invite_retransmits_at_t2_in_proceeding() {
        let channel = MockChannel::new_udp();
        let tsx = options_tsx(&channel);

        time::sleep(T1 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 1);

        receive(&tsx, &channel, StatusCode::TRYING).await;

        time::sleep(T1 * 2 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 2);

        // The next firings come at the T2 cadence.
        time::sleep(T1 * 4).await;
        assert_eq!(tsx.retrans_count(), 2);

        time::sleep(T2 - T1 * 4 + Duration::from_millis(1)).await;
        assert_eq!(tsx.retrans_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_invite_times_out_after_64_t1() {
        let channel = MockChannel::new_udp();
        let tsx = options_tsx(&channel);

        time::sleep(T1 * 64 + Duration::from_millis(1)).await;

        assert_eq!(tsx.state(), State::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn non_invite_completed_lingers_for_timer_k() {
        let channel = MockChannel::new_udp();
        let tsx = options_tsx(&channel);

        receive(&tsx, &channel, StatusCode::OK).await;
        assert_eq!(tsx.state(), State::Completed);

        time::sleep(T4 + Duration::from_millis(1)).await;
        assert_eq!(tsx.state(), State::Terminated);
    }

    #[tokio::test]
    async fn non_invite_on_a_reliable_transport_terminates_on_a_final() {
        let channel = MockChannel::new_tcp();
        let tsx = options_tsx(&channel);

        receive(&tsx, &channel, StatusCode::OK).await;

        assert_eq!(tsx.state(), State::Terminated);
    }
}
