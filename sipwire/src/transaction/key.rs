use crate::headers::{CSeq, CallId, To};
use crate::message::Method;
use crate::ArcStr;

/// RFC 3261 magic cookie every compliant branch starts with.
pub const BRANCH_RFC3261: &str = "z9hG4bK";

/// Correlates messages to transactions.
///
/// Client keys follow the branch the request left with, responses echo
/// it back in their topmost Via. Server keys fold the dialog
/// identifiers instead, so retransmissions and the ACK for a non-2xx
/// final land on the transaction that produced the final.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionKey {
    Client {
        branch: ArcStr,
        method: Method,
    },
    Server {
        call_id: ArcStr,
        cseq: u32,
        method: Method,
        to_tag: Option<ArcStr>,
    },
}

impl TransactionKey {
    /// Builds the client key for a request leaving with `branch`.
    pub fn client(method: Method, branch: &str) -> Self {
        Self::Client {
            branch: branch.into(),
            method,
        }
    }

    /// Builds the server key for an incoming request.
    ///
    /// An ACK folds onto the INVITE it acknowledges, so its key keeps
    /// the INVITE method.
    pub fn server(call_id: &CallId, cseq: &CSeq, to: &To) -> Self {
        let method = match cseq.method() {
            Method::Ack => Method::Invite,
            method => method.clone(),
        };

        Self::Server {
            call_id: ArcStr::from(call_id.as_str()),
            cseq: cseq.cseq(),
            method,
            to_tag: to.tag().map(ArcStr::from),
        }
    }

    /// The same key with the To tag stripped, when it has one.
    ///
    /// The ACK for a non-2xx final carries the tag the response
    /// minted, while the INVITE that opened the transaction arrived
    /// without one. Lookups probe the exact key first and the untagged
    /// key second, so re-INVITE ACKs (exact hit) and initial INVITE
    /// ACKs (untagged hit) both find their transaction.
    pub fn untagged(&self) -> Option<TransactionKey> {
        match self {
            Self::Server {
                call_id,
                cseq,
                method,
                to_tag: Some(_),
            } => Some(Self::Server {
                call_id: call_id.clone(),
                cseq: *cseq,
                method: method.clone(),
                to_tag: None,
            }),
            _ => None,
        }
    }

    pub fn method(&self) -> &Method {
        match self {
            Self::Client { method, .. } | Self::Server { method, .. } => method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::message::SipUri;

    fn to_hdr(tag: Option<&str>) -> To {
        let uri = SipUri::Uri("sip:bob@biloxi.com".parse().unwrap());
        let mut to = To::new(uri);
        to.set_tag(tag);

        to
    }

    #[test]
    fn test_client_keys_differ_by_method() {
        let invite = TransactionKey::client(Method::Invite, "z9hG4bK74b21");
        let cancel = TransactionKey::client(Method::Cancel, "z9hG4bK74b21");

        assert_ne!(invite, cancel);
        assert_eq!(invite.method(), &Method::Invite);
    }

    #[test]
    fn test_ack_folds_onto_the_invite_key() {
        let call_id = CallId::new("a84b4c76e66710");
        let invite = TransactionKey::server(
            &call_id,
            &CSeq::new(314159, Method::Invite),
            &to_hdr(None),
        );
        let ack = TransactionKey::server(&call_id, &CSeq::new(314159, Method::Ack), &to_hdr(None));

        assert_eq!(invite, ack);
        assert_eq!(ack.method(), &Method::Invite);
    }

    #[test]
    fn test_tagged_ack_matches_through_untagged_probe() {
        let call_id = CallId::new("a84b4c76e66710");
        let invite = TransactionKey::server(
            &call_id,
            &CSeq::new(314159, Method::Invite),
            &to_hdr(None),
        );
        let ack = TransactionKey::server(
            &call_id,
            &CSeq::new(314159, Method::Ack),
            &to_hdr(Some("93810874")),
        );

        assert_ne!(invite, ack);
        assert_eq!(ack.untagged(), Some(invite));
    }

    #[test]
    fn test_untagged_is_a_noop_without_a_tag() {
        let call_id = CallId::new("a84b4c76e66710");
        let key = TransactionKey::server(
            &call_id,
            &CSeq::new(1, Method::Register),
            &to_hdr(None),
        );

        assert!(key.untagged().is_none());
    }
}
