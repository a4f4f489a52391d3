use std::fmt;

/// Classifies SIP status codes into categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeClass {
    /// Provisional responses (1xx)
    Provisional,
    /// Successful responses (2xx)
    Success,
    /// Redirection responses (3xx)
    Redirection,
    /// Client failure responses (4xx)
    ClientError,
    /// Server failure responses (5xx)
    ServerError,
    /// Global failure responses (6xx)
    GlobalFailure,
}

/// Status Code for SIP responses.
///
/// Any numeric code from `100` to `699` is representable, so responses
/// carrying extension codes survive a parse and reserialize cycle.
/// Common codes are available as associated constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// `100 Trying` status code.
    pub const TRYING: StatusCode = StatusCode(100);
    /// `180 Ringing` status code.
    pub const RINGING: StatusCode = StatusCode(180);
    /// `183 Session Progress` status code.
    pub const SESSION_PROGRESS: StatusCode = StatusCode(183);
    /// `200 OK` status code.
    pub const OK: StatusCode = StatusCode(200);
    /// `202 Accepted` status code.
    pub const ACCEPTED: StatusCode = StatusCode(202);
    /// `302 Moved Temporarily` status code.
    pub const MOVED_TEMPORARILY: StatusCode = StatusCode(302);
    /// `400 Bad Request` status code.
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    /// `401 Unauthorized` status code.
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    /// `403 Forbidden` status code.
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    /// `404 Not Found` status code.
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// `405 Method Not Allowed` status code.
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    /// `407 Proxy Authentication Required` status code.
    pub const PROXY_AUTHENTICATION_REQUIRED: StatusCode = StatusCode(407);
    /// `408 Request Timeout` status code.
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    /// `413 Request Entity Too Large` status code.
    pub const REQUEST_ENTITY_TOO_LARGE: StatusCode = StatusCode(413);
    /// `480 Temporarily Unavailable` status code.
    pub const TEMPORARILY_UNAVAILABLE: StatusCode = StatusCode(480);
    /// `481 Call or Transaction Does Not Exist` status code.
    pub const CALL_OR_TRANSACTION_DOES_NOT_EXIST: StatusCode = StatusCode(481);
    /// `486 Busy Here` status code.
    pub const BUSY_HERE: StatusCode = StatusCode(486);
    /// `487 Request Terminated` status code.
    pub const REQUEST_TERMINATED: StatusCode = StatusCode(487);
    /// `500 Server Internal Error` status code.
    pub const SERVER_INTERNAL_ERROR: StatusCode = StatusCode(500);
    /// `501 Not Implemented` status code.
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);
    /// `503 Service Unavailable` status code.
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);
    /// `513 Message Too Large` status code.
    pub const MESSAGE_TOO_LARGE: StatusCode = StatusCode(513);
    /// `603 Decline` status code.
    pub const DECLINE: StatusCode = StatusCode(603);

    /// Creates a `StatusCode` from a numeric code.
    ///
    /// Returns `None` if the code is outside the `100..=699` range.
    pub const fn new(code: u16) -> Option<StatusCode> {
        if code >= 100 && code <= 699 {
            Some(StatusCode(code))
        } else {
            None
        }
    }

    /// Converts a `StatusCode` into its numeric code.
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns the class of the status code.
    pub fn class(&self) -> CodeClass {
        match self.0 {
            100..=199 => CodeClass::Provisional,
            200..=299 => CodeClass::Success,
            300..=399 => CodeClass::Redirection,
            400..=499 => CodeClass::ClientError,
            500..=599 => CodeClass::ServerError,
            _ => CodeClass::GlobalFailure,
        }
    }

    /// Returns [`true`] if its status code is provisional (from `100` to
    /// `199`), and [`false`] otherwise.
    #[inline]
    pub fn is_provisional(&self) -> bool {
        matches!(self.class(), CodeClass::Provisional)
    }

    /// Returns [`true`] if its status code is final (from `200` to `699`),
    /// and [`false`] otherwise.
    #[inline]
    pub fn is_final(&self) -> bool {
        !self.is_provisional()
    }

    /// Returns the default reason text for the status code.
    ///
    /// Codes without a well known reason map to the reason of their
    /// class (`x00`).
    pub fn default_reason(&self) -> &'static str {
        match self.0 {
            100 => "Trying",
            180 => "Ringing",
            181 => "Call Is Being Forwarded",
            182 => "Queued",
            183 => "Session Progress",
            200 => "OK",
            202 => "Accepted",
            300 => "Multiple Choices",
            301 => "Moved Permanently",
            302 => "Moved Temporarily",
            305 => "Use Proxy",
            380 => "Alternative Service",
            401 => "Unauthorized",
            402 => "Payment Required",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            410 => "Gone",
            413 => "Request Entity Too Large",
            414 => "Request-URI Too Long",
            415 => "Unsupported Media Type",
            416 => "Unsupported URI Scheme",
            420 => "Bad Extension",
            421 => "Extension Required",
            423 => "Interval Too Brief",
            480 => "Temporarily Unavailable",
            481 => "Call/Transaction Does Not Exist",
            482 => "Loop Detected",
            483 => "Too Many Hops",
            484 => "Address Incomplete",
            485 => "Ambiguous",
            486 => "Busy Here",
            487 => "Request Terminated",
            488 => "Not Acceptable Here",
            491 => "Request Pending",
            493 => "Undecipherable",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Server Time-out",
            505 => "Version Not Supported",
            513 => "Message Too Large",
            600 => "Busy Everywhere",
            603 => "Decline",
            604 => "Does Not Exist Anywhere",
            606 => "Not Acceptable",
            100..=199 => "Trying",
            200..=299 => "OK",
            300..=399 => "Multiple Choices",
            400..=499 => "Bad Request",
            500..=599 => "Server Internal Error",
            _ => "Busy Everywhere",
        }
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        StatusCode::new(code).ok_or(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
