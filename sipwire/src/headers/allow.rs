use crate::{error::Result, headers::HeaderParse, macros::hdr_list, message::Method, parser::Parser};
use itertools::Itertools;
use std::fmt;

/// The `Allow` SIP header.
///
/// Indicates what methods is supported by the `UA`.
///
/// # Examples
///
/// ```
/// # use sipwire::headers::Allow;
/// # use sipwire::message::Method;
/// let mut allow = Allow::new();
///
/// allow.push(Method::Invite);
/// allow.push(Method::Register);
///
/// assert_eq!("Allow: INVITE, REGISTER", allow.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Allow(Vec<Method>);

impl Allow {
    /// Creates a empty `Allow` header.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an new `Method`.
    pub fn push(&mut self, method: Method) {
        self.0.push(method);
    }

    /// Gets the `Method` at the specified index.
    pub fn get(&self, index: usize) -> Option<&Method> {
        self.0.get(index)
    }

    /// Returns the number of methods in the header.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the header lists no methods.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl HeaderParse for Allow {
    const NAME: &'static str = "Allow";
    /*
     * Allow  =  "Allow" HCOLON [Method *(COMMA Method)]
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let allow = hdr_list!(parser => parser.parse_method()?);

        Ok(Allow(allow))
    }
}

impl fmt::Display for Allow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Allow::NAME, self.0.iter().format(", "))
    }
}
