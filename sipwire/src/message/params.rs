use std::fmt;

use crate::ArcStr;

/// A parameter.
///
/// This struct represents a parameter in a SIP message,
/// consisting of a name and an optional value.
///
/// # Examples
///
/// ```
/// use sipwire::message::Param;
///
/// let param = Param::new("lr", None);
///
/// assert_eq!(param.to_string(), ";lr");
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Param {
    /// The parameter name.
    pub name: ArcStr,

    /// The parameter optional value.
    pub value: Option<ArcStr>,
}

impl Param {
    /// Creates a new parameter.
    pub fn new(name: &str, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.map(|v| v.into()),
        }
    }
}

impl From<(&str, Option<&str>)> for Param {
    fn from((name, value): (&str, Option<&str>)) -> Self {
        Self::new(name, value)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, ";{}={}", self.name, value),
            None => write!(f, ";{}", self.name),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Default, Clone)]
/// A collection of SIP parameters.
///
/// A parameter takes the form `name=value` and can appear in a SIP message
/// as either a URI parameter or a header parameter. The insertion order is
/// preserved, so reserializing a parsed list reproduces the input.
pub struct Params(Vec<Param>);

impl Params {
    /// Creates an empty `Params` list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Gets the value of a parameter by name.
    ///
    /// Returns the value associated with the given name, if it exists.
    /// The name comparison is case-insensitive.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.0
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_deref())
    }

    /// Gets the value of a parameter by name, mapping a valueless
    /// parameter to an empty string.
    pub fn get_named(&self, name: &str) -> Option<&str> {
        self.get(name).map(|value| value.unwrap_or(""))
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.0.iter()
    }

    /// Pushes a name-value parameter pair.
    pub fn push(&mut self, param: Param) {
        self.0.push(param)
    }

    /// Checks if the parameter list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for param in &self.0 {
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Params {
    fn from(params: [(&str, &str); N]) -> Self {
        Self(
            params
                .map(|(name, value)| Param::new(name, Some(value)))
                .to_vec(),
        )
    }
}
