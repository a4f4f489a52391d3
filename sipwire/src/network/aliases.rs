use std::collections::HashMap;

use crate::endpoint::EndPoint;
use crate::error::{Error, Result};

/// Alternate endpoints that reach an already connected destination.
///
/// A registration answered through a NATed channel may advertise a
/// different address than the socket the channel runs on. Pointing the
/// advertised endpoint at the live one keeps later requests on the
/// channel the registration opened.
#[derive(Debug, Default)]
pub(crate) struct AliasesMap {
    forward: HashMap<EndPoint, Vec<EndPoint>>,
    reverse: HashMap<EndPoint, EndPoint>,
}

impl AliasesMap {
    /// Points `alias` at `target`. Both must share a protocol.
    pub(crate) fn insert(&mut self, target: EndPoint, alias: EndPoint) -> Result<()> {
        if alias.protocol() != target.protocol() {
            return Err(Error::AliasProtocolMismatch { target, alias });
        }
        if alias == target || self.reverse.get(&alias) == Some(&target) {
            return Ok(());
        }

        // Re-pointing an alias moves it off its old target.
        self.remove_alias(&alias);
        self.forward
            .entry(target.clone())
            .or_default()
            .push(alias.clone());
        self.reverse.insert(alias, target);

        Ok(())
    }

    /// Resolves `endpoint` to the target it aliases, or itself.
    pub(crate) fn resolve<'a>(&'a self, endpoint: &'a EndPoint) -> &'a EndPoint {
        self.reverse.get(endpoint).unwrap_or(endpoint)
    }

    pub(crate) fn remove_alias(&mut self, alias: &EndPoint) {
        if let Some(target) = self.reverse.remove(alias) {
            if let Some(aliases) = self.forward.get_mut(&target) {
                aliases.retain(|known| known != alias);
                if aliases.is_empty() {
                    self.forward.remove(&target);
                }
            }
        }
    }

    /// Drops `target` and every alias pointing at it.
    pub(crate) fn remove_target(&mut self, target: &EndPoint) {
        if let Some(aliases) = self.forward.remove(target) {
            for alias in aliases {
                self.reverse.remove(&alias);
            }
        }
    }
}
