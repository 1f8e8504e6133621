//! Static claim catalog.
//!
//! Claims are referenced by a small integer on the wire and by their
//! symbolic name inside bearer tokens. The set is frozen at build time.

use std::collections::BTreeMap;

use crate::error::{Result, ServerError};

/// Integer key of a catalog entry.
pub type ClaimId = i32;

/// Administrator claim, required to delete users.
pub const ADMIN: &str = "admin";

/// The process-wide catalog.
pub static CATALOG: ClaimCatalog = ClaimCatalog {
    entries: &[(0, ADMIN)],
};

/// Closed mapping from claim id to claim name.
#[derive(Debug)]
pub struct ClaimCatalog {
    entries: &'static [(ClaimId, &'static str)],
}

impl ClaimCatalog {
    /// Name of claim `id`, if it is part of the catalog.
    pub fn name(&self, id: ClaimId) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, name)| *name)
    }

    pub fn contains(&self, id: ClaimId) -> bool {
        self.name(id).is_some()
    }

    /// Check every id against the catalog.
    pub fn validate(&self, ids: &[ClaimId]) -> Result<()> {
        match ids.iter().find(|id| !self.contains(**id)) {
            Some(id) => Err(invalid_claim(*id)),
            None => Ok(()),
        }
    }

    /// Resolve ids into names, failing on the first unknown id.
    pub fn names(&self, ids: &[ClaimId]) -> Result<Vec<&'static str>> {
        ids.iter()
            .map(|id| self.name(*id).ok_or_else(|| invalid_claim(*id)))
            .collect()
    }

    /// Owned copy of the whole catalog.
    pub fn as_map(&self) -> BTreeMap<ClaimId, String> {
        self.entries
            .iter()
            .map(|(id, name)| (*id, (*name).to_owned()))
            .collect()
    }
}

fn invalid_claim(id: ClaimId) -> ServerError {
    ServerError::Validation(format!("not valid claim detected: {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_catalog_lookup() {
        assert_eq!(CATALOG.name(0), Some(ADMIN));
        assert_eq!(CATALOG.name(1), None);
        assert_eq!(CATALOG.name(-1), None);
        assert_eq!(CATALOG.as_map().get(&0).map(String::as_str), Some(ADMIN));
    }

    #[test]
    fn test_validate_reports_unknown_id() {
        assert!(CATALOG.validate(&[]).is_ok());
        assert!(CATALOG.validate(&[0, 0]).is_ok());

        let err = CATALOG.validate(&[0, 999]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "not valid claim detected: 999");
    }

    #[test]
    fn test_names_keep_order() {
        assert_eq!(CATALOG.names(&[0]).unwrap(), vec![ADMIN]);
        assert!(CATALOG.names(&[7]).is_err());
    }
}
