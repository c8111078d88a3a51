use crate::token::{MalformedCredential, is_well_formed};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Accepted,
    Rejected,
}

impl Acceptance {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Decides whether a credential presented for recovery is trusted.
pub trait CredentialAcceptor: Send + Sync {
    fn check(&self, credential: &str) -> Acceptance;
}

/// Accepts any non-blank credential shaped like `header.payload.signature`.
///
/// Nothing is verified cryptographically.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralAcceptor;

impl CredentialAcceptor for StructuralAcceptor {
    fn check(&self, credential: &str) -> Acceptance {
        let credential = credential.trim();
        if credential.is_empty() {
            return Acceptance::Rejected;
        }

        if !is_well_formed(credential) {
            let found = credential.split('.').count();
            debug!("{}", MalformedCredential { found });
            return Acceptance::Rejected;
        }

        if credential.split('.').any(str::is_empty) {
            debug!("Credential has an empty segment");
            return Acceptance::Rejected;
        }

        Acceptance::Accepted
    }
}
