//! Validation results.

use sso_ticket::{Authentication, Service};

/// Outcome of a successful service or proxy ticket validation.
///
/// The assertion owns copies of the authentications involved; nothing in it
/// aliases registry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    service: Service,
    chained_authentications: Vec<Authentication>,
    proxied_by: Vec<Service>,
    from_new_login: bool,
}

impl Assertion {
    pub(crate) fn new(
        service: Service,
        primary: Authentication,
        mut proxies: Vec<(Authentication, Service)>,
        from_new_login: bool,
    ) -> Self {
        // `proxies` arrives nearest first; authentications are kept root first.
        let proxied_by = proxies.iter().map(|(_, service)| service.clone()).collect();
        proxies.reverse();
        let chained_authentications = std::iter::once(primary)
            .chain(proxies.into_iter().map(|(authentication, _)| authentication))
            .collect();
        Self {
            service,
            chained_authentications,
            proxied_by,
            from_new_login,
        }
    }

    /// Returns the authentication of the SSO session the ticket belongs to.
    #[must_use]
    pub fn primary_authentication(&self) -> &Authentication {
        &self.chained_authentications[0]
    }

    /// Consumes the assertion and returns the primary authentication.
    #[must_use]
    pub fn into_primary_authentication(mut self) -> Authentication {
        self.chained_authentications.swap_remove(0)
    }

    /// Returns every authentication along the chain, session root first.
    #[must_use]
    pub fn chained_authentications(&self) -> &[Authentication] {
        &self.chained_authentications
    }

    /// Returns the services that proxied on the user's behalf, nearest first.
    ///
    /// Empty for a plain service ticket.
    #[must_use]
    pub fn proxied_by(&self) -> &[Service] {
        &self.proxied_by
    }

    /// Returns whether the ticket was issued through proxy authentication.
    #[must_use]
    pub fn is_proxied(&self) -> bool {
        !self.proxied_by.is_empty()
    }

    /// Returns the service the ticket was validated for.
    #[must_use]
    pub const fn service(&self) -> &Service {
        &self.service
    }

    /// Returns whether the ticket was issued right after presenting credentials.
    #[must_use]
    pub const fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }
}
