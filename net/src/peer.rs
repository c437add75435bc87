/// A target peer descriptor (§6 "Outbound"): the only thing a client
/// implementation needs to dial a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Peer {
    pub address: String,
    pub tls: bool,
}

impl Peer {
    pub fn new(address: impl Into<String>, tls: bool) -> Self {
        Peer {
            address: address.into(),
            tls,
        }
    }

    pub(crate) fn uri(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}", self.address)
    }

    /// The host part of `address`, used as the TLS certificate's expected
    /// domain name when `tls` is set. Falls back to the whole address if
    /// it carries no `:port` suffix.
    pub(crate) fn domain_name(&self) -> &str {
        match self.address.rsplit_once(':') {
            Some((host, _)) => host,
            None => &self.address,
        }
    }
}
