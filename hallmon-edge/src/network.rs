/// Network name and passphrase used to associate with the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

/// Wireless association provider.
pub trait Network {
    /// Make one join attempt and return. Completion is observed through
    /// [`Network::is_joined`], which is also where a failed join is retried,
    /// so a bounded [`AssociationPolicy`](crate::AssociationPolicy) holds.
    fn begin(&mut self, credentials: &Credentials<'_>) -> impl Future<Output = ()>;

    /// Whether the device is associated and has a usable address.
    fn is_joined(&mut self) -> impl Future<Output = bool>;
}
