use ahash::AHashMap;

/// Picks the relay host for a recipient.
///
/// A routing key matches when it occurs anywhere in the recipient address.
/// Among matching keys the longest wins, ties going to the lexicographically
/// smaller key; with no match the default relay is used.
#[derive(Debug, Clone)]
pub struct Router {
    /// Sorted so the first match is the winner.
    routes: Vec<(String, String)>,
    default_relay: String,
}

impl Router {
    pub fn new(routing: &AHashMap<String, String>, default_relay: impl Into<String>) -> Self {
        let mut routes: Vec<(String, String)> = routing
            .iter()
            .filter(|(domain, _)| !domain.is_empty())
            .map(|(domain, relay)| (domain.clone(), relay.clone()))
            .collect();

        routes.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self {
            routes,
            default_relay: default_relay.into(),
        }
    }

    pub fn route(&self, recipient: &str) -> &str {
        self.routes
            .iter()
            .find(|(domain, _)| recipient.contains(domain.as_str()))
            .map_or(self.default_relay.as_str(), |(_, relay)| relay.as_str())
    }

    pub fn default_relay(&self) -> &str {
        &self.default_relay
    }
}
