//! Routes recognized text to registered agents
//!
//! Text that starts with an agent's name ("alice, follow me", "alice: stop",
//! or just "alice") goes to that agent only, with the name stripped. Anything
//! else is broadcast to every agent.

use std::sync::RwLock;

use regex::Regex;
use tokio::sync::mpsc;

/// Text delivered to an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMessage {
    pub sender: String,
    pub text: String,
}

/// What [`AgentRegistry::dispatch`] did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Blank text, or no agents registered
    Ignored,
    /// Delivered to the named agent only
    Routed(String),
    /// Delivered to this many agents
    Broadcast(usize),
}

struct AgentRoute {
    name: String,
    prefix: Regex,
    handler: mpsc::UnboundedSender<AgentMessage>,
}

impl AgentRoute {
    fn compile(name: &str, handler: mpsc::UnboundedSender<AgentMessage>) -> Result<Self, regex::Error> {
        // Name, then punctuation or whitespace and the rest; or the bare name
        let prefix = Regex::new(&format!(
            r"(?i)^{}(?:[,，:：、。！？!?\s]+(.+))?$",
            regex::escape(name)
        ))?;
        Ok(Self {
            name: name.to_string(),
            prefix,
            handler,
        })
    }

    /// Remaining text if `text` is addressed to this agent
    fn addressed<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.prefix
            .captures(text)
            .map(|caps| caps.get(1).map_or("", |rest| rest.as_str()))
    }

    fn deliver(&self, sender: &str, text: &str) -> bool {
        let message = AgentMessage {
            sender: sender.to_string(),
            text: text.to_string(),
        };
        if self.handler.send(message).is_err() {
            tracing::warn!(agent = %self.name, "agent handler closed, message dropped");
            return false;
        }
        true
    }
}

/// Registry of agents that receive recognized text
///
/// Shared by reference (usually in an `Arc`); there is no global instance.
#[derive(Default)]
pub struct AgentRegistry {
    routes: RwLock<Vec<AgentRoute>>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, replacing the handler if the name is already known
    ///
    /// Returns `false` for an empty name.
    pub fn register(&self, name: &str, handler: mpsc::UnboundedSender<AgentMessage>) -> bool {
        let name = name.trim();
        if name.is_empty() {
            tracing::error!("agent name must not be empty");
            return false;
        }

        let route = match AgentRoute::compile(name, handler) {
            Ok(route) => route,
            Err(e) => {
                tracing::error!(agent = %name, error = %e, "invalid agent name");
                return false;
            }
        };

        let Ok(mut routes) = self.routes.write() else {
            tracing::error!("agent registry poisoned");
            return false;
        };
        if let Some(existing) = routes.iter_mut().find(|r| r.name == name) {
            tracing::debug!(agent = %name, "agent handler replaced");
            *existing = route;
        } else {
            routes.push(route);
            tracing::debug!(agent = %name, total = routes.len(), "agent registered");
        }
        true
    }

    /// Remove an agent; `false` if it was not registered
    pub fn unregister(&self, name: &str) -> bool {
        let Ok(mut routes) = self.routes.write() else {
            return false;
        };
        let before = routes.len();
        routes.retain(|r| r.name != name);
        let removed = routes.len() != before;
        if !removed {
            tracing::warn!(agent = %name, "unregister of unknown agent");
        }
        removed
    }

    /// Names in registration order
    #[must_use]
    pub fn agents(&self) -> Vec<String> {
        self.routes
            .read()
            .map(|routes| routes.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliver `text` from `sender` to the addressed agent, or to all
    pub fn dispatch(&self, sender: &str, text: &str) -> DispatchOutcome {
        if text.trim().is_empty() {
            tracing::debug!("empty recognition result ignored");
            return DispatchOutcome::Ignored;
        }

        let Ok(routes) = self.routes.read() else {
            tracing::error!("agent registry poisoned");
            return DispatchOutcome::Ignored;
        };
        if routes.is_empty() {
            tracing::warn!("no agents registered, message dropped");
            return DispatchOutcome::Ignored;
        }

        for route in routes.iter() {
            if let Some(rest) = route.addressed(text) {
                tracing::debug!(agent = %route.name, "message routed");
                route.deliver(sender, rest.trim());
                return DispatchOutcome::Routed(route.name.clone());
            }
        }

        let delivered = routes.iter().filter(|r| r.deliver(sender, text)).count();
        tracing::debug!(agents = delivered, "message broadcast");
        DispatchOutcome::Broadcast(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> (AgentRegistry, Vec<mpsc::UnboundedReceiver<AgentMessage>>) {
        let registry = AgentRegistry::new();
        let receivers = names
            .iter()
            .map(|name| {
                let (tx, rx) = mpsc::unbounded_channel();
                assert!(registry.register(name, tx));
                rx
            })
            .collect();
        (registry, receivers)
    }

    #[test]
    fn test_prefix_routes_to_single_agent() {
        let (registry, mut rx) = registry_with(&["Alice", "Bob"]);

        assert_eq!(
            registry.dispatch("player", "alice, come here"),
            DispatchOutcome::Routed("Alice".to_string())
        );
        assert_eq!(rx[0].try_recv().unwrap().text, "come here");
        assert!(rx[1].try_recv().is_err());

        registry.dispatch("player", "Bob：挖矿");
        assert_eq!(rx[1].try_recv().unwrap().text, "挖矿");
    }

    #[test]
    fn test_bare_name_routes_empty_text() {
        let (registry, mut rx) = registry_with(&["Alice"]);
        assert_eq!(
            registry.dispatch("player", "ALICE"),
            DispatchOutcome::Routed("Alice".to_string())
        );
        let message = rx[0].try_recv().unwrap();
        assert_eq!(message.sender, "player");
        assert_eq!(message.text, "");
    }

    #[test]
    fn test_unaddressed_text_broadcasts() {
        let (registry, mut rx) = registry_with(&["Alice", "Bob"]);
        assert_eq!(
            registry.dispatch("player", "everyone follow me"),
            DispatchOutcome::Broadcast(2)
        );
        assert_eq!(rx[0].try_recv().unwrap().text, "everyone follow me");
        assert_eq!(rx[1].try_recv().unwrap().text, "everyone follow me");

        // Name must be followed by a separator
        assert_eq!(registry.dispatch("player", "Alicexyz"), DispatchOutcome::Broadcast(2));
    }

    #[test]
    fn test_blank_text_and_empty_registry_ignored() {
        let (registry, _rx) = registry_with(&["Alice"]);
        assert_eq!(registry.dispatch("player", "  "), DispatchOutcome::Ignored);

        let empty = AgentRegistry::new();
        assert_eq!(empty.dispatch("player", "hello"), DispatchOutcome::Ignored);
    }

    #[test]
    fn test_register_replaces_and_unregister_removes() {
        let (registry, mut old_rx) = registry_with(&["Alice"]);
        let (tx, mut new_rx) = mpsc::unbounded_channel();
        assert!(registry.register("Alice", tx));
        assert_eq!(registry.agents(), vec!["Alice"]);

        registry.dispatch("player", "hi");
        assert!(old_rx[0].try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap().text, "hi");

        assert!(registry.unregister("Alice"));
        assert!(!registry.unregister("Alice"));
        assert!(registry.agents().is_empty());
    }

    #[test]
    fn test_name_with_regex_metacharacters() {
        let (registry, mut rx) = registry_with(&["R2.D2"]);
        assert_eq!(
            registry.dispatch("player", "r2.d2 status"),
            DispatchOutcome::Routed("R2.D2".to_string())
        );
        assert_eq!(rx[0].try_recv().unwrap().text, "status");
        assert_eq!(registry.dispatch("player", "R2xD2 status"), DispatchOutcome::Broadcast(1));
    }
}
