//! robots.txt policy handling.
//!
//! Policies are fetched once per host per run and consulted with the
//! configured robots agent. Fetch failures and missing files degrade to
//! an allow-all policy; only an explicit disallow blocks a fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};
use url::Url;

/// Parsed robots.txt rules for the hosts this run touches.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Rules keyed by lowercased user-agent token.
    agent_rules: HashMap<String, PathRules>,
    /// Rules for `*`.
    default_rules: PathRules,
}

#[derive(Debug, Clone, Default)]
struct PathRules {
    disallow: Vec<String>,
    allow: Vec<String>,
}

impl RobotsPolicy {
    pub fn parse(content: &str) -> Self {
        let mut policy = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut current = PathRules::default();
        let mut seen_rule_for_group = false;

        let mut flush =
            |policy: &mut RobotsPolicy, agents: &mut Vec<String>, rules: &mut PathRules| {
                for agent in agents.drain(..) {
                    if agent == "*" {
                        policy.default_rules = rules.clone();
                    } else {
                        policy.agent_rules.insert(agent, rules.clone());
                    }
                }
                *rules = PathRules::default();
            };

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if seen_rule_for_group {
                        flush(&mut policy, &mut current_agents, &mut current);
                        seen_rule_for_group = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "disallow" => {
                    seen_rule_for_group = true;
                    if !value.is_empty() {
                        current.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    seen_rule_for_group = true;
                    if !value.is_empty() {
                        current.allow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }
        flush(&mut policy, &mut current_agents, &mut current);
        policy
    }

    /// Whether the given path is fetchable for the given agent.
    /// Allow rules take precedence over disallow rules.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let agent = user_agent.to_lowercase();
        let rules = self
            .agent_rules
            .get(&agent)
            .or_else(|| {
                self.agent_rules
                    .iter()
                    .find(|(token, _)| *token != "*" && agent.contains(token.as_str()))
                    .map(|(_, r)| r)
            })
            .unwrap_or(&self.default_rules);

        if rules.allow.iter().any(|a| path.starts_with(a.as_str())) {
            return true;
        }
        !rules
            .disallow
            .iter()
            .any(|d| d == "/" || path.starts_with(d.as_str()))
    }
}

/// Per-host robots.txt cache. The first caller for a host fetches and
/// parses the file; everyone else awaits the same cell.
pub struct RobotsCache {
    client: reqwest::Client,
    robots_agent: String,
    respect: bool,
    per_host: Mutex<HashMap<String, Arc<OnceCell<RobotsPolicy>>>>,
}

impl RobotsCache {
    pub fn new(user_agent: &str, robots_agent: &str, respect: bool) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            robots_agent: robots_agent.to_string(),
            respect,
            per_host: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the URL may be fetched under the host's robots policy.
    pub async fn is_allowed(&self, url: &str) -> bool {
        if !self.respect {
            return true;
        }
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(host) = parsed.host_str() else {
            return true;
        };
        let origin = format!(
            "{}://{}{}",
            parsed.scheme(),
            host,
            parsed
                .port()
                .map(|p| format!(":{}", p))
                .unwrap_or_default()
        );

        let cell = {
            let mut map = self.per_host.lock().await;
            map.entry(origin.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let policy = cell
            .get_or_init(|| async { self.fetch_policy(&origin).await })
            .await;

        let allowed = policy.is_allowed(&self.robots_agent, parsed.path());
        if !allowed {
            debug!(
                "robots.txt disallows '{}' for agent '{}'",
                url, self.robots_agent
            );
        }
        allowed
    }

    async fn fetch_policy(&self, origin: &str) -> RobotsPolicy {
        let robots_url = format!("{}/robots.txt", origin);
        debug!("Fetching robots policy from {}", robots_url);
        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => RobotsPolicy::parse(&body),
                Err(e) => {
                    warn!("Failed reading robots.txt body from {}: {}", robots_url, e);
                    RobotsPolicy::default()
                }
            },
            Ok(response) => {
                debug!(
                    "robots.txt at {} returned {}, assuming allowed",
                    robots_url,
                    response.status()
                );
                RobotsPolicy::default()
            }
            Err(e) => {
                warn!("Failed fetching {}: {}. Assuming allowed", robots_url, e);
                RobotsPolicy::default()
            }
        }
    }
}
