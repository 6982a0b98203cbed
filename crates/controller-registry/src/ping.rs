use std::net::ToSocketAddrs;
use std::time::Duration;

use serde::Serialize;

use controller_store::models::Agent;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Serialize)]
pub struct PingResult {
	pub dns_resolved: bool,
	pub health_reachable: bool,
	pub health_status: Option<String>,
}

impl PingResult {
	pub fn reachable(&self) -> bool {
		self.dns_resolved && self.health_reachable
	}
}

/// `ping(name)` from §4.4: DNS resolution of `agent.host`, then an HTTP GET
/// `/health` against `{scheme}://host:port` with a 5s timeout. Both probes
/// run even if the first fails, so callers can distinguish "DNS broken"
/// from "host resolves but the process is down".
pub async fn ping_agent(agent: &Agent) -> PingResult {
	let dns_resolved = resolve_host(&agent.host);
	let (health_reachable, health_status) = probe_health(agent).await;
	PingResult {
		dns_resolved,
		health_reachable,
		health_status,
	}
}

fn resolve_host(host: &str) -> bool {
	// A bare IP literal always "resolves"; only symbolic hostnames need a
	// lookup, matching the common case of agents addressed by IP.
	if host.parse::<std::net::IpAddr>().is_ok() {
		return true;
	}
	(host, 0u16).to_socket_addrs().map(|mut it| it.next().is_some()).unwrap_or(false)
}

async fn probe_health(agent: &Agent) -> (bool, Option<String>) {
	let url = format!("{}/health", agent.base_url());
	let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
		Ok(c) => c,
		Err(_) => return (false, None),
	};
	match client.get(&url).send().await {
		Ok(resp) if resp.status().is_success() => {
			let status = resp
				.json::<serde_json::Value>()
				.await
				.ok()
				.and_then(|v| v.get("status").and_then(|s| s.as_str()).map(str::to_string));
			(true, status)
		},
		_ => (false, None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ip_literal_always_resolves() {
		assert!(resolve_host("10.0.0.5"));
	}
}
