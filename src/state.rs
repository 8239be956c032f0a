use std::sync::Arc;

use crate::config::Args;
use crate::error::ConfigError;
use crate::load_balancer::LoadBalancer;
use crate::policy::RouteGuards;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub load_balancer: Arc<LoadBalancer>,
    pub guards: RouteGuards,
    pub peer_fallback: bool, // key on peer address when X-Forwarded-For is missing
}

impl AppState {
    pub fn new(
        client: reqwest::Client,
        load_balancer: Arc<LoadBalancer>,
        guards: RouteGuards,
        peer_fallback: bool,
    ) -> Self {
        Self {
            client,
            load_balancer,
            guards,
            peer_fallback,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(args.upstream_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let load_balancer = Arc::new(LoadBalancer::new(&args.backends)?);
        let guards = RouteGuards::new(args.default_policy(), &args.route_limits)?;

        Ok(Self::new(client, load_balancer, guards, args.peer_fallback))
    }
}
