//! Tenant and credential context carried by a connection.
//!
//! The context is captured when `connect` is called and stays fixed for the
//! life of that connection and its automatic reconnects. Switching tenant
//! means disconnecting and connecting again with a new context.

use {
    agentfield_config::{GatewayClientConfig, TenantConfig},
    agentfield_protocol::{
        ClientInfo, ConnectAuth, ConnectParams, MIN_PROTOCOL_VERSION, PROTOCOL_VERSION, TenantInfo,
    },
    secrecy::{ExposeSecret, Secret},
};

#[derive(Clone, Default)]
pub struct TenantContext {
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub tenant_id: Option<String>,
    pub actor_id: Option<String>,
    pub environment: Option<String>,
    pub token: Option<Secret<String>>,
    pub password: Option<Secret<String>>,
}

impl std::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext")
            .field("org_id", &self.org_id)
            .field("project_id", &self.project_id)
            .field("tenant_id", &self.tenant_id)
            .field("actor_id", &self.actor_id)
            .field("environment", &self.environment)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TenantContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tenant and credentials from the loaded configuration.
    pub fn from_config(config: &GatewayClientConfig) -> Self {
        let TenantConfig {
            org_id,
            project_id,
            tenant_id,
            actor_id,
            environment,
        } = config.tenant.clone();
        Self {
            org_id,
            project_id,
            tenant_id,
            actor_id,
            environment,
            token: config.auth.token.clone(),
            password: config.auth.password.clone(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(Secret::new(token.into()));
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password.into()));
        self
    }

    #[must_use]
    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    fn tenant_info(&self) -> Option<TenantInfo> {
        let info = TenantInfo {
            org_id: self.org_id.clone(),
            project_id: self.project_id.clone(),
            tenant_id: self.tenant_id.clone(),
            actor_id: self.actor_id.clone(),
            env: self.environment.clone(),
        };
        (info != TenantInfo::default()).then_some(info)
    }

    /// Build the handshake parameters for this context.
    pub fn connect_params(&self, config: &GatewayClientConfig, instance_id: &str) -> ConnectParams {
        let identity = &config.client;
        ConnectParams {
            min_protocol: MIN_PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client: ClientInfo {
                id: identity.id.clone(),
                display_name: identity.display_name.clone(),
                version: identity.version.clone(),
                platform: identity.platform.clone(),
                mode: identity.mode.clone(),
                instance_id: Some(instance_id.to_string()),
            },
            caps: (!config.caps.is_empty()).then(|| config.caps.clone()),
            role: config.role.clone(),
            scopes: (!config.scopes.is_empty()).then(|| config.scopes.clone()),
            auth: ConnectAuth {
                token: self.token.as_ref().map(|t| t.expose_secret().clone()),
                password: self.password.as_ref().map(|p| p.expose_secret().clone()),
            },
            tenant: self.tenant_info(),
            locale: None,
            user_agent: Some(format!("{}/{}", identity.id, identity.version)),
        }
    }
}
