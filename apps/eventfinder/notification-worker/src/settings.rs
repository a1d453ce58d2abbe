use core_config::{env_optional, env_parse, ConfigError, FromEnv};
use domain_notifications::{
    EmailProvider, LogEmailProvider, LogPushProvider, NotificationResult, PushGatewayConfig,
    PushGatewayProvider, PushProvider, SmtpConfig, SmtpProvider,
};
use std::sync::Arc;
use strum::{Display, EnumString};

/// Where reminder emails go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EmailBackend {
    Smtp,
    /// Log instead of sending
    Log,
}

/// Delivery wiring for the worker
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub email_backend: EmailBackend,
    pub smtp: SmtpConfig,
    /// Pushes are only logged when no gateway is configured
    pub push_gateway: Option<PushGatewayConfig>,
}

impl FromEnv for ServiceSettings {
    /// Reads EMAIL_BACKEND (smtp|log, default smtp), the SMTP_* variables and,
    /// when PUSH_GATEWAY_URL is set, the PUSH_GATEWAY_* variables
    fn from_env() -> Result<Self, ConfigError> {
        let push_gateway = match env_optional("PUSH_GATEWAY_URL") {
            Some(_) => Some(PushGatewayConfig::from_env()?),
            None => None,
        };

        Ok(Self {
            email_backend: env_parse("EMAIL_BACKEND", EmailBackend::Smtp)?,
            smtp: SmtpConfig::from_env()?,
            push_gateway,
        })
    }
}

impl ServiceSettings {
    pub fn email_provider(&self) -> NotificationResult<Arc<dyn EmailProvider>> {
        Ok(match self.email_backend {
            EmailBackend::Smtp => Arc::new(SmtpProvider::new(self.smtp.clone())?),
            EmailBackend::Log => Arc::new(LogEmailProvider),
        })
    }

    pub fn push_provider(&self) -> NotificationResult<Arc<dyn PushProvider>> {
        Ok(match &self.push_gateway {
            Some(config) => Arc::new(PushGatewayProvider::new(config.clone())?),
            None => Arc::new(LogPushProvider),
        })
    }
}
