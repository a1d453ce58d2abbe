use crate::error::{HandlerError, QueueError};
use crate::job::Job;
use crate::kind::JobKind;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes one kind of job.
///
/// Return [`HandlerError::Retryable`] for failures worth another attempt and
/// [`HandlerError::Permanent`] for input that will never succeed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Maps every job kind to its handler
pub struct HandlerRegistry<K: JobKind> {
    handlers: HashMap<K, Arc<dyn JobHandler>>,
}

impl<K: JobKind> HandlerRegistry<K> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(mut self, kind: K, handler: impl JobHandler + 'static) -> Self {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn register_arc(mut self, kind: K, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: &K) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(kind)
    }

    /// Parse a persisted kind name and look up its handler
    pub fn resolve(&self, kind: &str) -> Result<(K, Arc<dyn JobHandler>), QueueError> {
        let parsed: K = kind
            .parse()
            .map_err(|_| QueueError::UnknownKind(kind.to_string()))?;
        let handler = self
            .handlers
            .get(&parsed)
            .ok_or_else(|| QueueError::UnknownKind(kind.to_string()))?;
        Ok((parsed, handler.clone()))
    }

    /// Fail unless every kind has a handler
    pub fn validate(&self) -> Result<(), QueueError> {
        let missing: Vec<String> = K::all()
            .into_iter()
            .filter(|kind| !self.handlers.contains_key(kind))
            .map(|kind| kind.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(QueueError::Config(format!(
                "no handler registered for: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<K: JobKind> Default for HandlerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
