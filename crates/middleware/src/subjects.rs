use std::sync::Arc;

use dashmap::DashMap;

use crate::error::TransportError;

/// Replace characters that carry meaning in NATS subjects.
///
/// Token separators and wildcards become `_` so a topic segment always maps
/// to exactly one subject token.
pub fn sanitize_subject_token(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Map a slash-separated topic name (`/camera/image`) to a subject (`camera.image`).
pub fn topic_to_subject(topic: &str) -> Result<String, TransportError> {
    let tokens: Vec<String> = topic
        .split('/')
        .filter(|t| !t.is_empty())
        .map(sanitize_subject_token)
        .collect();

    if tokens.is_empty() {
        return Err(TransportError::InvalidTopic(topic.to_string()));
    }
    Ok(tokens.join("."))
}

/// Helper for subject formatting with an optional prefix.
/// Caches formatted subjects so repeated lookups do not allocate.
pub struct SubjectBuilder {
    /// Pre-computed prefix including trailing dot, empty when unset
    prefix: Arc<str>,
    /// Cache of topic -> full subject
    cache: DashMap<Arc<str>, Arc<str>>,
}

impl SubjectBuilder {
    /// Builder that maps topics without a prefix
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Builder that places every subject under `{prefix}.`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix: Arc<str> = if prefix.is_empty() {
            "".into()
        } else {
            format!("{}.", prefix.trim_end_matches('.')).into()
        };
        Self {
            prefix,
            cache: DashMap::new(),
        }
    }

    /// Subject for a topic: `{prefix}.{topic tokens}`.
    /// Cached - first call allocates, subsequent calls return Arc clone.
    pub fn topic(&self, topic: &str) -> Result<Arc<str>, TransportError> {
        if let Some(cached) = self.cache.get(topic) {
            return Ok(Arc::clone(cached.value()));
        }

        let subject: Arc<str> = format!("{}{}", self.prefix, topic_to_subject(topic)?).into();
        self.cache.insert(topic.into(), Arc::clone(&subject));
        Ok(subject)
    }
}

impl Default for SubjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}
