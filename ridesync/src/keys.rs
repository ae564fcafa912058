/// Redis key-construction helpers used by the Redis store engine.
#[derive(Debug, Clone)]
pub struct KeyContext {
    pub prefix: String,
    pub service: String,
}

impl KeyContext {
    pub fn new(prefix: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            service: service.into(),
        }
    }

    pub fn document(&self, collection: &str, id: &str) -> String {
        format!("{}:{}:{}:{}", self.prefix, self.service, collection, id)
    }

    /// Set holding every document id of a collection, kept apart from document keys.
    pub fn collection_index(&self, collection: &str) -> String {
        format!("{}:{}:_idx:{}", self.prefix, self.service, collection)
    }

    /// Counter handing out commit versions.
    pub fn sequence(&self) -> String {
        format!("{}:{}:_seq", self.prefix, self.service)
    }

    /// Last commit time handed out, keeping commit times strictly increasing.
    pub fn clock(&self) -> String {
        format!("{}:{}:_clock", self.prefix, self.service)
    }

    /// Pub/sub channel announcing committed writes.
    pub fn changes_channel(&self) -> String {
        format!("{}:{}:_changes", self.prefix, self.service)
    }

    /// Key pattern matching everything written under this context.
    pub fn pattern(&self) -> String {
        format!("{}:{}:*", self.prefix, self.service)
    }
}
