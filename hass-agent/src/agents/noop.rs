//! Placeholder for unrecognized agent types.

use tracing::warn;

pub struct NoopAgent {
    kind: String,
}

impl NoopAgent {
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        warn!("Unknown agent type: {:?}", kind);
        Self { kind }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}
