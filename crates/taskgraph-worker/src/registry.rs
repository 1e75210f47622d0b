//! Maps task kinds to the handler that runs them. A worker's advertised `capabilities` are exactly the keys of
//! its registry.

use std::collections::HashMap;
use std::sync::Arc;

use taskgraph_core::{TaskHandler, TaskKind};

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(handler.kind().to_string(), handler);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn capabilities(&self) -> Vec<TaskKind> {
        self.handlers.keys().cloned().collect()
    }
}
