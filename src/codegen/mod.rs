//! Boundary to an external code-generation service.
//!
//! Requests run on the rayon pool, off the evaluation path. Each node owns at
//! most one live request; every request carries a generation token, and a
//! reply whose token is no longer the node's current one is dropped on
//! arrival. Dropping the queue drops the receiving end, so late replies go
//! nowhere.

use crate::config::CodegenOptions;
use crate::graph::NodeId;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Prompt text in, generated text or an error out. No backend ships with
/// this crate; the application supplies one.
pub trait CodeGenerator: Send + Sync + 'static {
    fn generate(&self, prompt: &str) -> Result<String, CodegenError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("code generation failed: {0}")]
    Backend(String),
    #[error("{0} code generation request(s) already in flight")]
    QueueFull(usize),
}

/// Token identifying one submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenReply {
    pub node: NodeId,
    pub generation: Generation,
    pub result: Result<String, CodegenError>,
}

pub struct CodegenQueue {
    generator: Arc<dyn CodeGenerator>,
    max_in_flight: usize,
    next_generation: u64,
    in_flight: HashMap<NodeId, Generation>,
    sender: Sender<CodegenReply>,
    receiver: Receiver<CodegenReply>,
}

impl fmt::Debug for CodegenQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodegenQueue")
            .field("max_in_flight", &self.max_in_flight)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl CodegenQueue {
    pub fn new(generator: Arc<dyn CodeGenerator>, options: &CodegenOptions) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            generator,
            max_in_flight: options.max_in_flight.max(1),
            next_generation: 0,
            in_flight: HashMap::new(),
            sender,
            receiver,
        }
    }

    /// Starts a request for `node`. A request already live for the same node
    /// is superseded and its reply will be discarded.
    pub fn submit(&mut self, node: NodeId, prompt: impl Into<String>) -> Result<Generation, CodegenError> {
        if !self.in_flight.contains_key(&node) && self.in_flight.len() >= self.max_in_flight {
            return Err(CodegenError::QueueFull(self.in_flight.len()));
        }

        self.next_generation += 1;
        let generation = Generation(self.next_generation);
        if let Some(old) = self.in_flight.insert(node, generation) {
            tracing::debug!(node = %node, superseded = old.0, "code generation request superseded");
        }

        let generator = Arc::clone(&self.generator);
        let sender = self.sender.clone();
        let prompt = prompt.into();
        rayon::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(&prompt)))
                .unwrap_or_else(|_| Err(CodegenError::Backend("generator panicked".into())));
            // The queue may be gone; then nobody wants the answer.
            let _ = sender.send(CodegenReply { node, generation, result });
        });
        Ok(generation)
    }

    /// Forgets the live request for `node`, if any. Its reply will be discarded.
    pub fn cancel(&mut self, node: NodeId) -> bool {
        self.in_flight.remove(&node).is_some()
    }

    pub fn is_pending(&self, node: NodeId) -> bool { self.in_flight.contains_key(&node) }
    pub fn in_flight(&self) -> usize { self.in_flight.len() }

    /// Replies that arrived so far, stale ones removed. Never blocks.
    pub fn poll(&mut self) -> Vec<CodegenReply> {
        let mut live = Vec::new();
        while let Ok(reply) = self.receiver.try_recv() {
            if let Some(reply) = self.accept(reply) {
                live.push(reply);
            }
        }
        live
    }

    /// Blocks until the next live reply or until `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> Option<CodegenReply> {
        let deadline = Instant::now() + timeout;
        while !self.in_flight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(reply) => {
                    if let Some(reply) = self.accept(reply) {
                        return Some(reply);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
        None
    }

    fn accept(&mut self, reply: CodegenReply) -> Option<CodegenReply> {
        if self.in_flight.get(&reply.node) != Some(&reply.generation) {
            tracing::debug!(node = %reply.node, generation = reply.generation.0, "stale code generation reply discarded");
            return None;
        }
        self.in_flight.remove(&reply.node);
        Some(reply)
    }
}
