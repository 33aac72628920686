//! Public nodes
//!
//! Locally defined handlers reachable by name. A node is constructed from the
//! request arguments, validates them into a typed input and calls one or more
//! remote handles to produce its output.
//!
//! Validation failures are returned as `{"error": {"type":
//! "invalid_request_error", ...}}` results, so the router answers 400. Remote
//! failures propagate as [`NodeError`] and become 500s.

mod audio;
mod image;
mod segment;
mod text;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::error::{DispatchError, ErrorOut, NodeError};
use crate::remote::{RemoteHandle, VariantOptions, WorkerCall, WorkerClient};
use crate::router::RequestContext;

/// What a node sees while running
pub struct NodeContext<'a> {
    pub request: &'a RequestContext,
    pub workers: &'a dyn WorkerClient,
}

impl NodeContext<'_> {
    /// Invoke a remote handle with arguments built by the node
    ///
    /// Null arguments are dropped so workers apply their own defaults.
    pub async fn call(&self, handle: RemoteHandle, args: Value) -> Result<Value, DispatchError> {
        let args = compact(args);
        self.workers
            .invoke(WorkerCall {
                handle,
                args: &args,
                options: &VariantOptions::None,
                context: self.request,
            })
            .await
    }
}

fn compact(args: Value) -> Map<String, Value> {
    match args {
        Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => Map::new(),
    }
}

/// Decode a worker result into a typed output
pub fn decode_output<T: DeserializeOwned>(
    handle: RemoteHandle,
    value: Value,
) -> Result<T, NodeError> {
    serde_json::from_value(value).map_err(|e| NodeError::UnexpectedOutput {
        handle: handle.name(),
        detail: e.to_string(),
    })
}

/// Serialize a node output into a handler result
pub fn encode_output<T: serde::Serialize>(
    handle: RemoteHandle,
    output: &T,
) -> Result<Value, NodeError> {
    serde_json::to_value(output).map_err(|e| NodeError::UnexpectedOutput {
        handle: handle.name(),
        detail: e.to_string(),
    })
}

/// A runnable node instance
#[async_trait]
pub trait PublicNode: Send + Sync {
    async fn run(&self, ctx: &NodeContext<'_>) -> Result<Value, NodeError>;
}

/// Typed node input; executing it performs the node's work
#[async_trait]
pub trait NodeInput: DeserializeOwned + Send + Sync + 'static {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError>;
}

/// Node holding raw arguments until it runs
pub struct Node<I> {
    args: Map<String, Value>,
    input: PhantomData<fn() -> I>,
}

impl<I: NodeInput> Node<I> {
    pub fn boxed(args: Map<String, Value>) -> Box<dyn PublicNode> {
        Box::new(Self {
            args,
            input: PhantomData,
        })
    }
}

#[async_trait]
impl<I: NodeInput> PublicNode for Node<I> {
    async fn run(&self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        match serde_json::from_value::<I>(Value::Object(self.args.clone())) {
            Ok(input) => input.execute(ctx).await,
            Err(e) => Ok(ErrorOut::invalid_request(e.to_string()).into_result()),
        }
    }
}

/// Constructor stored in the registry
pub type NodeFactory = fn(Map<String, Value>) -> Box<dyn PublicNode>;

/// Static table of public nodes, keyed by name
pub struct NodeRegistry {
    nodes: BTreeMap<&'static str, NodeFactory>,
}

impl NodeRegistry {
    pub const fn empty() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// Registry with every built-in node
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        text::register(&mut registry);
        image::register(&mut registry);
        segment::register(&mut registry);
        audio::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: NodeFactory) {
        self.nodes.insert(name, factory);
    }

    pub fn register_input<I: NodeInput>(&mut self, name: &'static str) {
        self.register(name, Node::<I>::boxed);
    }

    /// Instantiate the named node with the request arguments
    pub fn construct(&self, name: &str, args: Map<String, Value>) -> Option<Box<dyn PublicNode>> {
        self.nodes.get(name).map(|factory| factory(args))
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    #[cfg(test)]
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Map a caller-facing 0..10 knob onto 0..`scale`
pub fn rescale(value: Option<f64>, scale: f64) -> Option<f64> {
    value.map(|v| (v / 10.0) * scale)
}
