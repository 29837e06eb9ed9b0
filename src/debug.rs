//! Store debugging aids
//!
//! [`with_logger`] traces the lifecycle and values of a single store.
//! [`DebugRegistry`] collects named stores and renders their current values
//! as a tree following the dependencies given at registration. The
//! registry is an explicit object; nothing is registered globally.

use std::fmt::{Debug, Write as _};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::store::{Store, Teardown};
use crate::task;

/// Wrap `store` so subscriptions, values and unsubscriptions are traced
pub fn with_logger<T>(store: Store<T>, name: impl Into<String>) -> Store<T>
where
    T: Debug + Clone + Send + Sync + 'static,
{
    let name: Arc<str> = Arc::from(name.into());

    Store::readable(store.get(), move |setter| {
        debug!(store = %name, "Subscribed");
        let value_name = name.clone();
        let subscription = store.subscribe(move |value| {
            debug!(store = %value_name, ?value, "New value");
            setter.set(value.clone());
        });

        let name = name.clone();
        Teardown::new(move || {
            debug!(store = %name, "Unsubscribed");
            drop(subscription);
        })
    })
}

type Snapshot = Box<dyn Fn() -> String + Send + Sync>;

struct Node {
    name: String,
    depends_on: Vec<String>,
    snapshot: Snapshot,
}

/// Named stores whose current values can be dumped on demand
#[derive(Clone, Default)]
pub struct DebugRegistry {
    nodes: Arc<Mutex<Vec<Node>>>,
}

impl DebugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `store` under `name`; re-registering a name replaces it
    pub fn register<T>(&self, name: impl Into<String>, store: &Store<T>)
    where
        T: Debug + Clone + Send + Sync + 'static,
    {
        self.register_derived(name, store, &[]);
    }

    /// Register a store derived from previously registered ones
    pub fn register_derived<T>(
        &self,
        name: impl Into<String>,
        store: &Store<T>,
        depends_on: &[&str],
    ) where
        T: Debug + Clone + Send + Sync + 'static,
    {
        let name = name.into();
        let store = store.clone();
        let node = Node {
            name: name.clone(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            snapshot: Box::new(move || format!("{:?}", store.get())),
        };

        let mut nodes = self.lock();
        nodes.retain(|existing| existing.name != name);
        nodes.push(node);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current value of every registered store, in registration order
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .map(|node| (node.name.clone(), (node.snapshot)()))
            .collect()
    }

    /// Render the registered stores as an indented tree, each store
    /// followed by its dependencies
    pub fn render(&self) -> String {
        let nodes = self.lock();
        let is_dependency =
            |name: &str| nodes.iter().any(|n| n.depends_on.iter().any(|d| d == name));

        let mut out = String::new();
        for root in nodes.iter().filter(|n| !is_dependency(&n.name)) {
            render_node(&nodes, root, 0, &mut Vec::new(), &mut out);
        }
        out
    }

    /// Log the rendered tree every `interval` until the teardown runs
    pub fn spawn_dump(&self, interval: Duration) -> Result<Teardown> {
        let registry = self.clone();
        task::spawn(async move {
            loop {
                debug!(tree = %registry.render(), "Store tree");
                tokio::time::sleep(interval).await;
            }
        })
    }
}

fn render_node<'a>(
    nodes: &'a [Node],
    node: &'a Node,
    depth: usize,
    path: &mut Vec<&'a str>,
    out: &mut String,
) {
    let _ = writeln!(out, "{}{}: {}", "  ".repeat(depth), node.name, (node.snapshot)());
    if path.contains(&node.name.as_str()) {
        return;
    }
    path.push(&node.name);
    for dependency in &node.depends_on {
        if let Some(child) = nodes.iter().find(|n| &n.name == dependency) {
            render_node(nodes, child, depth + 1, path, out);
        }
    }
    path.pop();
}
