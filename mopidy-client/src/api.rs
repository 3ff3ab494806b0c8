//! API tree built from the server's method catalog
//!
//! On every successful open the client calls `core.describe`, which returns
//! a map from dotted method name to a descriptor:
//!
//! ```json
//! {
//!   "core.playback.play": {
//!     "description": "Play the given track...",
//!     "params": [{"name": "tl_track", "default": null}, {"name": "tlid", "default": null}]
//!   }
//! }
//! ```
//!
//! [`ApiTree::build`] turns that into a tree of callables. The leading
//! `core` segment is dropped and every segment is camel-cased, so the entry
//! above is reachable as `playback.play` and `core.tracklist.get_tl_tracks`
//! as `tracklist.getTlTracks`. A name may be both a callable and a
//! namespace; neither shadows the other.
//!
//! # Calling conventions
//!
//! | arguments          | `by-position-only` | `by-position-or-by-name`     |
//! |--------------------|--------------------|------------------------------|
//! | none               | no `params`        | no `params`                  |
//! | `[a, b]`           | `[[a, b]]`         | `[a, b]`                     |
//! | `{"k": v}`         | `[{"k": v}]`       | `{"k": v}`                   |
//! | `a, b`             | `[a, b]`           | usage error                  |
//! | `"x"` or `5`       | `["x"]` or `[5]`   | type error                   |

use futures::future::BoxFuture;
use mopidy_core::error::{EXPECTED_ARGUMENTS, EXPECTED_ARRAY_OR_OBJECT};
use mopidy_core::{snake_to_camel, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How arguments handed to an [`ApiMethod`] become JSON-RPC `params`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallingConvention {
    /// Every argument is one positional param
    #[default]
    ByPositionOnly,
    /// One array argument is sent positionally, one object argument by name
    ByPositionOrByName,
}

impl CallingConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallingConvention::ByPositionOnly => "by-position-only",
            CallingConvention::ByPositionOrByName => "by-position-or-by-name",
        }
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallingConvention {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "by-position-only" => Ok(CallingConvention::ByPositionOnly),
            "by-position-or-by-name" => Ok(CallingConvention::ByPositionOrByName),
            other => Err(Error::Config(format!("unknown calling convention: {}", other))),
        }
    }
}

/// Which name an [`ApiMethod`] puts in the request's `method` member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MethodNaming {
    /// The catalog key exactly as the server declared it (`core.playback.play`)
    #[default]
    Declared,
    /// The catalog key with its leading `core.` removed (`playback.play`)
    Relative,
}

/// Map params onto the wire according to `convention`
///
/// `Ok(None)` means the request carries no `params` member at all.
pub fn marshal(convention: CallingConvention, args: Vec<Value>) -> Result<Option<Value>> {
    match convention {
        CallingConvention::ByPositionOnly => {
            if args.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Value::Array(args)))
            }
        }
        CallingConvention::ByPositionOrByName => {
            if args.len() > 1 {
                return Err(Error::Usage(EXPECTED_ARGUMENTS.to_string()));
            }
            match args.into_iter().next() {
                None => Ok(None),
                Some(value @ (Value::Array(_) | Value::Object(_))) => Ok(Some(value)),
                Some(_) => Err(Error::Type(EXPECTED_ARRAY_OR_OBJECT.to_string())),
            }
        }
    }
}

/// One parameter as declared by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Set for variadic params, e.g. `"var_args"` or `"var_kwargs"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One catalog entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamDescriptor>,
}

/// The result of `core.describe`, keyed by dotted method name
pub type MethodCatalog = BTreeMap<String, MethodDescriptor>;

pub fn parse_catalog(value: Value) -> Result<MethodCatalog> {
    serde_json::from_value(value).map_err(|e| Error::Parse(format!("method catalog: {}", e)))
}

/// Client-side path segments for a catalog key
///
/// ```rust
/// use mopidy_client::api::api_path;
///
/// assert_eq!(api_path("core.tracklist.get_tl_tracks"), vec!["tracklist", "getTlTracks"]);
/// assert_eq!(api_path("core.describe"), vec!["describe"]);
/// ```
pub fn api_path(key: &str) -> Vec<String> {
    key.strip_prefix("core.")
        .unwrap_or(key)
        .split('.')
        .map(snake_to_camel)
        .collect()
}

/// Sends one request; bound to the client's dispatcher
pub type SendFn = Arc<dyn Fn(String, Option<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A callable leaf of the [`ApiTree`]
#[derive(Clone)]
pub struct ApiMethod {
    method: String,
    path: String,
    description: Option<String>,
    params: Vec<ParamDescriptor>,
    convention: CallingConvention,
    send: SendFn,
}

impl ApiMethod {
    /// The JSON-RPC method name this leaf sends
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Dotted camel-case path within the tree
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Marshal `args` and send the request
    ///
    /// Badly shaped arguments fail here without touching the transport.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        let params = marshal(self.convention, args)?;
        (self.send)(self.method.clone(), params).await
    }
}

impl fmt::Debug for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiMethod")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.param_names())
            .finish()
    }
}

/// A namespace, a callable, or both
#[derive(Debug, Clone, Default)]
pub struct ApiNode {
    method: Option<ApiMethod>,
    children: BTreeMap<String, ApiNode>,
}

impl ApiNode {
    pub fn method(&self) -> Option<&ApiMethod> {
        self.method.as_ref()
    }

    pub fn child(&self, segment: &str) -> Option<&ApiNode> {
        self.children.get(segment)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &ApiNode)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_namespace(&self) -> bool {
        !self.children.is_empty()
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        if self.method.is_some() && !prefix.is_empty() {
            out.push(prefix.to_string());
        }
        for (segment, child) in &self.children {
            let path = if prefix.is_empty() {
                segment.clone()
            } else {
                format!("{}.{}", prefix, segment)
            };
            child.collect_paths(&path, out);
        }
    }
}

/// The callable API surface, rebuilt from scratch on each catalog fetch
#[derive(Debug, Clone, Default)]
pub struct ApiTree {
    root: ApiNode,
    len: usize,
}

impl ApiTree {
    pub fn build(
        catalog: &MethodCatalog,
        convention: CallingConvention,
        naming: MethodNaming,
        send: SendFn,
    ) -> Self {
        let mut tree = ApiTree::default();

        for (key, descriptor) in catalog {
            let segments = api_path(key);
            let path = segments.join(".");
            let method = match naming {
                MethodNaming::Declared => key.clone(),
                MethodNaming::Relative => key.strip_prefix("core.").unwrap_or(key).to_string(),
            };

            let mut node = &mut tree.root;
            for segment in segments {
                node = node.children.entry(segment).or_default();
            }

            if node.method.is_some() {
                tracing::warn!(method = %key, path = %path, "Catalog entries share a path, keeping the last");
            } else {
                tree.len += 1;
            }
            node.method = Some(ApiMethod {
                method,
                path,
                description: descriptor.description.clone(),
                params: descriptor.params.clone(),
                convention,
                send: Arc::clone(&send),
            });
        }

        tracing::debug!(methods = tree.len, "API tree built");
        tree
    }

    /// Node at a dotted camel-case path; `""` is the root
    pub fn get(&self, path: &str) -> Option<&ApiNode> {
        if path.is_empty() {
            return Some(&self.root);
        }
        path.split('.')
            .try_fold(&self.root, |node, segment| node.children.get(segment))
    }

    pub fn method(&self, path: &str) -> Option<&ApiMethod> {
        self.get(path).and_then(ApiNode::method)
    }

    /// Call the method at `path`
    pub async fn call(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        match self.method(path) {
            Some(method) => method.call(args).await,
            None => Err(Error::MethodNotFound(path.to_string())),
        }
    }

    /// Every callable path, in lexical order per level
    pub fn method_paths(&self) -> Vec<String> {
        let mut paths = Vec::with_capacity(self.len);
        self.root.collect_paths("", &mut paths);
        paths
    }

    pub fn root(&self) -> &ApiNode {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
