//! Content-addressed persistence codec.
//!
//! A tree is stored as a table of nodes keyed by content address: the
//! SHA-256 of the node's canonical encoding, in which children appear only
//! as their own addresses. Identical subtrees therefore hash to the same
//! address and are stored once, and decoding hands out one shared `Arc` per
//! address, so the sharing of the original is restored.
//!
//! ## Archive Format
//!
//! ```text
//! { "version": "piece_codec_v1",
//!   "root": "<address>",
//!   "nodes": { "<address>": { "node": "record" | "list" | ..., ... }, ... } }
//! ```
//!
//! Addresses are verified on decode; a node whose content does not match its
//! address is rejected.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::canonical::to_canonical_bytes;
use crate::tree::{Kind, Node, Record};
use crate::types::{ChangeSet, Item, Value};

/// Version tag written into every archive.
pub const CODEC_VERSION: &str = "piece_codec_v1";

/// Nesting limit enforced while decoding.
pub const MAX_DECODE_DEPTH: usize = 256;

/// Error type for decoding archives.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Bytes are not a well-formed archive.
    #[error("Malformed archive: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Archive written by an incompatible codec.
    #[error("Unsupported codec version: {0}")]
    UnsupportedVersion(String),
    /// A referenced address has no stored node.
    #[error("Missing node {0}")]
    MissingNode(String),
    /// Stored content does not hash to its address.
    #[error("Content address mismatch: stored under {expected}, content hashes to {actual}")]
    AddressMismatch {
        /// Address the node was stored under.
        expected: String,
        /// Address of its content.
        actual: String,
    },
    /// Nesting exceeds [`MAX_DECODE_DEPTH`].
    #[error("Archive nesting exceeds {0} levels")]
    TooDeep(usize),
}

/// One node with its children replaced by addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Stored {
    Record {
        kind: Kind,
        fields: BTreeMap<String, String>,
    },
    List {
        children: Vec<String>,
    },
    Item {
        item: Item,
    },
    Value {
        value: Value,
    },
    Changes {
        changes: ChangeSet,
    },
}

impl Stored {
    fn address(&self) -> String {
        hex::encode(Sha256::digest(to_canonical_bytes(self)))
    }
}

/// Encoded tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    version: String,
    root: String,
    nodes: BTreeMap<String, Stored>,
}

impl Archive {
    /// Address of the root node.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Number of distinct nodes stored.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no node is stored.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct Encoder {
    /// Addresses of nodes already encoded, by `Arc` identity.
    seen: HashMap<usize, String>,
    nodes: BTreeMap<String, Stored>,
}

impl Encoder {
    fn encode(&mut self, node: &Arc<Node>) -> String {
        let key = Arc::as_ptr(node) as usize;
        if let Some(address) = self.seen.get(&key) {
            return address.clone();
        }

        let stored = match node.as_ref() {
            Node::Record(record) => Stored::Record {
                kind: record.kind,
                fields: record
                    .fields
                    .iter()
                    .map(|(name, child)| (name.to_string(), self.encode(child)))
                    .collect(),
            },
            Node::List(children) => Stored::List {
                children: children.iter().map(|c| self.encode(c)).collect(),
            },
            Node::Item(item) => Stored::Item { item: item.clone() },
            Node::Value(value) => Stored::Value {
                value: value.clone(),
            },
            Node::Changes(changes) => Stored::Changes {
                changes: changes.clone(),
            },
        };

        let address = stored.address();
        self.nodes.entry(address.clone()).or_insert(stored);
        self.seen.insert(key, address.clone());
        address
    }
}

struct Decoder<'a> {
    nodes: &'a BTreeMap<String, Stored>,
    built: HashMap<&'a str, Arc<Node>>,
}

impl<'a> Decoder<'a> {
    fn decode(&mut self, address: &'a str, depth: usize) -> Result<Arc<Node>, CodecError> {
        if let Some(node) = self.built.get(address) {
            return Ok(Arc::clone(node));
        }
        if depth > MAX_DECODE_DEPTH {
            return Err(CodecError::TooDeep(MAX_DECODE_DEPTH));
        }

        let nodes = self.nodes;
        let stored = nodes
            .get(address)
            .ok_or_else(|| CodecError::MissingNode(address.to_string()))?;

        let node = match stored {
            Stored::Record { kind, fields } => {
                let mut record = Record::new(*kind);
                for (name, child) in fields {
                    let child = self.decode(child, depth + 1)?;
                    record.fields.insert(Arc::from(name.as_str()), child);
                }
                Node::Record(record)
            }
            Stored::List { children } => Node::List(
                children
                    .iter()
                    .map(|c| self.decode(c, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Stored::Item { item } => Node::Item(item.clone()),
            Stored::Value { value } => Node::Value(value.clone()),
            Stored::Changes { changes } => Node::Changes(changes.clone()),
        };

        let node = Arc::new(node);
        self.built.insert(address, Arc::clone(&node));
        Ok(node)
    }
}

/// Build the archive for `tree`.
pub fn encode(tree: &Arc<Node>) -> Archive {
    let mut encoder = Encoder {
        seen: HashMap::new(),
        nodes: BTreeMap::new(),
    };
    let root = encoder.encode(tree);
    tracing::trace!(%root, nodes = encoder.nodes.len(), "Encoded tree");
    Archive {
        version: CODEC_VERSION.to_string(),
        root,
        nodes: encoder.nodes,
    }
}

/// Rebuild the tree held in `archive`, verifying every address.
pub fn decode(archive: &Archive) -> Result<Arc<Node>, CodecError> {
    if archive.version != CODEC_VERSION {
        return Err(CodecError::UnsupportedVersion(archive.version.clone()));
    }
    for (expected, stored) in &archive.nodes {
        let actual = stored.address();
        if actual != *expected {
            return Err(CodecError::AddressMismatch {
                expected: expected.clone(),
                actual,
            });
        }
    }

    let mut decoder = Decoder {
        nodes: &archive.nodes,
        built: HashMap::with_capacity(archive.nodes.len()),
    };
    decoder.decode(&archive.root, 0)
}

/// Serialize `tree` to bytes.
pub fn serialize(tree: &Arc<Node>) -> Vec<u8> {
    to_canonical_bytes(&encode(tree))
}

/// Deserialize bytes written by [`serialize`].
pub fn deserialize(bytes: &[u8]) -> Result<Arc<Node>, CodecError> {
    let archive: Archive = serde_json::from_slice(bytes)?;
    decode(&archive)
}

impl Node {
    /// Content address of this subtree. Structurally equal subtrees have
    /// equal digests regardless of how they are shared.
    pub fn digest(self: &Arc<Self>) -> String {
        encode(self).root
    }
}
