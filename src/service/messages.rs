//! Request and response types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::coordinator::{Edit, EditError};
use crate::resolver::{Direction, Located, Span};
use crate::timewalk::{TraversalSpec, Visit, WalkIssue, WalkStats};
use crate::tree::Node;
use crate::types::{ElementId, Item, ItemTag, Path, Position};

// ============================================================================
// Request Types
// ============================================================================

/// One operation on one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Document id (UUID string).
    pub document: String,
    /// What to do.
    pub operation: Operation,
    /// Echoed into error responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Operations a request can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Subtree at `path` of the current version.
    Read {
        /// Target.
        path: Path,
    },
    /// One edit, committed on its own.
    Edit {
        /// The edit.
        edit: Edit,
    },
    /// All edits in one transaction; none apply if any fails.
    Batch {
        /// Edits, applied in order.
        edits: Vec<Edit>,
    },
    /// Restore the version before the last commit.
    Undo,
    /// Traverse the current version.
    Traverse {
        /// Scope, bounds and pipeline.
        #[serde(default)]
        spec: TraversalSpec,
    },
    /// Cross-reference lookup.
    Resolve {
        /// What to look up.
        query: ResolveQuery,
    },
    /// Content address of the current version.
    Digest,
}

/// Cross-reference lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum ResolveQuery {
    /// Nearest item of one of `tags` from `start` within `max_distance`.
    Endpoint {
        /// Start item.
        start: Path,
        /// Search direction.
        #[serde(default)]
        direction: Direction,
        /// Accepted tags; empty accepts any item.
        #[serde(default)]
        tags: Vec<ItemTag>,
        /// Search bound.
        max_distance: Position,
    },
    /// Element by stable id.
    Id {
        /// Element id.
        id: ElementId,
    },
    /// Both ends of a span.
    Span {
        /// First end.
        start_id: ElementId,
        /// Second end.
        end_id: ElementId,
    },
}

// ============================================================================
// Response Types
// ============================================================================

/// One traversal tuple in primitive form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitDto {
    /// Path in text form.
    pub path: String,
    /// Position as `n/d`.
    pub position: Position,
    /// The item.
    pub item: Option<Item>,
}

impl From<Visit> for VisitDto {
    fn from(visit: Visit) -> Self {
        Self {
            path: visit.path.to_string(),
            position: visit.position,
            item: visit.node.as_item().cloned(),
        }
    }
}

/// Successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    /// Subtree.
    Node {
        /// The subtree.
        node: Arc<Node>,
    },
    /// Transaction committed.
    Committed {
        /// Commit stamp, absent if nothing changed.
        stamp: Option<u64>,
        /// Attempts it took.
        attempts: u32,
        /// Ids assigned by `assign_id` edits, in edit order.
        assigned: Vec<ElementId>,
    },
    /// Traversal result.
    Visits {
        /// Tuples delivered.
        visits: Vec<VisitDto>,
        /// Walk counters.
        stats: WalkStats,
    },
    /// Path lookup result.
    Path {
        /// Path found, if any.
        path: Option<String>,
    },
    /// Id lookup result.
    Located {
        /// Where the element is, if any.
        located: Option<Located>,
    },
    /// Span lookup result.
    Span {
        /// Both ends, if resolvable.
        span: Option<Span>,
    },
    /// Content address.
    Digest {
        /// SHA-256 hex.
        digest: String,
    },
}

/// Structured error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Correlation id from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            correlation_id: None,
            details: None,
        }
    }

    /// Add a correlation ID to the error.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<EditError> for ErrorResponse {
    fn from(e: EditError) -> Self {
        let code = match &e {
            EditError::PathInvalid(_) => "PATH_INVALID",
            EditError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            EditError::RetryLimit { .. } => "RETRY_LIMIT",
            EditError::Aborted(_) => "ABORTED",
            EditError::NothingToUndo(_) => "NOTHING_TO_UNDO",
            EditError::InvalidEdit(_) => "INVALID_EDIT",
            EditError::Conflict(_) => "CONFLICT",
        };
        let response = Self::new(code, e.to_string());
        match e {
            EditError::PathInvalid(p) => response.with_details(p.path.to_string()),
            _ => response,
        }
    }
}

impl From<WalkIssue> for ErrorResponse {
    fn from(issue: WalkIssue) -> Self {
        let code = match &issue {
            WalkIssue::PathInvalid(_) | WalkIssue::OutsideScope { .. } => "PATH_INVALID",
            WalkIssue::InvalidScope { .. } => "INVALID_SCOPE",
            WalkIssue::PositionOverflow { .. } => "POSITION_OVERFLOW",
        };
        Self::new(code, issue.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::PathInvalid;
    use crate::types::DocumentId;

    #[test]
    fn test_request_wire_shape() {
        let json = r#"{
            "document": "6f1c5f9e-3c0a-4c1e-9a57-0d4b8f1e2a33",
            "operation": {"op": "traverse", "spec": {"stages": [{"stage": "take", "arg": 2}]}}
        }"#;
        let request: Request = serde_json::from_str(json).unwrap();
        match request.operation {
            Operation::Traverse { spec } => assert_eq!(spec.stages.len(), 1),
            other => panic!("unexpected operation {:?}", other),
        }
        assert_eq!(request.correlation_id, None);
    }

    #[test]
    fn test_resolve_query_defaults() {
        let json = r#"{"by": "endpoint", "start": ["voices", 0], "max_distance": "1/2"}"#;
        let query: ResolveQuery = serde_json::from_str(json).unwrap();
        assert_eq!(
            query,
            ResolveQuery::Endpoint {
                start: Path::root().field("voices").index(0),
                direction: Direction::Forward,
                tags: vec![],
                max_distance: Position::new(1, 2),
            }
        );
    }

    #[test]
    fn test_error_codes() {
        let id = DocumentId::random();
        let e: ErrorResponse = EditError::DocumentNotFound(id).into();
        assert_eq!(e.code, "DOCUMENT_NOT_FOUND");
        assert!(e.error.contains(&id.to_string()));

        let path = Path::parse("[:items 4]").unwrap();
        let e: ErrorResponse = EditError::from(PathInvalid {
            path: path.clone(),
            depth: 1,
            reason: crate::tree::Mismatch::IndexOutOfRange { index: 4, len: 1 },
        })
        .into();
        assert_eq!(e.code, "PATH_INVALID");
        assert_eq!(e.details.as_deref(), Some(path.to_string().as_str()));
    }

    #[test]
    fn test_error_response_skips_empty_fields() {
        let json = serde_json::to_value(ErrorResponse::new("X", "y")).unwrap();
        assert!(json.get("correlation_id").is_none());
        assert!(json.get("details").is_none());
    }
}
