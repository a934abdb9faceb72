//! Shared service state and request dispatch.

use std::sync::Arc;

use crate::coordinator::{Coordinator, Edit, EditError};
use crate::registry::{DocumentHandle, DocumentRegistry, InMemoryRegistry};
use crate::resolver::{resolve_endpoint_in, Resolver};
use crate::timewalk::{traverse, TraversalOptions};
use crate::tree::resolve;
use crate::types::DocumentId;

use super::messages::{ErrorResponse, Operation, Request, ResolveQuery, Response, VisitDto};

/// Shared service state.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct ServiceState<R: DocumentRegistry = InMemoryRegistry> {
    coordinator: Arc<Coordinator<R>>,
    resolver: Resolver,
}

impl<R: DocumentRegistry> ServiceState<R> {
    /// Create service state around a coordinator. The resolver cache is
    /// sized from the coordinator's configuration.
    pub fn new(coordinator: Arc<Coordinator<R>>) -> Self {
        let resolver = Resolver::from_config(coordinator.config());
        Self {
            coordinator,
            resolver,
        }
    }

    /// The coordinator requests run against.
    pub fn coordinator(&self) -> &Arc<Coordinator<R>> {
        &self.coordinator
    }

    /// Handle one request.
    pub fn handle(&self, request: Request) -> Result<Response, ErrorResponse> {
        let correlation_id = request.correlation_id.clone();
        let result = self.dispatch(request);
        result.map_err(|e| {
            let e = match correlation_id {
                Some(id) => e.with_correlation_id(id),
                None => e,
            };
            // Log the error for debugging
            tracing::warn!(
                code = %e.code,
                error = %e.error,
                correlation_id = ?e.correlation_id,
                "Request error"
            );
            e
        })
    }

    /// Handle a JSON request, producing a JSON response or error body.
    pub fn handle_json(&self, body: &str) -> String {
        let outcome = match serde_json::from_str::<Request>(body) {
            Ok(request) => self.handle(request).map_err(|e| serde_json::to_string(&e)),
            Err(e) => Err(serde_json::to_string(
                &ErrorResponse::new("INVALID_REQUEST", format!("Malformed request: {}", e)),
            )),
        };
        let encoded = match outcome {
            Ok(response) => serde_json::to_string(&response),
            Err(error) => error,
        };
        encoded.unwrap_or_else(|e| {
            format!(r#"{{"error":"Response encoding failed: {}","code":"INTERNAL"}}"#, e)
        })
    }

    fn document(&self, raw: &str) -> Result<DocumentHandle, ErrorResponse> {
        let id = DocumentId::parse(raw).map_err(|e| {
            ErrorResponse::new("INVALID_DOCUMENT_ID", format!("Invalid document ID: {}", e))
                .with_details(raw.to_string())
        })?;
        Ok(self.coordinator.document(id)?)
    }

    fn dispatch(&self, request: Request) -> Result<Response, ErrorResponse> {
        let doc = self.document(&request.document)?;
        tracing::debug!(document = %doc.id(), "Dispatching request");

        match request.operation {
            Operation::Read { path } => {
                let tree = doc.snapshot();
                let node = resolve(&tree, &path).map_err(EditError::from)?;
                Ok(Response::Node {
                    node: Arc::clone(node),
                })
            }
            Operation::Edit { edit } => self.commit(&doc, vec![edit]),
            Operation::Batch { edits } => {
                if edits.is_empty() {
                    return Err(EditError::InvalidEdit("empty batch".to_string()).into());
                }
                self.commit(&doc, edits)
            }
            Operation::Undo => {
                let (_, record) = self
                    .coordinator
                    .with_transaction_recorded(|tx| tx.undo(&doc))?;
                Ok(Response::Committed {
                    stamp: record.stamp,
                    attempts: record.attempts,
                    assigned: Vec::new(),
                })
            }
            Operation::Traverse { spec } => {
                let tree = doc.snapshot();
                let (visits, stats) =
                    traverse(&tree, TraversalOptions::from(spec)).try_collect_with_stats()?;
                Ok(Response::Visits {
                    visits: visits.into_iter().map(VisitDto::from).collect(),
                    stats,
                })
            }
            Operation::Resolve { query } => {
                let tree = doc.snapshot();
                Ok(match query {
                    ResolveQuery::Endpoint {
                        start,
                        direction,
                        tags,
                        max_distance,
                    } => {
                        let path = resolve_endpoint_in(
                            &tree,
                            &start,
                            direction,
                            |t| tags.is_empty() || tags.contains(&t.tag()),
                            max_distance,
                        );
                        Response::Path {
                            path: path.map(|p| p.to_string()),
                        }
                    }
                    ResolveQuery::Id { id } => Response::Located {
                        located: self.resolver.find_by_id(&tree, id),
                    },
                    ResolveQuery::Span { start_id, end_id } => Response::Span {
                        span: self.resolver.resolve_span(&tree, start_id, end_id),
                    },
                })
            }
            Operation::Digest => Ok(Response::Digest {
                digest: doc.snapshot().digest(),
            }),
        }
    }

    fn commit(
        &self,
        doc: &DocumentHandle,
        edits: Vec<Edit>,
    ) -> Result<Response, ErrorResponse> {
        let (assigned, record) = self.coordinator.with_transaction_recorded(|tx| {
            let mut assigned = Vec::new();
            for edit in &edits {
                let outcome = tx.apply(doc, edit.clone())?;
                assigned.extend(outcome.id);
            }
            Ok(assigned)
        })?;
        Ok(Response::Committed {
            stamp: record.stamp,
            attempts: record.attempts,
            assigned,
        })
    }
}
