//! Isolated node scanning and operator review
//!
//! A scan reports every node of a graph that nothing references. The
//! operator then picks which of the reported nodes to remove; only nodes
//! that appear in the report can enter a [`ConfirmedSelection`].
//!
//! The scanner moves `Idle → Scanning → Reviewed`. It stays in `Scanning`
//! while its latest report awaits review, and confirming that report ends
//! the invocation in `Reviewed`. A new scan starts the next invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use sweep_core::{Binding, NodeRef, Result, ResultShape, Row, SweepError};
use sweep_query::StatementBuilder;
use sweep_store::{EndpointFailure, StoreClient};
use uuid::Uuid;

/// Separator used when the store concatenates note references
const NOTE_SEPARATOR: char = '|';

// ============================================================================
// Scan Types
// ============================================================================

/// One unreferenced node plus everything it points to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationRecord {
    pub uri: NodeRef,
    pub class: NodeRef,
    pub notes: Vec<NodeRef>,
}

/// Phase of one scan-and-review invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// No scan has run yet
    Idle,
    /// A scan is running or its report awaits the operator's selection
    Scanning,
    /// The selection for the latest report has been confirmed
    Reviewed,
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Reviewed => write!(f, "reviewed"),
        }
    }
}

/// Result of scanning one graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub id: Uuid,
    pub graph: NodeRef,
    pub scanned_at: DateTime<Utc>,
    pub records: Vec<IsolationRecord>,

    /// Number of isolated nodes reported
    pub isolated_count: usize,

    /// Sum of note-list lengths. Nodes referenced from several isolated
    /// nodes are counted once per reference.
    pub notes_count: usize,

    /// Endpoints that could not be scanned
    pub failures: Vec<EndpointFailure>,
}

impl ScanReport {
    fn new(graph: NodeRef, records: Vec<IsolationRecord>, failures: Vec<EndpointFailure>) -> Self {
        let notes_count = records.iter().map(|r| r.notes.len()).sum();
        Self {
            id: Uuid::new_v4(),
            graph,
            scanned_at: Utc::now(),
            isolated_count: records.len(),
            notes_count,
            records,
            failures,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether `uri` was reported as isolated
    pub fn contains(&self, uri: &NodeRef) -> bool {
        self.records.iter().any(|r| &r.uri == uri)
    }

    /// Records grouped by class, in report order
    pub fn by_class(&self) -> Vec<(&NodeRef, Vec<&IsolationRecord>)> {
        let mut groups: Vec<(&NodeRef, Vec<&IsolationRecord>)> = Vec::new();
        for record in &self.records {
            match groups.iter_mut().find(|(class, _)| *class == &record.class) {
                Some((_, members)) => members.push(record),
                None => groups.push((&record.class, vec![record])),
            }
        }
        groups
    }

    /// References not in the report are rejected and listed in the selection
    pub(crate) fn select<'a>(&self, uris: impl IntoIterator<Item = &'a NodeRef>) -> ConfirmedSelection {
        let mut nodes = BTreeSet::new();
        let mut rejected = Vec::new();
        for uri in uris {
            if self.contains(uri) {
                nodes.insert(uri.clone());
            } else {
                rejected.push(uri.clone());
            }
        }
        if !rejected.is_empty() {
            tracing::warn!(scan = %self.id, rejected = rejected.len(), "selection contains unreported nodes");
        }
        ConfirmedSelection {
            scan_id: self.id,
            graph: self.graph.clone(),
            nodes,
            rejected,
            confirmed_at: Utc::now(),
        }
    }

    pub(crate) fn select_all(&self) -> ConfirmedSelection {
        self.select(self.records.iter().map(|r| &r.uri))
    }
}

/// Nodes an operator confirmed for deletion after reviewing a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmedSelection {
    pub scan_id: Uuid,
    pub graph: NodeRef,
    pub nodes: BTreeSet<NodeRef>,
    pub rejected: Vec<NodeRef>,
    pub confirmed_at: DateTime<Utc>,
}

impl ConfirmedSelection {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Finds nodes of a graph that have no incoming references
#[derive(Debug, Clone)]
pub struct IsolationScanner {
    store: StoreClient,
    builder: StatementBuilder,
    phase: ScanPhase,

    /// Report awaiting review
    pending: Option<Uuid>,
}

impl IsolationScanner {
    pub fn new(store: StoreClient, builder: StatementBuilder) -> Self {
        Self {
            store,
            builder,
            phase: ScanPhase::Idle,
            pending: None,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    fn transition(&mut self, next: ScanPhase) {
        tracing::debug!(from = %self.phase, to = %next, "scan phase");
        self.phase = next;
    }

    /// Scan `graph`. Read-only; every call queries the store afresh.
    ///
    /// The returned report replaces any earlier one still awaiting review.
    pub async fn scan(&mut self, graph: &NodeRef) -> Result<ScanReport> {
        self.transition(ScanPhase::Scanning);
        self.pending = None;
        let descriptor = self.builder.isolated_nodes_query(graph);
        tracing::debug!(statement = %descriptor.statement, "isolated nodes query");

        let output = self.store.execute(&descriptor, ResultShape::Row).await;

        let records = output
            .results
            .rows()
            .unwrap_or_default()
            .iter()
            .filter_map(parse_record)
            .collect::<Vec<_>>();

        let report = ScanReport::new(graph.clone(), records, output.failures);
        tracing::info!(
            graph = %graph,
            scan = %report.id,
            isolated = report.isolated_count,
            notes = report.notes_count,
            failed_endpoints = report.failures.len(),
            "scan finished"
        );
        self.pending = Some(report.id);
        Ok(report)
    }

    /// Confirm the operator's choice from the report awaiting review.
    /// References not in the report are rejected and listed in the
    /// selection.
    pub fn confirm<'a>(
        &mut self,
        report: &ScanReport,
        uris: impl IntoIterator<Item = &'a NodeRef>,
    ) -> Result<ConfirmedSelection> {
        if self.phase != ScanPhase::Scanning || self.pending != Some(report.id) {
            return Err(SweepError::InvalidArgument(format!(
                "scan {} is not awaiting review (scanner is {})",
                report.id, self.phase
            )));
        }
        let selection = report.select(uris);
        self.pending = None;
        self.transition(ScanPhase::Reviewed);
        Ok(selection)
    }

    /// Confirm every node of the report awaiting review
    pub fn confirm_all(&mut self, report: &ScanReport) -> Result<ConfirmedSelection> {
        self.confirm(report, report.records.iter().map(|r| &r.uri))
    }
}

fn parse_record(row: &Row) -> Option<IsolationRecord> {
    let uri = row.get("uri").and_then(Binding::as_reference)?;
    let Some(class) = row.get("class").and_then(Binding::as_reference) else {
        tracing::debug!(uri = %uri, "skipping row without class reference");
        return None;
    };

    let notes = match row.get("notes") {
        Some(Binding::Literal(joined)) => split_notes(joined),
        _ => Vec::new(),
    };

    Some(IsolationRecord {
        uri: uri.clone(),
        class: class.clone(),
        notes,
    })
}

/// Split a concatenated note list. Empty entries stand for literal
/// objects and are dropped.
fn split_notes(joined: &str) -> Vec<NodeRef> {
    joined
        .split(NOTE_SEPARATOR)
        .filter(|note| !note.trim().is_empty())
        .filter_map(|note| NodeRef::new(note).ok())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
