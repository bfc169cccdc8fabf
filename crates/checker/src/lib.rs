//! # Checker: Rule-Schema Validation
//!
//! Verifies every attached rule against the field it decorates before a
//! schema is accepted for generation:
//!
//! 1. **Kind match**: the rule kind equals the field kind, one wrapper level unwrapped.
//! 2. **Enum membership**: enum constants are legal values of the field's enum.
//! 3. **Temporal literals**: duration and timestamp literals parse.
//! 4. **Oneof defaults**: the named default member exists in the group.
//! 5. **Reachability**: message types reached through `message` rules and oneof
//!    defaults are checked too, and `initialize` chains must not loop.
//!
//! All violations are collected and reported together.

use common::plan::{self, FieldAction, Literal, RuleError};
use common::temporal::TemporalError;
use common::{FieldDescriptor, MessageDescriptor, SchemaRegistry};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Location of a violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    Field { message: String, field: String },
    Oneof { message: String, oneof: String },
}

impl FieldPath {
    fn field(message: &MessageDescriptor, field: &FieldDescriptor) -> Self {
        FieldPath::Field {
            message: message.full_name.clone(),
            field: field.name.clone(),
        }
    }

    fn oneof(message: &MessageDescriptor, oneof: &str) -> Self {
        FieldPath::Oneof {
            message: message.full_name.clone(),
            oneof: oneof.to_string(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Field { message, field } => write!(f, "message {message}, field {field}"),
            FieldPath::Oneof { message, oneof } => write!(f, "message {message}, oneof {oneof}"),
        }
    }
}

/// A single rule-schema violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("{path}: rule kind {rule} does not match field type {field_type}")]
    RuleTypeMismatch {
        path: FieldPath,
        rule: String,
        field_type: String,
    },
    #[error("{path}: {value} is not a value of enum {enum_name}")]
    UnknownEnumValue {
        path: FieldPath,
        value: i32,
        enum_name: String,
    },
    #[error("{path}: {source}")]
    InvalidDuration { path: FieldPath, source: TemporalError },
    #[error("{path}: {source}")]
    InvalidTimestamp { path: FieldPath, source: TemporalError },
    #[error("{path}: default member {member} is not a member of the oneof")]
    UnknownOneofMember { path: FieldPath, member: String },
    #[error("{path}: unsupported rule variant {tag}")]
    UnsupportedRuleVariant { path: FieldPath, tag: String },
    #[error("{path}: type {type_name} is not registered")]
    UnknownType { path: FieldPath, type_name: String },
    #[error("initialize cycle through {}", .cycle.join(", "))]
    InitializeCycle { cycle: Vec<String> },
}

impl CheckError {
    fn from_rule(path: FieldPath, err: RuleError) -> Self {
        match err {
            RuleError::RuleTypeMismatch { rule, field } => CheckError::RuleTypeMismatch {
                path,
                rule,
                field_type: field,
            },
            RuleError::Temporal(source @ TemporalError::InvalidDuration { .. }) => {
                CheckError::InvalidDuration { path, source }
            }
            RuleError::Temporal(source @ TemporalError::InvalidTimestamp { .. }) => {
                CheckError::InvalidTimestamp { path, source }
            }
            RuleError::UnsupportedRuleVariant(tag) => {
                CheckError::UnsupportedRuleVariant { path, tag }
            }
        }
    }
}

/// Every violation found in one check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckErrors(Vec<CheckError>);

impl CheckErrors {
    pub fn errors(&self) -> &[CheckError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<CheckError> {
        self.0
    }
}

impl fmt::Display for CheckErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} defaults rule violation(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CheckErrors {}

impl IntoIterator for CheckErrors {
    type Item = CheckError;
    type IntoIter = std::vec::IntoIter<CheckError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

/// Checks one message type and every type its rules reach.
pub fn check_message(
    registry: &SchemaRegistry,
    message: &MessageDescriptor,
) -> Result<(), CheckErrors> {
    let mut checker = Checker::new(registry);
    checker.visit(message);
    checker.finish()
}

/// Checks every message loaded into the registry.
pub fn check_registry(registry: &SchemaRegistry) -> Result<(), CheckErrors> {
    let mut checker = Checker::new(registry);
    for message in registry.user_messages() {
        checker.visit(message);
    }
    checker.finish()
}

/// Accumulates violations and the `initialize` graph across visited messages.
pub struct Checker<'r> {
    registry: &'r SchemaRegistry,
    visited: HashSet<String>,
    queue: VecDeque<Arc<MessageDescriptor>>,
    errors: Vec<CheckError>,
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl<'r> Checker<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            visited: HashSet::new(),
            queue: VecDeque::new(),
            errors: Vec::new(),
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    /// Checks `message`, then drains the types it reaches.
    pub fn visit(&mut self, message: &MessageDescriptor) {
        self.check_one(message);
        while let Some(next) = self.queue.pop_front() {
            self.check_one(&next);
        }
    }

    /// Runs cycle detection and returns the collected violations.
    pub fn finish(mut self) -> Result<(), CheckErrors> {
        for component in tarjan_scc(&self.graph) {
            let looped = match component.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                _ => true,
            };
            if looped {
                let mut cycle: Vec<String> = component
                    .iter()
                    .map(|idx| self.graph[*idx].clone())
                    .collect();
                cycle.sort();
                self.errors.push(CheckError::InitializeCycle { cycle });
            }
        }

        if self.errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(violations = self.errors.len(), "defaults check failed");
            Err(CheckErrors(self.errors))
        }
    }

    fn check_one(&mut self, message: &MessageDescriptor) {
        if !self.visited.insert(message.full_name.clone()) {
            return;
        }
        if message.is_disabled() {
            tracing::debug!(message = %message.full_name, "skipping disabled message");
            return;
        }

        for field in &message.fields {
            let Some(rule) = field.rule() else {
                continue;
            };
            let path = FieldPath::field(message, field);
            match plan::resolve(rule, plan::FieldShape::of(field)) {
                Ok(action) => self.check_action(message, field, &action, path),
                Err(err) => self.errors.push(CheckError::from_rule(path, err)),
            }
        }

        for oneof in &message.oneofs {
            let Some(member_name) = oneof.default_member.as_deref() else {
                continue;
            };
            let path = FieldPath::oneof(message, &oneof.name);
            let Some(member) = message.oneof_default(&oneof.name) else {
                self.errors.push(CheckError::UnknownOneofMember {
                    path,
                    member: member_name.to_string(),
                });
                continue;
            };
            if plan::FieldShape::of(member) != plan::FieldShape::Message {
                continue;
            }
            let Some(target) = self.resolve_message(member, path) else {
                continue;
            };
            let recurse = matches!(
                plan::field_action(member),
                Some(Ok(FieldAction::Message { recurse: true, .. }))
            );
            if recurse && !message.is_ignored() {
                self.add_edge(&message.full_name, &target.full_name);
            }
            self.queue.push_back(target);
        }
    }

    fn check_action(
        &mut self,
        message: &MessageDescriptor,
        field: &FieldDescriptor,
        action: &FieldAction,
        path: FieldPath,
    ) {
        match action {
            FieldAction::Assign(Literal::Enum(value)) => match self.registry.field_enum(field) {
                Some(enumeration) if !enumeration.contains(*value) => {
                    self.errors.push(CheckError::UnknownEnumValue {
                        path,
                        value: *value,
                        enum_name: enumeration.full_name.clone(),
                    });
                }
                Some(_) => {}
                None => self.errors.push(CheckError::UnknownType {
                    path,
                    type_name: field.type_name().unwrap_or_default().to_string(),
                }),
            },
            FieldAction::Message { initialize, recurse } => {
                let Some(target) = self.resolve_message(field, path) else {
                    return;
                };
                // A oneof member can be initialized by its group default as well.
                let constructed = *initialize || self.is_oneof_default(message, field);
                // Both engines stop at an ignored message, so its rules never construct.
                if constructed && *recurse && !message.is_ignored() {
                    self.add_edge(&message.full_name, &target.full_name);
                }
                if *initialize || *recurse {
                    self.queue.push_back(target);
                }
            }
            FieldAction::Assign(_) | FieldAction::AssignNow => {}
        }
    }

    fn is_oneof_default(&self, message: &MessageDescriptor, field: &FieldDescriptor) -> bool {
        field
            .real_oneof()
            .and_then(|oneof| message.oneof_default(oneof))
            .is_some_and(|member| member.number == field.number)
    }

    fn resolve_message(
        &mut self,
        field: &FieldDescriptor,
        path: FieldPath,
    ) -> Option<Arc<MessageDescriptor>> {
        match self.registry.field_message(field) {
            Some(target) => Some(Arc::clone(target)),
            None => {
                self.errors.push(CheckError::UnknownType {
                    path,
                    type_name: field.type_name().unwrap_or_default().to_string(),
                });
                None
            }
        }
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.nodes.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        let from = self.node(from);
        let to = self.node(to);
        self.graph.update_edge(from, to, ());
    }
}
