//! # Defaults: Runtime Interpreter
//!
//! Walks a record through the [`ReflectMessage`] contract and fills unset
//! fields from the rules attached to its schema. Values a caller set are
//! never overwritten; the only structural change is constructing nested
//! messages whose rule asks for `initialize`.
//!
//! ## Algorithm
//! 1. `disabled` and `ignored` messages are left untouched.
//! 2. Steps of the [`plan`](common::plan) run in field declaration order.
//! 3. Value rules fire only when the field is unset (`has` is false).
//! 4. Message rules construct the nested record when absent and `initialize`
//!    is set, then recurse when present and `defaults` is not disabled.
//! 5. A oneof with no member set gets its default member instantiated as the
//!    zero value; the rule of the member that is then current fires once.
//!
//! The interpreter never fails. Rules that cannot be applied are logged and
//! skipped so the rest of the record is still defaulted.

use checker::CheckErrors;
use common::plan::{plan_message, FieldAction, OneofStep, RuleError, Step};
use common::temporal::Timestamp;
use common::{FieldDescriptor, MessageDescriptor, ReflectMessage, SchemaRegistry, Value};

/// Applies defaults to `record` in place.
pub fn apply(record: &mut dyn ReflectMessage) {
    let descriptor = record.descriptor();
    if descriptor.is_disabled() || descriptor.is_ignored() {
        tracing::trace!(message = %descriptor.full_name, "defaults suppressed");
        return;
    }

    let plan = plan_message(&descriptor);
    for step in &plan.steps {
        match step {
            Step::Field { field, action } => {
                if let Some(action) = usable(&descriptor, field, action) {
                    apply_field(record, &descriptor, field, action);
                }
            }
            Step::Oneof(oneof) => apply_oneof(record, &descriptor, oneof),
        }
    }
}

/// [`apply`] for an optional record; `None` is a no-op.
pub fn apply_option(record: Option<&mut dyn ReflectMessage>) {
    if let Some(record) = record {
        apply(record);
    }
}

/// Validates the record's schema, then applies defaults.
///
/// # Errors
/// The checker's violations; the record is left untouched in that case.
pub fn apply_checked(
    registry: &SchemaRegistry,
    record: &mut dyn ReflectMessage,
) -> Result<(), CheckErrors> {
    checker::check_message(registry, &record.descriptor())?;
    apply(record);
    Ok(())
}

fn usable<'a>(
    message: &MessageDescriptor,
    field: &FieldDescriptor,
    action: &'a Result<FieldAction, RuleError>,
) -> Option<&'a FieldAction> {
    match action {
        Ok(action) => Some(action),
        Err(err) => {
            tracing::warn!(
                message = %message.full_name,
                field = %field.name,
                error = %err,
                "skipping defaults rule"
            );
            None
        }
    }
}

fn store(
    record: &mut dyn ReflectMessage,
    message: &MessageDescriptor,
    field: &FieldDescriptor,
    value: Value,
) {
    if let Err(err) = record.set(field, value) {
        tracing::warn!(
            message = %message.full_name,
            field = %field.name,
            error = %err,
            "cannot store default"
        );
    }
}

fn apply_field(
    record: &mut dyn ReflectMessage,
    message: &MessageDescriptor,
    field: &FieldDescriptor,
    action: &FieldAction,
) {
    match action {
        FieldAction::Assign(literal) => {
            if !record.has(field) {
                store(record, message, field, literal.to_value());
            }
        }
        FieldAction::AssignNow => {
            if !record.has(field) {
                store(record, message, field, Value::Timestamp(Timestamp::now()));
            }
        }
        FieldAction::Message { initialize, recurse } => {
            if !record.has(field) {
                if !initialize {
                    return;
                }
                if let Err(err) = record.init(field) {
                    tracing::warn!(
                        message = %message.full_name,
                        field = %field.name,
                        error = %err,
                        "cannot initialize message"
                    );
                    return;
                }
            }
            if *recurse {
                apply_option(record.message_mut(field));
            }
        }
    }
}

fn apply_oneof(
    record: &mut dyn ReflectMessage,
    message: &MessageDescriptor,
    oneof: &OneofStep<'_>,
) {
    let current = match record.which_oneof(oneof.name) {
        Some(number) => number,
        None => {
            let Some(default) = oneof.default_member else {
                return;
            };
            if let Err(err) = record.init(default) {
                tracing::warn!(
                    message = %message.full_name,
                    oneof = oneof.name,
                    error = %err,
                    "cannot instantiate oneof default"
                );
                return;
            }
            default.number
        }
    };

    let Some(member) = oneof.member(current) else {
        return;
    };
    let Some(action) = usable(message, member.field, &member.action) else {
        return;
    };

    match action {
        FieldAction::Assign(literal) => {
            if holds_zero(record, member.field) {
                store(record, message, member.field, literal.to_value());
            }
        }
        FieldAction::AssignNow => {
            if holds_zero(record, member.field) {
                store(record, message, member.field, Value::Timestamp(Timestamp::now()));
            }
        }
        FieldAction::Message { recurse, .. } => {
            if *recurse {
                apply_option(record.message_mut(member.field));
            }
        }
    }
}

/// A current oneof member still carrying its zero value.
fn holds_zero(record: &dyn ReflectMessage, field: &FieldDescriptor) -> bool {
    record.get(field).map_or(true, Value::is_zero)
}
