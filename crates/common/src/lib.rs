//! # Common: Schema Model and Defaulting Plan
//!
//! Shared by the checker, the interpreter and the generator:
//!
//! - [`temporal`]: duration and timestamp literal parsing.
//! - [`rule`]: the [`FieldDefaults`] rule model.
//! - [`descriptor`] / [`registry`]: the read-only schema model.
//! - [`reflect`]: the record accessor contract and [`DynamicMessage`].
//! - [`plan`]: the per-message action table both engines execute.

pub mod descriptor;
pub mod plan;
pub mod reflect;
pub mod registry;
pub mod rule;
pub mod temporal;

pub use descriptor::{
    EnumDescriptor, EnumValue, FieldDescriptor, Kind, MessageDescriptor, OneofDescriptor,
    WellKnownType,
};
pub use plan::{FieldAction, FieldShape, Literal, RuleError};
pub use reflect::{DynamicMessage, ReflectError, ReflectMessage, Value};
pub use registry::{SchemaError, SchemaFile, SchemaRegistry};
pub use rule::{FieldDefaults, MessageDefaults};
