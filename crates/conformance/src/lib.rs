//! # Conformance
//!
//! Prost-shaped structs for `schema/fixture.json` with the generated
//! `apply_defaults` methods compiled in, plus a bridge into
//! [`DynamicMessage`] so both engines can be run on the same record and
//! compared.

use common::temporal;
use common::{DynamicMessage, ReflectError, SchemaError, SchemaRegistry, Value};
use std::sync::{Arc, OnceLock};

const FIXTURE: &str = include_str!("../schema/fixture.json");

static REGISTRY: OnceLock<Arc<SchemaRegistry>> = OnceLock::new();

/// The fixture schema, parsed once.
pub fn registry() -> Result<Arc<SchemaRegistry>, SchemaError> {
    if let Some(registry) = REGISTRY.get() {
        return Ok(Arc::clone(registry));
    }
    let registry = Arc::new(SchemaRegistry::from_json_str(FIXTURE)?);
    Ok(Arc::clone(REGISTRY.get_or_init(|| registry)))
}

// ---------------------------------------------------------------------------
// Well-known types
// ---------------------------------------------------------------------------

/// Stand-ins for `prost_types::{Duration, Timestamp}`.
pub mod wkt {
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Duration {
        pub seconds: i64,
        pub nanos: i32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Timestamp {
        pub seconds: i64,
        pub nanos: i32,
    }

    impl From<SystemTime> for Timestamp {
        fn from(time: SystemTime) -> Self {
            match time.duration_since(UNIX_EPOCH) {
                Ok(after) => Self {
                    seconds: after.as_secs() as i64,
                    nanos: after.subsec_nanos() as i32,
                },
                Err(err) => {
                    let before = err.duration();
                    let mut seconds = -(before.as_secs() as i64);
                    let mut nanos = -(before.subsec_nanos() as i32);
                    if nanos < 0 {
                        seconds -= 1;
                        nanos += 1_000_000_000;
                    }
                    Self { seconds, nanos }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Package `fixture`
// ---------------------------------------------------------------------------

pub mod fixture {
    use crate::wkt;

    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Test {
        pub string_field: String,
        pub number_field: i64,
        pub bool_field: bool,
        pub enum_field: i32,
        pub float_field: f32,
        pub double_field: f64,
        pub fixed64_field: u64,
        pub sint32_field: i32,
        pub optional_field: Option<i32>,
        pub wrapped_int: Option<i64>,
        pub wrapped_string: Option<String>,
        pub wrapped_bool: Option<bool>,
        pub duration_field: Option<wkt::Duration>,
        pub now_field: Option<wkt::Timestamp>,
        pub fixed_timestamp: Option<wkt::Timestamp>,
        pub bytes_field: Vec<u8>,
        pub repeated_field: Vec<String>,
        pub nested: Option<test::Nested>,
        pub settings: Option<Settings>,
        pub lazy: Option<Settings>,
        pub disabled_field: Option<Disabled>,
        pub wrapped_bytes: Option<Vec<u8>>,
        pub wrapped_double: Option<f64>,
        pub oneof: Option<test::Oneof>,
    }

    pub mod test {
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct Nested {
            pub since: Option<crate::wkt::Timestamp>,
            pub depth: i64,
            pub choice: Option<nested::Choice>,
        }

        pub mod nested {
            #[derive(Debug, Clone, PartialEq)]
            pub enum Choice {
                Count(u32),
                Label(String),
            }
        }

        #[derive(Debug, Clone, PartialEq)]
        pub enum Oneof {
            One(super::OneOfOne),
            Two(super::OneOfTwo),
        }
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct OneOfOne {
        pub string_field: String,
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct OneOfTwo {
        pub string_field: String,
        pub number: i32,
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Settings {
        pub retries: u32,
        pub label: String,
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Disabled {
        pub value: String,
    }

    include!(concat!(env!("OUT_DIR"), "/fixture.defaults.rs"));
}

// ---------------------------------------------------------------------------
// Bridge into the dynamic model
// ---------------------------------------------------------------------------

/// Conversion of a generated-style struct into a [`DynamicMessage`].
pub trait ToDynamic {
    const FULL_NAME: &'static str;

    fn fill(&self, message: &mut DynamicMessage) -> Result<(), ReflectError>;

    fn to_dynamic(&self, registry: &Arc<SchemaRegistry>) -> Result<DynamicMessage, ReflectError> {
        let mut message = DynamicMessage::new(Arc::clone(registry), Self::FULL_NAME)?;
        self.fill(&mut message)?;
        Ok(message)
    }
}

fn put_some<T>(
    message: &mut DynamicMessage,
    name: &str,
    value: Option<T>,
    wrap: impl FnOnce(T) -> Value,
) -> Result<(), ReflectError> {
    match value {
        Some(value) => message.set_by_name(name, wrap(value)),
        None => Ok(()),
    }
}

fn nested<T: ToDynamic>(message: &DynamicMessage, value: &T) -> Result<Value, ReflectError> {
    Ok(Value::Message(value.to_dynamic(message.registry())?))
}

fn duration(d: wkt::Duration) -> Value {
    Value::Duration(temporal::Duration {
        seconds: d.seconds,
        nanos: d.nanos,
    })
}

fn timestamp(t: wkt::Timestamp) -> Value {
    Value::Timestamp(temporal::Timestamp {
        seconds: t.seconds,
        nanos: t.nanos,
    })
}

impl ToDynamic for fixture::Test {
    const FULL_NAME: &'static str = "fixture.Test";

    fn fill(&self, m: &mut DynamicMessage) -> Result<(), ReflectError> {
        m.set_by_name("string_field", Value::String(self.string_field.clone()))?;
        m.set_by_name("number_field", Value::I64(self.number_field))?;
        m.set_by_name("bool_field", Value::Bool(self.bool_field))?;
        m.set_by_name("enum_field", Value::EnumNumber(self.enum_field))?;
        m.set_by_name("float_field", Value::F32(self.float_field))?;
        m.set_by_name("double_field", Value::F64(self.double_field))?;
        m.set_by_name("fixed64_field", Value::U64(self.fixed64_field))?;
        m.set_by_name("sint32_field", Value::I32(self.sint32_field))?;
        put_some(m, "optional_field", self.optional_field, Value::I32)?;
        put_some(m, "wrapped_int", self.wrapped_int, Value::I64)?;
        put_some(m, "wrapped_string", self.wrapped_string.clone(), Value::String)?;
        put_some(m, "wrapped_bool", self.wrapped_bool, Value::Bool)?;
        put_some(m, "duration_field", self.duration_field, duration)?;
        put_some(m, "now_field", self.now_field, timestamp)?;
        put_some(m, "fixed_timestamp", self.fixed_timestamp, timestamp)?;
        m.set_by_name("bytes_field", Value::Bytes(self.bytes_field.clone()))?;
        let repeated = self.repeated_field.iter().cloned().map(Value::String).collect();
        m.set_by_name("repeated_field", Value::List(repeated))?;
        if let Some(child) = &self.nested {
            let value = nested(m, child)?;
            m.set_by_name("nested", value)?;
        }
        if let Some(child) = &self.settings {
            let value = nested(m, child)?;
            m.set_by_name("settings", value)?;
        }
        if let Some(child) = &self.lazy {
            let value = nested(m, child)?;
            m.set_by_name("lazy", value)?;
        }
        if let Some(child) = &self.disabled_field {
            let value = nested(m, child)?;
            m.set_by_name("disabled_field", value)?;
        }
        put_some(m, "wrapped_bytes", self.wrapped_bytes.clone(), Value::Bytes)?;
        put_some(m, "wrapped_double", self.wrapped_double, Value::F64)?;
        match &self.oneof {
            Some(fixture::test::Oneof::One(child)) => {
                let value = nested(m, child)?;
                m.set_by_name("one", value)?;
            }
            Some(fixture::test::Oneof::Two(child)) => {
                let value = nested(m, child)?;
                m.set_by_name("two", value)?;
            }
            None => {}
        }
        Ok(())
    }
}

impl ToDynamic for fixture::test::Nested {
    const FULL_NAME: &'static str = "fixture.Test.Nested";

    fn fill(&self, m: &mut DynamicMessage) -> Result<(), ReflectError> {
        use fixture::test::nested::Choice;
        match &self.choice {
            Some(Choice::Count(n)) => m.set_by_name("count", Value::U32(*n))?,
            Some(Choice::Label(s)) => m.set_by_name("label", Value::String(s.clone()))?,
            None => {}
        }
        put_some(m, "since", self.since, timestamp)?;
        m.set_by_name("depth", Value::I64(self.depth))
    }
}

impl ToDynamic for fixture::OneOfOne {
    const FULL_NAME: &'static str = "fixture.OneOfOne";

    fn fill(&self, m: &mut DynamicMessage) -> Result<(), ReflectError> {
        m.set_by_name("string_field", Value::String(self.string_field.clone()))
    }
}

impl ToDynamic for fixture::OneOfTwo {
    const FULL_NAME: &'static str = "fixture.OneOfTwo";

    fn fill(&self, m: &mut DynamicMessage) -> Result<(), ReflectError> {
        m.set_by_name("string_field", Value::String(self.string_field.clone()))?;
        m.set_by_name("number", Value::I32(self.number))
    }
}

impl ToDynamic for fixture::Settings {
    const FULL_NAME: &'static str = "fixture.Settings";

    fn fill(&self, m: &mut DynamicMessage) -> Result<(), ReflectError> {
        m.set_by_name("retries", Value::U32(self.retries))?;
        m.set_by_name("label", Value::String(self.label.clone()))
    }
}

impl ToDynamic for fixture::Disabled {
    const FULL_NAME: &'static str = "fixture.Disabled";

    fn fill(&self, m: &mut DynamicMessage) -> Result<(), ReflectError> {
        m.set_by_name("value", Value::String(self.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::test::nested::Choice;
    use super::fixture::test::{Nested, Oneof};
    use super::fixture::{Disabled, OneOfOne, OneOfTwo, Settings, Test};
    use super::*;
    use proptest::prelude::*;

    const FORTY_TWO_WEEKS: i64 = 42 * 7 * 24 * 3600;
    const MARCH_1952: i64 = -562_032_000;
    const PINNED: wkt::Timestamp = wkt::Timestamp {
        seconds: 1_000,
        nanos: 0,
    };

    fn now_seconds() -> i64 {
        wkt::Timestamp::from(std::time::SystemTime::now()).seconds
    }

    fn interpret(record: &Test) -> DynamicMessage {
        let registry = registry().unwrap();
        let mut dynamic = record.to_dynamic(&registry).unwrap();
        defaults::apply(&mut dynamic);
        dynamic
    }

    fn generate(record: &Test) -> Test {
        let mut out = record.clone();
        out.apply_defaults();
        out
    }

    #[test]
    fn test_generated_defaults_on_empty_record() {
        let before = now_seconds();
        let out = generate(&Test::default());

        assert_eq!(out.string_field, "string_field");
        assert_eq!(out.number_field, 42);
        assert!(out.bool_field);
        assert_eq!(out.enum_field, 2);
        assert_eq!(out.float_field, 1.5);
        assert_eq!(out.double_field, 2.25);
        assert_eq!(out.fixed64_field, 7);
        assert_eq!(out.sint32_field, -3);
        assert_eq!(out.optional_field, Some(7));
        assert_eq!(out.wrapped_int, Some(43));
        assert_eq!(out.wrapped_string.as_deref(), Some("string_value"));
        assert_eq!(out.wrapped_bool, Some(false));
        assert_eq!(
            out.duration_field,
            Some(wkt::Duration {
                seconds: FORTY_TWO_WEEKS,
                nanos: 0
            })
        );
        assert_eq!(out.fixed_timestamp.map(|t| t.seconds), Some(MARCH_1952));
        let now = out.now_field.unwrap().seconds;
        assert!(now >= before && now <= now_seconds());
        assert_eq!(out.bytes_field, b"??");
        assert!(out.repeated_field.is_empty());
        assert_eq!(out.wrapped_bytes.as_deref(), Some(&b"??"[..]));
        assert_eq!(out.wrapped_double, Some(0.5));
    }

    #[test]
    fn test_generated_message_rules() {
        let out = generate(&Test::default());

        let nested = out.nested.unwrap();
        assert_eq!(nested.choice, Some(Choice::Count(5)));
        assert_eq!(nested.since.map(|t| t.seconds), Some(MARCH_1952));
        assert_eq!(nested.depth, 9);

        // initialize without recursion
        assert_eq!(out.settings, Some(Settings::default()));
        assert_eq!(out.lazy, None);
        assert_eq!(out.disabled_field, Some(Disabled::default()));

        assert_eq!(
            out.oneof,
            Some(Oneof::Two(OneOfTwo {
                string_field: "string_field".into(),
                number: 2
            }))
        );
    }

    #[test]
    fn test_generated_oneof_keeps_current_member() {
        let record = Test {
            oneof: Some(Oneof::One(OneOfOne::default())),
            nested: Some(Nested {
                choice: Some(Choice::Label(String::new())),
                ..Nested::default()
            }),
            lazy: Some(Settings {
                retries: 1,
                ..Settings::default()
            }),
            ..Test::default()
        };
        let out = generate(&record);

        // OneOfOne ignores defaults
        assert_eq!(out.oneof, Some(Oneof::One(OneOfOne::default())));
        assert_eq!(out.nested.unwrap().choice, Some(Choice::Label("label".into())));
        assert_eq!(
            out.lazy,
            Some(Settings {
                retries: 1,
                label: "settings".into()
            })
        );
    }

    #[test]
    fn test_generated_keeps_caller_values() {
        let record = Test {
            string_field: "mine".into(),
            optional_field: Some(0),
            wrapped_bool: Some(true),
            wrapped_int: Some(0),
            duration_field: Some(wkt::Duration::default()),
            ..Test::default()
        };
        let out = generate(&record);
        assert_eq!(out.string_field, "mine");
        assert_eq!(out.optional_field, Some(0));
        assert_eq!(out.wrapped_bool, Some(true));
        assert_eq!(out.wrapped_int, Some(0));
        assert_eq!(out.duration_field, Some(wkt::Duration::default()));
    }

    #[test]
    fn test_engines_agree_on_empty_record() {
        let registry = registry().unwrap();
        let mut generated = generate(&Test::default());
        let mut interpreted = interpret(&Test::default());

        generated.now_field = Some(PINNED);
        interpreted
            .set_by_name("now_field", timestamp(PINNED))
            .unwrap();
        assert_eq!(generated.to_dynamic(&registry).unwrap(), interpreted);
    }

    #[test]
    fn test_wkt_timestamp_before_epoch() {
        let time = std::time::UNIX_EPOCH - std::time::Duration::from_millis(1500);
        let ts = wkt::Timestamp::from(time);
        assert_eq!(ts, wkt::Timestamp { seconds: -2, nanos: 500_000_000 });
    }

    // -----------------------------------------------------------------------
    // Cross-engine properties
    // -----------------------------------------------------------------------

    fn maybe<T, S>(strategy: S) -> BoxedStrategy<T>
    where
        T: Default + Clone + std::fmt::Debug + 'static,
        S: Strategy<Value = T> + 'static,
    {
        prop_oneof![Just(T::default()), strategy].boxed()
    }

    fn arb_timestamp() -> impl Strategy<Value = wkt::Timestamp> {
        (-1_000_000_000i64..4_000_000_000, 0i32..1_000_000_000)
            .prop_map(|(seconds, nanos)| wkt::Timestamp { seconds, nanos })
    }

    fn arb_duration() -> impl Strategy<Value = wkt::Duration> {
        (0i64..1_000_000_000, 0i32..1_000_000_000)
            .prop_map(|(seconds, nanos)| wkt::Duration { seconds, nanos })
    }

    fn arb_settings() -> impl Strategy<Value = Settings> {
        (maybe(any::<u32>()), maybe("[a-z]{1,6}"))
            .prop_map(|(retries, label)| Settings { retries, label })
    }

    fn arb_nested() -> impl Strategy<Value = Nested> {
        let choice = prop_oneof![
            maybe(any::<u32>()).prop_map(Choice::Count),
            maybe("[a-z]{1,6}").prop_map(Choice::Label),
        ];
        (
            proptest::option::of(arb_timestamp()),
            maybe(any::<i64>()),
            proptest::option::of(choice),
        )
            .prop_map(|(since, depth, choice)| Nested { since, depth, choice })
    }

    fn arb_oneof() -> impl Strategy<Value = Oneof> {
        prop_oneof![
            maybe("[a-z]{1,6}").prop_map(|string_field| Oneof::One(OneOfOne { string_field })),
            (maybe("[a-z]{1,6}"), maybe(any::<i32>()))
                .prop_map(|(string_field, number)| Oneof::Two(OneOfTwo { string_field, number })),
        ]
    }

    prop_compose! {
        fn arb_test()(
            scalars in (
                maybe("[a-z]{1,8}"),
                maybe(any::<i64>()),
                any::<bool>(),
                maybe(0i32..3),
                maybe(-1000.0f32..1000.0),
                maybe(-1000.0f64..1000.0),
                maybe(any::<u64>()),
                maybe(any::<i32>()),
            ),
            presence in (
                proptest::option::of(any::<i32>()),
                proptest::option::of(any::<i64>()),
                proptest::option::of("[a-z]{0,8}"),
                proptest::option::of(any::<bool>()),
                proptest::option::of(arb_duration()),
                proptest::option::of(arb_timestamp()),
                proptest::option::of(arb_timestamp()),
                proptest::option::of(proptest::collection::vec(any::<u8>(), 0..4)),
                proptest::option::of(-1000.0f64..1000.0),
            ),
            messages in (
                maybe(proptest::collection::vec(any::<u8>(), 1..4)),
                proptest::collection::vec("[a-z]{1,4}", 0..3),
                proptest::option::of(arb_nested()),
                proptest::option::of(arb_settings()),
                proptest::option::of(arb_settings()),
                proptest::option::of(Just(Disabled::default())),
                proptest::option::of(arb_oneof()),
            )
        ) -> Test {
            let (
                string_field,
                number_field,
                bool_field,
                enum_field,
                float_field,
                double_field,
                fixed64_field,
                sint32_field,
            ) = scalars;
            let (
                optional_field,
                wrapped_int,
                wrapped_string,
                wrapped_bool,
                duration_field,
                now_field,
                fixed_timestamp,
                wrapped_bytes,
                wrapped_double,
            ) = presence;
            let (bytes_field, repeated_field, nested, settings, lazy, disabled_field, oneof) =
                messages;
            Test {
                string_field,
                number_field,
                bool_field,
                enum_field,
                float_field,
                double_field,
                fixed64_field,
                sint32_field,
                optional_field,
                wrapped_int,
                wrapped_string,
                wrapped_bool,
                duration_field,
                now_field,
                fixed_timestamp,
                bytes_field,
                repeated_field,
                nested,
                settings,
                lazy,
                disabled_field,
                wrapped_bytes,
                wrapped_double,
                oneof,
            }
        }
    }

    proptest! {
        #[test]
        fn test_engines_are_equivalent(record in arb_test()) {
            let registry = registry().unwrap();
            let mut generated = generate(&record);
            let mut interpreted = interpret(&record);

            if record.now_field.is_none() {
                generated.now_field = Some(PINNED);
                interpreted.set_by_name("now_field", timestamp(PINNED)).unwrap();
            }
            prop_assert_eq!(generated.to_dynamic(&registry).unwrap(), interpreted);
        }

        #[test]
        fn test_apply_is_idempotent(record in arb_test()) {
            let once = generate(&record);
            prop_assert_eq!(generate(&once), once.clone());

            let mut dynamic = interpret(&record);
            let snapshot = dynamic.clone();
            defaults::apply(&mut dynamic);
            prop_assert_eq!(dynamic, snapshot);
        }

        #[test]
        fn test_set_values_survive(record in arb_test()) {
            let out = generate(&record);
            if !record.string_field.is_empty() {
                prop_assert_eq!(&out.string_field, &record.string_field);
            }
            if record.number_field != 0 {
                prop_assert_eq!(out.number_field, record.number_field);
            }
            if record.optional_field.is_some() {
                prop_assert_eq!(out.optional_field, record.optional_field);
            }
            if record.wrapped_bool.is_some() {
                prop_assert_eq!(out.wrapped_bool, record.wrapped_bool);
            }
            if record.now_field.is_some() {
                prop_assert_eq!(out.now_field, record.now_field);
            }
            if record.duration_field.is_some() {
                prop_assert_eq!(out.duration_field, record.duration_field);
            }
            if let Some(Oneof::One(_)) = &record.oneof {
                prop_assert_eq!(&out.oneof, &record.oneof);
            }
            prop_assert_eq!(&out.repeated_field, &record.repeated_field);
        }
    }
}
