//! Shared fixtures for task unit tests.

use crate::task::domain::{
    TaskKind, TaskTypeName, TaskTypeRegistration, TaskTypeRegistry,
};
use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = instant;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("valid fixed instant")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    pub x: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleOutput {
    pub y: i64,
}

pub struct Sample;

impl TaskKind for Sample {
    const TYPE_NAME: &'static str = "Sample";
    type Config = SampleConfig;
    type Output = SampleOutput;
}

pub struct Foo;

impl TaskKind for Foo {
    const TYPE_NAME: &'static str = "Foo";
    type Config = serde_json::Value;
    type Output = serde_json::Value;
}

pub fn type_name(name: &str) -> TaskTypeName {
    TaskTypeName::new(name).expect("valid type name")
}

pub fn registry() -> Arc<TaskTypeRegistry> {
    let registry = TaskTypeRegistry::new()
        .with(
            TaskTypeRegistration::of::<Sample>()
                .expect("valid kind")
                .with_executor("sample-worker"),
        )
        .and_then(|registry| {
            registry.with(TaskTypeRegistration::of::<Foo>().expect("valid kind"))
        })
        .expect("distinct registrations");
    Arc::new(registry)
}
