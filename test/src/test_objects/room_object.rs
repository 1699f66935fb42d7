use remora::{Descriptor, MethodResult, SourceNotifier, SourceObject, Value, ValueType};

/// Member indices of `room_descriptor()` and its nested `Lamp`
pub mod room {
    pub const LAMP: usize = 0;
    pub const OCCUPIED: usize = 1;

    pub const DIM: usize = 0;

    pub const LAMP_ON: usize = 0;
    pub const LAMP_LEVEL: usize = 1;
}

pub fn lamp_descriptor() -> Descriptor {
    Descriptor::builder("Lamp")
        .property("on", ValueType::Bool)
        .property("level", ValueType::Int)
        .build()
        .expect("lamp descriptor is valid")
}

pub fn room_descriptor() -> Descriptor {
    Descriptor::builder("Room")
        .object(lamp_descriptor())
        .property("lamp", ValueType::Object("Lamp".to_string()))
        .property("occupied", ValueType::Bool)
        .method("dim", vec![ValueType::Int], ValueType::Null)
        .build()
        .expect("room descriptor is valid")
}

pub fn lamp(on: bool, level: i64) -> Value {
    Value::Object {
        type_name: "Lamp".to_string(),
        values: vec![Value::Bool(on), Value::Int(level)],
    }
}

/// A source object holding a nested lamp object
#[derive(Default)]
pub struct Room {
    pub lamp_on: bool,
    pub lamp_level: i64,
    pub occupied: bool,
    notifier: Option<SourceNotifier>,
}

impl Room {
    pub fn new(lamp_level: i64) -> Self {
        Self {
            lamp_on: lamp_level > 0,
            lamp_level,
            ..Self::default()
        }
    }

    /// Changes the nested lamp, which replicas see as a change of `lamp`
    pub fn set_lamp_level(&mut self, level: i64) {
        self.lamp_level = level;
        self.lamp_on = level > 0;
        if let Some(notifier) = &self.notifier {
            notifier.property_changed(room::LAMP);
        }
    }
}

impl SourceObject for Room {
    fn attach(&mut self, notifier: SourceNotifier) {
        self.notifier = Some(notifier);
    }

    fn property(&self, index: usize) -> Value {
        match index {
            room::LAMP => lamp(self.lamp_on, self.lamp_level),
            room::OCCUPIED => Value::Bool(self.occupied),
            _ => Value::Null,
        }
    }

    fn set_property(&mut self, index: usize, value: Value) -> bool {
        match (index, value) {
            (room::LAMP, Value::Object { values, .. }) => {
                let on = values.get(room::LAMP_ON).and_then(Value::as_bool);
                let level = values.get(room::LAMP_LEVEL).and_then(Value::as_int);
                let (Some(on), Some(level)) = (on, level) else {
                    return false;
                };
                let changed = on != self.lamp_on || level != self.lamp_level;
                self.lamp_on = on;
                self.lamp_level = level;
                changed
            }
            (room::OCCUPIED, Value::Bool(occupied)) => {
                let changed = occupied != self.occupied;
                self.occupied = occupied;
                changed
            }
            _ => false,
        }
    }

    fn invoke(&mut self, _index: usize, args: Vec<Value>) -> MethodResult {
        let level = args.first().and_then(Value::as_int).unwrap_or(0);
        self.set_lamp_level(level);
        Value::Null.into()
    }
}
