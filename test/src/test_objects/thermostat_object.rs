use remora::{
    Descriptor, EnumDescriptor, GadgetDescriptor, MethodResult, SourceNotifier, SourceObject,
    Value, ValueType,
};

pub fn thermostat_descriptor() -> Descriptor {
    Descriptor::builder("Thermostat")
        .enumeration(
            EnumDescriptor::new("Mode")
                .scoped()
                .key("Off", 0)
                .key("Heat", 1)
                .key("Cool", 2),
        )
        .gadget(
            GadgetDescriptor::new("Schedule")
                .field("start", ValueType::Int)
                .field("end", ValueType::Int)
                .field("mode", ValueType::Enum("Mode".to_string())),
        )
        .property("mode", ValueType::Enum("Mode".to_string()))
        .property("target", ValueType::Double)
        .property("schedule", ValueType::Gadget("Schedule".to_string()))
        .constant("serial", ValueType::String)
        .method("boost", vec![ValueType::Double], ValueType::Double)
        .build()
        .expect("thermostat descriptor is valid")
}

pub fn mode(value: i64) -> Value {
    Value::Enum {
        type_name: "Mode".to_string(),
        value,
    }
}

/// A source object exercising enums, gadgets and constants
pub struct Thermostat {
    pub mode: i64,
    pub target: f64,
    pub schedule: (i64, i64, i64),
    pub serial: String,
    notifier: Option<SourceNotifier>,
}

impl Thermostat {
    pub fn new(serial: &str) -> Self {
        Self {
            mode: 1,
            target: 20.5,
            schedule: (6, 22, 1),
            serial: serial.to_string(),
            notifier: None,
        }
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
        if let Some(notifier) = &self.notifier {
            notifier.property_changed(1);
        }
    }
}

impl SourceObject for Thermostat {
    fn attach(&mut self, notifier: SourceNotifier) {
        self.notifier = Some(notifier);
    }

    fn property(&self, index: usize) -> Value {
        match index {
            0 => mode(self.mode),
            1 => Value::Double(self.target),
            2 => Value::Gadget {
                type_name: "Schedule".to_string(),
                fields: vec![
                    Value::Int(self.schedule.0),
                    Value::Int(self.schedule.1),
                    mode(self.schedule.2),
                ],
            },
            3 => Value::String(self.serial.clone()),
            _ => Value::Null,
        }
    }

    fn set_property(&mut self, index: usize, value: Value) -> bool {
        match (index, value) {
            (0, Value::Enum { value, .. }) => {
                let changed = value != self.mode;
                self.mode = value;
                changed
            }
            (1, Value::Double(target)) => {
                let changed = target != self.target;
                self.target = target;
                changed
            }
            _ => false,
        }
    }

    fn invoke(&mut self, _index: usize, args: Vec<Value>) -> MethodResult {
        let delta = args.first().and_then(Value::as_double).unwrap_or(0.0);
        self.set_target(self.target + delta);
        Value::Double(self.target).into()
    }
}
