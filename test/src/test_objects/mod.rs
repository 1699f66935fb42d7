mod room_object;
mod thermostat_object;

pub use counter_object::{counter, counter_descriptor, Counter};
pub use room_object::{lamp, lamp_descriptor, room, room_descriptor, Room};
pub use thermostat_object::{mode, thermostat_descriptor, Thermostat};
