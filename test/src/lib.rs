pub mod helpers;
pub mod test_objects;

pub use helpers::*;
pub use test_objects::{
    counter, counter_descriptor, lamp, lamp_descriptor, mode, room, room_descriptor,
    thermostat_descriptor, Counter, Room, Thermostat,
};
