//! Simulation events.

use std::cmp::Ordering;

use downcast_rs::{impl_downcast, Downcast};
use dyn_clone::DynClone;
use serde::ser::Serialize;

use crate::component::Id;

/// Event identifier, equal to the sequence number of event creation.
pub type EventId = u64;

/// Trait for event payloads.
///
/// It is implemented for any cloneable serializable type, so there is no need to implement it manually.
/// The concrete payload type plays the role of the event tag.
pub trait EventData: Downcast + DynClone + erased_serde::Serialize {}

impl_downcast!(EventData);

dyn_clone::clone_trait_object!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + Clone + 'static> EventData for T {}

/// Event with its delivery time, source, destination and payload.
#[derive(Clone)]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// Time of event delivery.
    pub time: f64,
    /// Component which emitted the event.
    pub src: Id,
    /// Component to which the event is delivered.
    pub dst: Id,
    /// Event payload.
    pub data: Box<dyn EventData>,
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Inverted to turn std BinaryHeap into a min-heap on (time, id).
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
