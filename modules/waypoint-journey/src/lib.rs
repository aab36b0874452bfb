pub mod engine;

pub use engine::{journey_from, JourneyEngine};
