pub mod audio;
pub mod config;
pub mod controller;
pub mod gesture;
pub mod replay;

pub use audio::{AudioConfig, EngineState, LayerEngine, StemEngine};
pub use config::Config;
pub use controller::DjController;
pub use gesture::{GestureState, RawHand};
