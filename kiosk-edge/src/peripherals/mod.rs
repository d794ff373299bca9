//! Peripherals driven by remote state

pub mod light;

pub use light::{HttpLightController, LightController, LightError, LightReconciler};
